use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// The product surfaces that feed rows into the engine. Each flow keeps its own set
/// of records per event, so a registrant can exist once per flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportFlow {
    Registration,
    CheckIn,
    TaskPass,
}

impl ImportFlow {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportFlow::Registration => "registration",
            ImportFlow::CheckIn => "check_in",
            ImportFlow::TaskPass => "task_pass",
        }
    }
}

impl Display for ImportFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImportFlow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_ref() {
            "registration" => Ok(ImportFlow::Registration),
            "check_in" | "checkin" => Ok(ImportFlow::CheckIn),
            "task_pass" | "taskpass" => Ok(ImportFlow::TaskPass),
            _ => Err(format!(
                "Unknown import flow: {s}, must be one of registration, check_in, task_pass"
            )),
        }
    }
}
