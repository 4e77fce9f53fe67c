use serde::{Deserialize, Serialize};

/// Aggregate outcome of one upload. `imported + skipped == total` always holds;
/// the `invalid`, `duplicates` and `storage_failures` counters break `skipped` down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionResult {
    pub total: usize,
    pub imported: usize,
    pub skipped: usize,
    pub duplicate_row_numbers: Vec<usize>,
    pub invalid: usize,
    pub duplicates: usize,
    pub storage_failures: usize,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_total: Option<u64>,
}

impl IngestionResult {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.imported + self.skipped
    }

    pub fn record_imported(&mut self) {
        self.imported += 1;
    }

    pub fn record_invalid(&mut self) {
        self.invalid += 1;
        self.skipped += 1;
    }

    pub fn record_duplicate(&mut self, row_number: usize) {
        self.duplicates += 1;
        self.skipped += 1;
        self.duplicate_row_numbers.push(row_number);
    }

    pub fn record_storage_failure(&mut self) {
        self.storage_failures += 1;
        self.skipped += 1;
    }

    /// Counts every row not yet processed as skipped.
    pub fn record_cancelled(&mut self) {
        self.skipped += self.total.saturating_sub(self.processed());
        self.cancelled = true;
    }

    /// "Row(s) 3, 4, and 9 already existing and were skipped." or None without
    /// duplicates.
    pub fn duplicate_message(&self) -> Option<String> {
        if self.duplicate_row_numbers.is_empty() {
            return None;
        }
        Some(format!(
            "Row(s) {} already existing and were skipped.",
            format_row_numbers(&self.duplicate_row_numbers)
        ))
    }

    pub fn summary_message(&self) -> String {
        let mut msg = format!(
            "Imported {} of {} rows, {} skipped.",
            self.imported, self.total, self.skipped
        );
        if self.cancelled {
            msg.push_str(" The import was cancelled before it finished.");
        }
        if let Some(duplicates) = self.duplicate_message() {
            msg.push(' ');
            msg.push_str(&duplicates);
        }
        msg
    }
}

/// English list formatting: "5", "5 and 6", "5, 6, and 7".
pub fn format_row_numbers(rows: &[usize]) -> String {
    match rows {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => {
            let head: Vec<String> = init.iter().map(ToString::to_string).collect();
            format!("{}, and {last}", head.join(", "))
        }
    }
}
