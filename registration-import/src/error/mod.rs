use thiserror::Error;

/// Problems with the upload as a whole. Raised before any row is looked at.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("the uploaded file contains no data rows")]
    EmptyFile,
    #[error("the uploaded file is missing required columns: {}", .0.join(", "))]
    MissingRequiredColumns(Vec<String>),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    // Without the existing records we can't deduplicate, so the run can't start
    #[error("failed to load existing registrations for event {event_id}")]
    ExistingRecords {
        event_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ImportError {
    /// Message safe to show the uploader.
    pub fn user_message(&self) -> String {
        match self {
            ImportError::Structural(e) => {
                let mut msg = e.to_string();
                if let Some(first) = msg.get_mut(..1) {
                    first.make_ascii_uppercase();
                }
                msg
            }
            ImportError::ExistingRecords { .. } => {
                "We couldn't start the import, please try again".to_string()
            }
        }
    }
}

// Use .user_error() to attach a user facing message to an error chain, main can
// then pull it back out with get_user_message
#[derive(Error, Debug, Clone)]
#[error("User Error: {msg}")]
pub struct UserError {
    pub msg: String,
}

impl UserError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

pub trait ToUserError<T> {
    fn user_error(self, msg: impl Into<String>) -> anyhow::Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ToUserError<T> for Result<T, E> {
    fn user_error(self, msg: impl Into<String>) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::Error::from(e).context(UserError::new(msg)))
    }
}

pub fn get_user_message(error: &anyhow::Error) -> String {
    // Looks through context layers, which chain() alone does not expose by type
    if let Some(user_error) = error.downcast_ref::<UserError>() {
        return user_error.msg.clone();
    }
    if let Some(import_error) = error.downcast_ref::<ImportError>() {
        return import_error.user_message();
    }
    for cause in error.chain() {
        if let Some(user_error) = cause.downcast_ref::<UserError>() {
            return user_error.msg.clone();
        }
        if let Some(import_error) = cause.downcast_ref::<ImportError>() {
            return import_error.user_message();
        }
        if let Some(structural) = cause.downcast_ref::<StructuralError>() {
            return ImportError::from(structural.clone()).user_message();
        }
    }
    "An unknown error occurred".to_string()
}
