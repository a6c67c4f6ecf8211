use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// Connection, timeout and server-selection failures. Fatal for the whole run.
    #[error("Store unreachable during {operation}: {reason}")]
    Unreachable { operation: &'static str, reason: String },

    /// Missing or unreadable source file, malformed JSON, bad required field.
    #[error("Data format error in {dataset}: {reason}")]
    DataFormat { dataset: String, reason: String },

    /// The store refused a write or answered with an unexpected server error.
    #[error("Store rejected {operation} on {target}: {reason}")]
    StoreRejection { operation: &'static str, target: String, reason: String },
}

impl Error {
    pub fn data_format(dataset: &str, reason: impl Into<String>) -> Self {
        Self::DataFormat { dataset: dataset.to_string(), reason: reason.into() }
    }

    pub fn rejected(operation: &'static str, target: &str, reason: impl Into<String>) -> Self {
        Self::StoreRejection { operation, target: target.to_string(), reason: reason.into() }
    }

    /// Errors that must stop every remaining dataset, not just the current one.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::InvalidConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
