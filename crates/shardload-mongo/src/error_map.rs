//! Translates driver errors into the provisioning taxonomy.
//!
//! Server error codes stay inside this module; callers only ever see
//! [`StepOutcome::AlreadySatisfied`] or a classified [`Error`].

use mongodb::error::{Error as MongoError, ErrorKind};

use shardload_core::error::Error;
use shardload_core::types::StepOutcome;

pub const NAMESPACE_EXISTS: i32 = 48;
pub const ALREADY_INITIALIZED: i32 = 23;
pub const USER_ALREADY_EXISTS: i32 = 51003;

/// The parts of a driver error the classification depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorParts {
    pub code: Option<i32>,
    pub message: String,
    pub unreachable: bool,
}

impl From<&MongoError> for ErrorParts {
    fn from(err: &MongoError) -> Self {
        let code = match err.kind.as_ref() {
            ErrorKind::Command(command) => Some(command.code),
            _ => None,
        };
        let unreachable = matches!(
            err.kind.as_ref(),
            ErrorKind::ServerSelection { .. }
                | ErrorKind::Io(_)
                | ErrorKind::ConnectionPoolCleared { .. }
                | ErrorKind::DnsResolve { .. }
        );
        Self { code, message: err.to_string(), unreachable }
    }
}

/// `already` lists the codes that mean the step's goal is already met.
/// "already" in the server message counts too, since older servers report
/// some of these states without a dedicated code.
pub fn classify(
    operation: &'static str,
    target: &str,
    parts: ErrorParts,
    already: &[i32],
) -> Result<StepOutcome, Error> {
    if parts.unreachable {
        return Err(Error::Unreachable { operation, reason: parts.message });
    }
    let already_by_code = parts.code.is_some_and(|c| already.contains(&c));
    let already_by_message =
        !already.is_empty() && parts.message.to_lowercase().contains("already");
    if already_by_code || already_by_message {
        let note = format!("{} on {}: {}", operation, target, parts.message);
        return Ok(StepOutcome::AlreadySatisfied(note));
    }
    Err(Error::rejected(operation, target, parts.message))
}

/// For operations with no "already done" state.
pub fn fatal(operation: &'static str, target: &str, err: &MongoError) -> Error {
    match classify(operation, target, ErrorParts::from(err), &[]) {
        Err(e) => e,
        Ok(_) => Error::rejected(operation, target, err.to_string()),
    }
}
