use std::{fmt::Display, io};

use smol_str::SmolStr;
use thiserror::Error;

/// Configuration and protocol errors.
///
/// These stop a run before any check executes. Failures inside conditions
/// and checks are never reported this way; they become events.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Profile uses names that are not declared in its namespace: {}", .0.join(", "))]
    UnknownName(Vec<SmolStr>),
    #[error("Condition '{name}' is a circular dependency in {}", .path.join(" -> "))]
    CircularDependency { name: SmolStr, path: Vec<SmolStr> },
    #[error("Check id '{0}' is not unique")]
    DuplicateCheckId(SmolStr),
    #[error("Name '{name}' is already registered as {existing}, requested registering as {requested}")]
    NamespaceCollision {
        name: SmolStr,
        existing: &'static str,
        requested: &'static str,
    },
    #[error("Alias for '{0}' has a circular reference")]
    CircularAlias(SmolStr),
    #[error("Derived iterable '{plural}' uses condition '{condition}' which uses no iterated arguments")]
    DerivedIterableWithoutIterargs { plural: SmolStr, condition: SmolStr },
    #[error("Inconsistent iterated argument '{0}'")]
    InconsistentIterarg(SmolStr),
    #[error("No section named '{0}'")]
    UnknownSection(SmolStr),
    #[error("Values are missing the iterable '{0}'")]
    MissingIterable(SmolStr),
    #[error("Validation of expected values failed:\n{0}")]
    ValueValidation(String),
    #[error("Values entry '{0}' collides with the profile namespace")]
    ValueCollision(SmolStr),
    #[error("Unknown status '{0}'")]
    UnknownStatus(String),
    #[error("Order item '{0}' is not an iterated argument nor a known token")]
    UnknownOrderToken(SmolStr),
    #[error("Unable to decode identity '{0}'")]
    BadIdentity(String),
    #[error("Identity {0} is not part of the execution order")]
    NotInOrder(String),
    #[error("A worker failed: '{0}'")]
    WorkerFailed(String),
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// An error raised by a condition or check body.
///
/// Converted into data (a missing value, or an ERROR log line) at the
/// runner boundary; never propagates past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckError {
    message: String,
}

impl CheckError {
    pub fn new(message: impl Display) -> Self {
        CheckError {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CheckError {}

impl From<String> for CheckError {
    fn from(message: String) -> Self {
        CheckError { message }
    }
}

impl From<&str> for CheckError {
    fn from(message: &str) -> Self {
        CheckError {
            message: message.to_string(),
        }
    }
}

impl From<io::Error> for CheckError {
    fn from(e: io::Error) -> Self {
        CheckError::new(e)
    }
}
