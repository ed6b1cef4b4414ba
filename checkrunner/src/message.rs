//! What checks say about the things they inspect.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::Status;

/// A machine readable code plus human text.
///
/// The code is the stable part other tools key off of, the text is free form.
/// A bare string coerces into a message without a code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    code: Option<SmolStr>,
    message: String,
}

impl Message {
    pub fn new(code: impl Into<SmolStr>, message: impl Into<String>) -> Self {
        Message {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.message
    }

    /// Same code, different text.
    pub fn with_text(&self, message: impl Into<String>) -> Self {
        Message {
            code: self.code.clone(),
            message: message.into(),
        }
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Message {
            code: None,
            message: value.to_string(),
        }
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Message {
            code: None,
            message: value,
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} [code: {code}]", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// One status line produced while running a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subresult {
    pub status: Status,
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl Subresult {
    pub fn new(status: Status, message: impl Into<Message>) -> Self {
        Subresult {
            status,
            message: message.into(),
            traceback: None,
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    pub fn debug(message: impl Into<Message>) -> Self {
        Subresult::new(Status::Debug, message)
    }

    pub fn info(message: impl Into<Message>) -> Self {
        Subresult::new(Status::Info, message)
    }

    pub fn skip(message: impl Into<Message>) -> Self {
        Subresult::new(Status::Skip, message)
    }

    pub fn pass(message: impl Into<Message>) -> Self {
        Subresult::new(Status::Pass, message)
    }

    pub fn warn(message: impl Into<Message>) -> Self {
        Subresult::new(Status::Warn, message)
    }

    pub fn fail(message: impl Into<Message>) -> Self {
        Subresult::new(Status::Fail, message)
    }

    pub fn error(message: impl Into<Message>) -> Self {
        Subresult::new(Status::Error, message)
    }
}

impl<M: Into<Message>> From<(Status, M)> for Subresult {
    fn from((status, message): (Status, M)) -> Self {
        Subresult::new(status, message)
    }
}
