//! Re-statusing check results by message code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{Status, Subresult};

/// Replacement for results carrying a given code. `None` keeps the original.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Override {
    pub fn status(status: Status) -> Self {
        Override {
            status: Some(status),
            message: None,
        }
    }
}

/// Check id to message code to override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overrides(HashMap<SmolStr, HashMap<SmolStr, Override>>);

impl Overrides {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with(mut self, check: impl Into<SmolStr>, code: impl Into<SmolStr>, rule: Override) -> Self {
        self.insert(check, code, rule);
        self
    }

    pub fn insert(&mut self, check: impl Into<SmolStr>, code: impl Into<SmolStr>, rule: Override) {
        self.0
            .entry(check.into())
            .or_default()
            .insert(code.into(), rule);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rewrite `result` if a rule for `check` matches its code.
    ///
    /// A matching rule also produces a DEBUG note saying what changed, to be
    /// reported right before the rewritten result.
    pub fn apply(&self, check: &str, result: Subresult) -> (Option<Subresult>, Subresult) {
        let Some(rule) = result
            .message
            .code()
            .and_then(|code| self.0.get(check)?.get(code))
        else {
            return (None, result);
        };

        let status = rule.status.unwrap_or(result.status);
        let message = match &rule.message {
            Some(text) => result.message.with_text(text.clone()),
            None => result.message.clone(),
        };
        let status_changed = status != result.status;
        let message_changed = message != result.message;
        let note = match (status_changed, message_changed) {
            (false, false) => "A check status override rule matched but did not change the resulting status.".to_string(),
            (true, true) => format!(
                "Overridden check status and message, original: {} {}",
                result.status, result.message
            ),
            (true, false) => format!("Overridden check status, original: {}", result.status),
            (false, true) => format!("Overridden check message, original: {}", result.message),
        };
        let rewritten = Subresult {
            status,
            message,
            traceback: result.traceback,
        };
        (Some(Subresult::debug(note)), rewritten)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::Message;

    use super::*;

    #[test]
    fn rewrites_matching_code() {
        let overrides = Overrides::new().with("fstype", "drm", Override::status(Status::Warn));
        let (note, result) = overrides.apply("fstype", Subresult::fail(Message::new("drm", "fsType is 2")));
        assert_eq!(Status::Warn, result.status);
        assert_eq!("fsType is 2", result.message.text());
        let note = note.unwrap();
        assert_eq!(Status::Debug, note.status);
        assert_eq!("Overridden check status, original: FAIL", note.message.text());
    }

    #[test]
    fn leaves_others_alone() {
        let overrides = Overrides::new().with("fstype", "drm", Override::status(Status::Warn));
        let original = Subresult::fail(Message::new("other", "x"));
        assert_eq!((None, original.clone()), overrides.apply("fstype", original.clone()));
        assert_eq!((None, original.clone()), overrides.apply("another", original.clone()));
        let uncoded = Subresult::fail("no code");
        assert_eq!((None, uncoded.clone()), overrides.apply("fstype", uncoded));
    }

    #[test]
    fn message_only() {
        let overrides = Overrides::new().with(
            "fstype",
            "drm",
            Override {
                status: None,
                message: Some("we know".into()),
            },
        );
        let (note, result) = overrides.apply("fstype", Subresult::fail(Message::new("drm", "fsType is 2")));
        assert_eq!(Status::Fail, result.status);
        assert_eq!(Some("drm"), result.message.code());
        assert_eq!("we know", result.message.text());
        assert!(note.unwrap().message.text().starts_with("Overridden check message"));
    }

    #[test]
    fn deserializes_from_yaml_like_json() {
        let overrides: Overrides =
            serde_json::from_str(r#"{"fstype": {"drm": {"status": "WARN"}}}"#).unwrap();
        assert_eq!(Overrides::new().with("fstype", "drm", Override::status(Status::Warn)), overrides);
    }
}
