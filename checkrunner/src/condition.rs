//! Named, cached, derived values that checks depend on.

use std::{fmt::Debug, sync::Arc};

use smol_str::SmolStr;

use crate::{Args, CheckError, Value};

pub type ConditionFn = dyn Fn(&Args) -> Result<Option<Value>, CheckError> + Send + Sync;

/// A named pure function of iterated arguments, other conditions and values.
///
/// `Ok(None)` means the condition is undefined for the given inputs.
#[derive(Clone)]
pub struct Condition {
    name: SmolStr,
    args: Vec<SmolStr>,
    func: Arc<ConditionFn>,
}

impl Condition {
    pub fn new<F>(name: impl Into<SmolStr>, args: &[&str], func: F) -> Self
    where
        F: Fn(&Args) -> Result<Option<Value>, CheckError> + Send + Sync + 'static,
    {
        Condition {
            name: name.into(),
            args: args.iter().map(|a| SmolStr::new(a)).collect(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn args(&self) -> &[SmolStr] {
        &self.args
    }

    pub(crate) fn call(&self, args: &Args) -> Result<Option<Value>, CheckError> {
        (self.func)(args)
    }
}

impl Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

/// A condition reference as written on a check, possibly negated.
///
/// Parsed from `"X"`, `"not X"` or `"!X"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionExpr {
    pub negated: bool,
    pub name: SmolStr,
}

impl ConditionExpr {
    pub fn parse(expr: &str) -> Self {
        let stripped = expr.trim();
        let (negated, name) = if let Some(rest) = stripped.strip_prefix("not ") {
            (true, rest)
        } else if let Some(rest) = stripped.strip_prefix('!') {
            (true, rest)
        } else {
            (false, stripped)
        };
        ConditionExpr {
            negated,
            name: name.trim().into(),
        }
    }

    /// Whether a resolved value satisfies this expression.
    pub fn is_met(&self, truthy: bool) -> bool {
        truthy != self.negated
    }
}

impl std::fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negated {
            write!(f, "not {}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}
