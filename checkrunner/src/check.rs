//! Check definitions and the arguments handed to their bodies.

use std::{any::Any, collections::HashMap, fmt::Debug, sync::Arc};

use smol_str::SmolStr;

use crate::{CheckError, ConditionExpr, IterArgs, Subresult, Value};

pub type CheckFn = dyn Fn(&Args) -> Result<CheckOutput, CheckError> + Send + Sync;

/// Lazily produced results of one check invocation.
pub type SubresultStream = Box<dyn Iterator<Item = Result<Subresult, CheckError>> + Send>;

/// What a check body hands back.
///
/// Either a single result, or a stream the runner pulls one item at a time
/// and reports as soon as each arrives. An `Err` item ends the stream.
pub enum CheckOutput {
    Single(Subresult),
    Stream(SubresultStream),
}

impl CheckOutput {
    pub fn single(result: impl Into<Subresult>) -> Self {
        CheckOutput::Single(result.into())
    }

    pub fn results(results: Vec<Subresult>) -> Self {
        CheckOutput::Stream(Box::new(results.into_iter().map(Ok)))
    }

    pub fn stream<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Result<Subresult, CheckError>>,
        I::IntoIter: Send + 'static,
    {
        CheckOutput::Stream(Box::new(iter.into_iter()))
    }

    /// Collapse both shapes into one stream.
    pub fn into_stream(self) -> SubresultStream {
        match self {
            CheckOutput::Single(result) => Box::new(std::iter::once(Ok(result))),
            CheckOutput::Stream(stream) => stream,
        }
    }
}

impl From<Subresult> for CheckOutput {
    fn from(value: Subresult) -> Self {
        CheckOutput::Single(value)
    }
}

impl FromIterator<Subresult> for CheckOutput {
    fn from_iter<T: IntoIterator<Item = Subresult>>(iter: T) -> Self {
        CheckOutput::results(iter.into_iter().collect())
    }
}

impl Debug for CheckOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckOutput::Single(result) => f.debug_tuple("Single").field(result).finish(),
            CheckOutput::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// One independent validation rule.
#[derive(Clone)]
pub struct Check {
    id: SmolStr,
    description: String,
    rationale: Option<String>,
    proposal: Vec<String>,
    severity: Option<u8>,
    conditions: Vec<ConditionExpr>,
    args: Vec<SmolStr>,
    func: Arc<CheckFn>,
}

impl Check {
    pub fn new<F>(id: impl Into<SmolStr>, description: impl Into<String>, args: &[&str], func: F) -> Self
    where
        F: Fn(&Args) -> Result<CheckOutput, CheckError> + Send + Sync + 'static,
    {
        Check {
            id: id.into(),
            description: description.into(),
            rationale: None,
            proposal: Vec::new(),
            severity: None,
            conditions: Vec::new(),
            args: args.iter().map(|a| SmolStr::new(a)).collect(),
            func: Arc::new(func),
        }
    }

    /// Conditions that must all hold for the body to run, e.g. `["not is_cff"]`.
    pub fn with_conditions(mut self, conditions: &[&str]) -> Self {
        self.conditions = conditions.iter().map(|c| ConditionExpr::parse(c)).collect();
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_proposal(mut self, proposal: impl Into<String>) -> Self {
        self.proposal.push(proposal.into());
        self
    }

    pub fn with_severity(mut self, severity: u8) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn id(&self) -> &SmolStr {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn rationale(&self) -> Option<&str> {
        self.rationale.as_deref()
    }

    pub fn proposal(&self) -> &[String] {
        &self.proposal
    }

    pub fn severity(&self) -> Option<u8> {
        self.severity
    }

    pub fn conditions(&self) -> &[ConditionExpr] {
        &self.conditions
    }

    pub fn args(&self) -> &[SmolStr] {
        &self.args
    }

    pub(crate) fn call(&self, args: &Args) -> Result<CheckOutput, CheckError> {
        (self.func)(args)
    }
}

impl Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check")
            .field("id", &self.id)
            .field("conditions", &self.conditions)
            .field("args", &self.args)
            .finish()
    }
}

/// Resolved parameters for a condition or check body.
#[derive(Debug, Default, Clone)]
pub struct Args {
    values: HashMap<SmolStr, Value>,
}

impl Args {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<SmolStr>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn value(&self, name: &str) -> Result<&Value, CheckError> {
        self.values
            .get(name)
            .ok_or_else(|| CheckError::new(format!("No argument named '{name}'")))
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, CheckError> {
        let value = self.value(name)?;
        value.downcast::<T>().ok_or_else(|| {
            CheckError::new(format!(
                "Argument '{name}' is a {}, not a {}",
                value.type_name(),
                std::any::type_name::<T>()
            ))
        })
    }

    /// The elements of a list valued argument, e.g. a plural iterated argument.
    pub fn list<T: Any + Send + Sync>(&self, name: &str) -> Result<Vec<Arc<T>>, CheckError> {
        let value = self.value(name)?;
        let items = value
            .as_list()
            .ok_or_else(|| CheckError::new(format!("Argument '{name}' is not a list")))?;
        items
            .iter()
            .map(|item| {
                item.downcast::<T>().ok_or_else(|| {
                    CheckError::new(format!(
                        "Argument '{name}' holds a {}, not a {}",
                        item.type_name(),
                        std::any::type_name::<T>()
                    ))
                })
            })
            .collect()
    }

    /// The `(bindings, value)` pairs of a non-simple derived iterable.
    pub fn pairs(&self, name: &str) -> Result<Vec<(IterArgs, Value)>, CheckError> {
        let items = self.list::<(IterArgs, Value)>(name)?;
        Ok(items.iter().map(|pair| (pair.0.clone(), pair.1.clone())).collect())
    }
}
