//! Per runner memoization of condition values.

use std::{collections::HashMap, fmt::Display};

use log::trace;
use smol_str::SmolStr;

use crate::{IterArgs, Value};

/// Why a name has no value.
///
/// Both shapes are cached, so a failing condition is never re-run for the
/// same bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingValue {
    /// Nothing provides the name, or its condition returned nothing
    Undefined(SmolStr),
    /// The condition, or something it needs, failed
    Failed { name: SmolStr, message: String },
}

impl MissingValue {
    pub fn name(&self) -> &SmolStr {
        match self {
            MissingValue::Undefined(name) => name,
            MissingValue::Failed { name, .. } => name,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MissingValue::Failed { .. })
    }
}

impl Display for MissingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingValue::Undefined(name) => write!(f, "Value '{name}' is undefined"),
            MissingValue::Failed { name, message } => {
                write!(f, "Condition '{name}' failed: {message}")
            }
        }
    }
}

/// A name plus only the iterarg bindings its value can vary with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: SmolStr,
    pub iterargs: IterArgs,
}

#[derive(Debug, Clone)]
pub enum CachedValue {
    Value(Value),
    Missing(MissingValue),
}

impl From<Result<Value, MissingValue>> for CachedValue {
    fn from(value: Result<Value, MissingValue>) -> Self {
        match value {
            Ok(v) => CachedValue::Value(v),
            Err(e) => CachedValue::Missing(e),
        }
    }
}

impl From<CachedValue> for Result<Value, MissingValue> {
    fn from(value: CachedValue) -> Self {
        match value {
            CachedValue::Value(v) => Ok(v),
            CachedValue::Missing(e) => Err(e),
        }
    }
}

/// Owned by exactly one runner, never shared between threads.
#[derive(Debug, Clone)]
pub struct ConditionCache {
    enabled: bool,
    entries: HashMap<CacheKey, CachedValue>,
    hits: usize,
    misses: usize,
}

impl Default for ConditionCache {
    fn default() -> Self {
        ConditionCache::new(true)
    }
}

impl ConditionCache {
    pub fn new(enabled: bool) -> Self {
        ConditionCache {
            enabled,
            entries: Default::default(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn lookup(&mut self, key: &CacheKey) -> Option<Result<Value, MissingValue>> {
        if !self.enabled {
            self.misses += 1;
            return None;
        }
        match self.entries.get(key) {
            Some(cached) => {
                trace!("Cache hit {} {}", key.name, key.iterargs);
                self.hits += 1;
                Some(cached.clone().into())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn store(&mut self, key: CacheKey, value: &Result<Value, MissingValue>) {
        if self.enabled {
            self.entries.insert(key, value.clone().into());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
