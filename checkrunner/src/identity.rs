//! Names every event: which section, which check, which concrete inputs.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Concrete bindings of iterated arguments, `(singular name, index)`.
///
/// Kept sorted by name so equal bindings compare and hash equal no matter
/// the order expansion produced them in.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IterArgs(Vec<(SmolStr, usize)>);

impl IterArgs {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, index)| *index)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, usize)> {
        self.0.iter().map(|(name, index)| (name, *index))
    }

    /// Same bindings plus `name = index`, replacing an existing binding.
    pub fn with(&self, name: impl Into<SmolStr>, index: usize) -> Self {
        let name = name.into();
        let mut bindings: Vec<_> = self
            .iter()
            .filter(|(n, _)| **n != name)
            .map(|(n, i)| (n.clone(), i))
            .collect();
        bindings.push((name, index));
        bindings.into_iter().collect()
    }

    /// Only the bindings whose name satisfies `keep`.
    pub fn filter(&self, keep: impl Fn(&str) -> bool) -> Self {
        self.iter()
            .filter(|(name, _)| keep(name))
            .map(|(n, i)| (n.clone(), i))
            .collect()
    }
}

impl FromIterator<(SmolStr, usize)> for IterArgs {
    fn from_iter<T: IntoIterator<Item = (SmolStr, usize)>>(iter: T) -> Self {
        let mut bindings: Vec<_> = iter.into_iter().collect();
        bindings.sort();
        bindings.dedup_by(|a, b| a.0 == b.0);
        IterArgs(bindings)
    }
}

impl<'a> FromIterator<(&'a str, usize)> for IterArgs {
    fn from_iter<T: IntoIterator<Item = (&'a str, usize)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(name, index)| (SmolStr::new(name), index))
            .collect()
    }
}

impl Display for IterArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("(")?;
        for (i, (name, index)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}:{index}")?;
        }
        f.write_str(")")
    }
}

/// `(section, check, iterargs)`; run scoped events have neither section nor check.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub section: Option<SmolStr>,
    pub check: Option<SmolStr>,
    pub iterargs: IterArgs,
}

impl Identity {
    /// The identity of START and END.
    pub fn run() -> Self {
        Default::default()
    }

    pub fn section(section: impl Into<SmolStr>) -> Self {
        Identity {
            section: Some(section.into()),
            ..Default::default()
        }
    }

    pub fn check(section: impl Into<SmolStr>, check: impl Into<SmolStr>, iterargs: IterArgs) -> Self {
        Identity {
            section: Some(section.into()),
            check: Some(check.into()),
            iterargs,
        }
    }

    pub fn is_check(&self) -> bool {
        self.check.is_some()
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.section, &self.check) {
            (Some(section), Some(check)) => write!(f, "{section}/{check}{}", self.iterargs),
            (Some(section), None) => write!(f, "{section}"),
            (None, Some(check)) => write!(f, "{check}{}", self.iterargs),
            (None, None) => f.write_str("<run>"),
        }
    }
}
