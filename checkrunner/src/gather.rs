//! Regrouping a finished event stream for reporters that print by font, by
//! check, or by any other iterated argument.

use std::str::FromStr;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::{order::CHECK_TOKENS, Event};

/// What to group check events by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatherBy {
    /// The index bound to this iterated argument
    Iterarg(SmolStr),
    /// The check id
    Check,
}

impl FromStr for GatherBy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if CHECK_TOKENS.contains(&s) {
            GatherBy::Check
        } else {
            GatherBy::Iterarg(s.into())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    /// Run and section framing, and checks that don't use the argument
    Ungrouped,
    Index(usize),
    Check(SmolStr),
}

/// Partition `events` into groups, keys sorted, preserving the relative
/// order of events inside each group.
pub fn gather_by(events: &[Event], by: &GatherBy) -> IndexMap<GroupKey, Vec<Event>> {
    let mut groups: IndexMap<GroupKey, Vec<Event>> = IndexMap::new();
    for event in events {
        let key = match (event.identity(), by) {
            (Some(identity), GatherBy::Check) => match &identity.check {
                Some(check) => GroupKey::Check(check.clone()),
                None => GroupKey::Ungrouped,
            },
            (Some(identity), GatherBy::Iterarg(name)) if identity.is_check() => {
                match identity.iterargs.get(name) {
                    Some(index) => GroupKey::Index(index),
                    None => GroupKey::Ungrouped,
                }
            }
            _ => GroupKey::Ungrouped,
        };
        groups.entry(key).or_default().push(event.clone());
    }
    groups.sort_keys();
    groups
}
