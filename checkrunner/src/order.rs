//! Expansion of checks over iterated arguments into a concrete, ordered
//! list of invocations.
//!
//! Each section is expanded on its own, following a list of order tokens:
//!
//! * an iterated argument name, e.g. `font`, groups by that argument's value;
//! * `*iterargs` stands for every declared iterated argument not yet named,
//!   in declaration order, and is appended when absent;
//! * `*check` (or `*test`) groups by check across all combinations of the
//!   arguments that follow it.
//!
//! A check only ever runs over the iterated arguments it transitively needs,
//! so a check reading only `fonts` runs once no matter how many fonts there are.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{Check, Error, Identity, IterArgs, Profile, Section};

pub const ITERARGS_TOKEN: &str = "*iterargs";
pub const CHECK_TOKENS: [&str; 2] = ["*check", "*test"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum OrderToken {
    Iterarg(SmolStr),
    ByCheck,
}

/// Immutable list of check invocations for one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionOrder(Vec<Identity>);

impl ExecutionOrder {
    pub fn new(identities: Vec<Identity>) -> Self {
        ExecutionOrder(identities)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.0.iter()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.0.contains(identity)
    }

    pub fn identities(&self) -> &[Identity] {
        &self.0
    }

    /// Section names in the order they first appear.
    pub fn sections(&self) -> Vec<SmolStr> {
        let mut seen = BTreeSet::new();
        self.0
            .iter()
            .filter_map(|id| id.section.clone())
            .filter(|s| seen.insert(s.clone()))
            .collect()
    }

    /// Number of invocations per section.
    pub fn section_sizes(&self) -> IndexMap<SmolStr, usize> {
        let mut sizes = IndexMap::new();
        for section in self.0.iter().filter_map(|id| id.section.clone()) {
            *sizes.entry(section).or_default() += 1;
        }
        sizes
    }

    /// JSON text naming the section, check id and sorted iterarg bindings.
    pub fn serialize_identity(identity: &Identity) -> Result<String, Error> {
        Ok(serde_json::to_string(identity)?)
    }

    pub fn deserialize_identity(text: &str) -> Result<Identity, Error> {
        let identity: Identity =
            serde_json::from_str(text).map_err(|e| Error::BadIdentity(format!("{text}: {e}")))?;
        // re-sort in case someone else produced the text
        Ok(Identity {
            iterargs: identity.iterargs.iter().map(|(n, i)| (n.clone(), i)).collect(),
            ..identity
        })
    }
}

impl<'a> IntoIterator for &'a ExecutionOrder {
    type Item = &'a Identity;
    type IntoIter = std::slice::Iter<'a, Identity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

struct Item<'a> {
    check: &'a Check,
    needs: Vec<SmolStr>,
}

impl Profile {
    /// Compute the full ordered list of invocations.
    ///
    /// `lengths` maps each singular iterated argument to the size of its input
    /// collection. Explicit filters keep checks whose id contains any of the
    /// substrings, then exclusions drop checks whose id contains any of theirs.
    pub fn execution_order(
        &self,
        lengths: &IndexMap<SmolStr, usize>,
        custom_order: Option<&[SmolStr]>,
        explicit_checks: &[SmolStr],
        exclude_checks: &[SmolStr],
    ) -> Result<ExecutionOrder, Error> {
        let mut identities = Vec::new();
        for section in self.sections() {
            let tokens = self.order_tokens(custom_order.unwrap_or(section.order()))?;
            let items: Vec<_> = section
                .checks()
                .iter()
                .filter(|check| {
                    explicit_checks.is_empty()
                        || explicit_checks.iter().any(|s| check.id().contains(s.as_str()))
                })
                .filter(|check| !exclude_checks.iter().any(|s| check.id().contains(s.as_str())))
                .map(|check| Item {
                    check,
                    needs: self.check_iterargs(check),
                })
                .collect();
            let refs: Vec<_> = items.iter().collect();
            expand(section, &tokens, &refs, lengths, &IterArgs::new(), &mut identities);
        }
        debug!("Execution order has {} entries", identities.len());
        Ok(ExecutionOrder(identities))
    }

    fn order_tokens(&self, order: &[SmolStr]) -> Result<Vec<OrderToken>, Error> {
        let mut stack: Vec<SmolStr> = order.to_vec();
        if !stack.iter().any(|t| t == ITERARGS_TOKEN) {
            stack.push(ITERARGS_TOKEN.into());
        }
        stack.reverse();

        let mut seen = BTreeSet::new();
        let mut tokens = Vec::new();
        while let Some(item) = stack.pop() {
            let key = if CHECK_TOKENS.contains(&item.as_str()) {
                SmolStr::new(CHECK_TOKENS[0])
            } else {
                item.clone()
            };
            if !seen.insert(key) {
                continue;
            }
            if item == ITERARGS_TOKEN {
                stack.extend(self.iterargs().keys().rev().cloned());
            } else if CHECK_TOKENS.contains(&item.as_str()) {
                tokens.push(OrderToken::ByCheck);
            } else if self.iterargs().contains_key(&item) {
                tokens.push(OrderToken::Iterarg(item));
            } else {
                return Err(Error::UnknownOrderToken(item));
            }
        }
        Ok(tokens)
    }
}

fn expand(
    section: &Section,
    tokens: &[OrderToken],
    items: &[&Item],
    lengths: &IndexMap<SmolStr, usize>,
    bound: &IterArgs,
    out: &mut Vec<Identity>,
) {
    if items.is_empty() {
        return;
    }
    let emit = |item: &Item, out: &mut Vec<Identity>| {
        out.push(Identity::check(section.name().clone(), item.check.id().clone(), bound.clone()));
    };
    let Some((token, rest)) = tokens.split_first() else {
        items.iter().for_each(|item| emit(item, out));
        return;
    };

    let remaining: BTreeSet<&SmolStr> = tokens
        .iter()
        .filter_map(|t| match t {
            OrderToken::Iterarg(name) => Some(name),
            OrderToken::ByCheck => None,
        })
        .collect();

    let mut saturated = Vec::new();
    let mut without = Vec::new();
    let mut with = Vec::new();
    for item in items.iter().copied() {
        if !item.needs.iter().any(|n| remaining.contains(n)) {
            saturated.push(item);
            continue;
        }
        match token {
            OrderToken::Iterarg(name) if !item.needs.contains(name) => without.push(item),
            _ => with.push(item),
        }
    }

    saturated.into_iter().for_each(|item| emit(item, out));
    expand(section, rest, &without, lengths, bound, out);
    match token {
        OrderToken::ByCheck => {
            for item in with {
                expand(section, rest, &[item], lengths, bound, out);
            }
        }
        OrderToken::Iterarg(name) => {
            if with.is_empty() {
                return;
            }
            let len = lengths.get(name).copied().unwrap_or_default();
            for index in 0..len {
                expand(section, rest, &with, lengths, &bound.with(name.clone(), index), out);
            }
        }
    }
}
