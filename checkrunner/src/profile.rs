//! The validated, immutable registry of sections, checks, conditions and
//! iterated arguments.
//!
//! Profiles are assembled with a [`ProfileBuilder`]; every name a check or a
//! condition uses must resolve at build time, so a broken profile never
//! reaches a runner.

use std::{
    collections::{BTreeSet, HashMap},
    fmt::Debug,
    sync::Arc,
};

use indexmap::IndexMap;
use log::debug;
use smol_str::SmolStr;

use crate::{Check, Condition, Error, Value, Values};

/// Names any check or condition may ask for without registering them.
pub const PSEUDO_VALUES: [&str; 2] = ["config", "values"];

/// An ordered, named list of checks.
#[derive(Debug, Clone)]
pub struct Section {
    name: SmolStr,
    checks: Vec<Check>,
    order: Vec<SmolStr>,
}

impl Section {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Section {
            name: name.into(),
            checks: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Default order tokens for this section, see [`crate::ExecutionOrder`].
    pub fn with_order(mut self, order: &[&str]) -> Self {
        self.order = order.iter().map(|t| SmolStr::new(t)).collect();
        self
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn order(&self) -> &[SmolStr] {
        &self.order
    }
}

type Validator = dyn Fn(&Value) -> Result<(), String> + Send + Sync;

/// A value the profile expects to be supplied, optionally with a default.
#[derive(Clone)]
pub struct ExpectedValue {
    name: SmolStr,
    default: Option<Value>,
    validator: Option<Arc<Validator>>,
}

impl ExpectedValue {
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    fn validate(&self, value: &Value) -> Result<(), String> {
        match &self.validator {
            Some(validator) => validator(value),
            None => Ok(()),
        }
    }
}

impl Debug for ExpectedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpectedValue")
            .field("name", &self.name)
            .field("default", &self.default)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// A plural name whose value is a condition evaluated over every combination
/// of the iterated arguments that condition needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedIterable {
    pub condition: SmolStr,
    /// Plain values rather than `(iterargs, value)` pairs
    pub simple: bool,
}

/// What kind of thing a name in the profile namespace refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Iterarg,
    Iterable,
    DerivedIterable,
    Alias,
    Condition,
    ExpectedValue,
}

impl NameKind {
    pub fn name(&self) -> &'static str {
        match self {
            NameKind::Iterarg => "iterarg",
            NameKind::Iterable => "iterable",
            NameKind::DerivedIterable => "derived_iterable",
            NameKind::Alias => "alias",
            NameKind::Condition => "condition",
            NameKind::ExpectedValue => "expected_value",
        }
    }
}

/// Assembles a [`Profile`]; registration errors surface from [`ProfileBuilder::build`].
#[derive(Debug)]
pub struct ProfileBuilder {
    name: SmolStr,
    namespace: HashMap<SmolStr, NameKind>,
    iterargs: IndexMap<SmolStr, SmolStr>,
    derived_iterables: IndexMap<SmolStr, DerivedIterable>,
    aliases: IndexMap<SmolStr, SmolStr>,
    conditions: IndexMap<SmolStr, Condition>,
    expected_values: IndexMap<SmolStr, ExpectedValue>,
    sections: IndexMap<SmolStr, Section>,
    errors: Vec<Error>,
}

impl ProfileBuilder {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        ProfileBuilder {
            name: name.into(),
            namespace: Default::default(),
            iterargs: Default::default(),
            derived_iterables: Default::default(),
            aliases: Default::default(),
            conditions: Default::default(),
            expected_values: Default::default(),
            sections: Default::default(),
            errors: Vec::new(),
        }
    }

    fn register(&mut self, name: &SmolStr, kind: NameKind) -> bool {
        if let Some(existing) = self.namespace.get(name) {
            self.errors.push(Error::NamespaceCollision {
                name: name.clone(),
                existing: existing.name(),
                requested: kind.name(),
            });
            return false;
        }
        self.namespace.insert(name.clone(), kind);
        true
    }

    /// Declare the axis `singular`, ranging over the input collection `plural`.
    pub fn iterarg(mut self, singular: impl Into<SmolStr>, plural: impl Into<SmolStr>) -> Self {
        let singular = singular.into();
        let plural = plural.into();
        let inconsistent = singular == plural
            || self.namespace.get(&singular) == Some(&NameKind::Iterable)
            || self.namespace.get(&plural) == Some(&NameKind::Iterarg)
            || self.iterargs.values().any(|p| *p == plural);
        if inconsistent {
            self.errors.push(Error::InconsistentIterarg(singular));
            return self;
        }
        if self.register(&singular, NameKind::Iterarg) && self.register(&plural, NameKind::Iterable) {
            self.iterargs.insert(singular, plural);
        }
        self
    }

    pub fn derived_iterable(
        mut self,
        plural: impl Into<SmolStr>,
        condition: impl Into<SmolStr>,
        simple: bool,
    ) -> Self {
        let plural = plural.into();
        if self.register(&plural, NameKind::DerivedIterable) {
            self.derived_iterables.insert(
                plural,
                DerivedIterable {
                    condition: condition.into(),
                    simple,
                },
            );
        }
        self
    }

    pub fn alias(mut self, name: impl Into<SmolStr>, target: impl Into<SmolStr>) -> Self {
        let name = name.into();
        if self.register(&name, NameKind::Alias) {
            self.aliases.insert(name, target.into());
        }
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        if self.register(condition.name(), NameKind::Condition) {
            self.conditions.insert(condition.name().clone(), condition);
        }
        self
    }

    pub fn expected_value(mut self, name: impl Into<SmolStr>, default: Option<Value>) -> Self {
        let name = name.into();
        if self.register(&name, NameKind::ExpectedValue) {
            self.expected_values.insert(
                name.clone(),
                ExpectedValue {
                    name,
                    default,
                    validator: None,
                },
            );
        }
        self
    }

    /// Attach a validator to an already declared expected value.
    pub fn validator<F>(mut self, name: &str, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        match self.expected_values.get_mut(name) {
            Some(expected) => expected.validator = Some(Arc::new(validator)),
            None => self.errors.push(Error::UnknownName(vec![name.into()])),
        }
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        match self.sections.get_mut(&section.name) {
            Some(existing) => {
                existing.checks.extend(section.checks);
                if existing.order.is_empty() {
                    existing.order = section.order;
                }
            }
            None => {
                self.sections.insert(section.name.clone(), section);
            }
        }
        self
    }

    pub fn check(mut self, section: &str, check: Check) -> Self {
        match self.sections.get_mut(section) {
            Some(section) => section.checks.push(check),
            None => self.errors.push(Error::UnknownSection(section.into())),
        }
        self
    }

    /// Validate and freeze.
    pub fn build(mut self) -> Result<Profile, Error> {
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }

        let mut ids = BTreeSet::new();
        for check in self.sections.values().flat_map(|s| s.checks.iter()) {
            if !ids.insert(check.id().clone()) {
                return Err(Error::DuplicateCheckId(check.id().clone()));
            }
        }

        let mut profile = Profile {
            name: self.name,
            namespace: self.namespace,
            iterargs: self.iterargs,
            derived_iterables: self.derived_iterables,
            aliases: self.aliases,
            conditions: self.conditions,
            expected_values: self.expected_values,
            sections: self.sections.into_values().collect(),
            condition_iterargs: Default::default(),
        };

        for name in profile.aliases.keys() {
            profile.try_resolve_alias(name)?;
        }
        profile.test_dependencies()?;
        profile.test_cycles()?;

        profile.condition_iterargs = profile
            .conditions
            .iter()
            .map(|(name, condition)| {
                let iterargs = profile.iterargs_of(&profile.aggregate_args(condition.args().iter()));
                (name.clone(), iterargs)
            })
            .collect();

        for (plural, derived) in profile.derived_iterables.iter() {
            if profile.condition_iterargs(&derived.condition).is_empty() {
                return Err(Error::DerivedIterableWithoutIterargs {
                    plural: plural.clone(),
                    condition: derived.condition.clone(),
                });
            }
        }

        debug!(
            "Profile '{}': {} sections, {} checks, {} conditions",
            profile.name,
            profile.sections.len(),
            ids.len(),
            profile.conditions.len()
        );
        Ok(profile)
    }
}

/// A validated registry, immutable and shareable across threads.
#[derive(Debug)]
pub struct Profile {
    name: SmolStr,
    namespace: HashMap<SmolStr, NameKind>,
    iterargs: IndexMap<SmolStr, SmolStr>,
    derived_iterables: IndexMap<SmolStr, DerivedIterable>,
    aliases: IndexMap<SmolStr, SmolStr>,
    conditions: IndexMap<SmolStr, Condition>,
    expected_values: IndexMap<SmolStr, ExpectedValue>,
    sections: Vec<Section>,
    /// Sorted iterated arguments each condition transitively needs
    condition_iterargs: HashMap<SmolStr, Vec<SmolStr>>,
}

impl Profile {
    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn checks(&self) -> impl Iterator<Item = &Check> {
        self.sections.iter().flat_map(|s| s.checks.iter())
    }

    pub fn get_check(&self, id: &str) -> Option<&Check> {
        self.checks().find(|c| c.id() == id)
    }

    /// Declared iterated arguments, singular to plural, in declaration order.
    pub fn iterargs(&self) -> &IndexMap<SmolStr, SmolStr> {
        &self.iterargs
    }

    pub fn plural_of(&self, singular: &str) -> Option<&SmolStr> {
        self.iterargs.get(singular)
    }

    pub fn condition(&self, name: &str) -> Option<&Condition> {
        self.conditions.get(name)
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.values()
    }

    pub fn derived_iterable(&self, plural: &str) -> Option<&DerivedIterable> {
        self.derived_iterables.get(plural)
    }

    pub fn expected_value(&self, name: &str) -> Option<&ExpectedValue> {
        self.expected_values.get(name)
    }

    pub fn kind(&self, name: &str) -> Option<NameKind> {
        self.namespace.get(name).copied()
    }

    pub fn has(&self, name: &str) -> bool {
        self.namespace.contains_key(name)
    }

    fn try_resolve_alias(&self, name: &str) -> Result<SmolStr, Error> {
        let mut current = SmolStr::new(name);
        let mut seen = BTreeSet::new();
        while let Some(target) = self.aliases.get(&current) {
            if !seen.insert(current.clone()) {
                return Err(Error::CircularAlias(name.into()));
            }
            current = target.clone();
        }
        Ok(current)
    }

    /// Follow aliases to the name they finally stand for.
    pub fn resolve_alias(&self, name: &str) -> SmolStr {
        // cycles are rejected by the builder
        self.try_resolve_alias(name).unwrap_or_else(|_| name.into())
    }

    fn is_known(&self, name: &str) -> bool {
        self.namespace.contains_key(name) || PSEUDO_VALUES.contains(&name)
    }

    /// Every name reachable from `roots` through aliases and condition parameters.
    pub fn aggregate_args<'a>(&self, roots: impl Iterator<Item = &'a SmolStr>) -> BTreeSet<SmolStr> {
        let mut pending: Vec<SmolStr> = roots.cloned().collect();
        let mut seen = BTreeSet::new();
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let resolved = self.resolve_alias(&name);
            if resolved != name {
                pending.push(resolved.clone());
            }
            if let Some(condition) = self.conditions.get(&resolved) {
                pending.extend(condition.args().iter().cloned());
            }
        }
        seen
    }

    /// Names a check depends on, directly or through its conditions.
    pub fn deep_dependencies(&self, check: &Check) -> BTreeSet<SmolStr> {
        let roots: Vec<SmolStr> = check
            .args()
            .iter()
            .cloned()
            .chain(check.conditions().iter().map(|c| c.name.clone()))
            .collect();
        self.aggregate_args(roots.iter())
    }

    fn iterargs_of(&self, names: &BTreeSet<SmolStr>) -> Vec<SmolStr> {
        // BTreeSet iteration is sorted
        names
            .iter()
            .filter(|name| self.iterargs.contains_key(*name))
            .cloned()
            .collect()
    }

    /// The iterated arguments a check runs over, sorted by name.
    pub fn check_iterargs(&self, check: &Check) -> Vec<SmolStr> {
        self.iterargs_of(&self.deep_dependencies(check))
    }

    /// The iterated arguments a condition's value varies with, sorted by name.
    pub fn condition_iterargs(&self, name: &str) -> &[SmolStr] {
        self.condition_iterargs
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Checks depending on any of `names`, or on all of them if `subset`.
    pub fn checks_by_dependencies(&self, names: &[&str], subset: bool) -> Vec<&Check> {
        self.checks()
            .filter(|check| {
                let deps = self.deep_dependencies(check);
                if subset {
                    names.iter().all(|n| deps.contains(*n))
                } else {
                    names.iter().any(|n| deps.contains(*n))
                }
            })
            .collect()
    }

    fn test_dependencies(&self) -> Result<(), Error> {
        let mut roots: Vec<SmolStr> = Vec::new();
        for check in self.checks() {
            roots.extend(check.args().iter().cloned());
            roots.extend(check.conditions().iter().map(|c| c.name.clone()));
        }
        for condition in self.conditions.values() {
            roots.extend(condition.args().iter().cloned());
        }
        roots.extend(self.aliases.values().cloned());
        roots.extend(self.derived_iterables.values().map(|d| d.condition.clone()));

        let unknown: BTreeSet<SmolStr> = self
            .aggregate_args(roots.iter())
            .into_iter()
            .filter(|name| !self.is_known(name))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::UnknownName(unknown.into_iter().collect()));
        }
        Ok(())
    }

    fn test_cycles(&self) -> Result<(), Error> {
        let mut done = BTreeSet::new();
        for name in self.conditions.keys() {
            let mut path = Vec::new();
            self.visit_condition(name, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit_condition(
        &self,
        name: &SmolStr,
        path: &mut Vec<SmolStr>,
        done: &mut BTreeSet<SmolStr>,
    ) -> Result<(), Error> {
        if done.contains(name) {
            return Ok(());
        }
        if path.contains(name) {
            path.push(name.clone());
            return Err(Error::CircularDependency {
                name: name.clone(),
                path: path.clone(),
            });
        }
        let Some(condition) = self.conditions.get(name) else {
            return Ok(());
        };
        path.push(name.clone());
        for arg in condition.args() {
            let target = self.resolve_alias(arg);
            if self.conditions.contains_key(&target) {
                self.visit_condition(&target, path, done)?;
            } else if let Some(derived) = self.derived_iterables.get(&target) {
                // a derived iterable evaluates its condition
                path.push(target.clone());
                self.visit_condition(&derived.condition, path, done)?;
                path.pop();
            }
        }
        path.pop();
        done.insert(name.clone());
        Ok(())
    }

    /// Check supplied values against the expected values they fill in.
    pub fn validate_values(&self, values: &Values) -> Result<(), Error> {
        let mut messages = Vec::new();
        for name in values.names() {
            let (Some(expected), Some(value)) = (self.expected_values.get(name), values.get(name))
            else {
                continue;
            };
            if let Err(message) = expected.validate(value) {
                messages.push(format!("{name}: {message} (value: {value:?})"));
            }
        }
        if !messages.is_empty() {
            messages.sort();
            return Err(Error::ValueValidation(messages.join("\n")));
        }
        Ok(())
    }
}
