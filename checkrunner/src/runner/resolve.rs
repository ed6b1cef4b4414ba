//! Name resolution through values, aliases, iterated arguments and cached
//! conditions.

use log::{debug, warn};
use smol_str::SmolStr;

use crate::{
    cache::{CacheKey, MissingValue},
    unwind, Args, IterArgs, NameKind, Value, PSEUDO_VALUES,
};

use super::CheckRunner;

impl<'a> CheckRunner<'a> {
    /// The value of `name` for the given bindings.
    ///
    /// Lookup order: explicit values, the alias target's explicit value,
    /// expected value defaults, bound iterated arguments, whole input
    /// collections, conditions, derived iterables, then `config`.
    pub fn get(&mut self, name: &str, iterargs: &IterArgs) -> Result<Value, MissingValue> {
        if let Some(value) = self.values.get(name) {
            return Ok(value.clone());
        }
        let profile = self.profile;
        let resolved = profile.resolve_alias(name);
        if let Some(value) = self.values.get(&resolved) {
            return Ok(value.clone());
        }

        match profile.kind(&resolved) {
            Some(NameKind::ExpectedValue) => {
                if let Some(default) = profile.expected_value(&resolved).and_then(|e| e.default()) {
                    return Ok(default.clone());
                }
            }
            Some(NameKind::Iterarg) => {
                let bound = iterargs
                    .get(&resolved)
                    .and_then(|index| self.iterarg_value(&resolved, index));
                if let Some(value) = bound {
                    return Ok(value.clone());
                }
            }
            Some(NameKind::Iterable) => {
                if let Some(items) = self.values.iterable(&resolved) {
                    return Ok(Value::list(items.to_vec()));
                }
            }
            Some(NameKind::Condition) => return self.get_condition(&resolved, iterargs),
            Some(NameKind::DerivedIterable) => return self.derive_iterable(&resolved),
            Some(NameKind::Alias) | None => (),
        }

        if PSEUDO_VALUES.contains(&resolved.as_str()) {
            return Ok(self.config.clone());
        }
        Err(MissingValue::Undefined(name.into()))
    }

    pub(crate) fn resolve_args(
        &mut self,
        names: &[SmolStr],
        iterargs: &IterArgs,
    ) -> Result<Args, MissingValue> {
        let mut args = Args::new();
        for name in names {
            let value = self.get(name, iterargs)?;
            args.insert(name.clone(), value);
        }
        Ok(args)
    }

    fn get_condition(&mut self, name: &SmolStr, iterargs: &IterArgs) -> Result<Value, MissingValue> {
        let scope = self.profile.condition_iterargs(name);
        let key = CacheKey {
            name: name.clone(),
            iterargs: iterargs.filter(|arg| scope.iter().any(|s| s == arg)),
        };
        if let Some(cached) = self.cache.lookup(&key) {
            return cached;
        }
        let result = self.evaluate_condition(name, &key.iterargs);
        self.cache.store(key, &result);
        result
    }

    fn evaluate_condition(&mut self, name: &SmolStr, iterargs: &IterArgs) -> Result<Value, MissingValue> {
        let profile = self.profile;
        let Some(condition) = profile.condition(name) else {
            return Err(MissingValue::Undefined(name.clone()));
        };
        let args = self
            .resolve_args(condition.args(), iterargs)
            .map_err(|missing| MissingValue::Failed {
                name: name.clone(),
                message: missing.to_string(),
            })?;

        debug!("Evaluate condition {name} {iterargs}");
        let message = match unwind::catch(|| condition.call(&args)) {
            Ok(Ok(Some(value))) => return Ok(value),
            Ok(Ok(None)) => return Err(MissingValue::Undefined(name.clone())),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic.message,
        };
        warn!("Condition {name} {iterargs} failed: {message}");
        Err(MissingValue::Failed {
            name: name.clone(),
            message,
        })
    }

    fn derive_iterable(&mut self, plural: &SmolStr) -> Result<Value, MissingValue> {
        let profile = self.profile;
        let Some(derived) = profile.derived_iterable(plural) else {
            return Err(MissingValue::Undefined(plural.clone()));
        };

        let mut combinations = vec![IterArgs::new()];
        for name in profile.condition_iterargs(&derived.condition) {
            let len = self.lengths.get(name).copied().unwrap_or_default();
            combinations = combinations
                .iter()
                .flat_map(|bound| (0..len).map(move |index| bound.with(name.clone(), index)))
                .collect();
        }

        let mut items = Vec::with_capacity(combinations.len());
        for iterargs in combinations {
            let value = self
                .get_condition(&derived.condition, &iterargs)
                .map_err(|missing| MissingValue::Failed {
                    name: plural.clone(),
                    message: missing.to_string(),
                })?;
            if derived.simple {
                items.push(value);
            } else {
                items.push(Value::new((iterargs, value)));
            }
        }
        Ok(Value::list(items))
    }
}
