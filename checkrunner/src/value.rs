//! Type erased values flowing between inputs, conditions and checks.

use std::{
    any::{type_name, Any},
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
};

use smol_str::SmolStr;

/// A cheaply clonable, thread safe value of any type plus its truthiness.
///
/// Truthiness gates checks: a condition whose value is falsy leaves the
/// check unfulfilled.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    truthy: bool,
    type_name: &'static str,
}

impl Value {
    /// Wrap anything; the result is truthy.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Value::with_truth(value, true)
    }

    pub fn with_truth<T: Any + Send + Sync>(value: T, truthy: bool) -> Self {
        Value {
            inner: Arc::new(value),
            truthy,
            type_name: type_name::<T>(),
        }
    }

    /// A list of values, truthy when non-empty.
    pub fn list(values: Vec<Value>) -> Self {
        let truthy = !values.is_empty();
        Value::with_truth(values, truthy)
    }

    pub fn is_truthy(&self) -> bool {
        self.truthy
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Shared typed access, if the value holds a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    /// The elements, if this is a [`Value::list`].
    pub fn as_list(&self) -> Option<&[Value]> {
        self.downcast_ref::<Vec<Value>>().map(Vec::as_slice)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.downcast_ref::<bool>().copied()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.downcast_ref::<String>().map(String::as_str)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(b) = self.as_bool() {
            return write!(f, "Value({b})");
        }
        if let Some(s) = self.as_str() {
            return write!(f, "Value({s:?})");
        }
        if let Some(list) = self.as_list() {
            return f.debug_list().entries(list.iter()).finish();
        }
        write!(f, "Value(<{}>)", self.type_name)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::with_truth(value, value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        let truthy = !value.is_empty();
        Value::with_truth(value, truthy)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        value.to_string().into()
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::list(value)
    }
}

macro_rules! numeric_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    #[allow(clippy::float_cmp)]
                    let truthy = value != (0 as $ty);
                    Value::with_truth(value, truthy)
                }
            }
        )*
    };
}

numeric_value!(i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64);

/// Run scoped inputs: named values plus the collections iterated over.
///
/// Iterated collections are keyed by their plural name, e.g. `fonts`.
/// Checks and conditions asking for `config` receive the whole mapping.
#[derive(Debug, Clone, Default)]
pub struct Values {
    named: HashMap<SmolStr, Value>,
    iterables: HashMap<SmolStr, Vec<Value>>,
}

impl Values {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_iterable(mut self, plural: impl Into<SmolStr>, values: Vec<Value>) -> Self {
        self.insert_iterable(plural, values);
        self
    }

    pub fn insert(&mut self, name: impl Into<SmolStr>, value: impl Into<Value>) {
        self.named.insert(name.into(), value.into());
    }

    pub fn insert_iterable(&mut self, plural: impl Into<SmolStr>, values: Vec<Value>) {
        self.iterables.insert(plural.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    pub fn iterable(&self, plural: &str) -> Option<&[Value]> {
        self.iterables.get(plural).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        self.named.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.iterables.is_empty()
    }
}
