//! Request-scoped state: attributes shared along the pipeline and the path
//! variables captured by the matched route.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Type-erased, string-keyed request attributes.
///
/// Attributes let advices and callbacks hand values to each other (and to
/// handlers) without knowing each other's types. The map sits behind a lock
/// because requests are shared as `Arc<Request>`.
///
/// # Examples
///
/// ```
/// use restline::context::Attributes;
///
/// let attrs = Attributes::new();
/// attrs.set("user.id", 42_u64);
/// assert_eq!(attrs.get::<u64>("user.id"), Some(42));
/// assert_eq!(attrs.get::<String>("user.id"), None);
/// ```
#[derive(Default)]
pub struct Attributes {
    map: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous value under `name`.
    pub fn set<T>(&self, name: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.write().insert(name.into(), Arc::new(value));
    }

    /// Returns a clone of the value under `name` if it has type `T`.
    pub fn get<T>(&self, name: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.map
            .read()
            .get(name)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Returns `true` if a value is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.map.read().contains_key(name)
    }

    /// Removes the value under `name`; returns `true` if one was present.
    pub fn remove(&self, name: &str) -> bool {
        self.map.write().remove(name).is_some()
    }

    /// Names of all stored attributes (unordered).
    pub fn names(&self) -> Vec<String> {
        self.map.read().keys().cloned().collect()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.read().keys()).finish()
    }
}

/// Variables captured by a route pattern such as `/users/:id`.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PathVariables {
    map: HashMap<String, String>,
}

impl PathVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_typed() {
        let attrs = Attributes::new();
        attrs.set("marker", String::from("on_error"));
        assert!(attrs.contains("marker"));
        assert_eq!(attrs.get::<String>("marker").as_deref(), Some("on_error"));
        assert_eq!(attrs.get::<i32>("marker"), None);
        assert!(attrs.remove("marker"));
        assert!(!attrs.contains("marker"));
    }

    #[test]
    fn path_variables() {
        let mut vars = PathVariables::new();
        vars.insert("id", "42");
        assert_eq!(vars.get("id"), Some("42"));
        assert_eq!(vars.len(), 1);
        assert!(vars.get("name").is_none());
    }
}
