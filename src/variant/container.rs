//! Dictionary and sequence containers.
//!
//! Lookups resolve deferred entries, so callers always see concrete values.

use super::Variant;
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// String-keyed map of variants with deterministic (sorted) key order
#[derive(Clone, Default, PartialEq)]
pub struct Dictionary(BTreeMap<String, Variant>);

impl Dictionary {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.0.get(key).map(Variant::resolve)
    }

    /// Mutable entry; a deferred value is materialized first
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Variant> {
        self.0.get_mut(key).map(|v| {
            v.materialize();
            v
        })
    }

    /// Raw entry without resolving a deferred value
    pub fn get_raw(&self, key: &str) -> Option<&Variant> {
        self.0.get(key)
    }

    pub fn get_or(&self, key: &str, default: impl Into<Variant>) -> Variant {
        match self.get(key) {
            Some(v) => v.clone(),
            None => default.into(),
        }
    }

    /// Lookup of a mandatory field
    pub fn require(&self, key: &str) -> Result<&Variant> {
        self.get(key)
            .ok_or_else(|| Error::invalid_argument(format!("missing field <{key}>")))
    }

    /// Insert or replace; returns the previous value
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Variant>) -> Option<Variant> {
        self.0.insert(key.into(), value.into())
    }

    pub fn erase(&mut self, key: &str) -> Option<Variant> {
        self.0.remove(key)
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variant)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.resolve()))
    }
}

impl IntoIterator for Dictionary {
    type Item = (String, Variant);
    type IntoIter = std::collections::btree_map::IntoIter<String, Variant>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<Variant>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<Variant>, const N: usize> From<[(K, V); N]> for Dictionary {
    fn from(items: [(K, V); N]) -> Self {
        items.into_iter().collect()
    }
}

/// Ordered list of variants
#[derive(Clone, Default, PartialEq)]
pub struct Sequence(Vec<Variant>);

impl Sequence {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Variant> {
        self.0.get(index).map(Variant::resolve)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Variant> {
        self.0.get_mut(index).map(|v| {
            v.materialize();
            v
        })
    }

    pub fn push(&mut self, value: impl Into<Variant>) {
        self.0.push(value.into())
    }

    /// Remove the element at `index`, shifting the tail left
    pub fn erase(&mut self, index: usize) -> Option<Variant> {
        (index < self.0.len()).then(|| self.0.remove(index))
    }

    pub fn extend(&mut self, other: Sequence) {
        self.0.extend(other.0)
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variant> {
        self.0.iter().map(Variant::resolve)
    }
}

impl From<Vec<Variant>> for Sequence {
    fn from(items: Vec<Variant>) -> Self {
        Self(items)
    }
}

impl IntoIterator for Sequence {
    type Item = Variant;
    type IntoIter = std::vec::IntoIter<Variant>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<V: Into<Variant>> FromIterator<V> for Sequence {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
