//! Name → value catalog.
//!
//! The process-wide instance is populated at start-up, read by commands that
//! name their processor, and cleared at shutdown.

use super::{ObjPtr, Service};
use crate::error::{Error, Result};
use crate::variant::Variant;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

#[derive(Default)]
pub struct Catalog {
    entries: RwLock<BTreeMap<String, Variant>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value under `name`; null removes the entry
    pub fn put(&self, name: impl Into<String>, value: impl Into<Variant>) {
        let name = name.into();
        let value = value.into();
        let mut entries = self.entries.write();
        if value.is_null() {
            entries.remove(&name);
        } else {
            entries.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<Variant> {
        self.entries.read().get(name).cloned()
    }

    /// Object published under `name`; NotFound if absent, TypeError if not an object
    pub fn query_object(&self, name: &str) -> Result<ObjPtr> {
        let value = self
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("catalog has no entry <{name}>")))?;
        value.as_object().cloned().ok_or_else(|| {
            Error::type_error(format!(
                "catalog entry <{name}> is <{}>, object expected",
                value.value_type()
            ))
        })
    }

    /// The [`Service`] capability of the object published under `name`
    pub fn query_service(&self, name: &str) -> Result<Arc<dyn Service>> {
        super::query_interface::<dyn Service>(&self.query_object(name)?)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        // drop values outside the lock; destructors may consult the catalog
        let entries = std::mem::take(&mut *self.entries.write());
        drop(entries);
    }
}

/// Process-wide catalog
pub fn global() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(Catalog::new)
}

pub fn put_catalog_data(name: impl Into<String>, value: impl Into<Variant>) {
    global().put(name, value)
}

pub fn get_catalog_data(name: &str) -> Option<Variant> {
    global().get(name)
}

pub fn query_service(name: &str) -> Result<ObjPtr> {
    global().query_object(name)
}

pub fn clear_catalog() {
    global().clear()
}
