//! Class registry: class id → factory.
//!
//! Construction is two-phase: the factory allocates a default instance and then
//! runs [`FinalConstruct::final_construct`] with the configuration. An object is
//! published only when both phases succeed.

use super::{class_id_to_hex, parse_class_id, ClassId, ObjPtr, Object};
use crate::error::{Error, Result};
use crate::variant::Variant;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub type Factory = Arc<dyn Fn(&Variant) -> Result<ObjPtr> + Send + Sync>;

/// Second construction phase, run with the creation config
pub trait FinalConstruct: Default {
    fn final_construct(&mut self, config: &Variant) -> Result<()>;
}

struct ClassEntry {
    name: &'static str,
    factory: Factory,
}

pub struct ClassRegistry {
    classes: RwLock<HashMap<ClassId, ClassEntry>>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// Registry pre-populated with the runtime's own classes
    pub fn with_builtin_classes() -> Self {
        use crate::command::{Command, CLSID_COMMAND};
        use crate::correlator::{RemovableCopyCorrelator, CLSID_REMOVABLE_COPY_CORRELATOR};
        use crate::rpc::{JsonRpcClient, JsonRpcServer, CLSID_JSONRPC_CLIENT, CLSID_JSONRPC_SERVER};
        use crate::scenario::{ScenarioManager, CLSID_SCENARIO_MANAGER};

        let registry = Self::new();
        registry.register(
            CLSID_COMMAND,
            "Command",
            Arc::new(|config: &Variant| -> Result<ObjPtr> { Ok(Arc::new(Command::from_descriptor(config)?)) }),
        );
        registry.register(CLSID_SCENARIO_MANAGER, "ScenarioManager", two_phase::<ScenarioManager>());
        registry.register(CLSID_JSONRPC_CLIENT, "JsonRpcClient", two_phase::<JsonRpcClient>());
        registry.register(CLSID_JSONRPC_SERVER, "JsonRpcServer", two_phase::<JsonRpcServer>());
        registry.register(super::CLSID_MEMORY_STREAM, "MemoryStream", two_phase::<super::MemoryStream>());
        registry.register(
            CLSID_REMOVABLE_COPY_CORRELATOR,
            "RemovableCopyCorrelator",
            two_phase::<RemovableCopyCorrelator>(),
        );
        registry
    }

    /// Register (or replace) a factory
    pub fn register(&self, class_id: ClassId, name: &'static str, factory: Factory) {
        debug!(class_id = %class_id_to_hex(class_id), name, "class registered");
        self.classes.write().insert(class_id, ClassEntry { name, factory });
    }

    pub fn is_registered(&self, class_id: ClassId) -> bool {
        self.classes.read().contains_key(&class_id)
    }

    pub fn class_name(&self, class_id: ClassId) -> Option<&'static str> {
        self.classes.read().get(&class_id).map(|entry| entry.name)
    }

    pub fn create(&self, class_id: ClassId, config: &Variant) -> Result<ObjPtr> {
        let (name, factory) = {
            let classes = self.classes.read();
            let entry = classes.get(&class_id).ok_or_else(|| {
                Error::invalid_argument(format!("class {} is not registered", class_id_to_hex(class_id)))
            })?;
            (entry.name, Arc::clone(&entry.factory))
        };
        // factory runs without the lock so nested create_object calls work
        factory(config).map_err(|e| e.context(format!("can't create {name}")))
    }
}

/// Factory for `Default + FinalConstruct` types
pub fn two_phase<T: Object + FinalConstruct>() -> Factory {
    Arc::new(|config: &Variant| -> Result<ObjPtr> {
        let mut obj = T::default();
        obj.final_construct(config)?;
        Ok(Arc::new(obj))
    })
}

/// Process-wide registry
pub fn registry() -> &'static ClassRegistry {
    static REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ClassRegistry::with_builtin_classes)
}

pub fn register_class(class_id: ClassId, name: &'static str, factory: Factory) {
    registry().register(class_id, name, factory)
}

pub fn create_object(class_id: ClassId, config: &Variant) -> Result<ObjPtr> {
    registry().create(class_id, config)
}

/// Create from `{"clsid": id, ...config}`
pub fn create_object_from_descriptor(descriptor: &Variant) -> Result<ObjPtr> {
    let dict = descriptor
        .as_dict()
        .ok_or_else(|| Error::invalid_argument(format!("object descriptor must be a dictionary, got <{}>", descriptor.value_type())))?;
    let class_id = parse_class_id(dict.require("clsid")?)?;
    let mut config = dict.clone();
    config.erase("clsid");
    create_object(class_id, &Variant::Dictionary(config))
}
