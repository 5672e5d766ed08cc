//! Object model: class-tagged shared instances with capability discovery.
//!
//! - [`Object`]: base trait; every object carries a 32-bit class id
//! - capability traits ([`CommandProcessor`], [`DataReceiver`], [`Serializable`],
//!   [`Service`], [`QueueNotificationAcceptor`], [`ReadableStream`])
//! - [`registry`]: class id → factory, two-phase construction
//! - [`catalog`]: process-wide name → value registry

pub mod catalog;
pub mod registry;
mod stream;

pub use catalog::{clear_catalog, get_catalog_data, put_catalog_data, query_service, Catalog};
pub use registry::{
    create_object, create_object_from_descriptor, register_class, ClassRegistry, Factory,
    FinalConstruct,
};
pub use stream::{create_memory_stream, read_all, MemoryStream, ReadableStream, CLSID_MEMORY_STREAM};

use crate::error::{Error, Result};
use crate::variant::{Dictionary, Variant};
use std::any::Any;
use std::sync::Arc;

/// 32-bit class identifier
pub type ClassId = u32;

pub type ObjPtr = Arc<dyn Object>;
pub type StreamPtr = Arc<dyn ReadableStream>;

/// Type-erasure helpers, implemented for every sized `'static` type
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Base object. Capability accessors return `None` unless overridden.
pub trait Object: AsAny {
    fn class_id(&self) -> ClassId;

    fn command_processor(self: Arc<Self>) -> Option<Arc<dyn CommandProcessor>> {
        None
    }

    fn data_receiver(self: Arc<Self>) -> Option<Arc<dyn DataReceiver>> {
        None
    }

    fn serializable(self: Arc<Self>) -> Option<Arc<dyn Serializable>> {
        None
    }

    fn service(self: Arc<Self>) -> Option<Arc<dyn Service>> {
        None
    }

    fn queue_notification_acceptor(self: Arc<Self>) -> Option<Arc<dyn QueueNotificationAcceptor>> {
        None
    }
}

/// Executes named commands with variant parameters
pub trait CommandProcessor: Send + Sync {
    fn execute(&self, command: &Variant, params: &Variant) -> Result<Variant>;
}

/// Sink for data items. Failures are logged by the receiver, never returned.
pub trait DataReceiver: Send + Sync {
    fn put(&self, data: &Variant);
}

/// Produces the configuration that rebuilds an equivalent object
pub trait Serializable: Send + Sync {
    fn serialize(&self) -> Result<Dictionary>;
}

/// Long-running component with explicit lifecycle
pub trait Service: Send + Sync {
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn shutdown(&self) -> Result<()> {
        self.stop()
    }
}

/// Receives "data was queued under tag" notifications
pub trait QueueNotificationAcceptor: Send + Sync {
    fn notify_add_queue_data(&self, tag: &Variant);
    fn notify_queue_overflow_warning(&self, _tag: &Variant) {}
}

/// A capability reachable through [`query_interface`]
pub trait Interface {
    const NAME: &'static str;
    fn cast(obj: ObjPtr) -> Option<Arc<Self>>;
}

impl Interface for dyn CommandProcessor {
    const NAME: &'static str = "CommandProcessor";
    fn cast(obj: ObjPtr) -> Option<Arc<Self>> {
        obj.command_processor()
    }
}

impl Interface for dyn DataReceiver {
    const NAME: &'static str = "DataReceiver";
    fn cast(obj: ObjPtr) -> Option<Arc<Self>> {
        obj.data_receiver()
    }
}

impl Interface for dyn Serializable {
    const NAME: &'static str = "Serializable";
    fn cast(obj: ObjPtr) -> Option<Arc<Self>> {
        obj.serializable()
    }
}

impl Interface for dyn Service {
    const NAME: &'static str = "Service";
    fn cast(obj: ObjPtr) -> Option<Arc<Self>> {
        obj.service()
    }
}

impl Interface for dyn QueueNotificationAcceptor {
    const NAME: &'static str = "QueueNotificationAcceptor";
    fn cast(obj: ObjPtr) -> Option<Arc<Self>> {
        obj.queue_notification_acceptor()
    }
}

/// Checked capability cast; `TypeError` when the object lacks `I`
pub fn query_interface<I: Interface + ?Sized>(obj: &ObjPtr) -> Result<Arc<I>> {
    I::cast(obj.clone()).ok_or_else(|| {
        Error::type_error(format!(
            "object {} doesn't implement {}",
            class_id_to_hex(obj.class_id()),
            I::NAME
        ))
    })
}

pub fn query_interface_safe<I: Interface + ?Sized>(obj: &ObjPtr) -> Option<Arc<I>> {
    I::cast(obj.clone())
}

/// Recover the concrete type behind an object reference
pub fn downcast<T: Object>(obj: &ObjPtr) -> Result<Arc<T>> {
    let class_id = obj.class_id();
    obj.clone().into_any().downcast::<T>().map_err(|_| {
        Error::type_error(format!(
            "object {} is not a {}",
            class_id_to_hex(class_id),
            std::any::type_name::<T>()
        ))
    })
}

pub fn class_id_to_hex(class_id: ClassId) -> String {
    format!("0x{class_id:08X}")
}

/// Accepts an integer or a `"0x"`-prefixed hex string. Zero is never valid.
pub fn parse_class_id(v: &Variant) -> Result<ClassId> {
    let parsed = match v.resolve() {
        Variant::Int(i) => ClassId::try_from(*i).ok(),
        Variant::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => ClassId::from_str_radix(hex, 16).ok(),
                None => s.parse::<ClassId>().ok(),
            }
        }
        _ => None,
    };
    match parsed {
        Some(id) if id != 0 => Ok(id),
        _ => Err(Error::invalid_argument(format!("invalid class id <{v}>"))),
    }
}
