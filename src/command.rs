//! Command: an immutable (processor, command, default params) triple.
//!
//! The processor may be given as an object exposing [`CommandProcessor`], the
//! name of such an object in the catalog, or a `{"clsid": ...}` descriptor that
//! creates a fresh processor. Every construction path yields the same behaviour.

use crate::error::{Error, Result};
use crate::object::{
    self, create_object_from_descriptor, query_interface, ClassId, CommandProcessor, Object,
    Serializable,
};
use crate::variant::{merge, Dictionary, MergeMode, Variant};
use std::fmt;
use std::sync::Arc;

pub const CLSID_COMMAND: ClassId = 0xACE8_92B6;

pub struct Command {
    /// Processor as given (catalog name or object), kept for serialization
    processor_ref: Variant,
    processor: Arc<dyn CommandProcessor>,
    command: Variant,
    params: Variant,
}

impl Command {
    pub fn new(processor: &Variant, command: impl Into<Variant>, params: impl Into<Variant>) -> Result<Self> {
        let (processor_ref, processor) = resolve_processor(processor)?;
        Ok(Self {
            processor_ref,
            processor,
            command: command.into(),
            params: params.into(),
        })
    }

    /// Build from `{"processor": ..., "command": ..., "params"?: ...}`
    pub fn from_descriptor(descriptor: &Variant) -> Result<Self> {
        let dict = descriptor.as_dict().ok_or_else(|| {
            Error::invalid_argument(format!(
                "command descriptor must be a dictionary, got <{}>",
                descriptor.value_type()
            ))
        })?;
        Self::new(
            dict.require("processor")?,
            dict.require("command")?.clone(),
            dict.get_or("params", Variant::Null),
        )
    }

    pub fn command(&self) -> &Variant {
        &self.command
    }

    pub fn default_params(&self) -> &Variant {
        &self.params
    }

    /// Run with `params` merged over the defaults.
    ///
    /// Null on either side yields the other side, two dictionaries are merged
    /// shallowly with call keys winning, anything else replaces the defaults.
    pub fn execute(&self, params: &Variant) -> Result<Variant> {
        let merged = merge(&self.params, params, MergeMode::empty())?;
        self.processor.execute(&self.command, &merged)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.processor_ref.as_str() {
            Some(name) => write!(f, "{}.{}", name, self.command.convert::<String>()),
            None => write!(
                f,
                "{}.{}",
                self.processor_ref.convert::<String>(),
                self.command.convert::<String>()
            ),
        }
    }
}

impl Object for Command {
    fn class_id(&self) -> ClassId {
        CLSID_COMMAND
    }

    fn serializable(self: Arc<Self>) -> Option<Arc<dyn Serializable>> {
        Some(self)
    }
}

impl Serializable for Command {
    fn serialize(&self) -> Result<Dictionary> {
        let mut d = Dictionary::new();
        d.put("processor", self.processor_ref.clone());
        d.put("command", self.command.clone());
        if !self.params.is_null() {
            d.put("params", self.params.clone());
        }
        Ok(d)
    }
}

fn resolve_processor(processor: &Variant) -> Result<(Variant, Arc<dyn CommandProcessor>)> {
    let obj = match processor.resolve() {
        Variant::Object(obj) => obj.clone(),
        Variant::String(name) => object::catalog::global().query_object(name).map_err(|e| {
            Error::invalid_argument(format!("processor <{name}> is not available: {}", e.message()))
        })?,
        Variant::Dictionary(d) if d.has("clsid") => {
            let obj = create_object_from_descriptor(processor)?;
            return Ok((Variant::Object(obj.clone()), as_processor(&obj)?));
        }
        other => {
            return Err(Error::invalid_argument(format!(
                "invalid processor <{}>: object, catalog name or descriptor expected",
                other.value_type()
            )))
        }
    };
    let cp = as_processor(&obj)?;
    Ok((processor.resolve().clone(), cp))
}

fn as_processor(obj: &object::ObjPtr) -> Result<Arc<dyn CommandProcessor>> {
    query_interface::<dyn CommandProcessor>(obj).map_err(|e| Error::invalid_argument(e.message().to_string()))
}

/// Command from a descriptor dictionary or an existing Command object
pub fn create_command(descriptor: &Variant) -> Result<Arc<Command>> {
    match descriptor.resolve() {
        Variant::Object(obj) => {
            object::downcast::<Command>(obj).map_err(|e| Error::invalid_argument(e.message().to_string()))
        }
        Variant::Dictionary(_) => Ok(Arc::new(Command::from_descriptor(descriptor)?)),
        other => Err(Error::invalid_argument(format!(
            "command descriptor expected, got <{}>",
            other.value_type()
        ))),
    }
}

pub fn create_command_with(
    processor: &Variant,
    command: impl Into<Variant>,
    params: impl Into<Variant>,
) -> Result<Arc<Command>> {
    Ok(Arc::new(Command::new(processor, command, params)?))
}

/// Build and run a command once with its default params
pub fn exec_command(descriptor: &Variant) -> Result<Variant> {
    create_command(descriptor)?.execute(&Variant::Null)
}

pub fn exec_command_with(
    processor: &Variant,
    command: impl Into<Variant>,
    params: impl Into<Variant>,
) -> Result<Variant> {
    Command::new(processor, command, params)?.execute(&Variant::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{create_object, put_catalog_data, ObjPtr};
    use crate::variant::json;
    use crate::{dict, seq};

    /// Returns `{"command": .., "params": ..}` for every call
    struct Recorder;

    impl Object for Recorder {
        fn class_id(&self) -> ClassId {
            0x0C0D_0001
        }

        fn command_processor(self: Arc<Self>) -> Option<Arc<dyn CommandProcessor>> {
            Some(self)
        }
    }

    impl CommandProcessor for Recorder {
        fn execute(&self, command: &Variant, params: &Variant) -> Result<Variant> {
            if command == &Variant::from("fail") {
                return Err(Error::invalid_usage("requested failure"));
            }
            Ok(dict! { "command" => command.clone(), "params" => params.clone() })
        }
    }

    fn recorder() -> Variant {
        let obj: ObjPtr = Arc::new(Recorder);
        Variant::from(obj)
    }

    #[test]
    fn test_construction_paths_are_equivalent() {
        put_catalog_data("test.command.recorder", recorder());
        let name = Variant::from("test.command.recorder");
        let params = dict! { "a" => 1, "b" => 2 };
        let call = dict! { "b" => 3 };
        let descriptor = dict! { "processor" => name.clone(), "command" => "doIt", "params" => params.clone() };

        let via_registry = create_object(CLSID_COMMAND, &descriptor).unwrap();
        let via_registry = object::downcast::<Command>(&via_registry).unwrap();
        let via_create = create_command(&descriptor).unwrap();
        let via_new = Command::new(&name, "doIt", params.clone()).unwrap();
        let via_with = create_command_with(&recorder(), "doIt", params.clone()).unwrap();

        let expected = dict! { "command" => "doIt", "params" => dict! { "a" => 1, "b" => 3 } };
        assert_eq!(via_registry.execute(&call).unwrap(), expected);
        assert_eq!(via_create.execute(&call).unwrap(), expected);
        assert_eq!(via_new.execute(&call).unwrap(), expected);
        assert_eq!(via_with.execute(&call).unwrap(), expected);

        let plain = dict! { "command" => "doIt", "params" => params.clone() };
        assert_eq!(exec_command(&descriptor).unwrap(), plain);
        assert_eq!(exec_command_with(&name, "doIt", params).unwrap(), plain);
    }

    #[test]
    fn test_parameter_merge_law() {
        let defaults = dict! { "a" => 1, "b" => 2 };
        let cmd = Command::new(&recorder(), "x", defaults.clone()).unwrap();
        let params_of = |call: Variant| cmd.execute(&call).unwrap().get_or("params", Variant::Null);

        assert_eq!(params_of(Variant::Null), defaults);
        assert_eq!(params_of(dict! { "b" => 9, "c" => 3 }), dict! { "a" => 1, "b" => 9, "c" => 3 });
        assert_eq!(params_of(seq![1]), seq![1]);

        let no_defaults = Command::new(&recorder(), "x", Variant::Null).unwrap();
        let result = no_defaults.execute(&dict! { "z" => 1 }).unwrap();
        assert_eq!(result.get_or("params", Variant::Null), dict! { "z" => 1 });

        let scalar_defaults = Command::new(&recorder(), "x", 5).unwrap();
        let result = scalar_defaults.execute(&dict! { "z" => 1 }).unwrap();
        assert_eq!(result.get_or("params", Variant::Null), dict! { "z" => 1 });
    }

    #[test]
    fn test_default_and_call_params_combine() {
        let cmd = Command::new(&recorder(), "x", dict! { "a" => 1, "b" => 1 }).unwrap();
        let params_of = |call: Variant| cmd.execute(&call).unwrap().get_or("params", Variant::Null);

        assert_eq!(params_of(dict! { "b" => 2, "c" => 2 }), dict! { "a" => 1, "b" => 2, "c" => 2 });
        assert_eq!(params_of(dict! { "a" => 2, "d" => 2 }), dict! { "a" => 2, "b" => 1, "d" => 2 });
        assert_eq!(cmd.default_params(), &dict! { "a" => 1, "b" => 1 });
    }

    #[test]
    fn test_null_call_param_drops_default() {
        let cmd = Command::new(&recorder(), "x", dict! { "a" => 1, "b" => 1 }).unwrap();
        let params = cmd.execute(&dict! { "b" => Variant::Null }).unwrap().get_or("params", Variant::Null);
        assert_eq!(params, dict! { "a" => 1 });
        assert_eq!(cmd.default_params(), &dict! { "a" => 1, "b" => 1 });
    }

    #[test]
    fn test_invalid_processors() {
        for processor in [Variant::from(5), Variant::Null, "test.command.absent".into(), dict! { "x" => 1 }] {
            let err = Command::new(&processor, "x", Variant::Null).err().unwrap();
            assert!(matches!(err, Error::InvalidArgument(_)), "{processor}");
        }
        let stream: ObjPtr = Arc::new(crate::object::MemoryStream::new(Vec::new()));
        let err = Command::new(&Variant::from(stream), "x", Variant::Null).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_descriptor_requires_fields() {
        put_catalog_data("test.command.fields", recorder());
        let err = create_command(&dict! { "command" => "x" }).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = create_command(&dict! { "processor" => "test.command.fields" }).err().unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(matches!(create_command(&Variant::from("x")).err(), Some(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_processor_errors_propagate() {
        let err = exec_command_with(&recorder(), "fail", Variant::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
    }

    #[test]
    fn test_serialize_roundtrip_with_catalog_name() {
        put_catalog_data("test.command.serial", recorder());
        let cmd = create_command_with(&"test.command.serial".into(), "go", dict! { "n" => 1 }).unwrap();
        let text = json::serialize(&Variant::from_object(cmd)).unwrap();
        assert!(text.contains("$$clsid"));

        let restored = json::deserialize(&text).unwrap();
        let restored = create_command(&restored).unwrap();
        assert_eq!(restored.command(), &Variant::from("go"));
        let result = restored.execute(&Variant::Null).unwrap();
        assert_eq!(result.get_or("params", Variant::Null), dict! { "n" => 1 });
    }

    #[test]
    fn test_display() {
        put_catalog_data("test.command.display", recorder());
        let cmd = Command::new(&"test.command.display".into(), "go", Variant::Null).unwrap();
        assert_eq!(cmd.to_string(), "test.command.display.go");
    }
}
