//! Variant: the universal value currency of the runtime.
//!
//! Configuration, command parameters and results are all carried as [`Variant`].
//! The union is closed: null, boolean, integer, string, sequence, dictionary,
//! object reference and stream reference. A [`Deferred`] entry is transparent:
//! it behaves like the value it produces on first access.

mod container;
mod convert;
mod deferred;
pub mod json;
mod merge;
mod path;

pub use container::{Dictionary, Sequence};
pub use convert::{parse_int, FromVariant};
pub use deferred::Deferred;
pub use merge::{merge, MergeMode};
pub use path::{get_by_path, get_by_path_safe, put_by_path};

use crate::error::{Error, Result};
use crate::object::{class_id_to_hex, Interface, ObjPtr, Object, StreamPtr};
use std::fmt;
use std::sync::Arc;

/// Type tag of a [`Variant`] (deferred entries report the tag of their value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Boolean,
    Integer,
    String,
    Sequence,
    Dictionary,
    Object,
    Stream,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Null => "null",
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::String => "string",
            ValueType::Sequence => "sequence",
            ValueType::Dictionary => "dictionary",
            ValueType::Object => "object",
            ValueType::Stream => "stream",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Default)]
pub enum Variant {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    Sequence(Sequence),
    Dictionary(Dictionary),
    Object(ObjPtr),
    Stream(StreamPtr),
    Deferred(Deferred),
}

impl Variant {
    /// Wrap a lazily computed value; `f` runs at most once, on first access.
    pub fn deferred(f: impl FnOnce() -> Variant + Send + 'static) -> Self {
        Variant::Deferred(Deferred::new(f))
    }

    pub fn from_object<T: Object>(obj: Arc<T>) -> Self {
        let obj: ObjPtr = obj;
        Variant::Object(obj)
    }

    /// Follow deferred entries to the concrete value
    pub fn resolve(&self) -> &Variant {
        let mut current = self;
        while let Variant::Deferred(d) = current {
            current = d.get();
        }
        current
    }

    pub fn value_type(&self) -> ValueType {
        match self.resolve() {
            Variant::Null => ValueType::Null,
            Variant::Bool(_) => ValueType::Boolean,
            Variant::Int(_) => ValueType::Integer,
            Variant::String(_) => ValueType::String,
            Variant::Sequence(_) => ValueType::Sequence,
            Variant::Dictionary(_) => ValueType::Dictionary,
            Variant::Object(_) => ValueType::Object,
            Variant::Stream(_) => ValueType::Stream,
            Variant::Deferred(_) => unreachable!("resolve() never returns a deferred entry"),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.resolve(), Variant::Null)
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self.resolve(), Variant::Dictionary(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.resolve(), Variant::Sequence(_))
    }

    /// Null or an empty container
    pub fn is_empty(&self) -> bool {
        match self.resolve() {
            Variant::Null => true,
            Variant::Dictionary(d) => d.is_empty(),
            Variant::Sequence(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Number of elements for containers, 0 otherwise
    pub fn len(&self) -> usize {
        match self.resolve() {
            Variant::Dictionary(d) => d.len(),
            Variant::Sequence(s) => s.len(),
            _ => 0,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.resolve() {
            Variant::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.resolve() {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.resolve() {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self.resolve() {
            Variant::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Mutable dictionary access. Deferred entries are materialized first.
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        self.materialize();
        match self {
            Variant::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&Sequence> {
        match self.resolve() {
            Variant::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq_mut(&mut self) -> Option<&mut Sequence> {
        self.materialize();
        match self {
            Variant::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjPtr> {
        match self.resolve() {
            Variant::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamPtr> {
        match self.resolve() {
            Variant::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Checked capability cast of an object-holding variant
    pub fn query<I: Interface + ?Sized>(&self) -> Result<Arc<I>> {
        match self.as_object() {
            Some(obj) => crate::object::query_interface::<I>(obj),
            None => Err(Error::type_error(format!(
                "{} expected, got <{}>",
                I::NAME,
                self.value_type()
            ))),
        }
    }

    /// Dictionary key presence (false for non-dictionaries)
    pub fn has(&self, key: &str) -> bool {
        self.as_dict().map(|d| d.has(key)).unwrap_or(false)
    }

    /// Dictionary lookup (None for non-dictionaries and missing keys)
    pub fn get(&self, key: &str) -> Option<&Variant> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Dictionary lookup with a default value
    pub fn get_or(&self, key: &str, default: impl Into<Variant>) -> Variant {
        match self.get(key) {
            Some(v) => v.clone(),
            None => default.into(),
        }
    }

    /// Sequence element access
    pub fn at(&self, index: usize) -> Option<&Variant> {
        self.as_seq().and_then(|s| s.get(index))
    }

    /// Insert into a dictionary; a null variant becomes an empty dictionary first.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Variant>) -> Result<()> {
        if self.is_null() {
            *self = Variant::Dictionary(Dictionary::new());
        }
        let ty = self.value_type();
        match self.as_dict_mut() {
            Some(d) => {
                d.put(key, value);
                Ok(())
            }
            None => Err(Error::type_error(format!(
                "can't put a key into <{ty}>: dictionary expected"
            ))),
        }
    }

    /// Remove a dictionary key; returns the removed value
    pub fn erase(&mut self, key: &str) -> Option<Variant> {
        self.as_dict_mut().and_then(|d| d.erase(key))
    }

    /// Coerce into `T` following the runtime's total conversion rules
    pub fn convert<T: FromVariant>(&self) -> T {
        T::from_variant(self.resolve())
    }

    /// Replace a deferred entry with its computed value in place
    fn materialize(&mut self) {
        if matches!(self, Variant::Deferred(_)) {
            *self = self.resolve().clone();
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolve() {
            Variant::Null => f.write_str("Null"),
            Variant::Bool(b) => write!(f, "Bool({b})"),
            Variant::Int(i) => write!(f, "Int({i})"),
            Variant::String(s) => write!(f, "String({s:?})"),
            Variant::Sequence(s) => f.debug_list().entries(s.iter()).finish(),
            Variant::Dictionary(d) => f.debug_map().entries(d.iter()).finish(),
            Variant::Object(o) => write!(f, "Object({})", class_id_to_hex(o.class_id())),
            Variant::Stream(s) => write!(f, "Stream(size={}, pos={})", s.size(), s.position()),
            Variant::Deferred(_) => unreachable!("resolve() never returns a deferred entry"),
        }
    }
}

/// Prints the JSON form; values that can't be serialized are printed as stubs.
impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&json::to_display_string(self))
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self.resolve(), other.resolve()) {
            (Variant::Null, Variant::Null) => true,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::String(a), Variant::String(b)) => a == b,
            (Variant::Sequence(a), Variant::Sequence(b)) => a == b,
            (Variant::Dictionary(a), Variant::Dictionary(b)) => a == b,
            (Variant::Object(a), Variant::Object(b)) => Arc::ptr_eq(a, b),
            (Variant::Stream(a), Variant::Stream(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq<i64> for Variant {
    fn eq(&self, other: &i64) -> bool {
        self.as_int() == Some(*other)
    }
}

impl PartialEq<bool> for Variant {
    fn eq(&self, other: &bool) -> bool {
        self.as_bool() == Some(*other)
    }
}

impl PartialEq<&str> for Variant {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl From<()> for Variant {
    fn from(_: ()) -> Self {
        Variant::Null
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Variant {
                fn from(v: $t) -> Self {
                    Variant::Int(v as i64)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32, isize);

/// Unsigned values above `i64::MAX` saturate
macro_rules! impl_from_wide_unsigned {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Variant {
                fn from(v: $t) -> Self {
                    Variant::Int(i64::try_from(v).unwrap_or(i64::MAX))
                }
            }
        )*
    };
}

impl_from_wide_unsigned!(u64, usize);

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<&String> for Variant {
    fn from(v: &String) -> Self {
        Variant::String(v.clone())
    }
}

impl From<Dictionary> for Variant {
    fn from(v: Dictionary) -> Self {
        Variant::Dictionary(v)
    }
}

impl From<Sequence> for Variant {
    fn from(v: Sequence) -> Self {
        Variant::Sequence(v)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(v: Vec<Variant>) -> Self {
        Variant::Sequence(Sequence::from(v))
    }
}

impl From<ObjPtr> for Variant {
    fn from(v: ObjPtr) -> Self {
        Variant::Object(v)
    }
}

impl From<StreamPtr> for Variant {
    fn from(v: StreamPtr) -> Self {
        Variant::Stream(v)
    }
}

impl<T: Into<Variant>> From<Option<T>> for Variant {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Variant::Null)
    }
}

/// Build a [`Dictionary`] variant: `dict! { "a" => 1, "b" => "x" }`
#[macro_export]
macro_rules! dict {
    () => {
        $crate::variant::Variant::Dictionary($crate::variant::Dictionary::new())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut d = $crate::variant::Dictionary::new();
        $( d.put($key, $value); )+
        $crate::variant::Variant::Dictionary(d)
    }};
}

/// Build a [`Sequence`] variant: `seq![1, "two", dict! {}]`
#[macro_export]
macro_rules! seq {
    () => {
        $crate::variant::Variant::Sequence($crate::variant::Sequence::new())
    };
    ($($value:expr),+ $(,)?) => {{
        let mut s = $crate::variant::Sequence::new();
        $( s.push($value); )+
        $crate::variant::Variant::Sequence(s)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::create_memory_stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_value_types() {
        assert_eq!(Variant::Null.value_type(), ValueType::Null);
        assert_eq!(Variant::from(true).value_type(), ValueType::Boolean);
        assert_eq!(Variant::from(7).value_type(), ValueType::Integer);
        assert_eq!(Variant::from("s").value_type(), ValueType::String);
        assert_eq!(dict! {}.value_type(), ValueType::Dictionary);
        assert_eq!(seq![].value_type(), ValueType::Sequence);
        let stream: Variant = create_memory_stream(b"abc".to_vec()).into();
        assert_eq!(stream.value_type(), ValueType::Stream);
    }

    #[test]
    fn test_structural_equality() {
        let a = dict! { "a" => 1, "b" => seq![1, 2, "x"] };
        let b = dict! { "b" => seq![1, 2, "x"], "a" => 1 };
        assert_eq!(a, b);
        assert_ne!(a, dict! { "a" => 1 });
        assert_ne!(Variant::from(1), Variant::from("1"));
        assert_ne!(Variant::from(1), Variant::from(true));
    }

    #[test]
    fn test_stream_identity_equality() {
        let s1 = create_memory_stream(b"abc".to_vec());
        let s2 = create_memory_stream(b"abc".to_vec());
        assert_eq!(Variant::from(s1.clone()), Variant::from(s1));
        assert_ne!(Variant::from(s2.clone()), Variant::from(create_memory_stream(b"abc".to_vec())));
        let _ = s2;
    }

    #[test]
    fn test_dictionary_access() {
        let mut v = Variant::Null;
        v.put("a", 1).unwrap();
        v.put("b", "text").unwrap();
        assert!(v.has("a"));
        assert_eq!(v.get_or("a", 0), 1);
        assert_eq!(v.get_or("missing", 42), 42);
        assert_eq!(v.erase("a"), Some(Variant::from(1)));
        assert!(!v.has("a"));
        assert_eq!(v.len(), 1);

        let mut scalar = Variant::from(5);
        assert!(matches!(scalar.put("a", 1), Err(Error::TypeError(_))));
    }

    #[test]
    fn test_is_empty() {
        assert!(Variant::Null.is_empty());
        assert!(dict! {}.is_empty());
        assert!(seq![].is_empty());
        assert!(!seq![1].is_empty());
        assert!(!Variant::from(0).is_empty());
    }

    #[test]
    fn test_deferred_evaluated_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let v = Variant::deferred(move || {
            c.fetch_add(1, Ordering::SeqCst);
            dict! { "size" => 10 }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(v.value_type(), ValueType::Dictionary);
        assert_eq!(v.get_or("size", 0), 10);
        assert_eq!(v, dict! { "size" => 10 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_inside_dictionary() {
        let mut d = Dictionary::new();
        d.put("meta", Variant::deferred(|| Variant::from("computed")));
        let v = Variant::from(d);
        assert_eq!(v.get("meta").and_then(|m| m.as_str()), Some("computed"));
    }

    #[test]
    fn test_compare_with_primitives() {
        assert!(Variant::from(3) == 3);
        assert!(Variant::from("high") == "high");
        assert!(Variant::from(true) == true);
        assert!(Variant::from(3) != "3");
    }

    #[test]
    fn test_wide_unsigned_saturates() {
        assert_eq!(Variant::from(u64::MAX), Variant::from(i64::MAX));
        assert_eq!(Variant::from(usize::MAX), Variant::from(i64::MAX));
        assert_eq!(Variant::from(7u64), Variant::from(7));
        assert_eq!(Variant::from(u32::MAX).as_int(), Some(i64::from(u32::MAX)));
    }
}
