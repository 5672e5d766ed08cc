//! Total conversions between variant kinds.

use super::{Dictionary, Sequence, Variant};
use crate::object::class_id_to_hex;

/// Coercion target for [`Variant::convert`]. Conversions never fail.
pub trait FromVariant: Sized {
    fn from_variant(v: &Variant) -> Self;
}

impl FromVariant for bool {
    fn from_variant(v: &Variant) -> Self {
        match v {
            Variant::Null => false,
            Variant::Bool(b) => *b,
            Variant::Int(i) => *i != 0,
            Variant::String(s) => !s.is_empty(),
            Variant::Sequence(s) => !s.is_empty(),
            Variant::Dictionary(d) => !d.is_empty(),
            Variant::Object(_) | Variant::Stream(_) => true,
            Variant::Deferred(d) => bool::from_variant(d.get()),
        }
    }
}

impl FromVariant for i64 {
    fn from_variant(v: &Variant) -> Self {
        match v {
            Variant::Null => 0,
            Variant::Bool(b) => i64::from(*b),
            Variant::Int(i) => *i,
            Variant::String(s) => parse_int(s),
            Variant::Sequence(s) => s.len() as i64,
            Variant::Dictionary(d) => d.len() as i64,
            Variant::Object(_) | Variant::Stream(_) => 1,
            Variant::Deferred(d) => i64::from_variant(d.get()),
        }
    }
}

impl FromVariant for u64 {
    fn from_variant(v: &Variant) -> Self {
        i64::from_variant(v) as u64
    }
}

impl FromVariant for String {
    fn from_variant(v: &Variant) -> Self {
        match v {
            Variant::Null => String::new(),
            Variant::Bool(b) => b.to_string(),
            Variant::Int(i) => i.to_string(),
            Variant::String(s) => s.clone(),
            Variant::Sequence(_) => "[]".to_string(),
            Variant::Dictionary(_) => "{}".to_string(),
            Variant::Object(o) => class_id_to_hex(o.class_id()),
            Variant::Stream(s) => class_id_to_hex(s.class_id()),
            Variant::Deferred(d) => String::from_variant(d.get()),
        }
    }
}

impl FromVariant for Dictionary {
    fn from_variant(v: &Variant) -> Self {
        match v.resolve() {
            Variant::Dictionary(d) => d.clone(),
            Variant::Null => Dictionary::new(),
            other => Dictionary::from([("data", other.clone())]),
        }
    }
}

impl FromVariant for Sequence {
    fn from_variant(v: &Variant) -> Self {
        match v.resolve() {
            Variant::Sequence(s) => s.clone(),
            Variant::Null => Sequence::new(),
            other => {
                let mut s = Sequence::with_capacity(1);
                s.push(other.clone());
                s
            }
        }
    }
}

impl FromVariant for Variant {
    fn from_variant(v: &Variant) -> Self {
        v.resolve().clone()
    }
}

/// Integer parse with C `strtol(s, _, 0)` semantics.
///
/// Leading whitespace and a sign are accepted, `0x` selects hex and a leading
/// `0` selects octal. Parsing stops at the first invalid digit; no digits
/// yield 0. Out-of-range values saturate.
pub fn parse_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let bytes = rest.as_bytes();
    let (radix, digits) = if bytes.len() > 2
        && bytes[0] == b'0'
        && (bytes[1] == b'x' || bytes[1] == b'X')
        && bytes[2].is_ascii_hexdigit()
    {
        (16, &rest[2..])
    } else if bytes.len() > 1 && bytes[0] == b'0' {
        (8, &rest[1..])
    } else {
        (10, rest)
    };

    let mut value: i128 = 0;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        value = (value * i128::from(radix) + i128::from(d)).min(i128::from(i64::MAX) + 1);
    }
    if negative {
        value = -value;
    }
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}
