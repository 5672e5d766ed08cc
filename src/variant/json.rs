//! JSON reader/writer for variants.
//!
//! Serializable objects are written with a reserved `"$$clsid"` key and rebuilt
//! through the class registry on read. Streams are written as a `"$$stream"`
//! placeholder carrying either inline base64 data or an index into an
//! out-of-band attachment list.

use super::{Dictionary, Variant};
use crate::error::{Error, Result};
use crate::object::{class_id_to_hex, create_object, parse_class_id, read_all, MemoryStream, StreamPtr};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Number, Value};
use std::sync::Arc;

pub const CLSID_KEY: &str = "$$clsid";
pub const STREAM_KEY: &str = "$$stream";

enum StreamSink<'a> {
    Inline,
    Attach(&'a mut Vec<Vec<u8>>),
    /// Lossless output is not required; objects and streams become stubs
    Display,
}

/// Serialize to compact JSON (streams inlined)
pub fn serialize(v: &Variant) -> Result<String> {
    Ok(serde_json::to_string(&to_json_value(v)?)?)
}

pub fn serialize_pretty(v: &Variant) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_json_value(v)?)?)
}

/// Parse JSON text (comments allowed) into a variant
pub fn deserialize(text: &str) -> Result<Variant> {
    let clean = strip_comments(text)?;
    let value: Value = serde_json::from_str(&clean)?;
    from_json_value(value)
}

pub fn to_json_value(v: &Variant) -> Result<Value> {
    encode(v, &mut StreamSink::Inline)
}

/// Encode with stream payloads moved into `attachments`
pub fn to_json_value_with_attachments(v: &Variant, attachments: &mut Vec<Vec<u8>>) -> Result<Value> {
    encode(v, &mut StreamSink::Attach(attachments))
}

pub fn from_json_value(value: Value) -> Result<Variant> {
    decode(value, None)
}

/// Decode a value whose stream placeholders reference `attachments`
pub fn from_json_value_with_attachments(value: Value, attachments: &[Vec<u8>]) -> Result<Variant> {
    decode(value, Some(attachments))
}

pub(crate) fn to_display_string(v: &Variant) -> String {
    encode(v, &mut StreamSink::Display)
        .map(|value| value.to_string())
        .unwrap_or_else(|e| format!("<{}>", e))
}

fn encode(v: &Variant, sink: &mut StreamSink<'_>) -> Result<Value> {
    Ok(match v.resolve() {
        Variant::Null => Value::Null,
        Variant::Bool(b) => Value::Bool(*b),
        Variant::Int(i) => Value::Number(Number::from(*i)),
        Variant::String(s) => Value::String(s.clone()),
        Variant::Sequence(seq) => Value::Array(seq.iter().map(|item| encode(item, sink)).collect::<Result<_>>()?),
        Variant::Dictionary(dict) => Value::Object(encode_dict(dict, sink)?),
        Variant::Object(obj) => {
            let class_id = class_id_to_hex(obj.class_id());
            let display = matches!(sink, StreamSink::Display);
            let fields = match obj.clone().serializable() {
                Some(s) => s.serialize()?,
                None if display => Dictionary::new(),
                None => {
                    return Err(Error::type_error(format!(
                        "object {class_id} doesn't support serialization"
                    )))
                }
            };
            let mut map = encode_dict(&fields, sink)?;
            map.insert(CLSID_KEY.to_string(), Value::String(class_id));
            Value::Object(map)
        }
        Variant::Stream(stream) => encode_stream(stream, sink)?,
        Variant::Deferred(_) => unreachable!("resolve() never returns a deferred entry"),
    })
}

fn encode_dict(dict: &Dictionary, sink: &mut StreamSink<'_>) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for (key, value) in dict.iter() {
        map.insert(key.to_string(), encode(value, sink)?);
    }
    Ok(map)
}

fn encode_stream(stream: &StreamPtr, sink: &mut StreamSink<'_>) -> Result<Value> {
    let mut placeholder = Map::new();
    placeholder.insert("size".into(), Value::from(stream.size()));
    placeholder.insert("position".into(), Value::from(stream.position()));
    match sink {
        StreamSink::Inline => {
            let data = read_all(stream.as_ref())?;
            placeholder.insert("data".into(), Value::String(BASE64.encode(data)));
        }
        StreamSink::Attach(attachments) => {
            placeholder.insert("index".into(), Value::from(attachments.len()));
            attachments.push(read_all(stream.as_ref())?);
        }
        StreamSink::Display => {}
    }
    let mut map = Map::new();
    map.insert(STREAM_KEY.into(), Value::Object(placeholder));
    Ok(Value::Object(map))
}

fn decode(value: Value, attachments: Option<&[Vec<u8>]>) -> Result<Variant> {
    Ok(match value {
        Value::Null => Variant::Null,
        Value::Bool(b) => Variant::Bool(b),
        Value::Number(n) => decode_number(&n)?,
        Value::String(s) => Variant::String(s),
        Value::Array(items) => Variant::Sequence(
            items
                .into_iter()
                .map(|item| decode(item, attachments))
                .collect::<Result<Vec<_>>>()?
                .into(),
        ),
        Value::Object(mut map) => {
            if let Some(placeholder) = map.remove(STREAM_KEY) {
                return decode_stream(placeholder, attachments);
            }
            let class_id = map.remove(CLSID_KEY);
            let mut dict = Dictionary::new();
            for (key, value) in map {
                dict.put(key, decode(value, attachments)?);
            }
            match class_id {
                None => Variant::Dictionary(dict),
                Some(id) => {
                    let class_id = parse_class_id(&decode(id, None)?)?;
                    Variant::Object(create_object(class_id, &Variant::Dictionary(dict))?)
                }
            }
        }
    })
}

fn decode_number(n: &Number) -> Result<Variant> {
    if let Some(i) = n.as_i64() {
        Ok(Variant::Int(i))
    } else if let Some(u) = n.as_u64() {
        Err(Error::OutOfRange(format!("integer {u} doesn't fit into a signed 64-bit value")))
    } else {
        Err(Error::type_error(format!("floating-point value {n} is not supported")))
    }
}

fn decode_stream(placeholder: Value, attachments: Option<&[Vec<u8>]>) -> Result<Variant> {
    let Value::Object(fields) = placeholder else {
        return Err(Error::invalid_format("stream placeholder must be an object"));
    };
    let position = fields.get("position").and_then(Value::as_u64).unwrap_or(0);
    let data = if let Some(encoded) = fields.get("data") {
        let encoded = encoded
            .as_str()
            .ok_or_else(|| Error::invalid_format("stream data must be a base64 string"))?;
        BASE64
            .decode(encoded)
            .map_err(|e| Error::invalid_format(format!("stream data: {e}")))?
    } else if let Some(index) = fields.get("index") {
        let index = index
            .as_u64()
            .ok_or_else(|| Error::invalid_format("stream index must be an unsigned integer"))?;
        attachments
            .and_then(|list| list.get(index as usize))
            .cloned()
            .ok_or_else(|| Error::invalid_format(format!("stream attachment #{index} is missing")))?
    } else {
        return Err(Error::invalid_format("stream placeholder has neither data nor index"));
    };

    if let Some(size) = fields.get("size").and_then(Value::as_u64) {
        if size != data.len() as u64 {
            return Err(Error::invalid_format(format!(
                "stream size mismatch: declared {size}, got {}",
                data.len()
            )));
        }
    }
    let stream = MemoryStream::new(data);
    stream.seek_to(position);
    let stream: StreamPtr = Arc::new(stream);
    Ok(Variant::Stream(stream))
}

/// Remove `//` and `/* */` comments outside of string literals
pub fn strip_comments(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut closed = false;
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        closed = true;
                        break;
                    }
                    if skipped == '\n' {
                        out.push('\n');
                    }
                    prev = skipped;
                }
                if !closed {
                    return Err(Error::invalid_format("unterminated block comment"));
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}
