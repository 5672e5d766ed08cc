//! JSON-RPC envelopes and the call/outcome codec shared by client and server.

use super::cipher::ChannelCipher;
use crate::error::{Error, Result};
use crate::variant::{json, Variant};
use serde::{Deserialize, Serialize};
use serde_json::{json as json_value, Value};

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_EXECUTE: &str = "execute";
pub const METHOD_ENCRYPTED: &str = "encrypted";
const ENCRYPTED_FIELD: &str = "encrypted";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub attachments: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl From<&Error> for RpcError {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code(),
            message: e.message().to_string(),
        }
    }
}

impl From<RpcError> for Error {
    fn from(e: RpcError) -> Self {
        Error::from_code(e.code, e.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub attachments: usize,
}

impl Response {
    pub fn failure(id: u64, error: &Error) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error.into()),
            attachments: 0,
        }
    }
}

fn seal(payload: &Value, attachments: Vec<Vec<u8>>, cipher: &ChannelCipher) -> Result<(Value, Vec<Vec<u8>>)> {
    let sealed = cipher.encrypt_b64(&serde_json::to_vec(payload)?)?;
    let attachments = attachments
        .iter()
        .map(|a| cipher.encrypt(a))
        .collect::<Result<Vec<_>>>()?;
    Ok((json_value!({ ENCRYPTED_FIELD: sealed }), attachments))
}

fn unseal(value: &Value, attachments: Vec<Vec<u8>>, cipher: &ChannelCipher) -> Result<(Value, Vec<Vec<u8>>)> {
    let sealed = value
        .get(ENCRYPTED_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::invalid_format("encrypted message has no payload"))?;
    let payload: Value = serde_json::from_slice(&cipher.decrypt_b64(sealed)?)?;
    let attachments = attachments
        .iter()
        .map(|a| cipher.decrypt(a))
        .collect::<Result<Vec<_>>>()?;
    Ok((payload, attachments))
}

/// Build a request for `command(params)`; encrypted when `cipher` is given
pub fn encode_call(
    id: u64,
    command: &Variant,
    params: &Variant,
    cipher: Option<&ChannelCipher>,
) -> Result<(Request, Vec<Vec<u8>>)> {
    let mut attachments = Vec::new();
    let payload = json_value!({
        "command": json::to_json_value_with_attachments(command, &mut attachments)?,
        "params": json::to_json_value_with_attachments(params, &mut attachments)?,
    });
    let (method, params, attachments) = match cipher {
        Some(cipher) => {
            let (sealed, attachments) = seal(&payload, attachments, cipher)?;
            (METHOD_ENCRYPTED, sealed, attachments)
        }
        None => (METHOD_EXECUTE, payload, attachments),
    };
    Ok((
        Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
            attachments: attachments.len(),
        },
        attachments,
    ))
}

/// Extract `(command, params)` from a request
pub fn decode_call(
    request: &Request,
    attachments: Vec<Vec<u8>>,
    cipher: Option<&ChannelCipher>,
) -> Result<(Variant, Variant)> {
    let (payload, attachments) = match cipher {
        Some(cipher) => unseal(&request.params, attachments, cipher)?,
        None => (request.params.clone(), attachments),
    };
    let Value::Object(mut fields) = payload else {
        return Err(Error::invalid_format("call parameters must be an object"));
    };
    let command = fields
        .remove("command")
        .ok_or_else(|| Error::invalid_argument("missing field <command>"))?;
    let params = fields.remove("params").unwrap_or(Value::Null);
    Ok((
        json::from_json_value_with_attachments(command, &attachments)?,
        json::from_json_value_with_attachments(params, &attachments)?,
    ))
}

/// Build the response for a finished call. Encoding failures become errors.
pub fn encode_outcome(id: u64, outcome: Result<Variant>, cipher: Option<&ChannelCipher>) -> (Response, Vec<Vec<u8>>) {
    let encoded = outcome.and_then(|value| {
        let mut attachments = Vec::new();
        let result = json::to_json_value_with_attachments(&value, &mut attachments)?;
        Ok((result, attachments))
    });

    let (payload, attachments) = match encoded {
        Ok((result, attachments)) => (json_value!({ "result": result }), attachments),
        Err(e) => (json_value!({ "error": RpcError::from(&e) }), Vec::new()),
    };

    let sealed = match cipher {
        Some(cipher) => seal(&payload, attachments, cipher),
        None => Ok((payload, attachments)),
    };
    match sealed {
        Ok((payload, attachments)) => {
            let mut response = Response {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id,
                result: None,
                error: None,
                attachments: attachments.len(),
            };
            if cipher.is_some() {
                response.result = Some(payload);
            } else if let Some(error) = payload.get("error") {
                response.error = serde_json::from_value(error.clone()).ok();
            } else {
                response.result = payload.get("result").cloned();
            }
            (response, attachments)
        }
        Err(e) => (Response::failure(id, &e), Vec::new()),
    }
}

/// Turn a response into the call result, rebuilding remote errors
pub fn decode_outcome(
    response: Response,
    attachments: Vec<Vec<u8>>,
    cipher: Option<&ChannelCipher>,
) -> Result<Variant> {
    if let Some(error) = response.error {
        return Err(error.into());
    }
    let result = response.result.unwrap_or(Value::Null);
    let Some(cipher) = cipher else {
        return json::from_json_value_with_attachments(result, &attachments);
    };

    let (payload, attachments) = unseal(&result, attachments, cipher)?;
    if let Some(error) = payload.get("error") {
        let error: RpcError = serde_json::from_value(error.clone())?;
        return Err(error.into());
    }
    let result = payload.get("result").cloned().unwrap_or(Value::Null);
    json::from_json_value_with_attachments(result, &attachments)
}
