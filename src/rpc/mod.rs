//! JSON-RPC transport: run commands in another process.
//!
//! - [`JsonRpcClient`]: blocking client, a CommandProcessor for remote commands
//! - [`JsonRpcServer`]: tokio server executing incoming calls as Commands
//! - [`frame`]: length-prefixed framing with binary attachments
//! - [`message`]: request/response envelopes
//! - [`cipher`]: AES-256-GCM channel encryption

pub mod cipher;
mod client;
pub mod frame;
pub mod message;
mod server;

pub use cipher::ChannelCipher;
pub use client::{JsonRpcClient, CLSID_JSONRPC_CLIENT};
pub use server::{JsonRpcServer, CLSID_JSONRPC_SERVER};

use crate::error::{Error, Result};
use crate::variant::Variant;
use std::fmt;

/// Which call encodings a channel accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    #[default]
    Plain,
    Encrypted,
    /// Server only: accept both plain and encrypted calls
    Both,
}

impl ChannelMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(ChannelMode::Plain),
            "encrypted" => Ok(ChannelMode::Encrypted),
            "both" => Ok(ChannelMode::Both),
            _ => Err(Error::invalid_argument(format!("unknown channel mode <{s}>"))),
        }
    }

    pub fn accepts_plain(self) -> bool {
        matches!(self, ChannelMode::Plain | ChannelMode::Both)
    }

    pub fn accepts_encrypted(self) -> bool {
        matches!(self, ChannelMode::Encrypted | ChannelMode::Both)
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelMode::Plain => "plain",
            ChannelMode::Encrypted => "encrypted",
            ChannelMode::Both => "both",
        })
    }
}

/// Cipher from `encryption` (algorithm name) and optional `key` (secret)
fn cipher_from_config(config: &Variant) -> Result<Option<ChannelCipher>> {
    let Some(algorithm) = config.get("encryption") else {
        return Ok(None);
    };
    let algorithm = algorithm
        .as_str()
        .ok_or_else(|| Error::invalid_argument("field <encryption> must be a string"))?;
    let secret = match config.get("key") {
        Some(key) => key
            .as_str()
            .ok_or_else(|| Error::invalid_argument("field <key> must be a string"))?
            .as_bytes()
            .to_vec(),
        None => cipher::DEFAULT_SECRET.to_vec(),
    };
    ChannelCipher::new(algorithm, &secret).map(Some)
}

/// Integer port in 0..=65535
fn port_from_config(config: &Variant) -> Result<u16> {
    let port = config
        .get("port")
        .ok_or_else(|| Error::invalid_argument("missing field <port>"))?;
    let port = port
        .as_int()
        .ok_or_else(|| Error::invalid_argument(format!("field <port> must be an integer, got <{}>", port.value_type())))?;
    u16::try_from(port).map_err(|_| Error::invalid_argument(format!("port {port} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;

    #[test]
    fn test_channel_mode_parse() {
        assert_eq!(ChannelMode::parse("Plain").unwrap(), ChannelMode::Plain);
        assert_eq!(ChannelMode::parse("both").unwrap(), ChannelMode::Both);
        assert!(ChannelMode::Both.accepts_plain() && ChannelMode::Both.accepts_encrypted());
        assert!(!ChannelMode::Encrypted.accepts_plain());
        assert!(matches!(ChannelMode::parse("tls"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_port_from_config() {
        assert_eq!(port_from_config(&dict! { "port" => 8080 }).unwrap(), 8080);
        assert!(matches!(port_from_config(&dict! {}), Err(Error::InvalidArgument(_))));
        assert!(matches!(port_from_config(&dict! { "port" => 70000 }), Err(Error::InvalidArgument(_))));
        assert!(matches!(port_from_config(&dict! { "port" => "80" }), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_cipher_from_config() {
        assert!(cipher_from_config(&dict! {}).unwrap().is_none());
        assert!(cipher_from_config(&dict! { "encryption" => "aes", "key" => "s3cret" }).unwrap().is_some());
        assert!(matches!(
            cipher_from_config(&dict! { "encryption" => "des" }),
            Err(Error::InvalidArgument(_))
        ));
    }
}
