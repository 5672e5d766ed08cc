//! Blocking JSON-RPC client.

use super::message::{decode_outcome, encode_call, Response};
use super::{cipher_from_config, frame, port_from_config, ChannelCipher, ChannelMode};
use crate::error::{Error, Result};
use crate::object::{ClassId, CommandProcessor, DataReceiver, FinalConstruct, Object};
use crate::variant::Variant;
use rand::Rng;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const CLSID_JSONRPC_CLIENT: ClassId = 0x9C4E_1D07;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const MAX_CONNECT_ATTEMPT: Duration = Duration::from_secs(5);

/// Executes commands on a remote [`JsonRpcServer`](super::JsonRpcServer).
///
/// Config: `{"host", "port", "protocol"?: "TCP", "timeout"?: seconds (-1 = none),
/// "channelMode"?: "plain"|"encrypted", "encryption"?, "key"?}`.
#[derive(Default)]
pub struct JsonRpcClient {
    host: String,
    port: u16,
    timeout: Option<Duration>,
    mode: ChannelMode,
    cipher: Option<ChannelCipher>,
    next_id: AtomicU64,
}

impl FinalConstruct for JsonRpcClient {
    fn final_construct(&mut self, config: &Variant) -> Result<()> {
        if !config.is_dictionary() {
            return Err(Error::invalid_argument(format!(
                "configuration must be a dictionary, got <{}>",
                config.value_type()
            )));
        }

        let protocol = config.get_or("protocol", "TCP").convert::<String>();
        if !protocol.eq_ignore_ascii_case("tcp") {
            return Err(Error::invalid_argument(format!("unsupported protocol <{protocol}>")));
        }

        self.host = config
            .get("host")
            .and_then(Variant::as_str)
            .ok_or_else(|| Error::invalid_argument("missing field <host>"))?
            .to_string();
        self.port = port_from_config(config)?;

        self.timeout = match config.get("timeout") {
            None => Some(DEFAULT_TIMEOUT),
            Some(v) => match v.as_int() {
                Some(-1) => None,
                Some(secs) if secs > 0 => Some(Duration::from_secs(secs as u64)),
                Some(secs) => return Err(Error::invalid_argument(format!("invalid timeout {secs}"))),
                None => {
                    return Err(Error::type_error(format!(
                        "field <timeout> must be an integer, got <{}>",
                        v.value_type()
                    )))
                }
            },
        };

        self.mode = ChannelMode::parse(&config.get_or("channelMode", "plain").convert::<String>())?;
        match self.mode {
            ChannelMode::Plain => {}
            ChannelMode::Encrypted => {
                self.cipher = cipher_from_config(config)?;
                if self.cipher.is_none() {
                    return Err(Error::invalid_argument("encrypted channel requires field <encryption>"));
                }
            }
            ChannelMode::Both => {
                return Err(Error::invalid_argument("channel mode <both> is valid for servers only"));
            }
        }
        Ok(())
    }
}

impl JsonRpcClient {
    pub fn from_config(config: &Variant) -> Result<Self> {
        let mut client = Self::default();
        client.final_construct(config)?;
        Ok(client)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Send one call and wait for its outcome
    pub fn call(&self, command: &Variant, params: &Variant) -> Result<Variant> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cipher = self.cipher.as_ref();
        let (request, attachments) = encode_call(id, command, params, cipher)?;

        let mut stream = self.connect(deadline)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(remaining(deadline)?)?;
        frame::write_message(&mut stream, &serde_json::to_value(&request)?, &attachments)?;

        stream.set_read_timeout(remaining(deadline)?)?;
        let (header, attachments) = frame::read_message(&mut stream).map_err(|e| match e {
            Error::Timeout(_) => Error::Timeout(format!(
                "no response from {} for command <{}>",
                self.endpoint(),
                command.convert::<String>()
            )),
            other => other,
        })?;
        let response: Response = serde_json::from_value(header)?;
        if response.id != id {
            return Err(Error::invalid_format(format!(
                "response id {} doesn't match request id {id}",
                response.id
            )));
        }
        debug!(endpoint = %self.endpoint(), id, "rpc call completed");
        decode_outcome(response, attachments, cipher)
    }

    /// Connect with exponential backoff until `deadline`
    fn connect(&self, deadline: Option<Instant>) -> Result<TcpStream> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempts = 0u32;
        let mut last_error = None;
        loop {
            let left = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if left == Some(Duration::ZERO) {
                let reason = last_error
                    .map(|e: Error| e.message().to_string())
                    .unwrap_or_else(|| "deadline exceeded".to_string());
                return Err(Error::ConnectionError(format!(
                    "can't connect to {} after {attempts} attempt(s): {reason}",
                    self.endpoint()
                )));
            }

            attempts += 1;
            let attempt_timeout = left.unwrap_or(MAX_CONNECT_ATTEMPT).min(MAX_CONNECT_ATTEMPT);
            match self.try_connect(attempt_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(endpoint = %self.endpoint(), attempts, error = %e, "connect failed");
                    last_error = Some(e);
                }
            }

            let left = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..50));
            std::thread::sleep((backoff + jitter).min(left.unwrap_or(Duration::MAX)));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    fn try_connect(&self, timeout: Duration) -> Result<TcpStream> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::ConnectionError(format!("can't resolve {}: {e}", self.endpoint())))?
            .collect();
        let mut last = Error::ConnectionError(format!("no address for {}", self.endpoint()));
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last = Error::ConnectionError(e.to_string()),
            }
        }
        Err(last)
    }
}

/// Time left before `deadline`; `Timeout` once it has passed
fn remaining(deadline: Option<Instant>) -> Result<Option<Duration>> {
    match deadline {
        None => Ok(None),
        Some(d) => {
            let left = d.saturating_duration_since(Instant::now());
            if left.is_zero() {
                Err(Error::Timeout("call deadline exceeded".into()))
            } else {
                Ok(Some(left))
            }
        }
    }
}

impl CommandProcessor for JsonRpcClient {
    fn execute(&self, command: &Variant, params: &Variant) -> Result<Variant> {
        self.call(command, params)
    }
}

impl DataReceiver for JsonRpcClient {
    fn put(&self, data: &Variant) {
        let params = crate::dict! { "data" => data.clone() };
        if let Err(e) = self.call(&"put".into(), &params) {
            warn!(endpoint = %self.endpoint(), code = e.code(), error = %e, "remote put failed");
        }
    }
}

impl Object for JsonRpcClient {
    fn class_id(&self) -> ClassId {
        CLSID_JSONRPC_CLIENT
    }

    fn command_processor(self: Arc<Self>) -> Option<Arc<dyn CommandProcessor>> {
        Some(self)
    }

    fn data_receiver(self: Arc<Self>) -> Option<Arc<dyn DataReceiver>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;
    use crate::object::create_object;

    #[test]
    fn test_config_validation() {
        let cases: Vec<(Variant, fn(&Error) -> bool)> = vec![
            (Variant::from("host:1"), |e| matches!(e, Error::InvalidArgument(_))),
            (dict! { "port" => 1 }, |e| matches!(e, Error::InvalidArgument(_))),
            (dict! { "host" => "localhost" }, |e| matches!(e, Error::InvalidArgument(_))),
            (
                dict! { "host" => "localhost", "port" => 1, "protocol" => "UDP" },
                |e| matches!(e, Error::InvalidArgument(_)),
            ),
            (
                dict! { "host" => "localhost", "port" => 1, "timeout" => "10" },
                |e| matches!(e, Error::TypeError(_)),
            ),
            (
                dict! { "host" => "localhost", "port" => 1, "channelMode" => "both" },
                |e| matches!(e, Error::InvalidArgument(_)),
            ),
            (
                dict! { "host" => "localhost", "port" => 1, "channelMode" => "encrypted" },
                |e| matches!(e, Error::InvalidArgument(_)),
            ),
        ];
        for (config, check) in cases {
            let err = create_object(CLSID_JSONRPC_CLIENT, &config).err().unwrap();
            assert!(check(&err), "{config}: {err:?}");
        }
    }

    #[test]
    fn test_valid_config() {
        let client = JsonRpcClient::from_config(&dict! {
            "host" => "127.0.0.1",
            "port" => 9000,
            "timeout" => -1,
            "channelMode" => "encrypted",
            "encryption" => "aes",
        })
        .unwrap();
        assert_eq!(client.endpoint(), "127.0.0.1:9000");
        assert!(client.timeout.is_none());
        assert!(client.cipher.is_some());
    }

    #[test]
    fn test_unreachable_server_fails_after_timeout() {
        // bind then drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let client = JsonRpcClient::from_config(&dict! { "host" => "127.0.0.1", "port" => port, "timeout" => 1 }).unwrap();
        let started = Instant::now();
        let err = client.call(&"ping".into(), &Variant::Null).unwrap_err();
        assert!(matches!(err, Error::ConnectionError(_) | Error::Timeout(_)), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
