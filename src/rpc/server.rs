//! JSON-RPC server on a tokio runtime.
//!
//! Connections are served on the async runtime; each call is executed as a
//! [`Command`] on a blocking worker so processors may block freely.

use super::message::{decode_call, encode_outcome, Request, Response, METHOD_ENCRYPTED, METHOD_EXECUTE};
use super::{cipher_from_config, frame, port_from_config, ChannelCipher, ChannelMode};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::object::{ClassId, CommandProcessor, FinalConstruct, Object, Service};
use crate::variant::Variant;
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

pub const CLSID_JSONRPC_SERVER: ClassId = 0x9C4E_1D08;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_THREADS: usize = 2;
const MAX_THREADS: i64 = 256;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves and executes incoming calls
struct Dispatcher {
    processor: Variant,
    mode: ChannelMode,
    cipher: Option<ChannelCipher>,
}

impl Dispatcher {
    fn dispatch(&self, header: Value, attachments: Vec<Vec<u8>>) -> (Value, Vec<Vec<u8>>) {
        let request: Request = match serde_json::from_value(header) {
            Ok(r) => r,
            Err(e) => return reply(Response::failure(0, &Error::from(e)), Vec::new()),
        };

        let cipher = match self.channel_cipher(&request) {
            Ok(cipher) => cipher,
            Err(e) => {
                warn!(id = request.id, method = %request.method, error = %e, "rpc call rejected");
                return reply(Response::failure(request.id, &e), Vec::new());
            }
        };

        let outcome = decode_call(&request, attachments, cipher).and_then(|(command, params)| {
            debug!(id = request.id, command = %command, encrypted = cipher.is_some(), "rpc call");
            Command::new(&self.processor, command, params)?.execute(&Variant::Null)
        });
        if let Err(e) = &outcome {
            debug!(id = request.id, code = e.code(), error = %e, "rpc call failed");
        }
        let (response, attachments) = encode_outcome(request.id, outcome, cipher);
        reply(response, attachments)
    }

    fn channel_cipher(&self, request: &Request) -> Result<Option<&ChannelCipher>> {
        match request.method.as_str() {
            METHOD_EXECUTE if self.mode.accepts_plain() => Ok(None),
            METHOD_EXECUTE => Err(Error::invalid_usage("plain calls are not accepted on this channel")),
            METHOD_ENCRYPTED if self.mode.accepts_encrypted() => self
                .cipher
                .as_ref()
                .map(Some)
                .ok_or_else(|| Error::invalid_usage("encryption is not configured on this channel")),
            METHOD_ENCRYPTED => Err(Error::invalid_usage("encrypted calls are not accepted on this channel")),
            other => Err(Error::not_supported(format!("unknown method <{other}>"))),
        }
    }
}

fn reply(response: Response, attachments: Vec<Vec<u8>>) -> (Value, Vec<Vec<u8>>) {
    match serde_json::to_value(&response) {
        Ok(value) => (value, attachments),
        Err(e) => {
            let fallback = Response::failure(response.id, &Error::from(e));
            (serde_json::to_value(&fallback).unwrap_or(Value::Null), Vec::new())
        }
    }
}

struct Running {
    runtime: Runtime,
    shutdown: watch::Sender<bool>,
    accept: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl Running {
    /// Let open connections answer their current call, then tear the runtime down
    fn finish(self) {
        let Running {
            runtime,
            shutdown,
            accept,
            local_addr,
        } = self;
        let _ = shutdown.send(true);
        if runtime.block_on(tokio::time::timeout(SHUTDOWN_TIMEOUT, accept)).is_err() {
            warn!(addr = %local_addr, "connections didn't drain in time");
        }
        runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        info!(addr = %local_addr, "json-rpc server stopped");
    }
}

/// Serves commands of `processor` over TCP.
///
/// Config: `{"port", "processor", "host"?, "channelMode"?: "plain"|"encrypted"|"both",
/// "encryption"?, "key"?, "numThreads"?}`. Port 0 binds an ephemeral port.
#[derive(Default)]
pub struct JsonRpcServer {
    host: String,
    port: u16,
    num_threads: usize,
    dispatcher: Option<Arc<Dispatcher>>,
    running: Mutex<Option<Running>>,
}

impl FinalConstruct for JsonRpcServer {
    fn final_construct(&mut self, config: &Variant) -> Result<()> {
        if !config.is_dictionary() {
            return Err(Error::invalid_argument(format!(
                "configuration must be a dictionary, got <{}>",
                config.value_type()
            )));
        }
        self.port = port_from_config(config)?;
        self.host = config.get_or("host", DEFAULT_HOST).convert();

        let processor = config
            .get("processor")
            .ok_or_else(|| Error::invalid_argument("missing field <processor>"))?;
        if !matches!(
            processor.value_type(),
            crate::variant::ValueType::Object | crate::variant::ValueType::String | crate::variant::ValueType::Dictionary
        ) {
            return Err(Error::invalid_argument(format!(
                "field <processor> must be an object, catalog name or descriptor, got <{}>",
                processor.value_type()
            )));
        }

        let mode = ChannelMode::parse(&config.get_or("channelMode", "both").convert::<String>())?;
        let cipher = cipher_from_config(config)?;
        if mode == ChannelMode::Encrypted && cipher.is_none() {
            return Err(Error::invalid_argument("encrypted channel requires field <encryption>"));
        }

        let threads = config.get_or("numThreads", DEFAULT_THREADS as i64).convert::<i64>();
        if !(1..=MAX_THREADS).contains(&threads) {
            return Err(Error::invalid_argument(format!(
                "numThreads must be in 1..={MAX_THREADS}, got {threads}"
            )));
        }
        self.num_threads = threads as usize;
        self.dispatcher = Some(Arc::new(Dispatcher {
            processor: processor.clone(),
            mode,
            cipher,
        }));
        Ok(())
    }
}

impl JsonRpcServer {
    pub fn from_config(config: &Variant) -> Result<Self> {
        let mut server = Self::default();
        server.final_construct(config)?;
        Ok(server)
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

impl Service for JsonRpcServer {
    fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }
        let dispatcher = self
            .dispatcher
            .clone()
            .ok_or_else(|| Error::invalid_usage("server is not configured"))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.num_threads.max(1))
            .thread_name("edr-rpc-server")
            .enable_all()
            .build()?;
        let listener = runtime
            .block_on(TcpListener::bind((self.host.as_str(), self.port)))
            .map_err(|e| Error::from(e).context(format!("can't listen on {}:{}", self.host, self.port)))?;
        let local_addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept = runtime.spawn(accept_loop(listener, dispatcher, shutdown_rx));

        info!(addr = %local_addr, "json-rpc server started");
        *running = Some(Running {
            runtime,
            shutdown,
            accept,
            local_addr,
        });
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };
        let _ = running.shutdown.send(true);
        if Handle::try_current().is_err() {
            running.finish();
            return Ok(());
        }
        // inside a runtime (a "stop" call served by this server) the runtime
        // can't be dropped in place, and the caller still awaits its reply
        std::thread::Builder::new()
            .name("edr-rpc-shutdown".into())
            .spawn(move || running.finish())
            .map(|_| ())
            .map_err(|e| Error::SystemError(format!("can't spawn server shutdown thread: {e}")))
    }
}

impl CommandProcessor for JsonRpcServer {
    fn execute(&self, command: &Variant, _params: &Variant) -> Result<Variant> {
        match command.convert::<String>().as_str() {
            "start" => self.start().map(|_| Variant::Null),
            "stop" => self.stop().map(|_| Variant::Null),
            other => Err(Error::not_supported(format!("JsonRpcServer doesn't support command <{other}>"))),
        }
    }
}

impl Object for JsonRpcServer {
    fn class_id(&self) -> ClassId {
        CLSID_JSONRPC_SERVER
    }

    fn command_processor(self: Arc<Self>) -> Option<Arc<dyn CommandProcessor>> {
        Some(self)
    }

    fn service(self: Arc<Self>) -> Option<Arc<dyn Service>> {
        Some(self)
    }
}

impl Drop for JsonRpcServer {
    fn drop(&mut self) {
        let _ = Service::stop(self);
    }
}

async fn accept_loop(listener: TcpListener, dispatcher: Arc<Dispatcher>, mut shutdown: watch::Receiver<bool>) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    debug!(%peer, "connection accepted");
                    connections.spawn(serve_connection(socket, Arc::clone(&dispatcher), shutdown.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    drop(listener);
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(mut socket: TcpStream, dispatcher: Arc<Dispatcher>, mut shutdown: watch::Receiver<bool>) {
    let _ = socket.set_nodelay(true);
    loop {
        let message = tokio::select! {
            message = frame::read_message_async(&mut socket) => message,
            _ = shutdown.changed() => break,
        };
        let (header, attachments) = match message {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "malformed rpc message, closing connection");
                break;
            }
        };

        let dispatcher = Arc::clone(&dispatcher);
        let (header, attachments) =
            match tokio::task::spawn_blocking(move || dispatcher.dispatch(header, attachments)).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!(error = %e, "rpc handler panicked");
                    break;
                }
            };
        if let Err(e) = frame::write_message_async(&mut socket, &header, &attachments).await {
            warn!(error = %e, "can't send rpc response");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;
    use crate::object::create_object;

    #[test]
    fn test_config_validation() {
        for config in [
            Variant::from(5),
            dict! { "processor" => "x" },
            dict! { "port" => 0 },
            dict! { "port" => 0, "processor" => 5 },
            dict! { "port" => 0, "processor" => "x", "channelMode" => "encrypted" },
            dict! { "port" => 0, "processor" => "x", "channelMode" => "udp" },
            dict! { "port" => 0, "processor" => "x", "numThreads" => 0 },
            dict! { "port" => 0, "processor" => "x", "numThreads" => i64::MAX },
        ] {
            let err = create_object(CLSID_JSONRPC_SERVER, &config).err().unwrap();
            assert!(matches!(err, Error::InvalidArgument(_)), "{config}: {err:?}");
        }
    }

    #[test]
    fn test_start_stop_ephemeral_port() {
        let server = JsonRpcServer::from_config(&dict! { "port" => 0, "processor" => "test.server.none" }).unwrap();
        assert!(server.local_addr().is_none());
        server.start().unwrap();
        server.start().unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        server.stop().unwrap();
        assert!(!server.is_running());
    }

    /// echo, fail{code}, blob{size}
    struct Remote;

    impl Object for Remote {
        fn class_id(&self) -> ClassId {
            0x0C0D_0101
        }

        fn command_processor(self: Arc<Self>) -> Option<Arc<dyn CommandProcessor>> {
            Some(self)
        }
    }

    impl CommandProcessor for Remote {
        fn execute(&self, command: &Variant, params: &Variant) -> Result<Variant> {
            match command.convert::<String>().as_str() {
                "echo" => Ok(params.clone()),
                "fail" => Err(Error::from_code(params.get_or("code", 0).convert::<i64>() as i32, "boom")),
                "blob" => {
                    let size = params.get_or("size", 0).convert::<i64>() as usize;
                    Ok(Variant::from(crate::object::create_memory_stream(vec![0xAB; size])))
                }
                other => Err(Error::not_supported(other.to_string())),
            }
        }
    }

    fn serve(extra: Variant) -> (JsonRpcServer, u16) {
        let processor: crate::object::ObjPtr = Arc::new(Remote);
        let base = dict! { "port" => 0, "processor" => processor };
        let config = crate::variant::merge(&base, &extra, crate::variant::MergeMode::empty()).unwrap();
        let server = JsonRpcServer::from_config(&config).unwrap();
        server.start().unwrap();
        let port = server.local_addr().unwrap().port();
        (server, port)
    }

    fn client(port: u16, extra: Variant) -> crate::rpc::JsonRpcClient {
        let base = dict! { "host" => "127.0.0.1", "port" => port as i64, "timeout" => 5 };
        let config = crate::variant::merge(&base, &extra, crate::variant::MergeMode::empty()).unwrap();
        crate::rpc::JsonRpcClient::from_config(&config).unwrap()
    }

    #[test]
    fn test_remote_echo_and_errors() {
        let (_server, port) = serve(Variant::Null);
        let client = client(port, Variant::Null);

        let params = dict! { "a" => 1, "list" => crate::seq![true, "x"] };
        assert_eq!(client.execute(&"echo".into(), &params).unwrap(), params);

        let type_error = Error::type_error("").code() as i64;
        let err = client.execute(&"fail".into(), &dict! { "code" => type_error }).unwrap_err();
        assert!(matches!(err, Error::TypeError(_)), "{err:?}");

        let err = client.execute(&"fail".into(), &dict! { "code" => 42 }).unwrap_err();
        assert_eq!(err, Error::Exception { code: 42, message: "boom".into() });
    }

    #[test]
    fn test_remote_stream_results() {
        let (_server, port) = serve(Variant::Null);
        let client = client(port, Variant::Null);
        for size in [4usize, 0] {
            let result = client.execute(&"blob".into(), &dict! { "size" => size as i64 }).unwrap();
            let stream = result.as_stream().unwrap();
            assert_eq!(stream.size(), size as u64);
            assert_eq!(crate::object::read_all(stream.as_ref()).unwrap(), vec![0xAB; size]);
        }
    }

    #[test]
    fn test_encrypted_channel() {
        let (_server, port) = serve(dict! { "channelMode" => "encrypted", "encryption" => "aes", "key" => "k1" });
        let secure = client(port, dict! { "channelMode" => "encrypted", "encryption" => "aes", "key" => "k1" });
        assert_eq!(secure.execute(&"echo".into(), &dict! { "n" => 7 }).unwrap(), dict! { "n" => 7 });

        let plain = client(port, Variant::Null);
        let err = plain.execute(&"echo".into(), &Variant::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)), "{err:?}");
    }

    #[test]
    fn test_plain_only_rejects_encrypted_calls() {
        let (_server, port) = serve(dict! { "channelMode" => "plain" });
        let secure = client(port, dict! { "channelMode" => "encrypted", "encryption" => "aes" });
        let err = secure.execute(&"echo".into(), &Variant::Null).unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)), "{err:?}");
    }

    #[test]
    fn test_stop_over_rpc_replies_then_stops() {
        let server = create_object(CLSID_JSONRPC_SERVER, &dict! { "port" => 0, "processor" => "test.server.self" }).unwrap();
        crate::object::put_catalog_data("test.server.self", server.clone());
        let service = crate::object::query_interface::<dyn Service>(&server).unwrap();
        service.start().unwrap();
        let concrete = crate::object::downcast::<JsonRpcServer>(&server).unwrap();
        let port = concrete.local_addr().unwrap().port();

        let remote = client(port, dict! { "timeout" => 1 });
        assert_eq!(remote.execute(&"stop".into(), &Variant::Null).unwrap(), Variant::Null);
        assert!(!concrete.is_running());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
            assert!(std::time::Instant::now() < deadline, "listener still open after stop");
            std::thread::sleep(Duration::from_millis(20));
        }

        crate::object::put_catalog_data("test.server.self", Variant::Null);
    }

    #[test]
    fn test_unknown_command() {
        let server = JsonRpcServer::from_config(&dict! { "port" => 0, "processor" => "x" }).unwrap();
        let err = server.execute(&"restart".into(), &Variant::Null).unwrap_err();
        assert!(matches!(err, Error::OperationNotSupported(_)));
    }
}
