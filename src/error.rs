//! Error taxonomy shared by every runtime component.
//!
//! Each kind carries a stable numeric [`ErrorCode`] so that failures can cross a
//! process boundary (JSON-RPC) and be rebuilt into the same kind on the other side.

use std::io;
use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stable numeric error codes (sent over the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    LogicError = 0xE001_0000_u32 as i32,
    InvalidArgument = 0xE001_0001_u32 as i32,
    InvalidUsage = 0xE001_0002_u32 as i32,
    OutOfRange = 0xE001_0003_u32 as i32,
    TypeError = 0xE001_0004_u32 as i32,
    RuntimeError = 0xE002_0000_u32 as i32,
    NotFound = 0xE002_0004_u32 as i32,
    InvalidFormat = 0xE002_0005_u32 as i32,
    OperationNotSupported = 0xE002_0009_u32 as i32,
    ConnectionError = 0xE002_000A_u32 as i32,
    Timeout = 0xE002_0013_u32 as i32,
    SystemError = 0xE003_0000_u32 as i32,
}

impl ErrorCode {
    const ALL: [ErrorCode; 12] = [
        ErrorCode::LogicError,
        ErrorCode::InvalidArgument,
        ErrorCode::InvalidUsage,
        ErrorCode::OutOfRange,
        ErrorCode::TypeError,
        ErrorCode::RuntimeError,
        ErrorCode::NotFound,
        ErrorCode::InvalidFormat,
        ErrorCode::OperationNotSupported,
        ErrorCode::ConnectionError,
        ErrorCode::Timeout,
        ErrorCode::SystemError,
    ];

    /// Look up a known code; `None` for codes this process does not recognise.
    pub fn from_i32(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as i32 == code)
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Default description used when an error carries no message
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::LogicError => "Logic error",
            ErrorCode::InvalidArgument => "Invalid argument",
            ErrorCode::InvalidUsage => "Invalid usage scenario",
            ErrorCode::OutOfRange => "Out of range",
            ErrorCode::TypeError => "Type error",
            ErrorCode::RuntimeError => "Runtime error",
            ErrorCode::NotFound => "Resource is not found",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::OperationNotSupported => "Operation is not supported",
            ErrorCode::ConnectionError => "Connection error",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::SystemError => "System error",
        }
    }
}

/// Runtime error kinds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Logic error: {0}")]
    LogicError(String),

    /// Malformed or missing configuration / call parameters
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not permitted in the current state
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Capability not implemented or wrong value type
    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed serialized data
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Unrecognized command token
    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("System error: {0}")]
    SystemError(String),

    /// Error with a code this process does not know (usually from a remote peer)
    #[error("Exception {code:#010x}: {message}")]
    Exception { code: i32, message: String },
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Error::TypeError(msg.into())
    }

    pub fn invalid_usage(msg: impl Into<String>) -> Self {
        Error::InvalidUsage(msg.into())
    }

    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Error::InvalidFormat(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Error::OperationNotSupported(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Error::RuntimeError(msg.into())
    }

    /// Numeric code of this error (wire representation)
    pub fn code(&self) -> i32 {
        let known = match self {
            Error::LogicError(_) => ErrorCode::LogicError,
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::InvalidUsage(_) => ErrorCode::InvalidUsage,
            Error::OutOfRange(_) => ErrorCode::OutOfRange,
            Error::TypeError(_) => ErrorCode::TypeError,
            Error::RuntimeError(_) => ErrorCode::RuntimeError,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::InvalidFormat(_) => ErrorCode::InvalidFormat,
            Error::OperationNotSupported(_) => ErrorCode::OperationNotSupported,
            Error::ConnectionError(_) => ErrorCode::ConnectionError,
            Error::Timeout(_) => ErrorCode::Timeout,
            Error::SystemError(_) => ErrorCode::SystemError,
            Error::Exception { code, .. } => return *code,
        };
        known.as_i32()
    }

    /// Message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Error::LogicError(m)
            | Error::InvalidArgument(m)
            | Error::InvalidUsage(m)
            | Error::OutOfRange(m)
            | Error::TypeError(m)
            | Error::RuntimeError(m)
            | Error::NotFound(m)
            | Error::InvalidFormat(m)
            | Error::OperationNotSupported(m)
            | Error::ConnectionError(m)
            | Error::Timeout(m)
            | Error::SystemError(m) => m,
            Error::Exception { message, .. } => message,
        }
    }

    /// Rebuild a typed error from its wire form.
    ///
    /// Codes unknown to this process become [`Error::Exception`] so the failure is
    /// never lost or coerced into an unrelated kind.
    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        let mut message = message.into();
        let Some(known) = ErrorCode::from_i32(code) else {
            return Error::Exception { code, message };
        };
        if message.is_empty() {
            message = known.description().to_string();
        }
        match known {
            ErrorCode::LogicError => Error::LogicError(message),
            ErrorCode::InvalidArgument => Error::InvalidArgument(message),
            ErrorCode::InvalidUsage => Error::InvalidUsage(message),
            ErrorCode::OutOfRange => Error::OutOfRange(message),
            ErrorCode::TypeError => Error::TypeError(message),
            ErrorCode::RuntimeError => Error::RuntimeError(message),
            ErrorCode::NotFound => Error::NotFound(message),
            ErrorCode::InvalidFormat => Error::InvalidFormat(message),
            ErrorCode::OperationNotSupported => Error::OperationNotSupported(message),
            ErrorCode::ConnectionError => Error::ConnectionError(message),
            ErrorCode::Timeout => Error::Timeout(message),
            ErrorCode::SystemError => Error::SystemError(message),
        }
    }

    /// True when this error has `code` or belongs to the family `code` heads.
    /// A family code has its low 16 bits clear (`LogicError` heads `InvalidArgument`).
    pub fn is_based_on(&self, code: i32) -> bool {
        let own = self.code();
        own == code || (code & 0xFFFF == 0 && own & !0xFFFF == code)
    }

    /// Prefix the message with context, keeping the kind
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        let code = self.code();
        let message = format!("{}: {}", ctx, self.message());
        Error::from_code(code, message)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout(e.to_string()),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Error::ConnectionError(e.to_string()),
            _ => Error::SystemError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidFormat(e.to_string())
    }
}
