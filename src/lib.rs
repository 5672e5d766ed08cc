//! EDR agent runtime: object model, command dispatch and scenario scheduling
//! for endpoint agents.
//!
//! Modular structure:
//! - [`variant`]: Dynamic value type, merge and JSON serialization
//! - [`object`]: Objects, capabilities, class registry and catalog
//! - [`command`]: Bound commands with default parameters
//! - [`scenario`]: Command lists scheduled onto prioritized thread pools
//! - [`rpc`]: JSON-RPC client and server, optional channel encryption
//! - [`correlator`]: Copy-to-removable-media detection
//! - [`logging`]: Structured JSON logging
//! - [`config`] / [`app`]: Configuration and service lifecycle

pub mod app;
pub mod command;
pub mod config;
pub mod correlator;
pub mod error;
pub mod logging;
pub mod object;
pub mod platform;
pub mod rpc;
pub mod scenario;
pub mod variant;

pub use app::Application;
pub use command::{create_command, exec_command, Command};
pub use config::AgentConfig;
pub use correlator::RemovableCopyCorrelator;
pub use error::{Error, ErrorCode, Result};
pub use logging::StructuredLogger;
pub use object::{ObjPtr, Object};
pub use rpc::{JsonRpcClient, JsonRpcServer};
pub use scenario::{ScenarioManager, ThreadPool};
pub use variant::Variant;
