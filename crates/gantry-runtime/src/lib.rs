//! # Gantry Runtime
//!
//! Server runtime and lifecycle management with:
//! - hyper engine adaptation (body limits, read deadline, proxy trust)
//! - Request dispatch through the server and route middleware chains
//! - Server lifecycle (startup, running, shutdown)
//! - Graceful shutdown with signal handling
//! - Tracing subscriber setup

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod engine;
pub mod handler;
pub mod server;
pub mod shutdown;
pub mod telemetry;

pub use engine::EngineSettings;
pub use handler::RequestHandler;
pub use server::{Server, ServerBuilder};
pub use shutdown::{ShutdownSignal, SignalHandler};
pub use telemetry::init_tracing;

/// Runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Server is initializing
    Initializing,
    /// Server is running
    Running,
    /// Server is shutting down
    ShuttingDown,
    /// Server is stopped
    Stopped,
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::server::{Server, ServerBuilder};
    pub use crate::shutdown::{ShutdownSignal, SignalHandler};
    pub use crate::RuntimeState;
    pub use gantry_core::prelude::*;
    pub use gantry_router::{GroupRoute, Route};
}
