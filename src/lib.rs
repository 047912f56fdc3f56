//! Docker engine image push client
//!
//! Asks a Docker engine to push an image to its registry, retrying once
//! with refreshed credentials when the registry answers unauthorized, and
//! forwarding the caller's trace context to the engine.

pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod jsonmessage;
pub mod logging;
pub mod output;
pub mod propagation;
pub mod reference;
pub mod transport;

pub use client::{Client, ClientBuilder, ImagePushOptions, PrivilegeFunc};
pub use config::{AuthConfig, Config};
pub use context::PushContext;
pub use error::{PushError, Result};
pub use output::OutputManager;
pub use reference::Reference;
pub use transport::{HttpTransport, ResponseBody, ServerResponse, Transport};
