//! Trace context propagation into outgoing request headers
//!
//! The [`HeaderCarrier`] trait is the only surface a [`Tracer`] writes
//! through, so the transport's header type never leaks into tracing code.

pub mod carrier;
pub mod injector;

pub use carrier::{HeaderCarrier, META_HEADER_PREFIX, MetaHeaderCarrier};
pub use injector::{PropagatorTracer, Tracer, inject_trace_context};
