//! Trace context injection

use crate::context::PushContext;
use crate::error::InjectError;
use crate::propagation::carrier::HeaderCarrier;
use opentelemetry::Context;
use opentelemetry::propagation::{Injector, TextMapCompositePropagator, TextMapPropagator};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use std::collections::HashMap;
use tracing::debug;

/// Serializes a trace context into request headers.
///
/// Passed to the client explicitly instead of living in a process-wide
/// global, so callers without tracing simply pass nothing.
pub trait Tracer: Send + Sync {
    fn inject(&self, cx: &Context, carrier: &mut dyn HeaderCarrier) -> Result<(), InjectError>;
}

/// [`Tracer`] backed by an OpenTelemetry text map propagator.
#[derive(Debug)]
pub struct PropagatorTracer {
    propagator: Box<dyn TextMapPropagator + Send + Sync>,
}

impl PropagatorTracer {
    pub fn new<P>(propagator: P) -> Self
    where
        P: TextMapPropagator + Send + Sync + 'static,
    {
        Self {
            propagator: Box::new(propagator),
        }
    }

    /// W3C `traceparent`/`tracestate` plus `baggage`.
    pub fn w3c() -> Self {
        Self::new(TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]))
    }

    /// Rebuild a context from previously serialized fields, e.g. a
    /// `traceparent` handed down by a parent process.
    pub fn extract(&self, fields: &HashMap<String, String>) -> Context {
        self.propagator.extract(fields)
    }
}

impl Default for PropagatorTracer {
    fn default() -> Self {
        Self::w3c()
    }
}

impl Tracer for PropagatorTracer {
    fn inject(&self, cx: &Context, carrier: &mut dyn HeaderCarrier) -> Result<(), InjectError> {
        let mut injector = CarrierInjector {
            carrier,
            error: None,
        };
        self.propagator.inject_context(cx, &mut injector);
        match injector.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// Keeps going after a rejected field and reports the first failure.
struct CarrierInjector<'a> {
    carrier: &'a mut dyn HeaderCarrier,
    error: Option<InjectError>,
}

impl Injector for CarrierInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let Err(err) = self.carrier.set(key, &value) {
            self.error.get_or_insert(err);
        }
    }
}

/// Add the trace headers for the active span of `cx` to `carrier`.
///
/// Does nothing when there is no active span or no tracer. Injection
/// failures are logged and dropped; whatever was written before the
/// failure stays in the carrier.
pub fn inject_trace_context(
    cx: &PushContext,
    tracer: Option<&dyn Tracer>,
    carrier: &mut dyn HeaderCarrier,
) {
    let Some(span) = cx.active_span() else {
        return;
    };
    let Some(tracer) = tracer else {
        debug!(trace_id = %span.trace_id(), "active span but no tracer configured");
        return;
    };

    if let Err(err) = tracer.inject(cx.otel_context(), carrier) {
        debug!(trace_id = %span.trace_id(), error = %err, "trace context injection failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
    use reqwest::header::{HeaderMap, HeaderValue};

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn traced_context() -> PushContext {
        let span = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        PushContext::new().with_otel_context(Context::new().with_remote_span_context(span))
    }

    struct FailingTracer;

    impl Tracer for FailingTracer {
        fn inject(&self, _cx: &Context, carrier: &mut dyn HeaderCarrier) -> Result<(), InjectError> {
            carrier.set("traceparent", TRACEPARENT)?;
            Err(InjectError::InvalidValue("tracestate".to_string()))
        }
    }

    #[test]
    fn test_injects_w3c_headers_for_active_span() {
        let tracer = PropagatorTracer::w3c();
        let mut headers = HeaderMap::new();
        headers.insert("x-registry-auth", HeaderValue::from_static("auth"));

        inject_trace_context(&traced_context(), Some(&tracer), &mut headers);

        assert_eq!(headers.get("traceparent").unwrap(), TRACEPARENT);
        assert_eq!(headers.get("x-registry-auth").unwrap(), "auth");
    }

    #[test]
    fn test_no_span_means_no_headers() {
        let tracer = PropagatorTracer::w3c();
        let mut headers = HeaderMap::new();

        inject_trace_context(&PushContext::new(), Some(&tracer), &mut headers);

        assert!(headers.is_empty());
    }

    #[test]
    fn test_no_tracer_means_no_headers() {
        let mut headers = HeaderMap::new();
        inject_trace_context(&traced_context(), None, &mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_injection_failure_is_swallowed() {
        let mut headers = HeaderMap::new();
        inject_trace_context(&traced_context(), Some(&FailingTracer), &mut headers);
        assert_eq!(headers.get("traceparent").unwrap(), TRACEPARENT);
    }

    #[test]
    fn test_extract_round_trips_traceparent() {
        let tracer = PropagatorTracer::w3c();
        let mut fields = HashMap::new();
        fields.insert("traceparent".to_string(), TRACEPARENT.to_string());

        let cx = PushContext::new().with_otel_context(tracer.extract(&fields));
        let span = cx.active_span().expect("extracted span");
        assert_eq!(span.trace_id().to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert!(span.is_remote());
    }
}
