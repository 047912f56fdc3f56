//! Execution context for a push
//!
//! Carries what a call inherits from its caller: the OpenTelemetry
//! context holding the active span and baggage, a cancellation token and
//! an optional deadline.

use crate::error::{PushError, Result};
use opentelemetry::Context;
use opentelemetry::trace::{SpanContext, TraceContextExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct PushContext {
    otel: Context,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl PushContext {
    /// A context with no span, no deadline and a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inherit the OpenTelemetry context attached to the current thread.
    pub fn current() -> Self {
        Self::new().with_otel_context(Context::current())
    }

    pub fn with_otel_context(mut self, otel: Context) -> Self {
        self.otel = otel;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn otel_context(&self) -> &Context {
        &self.otel
    }

    /// The span context of the active span, if there is one.
    pub fn active_span(&self) -> Option<SpanContext> {
        if self.otel.has_active_span() {
            Some(self.otel.span().span_context().clone())
        } else {
            None
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The error this context would abort with right now, if any.
    pub fn err(&self) -> Option<PushError> {
        if self.cancel.is_cancelled() {
            return Some(PushError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(PushError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Drive `fut` to completion unless the context is cancelled or its
    /// deadline passes first. Cancellation wins ties.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PushError::Cancelled),
            _ = deadline => Err(PushError::DeadlineExceeded),
            result = fut => result,
        }
    }
}
