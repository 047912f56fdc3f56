#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use dockerpush::error::{BoxError, PushError, Result};
use dockerpush::transport::{Query, ResponseBody, ServerResponse, Transport};
use dockerpush::PrivilegeFunc;
use futures::stream::{self, StreamExt};
use opentelemetry::Context;
use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
pub const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Query,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn registry_auth(&self) -> Option<&str> {
        self.headers
            .get("x-registry-auth")
            .and_then(|value| value.to_str().ok())
    }

    pub fn tag(&self) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == "tag")
            .map(|(_, value)| value.as_str())
    }
}

pub enum Reply {
    Status(u16, &'static str),
    Body(u16, ResponseBody),
    Error(&'static str),
    Hang,
}

/// In-memory transport answering with scripted replies.
pub struct RecordingTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordingTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, path: &str, query: &Query, headers: HeaderMap) -> Result<ServerResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            path: path.to_string(),
            query: query.clone(),
            headers,
        });

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("more requests than scripted replies");

        match reply {
            Reply::Status(code, body) => Ok(ServerResponse::new(
                StatusCode::from_u16(code).unwrap(),
                ResponseBody::from_bytes(body),
            )),
            Reply::Body(code, body) => Ok(ServerResponse::new(StatusCode::from_u16(code).unwrap(), body)),
            Reply::Error(message) => Err(PushError::Transport(message.into())),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Privilege function counting its calls and returning `result` each time.
pub fn privilege_returning(
    calls: Arc<AtomicUsize>,
    result: std::result::Result<&'static str, &'static str>,
) -> PrivilegeFunc {
    PrivilegeFunc::new(move || {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            result.map(str::to_string).map_err(BoxError::from)
        }
    })
}

pub fn traced_context() -> Context {
    let span = SpanContext::new(
        TraceId::from_hex(TRACE_ID).unwrap(),
        SpanId::from_hex("00f067aa0ba902b7").unwrap(),
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    );
    Context::new().with_remote_span_context(span)
}

/// Sets its flag when dropped.
pub struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Body streaming `data` that raises `closed` once the stream is dropped.
pub fn guarded_body(data: &'static str, closed: Arc<AtomicBool>) -> ResponseBody {
    let guard = DropFlag(closed);
    ResponseBody::new(
        stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(data.as_bytes()))]).map(
            move |chunk| {
                let _open = &guard;
                chunk
            },
        ),
    )
}
