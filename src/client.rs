//! Engine API client for pushing images
//!
//! [`Client::image_push`] asks the engine to push an image to its registry.
//! When the engine answers 401 and the caller supplied a
//! [`PrivilegeFunc`], the push is retried once with the credentials that
//! function returns.

use crate::context::PushContext;
use crate::error::{BoxError, PushError, Result};
use crate::propagation::{MetaHeaderCarrier, Tracer, inject_trace_context};
use crate::reference::Reference;
use crate::transport::{Query, ResponseBody, ServerResponse, Transport};
use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Header carrying the opaque registry credential blob.
pub const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

// Bytes read from a rejected response before it is dropped.
const DISCARD_LIMIT: usize = 512;

/// Callback producing fresh registry credentials after an unauthorized push.
#[derive(Clone)]
pub struct PrivilegeFunc(Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<String, BoxError>> + Send + Sync>);

impl PrivilegeFunc {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<String, BoxError>> + Send + 'static,
    {
        Self(Arc::new(move || f().boxed()))
    }

    pub async fn call(&self) -> std::result::Result<String, BoxError> {
        (self.0)().await
    }
}

impl fmt::Debug for PrivilegeFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivilegeFunc")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImagePushOptions {
    /// Credential blob forwarded verbatim to the engine.
    pub registry_auth: String,
    pub privilege_func: Option<PrivilegeFunc>,
}

impl ImagePushOptions {
    pub fn new(registry_auth: impl Into<String>) -> Self {
        Self {
            registry_auth: registry_auth.into(),
            privilege_func: None,
        }
    }

    pub fn with_privilege_func(mut self, privilege_func: PrivilegeFunc) -> Self {
        self.privilege_func = Some(privilege_func);
        self
    }
}

// A push makes at most two attempts: SecondAttempt can only lead to Done.
enum PushState<'a> {
    FirstAttempt,
    Refreshing {
        rejected: ServerResponse,
        privilege: &'a PrivilegeFunc,
    },
    SecondAttempt {
        registry_auth: String,
    },
    Done(ServerResponse),
}

pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl ClientBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn build(self) -> Client {
        Client {
            transport: self.transport,
            tracer: self.tracer,
        }
    }
}

#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder::new(transport)
    }

    /// Request the engine to push `image` to its registry.
    ///
    /// Returns the engine's progress stream; the caller owns it and closes
    /// it by dropping it. A 401 on the first attempt triggers exactly one
    /// retry when `options.privilege_func` is set. The status of that
    /// retry is not inspected: a second 401 comes back as a body too.
    pub async fn image_push(
        &self,
        cx: &PushContext,
        image: &str,
        options: ImagePushOptions,
    ) -> Result<ResponseBody> {
        let reference = Reference::parse_normalized(image)?;
        if reference.is_canonical() {
            return Err(PushError::DigestReference);
        }

        let name = reference.familiar_name();
        let tag = reference.tag().unwrap_or_default().to_string();
        debug!(%name, %tag, "pushing image");

        // An empty tag asks the engine to push every tag of the repository.
        let query: Query = vec![("tag".to_string(), tag)];

        let mut state = PushState::FirstAttempt;
        loop {
            state = match state {
                PushState::FirstAttempt => {
                    let response = self
                        .try_image_push(cx, &name, &query, &options.registry_auth)
                        .await?;
                    match &options.privilege_func {
                        Some(privilege) if response.status == StatusCode::UNAUTHORIZED => {
                            PushState::Refreshing {
                                rejected: response,
                                privilege,
                            }
                        }
                        _ => PushState::Done(response),
                    }
                }
                PushState::Refreshing {
                    rejected,
                    privilege,
                } => {
                    info!(%name, "push unauthorized, requesting new registry credentials");
                    let registry_auth = cx
                        .run(async {
                            rejected.body.discard(DISCARD_LIMIT).await;
                            privilege.call().await.map_err(PushError::Privilege)
                        })
                        .await?;
                    PushState::SecondAttempt { registry_auth }
                }
                PushState::SecondAttempt { registry_auth } => {
                    let response = self
                        .try_image_push(cx, &name, &query, &registry_auth)
                        .await?;
                    PushState::Done(response)
                }
                PushState::Done(response) => {
                    debug!(%name, status = response.status.as_u16(), "push accepted by engine");
                    return Ok(response.body);
                }
            };
        }
    }

    async fn try_image_push(
        &self,
        cx: &PushContext,
        name: &str,
        query: &Query,
        registry_auth: &str,
    ) -> Result<ServerResponse> {
        let mut headers = HeaderMap::new();
        headers.insert(REGISTRY_AUTH_HEADER, HeaderValue::from_str(registry_auth)?);

        inject_trace_context(
            cx,
            self.tracer.as_deref(),
            &mut MetaHeaderCarrier::new(&mut headers),
        );

        let path = format!("/images/{}/push", name);
        cx.run(self.transport.post(&path, query, headers)).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("tracing", &self.tracer.is_some())
            .finish_non_exhaustive()
    }
}
