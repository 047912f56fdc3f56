//! Runner driving a single push from the command line

use crate::cli::args::Args;
use crate::client::{Client, ImagePushOptions, PrivilegeFunc};
use crate::config::{AuthConfig, Config};
use crate::context::PushContext;
use crate::error::{BoxError, PushError, Result};
use crate::jsonmessage::{PushResult, process_push_stream};
use crate::output::OutputManager;
use crate::propagation::PropagatorTracer;
use crate::reference::Reference;
use crate::transport::HttpTransport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct Runner {
    args: Args,
    output: OutputManager,
    tracer: Arc<PropagatorTracer>,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let output = if args.quiet {
            OutputManager::new_quiet()
        } else {
            OutputManager::new(args.verbose)
        };

        Self {
            args,
            output,
            tracer: Arc::new(PropagatorTracer::w3c()),
        }
    }

    pub fn output(&self) -> &OutputManager {
        &self.output
    }

    pub async fn run(&self) -> Result<()> {
        self.args.validate()?;
        self.output.section(&format!("Pushing {}", self.args.image));

        let config = Config::new(&self.args.host, self.args.api_version.clone(), self.args.timeout)?;
        self.output.detail(&format!("Engine: {}", config.host));
        let client = self.create_client(&config)?;

        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(cancel_on_interrupt(cancel.clone()));

        let cx = self.push_context(cancel, config.timeout);
        let result = self.push(&client, &cx).await;
        watcher.abort();

        let result = result?;
        self.output.push_summary(&self.args.image, result.as_ref());
        if !self.output.is_quiet() {
            self.output.success("Push completed");
        }
        Ok(())
    }

    async fn push(&self, client: &Client, cx: &PushContext) -> Result<Option<PushResult>> {
        let body = client
            .image_push(cx, &self.args.image, self.push_options()?)
            .await?;

        let output = self.output.clone();
        cx.run(process_push_stream(body, |message| output.message(message)))
            .await
    }

    fn create_client(&self, config: &Config) -> Result<Client> {
        let transport = HttpTransport::builder(config.host.clone())
            .with_api_version(config.api_version.clone())
            .build()?;

        let mut builder = Client::builder(Arc::new(transport));
        if !self.args.no_trace {
            builder = builder.with_tracer(self.tracer.clone());
        }
        Ok(builder.build())
    }

    fn push_context(&self, cancel: CancellationToken, timeout: Option<Duration>) -> PushContext {
        let mut cx = PushContext::new().with_cancellation(cancel);
        if let Some(timeout) = timeout {
            cx = cx.with_timeout(timeout);
        }

        if let Some(traceparent) = &self.args.traceparent {
            let mut fields = HashMap::new();
            fields.insert("traceparent".to_string(), traceparent.clone());
            if let Some(tracestate) = &self.args.tracestate {
                fields.insert("tracestate".to_string(), tracestate.clone());
            }
            cx = cx.with_otel_context(self.tracer.extract(&fields));
            match cx.active_span() {
                Some(span) => debug!(trace_id = %span.trace_id(), "continuing trace"),
                None => {
                    warn!(%traceparent, "ignoring malformed traceparent");
                    self.output.warning("Malformed traceparent, starting without a parent trace");
                }
            }
        }
        cx
    }

    fn push_options(&self) -> Result<ImagePushOptions> {
        let server_address = registry_address(&self.args.image);
        let auth = AuthConfig::new(self.args.username.clone(), self.args.password.clone())
            .with_server_address(server_address.clone());
        if !auth.has_credentials() {
            self.output.info("No registry credentials given, pushing anonymously");
        }

        let privilege = PrivilegeFunc::new(move || refresh_credentials(server_address.clone()));
        Ok(ImagePushOptions::new(auth.encode()?).with_privilege_func(privilege))
    }
}

fn registry_address(image: &str) -> Option<String> {
    Reference::parse_normalized(image)
        .ok()
        .map(|reference| reference.domain().to_string())
}

// Credentials may have been rotated since startup, so read them again.
async fn refresh_credentials(server_address: Option<String>) -> std::result::Result<String, BoxError> {
    let auth = AuthConfig::from_env().with_server_address(server_address);
    if !auth.has_credentials() {
        return Err(PushError::Config(
            "registry rejected the push and no credentials are available".to_string(),
        )
        .into());
    }
    Ok(auth.encode()?)
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, cancelling push");
        cancel.cancel();
    }
}
