//! Command-line argument parsing

use crate::config::{DEFAULT_HOST, PASSWORD_ENV, USERNAME_ENV};
use crate::error::{PushError, Result};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "dockerpush")]
#[command(about = "Push an image to its registry through a Docker engine")]
#[command(version)]
pub struct Args {
    /// Image to push, e.g. registry.example.com/project/app:1.0
    pub image: String,

    /// Engine address
    #[arg(
        long = "host",
        short = 'H',
        env = "DOCKER_HOST",
        default_value = DEFAULT_HOST,
        help = "Engine address (tcp://, http:// or https://)"
    )]
    pub host: String,

    /// Engine API version
    #[arg(
        long = "api-version",
        env = "DOCKER_API_VERSION",
        help = "Engine API version to request, e.g. 1.43"
    )]
    pub api_version: Option<String>,

    /// Registry username
    #[arg(
        long = "username",
        short = 'u',
        env = USERNAME_ENV,
        help = "Username for registry authentication"
    )]
    pub username: Option<String>,

    /// Registry password
    #[arg(
        long = "password",
        short = 'p',
        env = PASSWORD_ENV,
        hide_env_values = true,
        help = "Password for registry authentication"
    )]
    pub password: Option<String>,

    /// Timeout in seconds for engine requests
    #[arg(
        long = "timeout",
        short = 't',
        default_value = "0",
        help = "Timeout for the whole push in seconds, 0 for none"
    )]
    pub timeout: u64,

    /// Parent trace context
    #[arg(
        long = "traceparent",
        env = "TRACEPARENT",
        help = "W3C traceparent of the calling operation"
    )]
    pub traceparent: Option<String>,

    #[arg(long = "tracestate", env = "TRACESTATE", help = "W3C tracestate of the calling operation")]
    pub tracestate: Option<String>,

    #[arg(long = "no-trace", help = "Do not forward trace context to the engine")]
    pub no_trace: bool,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', conflicts_with = "quiet", help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long = "quiet", short = 'q', help = "Only print the pushed digest")]
    pub quiet: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Checks clap cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(PushError::Config("image name must not be empty".to_string()));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(PushError::Config("a password requires a username".to_string()));
        }
        if self.tracestate.is_some() && self.traceparent.is_none() {
            return Err(PushError::Config("tracestate requires traceparent".to_string()));
        }
        Ok(())
    }
}
