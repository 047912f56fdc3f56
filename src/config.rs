//! Configuration module for engine connection settings and registry credentials

use crate::error::{PushError, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_HOST: &str = "http://localhost:2375";

pub const USERNAME_ENV: &str = "DOCKER_PUSHER_USERNAME";
pub const PASSWORD_ENV: &str = "DOCKER_PUSHER_PASSWORD";

/// Registry credentials in the shape the engine expects inside
/// `X-Registry-Auth`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "serveraddress", skip_serializing_if = "Option::is_none")]
    pub server_address: Option<String>,
    #[serde(rename = "identitytoken", skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<String>,
    #[serde(rename = "registrytoken", skip_serializing_if = "Option::is_none")]
    pub registry_token: Option<String>,
}

impl AuthConfig {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self {
            username,
            password,
            ..Default::default()
        }
    }

    /// Read credentials through `lookup`, normally `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(lookup(USERNAME_ENV), lookup(PASSWORD_ENV))
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_server_address(mut self, server_address: Option<String>) -> Self {
        self.server_address = server_address;
        self
    }

    pub fn has_credentials(&self) -> bool {
        (self.username.is_some() && self.password.is_some())
            || self.identity_token.is_some()
            || self.registry_token.is_some()
    }

    /// JSON, base64url encoded with padding.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE.encode(json))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let json = URL_SAFE
            .decode(encoded)
            .map_err(|e| PushError::Config(format!("invalid registry auth encoding: {}", e)))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Engine connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: Url,
    pub api_version: Option<String>,
    pub timeout: Option<Duration>,
}

impl Config {
    /// `timeout_secs == 0` disables the push deadline.
    pub fn new(host: &str, api_version: Option<String>, timeout_secs: u64) -> Result<Self> {
        let api_version = api_version
            .map(|v| v.trim_start_matches('v').to_string())
            .filter(|v| !v.is_empty());
        if let Some(version) = &api_version {
            let valid = version
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
            if !valid {
                return Err(PushError::Config(format!("invalid API version: {}", version)));
            }
        }

        Ok(Config {
            host: parse_host(host)?,
            api_version,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: Url::parse(DEFAULT_HOST).expect("default host is a valid URL"),
            api_version: None,
            timeout: None,
        }
    }
}

/// Accepts `tcp://`, `http://` and `https://` hosts, or a bare `host:port`.
pub fn parse_host(host: &str) -> Result<Url> {
    let host = host.trim();
    if host.is_empty() {
        return Ok(Config::default().host);
    }

    let normalized = match host.split_once("://") {
        Some(("tcp", rest)) => format!("http://{}", rest),
        Some(("http", _)) | Some(("https", _)) => host.to_string(),
        Some((scheme, _)) => {
            return Err(PushError::Config(format!(
                "unsupported engine host scheme: {}",
                scheme
            )));
        }
        None => format!("http://{}", host),
    };

    let url = Url::parse(&normalized)?;
    if url.host_str().is_none() {
        return Err(PushError::Config(format!("engine host has no address: {}", host)));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_auth_encodes_to_empty_object() {
        assert_eq!(AuthConfig::default().encode().unwrap(), "e30=");
    }

    #[test]
    fn test_auth_encoding_round_trip() {
        let auth = AuthConfig::new(Some("alice".to_string()), Some("s3cret".to_string()))
            .with_server_address(Some("registry.example.com".to_string()));
        let encoded = auth.encode().unwrap();
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(AuthConfig::decode(&encoded).unwrap(), auth);

        let json: serde_json::Value = serde_json::from_slice(&URL_SAFE.decode(&encoded).unwrap()).unwrap();
        assert_eq!(json["serveraddress"], "registry.example.com");
        assert!(json.get("identitytoken").is_none());
    }

    #[test]
    fn test_auth_from_lookup() {
        let env: HashMap<&str, &str> = [(USERNAME_ENV, "bob"), (PASSWORD_ENV, "pw")].into_iter().collect();
        let auth = AuthConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(auth.username.as_deref(), Some("bob"));
        assert!(auth.has_credentials());

        let anonymous = AuthConfig::from_lookup(|_| None);
        assert!(!anonymous.has_credentials());
    }

    #[test]
    fn test_parse_host() {
        assert_eq!(parse_host("tcp://10.0.0.5:2376").unwrap().as_str(), "http://10.0.0.5:2376/");
        assert_eq!(parse_host("localhost:2375").unwrap().as_str(), "http://localhost:2375/");
        assert_eq!(parse_host("https://engine.example.com").unwrap().as_str(), "https://engine.example.com/");
        assert_eq!(parse_host("").unwrap().as_str(), "http://localhost:2375/");
        assert!(matches!(parse_host("unix:///var/run/docker.sock"), Err(PushError::Config(_))));
    }

    #[test]
    fn test_config_api_version() {
        let config = Config::new("tcp://localhost:2375", Some("v1.43".to_string()), 30).unwrap();
        assert_eq!(config.api_version.as_deref(), Some("1.43"));
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));

        let no_timeout = Config::new("localhost:2375", None, 0).unwrap();
        assert_eq!(no_timeout.timeout, None);

        assert!(Config::new("localhost:2375", Some("latest".to_string()), 0).is_err());
    }
}
