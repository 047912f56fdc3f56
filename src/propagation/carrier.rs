//! Header carriers used for trace context injection

use crate::error::InjectError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Prefix of headers the engine forwards on to the registry.
pub const META_HEADER_PREFIX: &str = "X-Meta-";

/// Minimal write access to a string-keyed, multi-valued header collection.
pub trait HeaderCarrier {
    /// Set `key` to `value`, replacing any previous values of `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<(), InjectError>;

    /// Names of the headers currently present.
    fn keys(&self) -> Vec<String>;
}

impl HeaderCarrier for HeaderMap {
    fn set(&mut self, key: &str, value: &str) -> Result<(), InjectError> {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| InjectError::InvalidName(key.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| InjectError::InvalidValue(key.to_string()))?;
        self.insert(name, value);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        HeaderMap::keys(self).map(|name| name.as_str().to_string()).collect()
    }
}

/// Writes every header through to the wrapped carrier under the
/// [`META_HEADER_PREFIX`], so trace fields travel past the engine.
pub struct MetaHeaderCarrier<'a> {
    inner: &'a mut dyn HeaderCarrier,
}

impl<'a> MetaHeaderCarrier<'a> {
    pub fn new(inner: &'a mut dyn HeaderCarrier) -> Self {
        Self { inner }
    }
}

impl HeaderCarrier for MetaHeaderCarrier<'_> {
    fn set(&mut self, key: &str, value: &str) -> Result<(), InjectError> {
        self.inner.set(&format!("{META_HEADER_PREFIX}{key}"), value)
    }

    /// Only the prefixed headers, with the prefix stripped.
    fn keys(&self) -> Vec<String> {
        let prefix_len = META_HEADER_PREFIX.len();
        self.inner
            .keys()
            .into_iter()
            .filter(|key| {
                key.len() > prefix_len
                    && key.is_char_boundary(prefix_len)
                    && key[..prefix_len].eq_ignore_ascii_case(META_HEADER_PREFIX)
            })
            .map(|key| key[prefix_len..].to_string())
            .collect()
    }
}
