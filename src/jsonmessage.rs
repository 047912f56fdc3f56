//! Decoding of the engine's push progress stream
//!
//! The body of a push response is a sequence of concatenated JSON
//! objects, one per progress update. Chunk boundaries from the transport
//! do not line up with object boundaries, so decoding buffers until a
//! complete object is available.

use crate::error::{PushError, Result};
use crate::transport::ResponseBody;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonProgress {
    #[serde(default)]
    pub current: i64,
    #[serde(default)]
    pub total: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "progressDetail", default, skip_serializing_if = "Option::is_none")]
    pub progress_detail: Option<JsonProgress>,
    #[serde(rename = "progress", default, skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(rename = "errorDetail", default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<JsonError>,
    /// Deprecated plain-text form of `errorDetail.message`.
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux: Option<serde_json::Value>,
}

/// Summary the engine sends once a tag has been pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushResult {
    pub tag: String,
    pub digest: String,
    pub size: i64,
}

impl JsonMessage {
    /// The error this message reports, if any.
    pub fn error(&self) -> Option<PushError> {
        match (&self.error_detail, &self.error_message) {
            (Some(detail), _) => Some(PushError::Remote {
                code: detail.code,
                message: detail.message.clone(),
            }),
            (None, Some(message)) => Some(PushError::Remote {
                code: 0,
                message: message.clone(),
            }),
            (None, None) => None,
        }
    }

    pub fn push_result(&self) -> Option<PushResult> {
        self.aux
            .as_ref()
            .and_then(|aux| serde_json::from_value(aux.clone()).ok())
    }
}

pub struct JsonMessageDecoder {
    body: ResponseBody,
    buf: Vec<u8>,
    finished: bool,
}

impl JsonMessageDecoder {
    pub fn new(body: ResponseBody) -> Self {
        Self {
            body,
            buf: Vec::new(),
            finished: false,
        }
    }

    /// Next complete message, or `None` once the body is exhausted.
    pub async fn next_message(&mut self) -> Option<Result<JsonMessage>> {
        loop {
            match self.decode_buffered() {
                Ok(Some(message)) => return Some(Ok(message)),
                Ok(None) => {}
                Err(err) => return Some(Err(err)),
            }

            if self.finished {
                if self.buf.is_empty() {
                    return None;
                }
                // Truncated trailing object.
                let err = serde_json::from_slice::<JsonMessage>(&self.buf).err();
                self.buf.clear();
                return err.map(|e| Err(e.into()));
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err.into()));
                }
                None => self.finished = true,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<JsonMessage>> {
        stream::unfold(self, |mut decoder| async move {
            decoder.next_message().await.map(|message| (message, decoder))
        })
    }

    fn decode_buffered(&mut self) -> Result<Option<JsonMessage>> {
        let (next, consumed) = {
            let mut messages =
                serde_json::Deserializer::from_slice(&self.buf).into_iter::<JsonMessage>();
            let next = messages.next();
            (next, messages.byte_offset())
        };
        match next {
            Some(Ok(message)) => {
                self.buf.drain(..consumed);
                Ok(Some(message))
            }
            Some(Err(err)) if err.is_eof() => Ok(None),
            Some(Err(err)) => {
                self.buf.clear();
                Err(err.into())
            }
            None => {
                // Only whitespace left.
                self.buf.clear();
                Ok(None)
            }
        }
    }
}

/// Consume a push progress stream, handing every message to `on_message`.
///
/// Stops at the first error message. Returns the last push summary seen.
pub async fn process_push_stream<F>(body: ResponseBody, mut on_message: F) -> Result<Option<PushResult>>
where
    F: FnMut(&JsonMessage),
{
    let mut decoder = JsonMessageDecoder::new(body);
    let mut result = None;

    while let Some(message) = decoder.next_message().await {
        let message = message?;
        if let Some(err) = message.error() {
            return Err(err);
        }
        if let Some(push_result) = message.push_result() {
            result = Some(push_result);
        }
        on_message(&message);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io;

    fn chunked(parts: &[&'static str]) -> ResponseBody {
        let chunks: Vec<io::Result<Bytes>> = parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        ResponseBody::new(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_decodes_across_chunk_boundaries() {
        let body = chunked(&[
            "{\"status\":\"Preparing\",\"progressDetail\":{},\"id\":\"a1\"}\r\n{\"sta",
            "tus\":\"Pushing\",\"progressDetail\":{\"current\":512,\"total\":1024},\"id\":\"a1\"}",
            "\r\n",
        ]);

        let messages: Vec<_> = JsonMessageDecoder::new(body)
            .into_stream()
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].status.as_deref(), Some("Preparing"));
        assert_eq!(
            messages[1].progress_detail,
            Some(JsonProgress {
                current: 512,
                total: 1024,
                start: None
            })
        );
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() {
        let mut decoder = JsonMessageDecoder::new(chunked(&["{\"status\":\"Pus"]));
        assert!(matches!(decoder.next_message().await, Some(Err(PushError::Json(_)))));
        assert!(decoder.next_message().await.is_none());
    }

    #[tokio::test]
    async fn test_process_push_stream_returns_summary() {
        let body = chunked(&[
            "{\"status\":\"The push refers to repository [docker.io/library/app]\"}\n",
            "{\"status\":\"latest: digest: sha256:abc size: 528\"}\n",
            "{\"progressDetail\":{},\"aux\":{\"Tag\":\"latest\",\"Digest\":\"sha256:abc\",\"Size\":528}}\n",
        ]);

        let mut seen = 0;
        let result = process_push_stream(body, |_| seen += 1).await.unwrap();

        assert_eq!(seen, 3);
        assert_eq!(
            result,
            Some(PushResult {
                tag: "latest".to_string(),
                digest: "sha256:abc".to_string(),
                size: 528
            })
        );
    }

    #[tokio::test]
    async fn test_process_push_stream_surfaces_remote_error() {
        let body = chunked(&[
            "{\"status\":\"Preparing\"}\n",
            "{\"errorDetail\":{\"message\":\"denied: requested access to the resource is denied\"},\"error\":\"denied: requested access to the resource is denied\"}\n",
            "{\"status\":\"never read\"}\n",
        ]);

        let err = process_push_stream(body, |_| {}).await.unwrap_err();
        match err {
            PushError::Remote { code, message } => {
                assert_eq!(code, 0);
                assert_eq!(message, "denied: requested access to the resource is denied");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_plain_error_field() {
        let message: JsonMessage = serde_json::from_str("{\"error\":\"unauthorized\"}").unwrap();
        assert_eq!(message.error().unwrap().to_string(), "unauthorized");
    }
}
