//! Remote strategy: multipart upload to a `/convert` endpoint.
//!
//! The server offers no progress channel, so everything after the upload is
//! an estimate keyed off the request lifecycle: the body finishing, headers
//! arriving, and the response body starting to stream. Those checkpoints are
//! cosmetic and should not be read as real server-side progress.
//!
//! ## Response contract
//!
//! | Content type        | Meaning                                          |
//! |---------------------|--------------------------------------------------|
//! | `application/json`  | error payload `{ "error": "<message>" }`         |
//! | anything else, 2xx  | the MP3; name from `Content-Disposition` if set  |

use crate::backend::ConversionBackend;
use crate::config::ConversionConfig;
use crate::error::ConvertError;
use crate::naming::content_disposition_filename;
use crate::progress::{checkpoints, upload_percent, ProgressTracker};
use crate::request::{ConversionRequest, ConvertedAudio};
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upload chunk size; one progress event per chunk.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Status shown when a JSON error payload has no `error` field.
const GENERIC_SERVER_ERROR: &str = "Conversion failed";

/// JSON body the server sends on failure.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<String>,
    /// Encoder stderr tail, when the server includes it.
    details: Option<String>,
}

/// Converts by posting the file to a conversion server.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: reqwest::Client,
    url: String,
}

impl RemoteBackend {
    /// `convert_url` is the full endpoint, e.g. `http://host:5000/convert`.
    pub fn new(convert_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ConvertError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("tomp3/", env!("CARGO_PKG_VERSION")));
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| ConvertError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: convert_url.into(),
        })
    }

    pub fn from_config(config: &ConversionConfig) -> Result<Self, ConvertError> {
        Self::new(
            config.convert_url(),
            config.request_timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn network_error(&self, e: reqwest::Error) -> ConvertError {
        let reason = if e.is_timeout() {
            format!("request timed out: {e}")
        } else {
            e.to_string()
        };
        ConvertError::Network {
            url: self.url.clone(),
            reason,
        }
    }
}

impl ConversionBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        progress: &Arc<ProgressTracker>,
    ) -> Result<ConvertedAudio, ConvertError> {
        progress.advance(0u8, "Uploading file… 0%");
        let form = build_form(request, progress)?;

        info!(
            "POST {} ({} bytes, quality={})",
            self.url,
            request.file.size(),
            request.quality
        );
        let mut response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        progress.advance(checkpoints::HEADERS_RECEIVED, "Converting file…");

        let status = response.status();
        let content_type = header_str(&response, CONTENT_TYPE).unwrap_or_default();
        let disposition = header_str(&response, CONTENT_DISPOSITION);
        debug!("Response {status}, content-type '{content_type}'");

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.network_error(e))? {
            if body.is_empty() {
                progress.advance(checkpoints::RECEIVING, "Downloading result…");
            }
            body.extend_from_slice(&chunk);
        }

        if content_type.to_ascii_lowercase().contains("application/json") {
            return Err(server_error(&body));
        }
        if !status.is_success() {
            return Err(ConvertError::HttpStatus {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let suggested_filename = disposition.as_deref().and_then(content_disposition_filename);
        Ok(ConvertedAudio {
            data: body,
            suggested_filename,
        })
    }
}

/// Build the `file` / `output_name` / `quality` form.
///
/// The file part streams in [`UPLOAD_CHUNK`] pieces and reports upload
/// progress as each piece is handed to the transport.
fn build_form(request: &ConversionRequest, progress: &Arc<ProgressTracker>) -> Result<Form, ConvertError> {
    let data = request.file.shared_bytes();
    let total = data.len() as u64;
    let tracker = Arc::clone(progress);

    let chunks = stream::iter((0..data.len()).step_by(UPLOAD_CHUNK)).map(move |start| {
        let end = (start + UPLOAD_CHUNK).min(data.len());
        let sent = end as u64;
        tracker.advance(
            upload_percent(sent, total),
            format!("Uploading file… {}%", sent * 100 / total.max(1)),
        );
        if sent == total {
            tracker.advance(checkpoints::UPLOAD_DONE, "Reading file…");
        }
        Ok::<Vec<u8>, std::io::Error>(data[start..end].to_vec())
    });

    let part = Part::stream_with_length(reqwest::Body::wrap_stream(chunks), total)
        .file_name(request.file.name().to_string())
        .mime_str("application/octet-stream")
        .map_err(|e| ConvertError::Internal(format!("multipart: {e}")))?;

    Ok(Form::new()
        .part("file", part)
        .text("output_name", request.output_name.clone())
        .text("quality", request.quality.as_str()))
}

fn header_str(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Turn a JSON error body into [`ConvertError::ServerReported`].
fn server_error(body: &[u8]) -> ConvertError {
    match serde_json::from_slice::<ErrorPayload>(body) {
        Ok(payload) => {
            if let Some(ref details) = payload.details {
                debug!("Server error details: {details}");
            }
            ConvertError::ServerReported {
                message: payload
                    .error
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| GENERIC_SERVER_ERROR.to_string()),
            }
        }
        Err(e) => {
            warn!("Unparseable JSON error payload: {e}");
            ConvertError::MalformedResponse(format!("invalid JSON error payload: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_uses_message_verbatim() {
        let e = server_error(br#"{"error":"bad format","details":"moov atom not found"}"#);
        assert_eq!(e.to_string(), "bad format");
    }

    #[test]
    fn server_error_without_message() {
        let e = server_error(b"{}");
        assert_eq!(e.status_message(), GENERIC_SERVER_ERROR);
    }

    #[test]
    fn server_error_with_broken_json() {
        let e = server_error(b"<html>oops</html>");
        assert!(matches!(e, ConvertError::MalformedResponse(_)));
    }

    #[test]
    fn timeout_is_optional() {
        let b = RemoteBackend::new("http://127.0.0.1:5000/convert", None).unwrap();
        assert_eq!(b.url(), "http://127.0.0.1:5000/convert");
        assert!(RemoteBackend::new("http://127.0.0.1:5000/convert", Some(Duration::from_secs(5))).is_ok());
    }
}
