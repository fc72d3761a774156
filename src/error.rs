//! Error types for the tomp3 library.
//!
//! Every failure is terminal for the current attempt but never fatal to the
//! caller: the widget turns each [`ConvertError`] into a status message via
//! [`ConvertError::status_message`], resets progress, and re-enables the
//! convert trigger so the user can try again.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the tomp3 library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// Convert was triggered before any file was picked.
    #[error("Select a file first")]
    NoFileSelected,

    /// The input file could not be read from disk.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Local runtime errors ──────────────────────────────────────────────
    /// The FFmpeg runtime could not be located or downloaded.
    #[error("FFmpeg runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// FFmpeg ran but did not produce an MP3.
    #[error("Encoder failed: {detail}")]
    EncoderFailed { detail: String },

    // ── Remote errors ─────────────────────────────────────────────────────
    /// Connection refused, DNS failure, reset mid-transfer, etc.
    #[error("Network error or server unavailable ({url}): {reason}")]
    Network { url: String, reason: String },

    /// The server answered with a JSON error payload.
    ///
    /// Displays the server's message verbatim.
    #[error("{message}")]
    ServerReported { message: String },

    /// Non-2xx response that did not carry a JSON error payload.
    #[error("Server returned HTTP {status} for '{url}'")]
    HttpStatus { status: u16, url: String },

    /// The response could not be interpreted.
    #[error("Failed to process server response: {0}")]
    MalformedResponse(String),

    // ── Delivery errors ───────────────────────────────────────────────────
    /// Could not create or write the output MP3 file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// The text shown in the status line after this error.
    ///
    /// Server-reported messages and intake guidance are shown as-is;
    /// everything else is prefixed with `Error: `.
    pub fn status_message(&self) -> String {
        match self {
            ConvertError::ServerReported { message } => message.clone(),
            ConvertError::NoFileSelected => self.to_string(),
            other => format!("Error: {other}"),
        }
    }
}

impl From<ffmpeg_auto::FfmpegAutoError> for ConvertError {
    fn from(e: ffmpeg_auto::FfmpegAutoError) -> Self {
        ConvertError::RuntimeUnavailable(e.to_string())
    }
}
