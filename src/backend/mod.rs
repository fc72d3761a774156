//! Conversion backends.
//!
//! Both strategies implement [`ConversionBackend`] with the same contract:
//! take a [`ConversionRequest`], report progress through the shared
//! [`ProgressTracker`], and return the encoded MP3 or a [`ConvertError`].
//!
//! ```text
//! local  ──▶ acquire FFmpeg once ──▶ stage input ──▶ encode ──▶ read output
//!             (5 → 10)                (15)           (15 → 95)  (95)
//!
//! remote ──▶ multipart upload ──▶ headers ──▶ body
//!             (0 → 60, 65)         (85)       (95)
//! ```
//!
//! [`Backend`] picks one of the two from a [`ConversionConfig`].

pub mod local;
pub mod remote;

use crate::config::{ConversionConfig, Strategy};
use crate::error::ConvertError;
use crate::progress::ProgressTracker;
use crate::request::{ConversionRequest, ConvertedAudio};
use std::future::Future;
use std::sync::Arc;

pub use local::{AutoDownload, ExplicitBinary, LocalBackend, RuntimeProvider};
pub use remote::RemoteBackend;

/// A strategy that turns a media file into an MP3.
pub trait ConversionBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn convert(
        &self,
        request: &ConversionRequest,
        progress: &Arc<ProgressTracker>,
    ) -> impl Future<Output = Result<ConvertedAudio, ConvertError>> + Send;
}

/// The backend selected by [`ConversionConfig::strategy`].
#[derive(Debug)]
pub enum Backend {
    Local(LocalBackend),
    Remote(RemoteBackend),
}

impl Backend {
    pub fn from_config(config: &ConversionConfig) -> Result<Self, ConvertError> {
        Ok(match config.strategy {
            Strategy::Local => Backend::Local(LocalBackend::from_config(config)),
            Strategy::Remote => Backend::Remote(RemoteBackend::from_config(config)?),
        })
    }
}

impl ConversionBackend for Backend {
    fn name(&self) -> &'static str {
        match self {
            Backend::Local(b) => b.name(),
            Backend::Remote(b) => b.name(),
        }
    }

    async fn convert(
        &self,
        request: &ConversionRequest,
        progress: &Arc<ProgressTracker>,
    ) -> Result<ConvertedAudio, ConvertError> {
        match self {
            Backend::Local(b) => b.convert(request, progress).await,
            Backend::Remote(b) => b.convert(request, progress).await,
        }
    }
}
