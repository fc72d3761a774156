//! One-shot conversion entry points.
//!
//! These wrap a throwaway [`ConverterWidget`] for callers that have a file
//! and want an MP3 on disk, without driving intake events themselves.
//! Hold a widget instead when converting several files in one session: the
//! local backend keeps its FFmpeg runtime across conversions.

use crate::config::ConversionConfig;
use crate::deliver::Delivery;
use crate::error::ConvertError;
use crate::request::SelectedFile;
use crate::widget::ConverterWidget;
use std::path::Path;
use tracing::info;

/// Convert the media file at `input` and save the MP3 in
/// `config.output_dir`.
///
/// # Arguments
/// * `input` — path to any media file FFmpeg (or the server) can read
/// * `output_name` — base name for the result; proposed from the input
///   file name when `None`
/// * `config` — strategy, quality and output settings
///
/// # Errors
/// Returns the first [`ConvertError`] of the attempt: unreadable input,
/// runtime acquisition, encoder or network failure, a server-reported
/// message, or a failed write.
pub async fn convert_file(
    input: impl AsRef<Path>,
    output_name: Option<&str>,
    config: &ConversionConfig,
) -> Result<Delivery, ConvertError> {
    let file = SelectedFile::from_path(input.as_ref()).await?;
    convert_selected(file, output_name, config).await
}

/// Convert an in-memory media file.
///
/// `name` plays the role of the picked file name: it is sent to the server
/// and used to propose the output name.
///
/// # Example
/// ```rust,no_run
/// use tomp3::{convert_from_bytes, ConversionConfig, QualityTier};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("talk.mp4")?;
/// let config = ConversionConfig::builder().quality(QualityTier::High).build()?;
/// let saved = convert_from_bytes("talk.mp4", bytes, &config).await?;
/// println!("{}", saved.path.display());
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    name: &str,
    bytes: impl Into<Vec<u8>>,
    config: &ConversionConfig,
) -> Result<Delivery, ConvertError> {
    convert_selected(SelectedFile::from_bytes(name, bytes), None, config).await
}

/// Synchronous wrapper around [`convert_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    output_name: Option<&str>,
    config: &ConversionConfig,
) -> Result<Delivery, ConvertError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert_file(input, output_name, config))
}

async fn convert_selected(
    file: SelectedFile,
    output_name: Option<&str>,
    config: &ConversionConfig,
) -> Result<Delivery, ConvertError> {
    let mut widget = ConverterWidget::from_config(config)?;
    widget.select_file(file);
    if let Some(name) = output_name {
        widget.set_output_name(name);
    }
    let delivery = widget.convert().await?;
    info!("Wrote {} ({} bytes)", delivery.path.display(), delivery.bytes);
    Ok(delivery)
}
