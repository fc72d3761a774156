//! The values that flow through one conversion attempt.

use crate::config::QualityTier;
use crate::error::ConvertError;
use crate::naming::sanitize_base_name;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// An opaque media blob with a name, as picked or dropped by the user.
///
/// Cloning is cheap; the bytes are shared.
#[derive(Clone)]
pub struct SelectedFile {
    name: String,
    data: Arc<[u8]>,
}

impl SelectedFile {
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: Arc::from(data.into()),
        }
    }

    /// Read a file from disk. The name is the path's final component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ConvertError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_bytes(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Everything a backend needs for one conversion.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub file: SelectedFile,
    /// Sanitised output base name.
    pub output_name: String,
    pub quality: QualityTier,
}

impl ConversionRequest {
    pub fn new(file: SelectedFile, output_name: &str, quality: QualityTier) -> Self {
        Self {
            file,
            output_name: sanitize_base_name(output_name),
            quality,
        }
    }
}

/// Encoded MP3 returned by a backend.
#[derive(Debug, Clone)]
pub struct ConvertedAudio {
    pub data: Vec<u8>,
    /// Filename the backend suggests (remote `Content-Disposition`).
    pub suggested_filename: Option<String>,
}
