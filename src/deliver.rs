//! Result delivery: save the MP3 where the user will find it.
//!
//! Uses atomic write (transient `.part` file + rename) so a half-written MP3
//! never appears under its final name.

use crate::error::ConvertError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where a finished conversion was saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub path: PathBuf,
    pub filename: String,
    pub bytes: usize,
}

/// Save `data` as `dir/filename`.
///
/// `filename` must already be a bare name (see
/// [`crate::naming::download_filename`]).
pub async fn save_download(dir: &Path, filename: &str, data: &[u8]) -> Result<Delivery, ConvertError> {
    let path = dir.join(filename);
    let write_err = |source| ConvertError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(write_err)?;

    let tmp_path = dir.join(format!(".{filename}.part"));
    tokio::fs::write(&tmp_path, data).await.map_err(write_err)?;

    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    info!("Saved {} ({} bytes)", path.display(), data.len());
    Ok(Delivery {
        path,
        filename: filename.to_string(),
        bytes: data.len(),
    })
}
