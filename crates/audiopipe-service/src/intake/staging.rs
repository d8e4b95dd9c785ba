//! Staging of uploaded payloads.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use audiopipe_core::error::{AppError, ErrorKind};
use audiopipe_core::result::AppResult;
use audiopipe_core::types::JobId;

use crate::fs::sanitize_file_name;

/// Final staging path for an upload: `<upload_dir>/<job_id>_<sanitized name>`.
pub fn staging_path(upload_dir: &Path, job_id: &JobId, file_name: &str) -> PathBuf {
    upload_dir.join(format!("{}_{}", job_id, sanitize_file_name(file_name)))
}

/// Write a payload to `<path>.part`, flush it to disk, then rename it into
/// place so the worker never observes a partial file.
pub async fn stage(path: &Path, payload: &[u8]) -> AppResult<()> {
    let storage_err =
        |e: std::io::Error| AppError::with_source(ErrorKind::Storage, "Error storing file", e);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
    }

    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    let written = async {
        let mut file = tokio::fs::File::create(&part).await?;
        file.write_all(payload).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&part, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(storage_err(e));
    }

    debug!(path = %path.display(), bytes = payload.len(), "Staged upload");
    Ok(())
}
