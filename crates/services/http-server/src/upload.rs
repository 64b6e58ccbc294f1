//! Upload spooling
//!
//! Streams a multipart field into a temp file with a hard size cap, so a
//! runaway upload never reaches memory or disk beyond the limit.

use axum::extract::multipart::Field;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

/// Upload errors
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("Malformed upload: {0}")]
    Malformed(String),

    #[error("Failed to spool upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Write `field` to a temp file, enforcing `max_bytes`
///
/// The returned `TempPath` deletes the file when dropped; keep it alive
/// for as long as the job reads from it.
pub async fn spool_field(field: &mut Field<'_>, max_bytes: u64) -> Result<(TempPath, u64), UploadError> {
    let temp_path = tempfile::NamedTempFile::new()?.into_temp_path();
    let mut file = tokio::fs::File::create(&temp_path).await?;

    let mut total: u64 = 0;
    loop {
        let chunk = field
            .chunk()
            .await
            .map_err(|e| UploadError::Malformed(e.to_string()))?;
        let Some(chunk) = chunk else { break };

        total += chunk.len() as u64;
        if total > max_bytes {
            return Err(UploadError::TooLarge { limit: max_bytes });
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    drop(file);

    Ok((temp_path, total))
}

/// Read a bounded in-memory payload from `field` (still images)
pub async fn read_field(field: &mut Field<'_>, max_bytes: u64) -> Result<Vec<u8>, UploadError> {
    let mut data = Vec::new();
    loop {
        let chunk = field
            .chunk()
            .await
            .map_err(|e| UploadError::Malformed(e.to_string()))?;
        let Some(chunk) = chunk else { break };

        if data.len() as u64 + chunk.len() as u64 > max_bytes {
            return Err(UploadError::TooLarge { limit: max_bytes });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}
