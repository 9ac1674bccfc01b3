//! Materializes one uploaded file below its owner's directory.

use tokio::fs::File;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::form::UploadedFile;
use crate::storage::Storage;

/// Writes `file` to `<root>/<username>/<sub_path>/<file name>`.
///
/// An existing file is truncated. A failed copy leaves the partial file in place.
pub async fn write_file(
    storage: &Storage,
    username: &str,
    sub_path: Option<&str>,
    file: UploadedFile,
) -> Result<u64, ApiError> {
    let target = storage
        .resolve_upload(username, sub_path, &file.file_name)
        .await?;

    // a failure here surfaces as the create error below
    if let Some(parent) = target.parent()
        && let Err(err) = storage.ensure_dir(parent).await
    {
        warn!(dir = ?parent, error = %err, "failed to create upload directory");
    }

    let mut output = File::create(&target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let field = file.field_name.clone();
    let written = file
        .copy_to(&mut output)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    info!(username, field, path = ?target, bytes = written, "stored file");
    Ok(written)
}
