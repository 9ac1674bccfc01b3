//! Multipart upload handler.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Extension, Multipart};
use axum::response::Json as JsonResponse;
use serde::Serialize;
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::config::MAX_FORM_MEMORY;
use crate::error::ApiError;
use crate::form::parse_form;
use crate::storage::Storage;
use crate::writer::write_file;

/// Optional form value naming a sub-directory below the user's root.
pub const PATH_FIELD: &str = "path";

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    status: &'static str,
}

/// Stores every file part of the form below the caller's directory.
///
/// Parts are written in the order they were received and the first failure
/// ends the request; files written before it are kept.
pub async fn handle_upload(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(AuthenticatedUser(username)): Extension<AuthenticatedUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonResponse<UploadResponse>, ApiError> {
    let upload_id = Uuid::new_v4();
    let span = info_span!("upload", %upload_id, username = %username);

    async move {
        let multipart =
            multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        let form = parse_form(multipart, MAX_FORM_MEMORY).await?;
        let sub_path = form.value(PATH_FIELD).map(str::to_string);

        info!(
            files = form.files.len(),
            path = sub_path.as_deref().unwrap_or(""),
            "upload received"
        );

        for file in form.files {
            let field = file.field_name.clone();
            let size = file.size();
            if let Err(err) = write_file(&storage, &username, sub_path.as_deref(), file).await {
                warn!(field, size, status = %err.status(), "upload failed");
                return Err(err);
            }
        }

        Ok(JsonResponse(UploadResponse { status: "ok" }))
    }
    .instrument(span)
    .await
}
