//! Static GET serving of the storage tree with directory listings.

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::fs;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::debug;

use crate::error::ApiError;
use crate::storage::{FileEntry, Storage};

const INDEX_FILE: &str = "index.html";

const HREF_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Serves files below the storage root; directories without an index page
/// get a generated listing.
pub async fn serve_files(
    Extension(storage): Extension<Arc<Storage>>,
    req: Request<AxumBody>,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();
    if path.ends_with('/')
        && let Some(response) = try_list_directory(&storage, &path).await?
    {
        return Ok(response);
    }

    let response = ServeDir::new(storage.root_path())
        .append_index_html_on_directories(true)
        .oneshot(req)
        .await
        .unwrap_or_else(|never| match never {});
    Ok(response.map(AxumBody::new))
}

async fn try_list_directory(storage: &Storage, path: &str) -> Result<Option<Response>, ApiError> {
    let decoded = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| ApiError::BadRequest("invalid path encoding".into()))?;
    let Ok(target) = storage.resolve(&decoded) else {
        return Ok(None);
    };
    let is_dir = fs::metadata(&target)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false);
    if !is_dir || fs::metadata(target.join(INDEX_FILE)).await.is_ok() {
        return Ok(None);
    }

    let entries = storage.list_dir(&target).await?;
    debug!(path = %decoded, count = entries.len(), "list directory");
    let body = render_listing(&decoded, &entries);
    Ok(Some(
        (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            )],
            body,
        )
            .into_response(),
    ))
}

fn render_listing(path: &str, entries: &[FileEntry]) -> String {
    let title = escape_html(path);
    let mut html = String::new();
    html.push_str("<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n");
    let _ = writeln!(html, "<title>Index of {title}</title>");
    let _ = writeln!(html, "<h1>Index of {title}</h1>");
    html.push_str("<pre>\n");
    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        let href = utf8_percent_encode(&entry.name, HREF_SEGMENT);
        let name = escape_html(&entry.name);
        let modified = entry.modified.as_deref().unwrap_or("-");
        let size = if entry.is_dir {
            "-".to_string()
        } else {
            entry.size.to_string()
        };
        let _ = writeln!(
            html,
            "<a href=\"{href}{suffix}\">{name}{suffix}</a>  {modified}  {size}"
        );
    }
    html.push_str("</pre>\n");
    html
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
