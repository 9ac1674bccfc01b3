//! Multipart form buffering with an in-memory budget and temp-file spill.

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use std::collections::HashMap;
use std::io;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

#[derive(Debug)]
pub enum FormError {
    Multipart(String),
    TooLarge,
    Spill(io::Error),
}

impl From<MultipartError> for FormError {
    fn from(err: MultipartError) -> Self {
        FormError::Multipart(err.body_text())
    }
}

/// A fully received file part.
#[derive(Debug)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: String,
    size: u64,
    body: FileBody,
}

#[derive(Debug)]
enum FileBody {
    Memory(Vec<u8>),
    Disk(File),
}

impl UploadedFile {
    pub fn size(&self) -> u64 {
        self.size
    }

    #[cfg(test)]
    pub fn is_spilled(&self) -> bool {
        matches!(self.body, FileBody::Disk(_))
    }

    /// Streams the whole part into `writer`, returning the number of bytes copied.
    pub async fn copy_to<W>(self, writer: &mut W) -> io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let copied = match self.body {
            FileBody::Memory(bytes) => {
                writer.write_all(&bytes).await?;
                bytes.len() as u64
            }
            FileBody::Disk(mut file) => tokio::io::copy(&mut file, writer).await?,
        };
        writer.flush().await?;
        Ok(copied)
    }
}

/// The parsed body of an upload request.
#[derive(Debug, Default)]
pub struct ParsedForm {
    values: HashMap<String, Vec<String>>,
    pub files: Vec<UploadedFile>,
}

impl ParsedForm {
    /// First value submitted for a non-file field.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Reads every part of `multipart`.
///
/// File parts are kept in memory while the form-wide `max_memory` budget
/// allows; a part that does not fit is written to an anonymous temp file and
/// its buffered bytes are returned to the budget. Text parts always count
/// against the budget and exceeding it fails the whole form.
pub async fn parse_form(
    mut multipart: Multipart,
    max_memory: usize,
) -> Result<ParsedForm, FormError> {
    let mut form = ParsedForm::default();
    let mut remaining = max_memory;

    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let mut value = Vec::new();
            while let Some(chunk) = field.chunk().await? {
                if chunk.len() > remaining {
                    return Err(FormError::TooLarge);
                }
                remaining -= chunk.len();
                value.extend_from_slice(&chunk);
            }
            form.values
                .entry(field_name)
                .or_default()
                .push(String::from_utf8_lossy(&value).into_owned());
            continue;
        };

        let mut buffer = Vec::new();
        let mut spilled: Option<File> = None;
        let mut size: u64 = 0;
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            if let Some(file) = spilled.as_mut() {
                file.write_all(&chunk).await.map_err(FormError::Spill)?;
                continue;
            }
            if chunk.len() <= remaining {
                remaining -= chunk.len();
                buffer.extend_from_slice(&chunk);
                continue;
            }

            let mut file = spill_file().await.map_err(FormError::Spill)?;
            file.write_all(&buffer).await.map_err(FormError::Spill)?;
            file.write_all(&chunk).await.map_err(FormError::Spill)?;
            remaining += buffer.len();
            buffer = Vec::new();
            spilled = Some(file);
            debug!(field = field_name, file_name, "form part spilled to disk");
        }

        let body = match spilled {
            Some(mut file) => {
                file.flush().await.map_err(FormError::Spill)?;
                file.rewind().await.map_err(FormError::Spill)?;
                FileBody::Disk(file)
            }
            None => FileBody::Memory(buffer),
        };
        form.files.push(UploadedFile {
            field_name,
            file_name,
            size,
            body,
        });
    }

    Ok(form)
}

async fn spill_file() -> io::Result<File> {
    let file = tokio::task::spawn_blocking(tempfile::tempfile)
        .await
        .map_err(|err| io::Error::other(err.to_string()))??;
    Ok(File::from_std(file))
}
