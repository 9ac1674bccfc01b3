use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;
use tokio::io::ErrorKind;

use crate::config::DIR_MODE;
use crate::sanitize::PathPolicy;

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
    policy: PathPolicy,
}

impl Storage {
    pub fn new(root: PathBuf, policy: PathPolicy) -> Self {
        Self { root, policy }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn user_root(&self, username: &str) -> PathBuf {
        self.root.join(username)
    }

    /// Computes `<root>/<username>/<sub_path>/<filename>` for an upload.
    ///
    /// Both names are appended segment by segment, so a leading `/` never
    /// makes the destination absolute. Under [`PathPolicy::Contained`] the
    /// result is additionally checked to stay below the user directory
    /// without crossing a symlink.
    pub async fn resolve_upload(
        &self,
        username: &str,
        sub_path: Option<&str>,
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        if !self.policy.accepts(filename) || !names_a_file(filename) {
            return Err(StorageError::InvalidFilename);
        }
        let sub_path = sub_path.filter(|value| !value.is_empty());
        if let Some(value) = sub_path
            && !self.policy.accepts(value)
        {
            return Err(StorageError::InvalidPath);
        }

        let user_root = self.user_root(username);
        let mut target = user_root.clone();
        if let Some(value) = sub_path {
            append_segments(&mut target, value);
        }
        append_segments(&mut target, filename);

        if self.policy.checks_containment() {
            let normalized = lexical_normalize(&target);
            if normalized == user_root || !normalized.starts_with(&user_root) {
                return Err(StorageError::InvalidPath);
            }
            self.ensure_no_symlink_components(&normalized).await?;
            return Ok(normalized);
        }

        Ok(target)
    }

    /// Creates `dir` and any missing ancestors with [`DIR_MODE`].
    pub async fn ensure_dir(&self, dir: &Path) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(DIR_MODE);
        builder.create(dir).await
    }

    /// Maps a URL-relative path onto the storage root, refusing any component
    /// that could leave it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let mut normalized = PathBuf::new();
        let trimmed = relative.trim_start_matches(['/', '\\']);
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(segment) => normalized.push(segment),
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath);
                }
            }
        }
        Ok(self.root.join(normalized))
    }

    async fn ensure_no_symlink_components(&self, target: &Path) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidPath)?;
        let mut current = PathBuf::from(&self.root);
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(StorageError::InvalidPath);
                    }
                    // nothing below a regular file exists; the create reports it
                    if components.peek().is_some() && !metadata.is_dir() {
                        return Ok(());
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(())
    }

    pub async fn list_dir(&self, target: &Path) -> Result<Vec<FileEntry>, StorageError> {
        let mut dir = fs::read_dir(target).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().to_string();
            let modified = metadata
                .modified()
                .ok()
                .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                .map(format_timestamp);

            entries.push(FileEntry {
                name,
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified,
            });
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name.cmp(&b.name),
        });

        Ok(entries)
    }
}

/// Pushes each `/`-separated segment of `value` onto `base`, skipping empty
/// segments. `.` and `..` are kept as-is.
fn append_segments(base: &mut PathBuf, value: &str) {
    for segment in value.split('/').filter(|segment| !segment.is_empty()) {
        base.push(segment);
    }
}

fn names_a_file(filename: &str) -> bool {
    matches!(filename.rsplit('/').next(), Some(last) if !last.is_empty() && last != "." && last != "..")
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum StorageError {
    InvalidFilename,
    InvalidPath,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[derive(Debug)]
pub struct FileEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<String>,
}
