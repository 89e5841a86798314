//! Transport over a local (or mounted) directory tree.
//!
//! Paths handed to the sync pipeline are rooted at the transport root and
//! always use `/` separators, e.g. `/in/orders_20200102.csv`, matching what
//! a remote server would report.

use super::{FileHandle, FileTransport};
use crate::{Result, error::TapError, models::FileDescriptor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Transport rooted at a host directory.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    /// Creates a transport serving files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Host directory the transport is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a `/`-rooted transport path onto the host filesystem.
    ///
    /// Parent components are rejected so a table prefix cannot escape the
    /// root.
    fn host_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(TapError::configuration(format!(
                "Path '{}' escapes the transport root",
                path
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Transport path of a host path below the root.
    fn transport_path(&self, host_path: &Path) -> Option<String> {
        let relative = host_path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("/{}", parts.join("/")))
    }

    fn walk(
        &self,
        dir: &Path,
        pattern: &Regex,
        modified_since: DateTime<Utc>,
        found: &mut Vec<FileDescriptor>,
    ) -> Result<()> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            TapError::transport_failed(format!("Failed to list {}", dir.display()), e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                TapError::transport_failed(format!("Failed to read entry in {}", dir.display()), e)
            })?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| {
                TapError::transport_failed(format!("Failed to stat {}", path.display()), e)
            })?;

            // Directory symlinks are not followed
            if file_type.is_dir() {
                self.walk(&path, pattern, modified_since, found)?;
                continue;
            }
            let metadata = match std::fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if file_type.is_symlink() => {
                    debug!("Skipping dangling symlink {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => {
                    return Err(TapError::transport_failed(
                        format!("Failed to stat {}", path.display()),
                        e,
                    ));
                }
            };
            if !metadata.is_file() {
                if file_type.is_symlink() {
                    debug!("Skipping symlink {}", path.display());
                }
                continue;
            }

            let Some(filepath) = self.transport_path(&path) else {
                continue;
            };
            if !pattern.is_match(&filepath) {
                continue;
            }

            let modified = metadata.modified().map_err(|e| {
                TapError::transport_failed(format!("No modification time for {}", path.display()), e)
            })?;
            let last_modified = DateTime::<Utc>::from(modified);
            if last_modified >= modified_since {
                found.push(FileDescriptor::new(filepath, last_modified));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileTransport for LocalTransport {
    async fn test_connection(&self) -> Result<()> {
        let metadata = std::fs::metadata(&self.root).map_err(|e| {
            TapError::transport_failed(format!("Cannot access {}", self.root.display()), e)
        })?;
        if !metadata.is_dir() {
            return Err(TapError::configuration(format!(
                "Transport root {} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }

    async fn list_files(
        &self,
        prefix: &str,
        pattern: &Regex,
        modified_since: DateTime<Utc>,
    ) -> Result<Vec<FileDescriptor>> {
        let start = self.host_path(prefix)?;
        if !start.is_dir() {
            warn!("Search prefix {} does not exist under {}", prefix, self.describe());
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        self.walk(&start, pattern, modified_since, &mut found)?;
        debug!(
            "Listed {} files under {} modified at or after {}",
            found.len(),
            prefix,
            modified_since
        );
        Ok(found)
    }

    async fn open_handle(&self, file: &FileDescriptor) -> Result<FileHandle> {
        let path = self.host_path(&file.filepath)?;
        let handle = std::fs::File::open(&path).map_err(|e| {
            TapError::transport_failed(format!("Failed to open {}", file.filepath), e)
        })?;
        Ok(Box::new(handle))
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::time::{Duration, SystemTime};

    fn touch(root: &Path, relative: &str, contents: &str, mtime: SystemTime) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    fn epoch(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[tokio::test]
    async fn test_list_files_filters_pattern_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "in/orders_1.csv", "id\n1\n", epoch(2_000));
        touch(dir.path(), "in/nested/orders_2.csv", "id\n2\n", epoch(3_000));
        touch(dir.path(), "in/orders_same.csv", "id\n0\n", epoch(1_000));
        touch(dir.path(), "in/orders_old.csv", "id\n0\n", epoch(500));
        touch(dir.path(), "in/customers.csv", "id\n9\n", epoch(3_000));
        touch(dir.path(), "out/orders_3.csv", "id\n3\n", epoch(3_000));

        let transport = LocalTransport::new(dir.path());
        let pattern = Regex::new(r"orders_.*\.csv").unwrap();
        let since = DateTime::<Utc>::from(epoch(1_000));

        let mut files = transport.list_files("/in", &pattern, since).await.unwrap();
        files.sort_by(|a, b| a.filepath.cmp(&b.filepath));

        let paths: Vec<&str> = files.iter().map(|f| f.filepath.as_str()).collect();
        // mtime == since is listed; the selector decides about ties
        assert_eq!(
            paths,
            vec!["/in/nested/orders_2.csv", "/in/orders_1.csv", "/in/orders_same.csv"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_symlink_cycle_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "in/orders_1.csv", "id\n1\n", epoch(2_000));
        std::os::unix::fs::symlink(dir.path().join("in"), dir.path().join("in/loop")).unwrap();

        let transport = LocalTransport::new(dir.path());
        let pattern = Regex::new(r"orders_.*\.csv").unwrap();
        let files = transport
            .list_files("/in", &pattern, DateTime::<Utc>::from(epoch(0)))
            .await
            .unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.filepath.as_str()).collect();
        assert_eq!(paths, vec!["/in/orders_1.csv"]);
    }

    #[tokio::test]
    async fn test_missing_prefix_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());
        let pattern = Regex::new(".*").unwrap();
        let files = transport
            .list_files("/missing", &pattern, DateTime::<Utc>::from(epoch(0)))
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());
        let pattern = Regex::new(".*").unwrap();
        let result = transport
            .list_files("/../etc", &pattern, DateTime::<Utc>::from(epoch(0)))
            .await;
        assert!(matches!(result, Err(TapError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_open_handle_reads_contents() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "in/a.csv", "id\n1\n", epoch(2_000));
        let transport = LocalTransport::new(dir.path());
        transport.test_connection().await.unwrap();

        let file = FileDescriptor::new("/in/a.csv", DateTime::<Utc>::from(epoch(2_000)));
        let mut contents = String::new();
        transport
            .open_handle(&file)
            .await
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "id\n1\n");
    }

    #[tokio::test]
    async fn test_connection_missing_root() {
        let transport = LocalTransport::new("/nonexistent/filetap-root");
        assert!(transport.test_connection().await.is_err());
    }
}
