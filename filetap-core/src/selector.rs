//! Candidate file selection for a table.

use crate::{
    Result, config::TableSpec, models::FileDescriptor, transport::FileTransport,
};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

/// Position of a table's sync: the newest completed file.
///
/// `last_file` breaks ties between files sharing `modified_since`. Without
/// it, files modified exactly at `modified_since` count as done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Modification time of the last completed file (or `start_date`)
    pub modified_since: DateTime<Utc>,
    /// Path of the last completed file
    pub last_file: Option<String>,
}

impl Checkpoint {
    /// Checkpoint with no tiebreaker, e.g. from `start_date`.
    pub fn new(modified_since: DateTime<Utc>) -> Self {
        Self {
            modified_since,
            last_file: None,
        }
    }

    /// Checkpoint positioned just after `file`.
    pub fn after(file: &FileDescriptor) -> Self {
        Self {
            modified_since: file.last_modified,
            last_file: Some(file.filepath.clone()),
        }
    }

    /// Whether `file` still has to be synced.
    pub fn is_pending(&self, file: &FileDescriptor) -> bool {
        match file.last_modified.cmp(&self.modified_since) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self
                .last_file
                .as_deref()
                .is_some_and(|last| file.filepath.as_str() > last),
        }
    }
}

/// Lists the files a table should sync next.
pub struct FileSelector<'a> {
    transport: &'a dyn FileTransport,
}

impl<'a> FileSelector<'a> {
    /// Creates a selector listing through `transport`.
    pub fn new(transport: &'a dyn FileTransport) -> Self {
        Self { transport }
    }

    /// Returns files matching `spec` that come after `checkpoint`, ordered
    /// by `(last_modified, filepath)`.
    ///
    /// Processing files in this order keeps the checkpoint monotonic: once
    /// a file is done, every file still pending sorts after it.
    ///
    /// # Errors
    /// Returns error if the search pattern is invalid or listing fails.
    pub async fn select(
        &self,
        spec: &TableSpec,
        checkpoint: &Checkpoint,
    ) -> Result<Vec<FileDescriptor>> {
        let pattern = spec.compiled_pattern()?;
        let mut files: Vec<FileDescriptor> = self
            .transport
            .list_files(&spec.search_prefix, &pattern, checkpoint.modified_since)
            .await?
            .into_iter()
            .filter(|f| checkpoint.is_pending(f))
            .collect();

        files.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.filepath.cmp(&b.filepath))
        });
        debug!(
            "Selected {} files for table {} from {}",
            files.len(),
            spec.table_name,
            self.transport.describe()
        );
        Ok(files)
    }
}
