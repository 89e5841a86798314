//! Per-run sync statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Records emitted from one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStats {
    /// Transport path of the file
    pub filepath: String,
    /// Modification time the bookmark advanced to
    pub last_modified: DateTime<Utc>,
    /// Records written from the file
    pub records: u64,
}

/// Files and record counts per table, in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    tables: BTreeMap<String, Vec<FileStats>>,
}

impl SyncStats {
    /// Creates empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed file of `table`.
    pub fn add_file_data(
        &mut self,
        table: &str,
        filepath: &str,
        last_modified: DateTime<Utc>,
        records: u64,
    ) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(FileStats {
                filepath: filepath.to_string(),
                last_modified,
                records,
            });
    }

    /// Completed files of `table`, in processing order.
    pub fn files(&self, table: &str) -> &[FileStats] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Records written for `table`.
    pub fn table_total(&self, table: &str) -> u64 {
        self.files(table)
            .iter()
            .fold(0, |total, f| total.saturating_add(f.records))
    }

    /// Records written across all tables.
    pub fn total(&self) -> u64 {
        self.tables
            .keys()
            .fold(0, |total, t| total.saturating_add(self.table_total(t)))
    }

    /// Logs one line per file and a total per table.
    pub fn log_summary(&self) {
        if self.tables.is_empty() {
            info!("No files were synced");
            return;
        }
        for (table, files) in &self.tables {
            for file in files {
                info!(
                    "{}: {} records from {} (modified {})",
                    table, file.records, file.filepath, file.last_modified
                );
            }
            info!(
                "{}: {} records from {} files",
                table,
                self.table_total(table),
                files.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_totals() {
        let mut stats = SyncStats::new();
        let ts = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
        stats.add_file_data("orders", "/in/a.csv", ts, 2);
        stats.add_file_data("orders", "/in/b.csv", ts, 3);
        stats.add_file_data("customers", "/in/c.csv", ts, 1);

        assert_eq!(stats.table_total("orders"), 5);
        assert_eq!(stats.files("orders").len(), 2);
        assert_eq!(stats.files("orders")[1].filepath, "/in/b.csv");
        assert_eq!(stats.table_total("missing"), 0);
        assert_eq!(stats.total(), 6);
        stats.log_summary();
    }
}
