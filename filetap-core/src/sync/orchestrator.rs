//! Table-level incremental sync loop.

use super::{decrypt, emitter};
use crate::{
    Result,
    config::{GpgParams, TableSpec, TapConfig, resolve_for_table},
    error::TapError,
    models::{FileDescriptor, StreamDescriptor, parse_utc_timestamp},
    security::{GnuPgKeyring, KeyLifecycleManager},
    selector::{Checkpoint, FileSelector},
    sink::{RecordSink, State},
    stats::SyncStats,
    transform::Transformer,
    transport::FileTransport,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Bookmark key holding the checkpoint of a table.
pub const MODIFIED_SINCE: &str = "modified_since";
/// Bookmark key holding the path of the last completed file.
pub const LAST_FILE: &str = "last_file";

/// Drives `sync_stream` for the tables of one run.
///
/// Tables and files are processed one at a time. After every file the
/// table's bookmark is advanced to that file's modification time and the
/// state is written to the sink, so an interrupted run resumes after the
/// last complete file.
pub struct SyncOrchestrator<S: RecordSink> {
    config: TapConfig,
    transport: Box<dyn FileTransport>,
    key_manager: Option<KeyLifecycleManager>,
    key_managers: HashMap<PathBuf, KeyLifecycleManager>,
    sink: S,
    stats: SyncStats,
}

impl<S: RecordSink> SyncOrchestrator<S> {
    /// Creates an orchestrator writing to `sink`.
    pub fn new(config: TapConfig, transport: Box<dyn FileTransport>, sink: S) -> Self {
        Self {
            config,
            transport,
            key_manager: None,
            key_managers: HashMap::new(),
            sink,
            stats: SyncStats::new(),
        }
    }

    /// Builder method to supply one key manager for every table.
    pub fn with_key_manager(mut self, key_manager: KeyLifecycleManager) -> Self {
        self.key_manager = Some(key_manager);
        self
    }

    /// Builder method to supply the key manager for one GnuPG home.
    ///
    /// Homes without a registered manager get a GnuPG keyring created on
    /// first use and reused afterwards.
    pub fn with_key_manager_for(
        mut self,
        gnupghome: impl Into<PathBuf>,
        key_manager: KeyLifecycleManager,
    ) -> Self {
        self.key_managers.insert(gnupghome.into(), key_manager);
        self
    }

    /// Sink receiving records and state.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable sink, e.g. to write `SCHEMA` messages up front.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Per-file statistics gathered so far.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Consumes the orchestrator, returning the sink and statistics.
    pub fn into_parts(self) -> (S, SyncStats) {
        (self.sink, self.stats)
    }

    /// Syncs every new file of one stream and returns the records written.
    ///
    /// A stream with no matching table spec, or with several, is skipped and
    /// returns 0.
    ///
    /// # Errors
    /// Returns `TapError::Configuration` when neither a bookmark nor
    /// `start_date` is available. Any failure while processing a file aborts
    /// the table; bookmarks of files already processed stay persisted.
    pub async fn sync_stream(&mut self, state: &mut State, stream: &StreamDescriptor) -> Result<u64> {
        let table_name = stream.tap_stream_id.clone();
        info!("Syncing table \"{}\".", table_name);

        let checkpoint = self.resolve_checkpoint(state, &table_name)?;

        let spec = {
            let matching: Vec<&TableSpec> = self.config.tables_named(&table_name).collect();
            match matching.as_slice() {
                [] => {
                    info!("No table configuration found for \"{}\", skipping.", table_name);
                    return Ok(0);
                }
                [spec] => (*spec).clone(),
                _ => {
                    warn!(
                        "Found {} table configurations for \"{}\", skipping.",
                        matching.len(),
                        table_name
                    );
                    return Ok(0);
                }
            }
        };

        let files = FileSelector::new(self.transport.as_ref())
            .select(&spec, &checkpoint)
            .await?;
        info!("Found {} files to be synced.", files.len());
        if files.is_empty() {
            return Ok(0);
        }

        let transformer = Transformer::new(&stream.schema, &stream.metadata_map())?;
        let mut records_streamed: u64 = 0;
        for file in &files {
            let records = self
                .sync_file(&spec, stream, &transformer, file)
                .await
                .inspect_err(|e| {
                    if e.is_gpg_error() {
                        error!(
                            "Decryption of \"{}\" failed; check gpg_config of table \"{}\"",
                            file.filepath, table_name
                        );
                    }
                })?;
            records_streamed = records_streamed.saturating_add(records);

            state.write_bookmark(&table_name, MODIFIED_SINCE, file.bookmark_value());
            state.write_bookmark(&table_name, LAST_FILE, file.filepath.as_str());
            self.sink.write_state(state)?;
        }

        info!("Wrote {} records for table \"{}\".", records_streamed, table_name);
        Ok(records_streamed)
    }

    /// Bookmark of the table, else `start_date`.
    ///
    /// A `last_file` bookmark is only honored next to a valid
    /// `modified_since`.
    fn resolve_checkpoint(&self, state: &State, table_name: &str) -> Result<Checkpoint> {
        if let Some(bookmark) = state.get_bookmark(table_name, MODIFIED_SINCE) {
            let modified_since = bookmark
                .as_str()
                .and_then(parse_utc_timestamp)
                .ok_or_else(|| {
                    TapError::configuration(format!(
                        "Bookmark {} for table '{}' is not a valid timestamp: {}",
                        MODIFIED_SINCE, table_name, bookmark
                    ))
                })?;
            let last_file = state
                .get_bookmark(table_name, LAST_FILE)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            return Ok(Checkpoint {
                modified_since,
                last_file,
            });
        }
        self.config.start_date().map(Checkpoint::new).ok_or_else(|| {
            TapError::configuration(format!(
                "No bookmark and no start_date available for table '{}'",
                table_name
            ))
        })
    }

    fn key_manager_for(&mut self, params: &GpgParams) -> KeyLifecycleManager {
        if let Some(key_manager) = &self.key_manager {
            return key_manager.clone();
        }
        self.key_managers
            .entry(params.gnupghome())
            .or_insert_with_key(|home| {
                debug!("Creating GnuPG keyring at {}", home.display());
                KeyLifecycleManager::new(Arc::new(GnuPgKeyring::new(home.clone())))
            })
            .clone()
    }

    async fn sync_file(
        &mut self,
        spec: &TableSpec,
        stream: &StreamDescriptor,
        transformer: &Transformer,
        file: &FileDescriptor,
    ) -> Result<u64> {
        info!("Syncing file \"{}\".", file.filepath);
        let mut handle = self.transport.open_handle(file).await?;

        if let Some(params) = resolve_for_table(self.config.gpg_config.as_ref(), spec) {
            let keys = self.key_manager_for(&params);
            decrypt::prepare_keys(&keys, &params).await?;
            handle = decrypt::decrypt_file(handle, &keys, &params, &file.filepath).await?;
        }

        let records = emitter::emit(handle, spec, stream, transformer, file, &mut self.sink)?;
        self.stats
            .add_file_data(&spec.table_name, &file.filepath, file.last_modified, records);
        Ok(records)
    }
}
