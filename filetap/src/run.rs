//! Command runners for the CLI.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use filetap_core::{
    Catalog, Checkpoint, FileSelector, GnuPgKeyring, JsonLinesSink, KeyLifecycleManager,
    RecordSink, State, SyncOrchestrator, SyncStats, TapConfig, config::resolve_config,
    create_transport, validation::validate_catalog,
};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Loads and validates the connector config file.
pub fn load_config(path: &Path) -> Result<TapConfig> {
    TapConfig::from_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Loads the state file; a missing path means an empty state.
pub fn load_state(path: Option<&Path>) -> Result<State> {
    let Some(path) = path else {
        return Ok(State::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file {}", path.display()))?;
    State::from_value(value)
        .with_context(|| format!("Invalid state in {}", path.display()))
}

/// Loads and validates a catalog file.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse catalog file {}", path.display()))?;
    validate_catalog(&value)
        .with_context(|| format!("Invalid catalog in {}", path.display()))?;
    serde_json::from_value(value)
        .with_context(|| format!("Failed to deserialize catalog {}", path.display()))
}

/// Syncs every selected stream, writing messages to `out`.
///
/// A `SCHEMA` message is written for each selected stream before any
/// records, and the final state is written once more at the end.
pub async fn run_sync<W: Write + Send>(
    config: TapConfig,
    mut state: State,
    catalog: &Catalog,
    out: W,
) -> Result<(State, SyncStats, W)> {
    let transport_config = config.transport_config()?;
    let transport = create_transport(&transport_config)
        .with_context(|| format!("Failed to create transport for {}", transport_config))?;
    info!("Reading files from {}", transport.describe());

    let global_gpg = resolve_config(config.gpg_config.as_ref());
    let mut orchestrator = SyncOrchestrator::new(config, transport, JsonLinesSink::new(out));
    if let Some(params) = global_gpg {
        let home = params.gnupghome();
        let keyring = GnuPgKeyring::new(home.clone());
        orchestrator =
            orchestrator.with_key_manager_for(home, KeyLifecycleManager::new(Arc::new(keyring)));
    }

    let selected: Vec<_> = catalog.selected_streams().collect();
    if selected.is_empty() {
        warn!("No streams selected in catalog");
    }
    for stream in &selected {
        orchestrator.sink_mut().write_schema(
            &stream.tap_stream_id,
            &stream.schema,
            &stream.key_properties,
        )?;
    }

    for stream in &selected {
        orchestrator
            .sync_stream(&mut state, stream)
            .await
            .with_context(|| format!("Failed to sync table {}", stream.tap_stream_id))?;
    }

    let (mut sink, stats) = orchestrator.into_parts();
    sink.write_state(&state)?;
    let mut out = sink.into_inner();
    out.flush().context("Failed to flush output")?;
    Ok((state, stats, out))
}

/// Number of files currently matching one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCheck {
    /// Configured table name
    pub table_name: String,
    /// Files matching since `start_date`
    pub files: usize,
}

/// Checks the transport and counts matching files per configured table.
///
/// Files are counted from `start_date` (or the epoch when none is set).
pub async fn run_test(config: &TapConfig) -> Result<Vec<TableCheck>> {
    let transport_config = config.transport_config()?;
    let transport = create_transport(&transport_config)?;
    transport
        .test_connection()
        .await
        .with_context(|| format!("Connection test failed for {}", transport_config))?;
    info!("✓ Connection to {} successful", transport.describe());

    let since = Checkpoint::new(config.start_date().unwrap_or(DateTime::<Utc>::UNIX_EPOCH));
    let selector = FileSelector::new(transport.as_ref());
    let mut checks = Vec::with_capacity(config.tables.len());
    for table in &config.tables {
        let files = selector
            .select(table, &since)
            .await
            .with_context(|| format!("Failed to list files for table {}", table.table_name))?;
        checks.push(TableCheck {
            table_name: table.table_name.clone(),
            files: files.len(),
        });
    }
    Ok(checks)
}
