//! Delimited row readers.
//!
//! A file handle is read fully, decompressed when it looks compressed,
//! decoded to text and parsed with `arrow_csv`. Every column is read as a
//! nullable UTF-8 string; typing is left to the record transformer.

use crate::{Result, error::TapError, transport::FileHandle};
use arrow_array::{Array, RecordBatch, cast::AsArray};
use arrow_csv::reader::Format;
use arrow_schema::{DataType, Field, Schema};
use serde_json::{Map, Value};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const UTF8_BOM: [u8; 3] = [0xef, 0xbb, 0xbf];

/// Rows per Arrow batch.
const BATCH_SIZE: usize = 1024;

/// Parsing options for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOptions {
    /// Headers every file must carry
    pub key_properties: Vec<String>,
    /// Field delimiter byte
    pub delimiter: u8,
    /// `utf-8`, `utf-8-sig`, `latin-1` or `iso-8859-1`
    pub encoding: String,
    /// Used for compression inference and error messages
    pub file_name: String,
}

impl RowOptions {
    /// Comma-delimited UTF-8 options for `file_name`.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            key_properties: Vec::new(),
            delimiter: b',',
            encoding: "utf-8".to_string(),
            file_name: file_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Zstd,
}

fn detect_compression(bytes: &[u8], file_name: &str) -> Compression {
    if bytes.starts_with(&GZIP_MAGIC) {
        Compression::Gzip
    } else if bytes.starts_with(&ZSTD_MAGIC) {
        Compression::Zstd
    } else if file_name.ends_with(".gz") {
        Compression::Gzip
    } else if file_name.ends_with(".zst") {
        Compression::Zstd
    } else {
        Compression::None
    }
}

fn decompress(bytes: Vec<u8>, compression: Compression, file_name: &str) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(bytes),
        Compression::Gzip => {
            let mut out = Vec::new();
            flate2::read::MultiGzDecoder::new(bytes.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| TapError::parse(file_name, format!("invalid gzip data: {}", e)))?;
            Ok(out)
        }
        #[cfg(feature = "compression")]
        Compression::Zstd => zstd::stream::decode_all(bytes.as_slice())
            .map_err(|e| TapError::parse(file_name, format!("invalid zstd data: {}", e))),
        #[cfg(not(feature = "compression"))]
        Compression::Zstd => Err(TapError::unsupported_feature(
            "zstd decompression",
            "compile with the 'compression' feature",
        )),
    }
}

fn decode_text(bytes: Vec<u8>, encoding: &str, file_name: &str) -> Result<String> {
    match encoding.to_ascii_lowercase().replace('_', "-").as_str() {
        "utf-8" | "utf8" => String::from_utf8(bytes)
            .map_err(|e| TapError::parse(file_name, format!("invalid utf-8: {}", e))),
        "utf-8-sig" | "utf8-sig" => {
            let body = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes.as_slice());
            std::str::from_utf8(body)
                .map(str::to_string)
                .map_err(|e| TapError::parse(file_name, format!("invalid utf-8: {}", e)))
        }
        "latin-1" | "latin1" | "iso-8859-1" => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        other => Err(TapError::unsupported_feature(
            "file encoding",
            format!("'{}' is not supported", other),
        )),
    }
}

/// Iterator over the rows of one delimited stream.
///
/// Rows are JSON objects keyed by header; empty cells are `null`. Rows
/// shorter than the header are padded with `null`, while a row with more
/// cells than the header yields a `TapError::Parse` and ends the iterator.
pub struct DelimitedReader {
    file_name: String,
    headers: Vec<String>,
    batches: Option<arrow_csv::Reader<Cursor<Vec<u8>>>>,
    current: Option<RecordBatch>,
    row: usize,
}

impl DelimitedReader {
    fn empty(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            headers: Vec::new(),
            batches: None,
            current: None,
            row: 0,
        }
    }

    /// Header names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn row_at(&self, batch: &RecordBatch, row: usize) -> Map<String, Value> {
        let mut record = Map::with_capacity(self.headers.len());
        for (idx, header) in self.headers.iter().enumerate() {
            let column = batch.column(idx).as_string::<i32>();
            let value = if column.is_null(row) {
                Value::Null
            } else {
                Value::String(column.value(row).to_string())
            };
            record.insert(header.clone(), value);
        }
        record
    }
}

impl Iterator for DelimitedReader {
    type Item = Result<Map<String, Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = &self.current
                && self.row < batch.num_rows()
            {
                let record = self.row_at(batch, self.row);
                self.row = self.row.saturating_add(1);
                return Some(Ok(record));
            }

            let batches = self.batches.as_mut()?;
            match batches.next() {
                Some(Ok(batch)) => {
                    self.current = Some(batch);
                    self.row = 0;
                }
                Some(Err(e)) => {
                    self.batches = None;
                    return Some(Err(TapError::parse(&self.file_name, e.to_string())));
                }
                None => {
                    self.batches = None;
                    self.current = None;
                    return None;
                }
            }
        }
    }
}

/// Opens row readers for a file.
///
/// When `infer_compression` is set, gzip and zstd payloads are detected by
/// magic bytes or by a `.gz` / `.zst` suffix on `options.file_name`.
///
/// # Errors
/// Returns `TapError::Parse` when the file cannot be decoded or lacks one
/// of `options.key_properties` in its header.
pub fn get_row_iterators(
    mut handle: FileHandle,
    options: &RowOptions,
    infer_compression: bool,
) -> Result<Vec<DelimitedReader>> {
    let file_name = options.file_name.as_str();
    let mut bytes = Vec::new();
    handle
        .read_to_end(&mut bytes)
        .map_err(|e| TapError::io(format!("Failed to read {}", file_name), e))?;

    if infer_compression {
        let compression = detect_compression(&bytes, file_name);
        if compression != Compression::None {
            debug!("Decompressing {} as {:?}", file_name, compression);
        }
        bytes = decompress(bytes, compression, file_name)?;
    }
    let text = decode_text(bytes, &options.encoding, file_name)?.into_bytes();

    let format = Format::default()
        .with_header(true)
        .with_delimiter(options.delimiter);
    let (inferred, _) = format
        .infer_schema(Cursor::new(text.as_slice()), Some(0))
        .map_err(|e| TapError::parse(file_name, e.to_string()))?;

    if inferred.fields().is_empty() {
        return Ok(vec![DelimitedReader::empty(file_name)]);
    }

    let headers: Vec<String> = inferred.fields().iter().map(|f| f.name().clone()).collect();
    let missing: Vec<&str> = options
        .key_properties
        .iter()
        .filter(|key| !headers.contains(key))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(TapError::parse(
            file_name,
            format!("file missing required headers: {}", missing.join(", ")),
        ));
    }

    let schema = Schema::new(
        headers
            .iter()
            .map(|name| Field::new(name.as_str(), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    );
    let reader = arrow_csv::ReaderBuilder::new(Arc::new(schema))
        .with_header(true)
        .with_delimiter(options.delimiter)
        .with_batch_size(BATCH_SIZE)
        .with_truncated_rows(true)
        .build(Cursor::new(text))
        .map_err(|e| TapError::parse(file_name, e.to_string()))?;

    Ok(vec![DelimitedReader {
        file_name: file_name.to_string(),
        headers,
        batches: Some(reader),
        current: None,
        row: 0,
    }])
}
