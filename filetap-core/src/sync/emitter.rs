//! Per-file record emission with provenance fields.

use crate::{
    Result,
    config::TableSpec,
    models::{FileDescriptor, StreamDescriptor},
    rows::{RowOptions, get_row_iterators},
    sink::RecordSink,
    transform::Transformer,
    transport::FileHandle,
};
use serde_json::{Map, Value};

/// Field holding the path of the file a record came from.
pub const SDC_SOURCE_FILE: &str = "_sdc_source_file";
/// Field holding the 1-based line number of the record; the header is line 1.
pub const SDC_SOURCE_LINENO: &str = "_sdc_source_lineno";

/// Adds provenance fields to a row. Provenance overwrites same-named
/// columns.
pub fn with_provenance(mut row: Map<String, Value>, filepath: &str, lineno: u64) -> Value {
    row.insert(SDC_SOURCE_FILE.to_string(), Value::from(filepath));
    row.insert(SDC_SOURCE_LINENO.to_string(), Value::from(lineno));
    Value::Object(row)
}

/// Parses one file and writes its records. Returns the number written.
///
/// Line numbers run on one counter across all readers of the file, so the
/// n-th data row overall gets `n + 1`.
pub fn emit(
    handle: FileHandle,
    table_spec: &TableSpec,
    stream: &StreamDescriptor,
    transformer: &Transformer,
    file: &FileDescriptor,
    sink: &mut dyn RecordSink,
) -> Result<u64> {
    let options = RowOptions {
        key_properties: table_spec.key_properties.clone(),
        delimiter: table_spec.delimiter_byte()?,
        encoding: table_spec.encoding_or_default().to_string(),
        file_name: file.filepath.clone(),
    };

    let mut records_synced: u64 = 0;
    for reader in get_row_iterators(handle, &options, true)? {
        for row in reader {
            let lineno = records_synced.saturating_add(2);
            let record = with_provenance(row?, &file.filepath, lineno);
            let record = transformer.transform(record)?;
            sink.write_record(&stream.tap_stream_id, record)?;
            records_synced = records_synced.saturating_add(1);
        }
    }
    Ok(records_synced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetadataMap;
    use crate::sink::Message;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;
    use std::io::Cursor;

    fn stream() -> StreamDescriptor {
        StreamDescriptor::new(
            "orders",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": ["null", "integer"]},
                    "_sdc_source_file": {"type": "string"},
                    "_sdc_source_lineno": {"type": "integer"}
                }
            }),
        )
    }

    fn run(csv: String) -> (u64, Vec<Message>) {
        let stream = stream();
        let transformer = Transformer::new(&stream.schema, &MetadataMap::new()).unwrap();
        let spec = TableSpec::new("orders", "/in", "orders");
        let file = FileDescriptor::new(
            "/in/orders.csv",
            chrono::Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap(),
        );
        let mut sink: Vec<Message> = Vec::new();
        let count = emit(
            Box::new(Cursor::new(csv.into_bytes())),
            &spec,
            &stream,
            &transformer,
            &file,
            &mut sink,
        )
        .unwrap();
        (count, sink)
    }

    #[test]
    fn test_provenance_overrides_columns() {
        let row = json!({"id": "1", "_sdc_source_file": "spoofed"});
        let Value::Object(row) = row else { unreachable!() };
        let record = with_provenance(row, "/in/a.csv", 2);
        assert_eq!(record[SDC_SOURCE_FILE], json!("/in/a.csv"));
        assert_eq!(record[SDC_SOURCE_LINENO], json!(2));
    }

    #[test]
    fn test_emit_header_and_three_rows() {
        let (count, messages) = run("id\n1\n2\n3\n".to_string());
        assert_eq!(count, 3);
        let linenos: Vec<i64> = messages
            .iter()
            .map(|m| match m {
                Message::Record { record, .. } => record[SDC_SOURCE_LINENO].as_i64().unwrap(),
                other => panic!("unexpected message {:?}", other),
            })
            .collect();
        assert_eq!(linenos, vec![2, 3, 4]);
    }

    proptest! {
        #[test]
        fn prop_lineno_is_row_index_plus_two(ids in proptest::collection::vec(0i64..1_000_000, 0..40)) {
            let mut csv = String::from("id\n");
            for id in &ids {
                csv.push_str(&format!("{}\n", id));
            }
            let (count, messages) = run(csv);
            prop_assert_eq!(count, ids.len() as u64);

            for (idx, message) in messages.iter().enumerate() {
                let Message::Record { record, stream } = message else {
                    return Err(TestCaseError::fail("expected only records"));
                };
                prop_assert_eq!(stream.as_str(), "orders");
                prop_assert_eq!(record[SDC_SOURCE_LINENO].as_u64(), Some(idx as u64 + 2));
                prop_assert_eq!(record[SDC_SOURCE_FILE].as_str(), Some("/in/orders.csv"));
                prop_assert_eq!(record["id"].as_i64(), Some(ids[idx]));
            }
        }
    }
}
