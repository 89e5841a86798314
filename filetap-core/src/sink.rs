//! Output messages and the connector state document.
//!
//! Messages are written one JSON object per line: a `SCHEMA` message per
//! stream, `RECORD` messages for rows and `STATE` messages carrying the
//! bookmarks after every processed file.

use crate::{Result, error::TapError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;

/// One line of connector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Message {
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
    },
    Record {
        stream: String,
        record: Value,
    },
    State {
        value: Value,
    },
}

/// Persisted bookmarks, keyed by stream.
///
/// Unknown top-level keys are carried through untouched.
///
/// # Example
/// ```rust
/// use filetap_core::sink::State;
///
/// let mut state = State::default();
/// state.write_bookmark("orders", "modified_since", "2020-01-02T00:00:00Z");
///
/// assert_eq!(
///     state.get_bookmark("orders", "modified_since").and_then(|v| v.as_str()),
///     Some("2020-01-02T00:00:00Z")
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub bookmarks: BTreeMap<String, Map<String, Value>>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl State {
    /// Parses a state document; `null` is treated as empty state.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|e| TapError::Serialization {
            context: "Failed to parse state".to_string(),
            source: e,
        })
    }

    /// Bookmark value `key` of `stream`, if set.
    pub fn get_bookmark(&self, stream: &str, key: &str) -> Option<&Value> {
        self.bookmarks.get(stream).and_then(|b| b.get(key))
    }

    /// Sets bookmark value `key` of `stream`.
    pub fn write_bookmark(&mut self, stream: &str, key: &str, value: impl Into<Value>) {
        self.bookmarks
            .entry(stream.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// State as the JSON value carried by a `STATE` message.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| TapError::Serialization {
            context: "Failed to serialize state".to_string(),
            source: e,
        })
    }
}

/// Destination of connector output.
pub trait RecordSink: Send {
    fn write_message(&mut self, message: Message) -> Result<()>;

    fn write_schema(
        &mut self,
        stream: &str,
        schema: &Value,
        key_properties: &[String],
    ) -> Result<()> {
        self.write_message(Message::Schema {
            stream: stream.to_string(),
            schema: schema.clone(),
            key_properties: key_properties.to_vec(),
        })
    }

    fn write_record(&mut self, stream: &str, record: Value) -> Result<()> {
        self.write_message(Message::Record {
            stream: stream.to_string(),
            record,
        })
    }

    /// Persists state. Implementations must make the state durable before
    /// returning.
    fn write_state(&mut self, state: &State) -> Result<()> {
        let value = state.to_value()?;
        self.write_message(Message::State { value })
    }
}

/// In-memory sink, mostly useful for tests and embedding.
impl RecordSink for Vec<Message> {
    fn write_message(&mut self, message: Message) -> Result<()> {
        self.push(message);
        Ok(())
    }
}

/// Writes newline-delimited JSON messages to a writer.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Creates a sink writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn write_message(&mut self, message: Message) -> Result<()> {
        let is_state = matches!(message, Message::State { .. });
        serde_json::to_writer(&mut self.writer, &message).map_err(|e| {
            TapError::Serialization {
                context: "Failed to write message".to_string(),
                source: e,
            }
        })?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| TapError::io("Failed to write message", e))?;
        if is_state {
            self.writer
                .flush()
                .map_err(|e| TapError::io("Failed to flush state", e))?;
        }
        Ok(())
    }
}
