//! Trace file loading.
//!
//! Accepts the two layouts exporters produce:
//! - a bare JSON array of event records
//! - an object with the array under `traceEvents` (plus optional `metadata`)
//!
//! Files starting with the gzip magic bytes are decompressed first.
//! Records that fail to deserialize are skipped with a warning; the trace is
//! rejected only if every record is unreadable.

use super::event::RawEvent;
use crate::utils::config::{GZIP_MAGIC, TRACE_EVENT_FIELD_NAMES};
use crate::utils::error::ParseError;
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// A loaded trace: events sorted by timestamp, each stamped with its `seq`
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Vec<Arc<RawEvent>>,
    metadata: Option<Value>,
}

impl Trace {
    /// Build a trace from records in capture order
    ///
    /// Records are stably sorted by `ts` and numbered; the numbering is what
    /// raw and synthetic annotation keys refer to, so the same file always
    /// yields the same numbering.
    pub fn from_events(mut events: Vec<RawEvent>) -> Self {
        events.sort_by_key(|e| e.ts);
        let events = events
            .into_iter()
            .enumerate()
            .map(|(seq, mut event)| {
                event.seq = seq;
                Arc::new(event)
            })
            .collect();

        Self {
            events,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn events(&self) -> &[Arc<RawEvent>] {
        &self.events
    }

    pub fn get(&self, seq: usize) -> Option<&Arc<RawEvent>> {
        self.events.get(seq)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }
}

/// Load a trace from disk
///
/// **Public** - main entry point for reading captures
///
/// # Errors
/// * `ParseError::IoError` - File cannot be read or decompressed
/// * `ParseError::JsonError` - Content is not JSON
/// * `ParseError::InvalidFormat` - JSON has no event array
pub fn load_trace(path: impl AsRef<Path>) -> Result<Trace, ParseError> {
    let path = path.as_ref();
    info!("Loading trace from: {}", path.display());

    let bytes = std::fs::read(path)?;
    let text = decode_bytes(&bytes)?;
    let raw: Value = serde_json::from_str(&text)?;
    let trace = parse_trace_value(&raw)?;

    info!("Loaded {} events", trace.len());
    Ok(trace)
}

/// Decompress gzip input, or pass plain text through
fn decode_bytes(bytes: &[u8]) -> Result<String, ParseError> {
    if bytes.starts_with(&GZIP_MAGIC) {
        debug!("Trace is gzip-compressed, inflating");
        let mut text = String::new();
        GzDecoder::new(bytes).read_to_string(&mut text)?;
        Ok(text)
    } else {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ParseError::InvalidFormat(format!("Trace is not UTF-8: {}", e)))
    }
}

/// Parse an already-decoded JSON document into a trace
///
/// **Public** - used by `load_trace` and by tests building traces in memory
pub fn parse_trace_value(raw: &Value) -> Result<Trace, ParseError> {
    let (records, metadata) = match raw {
        Value::Array(records) => (records.as_slice(), None),
        Value::Object(obj) => {
            let records = TRACE_EVENT_FIELD_NAMES
                .iter()
                .find_map(|field| obj.get(*field).and_then(Value::as_array))
                .ok_or_else(|| {
                    ParseError::InvalidFormat("Trace object has no traceEvents array".to_string())
                })?;
            (records.as_slice(), obj.get("metadata").cloned())
        }
        _ => {
            return Err(ParseError::InvalidFormat(
                "Trace must be a JSON object or array".to_string(),
            ))
        }
    };

    let events = parse_records(records)?;
    Ok(Trace::from_events(events).with_metadata(metadata))
}

fn parse_records(records: &[Value]) -> Result<Vec<RawEvent>, ParseError> {
    let mut events = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        match RawEvent::deserialize_record(record) {
            Ok(event) => events.push(event),
            Err(e) => {
                // Log but don't fail - exporters occasionally write junk records
                warn!("Failed to parse event {}: {}", index, e);
            }
        }
    }

    if events.is_empty() && !records.is_empty() {
        return Err(ParseError::InvalidFormat(
            "All trace events failed to parse".to_string(),
        ));
    }

    Ok(events)
}

impl RawEvent {
    fn deserialize_record(record: &Value) -> Result<Self, serde_json::Error> {
        serde::Deserialize::deserialize(record)
    }
}
