//! Derived records and the entity/key vocabulary shared by every layer.
//!
//! Besides raw records, the model contains two derived kinds:
//! - [`SyntheticEvent`]: a begin/end pair merged into one interval
//! - [`ProfileCall`]: a call frame reconstructed from CPU profile samples
//!
//! [`TraceEntity`] is the sum of the three. Entities compare by identity
//! (`Arc::ptr_eq`), never by value, and each has exactly one [`EventKey`].

use super::event::{ProcessId, RawEvent, ThreadId, ThreadKey};
use super::timing::MicroSeconds;
use crate::utils::error::AnnotationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A begin/end record pair merged into one interval
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticEvent {
    pub name: String,
    pub cat: String,
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
    pub pid: ProcessId,
    pub tid: ThreadId,
    pub id: Option<String>,
    /// `{"beginData": .., "endData": ..}`, the two sides' `args`
    pub args: Value,
    /// The begin record; also the identity of this event
    pub raw_source: Arc<RawEvent>,
    pub end_event: Option<Arc<RawEvent>>,
}

impl SyntheticEvent {
    /// Merge a begin record with its (optional) end record
    ///
    /// Without an end the event is stretched to `fallback_end`.
    pub fn from_pair(
        begin: Arc<RawEvent>,
        end: Option<Arc<RawEvent>>,
        fallback_end: MicroSeconds,
    ) -> Self {
        let end_ts = end.as_ref().map(|e| e.ts).unwrap_or(fallback_end);
        let mut args = serde_json::Map::new();
        args.insert("beginData".to_string(), begin.args.clone());
        if let Some(end) = &end {
            args.insert("endData".to_string(), end.args.clone());
        }

        Self {
            name: begin.name.clone(),
            cat: begin.cat.clone(),
            ts: begin.ts,
            dur: end_ts.saturating_span(begin.ts),
            pid: begin.pid,
            tid: begin.tid,
            id: begin.pairing_id().map(str::to_string),
            args: Value::Object(args),
            raw_source: begin,
            end_event: end,
        }
    }

    pub fn end_ts(&self) -> MicroSeconds {
        self.ts + self.dur
    }

    pub fn is_complete(&self) -> bool {
        self.end_event.is_some()
    }
}

/// One call frame reconstructed from CPU profile samples
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileCall {
    pub pid: ProcessId,
    pub tid: ThreadId,
    /// Index of the first sample in which this frame appeared
    pub sample_index: usize,
    pub node_id: i64,
    pub function_name: String,
    pub url: String,
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
}

/// Anything that can be placed in a tree, selected, or annotated
#[derive(Debug, Clone)]
pub enum TraceEntity {
    Raw(Arc<RawEvent>),
    Synthetic(Arc<SyntheticEvent>),
    ProfileCall(Arc<ProfileCall>),
}

impl TraceEntity {
    pub fn name(&self) -> &str {
        match self {
            Self::Raw(e) => &e.name,
            Self::Synthetic(e) => &e.name,
            Self::ProfileCall(c) => &c.function_name,
        }
    }

    pub fn ts(&self) -> MicroSeconds {
        match self {
            Self::Raw(e) => e.ts,
            Self::Synthetic(e) => e.ts,
            Self::ProfileCall(c) => c.ts,
        }
    }

    pub fn dur(&self) -> MicroSeconds {
        match self {
            Self::Raw(e) => e.dur.unwrap_or(MicroSeconds::ZERO),
            Self::Synthetic(e) => e.dur,
            Self::ProfileCall(c) => c.dur,
        }
    }

    pub fn end_ts(&self) -> MicroSeconds {
        self.ts() + self.dur()
    }

    pub fn thread_key(&self) -> ThreadKey {
        match self {
            Self::Raw(e) => e.thread_key(),
            Self::Synthetic(e) => ThreadKey::new(e.pid, e.tid),
            Self::ProfileCall(c) => ThreadKey::new(c.pid, c.tid),
        }
    }

    /// The key this entity would have in the trace it was parsed from
    pub fn key(&self) -> EventKey {
        match self {
            Self::Raw(e) => EventKey::Raw(e.seq),
            Self::Synthetic(e) => EventKey::Synthetic(e.raw_source.seq),
            Self::ProfileCall(c) => EventKey::ProfileCall {
                pid: c.pid,
                tid: c.tid,
                sample_index: c.sample_index,
                node_id: c.node_id,
            },
        }
    }
}

impl PartialEq for TraceEntity {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Raw(a), Self::Raw(b)) => Arc::ptr_eq(a, b),
            (Self::Synthetic(a), Self::Synthetic(b)) => Arc::ptr_eq(a, b),
            (Self::ProfileCall(a), Self::ProfileCall(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Arc<RawEvent>> for TraceEntity {
    fn from(event: Arc<RawEvent>) -> Self {
        Self::Raw(event)
    }
}

impl From<Arc<SyntheticEvent>> for TraceEntity {
    fn from(event: Arc<SyntheticEvent>) -> Self {
        Self::Synthetic(event)
    }
}

impl From<Arc<ProfileCall>> for TraceEntity {
    fn from(call: Arc<ProfileCall>) -> Self {
        Self::ProfileCall(call)
    }
}

/// Stable, serializable identity of an entity within one trace
///
/// Written as dash-joined text: `r-<seq>`, `s-<seq>`, and
/// `p-<pid>-<tid>-<sampleIndex>-<nodeId>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventKey {
    Raw(usize),
    /// Keyed by the sequence number of the synthetic event's begin record
    Synthetic(usize),
    ProfileCall {
        pid: ProcessId,
        tid: ThreadId,
        sample_index: usize,
        node_id: i64,
    },
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(seq) => write!(f, "r-{}", seq),
            Self::Synthetic(seq) => write!(f, "s-{}", seq),
            Self::ProfileCall {
                pid,
                tid,
                sample_index,
                node_id,
            } => write!(f, "p-{}-{}-{}-{}", pid, tid, sample_index, node_id),
        }
    }
}

impl FromStr for EventKey {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AnnotationError::InvalidKey(s.to_string());
        let parts = key_fields(s).ok_or_else(invalid)?;
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();

        match parts.as_slice() {
            ["r", seq] => Ok(Self::Raw(seq.parse().map_err(|_| invalid())?)),
            ["s", seq] => Ok(Self::Synthetic(seq.parse().map_err(|_| invalid())?)),
            ["p", pid, tid, sample, node] => Ok(Self::ProfileCall {
                pid: pid.parse().map_err(|_| invalid())?,
                tid: tid.parse().map_err(|_| invalid())?,
                sample_index: sample.parse().map_err(|_| invalid())?,
                node_id: node.parse().map_err(|_| invalid())?,
            }),
            _ => Err(invalid()),
        }
    }
}

/// Split dash-joined key text, reading a doubled dash as a negative sign
/// (`p--1-2-0-4` has pid -1)
fn key_fields(s: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut tokens = s.split('-');
    while let Some(token) = tokens.next() {
        if token.is_empty() {
            let magnitude = tokens.next().filter(|t| !t.is_empty())?;
            fields.push(format!("-{}", magnitude));
        } else {
            fields.push(token.to_string());
        }
    }
    Some(fields)
}

impl TryFrom<String> for EventKey {
    type Error = AnnotationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventKey> for String {
    fn from(key: EventKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::event::Phase;

    #[test]
    fn test_negative_ids_survive_text_form() {
        let key = EventKey::ProfileCall {
            pid: -1,
            tid: -7,
            sample_index: 3,
            node_id: -2,
        };
        assert_eq!(key.to_string(), "p--1--7-3--2");
        assert_eq!(key.to_string().parse::<EventKey>().unwrap(), key);

        assert!("r--5".parse::<EventKey>().is_err());
        assert!("p-1-2-3-".parse::<EventKey>().is_err());
        assert!("".parse::<EventKey>().is_err());
    }

    #[test]
    fn test_key_text_form() {
        assert_eq!(EventKey::Raw(12).to_string(), "r-12");
        assert_eq!("s-7".parse::<EventKey>().unwrap(), EventKey::Synthetic(7));
        assert_eq!(
            "p-1-2-30-4".parse::<EventKey>().unwrap(),
            EventKey::ProfileCall {
                pid: 1,
                tid: 2,
                sample_index: 30,
                node_id: 4
            }
        );
    }

    #[test]
    fn test_malformed_keys_rejected() {
        for text in ["", "r", "r-x", "x-1", "p-1-2-3", "s-1-2"] {
            assert!(text.parse::<EventKey>().is_err(), "{} should not parse", text);
        }
    }

    #[test]
    fn test_key_serde_as_string() {
        let json = serde_json::to_string(&EventKey::Raw(3)).unwrap();
        assert_eq!(json, "\"r-3\"");
        let key: EventKey = serde_json::from_str("\"s-9\"").unwrap();
        assert_eq!(key, EventKey::Synthetic(9));
    }

    #[test]
    fn test_synthetic_from_unmatched_begin_uses_fallback() {
        let begin = Arc::new(RawEvent::new("measure", Phase::AsyncBegin, 100).with_id("a"));
        let event = SyntheticEvent::from_pair(begin, None, MicroSeconds(250));
        assert_eq!(event.dur, MicroSeconds(150));
        assert!(!event.is_complete());
        assert_eq!(event.id.as_deref(), Some("a"));
    }

    #[test]
    fn test_entities_compare_by_identity() {
        let a = Arc::new(RawEvent::new("x", Phase::Instant, 1));
        let b = Arc::new(RawEvent::new("x", Phase::Instant, 1));
        assert_eq!(TraceEntity::Raw(a.clone()), TraceEntity::Raw(a.clone()));
        assert_ne!(TraceEntity::Raw(a), TraceEntity::Raw(b));
    }
}
