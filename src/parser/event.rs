//! Raw trace event records and their classification.
//!
//! A trace is a flat list of [`RawEvent`]s. Handlers never test event names
//! directly: [`RawEvent::kind`] classifies each record into an [`EventKind`]
//! family, and every family is its own enum so that a handler matching on it
//! is checked for exhaustiveness by the compiler.

use super::timing::MicroSeconds;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

pub type ProcessId = i64;
pub type ThreadId = i64;

/// Event phase (`ph`), the primary discriminator of a record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Phase {
    /// `B`
    Begin,
    /// `E`
    End,
    /// `X`
    Complete,
    /// `i` / `I`
    Instant,
    /// `b` (and legacy `S`)
    AsyncBegin,
    /// `e` (and legacy `F`)
    AsyncEnd,
    /// `n` (and legacy `T`/`p`)
    AsyncInstant,
    /// `R`
    Mark,
    /// `M`
    Metadata,
    /// `C`
    Counter,
    /// `P`
    Sample,
    /// `s` / `t` / `f`
    Flow,
    /// `N` / `O` / `D`
    Object,
    /// Anything else, kept verbatim
    Other(String),
}

impl From<String> for Phase {
    fn from(value: String) -> Self {
        match value.as_str() {
            "B" => Self::Begin,
            "E" => Self::End,
            "X" => Self::Complete,
            "i" | "I" => Self::Instant,
            "b" | "S" => Self::AsyncBegin,
            "e" | "F" => Self::AsyncEnd,
            "n" | "T" | "p" => Self::AsyncInstant,
            "R" => Self::Mark,
            "M" => Self::Metadata,
            "C" => Self::Counter,
            "P" => Self::Sample,
            "s" | "t" | "f" => Self::Flow,
            "N" | "O" | "D" => Self::Object,
            _ => Self::Other(value),
        }
    }
}

impl From<Phase> for String {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Begin => "B".to_string(),
            Phase::End => "E".to_string(),
            Phase::Complete => "X".to_string(),
            Phase::Instant => "I".to_string(),
            Phase::AsyncBegin => "b".to_string(),
            Phase::AsyncEnd => "e".to_string(),
            Phase::AsyncInstant => "n".to_string(),
            Phase::Mark => "R".to_string(),
            Phase::Metadata => "M".to_string(),
            Phase::Counter => "C".to_string(),
            Phase::Sample => "P".to_string(),
            Phase::Flow => "s".to_string(),
            Phase::Object => "O".to_string(),
            Phase::Other(raw) => raw,
        }
    }
}

impl Phase {
    /// Begin half of a split record (`B`, `b`, `S`)
    pub fn is_begin_class(&self) -> bool {
        matches!(self, Self::Begin | Self::AsyncBegin)
    }

    /// End half of a split record (`E`, `e`, `F`)
    pub fn is_end_class(&self) -> bool {
        matches!(self, Self::End | Self::AsyncEnd)
    }
}

/// Process/thread pair identifying one track
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThreadKey {
    pub pid: ProcessId,
    pub tid: ThreadId,
}

impl ThreadKey {
    pub fn new(pid: ProcessId, tid: ThreadId) -> Self {
        Self { pid, tid }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pid, self.tid)
    }
}

/// Scoped async id (`id2`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Id2 {
    #[serde(default, deserialize_with = "deserialize_trace_id")]
    pub local: Option<String>,
    #[serde(default, deserialize_with = "deserialize_trace_id")]
    pub global: Option<String>,
}

/// One atomic record from the captured trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Position in the loaded, timestamp-sorted trace
    #[serde(skip)]
    pub seq: usize,

    pub name: String,

    #[serde(default)]
    pub cat: String,

    pub ph: Phase,

    #[serde(default)]
    pub ts: MicroSeconds,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dur: Option<MicroSeconds>,

    #[serde(default)]
    pub pid: ProcessId,

    #[serde(default)]
    pub tid: ThreadId,

    /// Async id; numeric ids are kept in their decimal/hex text form
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_trace_id"
    )]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id2: Option<Id2>,

    /// Instant event scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<String>,

    #[serde(default)]
    pub args: Value,
}

fn deserialize_trace_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl RawEvent {
    /// Create a bare event; used by tests and synthetic fixtures
    pub fn new(name: impl Into<String>, ph: Phase, ts: i64) -> Self {
        Self {
            seq: 0,
            name: name.into(),
            cat: String::new(),
            ph,
            ts: MicroSeconds(ts),
            dur: None,
            pid: 0,
            tid: 0,
            id: None,
            id2: None,
            s: None,
            args: Value::Null,
        }
    }

    pub fn with_cat(mut self, cat: impl Into<String>) -> Self {
        self.cat = cat.into();
        self
    }

    pub fn with_dur(mut self, dur: i64) -> Self {
        self.dur = Some(MicroSeconds(dur));
        self
    }

    pub fn with_thread(mut self, pid: ProcessId, tid: ThreadId) -> Self {
        self.pid = pid;
        self.tid = tid;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn thread_key(&self) -> ThreadKey {
        ThreadKey::new(self.pid, self.tid)
    }

    /// Timestamp at which the event ends (`ts` for instants)
    pub fn end_ts(&self) -> MicroSeconds {
        self.ts + self.dur.unwrap_or(MicroSeconds::ZERO)
    }

    /// Id used to pair split begin/end records, if any
    pub fn pairing_id(&self) -> Option<&str> {
        if let Some(id) = &self.id {
            return Some(id);
        }
        let id2 = self.id2.as_ref()?;
        id2.local.as_deref().or(id2.global.as_deref())
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    /// `args.data`, where most domain payloads live
    pub fn data(&self) -> Option<&Value> {
        self.args.get("data")
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data()?.get(key)?.as_str()
    }

    pub fn data_i64(&self, key: &str) -> Option<i64> {
        value_as_i64(self.data()?.get(key)?)
    }

    pub fn data_f64(&self, key: &str) -> Option<f64> {
        self.data()?.get(key)?.as_f64()
    }

    pub fn data_bool(&self, key: &str) -> Option<bool> {
        value_as_bool(self.data()?.get(key)?)
    }

    fn arg_i64(&self, key: &str) -> Option<i64> {
        value_as_i64(self.args.get(key)?)
    }

    fn begin_data_str(&self, key: &str) -> Option<&str> {
        self.args.get("beginData")?.get(key)?.as_str()
    }

    fn data_id(&self, key: &str) -> Option<String> {
        match self.data()?.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn value_as_bool(value: &Value) -> Option<bool> {
    value
        .as_bool()
        .or_else(|| value.as_i64().map(|n| n != 0))
}

/// Frame pipeline signals emitted by the compositor
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSignal {
    SetLayerTreeId {
        frame: Option<String>,
        layer_tree_id: i64,
    },
    BeginFrame {
        seq_id: u64,
        layer_tree_id: Option<i64>,
    },
    DroppedFrame {
        seq_id: u64,
        layer_tree_id: Option<i64>,
        is_partial: bool,
    },
    Commit {
        seq_id: Option<u64>,
        layer_tree_id: Option<i64>,
    },
    DrawFrame {
        seq_id: u64,
        layer_tree_id: Option<i64>,
    },
}

/// `blink.user_timing` records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTimingSignal {
    /// One half of a `performance.measure()` pair
    Measure,
    /// `performance.mark()`
    Mark,
}

/// Resource loading records, keyed by request id
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkSignal {
    WillSendRequest { request_id: String },
    SendRequest { request_id: String },
    ReceiveResponse { request_id: String },
    ReceivedData { request_id: String },
    Finish { request_id: String },
}

impl NetworkSignal {
    pub fn request_id(&self) -> &str {
        match self {
            Self::WillSendRequest { request_id }
            | Self::SendRequest { request_id }
            | Self::ReceiveResponse { request_id }
            | Self::ReceivedData { request_id }
            | Self::Finish { request_id } => request_id,
        }
    }
}

/// WebSocket lifecycle records, keyed by connection identifier
#[derive(Debug, Clone, PartialEq)]
pub enum WebSocketSignal {
    Create { identifier: i64, url: Option<String> },
    SendHandshakeRequest { identifier: i64 },
    ReceiveHandshakeResponse { identifier: i64 },
    Destroy { identifier: i64 },
}

impl WebSocketSignal {
    pub fn identifier(&self) -> i64 {
        match self {
            Self::Create { identifier, .. }
            | Self::SendHandshakeRequest { identifier }
            | Self::ReceiveHandshakeResponse { identifier }
            | Self::Destroy { identifier } => *identifier,
        }
    }
}

/// Causal link families recorded by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitiatorLink {
    Timer,
    AnimationFrame,
    IdleCallback,
    StyleRecalc,
    Layout,
}

/// Which side of a causal link an event sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorRole {
    Initiator,
    Initiated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitiatorSignal {
    pub link: InitiatorLink,
    pub role: InitiatorRole,
    /// Shared id (timer id, callback id or frame id)
    pub key: String,
}

/// CPU profile records
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileSignal {
    Profile { id: String },
    ProfileChunk { id: String },
}

/// Trace metadata records
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataSignal {
    ThreadName { name: String },
    ProcessName { name: String },
    TracingStartedInBrowser,
}

/// Classification of a raw event into its domain family
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Frame(FrameSignal),
    EventTiming,
    UserTiming(UserTimingSignal),
    ConsoleTime,
    Network(NetworkSignal),
    LayoutShift,
    WebSocket(WebSocketSignal),
    Initiator(InitiatorSignal),
    Profile(ProfileSignal),
    Metadata(MetadataSignal),
    Other,
}

const USER_TIMING_CATEGORY: &str = "blink.user_timing";
const CONSOLE_CATEGORY: &str = "blink.console";

// Navigation timing marks share the user timing category but are not
// authored by the page
const NAVIGATION_TIMING_NAMES: &[&str] = &[
    "navigationStart",
    "fetchStart",
    "requestStart",
    "responseEnd",
    "domLoading",
    "domInteractive",
    "domContentLoadedEventStart",
    "domContentLoadedEventEnd",
    "domComplete",
    "loadEventStart",
    "loadEventEnd",
    "unloadEventStart",
    "unloadEventEnd",
    "redirectStart",
    "redirectEnd",
];

impl RawEvent {
    /// Classify this record
    ///
    /// **Public** - the single dispatch point used by every handler
    ///
    /// Records that look like a known family but lack the fields that family
    /// needs (e.g. a `BeginFrame` without `frameSeqId`) classify as
    /// [`EventKind::Other`] and are ignored downstream.
    pub fn kind(&self) -> EventKind {
        if let Some(kind) = self.classify_by_name() {
            return kind;
        }
        if self.cat.contains(USER_TIMING_CATEGORY)
            && !NAVIGATION_TIMING_NAMES.contains(&self.name.as_str())
        {
            return match self.ph {
                Phase::AsyncBegin | Phase::AsyncEnd => {
                    EventKind::UserTiming(UserTimingSignal::Measure)
                }
                Phase::Mark | Phase::Instant => EventKind::UserTiming(UserTimingSignal::Mark),
                _ => EventKind::Other,
            };
        }
        if self.cat.contains(CONSOLE_CATEGORY) && (self.ph.is_begin_class() || self.ph.is_end_class())
        {
            return EventKind::ConsoleTime;
        }
        EventKind::Other
    }

    fn classify_by_name(&self) -> Option<EventKind> {
        let kind = match self.name.as_str() {
            "SetLayerTreeId" => EventKind::Frame(FrameSignal::SetLayerTreeId {
                frame: self.data_str("frame").map(str::to_string),
                layer_tree_id: self.data_i64("layerTreeId")?,
            }),
            "BeginFrame" => EventKind::Frame(FrameSignal::BeginFrame {
                seq_id: self.frame_seq_id()?,
                layer_tree_id: self.arg_i64("layerTreeId"),
            }),
            "DroppedFrame" => EventKind::Frame(FrameSignal::DroppedFrame {
                seq_id: self.frame_seq_id()?,
                layer_tree_id: self.arg_i64("layerTreeId"),
                is_partial: self
                    .arg("hasPartialUpdate")
                    .and_then(value_as_bool)
                    .unwrap_or(false),
            }),
            "Commit" | "CompositeLayers" => EventKind::Frame(FrameSignal::Commit {
                seq_id: self.frame_seq_id(),
                layer_tree_id: self.arg_i64("layerTreeId"),
            }),
            "DrawFrame" => EventKind::Frame(FrameSignal::DrawFrame {
                seq_id: self.frame_seq_id()?,
                layer_tree_id: self.arg_i64("layerTreeId"),
            }),
            "EventTiming" if self.ph.is_begin_class() || self.ph.is_end_class() => {
                EventKind::EventTiming
            }
            "ResourceWillSendRequest" => EventKind::Network(NetworkSignal::WillSendRequest {
                request_id: self.data_id("requestId")?,
            }),
            "ResourceSendRequest" => EventKind::Network(NetworkSignal::SendRequest {
                request_id: self.data_id("requestId")?,
            }),
            "ResourceReceiveResponse" => EventKind::Network(NetworkSignal::ReceiveResponse {
                request_id: self.data_id("requestId")?,
            }),
            "ResourceReceivedData" => EventKind::Network(NetworkSignal::ReceivedData {
                request_id: self.data_id("requestId")?,
            }),
            "ResourceFinish" => EventKind::Network(NetworkSignal::Finish {
                request_id: self.data_id("requestId")?,
            }),
            "LayoutShift" => EventKind::LayoutShift,
            "WebSocketCreate" => EventKind::WebSocket(WebSocketSignal::Create {
                identifier: self.data_i64("identifier")?,
                url: self.data_str("url").map(str::to_string),
            }),
            "WebSocketSendHandshakeRequest" => {
                EventKind::WebSocket(WebSocketSignal::SendHandshakeRequest {
                    identifier: self.data_i64("identifier")?,
                })
            }
            "WebSocketReceiveHandshakeResponse" => {
                EventKind::WebSocket(WebSocketSignal::ReceiveHandshakeResponse {
                    identifier: self.data_i64("identifier")?,
                })
            }
            "WebSocketDestroy" => EventKind::WebSocket(WebSocketSignal::Destroy {
                identifier: self.data_i64("identifier")?,
            }),
            "TimerInstall" => self.initiator(InitiatorLink::Timer, InitiatorRole::Initiator, "timerId")?,
            "TimerFire" => self.initiator(InitiatorLink::Timer, InitiatorRole::Initiated, "timerId")?,
            "RequestAnimationFrame" => {
                self.initiator(InitiatorLink::AnimationFrame, InitiatorRole::Initiator, "id")?
            }
            "FireAnimationFrame" => {
                self.initiator(InitiatorLink::AnimationFrame, InitiatorRole::Initiated, "id")?
            }
            "RequestIdleCallback" => {
                self.initiator(InitiatorLink::IdleCallback, InitiatorRole::Initiator, "id")?
            }
            "FireIdleCallback" => {
                self.initiator(InitiatorLink::IdleCallback, InitiatorRole::Initiated, "id")?
            }
            "ScheduleStyleRecalculation" => {
                self.initiator(InitiatorLink::StyleRecalc, InitiatorRole::Initiator, "frame")?
            }
            "UpdateLayoutTree" => EventKind::Initiator(InitiatorSignal {
                link: InitiatorLink::StyleRecalc,
                role: InitiatorRole::Initiated,
                key: self.begin_data_str("frame")?.to_string(),
            }),
            "InvalidateLayout" => {
                self.initiator(InitiatorLink::Layout, InitiatorRole::Initiator, "frame")?
            }
            "Layout" => EventKind::Initiator(InitiatorSignal {
                link: InitiatorLink::Layout,
                role: InitiatorRole::Initiated,
                key: self.begin_data_str("frame")?.to_string(),
            }),
            "Profile" => EventKind::Profile(ProfileSignal::Profile {
                id: self.pairing_id()?.to_string(),
            }),
            "ProfileChunk" => EventKind::Profile(ProfileSignal::ProfileChunk {
                id: self.pairing_id()?.to_string(),
            }),
            "thread_name" if self.ph == Phase::Metadata => {
                EventKind::Metadata(MetadataSignal::ThreadName {
                    name: self.arg("name")?.as_str()?.to_string(),
                })
            }
            "process_name" if self.ph == Phase::Metadata => {
                EventKind::Metadata(MetadataSignal::ProcessName {
                    name: self.arg("name")?.as_str()?.to_string(),
                })
            }
            "TracingStartedInBrowser" => {
                EventKind::Metadata(MetadataSignal::TracingStartedInBrowser)
            }
            _ => return None,
        };
        Some(kind)
    }

    fn frame_seq_id(&self) -> Option<u64> {
        self.arg_i64("frameSeqId")
            .and_then(|id| u64::try_from(id).ok())
    }

    fn initiator(&self, link: InitiatorLink, role: InitiatorRole, field: &str) -> Option<EventKind> {
        Some(EventKind::Initiator(InitiatorSignal {
            link,
            role,
            key: self.data_id(field)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_minimal_record() {
        let event: RawEvent = serde_json::from_value(json!({
            "name": "RunTask",
            "cat": "disabled-by-default-devtools.timeline",
            "ph": "X",
            "ts": 100,
            "dur": 20,
            "pid": 1,
            "tid": 2,
            "args": {}
        }))
        .unwrap();

        assert_eq!(event.ph, Phase::Complete);
        assert_eq!(event.end_ts(), MicroSeconds(120));
        assert_eq!(event.thread_key(), ThreadKey::new(1, 2));
    }

    #[test]
    fn test_numeric_and_scoped_ids() {
        let event: RawEvent = serde_json::from_value(json!({
            "name": "x", "ph": "b", "ts": 1, "id": 42
        }))
        .unwrap();
        assert_eq!(event.pairing_id(), Some("42"));

        let event: RawEvent = serde_json::from_value(json!({
            "name": "x", "ph": "b", "ts": 1, "id2": {"local": "0x7"}
        }))
        .unwrap();
        assert_eq!(event.pairing_id(), Some("0x7"));
    }

    #[test]
    fn test_unknown_phase_round_trips() {
        let event: RawEvent = serde_json::from_value(json!({
            "name": "x", "ph": "?", "ts": 1
        }))
        .unwrap();
        assert_eq!(event.ph, Phase::Other("?".to_string()));
        let text: String = event.ph.into();
        assert_eq!(text, "?");
    }

    #[test]
    fn test_classify_frame_signals() {
        let begin = RawEvent::new("BeginFrame", Phase::Instant, 10)
            .with_args(json!({"frameSeqId": 5, "layerTreeId": 1}));
        assert_eq!(
            begin.kind(),
            EventKind::Frame(FrameSignal::BeginFrame {
                seq_id: 5,
                layer_tree_id: Some(1)
            })
        );

        // No sequence id: not a usable frame signal
        let broken = RawEvent::new("DrawFrame", Phase::Instant, 10);
        assert_eq!(broken.kind(), EventKind::Other);
    }

    #[test]
    fn test_classify_user_timing() {
        let measure = RawEvent::new("my-measure", Phase::AsyncBegin, 0)
            .with_cat("blink.user_timing");
        assert_eq!(
            measure.kind(),
            EventKind::UserTiming(UserTimingSignal::Measure)
        );

        let nav = RawEvent::new("navigationStart", Phase::Mark, 0).with_cat("blink.user_timing");
        assert_eq!(nav.kind(), EventKind::Other);
    }

    #[test]
    fn test_classify_initiators() {
        let layout = RawEvent::new("Layout", Phase::Complete, 0)
            .with_args(json!({"beginData": {"frame": "F1"}}));
        assert_eq!(
            layout.kind(),
            EventKind::Initiator(InitiatorSignal {
                link: InitiatorLink::Layout,
                role: InitiatorRole::Initiated,
                key: "F1".to_string()
            })
        );
    }
}
