//! Network requests assembled from resource loading records.
//!
//! Records sharing a `requestId` are grouped; each group with a
//! `ResourceSendRequest` becomes one [`NetworkRequest`] whose synthetic
//! interval runs from that record to `ResourceFinish` (or the last record
//! seen for the request, or the trace end).

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::parser::entity::SyntheticEvent;
use crate::parser::event::{EventKind, NetworkSignal, RawEvent};
use crate::parser::timing::MicroSeconds;
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRequest {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub priority: Option<String>,
    /// Initiator type (`parser`, `script`, ...) and URL, when recorded
    pub initiator_type: Option<String>,
    pub initiator_url: Option<String>,
    pub status_code: Option<i64>,
    pub mime_type: Option<String>,
    pub from_cache: bool,
    pub failed: bool,
    pub encoded_data_length: i64,
    pub response_headers: Vec<ResponseHeader>,
    /// URLs of earlier sends of the same request id
    pub redirects: Vec<String>,
    pub send_ts: MicroSeconds,
    pub response_ts: Option<MicroSeconds>,
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
    pub synthetic: Arc<SyntheticEvent>,
}

impl NetworkRequest {
    /// First header value with this name, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkData {
    /// Sorted by `ts`
    pub requests: Vec<Arc<NetworkRequest>>,
    by_id: HashMap<String, Arc<NetworkRequest>>,
}

impl NetworkData {
    pub fn request(&self, request_id: &str) -> Option<&Arc<NetworkRequest>> {
        self.by_id.get(request_id)
    }
}

/// Records collected for one request id
#[derive(Debug, Default)]
struct RequestRecords {
    will_send: Option<Arc<RawEvent>>,
    sends: Vec<Arc<RawEvent>>,
    response: Option<Arc<RawEvent>>,
    data: Vec<Arc<RawEvent>>,
    finish: Option<Arc<RawEvent>>,
}

impl RequestRecords {
    fn build(self, request_id: String, trace_end: MicroSeconds) -> Option<NetworkRequest> {
        let send = self.sends.last()?.clone();
        let first_send = self.sends.first()?.clone();

        let end = self
            .finish
            .clone()
            .or_else(|| self.data.last().cloned())
            .or_else(|| self.response.clone());
        let synthetic = Arc::new(SyntheticEvent::from_pair(first_send.clone(), end, trace_end));

        let initiator = send
            .data()
            .and_then(|d| d.get("initiator"))
            .or_else(|| self.will_send.as_ref()?.data()?.get("initiator"));
        let response_data = self.response.as_ref().and_then(|r| r.data());

        let received: i64 = self
            .data
            .iter()
            .filter_map(|d| d.data_i64("encodedDataLength"))
            .sum();
        let encoded_data_length = self
            .finish
            .as_ref()
            .and_then(|f| f.data_i64("encodedDataLength"))
            .unwrap_or(received);

        Some(NetworkRequest {
            url: send.data_str("url").unwrap_or_default().to_string(),
            method: send
                .data_str("requestMethod")
                .unwrap_or("GET")
                .to_string(),
            priority: send.data_str("priority").map(str::to_string),
            initiator_type: initiator
                .and_then(|i| i.get("type")?.as_str())
                .map(str::to_string),
            initiator_url: initiator
                .and_then(|i| i.get("url")?.as_str())
                .map(str::to_string),
            status_code: self.response.as_ref().and_then(|r| r.data_i64("statusCode")),
            mime_type: self
                .response
                .as_ref()
                .and_then(|r| r.data_str("mimeType"))
                .map(str::to_string),
            from_cache: self
                .response
                .as_ref()
                .and_then(|r| r.data_bool("fromCache"))
                .unwrap_or(false),
            failed: self
                .finish
                .as_ref()
                .and_then(|f| f.data_bool("didFail"))
                .unwrap_or(false),
            encoded_data_length,
            response_headers: response_data
                .and_then(|d| d.get("headers"))
                .map(parse_headers)
                .unwrap_or_default(),
            redirects: self.sends[..self.sends.len() - 1]
                .iter()
                .filter_map(|s| s.data_str("url").map(str::to_string))
                .collect(),
            send_ts: first_send.ts,
            response_ts: self.response.as_ref().map(|r| r.ts),
            ts: synthetic.ts,
            dur: synthetic.dur,
            synthetic,
            request_id,
        })
    }
}

/// Headers come either as `[{name, value}]` or as a `{name: value}` map
fn parse_headers(value: &Value) -> Vec<ResponseHeader> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, value)| {
                Some(ResponseHeader {
                    name: name.clone(),
                    value: value.as_str()?.to_string(),
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub struct NetworkHandler {
    lifecycle: Lifecycle,
    records: BTreeMap<String, RequestRecords>,
    output: Arc<NetworkData>,
}

impl NetworkHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::Network),
            records: BTreeMap::new(),
            output: Arc::default(),
        }
    }
}

impl Default for NetworkHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for NetworkHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Network
    }

    fn deps(&self) -> &'static [HandlerName] {
        &[HandlerName::Meta]
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn initialize(&mut self) {
        self.lifecycle.initialize();
    }

    fn handle_event(&mut self, event: &Arc<RawEvent>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        let EventKind::Network(signal) = event.kind() else {
            return Ok(());
        };

        let records = self
            .records
            .entry(signal.request_id().to_string())
            .or_default();
        match signal {
            NetworkSignal::WillSendRequest { .. } => {
                records.will_send.get_or_insert_with(|| event.clone());
            }
            NetworkSignal::SendRequest { .. } => records.sends.push(event.clone()),
            NetworkSignal::ReceiveResponse { .. } => records.response = Some(event.clone()),
            NetworkSignal::ReceivedData { .. } => records.data.push(event.clone()),
            NetworkSignal::Finish { .. } => records.finish = Some(event.clone()),
        }
        Ok(())
    }

    async fn finalize(&mut self, ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        let trace_end = ctx.meta()?.trace_end();

        let mut requests: Vec<Arc<NetworkRequest>> = Vec::new();
        let mut incomplete = 0usize;
        for (request_id, records) in std::mem::take(&mut self.records) {
            match records.build(request_id, trace_end) {
                Some(request) => requests.push(Arc::new(request)),
                None => incomplete += 1,
            }
        }
        requests.sort_by_key(|r| r.ts);

        if incomplete > 0 {
            debug!("{} request ids had no ResourceSendRequest", incomplete);
        }
        let by_id = requests
            .iter()
            .map(|r| (r.request_id.clone(), r.clone()))
            .collect();

        self.output = Arc::new(NetworkData { requests, by_id });
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::Network(self.output.clone()))
    }
}
