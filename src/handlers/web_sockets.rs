//! WebSocket connection lifecycles grouped by connection identifier.

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::parser::event::{EventKind, RawEvent, WebSocketSignal};
use crate::parser::timing::MicroSeconds;
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketConnection {
    pub identifier: i64,
    pub url: Option<String>,
    /// Every lifecycle record for this connection, in trace order
    pub events: Vec<Arc<RawEvent>>,
    pub ts: MicroSeconds,
    /// Until `WebSocketDestroy`, or the trace end when never destroyed
    pub dur: MicroSeconds,
    pub closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WebSocketsData {
    /// Sorted by `ts`
    pub connections: Vec<WebSocketConnection>,
}

impl WebSocketsData {
    pub fn connection(&self, identifier: i64) -> Option<&WebSocketConnection> {
        self.connections.iter().find(|c| c.identifier == identifier)
    }
}

pub struct WebSocketsHandler {
    lifecycle: Lifecycle,
    by_identifier: BTreeMap<i64, Vec<(Arc<RawEvent>, WebSocketSignal)>>,
    output: Arc<WebSocketsData>,
}

impl WebSocketsHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::WebSockets),
            by_identifier: BTreeMap::new(),
            output: Arc::default(),
        }
    }
}

impl Default for WebSocketsHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for WebSocketsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::WebSockets
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
        if let EventKind::WebSocket(signal) = event.kind() {
            self.by_identifier
                .entry(signal.identifier())
                .or_default()
                .push((event.clone(), signal));
        }
        Ok(())
    }

    async fn finalize(&mut self, ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        let trace_end = ctx.meta()?.trace_end();

        let mut connections: Vec<WebSocketConnection> = std::mem::take(&mut self.by_identifier)
            .into_iter()
            .filter_map(|(identifier, records)| {
                let ts = records.first()?.0.ts;
                let url = records.iter().find_map(|(_, signal)| match signal {
                    WebSocketSignal::Create { url, .. } => url.clone(),
                    _ => None,
                });
                let destroyed = records
                    .iter()
                    .find(|(_, signal)| matches!(signal, WebSocketSignal::Destroy { .. }))
                    .map(|(event, _)| event.ts);

                Some(WebSocketConnection {
                    identifier,
                    url,
                    ts,
                    dur: destroyed.unwrap_or(trace_end).saturating_span(ts),
                    closed: destroyed.is_some(),
                    events: records.into_iter().map(|(event, _)| event).collect(),
                })
            })
            .collect();
        connections.sort_by_key(|c| c.ts);
        debug!("{} web socket connections", connections.len());

        self.output = Arc::new(WebSocketsData { connections });
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::WebSockets(self.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{meta_output, run_handler, sequenced};
    use crate::parser::event::Phase;
    use serde_json::json;

    fn ws(name: &str, ts: i64, data: serde_json::Value) -> RawEvent {
        RawEvent::new(name, Phase::Instant, ts).with_args(json!({ "data": data }))
    }

    #[tokio::test]
    async fn test_records_grouped_by_identifier() {
        let events = sequenced(vec![
            ws("WebSocketCreate", 10, json!({"identifier": 1, "url": "wss://a.test/live"})),
            ws("WebSocketCreate", 20, json!({"identifier": 2, "url": "wss://b.test/"})),
            ws("WebSocketSendHandshakeRequest", 30, json!({"identifier": 1})),
            ws("WebSocketReceiveHandshakeResponse", 40, json!({"identifier": 1})),
            ws("WebSocketDestroy", 90, json!({"identifier": 1})),
        ]);

        let mut handler = WebSocketsHandler::new();
        let data = match run_handler(&mut handler, &events, vec![meta_output(0, 500)]).await {
            HandlerOutput::WebSockets(data) => data,
            other => panic!("unexpected output {:?}", other.name()),
        };

        assert_eq!(data.connections.len(), 2);
        let first = data.connection(1).unwrap();
        assert_eq!(first.url.as_deref(), Some("wss://a.test/live"));
        assert_eq!(first.events.len(), 4);
        assert!(first.closed);
        assert_eq!(first.dur, MicroSeconds(80));

        let second = data.connection(2).unwrap();
        assert!(!second.closed);
        assert_eq!(second.dur, MicroSeconds(480));
    }
}
