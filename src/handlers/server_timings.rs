//! Server-Timing metrics mapped onto the trace clock.
//!
//! A response carrying `response-start` and `response-end` metrics (server
//! clock, ms) lets the server/client clock offset be estimated as the mean of
//! `serverStart - clientStart` and `serverEnd - clientEnd`. Every other
//! metric with a `start` is then shifted by that offset.

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::handlers::network::NetworkRequest;
use crate::parser::event::RawEvent;
use crate::parser::timing::{MicroSeconds, MilliSeconds};
use crate::utils::config::{RESPONSE_END_METRIC, RESPONSE_START_METRIC, SERVER_TIMING_HEADER};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

/// One metric as written in a `Server-Timing` header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerTimingMetric {
    pub name: String,
    pub dur: Option<f64>,
    pub desc: Option<String>,
    pub start: Option<f64>,
}

/// One metric placed on the trace clock
#[derive(Debug, Clone, PartialEq)]
pub struct ServerTiming {
    pub metric: String,
    pub description: Option<String>,
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
    pub request_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ServerTimingsData {
    /// Sorted by `ts`
    pub server_timings: Vec<ServerTiming>,
}

/// Parse a `Server-Timing` header value
///
/// **Public** - header grammar only, no clock handling
///
/// Metrics are comma separated, parameters `;` separated. Parameter values
/// are tokens or quoted strings with backslash escapes. Only the first
/// occurrence of a parameter counts. Nameless metrics are skipped.
pub fn parse_server_timing_header(value: &str) -> Vec<ServerTimingMetric> {
    let mut chars = value.chars().peekable();
    let mut metrics = Vec::new();

    loop {
        skip_whitespace(&mut chars);
        if chars.peek().is_none() {
            break;
        }

        let name = read_token(&mut chars);
        let mut metric = ServerTimingMetric {
            name,
            ..Default::default()
        };

        loop {
            skip_whitespace(&mut chars);
            if chars.peek() != Some(&';') {
                break;
            }
            chars.next();
            skip_whitespace(&mut chars);
            let param = read_token(&mut chars).to_ascii_lowercase();
            skip_whitespace(&mut chars);

            let mut param_value = None;
            if chars.peek() == Some(&'=') {
                chars.next();
                skip_whitespace(&mut chars);
                param_value = Some(if chars.peek() == Some(&'"') {
                    read_quoted(&mut chars)
                } else {
                    read_token(&mut chars)
                });
            }

            let Some(param_value) = param_value else {
                continue;
            };
            match param.as_str() {
                "dur" if metric.dur.is_none() => metric.dur = param_value.parse().ok(),
                "start" if metric.start.is_none() => metric.start = param_value.parse().ok(),
                "desc" if metric.desc.is_none() => metric.desc = Some(param_value),
                _ => {}
            }
        }

        // Anything left before the next comma is junk
        for c in chars.by_ref() {
            if c == ',' {
                break;
            }
        }

        if !metric.name.is_empty() {
            metrics.push(metric);
        }
    }

    metrics
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn read_token(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut token = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || matches!(c, ',' | ';' | '=' | '"') {
            break;
        }
        token.push(c);
        chars.next();
    }
    token
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut text = String::new();
    chars.next();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    text.push(escaped);
                }
            }
            '"' => break,
            _ => text.push(c),
        }
    }
    text
}

/// **Private** - maps one request's metrics onto the trace clock
fn timings_for_request(request: &NetworkRequest) -> Vec<ServerTiming> {
    let Some(header) = request.header(SERVER_TIMING_HEADER) else {
        return Vec::new();
    };
    let Some(client_end) = request.response_ts else {
        return Vec::new();
    };
    let metrics = parse_server_timing_header(header);

    let marker = |name: &str| {
        metrics
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.start)
            .map(|start| MilliSeconds(start).to_micro())
    };
    let (Some(server_start), Some(server_end)) =
        (marker(RESPONSE_START_METRIC), marker(RESPONSE_END_METRIC))
    else {
        return Vec::new();
    };

    let client_start = request.send_ts;
    let offset = ((server_start - client_start).value() + (server_end - client_end).value()) / 2;

    metrics
        .iter()
        .filter(|m| m.name != RESPONSE_START_METRIC && m.name != RESPONSE_END_METRIC)
        .filter_map(|m| {
            let start = MilliSeconds(m.start?).to_micro();
            Some(ServerTiming {
                metric: m.name.clone(),
                description: m.desc.clone(),
                ts: MicroSeconds(start.value() - offset),
                dur: MilliSeconds(m.dur.unwrap_or(0.0)).to_micro(),
                request_id: request.request_id.clone(),
                url: request.url.clone(),
            })
        })
        .collect()
}

pub struct ServerTimingsHandler {
    lifecycle: Lifecycle,
    output: Arc<ServerTimingsData>,
}

impl ServerTimingsHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::ServerTimings),
            output: Arc::default(),
        }
    }
}

impl Default for ServerTimingsHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for ServerTimingsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::ServerTimings
    }

    fn deps(&self) -> &'static [HandlerName] {
        &[HandlerName::Network]
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn initialize(&mut self) {
        self.lifecycle.initialize();
    }

    fn handle_event(&mut self, _event: &Arc<RawEvent>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()
    }

    async fn finalize(&mut self, ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        let network = ctx.network()?;

        let mut server_timings: Vec<ServerTiming> = network
            .requests
            .iter()
            .flat_map(|r| timings_for_request(r))
            .collect();
        server_timings.sort_by_key(|t| t.ts);
        debug!("{} server timings", server_timings.len());

        self.output = Arc::new(ServerTimingsData { server_timings });
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::ServerTimings(self.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::network::NetworkHandler;
    use crate::handlers::test_support::{meta_output, run_handler, sequenced};
    use crate::parser::event::Phase;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_header_grammar() {
        let metrics = parse_server_timing_header(
            r#"db;dur=53.2;desc="Main \"DB\"", cache ; desc=hit ; dur = 1, ;dur=5, miss;dur=1;dur=9"#,
        );

        assert_eq!(
            metrics,
            vec![
                ServerTimingMetric {
                    name: "db".to_string(),
                    dur: Some(53.2),
                    desc: Some("Main \"DB\"".to_string()),
                    start: None
                },
                ServerTimingMetric {
                    name: "cache".to_string(),
                    dur: Some(1.0),
                    desc: Some("hit".to_string()),
                    start: None
                },
                ServerTimingMetric {
                    name: "miss".to_string(),
                    dur: Some(1.0),
                    desc: None,
                    start: None
                },
            ]
        );
    }

    async fn network_with_header(header: &str) -> (HandlerName, HandlerOutput) {
        let events = sequenced(vec![
            RawEvent::new("ResourceSendRequest", Phase::Instant, 1_000)
                .with_args(json!({"data": {"requestId": "1", "url": "https://a.test/"}})),
            RawEvent::new("ResourceReceiveResponse", Phase::Instant, 3_000).with_args(json!({
                "data": {"requestId": "1", "headers": [{"name": "server-timing", "value": header}]}
            })),
        ]);
        let mut network = NetworkHandler::new();
        let output = run_handler(&mut network, &events, vec![meta_output(0, 10_000)]).await;
        (HandlerName::Network, output)
    }

    async fn timings_for(header: &str) -> Vec<ServerTiming> {
        let network = network_with_header(header).await;
        let mut handler = ServerTimingsHandler::new();
        match run_handler(&mut handler, &[], vec![network]).await {
            HandlerOutput::ServerTimings(data) => data.server_timings.clone(),
            other => panic!("unexpected output {:?}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_metrics_shifted_onto_trace_clock() {
        // Server clock runs 500 ms (500_000 µs) ahead on both ends
        let timings = timings_for(
            "response-start;start=501, response-end;start=503, db;start=501.5;dur=1;desc=query",
        )
        .await;

        assert_eq!(timings.len(), 1);
        assert_eq!(timings[0].metric, "db");
        assert_eq!(timings[0].ts, MicroSeconds(1_500));
        assert_eq!(timings[0].dur, MicroSeconds(1_000));
        assert_eq!(timings[0].description.as_deref(), Some("query"));
    }

    #[tokio::test]
    async fn test_missing_marker_contributes_nothing() {
        let timings = timings_for("response-start;start=501, db;start=501.5;dur=1").await;
        assert!(timings.is_empty());
    }

    #[tokio::test]
    async fn test_requires_network_dependency_output() {
        let mut handler = ServerTimingsHandler::new();
        handler.initialize();
        let outputs = std::collections::HashMap::new();
        let ctx = FinalizeContext::new(HandlerName::ServerTimings, handler.deps(), &outputs);
        assert_eq!(
            handler.finalize(&ctx).await,
            Err(HandlerError::MissingData {
                handler: HandlerName::ServerTimings,
                dependency: HandlerName::Network
            })
        );
    }
}
