//! Layout shifts, their session-window clusters and the CLS score.
//!
//! Shifts that follow recent user input are kept in the output but never
//! scored. Scored shifts are grouped into clusters: a new cluster starts when
//! the gap since the previous shift exceeds the configured gap, or when the
//! cluster would grow beyond the configured maximum duration. CLS is the
//! score of the worst cluster.

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::parser::event::{EventKind, RawEvent};
use crate::parser::timing::{MicroSeconds, MilliSeconds};
use crate::utils::config::LayoutShiftConfig;
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutShift {
    pub event: Arc<RawEvent>,
    pub ts: MicroSeconds,
    /// Score as reported, before any frame weighting
    pub score: f64,
    /// Frame-weighted score, the value that contributes to CLS
    pub weighted_score: f64,
    pub had_recent_input: bool,
    /// Index into [`LayoutShiftsData::clusters`]
    pub cluster: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutShiftCluster {
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
    pub score: f64,
    /// Indices into [`LayoutShiftsData::shifts`]
    pub shifts: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutShiftsData {
    pub shifts: Vec<LayoutShift>,
    pub clusters: Vec<LayoutShiftCluster>,
    pub cumulative_layout_shift: f64,
    /// Index of the cluster that defines CLS
    pub worst_cluster: Option<usize>,
}

pub struct LayoutShiftsHandler {
    lifecycle: Lifecycle,
    config: LayoutShiftConfig,
    events: Vec<Arc<RawEvent>>,
    output: Arc<LayoutShiftsData>,
}

impl LayoutShiftsHandler {
    pub fn with_config(config: LayoutShiftConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::LayoutShifts),
            config,
            events: Vec::new(),
            output: Arc::default(),
        }
    }

    /// **Private** - session window clustering over scored shifts
    fn cluster(&self, shifts: &mut [LayoutShift]) -> Vec<LayoutShiftCluster> {
        let gap = MilliSeconds(self.config.gap_ms).to_micro();
        let max_duration = MilliSeconds(self.config.max_cluster_ms).to_micro();
        let mut clusters: Vec<LayoutShiftCluster> = Vec::new();
        let mut last_ts: Option<MicroSeconds> = None;

        for (index, shift) in shifts.iter_mut().enumerate() {
            if shift.had_recent_input {
                continue;
            }

            let starts_new = match (clusters.last(), last_ts) {
                (Some(current), Some(previous)) => {
                    shift.ts.saturating_span(previous) > gap
                        || shift.ts.saturating_span(current.ts) > max_duration
                }
                _ => true,
            };
            if starts_new {
                clusters.push(LayoutShiftCluster {
                    ts: shift.ts,
                    dur: MicroSeconds::ZERO,
                    score: 0.0,
                    shifts: Vec::new(),
                });
            }

            let cluster_index = clusters.len() - 1;
            let current = &mut clusters[cluster_index];
            current.score += shift.weighted_score;
            current.shifts.push(index);
            shift.cluster = Some(cluster_index);
            last_ts = Some(shift.ts);
        }

        // A window stays open for one gap after its last shift, capped at the maximum
        for cluster in &mut clusters {
            let last = cluster
                .shifts
                .last()
                .map(|&i| shifts[i].ts)
                .unwrap_or(cluster.ts);
            let end = (last + gap).min(cluster.ts + max_duration);
            cluster.dur = end.saturating_span(cluster.ts);
        }

        clusters
    }
}

impl Default for LayoutShiftsHandler {
    fn default() -> Self {
        Self::with_config(LayoutShiftConfig::default())
    }
}

#[async_trait]
impl Handler for LayoutShiftsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::LayoutShifts
    }

    fn reset(&mut self) {
        *self = Self::with_config(self.config);
    }

    fn initialize(&mut self) {
        self.lifecycle.initialize();
    }

    fn handle_event(&mut self, event: &Arc<RawEvent>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        if event.kind() == EventKind::LayoutShift {
            self.events.push(event.clone());
        }
        Ok(())
    }

    async fn finalize(&mut self, _ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;

        let mut shifts: Vec<LayoutShift> = self
            .events
            .drain(..)
            .map(|event| {
                let score = event.data_f64("score").unwrap_or(0.0);
                LayoutShift {
                    ts: event.ts,
                    score,
                    weighted_score: event.data_f64("weighted_score_delta").unwrap_or(score),
                    had_recent_input: event.data_bool("had_recent_input").unwrap_or(false),
                    cluster: None,
                    event,
                }
            })
            .collect();

        let clusters = self.cluster(&mut shifts);
        let worst_cluster = clusters
            .iter()
            .enumerate()
            .fold(None::<(usize, f64)>, |worst, (i, c)| match worst {
                Some((_, score)) if score >= c.score => worst,
                _ => Some((i, c.score)),
            });

        debug!(
            "{} layout shifts in {} clusters",
            shifts.len(),
            clusters.len()
        );
        self.output = Arc::new(LayoutShiftsData {
            shifts,
            clusters,
            cumulative_layout_shift: worst_cluster.map(|(_, s)| s).unwrap_or(0.0),
            worst_cluster: worst_cluster.map(|(i, _)| i),
        });
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::LayoutShifts(self.output.clone()))
    }
}
