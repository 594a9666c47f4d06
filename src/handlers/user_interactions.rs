//! User interactions built from `EventTiming` begin/end pairs.

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::parser::entity::SyntheticEvent;
use crate::parser::event::{EventKind, RawEvent};
use crate::parser::timing::MicroSeconds;
use crate::utils::config::MIN_INTERACTION_DURATION_MS;
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// One user interaction: an `EventTiming` start paired with its end
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionEvent {
    pub interaction_id: i64,
    pub event_type: String,
    pub ts: MicroSeconds,
    pub dur: MicroSeconds,
    pub synthetic: Arc<SyntheticEvent>,
}

impl InteractionEvent {
    pub fn end_ts(&self) -> MicroSeconds {
        self.ts + self.dur
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserInteractionsData {
    /// Every `EventTiming` record, in trace order
    pub all_events: Vec<Arc<RawEvent>>,
    /// Sorted by `ts`
    pub interactions: Vec<InteractionEvent>,
    /// `interactions` minus those hidden behind another interaction
    pub interactions_with_no_nesting: Vec<InteractionEvent>,
    pub longest_interaction: Option<InteractionEvent>,
}

/// Drop interactions nested inside another
///
/// **Public** - also used directly by tests and the summary
///
/// Among interactions sharing an end time only the earliest start is kept;
/// then any interaction whose range lies within another kept one is dropped.
/// Input order is preserved.
pub fn remove_nested_interactions(interactions: &[InteractionEvent]) -> Vec<InteractionEvent> {
    let mut earliest_for_end: HashMap<MicroSeconds, usize> = HashMap::new();
    for (index, interaction) in interactions.iter().enumerate() {
        earliest_for_end
            .entry(interaction.end_ts())
            .and_modify(|kept| {
                if interaction.ts < interactions[*kept].ts {
                    *kept = index;
                }
            })
            .or_insert(index);
    }

    let mut kept: Vec<usize> = earliest_for_end.into_values().collect();
    kept.sort_unstable();

    kept.iter()
        .filter(|&&index| {
            let candidate = &interactions[index];
            !kept.iter().any(|&other_index| {
                let other = &interactions[other_index];
                other_index != index
                    && other.ts <= candidate.ts
                    && candidate.end_ts() <= other.end_ts()
            })
        })
        .map(|&index| interactions[index].clone())
        .collect()
}

pub struct UserInteractionsHandler {
    lifecycle: Lifecycle,
    all_events: Vec<Arc<RawEvent>>,
    starts: Vec<Arc<RawEvent>>,
    ends_by_id: HashMap<String, Arc<RawEvent>>,
    output: Arc<UserInteractionsData>,
}

impl UserInteractionsHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::UserInteractions),
            all_events: Vec::new(),
            starts: Vec::new(),
            ends_by_id: HashMap::new(),
            output: Arc::default(),
        }
    }

    /// **Private** - a start record counts only with a real duration and interaction id
    fn is_eligible_start(event: &RawEvent) -> bool {
        let duration = event.data_f64("duration").unwrap_or(0.0);
        let interaction_id = event.data_i64("interactionId").unwrap_or(0);
        duration >= MIN_INTERACTION_DURATION_MS && interaction_id != 0
    }
}

impl Default for UserInteractionsHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for UserInteractionsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::UserInteractions
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn initialize(&mut self) {
        self.lifecycle.initialize();
    }

    fn handle_event(&mut self, event: &Arc<RawEvent>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        if event.kind() != EventKind::EventTiming {
            return Ok(());
        }
        self.all_events.push(event.clone());

        if event.ph.is_begin_class() {
            if Self::is_eligible_start(event) {
                self.starts.push(event.clone());
            }
        } else if let Some(id) = event.pairing_id() {
            self.ends_by_id
                .entry(id.to_string())
                .or_insert_with(|| event.clone());
        }
        Ok(())
    }

    async fn finalize(&mut self, _ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;

        let mut interactions = Vec::with_capacity(self.starts.len());
        for start in self.starts.drain(..) {
            let Some(end) = start
                .pairing_id()
                .and_then(|id| self.ends_by_id.get(id))
                .cloned()
            else {
                continue;
            };
            let synthetic = Arc::new(SyntheticEvent::from_pair(start.clone(), Some(end), start.ts));
            interactions.push(InteractionEvent {
                interaction_id: start.data_i64("interactionId").unwrap_or(0),
                event_type: start.data_str("type").unwrap_or_default().to_string(),
                ts: synthetic.ts,
                dur: synthetic.dur,
                synthetic,
            });
        }
        interactions.sort_by_key(|i| i.ts);

        let interactions_with_no_nesting = remove_nested_interactions(&interactions);
        let longest_interaction = interactions
            .iter()
            .fold(None::<&InteractionEvent>, |longest, i| match longest {
                Some(l) if l.dur >= i.dur => Some(l),
                _ => Some(i),
            })
            .cloned();

        debug!(
            "{} interactions ({} after removing nested) from {} EventTiming records",
            interactions.len(),
            interactions_with_no_nesting.len(),
            self.all_events.len()
        );

        self.output = Arc::new(UserInteractionsData {
            all_events: std::mem::take(&mut self.all_events),
            interactions,
            interactions_with_no_nesting,
            longest_interaction,
        });
        self.ends_by_id.clear();
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::UserInteractions(self.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{run_handler, sequenced};
    use crate::parser::event::Phase;
    use serde_json::json;

    async fn interactions_for(events: Vec<RawEvent>) -> Arc<UserInteractionsData> {
        let mut handler = UserInteractionsHandler::new();
        match run_handler(&mut handler, &sequenced(events), vec![]).await {
            HandlerOutput::UserInteractions(data) => data,
            other => panic!("unexpected output {:?}", other.name()),
        }
    }

    fn start(id: &str, interaction_id: i64, event_type: &str, ts: i64, duration: f64) -> RawEvent {
        RawEvent::new("EventTiming", Phase::AsyncBegin, ts)
            .with_id(id)
            .with_args(json!({"data": {
                "interactionId": interaction_id,
                "type": event_type,
                "duration": duration
            }}))
    }

    fn end(id: &str, ts: i64) -> RawEvent {
        RawEvent::new("EventTiming", Phase::AsyncEnd, ts).with_id(id)
    }

    fn fake(ts: i64, end_ts: i64, interaction_id: i64) -> InteractionEvent {
        let raw = Arc::new(RawEvent::new("EventTiming", Phase::AsyncBegin, ts));
        InteractionEvent {
            interaction_id,
            event_type: "pointerdown".to_string(),
            ts: MicroSeconds(ts),
            dur: MicroSeconds(end_ts - ts),
            synthetic: Arc::new(SyntheticEvent::from_pair(raw, None, MicroSeconds(end_ts))),
        }
    }

    fn ids(interactions: &[InteractionEvent]) -> Vec<i64> {
        interactions.iter().map(|i| i.interaction_id).collect()
    }

    #[tokio::test]
    async fn test_pointerdown_pairs_with_end() {
        let data = interactions_for(vec![
            start("i1", 1540, "pointerdown", 100, 5.0),
            end("i1", 132),
        ])
        .await;

        assert_eq!(data.interactions.len(), 1);
        let interaction = &data.interactions[0];
        assert_eq!(interaction.interaction_id, 1540);
        assert_eq!(interaction.event_type, "pointerdown");
        assert_eq!(interaction.ts, MicroSeconds(100));
        assert_eq!(interaction.dur, MicroSeconds(32));
        assert_eq!(data.all_events.len(), 2);
    }

    #[tokio::test]
    async fn test_ineligible_and_unmatched_starts_dropped() {
        let data = interactions_for(vec![
            start("short", 1, "click", 0, 0.5),
            start("no-id", 0, "click", 10, 20.0),
            start("open", 3, "keydown", 20, 20.0),
            end("short", 30),
            end("no-id", 40),
        ])
        .await;

        assert!(data.interactions.is_empty());
        assert!(data.longest_interaction.is_none());
        assert_eq!(data.all_events.len(), 5);
    }

    #[tokio::test]
    async fn test_longest_interaction() {
        let data = interactions_for(vec![
            start("a", 1, "pointerdown", 0, 10.0),
            start("b", 2, "click", 50, 10.0),
            end("a", 20),
            end("b", 150),
        ])
        .await;

        assert_eq!(data.longest_interaction.as_ref().unwrap().interaction_id, 2);
    }

    #[test]
    fn test_same_end_keeps_earliest() {
        let result = remove_nested_interactions(&[
            fake(0, 10, 1),
            fake(2, 10, 2),
            fake(4, 10, 3),
            fake(6, 10, 4),
        ]);
        assert_eq!(ids(&result), vec![1]);
    }

    #[test]
    fn test_overlap_with_different_end_kept() {
        let result = remove_nested_interactions(&[
            fake(0, 10, 1),
            fake(2, 10, 2),
            fake(4, 10, 3),
            fake(6, 20, 4),
        ]);
        assert_eq!(ids(&result), vec![1, 4]);
    }

    #[test]
    fn test_nested_inside_other_parent_removed() {
        let result = remove_nested_interactions(&[
            fake(0, 5, 1),
            fake(2, 20, 2),
            fake(10, 20, 3),
            fake(2, 5, 4),
        ]);
        assert_eq!(ids(&result), vec![1, 2]);
    }

    #[test]
    fn test_disjoint_order_preserved() {
        let result = remove_nested_interactions(&[
            fake(0, 5, 1),
            fake(10, 20, 2),
            fake(30, 40, 3),
        ]);
        assert_eq!(ids(&result), vec![1, 2, 3]);
    }
}
