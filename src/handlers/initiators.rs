//! Causal links between renderer records.
//!
//! | Initiator                    | Initiated          | Shared id |
//! |------------------------------|--------------------|-----------|
//! | `TimerInstall`               | `TimerFire`        | timer id  |
//! | `RequestAnimationFrame`      | `FireAnimationFrame` | callback id |
//! | `RequestIdleCallback`        | `FireIdleCallback` | callback id |
//! | `ScheduleStyleRecalculation` | `UpdateLayoutTree` | frame     |
//! | `InvalidateLayout`           | `Layout`           | frame     |
//!
//! Timers may fire repeatedly, so one install initiates every fire. The
//! frame-keyed links are consumed: a schedule or invalidation initiates only
//! the next recalc or layout on that frame.

use super::{FinalizeContext, Handler, HandlerName, HandlerOutput, Lifecycle};
use crate::parser::entity::{EventKey, TraceEntity};
use crate::parser::event::{EventKind, InitiatorLink, InitiatorRole, RawEvent};
use crate::utils::error::HandlerError;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct InitiatorsData {
    event_to_initiator: HashMap<EventKey, Arc<RawEvent>>,
    initiator_to_events: HashMap<EventKey, Vec<Arc<RawEvent>>>,
}

impl InitiatorsData {
    /// The record that caused `entity`, if any
    pub fn initiator_of(&self, entity: &TraceEntity) -> Option<TraceEntity> {
        self.event_to_initiator
            .get(&entity.key())
            .map(|initiator| TraceEntity::Raw(initiator.clone()))
    }

    /// Records directly caused by `entity`, in trace order
    pub fn initiated_by(&self, entity: &TraceEntity) -> Vec<TraceEntity> {
        self.initiator_to_events
            .get(&entity.key())
            .map(|events| events.iter().cloned().map(TraceEntity::Raw).collect())
            .unwrap_or_default()
    }

    pub fn link_count(&self) -> usize {
        self.event_to_initiator.len()
    }
}

pub struct InitiatorsHandler {
    lifecycle: Lifecycle,
    /// Latest unconsumed initiator per link family and shared id
    pending: HashMap<(InitiatorLink, String), Arc<RawEvent>>,
    links: Vec<(Arc<RawEvent>, Arc<RawEvent>)>,
    output: Arc<InitiatorsData>,
}

impl InitiatorsHandler {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(HandlerName::Initiators),
            pending: HashMap::new(),
            links: Vec::new(),
            output: Arc::default(),
        }
    }
}

impl Default for InitiatorsHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for InitiatorsHandler {
    fn name(&self) -> HandlerName {
        HandlerName::Initiators
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn initialize(&mut self) {
        self.lifecycle.initialize();
    }

    fn handle_event(&mut self, event: &Arc<RawEvent>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;
        let EventKind::Initiator(signal) = event.kind() else {
            return Ok(());
        };

        let slot = (signal.link, signal.key);
        match signal.role {
            InitiatorRole::Initiator => {
                self.pending.insert(slot, event.clone());
            }
            InitiatorRole::Initiated => {
                let initiator = match signal.link {
                    InitiatorLink::StyleRecalc | InitiatorLink::Layout => self.pending.remove(&slot),
                    _ => self.pending.get(&slot).cloned(),
                };
                if let Some(initiator) = initiator {
                    self.links.push((event.clone(), initiator));
                }
            }
        }
        Ok(())
    }

    async fn finalize(&mut self, _ctx: &FinalizeContext<'_>) -> Result<(), HandlerError> {
        self.lifecycle.ensure_accepting()?;

        let mut data = InitiatorsData::default();
        for (event, initiator) in std::mem::take(&mut self.links) {
            data.initiator_to_events
                .entry(EventKey::Raw(initiator.seq))
                .or_default()
                .push(event.clone());
            data.event_to_initiator
                .insert(EventKey::Raw(event.seq), initiator);
        }
        self.pending.clear();
        debug!("{} initiator links", data.link_count());

        self.output = Arc::new(data);
        self.lifecycle.finish();
        Ok(())
    }

    fn data(&self) -> Result<HandlerOutput, HandlerError> {
        self.lifecycle.ensure_finalized()?;
        Ok(HandlerOutput::Initiators(self.output.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{run_handler, sequenced};
    use crate::parser::event::Phase;
    use serde_json::json;

    async fn initiators_for(events: &[Arc<RawEvent>]) -> Arc<InitiatorsData> {
        let mut handler = InitiatorsHandler::new();
        match run_handler(&mut handler, events, vec![]).await {
            HandlerOutput::Initiators(data) => data,
            other => panic!("unexpected output {:?}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_timer_install_initiates_every_fire() {
        let events = sequenced(vec![
            RawEvent::new("TimerInstall", Phase::Instant, 10).with_args(json!({"data": {"timerId": 4}})),
            RawEvent::new("TimerFire", Phase::Complete, 50)
                .with_dur(5)
                .with_args(json!({"data": {"timerId": 4}})),
            RawEvent::new("TimerFire", Phase::Complete, 90)
                .with_dur(5)
                .with_args(json!({"data": {"timerId": 4}})),
        ]);
        let data = initiators_for(&events).await;

        let install = TraceEntity::Raw(events[0].clone());
        let fires = data.initiated_by(&install);
        assert_eq!(fires.len(), 2);
        assert_eq!(
            data.initiator_of(&TraceEntity::Raw(events[2].clone())),
            Some(install)
        );
    }

    #[tokio::test]
    async fn test_layout_invalidation_consumed_by_next_layout() {
        let events = sequenced(vec![
            RawEvent::new("InvalidateLayout", Phase::Instant, 10).with_args(json!({"data": {"frame": "F"}})),
            RawEvent::new("Layout", Phase::Complete, 20)
                .with_dur(5)
                .with_args(json!({"beginData": {"frame": "F"}})),
            RawEvent::new("Layout", Phase::Complete, 40)
                .with_dur(5)
                .with_args(json!({"beginData": {"frame": "F"}})),
        ]);
        let data = initiators_for(&events).await;

        assert!(data.initiator_of(&TraceEntity::Raw(events[1].clone())).is_some());
        assert!(data.initiator_of(&TraceEntity::Raw(events[2].clone())).is_none());
        assert_eq!(data.link_count(), 1);
    }

    #[tokio::test]
    async fn test_fire_without_request_has_no_initiator() {
        let events = sequenced(vec![RawEvent::new("FireAnimationFrame", Phase::Complete, 5)
            .with_dur(1)
            .with_args(json!({"data": {"id": 1}}))]);
        let data = initiators_for(&events).await;
        assert_eq!(data.link_count(), 0);
    }
}
