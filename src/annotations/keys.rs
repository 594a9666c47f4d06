//! Bidirectional mapping between entities and their [`EventKey`]s.
//!
//! The map is scoped to one loaded trace: raw keys resolve against the
//! trace's event list, synthetic and profile call keys against the entities
//! the handlers produced for it. An entity from another trace (or a clone
//! allocated outside the pipeline) has no key here even if its numbers match.

use crate::parser::entity::{EventKey, ProfileCall, SyntheticEvent, TraceEntity};
use crate::parser::event::RawEvent;
use crate::parser::trace_file::Trace;
use crate::processor::TraceParseData;
use crate::utils::error::AnnotationError;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct EventKeyMap {
    raw: Vec<Arc<RawEvent>>,
    synthetic: HashMap<usize, Arc<SyntheticEvent>>,
    profile_calls: HashMap<EventKey, Arc<ProfileCall>>,
}

impl EventKeyMap {
    /// Register every keyable entity of one parsed trace
    pub fn new(trace: &Trace, data: &TraceParseData) -> Self {
        let mut map = Self {
            raw: trace.events().to_vec(),
            ..Default::default()
        };

        if let Some(timings) = &data.user_timings {
            for event in timings
                .performance_measures
                .iter()
                .chain(timings.console_timings.iter())
            {
                map.register_synthetic(event.clone());
            }
        }
        if let Some(interactions) = &data.user_interactions {
            for interaction in &interactions.interactions {
                map.register_synthetic(interaction.synthetic.clone());
            }
        }
        if let Some(network) = &data.network {
            for request in &network.requests {
                map.register_synthetic(request.synthetic.clone());
            }
        }
        if let Some(samples) = &data.samples {
            for thread in samples.threads.values() {
                for call in &thread.calls {
                    map.register_profile_call(call.clone());
                }
            }
        }

        debug!(
            "Key map: {} raw, {} synthetic, {} profile calls",
            map.raw.len(),
            map.synthetic.len(),
            map.profile_calls.len()
        );
        map
    }

    pub fn register_synthetic(&mut self, event: Arc<SyntheticEvent>) {
        self.synthetic.insert(event.raw_source.seq, event);
    }

    pub fn register_profile_call(&mut self, call: Arc<ProfileCall>) {
        let key = TraceEntity::ProfileCall(call.clone()).key();
        if self.profile_calls.insert(key, call).is_some() {
            debug!("Profile call key {} registered twice; keeping the latest", key);
        }
    }

    /// Key of `entity`, if it belongs to this trace
    pub fn key_for_event(&self, entity: &TraceEntity) -> Option<EventKey> {
        let key = entity.key();
        let known = self.event_for_key(&key)?;
        (known == *entity).then_some(key)
    }

    /// The entity `key` names, if it resolves in this trace
    pub fn event_for_key(&self, key: &EventKey) -> Option<TraceEntity> {
        match key {
            EventKey::Raw(seq) => self.raw.get(*seq).cloned().map(TraceEntity::Raw),
            EventKey::Synthetic(seq) => self.synthetic.get(seq).cloned().map(TraceEntity::Synthetic),
            EventKey::ProfileCall { .. } => self
                .profile_calls
                .get(key)
                .cloned()
                .map(TraceEntity::ProfileCall),
        }
    }

    /// Resolve a serialized key
    ///
    /// # Errors
    /// * `AnnotationError::InvalidKey` - `key` is not a well-formed key string
    pub fn event_for_key_str(&self, key: &str) -> Result<Option<TraceEntity>, AnnotationError> {
        let key: EventKey = key.parse()?;
        Ok(self.event_for_key(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::event::Phase;
    use crate::parser::timing::MicroSeconds;

    fn trace() -> Trace {
        Trace::from_events(vec![
            RawEvent::new("measure", Phase::AsyncBegin, 10).with_id("1"),
            RawEvent::new("measure", Phase::AsyncEnd, 30).with_id("1"),
            RawEvent::new("RunTask", Phase::Complete, 20).with_dur(5),
        ])
    }

    #[test]
    fn test_raw_and_synthetic_round_trip() {
        let trace = trace();
        let mut map = EventKeyMap::new(&trace, &TraceParseData::default());
        let synthetic = Arc::new(SyntheticEvent::from_pair(
            trace.events()[0].clone(),
            Some(trace.events()[2].clone()),
            MicroSeconds(100),
        ));
        map.register_synthetic(synthetic.clone());

        for entity in [
            TraceEntity::Raw(trace.events()[1].clone()),
            TraceEntity::Synthetic(synthetic),
        ] {
            let key = map.key_for_event(&entity).unwrap();
            assert_eq!(map.event_for_key(&key), Some(entity));
        }
    }

    #[test]
    fn test_profile_call_round_trip() {
        let mut map = EventKeyMap::default();
        let call = Arc::new(ProfileCall {
            pid: 1,
            tid: 2,
            sample_index: 3,
            node_id: 4,
            function_name: "f".to_string(),
            url: String::new(),
            ts: MicroSeconds(0),
            dur: MicroSeconds(1),
        });
        map.register_profile_call(call.clone());

        let entity = TraceEntity::ProfileCall(call);
        let key = map.key_for_event(&entity).unwrap();
        assert_eq!(key.to_string(), "p-1-2-3-4");
        assert_eq!(map.event_for_key_str("p-1-2-3-4").unwrap(), Some(entity));
    }

    #[test]
    fn test_foreign_entity_has_no_key() {
        let map = EventKeyMap::new(&trace(), &TraceParseData::default());
        let other = trace();
        assert_eq!(map.key_for_event(&TraceEntity::Raw(other.events()[0].clone())), None);
    }

    #[test]
    fn test_unresolved_and_malformed_keys() {
        let map = EventKeyMap::new(&trace(), &TraceParseData::default());
        assert_eq!(map.event_for_key(&EventKey::Raw(99)), None);
        assert_eq!(map.event_for_key_str("s-0").unwrap(), None);
        assert!(matches!(
            map.event_for_key_str("q-1"),
            Err(AnnotationError::InvalidKey(_))
        ));
    }
}
