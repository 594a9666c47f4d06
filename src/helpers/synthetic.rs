//! Pairing of split begin/end records into synthetic events.
//!
//! Records are grouped by an identity key. Within a group the first
//! unmatched begin pairs with the first subsequent end, in arrival order.

use crate::parser::entity::SyntheticEvent;
use crate::parser::event::RawEvent;
use crate::parser::timing::MicroSeconds;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Identity under which begin and end records are matched
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PairingKey {
    /// Async id, scoped by category and name
    Scoped {
        id: String,
        cat: String,
        name: String,
    },
    /// No id: records are matched by name alone
    Named(String),
}

impl PairingKey {
    fn for_event(event: &RawEvent) -> Self {
        match event.pairing_id() {
            Some(id) => Self::Scoped {
                id: id.to_string(),
                cat: event.cat.clone(),
                name: event.name.clone(),
            },
            None => Self::Named(event.name.clone()),
        }
    }
}

/// Merge begin/end pairs into synthetic events sorted by start time
///
/// **Public** - shared by the user timing, interaction and network handlers
///
/// # Arguments
/// * `events` - Candidate records in trace order; records that are neither
///   begin- nor end-class are ignored
/// * `trace_end` - End bound used for begins that never see an end
///
/// # Returns
/// One synthetic event per begin record, sorted by `ts` (stable)
pub fn create_matched_sorted_synthetic_events(
    events: &[Arc<RawEvent>],
    trace_end: MicroSeconds,
) -> Vec<Arc<SyntheticEvent>> {
    let mut pairs: Vec<(Arc<RawEvent>, Option<Arc<RawEvent>>)> = Vec::new();
    let mut open: HashMap<PairingKey, VecDeque<usize>> = HashMap::new();
    let mut dropped_ends = 0usize;

    for event in events {
        if event.ph.is_begin_class() {
            open.entry(PairingKey::for_event(event))
                .or_default()
                .push_back(pairs.len());
            pairs.push((event.clone(), None));
        } else if event.ph.is_end_class() {
            let slot = open
                .get_mut(&PairingKey::for_event(event))
                .and_then(VecDeque::pop_front);
            match slot {
                Some(index) => pairs[index].1 = Some(event.clone()),
                None => dropped_ends += 1,
            }
        }
    }

    if dropped_ends > 0 {
        debug!("Dropped {} end records with no open begin", dropped_ends);
    }

    let mut synthetic: Vec<Arc<SyntheticEvent>> = pairs
        .into_iter()
        .map(|(begin, end)| Arc::new(SyntheticEvent::from_pair(begin, end, trace_end)))
        .collect();
    synthetic.sort_by_key(|e| e.ts);
    synthetic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::event::Phase;

    fn record(name: &str, ph: Phase, ts: i64, id: Option<&str>) -> Arc<RawEvent> {
        let mut event = RawEvent::new(name, ph, ts).with_cat("blink.user_timing");
        if let Some(id) = id {
            event = event.with_id(id);
        }
        Arc::new(event)
    }

    #[test]
    fn test_matched_pairs_sorted_by_ts() {
        let events = vec![
            record("b", Phase::AsyncBegin, 50, Some("2")),
            record("a", Phase::AsyncBegin, 10, Some("1")),
            record("a", Phase::AsyncEnd, 30, Some("1")),
            record("b", Phase::AsyncEnd, 90, Some("2")),
        ];

        let synthetic = create_matched_sorted_synthetic_events(&events, MicroSeconds(1000));

        assert_eq!(synthetic.len(), 2);
        assert_eq!(synthetic[0].name, "a");
        assert_eq!(synthetic[0].dur, MicroSeconds(20));
        assert_eq!(synthetic[1].name, "b");
        assert_eq!(synthetic[1].dur, MicroSeconds(40));
    }

    #[test]
    fn test_unmatched_begin_runs_to_trace_end() {
        let events = vec![record("open", Phase::AsyncBegin, 100, Some("x"))];
        let synthetic = create_matched_sorted_synthetic_events(&events, MicroSeconds(400));

        assert_eq!(synthetic.len(), 1);
        assert_eq!(synthetic[0].dur, MicroSeconds(300));
        assert!(synthetic[0].end_event.is_none());
    }

    #[test]
    fn test_unmatched_end_dropped() {
        let events = vec![record("lonely", Phase::AsyncEnd, 5, Some("z"))];
        assert!(create_matched_sorted_synthetic_events(&events, MicroSeconds(10)).is_empty());
    }

    #[test]
    fn test_fifo_within_key_and_name_fallback() {
        let events = vec![
            record("m", Phase::Begin, 0, None),
            record("m", Phase::Begin, 5, None),
            record("m", Phase::End, 7, None),
            record("m", Phase::End, 9, None),
        ];
        let synthetic = create_matched_sorted_synthetic_events(&events, MicroSeconds(100));

        // First begin takes the first end
        assert_eq!(synthetic[0].dur, MicroSeconds(7));
        assert_eq!(synthetic[1].dur, MicroSeconds(4));
    }

    #[test]
    fn test_same_id_different_name_not_paired() {
        let events = vec![
            record("a", Phase::AsyncBegin, 0, Some("1")),
            record("b", Phase::AsyncEnd, 5, Some("1")),
        ];
        let synthetic = create_matched_sorted_synthetic_events(&events, MicroSeconds(50));
        assert_eq!(synthetic.len(), 1);
        assert_eq!(synthetic[0].dur, MicroSeconds(50));
    }
}
