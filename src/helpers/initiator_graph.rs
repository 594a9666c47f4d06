//! Walk causal and structural links around one selected entity.

use crate::handlers::initiators::InitiatorsData;
use crate::handlers::renderer::RendererData;
use crate::parser::entity::{EventKey, TraceEntity};
use std::collections::{HashSet, VecDeque};

/// One causal edge: `initiator` caused `event`
#[derive(Debug, Clone, PartialEq)]
pub struct InitiatorPair {
    pub event: TraceEntity,
    pub initiator: TraceEntity,
}

/// Every initiator edge relevant to `selected`
///
/// **Public** - used to draw the initiator arrows for a selection
///
/// # Arguments
/// * `selected` - Entity the chain is computed for
/// * `renderer` - Call trees, used when an entity has no direct initiator
/// * `initiators` - Event/initiator maps
///
/// # Returns
/// Ancestor edges first (closest to `selected` first), then descendant
/// edges in breadth-first order. The two passes are not de-duplicated
/// against each other.
pub fn initiator_pairs_for_entity(
    selected: &TraceEntity,
    renderer: &RendererData,
    initiators: &InitiatorsData,
) -> Vec<InitiatorPair> {
    let mut pairs = ancestor_pairs(selected, renderer, initiators);
    pairs.extend(descendant_pairs(selected, renderer, initiators));
    pairs
}

/// **Private** - climb initiators, falling back to tree parents
fn ancestor_pairs(
    selected: &TraceEntity,
    renderer: &RendererData,
    initiators: &InitiatorsData,
) -> Vec<InitiatorPair> {
    let mut pairs = Vec::new();
    let mut visited: HashSet<EventKey> = HashSet::new();
    let mut current = selected.clone();

    while visited.insert(current.key()) {
        if let Some(initiator) = initiators.initiator_of(&current) {
            pairs.push(InitiatorPair {
                event: current,
                initiator: initiator.clone(),
            });
            current = initiator;
        } else if let Some(parent) = renderer.parent_of(&current) {
            current = parent;
        } else {
            break;
        }
    }

    pairs
}

/// **Private** - breadth-first over initiated events
///
/// An entity that initiated nothing itself is searched through its tree
/// children instead.
fn descendant_pairs(
    selected: &TraceEntity,
    renderer: &RendererData,
    initiators: &InitiatorsData,
) -> Vec<InitiatorPair> {
    let mut pairs = Vec::new();
    let mut visited: HashSet<EventKey> = HashSet::new();
    let mut queue = VecDeque::from([selected.clone()]);

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.key()) {
            continue;
        }

        let initiated = initiators.initiated_by(&current);
        if initiated.is_empty() {
            queue.extend(renderer.children_of(&current));
            continue;
        }
        for event in initiated {
            pairs.push(InitiatorPair {
                event: event.clone(),
                initiator: current.clone(),
            });
            queue.push_back(event);
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::initiators::InitiatorsHandler;
    use crate::handlers::renderer::RendererHandler;
    use crate::handlers::samples::SamplesData;
    use crate::handlers::test_support::{meta_output, run_handler, sequenced};
    use crate::handlers::{HandlerName, HandlerOutput};
    use crate::parser::event::{Phase, RawEvent};
    use serde_json::json;
    use std::sync::Arc;

    async fn build(events: &[Arc<RawEvent>]) -> (Arc<RendererData>, Arc<InitiatorsData>) {
        let samples = (
            HandlerName::Samples,
            HandlerOutput::Samples(Arc::new(SamplesData::default())),
        );
        let renderer = match run_handler(
            &mut RendererHandler::new(),
            events,
            vec![meta_output(0, 1000), samples],
        )
        .await
        {
            HandlerOutput::Renderer(data) => data,
            other => panic!("unexpected output {:?}", other.name()),
        };
        let initiators = match run_handler(&mut InitiatorsHandler::new(), events, vec![]).await {
            HandlerOutput::Initiators(data) => data,
            other => panic!("unexpected output {:?}", other.name()),
        };
        (renderer, initiators)
    }

    fn timer(name: &str, ts: i64, dur: i64) -> RawEvent {
        RawEvent::new(name, Phase::Complete, ts)
            .with_dur(dur)
            .with_thread(1, 1)
            .with_args(json!({"data": {"timerId": 1}}))
    }

    #[tokio::test]
    async fn test_selection_inside_fire_reaches_install() {
        let events = sequenced(vec![
            RawEvent::new("RunTask", Phase::Complete, 0).with_dur(50).with_thread(1, 1),
            timer("TimerInstall", 10, 1),
            RawEvent::new("RunTask", Phase::Complete, 100).with_dur(50).with_thread(1, 1),
            timer("TimerFire", 110, 30),
            RawEvent::new("FunctionCall", Phase::Complete, 115).with_dur(10).with_thread(1, 1),
        ]);
        let (renderer, initiators) = build(&events).await;

        let selected = TraceEntity::Raw(events[4].clone());
        let pairs = initiator_pairs_for_entity(&selected, &renderer, &initiators);

        assert_eq!(
            pairs,
            vec![InitiatorPair {
                event: TraceEntity::Raw(events[3].clone()),
                initiator: TraceEntity::Raw(events[1].clone()),
            }]
        );
    }

    #[tokio::test]
    async fn test_descendants_found_through_children() {
        let events = sequenced(vec![
            RawEvent::new("RunTask", Phase::Complete, 0).with_dur(50).with_thread(1, 1),
            timer("TimerInstall", 10, 1),
            timer("TimerFire", 100, 10),
            timer("TimerFire", 200, 10),
        ]);
        let (renderer, initiators) = build(&events).await;

        // RunTask installs nothing itself; its child does
        let selected = TraceEntity::Raw(events[0].clone());
        let pairs = initiator_pairs_for_entity(&selected, &renderer, &initiators);

        assert_eq!(pairs.len(), 2);
        assert!(pairs
            .iter()
            .all(|p| p.initiator == TraceEntity::Raw(events[1].clone())));
        assert_eq!(pairs[1].event, TraceEntity::Raw(events[3].clone()));
    }

    #[tokio::test]
    async fn test_unlinked_entity_has_no_pairs() {
        let events = sequenced(vec![
            RawEvent::new("RunTask", Phase::Complete, 0).with_dur(50).with_thread(1, 1),
        ]);
        let (renderer, initiators) = build(&events).await;
        let selected = TraceEntity::Raw(events[0].clone());
        assert!(initiator_pairs_for_entity(&selected, &renderer, &initiators).is_empty());
    }
}
