//! Build collapsed stack format from the renderer call trees.
//!
//! Format: "parent;child;grandchild weight"
//!
//! Example: "RunTask;FunctionCall;render 1200"
//! This means: RunTask ran FunctionCall which called render, and 1200 µs
//! were spent in render itself (not in anything it called).

use crate::handlers::renderer::{RendererData, RendererThread};
use crate::helpers::tree::NodeId;
use log::debug;
use std::collections::HashMap;

/// A single collapsed stack entry
///
/// **Public** - used by metrics and the summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsedStack {
    /// Stack trace as semicolon-separated string
    pub stack: String,

    /// Weight (self time in µs of the innermost frame)
    pub weight: u64,
}

impl CollapsedStack {
    /// Create a new collapsed stack
    ///
    /// **Public** - constructor
    pub fn new(stack: String, weight: u64) -> Self {
        Self { stack, weight }
    }

    /// Render as one line of collapsed stack text
    pub fn to_line(&self) -> String {
        format!("{} {}", self.stack, self.weight)
    }
}

/// Build collapsed stacks from renderer trees
///
/// **Public** - main entry point for stack building
///
/// # Arguments
/// * `renderer` - Renderer output with one tree per thread
///
/// # Returns
/// Vector of collapsed stacks, one per unique path, sorted by weight
/// (descending, ties by stack text)
///
/// # Algorithm
/// 1. Walk every tree depth first, keeping the path of names
/// 2. Self time = own duration minus the durations of direct children
/// 3. Aggregate by unique path (sum weights)
pub fn build_collapsed_stacks(renderer: &RendererData) -> Vec<CollapsedStack> {
    debug!(
        "Building collapsed stacks from {} threads",
        renderer.threads.len()
    );

    // Map to aggregate stacks: stack_string -> total_weight
    let mut stack_map: HashMap<String, u64> = HashMap::new();

    for thread in renderer.threads.values() {
        let mut path: Vec<String> = Vec::new();
        for root in thread.tree.roots() {
            walk(thread, *root, &mut path, &mut stack_map);
        }
    }

    let mut stacks: Vec<CollapsedStack> = stack_map
        .into_iter()
        .filter(|(_, weight)| *weight > 0)
        .map(|(stack, weight)| CollapsedStack::new(stack, weight))
        .collect();

    stacks.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.stack.cmp(&b.stack)));

    debug!("Built {} unique collapsed stacks", stacks.len());

    stacks
}

/// **Private** - depth-first accumulation of self time per path
fn walk(
    thread: &RendererThread,
    node_id: NodeId,
    path: &mut Vec<String>,
    stack_map: &mut HashMap<String, u64>,
) {
    let Some(node) = thread.tree.node(node_id) else {
        return;
    };
    let Some(entity) = thread.entity(node) else {
        return;
    };

    // Frame names may not contain the separator
    path.push(entity.name().replace(';', ":"));

    let children_time: i64 = thread
        .tree
        .children(node_id)
        .filter_map(|child| thread.entity(child))
        .map(|child| child.dur().value())
        .sum();
    let self_time = (entity.dur().value() - children_time).max(0) as u64;
    *stack_map.entry(path.join(";")).or_insert(0) += self_time;

    for child in &node.children {
        walk(thread, *child, path, stack_map);
    }
    path.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::renderer::RendererHandler;
    use crate::handlers::samples::SamplesData;
    use crate::handlers::test_support::{meta_output, run_handler, sequenced};
    use crate::handlers::{HandlerName, HandlerOutput};
    use crate::parser::event::{Phase, RawEvent};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    async fn renderer_for(events: Vec<RawEvent>) -> Arc<RendererData> {
        let samples = (
            HandlerName::Samples,
            HandlerOutput::Samples(Arc::new(SamplesData::default())),
        );
        match run_handler(
            &mut RendererHandler::new(),
            &sequenced(events),
            vec![meta_output(0, 1000), samples],
        )
        .await
        {
            HandlerOutput::Renderer(data) => data,
            other => panic!("unexpected output {:?}", other.name()),
        }
    }

    #[test]
    fn test_collapsed_stack_to_line() {
        let stack = CollapsedStack::new("RunTask;Layout".to_string(), 1000);
        assert_eq!(stack.to_line(), "RunTask;Layout 1000");
    }

    #[tokio::test]
    async fn test_self_time_per_path() {
        let renderer = renderer_for(vec![
            RawEvent::new("RunTask", Phase::Complete, 0).with_dur(100),
            RawEvent::new("Layout", Phase::Complete, 10).with_dur(30),
            RawEvent::new("RunTask", Phase::Complete, 200).with_dur(50),
            RawEvent::new("Layout", Phase::Complete, 210).with_dur(20),
        ])
        .await;

        let stacks = build_collapsed_stacks(&renderer);
        assert_eq!(
            stacks,
            vec![
                CollapsedStack::new("RunTask".to_string(), 100),
                CollapsedStack::new("RunTask;Layout".to_string(), 50),
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_self_time_dropped() {
        let renderer = renderer_for(vec![
            RawEvent::new("RunTask", Phase::Complete, 0).with_dur(10),
            RawEvent::new("Paint", Phase::Complete, 0).with_dur(10),
        ])
        .await;

        let stacks = build_collapsed_stacks(&renderer);
        assert_eq!(stacks, vec![CollapsedStack::new("RunTask;Paint".to_string(), 10)]);
    }
}
