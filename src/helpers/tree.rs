//! Call tree reconstruction from flat interval lists.
//!
//! Input is one thread's entries in start-time order. A single stack of open
//! entries is kept; an entry whose range has ended by the time the next one
//! starts is popped, and the next entry becomes a child of whatever is left
//! on top. Each entry is pushed and popped at most once.

use crate::parser::entity::{ProfileCall, TraceEntity};
use crate::parser::timing::MicroSeconds;
use log::debug;
use std::sync::Arc;

/// Anything with a start and an end on the trace clock
pub trait TimeSpan {
    fn start(&self) -> MicroSeconds;
    fn end(&self) -> MicroSeconds;
}

impl TimeSpan for TraceEntity {
    fn start(&self) -> MicroSeconds {
        self.ts()
    }

    fn end(&self) -> MicroSeconds {
        self.end_ts()
    }
}

impl TimeSpan for ProfileCall {
    fn start(&self) -> MicroSeconds {
        self.ts
    }

    fn end(&self) -> MicroSeconds {
        self.ts + self.dur
    }
}

impl<T: TimeSpan> TimeSpan for Arc<T> {
    fn start(&self) -> MicroSeconds {
        self.as_ref().start()
    }

    fn end(&self) -> MicroSeconds {
        self.as_ref().end()
    }
}

/// Index of a node inside its [`EntryTree`]
pub type NodeId = usize;

/// One tree node wrapping one input entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryNode {
    pub id: NodeId,
    /// Position of the wrapped entry in the builder's input
    pub entry_index: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub depth: usize,
}

/// Forest of entry nodes built from one thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryTree {
    nodes: Vec<EntryNode>,
    roots: Vec<NodeId>,
    max_depth: usize,
}

impl EntryTree {
    pub fn node(&self, id: NodeId) -> Option<&EntryNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[EntryNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn parent(&self, id: NodeId) -> Option<&EntryNode> {
        self.node(id)?.parent.and_then(|p| self.node(p))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &EntryNode> {
        self.node(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |c| self.node(*c))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// All nodes below `id`, depth first, pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.node(id) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(node) = self.node(next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }
}

/// Build an entry tree from time-ordered entries
///
/// **Public** - used by the samples and renderer handlers
///
/// # Arguments
/// * `entries` - One thread's entries sorted by start time
///
/// # Returns
/// A tree with one node per entry; node `i` wraps `entries[i]`.
/// Mis-ordered or overlapping input still yields a tree: an entry that
/// overruns its parent is attached to it anyway.
pub fn build_entry_tree<T: TimeSpan>(entries: &[T]) -> EntryTree {
    let mut tree = EntryTree {
        nodes: Vec::with_capacity(entries.len()),
        ..Default::default()
    };
    let mut open: Vec<NodeId> = Vec::new();
    let mut overruns = 0usize;

    for (index, entry) in entries.iter().enumerate() {
        let start = entry.start();

        while let Some(&top) = open.last() {
            if entries[tree.nodes[top].entry_index].end() <= start {
                open.pop();
            } else {
                break;
            }
        }

        let id = tree.nodes.len();
        let parent = open.last().copied();
        let depth = open.len();

        match parent {
            Some(parent_id) => {
                if entry.end() > entries[tree.nodes[parent_id].entry_index].end() {
                    overruns += 1;
                }
                tree.nodes[parent_id].children.push(id);
            }
            None => tree.roots.push(id),
        }

        tree.nodes.push(EntryNode {
            id,
            entry_index: index,
            parent,
            children: Vec::new(),
            depth,
        });
        tree.max_depth = tree.max_depth.max(depth);

        // Instants never contain anything
        if entry.end() > start {
            open.push(id);
        }
    }

    if overruns > 0 {
        debug!("{} entries overran their parent's range", overruns);
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Span(i64, i64);

    impl TimeSpan for Span {
        fn start(&self) -> MicroSeconds {
            MicroSeconds(self.0)
        }
        fn end(&self) -> MicroSeconds {
            MicroSeconds(self.0 + self.1)
        }
    }

    #[test]
    fn test_nesting_and_siblings() {
        // [0..100] contains [10..40] and [50..90]; [20..30] nests in [10..40]
        let entries = vec![Span(0, 100), Span(10, 30), Span(20, 10), Span(50, 40), Span(120, 5)];
        let tree = build_entry_tree(&entries);

        assert_eq!(tree.roots(), &[0, 4]);
        assert_eq!(tree.node(0).unwrap().children, vec![1, 3]);
        assert_eq!(tree.node(1).unwrap().children, vec![2]);
        assert_eq!(tree.node(2).unwrap().depth, 2);
        assert_eq!(tree.parent(3).unwrap().id, 0);
        assert_eq!(tree.max_depth(), 2);
    }

    #[test]
    fn test_children_within_parent_range() {
        let entries = vec![Span(0, 50), Span(0, 20), Span(20, 30), Span(25, 5)];
        let tree = build_entry_tree(&entries);

        for node in tree.nodes() {
            if let Some(parent) = node.parent {
                let p = &entries[tree.node(parent).unwrap().entry_index];
                let c = &entries[node.entry_index];
                assert!(c.start() >= p.start() && c.end() <= p.end());
            }
        }
    }

    #[test]
    fn test_instants_are_leaves() {
        let entries = vec![Span(0, 10), Span(5, 0), Span(6, 2)];
        let tree = build_entry_tree(&entries);

        assert!(tree.node(1).unwrap().children.is_empty());
        assert_eq!(tree.node(2).unwrap().parent, Some(0));
    }

    #[test]
    fn test_descendants_preorder() {
        let entries = vec![Span(0, 100), Span(10, 30), Span(20, 10), Span(50, 40)];
        let tree = build_entry_tree(&entries);
        assert_eq!(tree.descendants(0), vec![1, 2, 3]);
        assert!(tree.descendants(99).is_empty());
    }

    #[test]
    fn test_misordered_input_is_best_effort() {
        let entries = vec![Span(50, 10), Span(0, 100), Span(70, 5)];
        let tree = build_entry_tree(&entries);
        assert_eq!(tree.len(), 3);
    }
}
