//! Algorithms shared by several handlers.
//!
//! - `synthetic`: pairing of split begin/end records
//! - `tree`: call tree reconstruction from interval lists
//! - `initiator_graph`: causal chain traversal for a selected entity

pub mod initiator_graph;
pub mod synthetic;
pub mod tree;

pub use initiator_graph::{initiator_pairs_for_entity, InitiatorPair};
pub use synthetic::create_matched_sorted_synthetic_events;
pub use tree::{build_entry_tree, EntryNode, EntryTree, NodeId, TimeSpan};
