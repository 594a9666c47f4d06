//! Hiding parts of the call trees.
//!
//! Every action targets one visible entity and hides some of the entries
//! around it. Hidden entries stay in the trees; callers skip them when
//! walking. The entity left in charge of hidden entries (the one a user
//! would click to bring them back) is reported as expandable.

use crate::handlers::renderer::RendererData;
use crate::parser::entity::{EventKey, TraceEntity};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// Hide the entry; its children take its place under its parent
    MergeFunction,
    /// Hide every descendant
    CollapseFunction,
    /// Hide descendants that are calls of the same function
    CollapseRepeatingDescendants,
    /// Reveal every descendant hidden so far
    ResetChildren,
}

#[derive(Debug, Clone)]
pub struct EntriesFilter {
    renderer: Arc<RendererData>,
    /// Insertion ordered; `hidden_set` mirrors it for lookups
    hidden: Vec<EventKey>,
    hidden_set: HashSet<EventKey>,
    expandable: Vec<EventKey>,
}

impl EntriesFilter {
    pub fn new(renderer: Arc<RendererData>) -> Self {
        Self {
            renderer,
            hidden: Vec::new(),
            hidden_set: HashSet::new(),
            expandable: Vec::new(),
        }
    }

    /// Apply `action` to `entity`
    ///
    /// **Public** - entry point for every user filtering action
    ///
    /// # Returns
    /// `true` when the set of hidden entries changed. Entities that are not
    /// in a tree, or are themselves hidden, are left alone.
    pub fn apply_action(&mut self, action: FilterAction, entity: &TraceEntity) -> bool {
        if self.renderer.node_for(entity).is_none() || self.is_entry_hidden(entity) {
            debug!("Ignoring {:?} on {}", action, entity.key());
            return false;
        }

        let changed = match action {
            FilterAction::MergeFunction => {
                let changed = self.hide(entity.key());
                if changed {
                    if let Some(parent) = self.visible_parent(entity) {
                        self.mark_expandable(parent.key());
                    }
                }
                changed
            }
            FilterAction::CollapseFunction => {
                let descendants = self.descendants(entity);
                self.hide_all(entity, descendants)
            }
            FilterAction::CollapseRepeatingDescendants => {
                let repeats = self
                    .descendants(entity)
                    .into_iter()
                    .filter(|d| d.name() == entity.name())
                    .collect();
                self.hide_all(entity, repeats)
            }
            FilterAction::ResetChildren => self.reveal_descendants(entity),
        };

        debug!("{:?} on {} changed: {}", action, entity.key(), changed);
        changed
    }

    pub fn is_entry_hidden(&self, entity: &TraceEntity) -> bool {
        self.hidden_set.contains(&entity.key())
    }

    pub fn is_entry_expandable(&self, entity: &TraceEntity) -> bool {
        self.expandable.contains(&entity.key())
    }

    /// Hidden entries, in the order they were hidden
    pub fn invisible_entries(&self) -> Vec<TraceEntity> {
        self.resolve(&self.hidden)
    }

    pub fn expandable_entries(&self) -> Vec<TraceEntity> {
        self.resolve(&self.expandable)
    }

    /// Replace all state, e.g. from a saved annotations document
    pub fn set_hidden_and_expandable(&mut self, hidden: &[TraceEntity], expandable: &[TraceEntity]) {
        self.reset();
        for entity in hidden {
            if self.renderer.node_for(entity).is_some() {
                self.hide(entity.key());
            }
        }
        for entity in expandable {
            if self.renderer.node_for(entity).is_some() {
                self.mark_expandable(entity.key());
            }
        }
    }

    pub fn reset(&mut self) {
        self.hidden.clear();
        self.hidden_set.clear();
        self.expandable.clear();
    }

    fn resolve(&self, keys: &[EventKey]) -> Vec<TraceEntity> {
        keys.iter()
            .filter_map(|key| self.renderer.entity_for_key(key).cloned())
            .collect()
    }

    fn descendants(&self, entity: &TraceEntity) -> Vec<TraceEntity> {
        let Some((thread, node)) = self.renderer.node_for(entity) else {
            return Vec::new();
        };
        let renderer_thread = &self.renderer.threads[&thread];
        renderer_thread
            .tree
            .descendants(node.id)
            .into_iter()
            .filter_map(|id| renderer_thread.tree.node(id))
            .filter_map(|node| renderer_thread.entity(node).cloned())
            .collect()
    }

    fn visible_parent(&self, entity: &TraceEntity) -> Option<TraceEntity> {
        let mut current = self.renderer.parent_of(entity)?;
        while self.is_entry_hidden(&current) {
            current = self.renderer.parent_of(&current)?;
        }
        Some(current)
    }

    fn hide(&mut self, key: EventKey) -> bool {
        if !self.hidden_set.insert(key) {
            return false;
        }
        self.hidden.push(key);
        // A hidden entry cannot be expanded from
        self.expandable.retain(|k| *k != key);
        true
    }

    fn hide_all(&mut self, owner: &TraceEntity, entities: Vec<TraceEntity>) -> bool {
        let mut changed = false;
        for entity in entities {
            changed |= self.hide(entity.key());
        }
        if changed {
            self.mark_expandable(owner.key());
        }
        changed
    }

    fn mark_expandable(&mut self, key: EventKey) {
        if !self.expandable.contains(&key) {
            self.expandable.push(key);
        }
    }

    fn reveal_descendants(&mut self, entity: &TraceEntity) -> bool {
        let keys: HashSet<EventKey> = self.descendants(entity).iter().map(|d| d.key()).collect();
        let before = self.hidden.len();
        self.hidden.retain(|k| !keys.contains(k));
        self.hidden_set.retain(|k| !keys.contains(k));

        let owner = entity.key();
        self.expandable.retain(|k| *k != owner && !keys.contains(k));
        before != self.hidden.len()
    }
}
