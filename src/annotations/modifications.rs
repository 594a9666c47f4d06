//! Saving and restoring user annotations for one trace.
//!
//! The document stores entities by key string only, so it stays valid across
//! reloads of the same trace file. Keys that no longer resolve are skipped
//! when a document is applied.

use super::breadcrumbs::{Breadcrumb, Breadcrumbs};
use super::entries_filter::EntriesFilter;
use super::keys::EventKeyMap;
use crate::handlers::renderer::RendererData;
use crate::parser::entity::TraceEntity;
use crate::parser::timing::TraceWindow;
use crate::utils::error::AnnotationError;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesModifications {
    pub hidden_entries: Vec<String>,
    pub expandable_entries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modifications {
    pub entries_modifications: EntriesModifications,
    pub initial_breadcrumb: Breadcrumb,
}

/// Outcome of applying a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped: usize,
}

pub struct ModificationsManager {
    keys: EventKeyMap,
    filter: EntriesFilter,
    breadcrumbs: Breadcrumbs,
}

impl ModificationsManager {
    pub fn new(keys: EventKeyMap, renderer: Arc<RendererData>, trace_window: TraceWindow) -> Self {
        Self {
            keys,
            filter: EntriesFilter::new(renderer),
            breadcrumbs: Breadcrumbs::new(trace_window),
        }
    }

    pub fn keys(&self) -> &EventKeyMap {
        &self.keys
    }

    pub fn filter(&self) -> &EntriesFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut EntriesFilter {
        &mut self.filter
    }

    pub fn breadcrumbs(&self) -> &Breadcrumbs {
        &self.breadcrumbs
    }

    pub fn breadcrumbs_mut(&mut self) -> &mut Breadcrumbs {
        &mut self.breadcrumbs
    }

    /// Current state as a serializable document
    pub fn to_modifications(&self) -> Modifications {
        let keys_of = |entities: Vec<TraceEntity>| -> Vec<String> {
            entities
                .iter()
                .filter_map(|e| self.keys.key_for_event(e))
                .map(|k| k.to_string())
                .collect()
        };

        Modifications {
            entries_modifications: EntriesModifications {
                hidden_entries: keys_of(self.filter.invisible_entries()),
                expandable_entries: keys_of(self.filter.expandable_entries()),
            },
            initial_breadcrumb: self.breadcrumbs.initial_breadcrumb(),
        }
    }

    /// Replace the current state with `modifications`
    ///
    /// **Public** - used after loading a saved document
    ///
    /// Malformed or unresolvable keys are counted as skipped; they never fail
    /// the whole document.
    pub fn apply_modifications(&mut self, modifications: &Modifications) -> ApplyReport {
        let mut report = ApplyReport::default();
        let entries = &modifications.entries_modifications;
        let hidden = self.resolve_all(&entries.hidden_entries, &mut report);
        let expandable = self.resolve_all(&entries.expandable_entries, &mut report);

        self.filter.set_hidden_and_expandable(&hidden, &expandable);
        self.breadcrumbs = Breadcrumbs::from_initial(&modifications.initial_breadcrumb);

        if report.skipped > 0 {
            warn!("Skipped {} annotation keys that do not resolve", report.skipped);
        }
        debug!("Applied {} annotation keys", report.applied);
        report
    }

    fn resolve_all(&self, keys: &[String], report: &mut ApplyReport) -> Vec<TraceEntity> {
        keys.iter()
            .filter_map(|key| match self.keys.event_for_key_str(key) {
                Ok(Some(entity)) => {
                    report.applied += 1;
                    Some(entity)
                }
                Ok(None) | Err(_) => {
                    report.skipped += 1;
                    None
                }
            })
            .collect()
    }
}

/// Read a modifications document
///
/// # Errors
/// * `AnnotationError::IoError` - file cannot be read
/// * `AnnotationError::JsonError` - contents are not a valid document
pub fn load_modifications(path: impl AsRef<Path>) -> Result<Modifications, AnnotationError> {
    let contents = fs::read_to_string(path.as_ref())?;
    let modifications = serde_json::from_str(&contents)?;
    info!("Loaded annotations from {}", path.as_ref().display());
    Ok(modifications)
}

/// Write a modifications document as pretty-printed JSON
pub fn save_modifications(
    modifications: &Modifications,
    path: impl AsRef<Path>,
) -> Result<(), AnnotationError> {
    let json = serde_json::to_string_pretty(modifications)?;
    fs::write(path.as_ref(), json)?;
    info!("Annotations written to {}", path.as_ref().display());
    Ok(())
}
