//! Nested zoom windows over the trace timeline.

use crate::parser::timing::TraceWindow;
use serde::{Deserialize, Serialize};

/// Serialized form: each breadcrumb links to the one zoomed in from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub window: TraceWindow,
    pub child: Option<Box<Breadcrumb>>,
}

/// A chain of windows, each within the previous one
///
/// The first window is the full trace and can never be removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumbs {
    windows: Vec<TraceWindow>,
}

impl Breadcrumbs {
    pub fn new(trace_window: TraceWindow) -> Self {
        Self {
            windows: vec![trace_window],
        }
    }

    /// Rebuild from a serialized chain
    ///
    /// Links that do not lie within their parent end the chain.
    pub fn from_initial(initial: &Breadcrumb) -> Self {
        let mut breadcrumbs = Self::new(initial.window);
        let mut next = initial.child.as_deref();
        while let Some(crumb) = next {
            if !breadcrumbs.add(crumb.window) {
                break;
            }
            next = crumb.child.as_deref();
        }
        breadcrumbs
    }

    /// Zoom into `window`
    ///
    /// # Returns
    /// `false` (and no change) unless `window` lies within the last window
    /// and differs from it
    pub fn add(&mut self, window: TraceWindow) -> bool {
        let last = self.last();
        if window == last || !last.contains_window(&window) {
            return false;
        }
        self.windows.push(window);
        true
    }

    /// Make the breadcrumb at `index` the last one, dropping its descendants
    pub fn activate(&mut self, index: usize) -> bool {
        if index >= self.windows.len() {
            return false;
        }
        self.windows.truncate(index + 1);
        true
    }

    pub fn last(&self) -> TraceWindow {
        // Never empty: `new` seeds the root and `activate` keeps it
        self.windows[self.windows.len() - 1]
    }

    pub fn windows(&self) -> &[TraceWindow] {
        &self.windows
    }

    pub fn initial_breadcrumb(&self) -> Breadcrumb {
        let mut child: Option<Box<Breadcrumb>> = None;
        for window in self.windows.iter().skip(1).rev() {
            child = Some(Box::new(Breadcrumb {
                window: *window,
                child,
            }));
        }
        Breadcrumb {
            window: self.windows[0],
            child,
        }
    }
}
