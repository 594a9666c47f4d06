//! User annotations: stable event keys, tree filtering and breadcrumbs.

pub mod breadcrumbs;
pub mod entries_filter;
pub mod keys;
pub mod modifications;

pub use breadcrumbs::{Breadcrumb, Breadcrumbs};
pub use entries_filter::{EntriesFilter, FilterAction};
pub use keys::EventKeyMap;
pub use modifications::{
    load_modifications, save_modifications, ApplyReport, EntriesModifications, Modifications,
    ModificationsManager,
};
