//! # Input Sources
//!
//! Lazy producers of [`WorkItem`](crate::models::WorkItem)s: a directory
//! walk filtered by a path predicate, a spatial-reference filter over any
//! item stream, and a record cursor over an attribute table.

pub mod filters;
pub mod records;
pub mod walker;

pub use filters::{by_data_type, by_extension, filter_by_spatial_reference};
pub use records::record_source;
pub use walker::{DirectoryWalker, PathPredicate};
