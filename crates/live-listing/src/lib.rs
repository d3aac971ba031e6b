//! Live directory-listing engine.
//!
//! An enumeration pipeline reads a directory source in adaptive batches and hands them to a
//! [`ListingView`], which merges them into a [`ConcurrentGroupedCollection`] of entries. The
//! collection keeps an optional grouped mirror consistent with every mutation and coalesces
//! change notifications during bulk loads. Sort and group policies can change at any time
//! without enumerating again.

// Warn on redundant path prefixes (e.g., std::path::Path when Path is imported)
#![warn(unused_qualifications)]
// Warn on unused dependencies to catch cfg mismatches
#![warn(unused_crate_dependencies)]
// Use log::* macros instead of println!/eprintln! for proper log level control
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod collection;
pub mod config;
pub mod enumeration;
mod ignore_poison;
pub mod listing;

pub use collection::{ChangeKind, CollectionChange, ConcurrentGroupedCollection, Group, GroupHeader, SubscriptionId};
pub use config::{ListingSettings, load_settings, parse_settings};
pub use enumeration::batched::list_entries;
pub use enumeration::local::LocalDirectorySource;
pub use enumeration::sequential::list_entries_from_cursor;
pub use enumeration::source::{EntrySource, RawRecord, RecordCursor, SourceError};
pub use enumeration::{BatchSizing, CancellationFlag, Completion, ListingOptions, ListingOutcome};
pub use listing::entry::{Entry, EntryId, EntryKind};
pub use listing::grouping::{GroupOption, GroupPolicy};
pub use listing::sorting::{SortDirection, SortOption, SortPolicy};
pub use listing::view::ListingView;
