//! Entries and the policies that arrange them: sorting, grouping, header labels, and the
//! listing view that applies them to a live collection.

pub mod entry;
pub mod grouping;
pub mod labels;
pub mod sorting;
pub mod view;

#[cfg(test)]
mod view_test;
