//! Listing settings: visibility flags, sort and group preferences, and batch pacing.
//!
//! Settings are plain values passed to whoever needs them. Keys are camelCase, with snake_case
//! aliases, and every field is optional in the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::enumeration::convert::VisibilityPolicy;
use crate::enumeration::{BatchSizing, ListingOptions};
use crate::listing::grouping::GroupOption;
use crate::listing::sorting::{SortDirection, SortPolicy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingSettings {
    pub visibility: VisibilityPolicy,
    pub sort: SortPolicy,
    #[serde(alias = "group_option")]
    pub group_option: GroupOption,
    #[serde(alias = "group_direction")]
    pub group_direction: SortDirection,
    pub batching: BatchSizing,
    #[serde(alias = "count_limit")]
    pub count_limit: Option<usize>,
}

impl ListingSettings {
    /// Enumeration options for these settings, with the default classifier.
    pub fn listing_options(&self) -> ListingOptions {
        ListingOptions {
            visibility: self.visibility,
            batching: self.batching,
            count_limit: self.count_limit,
            ..ListingOptions::default()
        }
    }
}

pub fn parse_settings(contents: &str) -> Result<ListingSettings, serde_json::Error> {
    serde_json::from_str(contents)
}

/// Loads settings from a JSON file.
/// Returns defaults if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> ListingSettings {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("load_settings: {} not found, using defaults", path.display());
            return ListingSettings::default();
        }
        Err(e) => {
            log::warn!("load_settings: couldn't read {}: {}", path.display(), e);
            return ListingSettings::default();
        }
    };
    parse_settings(&contents).unwrap_or_else(|e| {
        log::warn!("load_settings: couldn't parse {}: {}", path.display(), e);
        ListingSettings::default()
    })
}
