//! Date and size label formatters consumed by the group policy.
//!
//! Both are injected collaborators. The defaults here bucket dates relative to "now" and
//! sizes on a fixed byte ladder.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};

/// A display label plus the index that orders its group header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub label: String,
    /// Optional second line for the header, like a size range.
    pub subtext: Option<String>,
    pub sort_index: i32,
}

impl Bucket {
    fn new(label: &str, sort_index: i32) -> Self {
        Self {
            label: label.to_string(),
            subtext: None,
            sort_index,
        }
    }
}

/// Maps a timestamp to a humanized relative-time bucket.
pub trait DateLabeler: Send + Sync {
    fn bucket(&self, at: Option<DateTime<Utc>>) -> Bucket;
}

/// Maps a byte count to a size tier.
pub trait SizeLabeler: Send + Sync {
    fn bucket(&self, bytes: u64) -> Bucket;
}

// ============================================================================
// Relative dates
// ============================================================================

/// Buckets dates into "Today", "Yesterday", "Earlier this week", and so on, in local time.
///
/// Lower sort indices are more recent; undated items get the highest index.
pub struct RelativeDateLabeler {
    today: Option<NaiveDate>,
}

impl RelativeDateLabeler {
    pub fn new() -> Self {
        Self { today: None }
    }

    /// Pins "today" to a fixed date, for reproducible bucketing.
    pub fn with_today(today: NaiveDate) -> Self {
        Self { today: Some(today) }
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }
}

impl Default for RelativeDateLabeler {
    fn default() -> Self {
        Self::new()
    }
}

impl DateLabeler for RelativeDateLabeler {
    fn bucket(&self, at: Option<DateTime<Utc>>) -> Bucket {
        let Some(at) = at else {
            return Bucket::new("Unknown date", 9);
        };
        let today = self.today();
        let date = at.with_timezone(&Local).date_naive();

        if date > today {
            return Bucket::new("Upcoming", -1);
        }
        if date == today {
            return Bucket::new("Today", 0);
        }
        if date == today - Duration::days(1) {
            return Bucket::new("Yesterday", 1);
        }

        let days_from_monday = i64::from(today.weekday().num_days_from_monday());
        let week_start = today - Duration::days(days_from_monday);
        if date >= week_start {
            return Bucket::new("Earlier this week", 2);
        }
        if date >= week_start - Duration::days(7) {
            return Bucket::new("Last week", 3);
        }
        if date.year() == today.year() && date.month() == today.month() {
            return Bucket::new("Earlier this month", 4);
        }
        let (last_month_year, last_month) = if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };
        if date.year() == last_month_year && date.month() == last_month {
            return Bucket::new("Last month", 5);
        }
        if date.year() == today.year() {
            return Bucket::new("Earlier this year", 6);
        }
        if date.year() == today.year() - 1 {
            return Bucket::new("Last year", 7);
        }
        Bucket::new("A long time ago", 8)
    }
}

// ============================================================================
// Size ladder
// ============================================================================

/// Size tiers, largest first: (exclusive lower bound in bytes, label, lower-bound text).
/// The position in this table is the tier's sort index, so headers order by magnitude.
pub const SIZE_LADDER: &[(u64, &str, &str)] = &[
    (5_000_000_000, "Huge", "5 GiB"),
    (1_000_000_000, "Very large", "1 GiB"),
    (128_000_000, "Large", "128 MiB"),
    (1_000_000, "Medium", "1 MiB"),
    (16_000, "Small", "16 KiB"),
    (0, "Tiny", "0 B"),
];

/// Default size labeler over [`SIZE_LADDER`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SizeLadder;

impl SizeLabeler for SizeLadder {
    fn bucket(&self, bytes: u64) -> Bucket {
        let last = SIZE_LADDER.len() - 1;
        let index = SIZE_LADDER[..last]
            .iter()
            .position(|(threshold, _, _)| bytes > *threshold)
            .unwrap_or(last);

        let (_, label, lower) = SIZE_LADDER[index];
        let subtext = if index == 0 {
            format!("Over {}", lower)
        } else {
            format!("{} - {}", lower, SIZE_LADDER[index - 1].2)
        };
        Bucket {
            label: label.to_string(),
            subtext: Some(subtext),
            sort_index: index as i32,
        }
    }
}
