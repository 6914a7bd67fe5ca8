//! Snapshot - the aggregated view of one pet's recent health data.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{EventCategory, RawReading};

/// Rolling-window statistics for one activity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CategoryStats {
    /// Number of events inside the rolling window.
    pub count: u32,

    /// Timestamp of the most recent event known, in or out of the window.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_event: Option<DateTime<Utc>>,
}

/// A point-in-time view of a pet's glucose and activity data.
///
/// Every field is derived from the same fetch cycle. Snapshots are replaced
/// wholesale; nothing mutates one after the aggregator hands it out.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use pettrak_types::{EventCategory, Snapshot};
///
/// let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
/// let snapshot = Snapshot::empty(now);
///
/// assert_eq!(snapshot.count(EventCategory::Feeding), 0);
/// assert!(snapshot.average_glucose.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// The `now` the snapshot was aggregated against.
    pub generated_at: DateTime<Utc>,

    /// Most recent glucose reading.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub latest_reading: Option<RawReading>,

    /// Number of readings inside the rolling window.
    pub readings_in_window: u32,

    /// Mean glucose inside the rolling window. Absent, not zero, when the
    /// window holds no readings.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub average_glucose: Option<f64>,

    /// Per-category statistics. Every category is always present.
    pub categories: BTreeMap<EventCategory, CategoryStats>,

    /// Dose from the most recent insulin entry that recorded one.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_insulin_dose: Option<f64>,

    /// Value from the most recent weigh-in.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_weight: Option<f64>,
}

impl Snapshot {
    /// A snapshot with zero counts and no latest values.
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            latest_reading: None,
            readings_in_window: 0,
            average_glucose: None,
            categories: EventCategory::ALL
                .into_iter()
                .map(|c| (c, CategoryStats::default()))
                .collect(),
            last_insulin_dose: None,
            last_weight: None,
        }
    }

    /// Statistics for a category.
    pub fn category(&self, category: EventCategory) -> CategoryStats {
        self.categories.get(&category).copied().unwrap_or_default()
    }

    /// Rolling-window event count for a category.
    pub fn count(&self, category: EventCategory) -> u32 {
        self.category(category).count
    }

    /// Most recent event timestamp for a category.
    pub fn last_event(&self, category: EventCategory) -> Option<DateTime<Utc>> {
        self.category(category).last_event
    }

    /// Latest glucose value, if any reading is known.
    pub fn glucose_level(&self) -> Option<f64> {
        self.latest_reading.as_ref().map(|r| r.value)
    }

    /// Total in-window events across all categories.
    pub fn total_events(&self) -> u32 {
        self.categories.values().map(|s| s.count).sum()
    }

    /// Returns true if the snapshot carries no data at all.
    pub fn is_empty(&self) -> bool {
        self.latest_reading.is_none()
            && self.readings_in_window == 0
            && self
                .categories
                .values()
                .all(|s| s.count == 0 && s.last_event.is_none())
    }
}
