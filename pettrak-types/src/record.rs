//! Raw records as delivered by the cloud service.
//!
//! Records are never mutated locally. The aggregator only reads them.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};

/// Context flags recorded alongside a glucose measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlucoseFlags {
    /// Measured after a meal.
    pub after_meal: bool,

    /// Measured after an insulin injection.
    pub after_insulin: bool,

    /// Control-solution test rather than a blood sample.
    pub control_test: bool,
}

/// Normal glucose range configured on the account.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlucoseRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl GlucoseRange {
    /// Returns true if neither bound is known.
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// A single glucose measurement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawReading {
    /// When the measurement was taken.
    pub timestamp: DateTime<Utc>,

    /// Glucose concentration as reported by the meter.
    pub value: f64,

    /// Context flags.
    pub flags: GlucoseFlags,

    /// Unit label reported by the service (e.g. `"mg/dL"`).
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub unit: Option<String>,

    /// Name of the meter that produced the reading.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub device_name: Option<String>,

    /// Free-text note entered by the owner.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub note: Option<String>,

    /// Normal range reported with the reading batch.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub range: Option<GlucoseRange>,
}

impl RawReading {
    /// Create a reading with no flags and no extras.
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            flags: GlucoseFlags::default(),
            unit: None,
            device_name: None,
            note: None,
            range: None,
        }
    }

    /// Replace the context flags.
    pub fn with_flags(mut self, flags: GlucoseFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Attach the account's normal range.
    pub fn with_range(mut self, range: GlucoseRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// Activity-log category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EventCategory {
    Feeding,
    Insulin,
    Exercise,
    Urination,
    Vomiting,
    WaterIntake,
    IllnessSign,
    Weight,
}

impl EventCategory {
    /// Every category, in display order.
    pub const ALL: [EventCategory; 8] = [
        EventCategory::Feeding,
        EventCategory::Insulin,
        EventCategory::Exercise,
        EventCategory::Urination,
        EventCategory::Vomiting,
        EventCategory::WaterIntake,
        EventCategory::IllnessSign,
        EventCategory::Weight,
    ];

    /// Short name used in metric keys (`last_<slug>_time`).
    pub const fn slug(&self) -> &'static str {
        match self {
            EventCategory::Feeding => "feeding",
            EventCategory::Insulin => "insulin",
            EventCategory::Exercise => "exercise",
            EventCategory::Urination => "urination",
            EventCategory::Vomiting => "vomiting",
            EventCategory::WaterIntake => "water_intake",
            EventCategory::IllnessSign => "signs_of_illness",
            EventCategory::Weight => "weight",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Error returned when parsing an unknown category slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event category: {}", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for EventCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventCategory::ALL
            .into_iter()
            .find(|c| c.slug() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Optional measurement attached to an activity entry.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EventPayload {
    /// Units of insulin injected.
    InsulinDose(f64),

    /// Body weight at a weigh-in.
    Weight(f64),
}

/// A single activity-log entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawEvent {
    /// When the activity happened.
    pub timestamp: DateTime<Utc>,

    /// What kind of activity it was.
    pub category: EventCategory,

    /// Measurement carried by the entry, if any.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub payload: Option<EventPayload>,
}

impl RawEvent {
    /// Create an event without a payload.
    pub fn new(timestamp: DateTime<Utc>, category: EventCategory) -> Self {
        Self {
            timestamp,
            category,
            payload: None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Insulin dose carried by this event, if it is one.
    pub fn insulin_dose(&self) -> Option<f64> {
        match self.payload {
            Some(EventPayload::InsulinDose(dose)) => Some(dose),
            _ => None,
        }
    }

    /// Weight carried by this event, if it is one.
    pub fn weight(&self) -> Option<f64> {
        match self.payload {
            Some(EventPayload::Weight(weight)) => Some(weight),
            _ => None,
        }
    }
}
