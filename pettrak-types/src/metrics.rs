//! Typed metric mapping over a [`Snapshot`].
//!
//! The host's entity layer reads individual metrics by key instead of
//! inspecting snapshot fields. Each key maps to exactly one typed value.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{EventCategory, Snapshot};

/// Name of a metric derived from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKey {
    /// Latest glucose value.
    GlucoseLevel,
    /// Number of readings in the rolling window.
    ReadingsLast7Days,
    /// Mean glucose over the rolling window.
    AverageLast7Days,
    /// Flag from the latest reading.
    AfterMeal,
    /// Flag from the latest reading.
    AfterInsulin,
    /// Flag from the latest reading.
    ControlTest,
    /// Lower bound of the account's normal range.
    NormalRangeMin,
    /// Upper bound of the account's normal range.
    NormalRangeMax,
    /// Rolling-window event count for a category.
    CountLast7Days(EventCategory),
    /// Most recent event time for a category.
    LastEventTime(EventCategory),
    /// Dose of the most recent insulin injection.
    LastInsulinDose,
    /// Most recent weigh-in value.
    LastWeightValue,
}

impl MetricKey {
    /// Every metric key, glucose first, then per-category pairs.
    pub fn all() -> Vec<MetricKey> {
        let mut keys = vec![
            MetricKey::GlucoseLevel,
            MetricKey::ReadingsLast7Days,
            MetricKey::AverageLast7Days,
            MetricKey::AfterMeal,
            MetricKey::AfterInsulin,
            MetricKey::ControlTest,
            MetricKey::NormalRangeMin,
            MetricKey::NormalRangeMax,
        ];
        for category in EventCategory::ALL {
            keys.push(MetricKey::CountLast7Days(category));
            keys.push(MetricKey::LastEventTime(category));
        }
        keys.push(MetricKey::LastInsulinDose);
        keys.push(MetricKey::LastWeightValue);
        keys
    }

    /// The key's stable string name.
    pub fn name(&self) -> String {
        match self {
            MetricKey::GlucoseLevel => "glucose_level".to_string(),
            MetricKey::ReadingsLast7Days => "readings_last_7_days".to_string(),
            MetricKey::AverageLast7Days => "average_last_7_days".to_string(),
            MetricKey::AfterMeal => "after_meal".to_string(),
            MetricKey::AfterInsulin => "after_insulin".to_string(),
            MetricKey::ControlTest => "control_test".to_string(),
            MetricKey::NormalRangeMin => "normal_range_min".to_string(),
            MetricKey::NormalRangeMax => "normal_range_max".to_string(),
            MetricKey::CountLast7Days(c) => format!("{}_count_last_7_days", c.slug()),
            MetricKey::LastEventTime(c) => format!("last_{}_time", c.slug()),
            MetricKey::LastInsulinDose => "last_insulin_dose".to_string(),
            MetricKey::LastWeightValue => "last_weight_value".to_string(),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Error returned when parsing an unknown metric name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMetric(pub String);

impl fmt::Display for UnknownMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown metric: {}", self.0)
    }
}

impl std::error::Error for UnknownMetric {}

impl FromStr for MetricKey {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::all()
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| UnknownMetric(s.to_string()))
    }
}

/// Typed value of a metric.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum MetricValue {
    Count(u32),
    Number(f64),
    Flag(bool),
    Timestamp(DateTime<Utc>),
}

impl MetricValue {
    /// Numeric view of counts and numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Count(c) => Some(f64::from(*c)),
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Count(c) => write!(f, "{}", c),
            MetricValue::Number(n) => write!(f, "{:.1}", n),
            MetricValue::Flag(b) => write!(f, "{}", b),
            MetricValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

impl Snapshot {
    /// Value of one metric. `None` means the snapshot has no data for it.
    ///
    /// Counts are always present; they are zero rather than absent.
    pub fn metric(&self, key: MetricKey) -> Option<MetricValue> {
        let latest = self.latest_reading.as_ref();
        match key {
            MetricKey::GlucoseLevel => latest.map(|r| MetricValue::Number(r.value)),
            MetricKey::ReadingsLast7Days => Some(MetricValue::Count(self.readings_in_window)),
            MetricKey::AverageLast7Days => self.average_glucose.map(MetricValue::Number),
            MetricKey::AfterMeal => latest.map(|r| MetricValue::Flag(r.flags.after_meal)),
            MetricKey::AfterInsulin => latest.map(|r| MetricValue::Flag(r.flags.after_insulin)),
            MetricKey::ControlTest => latest.map(|r| MetricValue::Flag(r.flags.control_test)),
            MetricKey::NormalRangeMin => latest
                .and_then(|r| r.range)
                .and_then(|range| range.min)
                .map(MetricValue::Number),
            MetricKey::NormalRangeMax => latest
                .and_then(|r| r.range)
                .and_then(|range| range.max)
                .map(MetricValue::Number),
            MetricKey::CountLast7Days(c) => Some(MetricValue::Count(self.count(c))),
            MetricKey::LastEventTime(c) => self.last_event(c).map(MetricValue::Timestamp),
            MetricKey::LastInsulinDose => self.last_insulin_dose.map(MetricValue::Number),
            MetricKey::LastWeightValue => self.last_weight.map(MetricValue::Number),
        }
    }

    /// All metrics that have a value, keyed by name.
    pub fn metrics(&self) -> BTreeMap<String, MetricValue> {
        MetricKey::all()
            .into_iter()
            .filter_map(|key| self.metric(key).map(|value| (key.name(), value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CategoryStats, GlucoseFlags, GlucoseRange, RawReading};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn names_are_unique_and_parse_back() {
        let keys = MetricKey::all();
        let names: std::collections::BTreeSet<String> = keys.iter().map(|k| k.name()).collect();
        assert_eq!(names.len(), keys.len());

        for key in keys {
            assert_eq!(key.name().parse::<MetricKey>(), Ok(key));
        }
    }

    #[test]
    fn category_key_names() {
        assert_eq!(
            MetricKey::CountLast7Days(EventCategory::WaterIntake).name(),
            "water_intake_count_last_7_days"
        );
        assert_eq!(
            MetricKey::LastEventTime(EventCategory::IllnessSign).name(),
            "last_signs_of_illness_time"
        );
    }

    #[test]
    fn empty_snapshot_reports_counts_but_no_values() {
        let snapshot = Snapshot::empty(now());

        assert_eq!(
            snapshot.metric(MetricKey::ReadingsLast7Days),
            Some(MetricValue::Count(0))
        );
        assert_eq!(snapshot.metric(MetricKey::GlucoseLevel), None);
        assert_eq!(snapshot.metric(MetricKey::AverageLast7Days), None);
        assert_eq!(snapshot.metric(MetricKey::AfterMeal), None);

        // 1 reading count + 8 category counts
        assert_eq!(snapshot.metrics().len(), 1 + EventCategory::ALL.len());
    }

    #[test]
    fn flags_and_range_come_from_latest_reading() {
        let mut snapshot = Snapshot::empty(now());
        snapshot.latest_reading = Some(
            RawReading::new(now(), 95.0)
                .with_flags(GlucoseFlags {
                    after_meal: true,
                    after_insulin: false,
                    control_test: false,
                })
                .with_range(GlucoseRange {
                    min: Some(80.0),
                    max: Some(250.0),
                }),
        );
        snapshot.categories.insert(
            EventCategory::Feeding,
            CategoryStats {
                count: 3,
                last_event: Some(now()),
            },
        );

        assert_eq!(
            snapshot.metric(MetricKey::AfterMeal),
            Some(MetricValue::Flag(true))
        );
        assert_eq!(
            snapshot.metric(MetricKey::NormalRangeMax),
            Some(MetricValue::Number(250.0))
        );
        assert_eq!(
            snapshot.metric(MetricKey::CountLast7Days(EventCategory::Feeding)),
            Some(MetricValue::Count(3))
        );
        assert_eq!(
            snapshot.metric(MetricKey::LastEventTime(EventCategory::Feeding)),
            Some(MetricValue::Timestamp(now()))
        );
    }

    #[test]
    fn display_formats() {
        assert_eq!(MetricValue::Number(120.04).to_string(), "120.0");
        assert_eq!(MetricValue::Count(4).to_string(), "4");
        assert_eq!(MetricValue::Count(4).as_f64(), Some(4.0));
        assert_eq!(MetricValue::Flag(true).as_f64(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn values_serialize_untagged() {
        let json = serde_json::to_string(&MetricValue::Count(3)).unwrap();
        assert_eq!(json, "3");
        let json = serde_json::to_string(&MetricValue::Flag(false)).unwrap();
        assert_eq!(json, "false");
    }
}
