//! Turning raw records into a [`Snapshot`].

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use pettrak_types::{
    CategoryStats, EventCategory, RawEvent, RawReading, Snapshot, ROLLING_WINDOW_DAYS,
};

/// Build a snapshot from one cycle's readings and events.
///
/// Counts and the average only consider records inside
/// `[now - 7 days, now]`. "Latest" values prefer the newest in-window record
/// and fall back to the newest record overall, so a pet with only old data
/// still shows its last known value. On equal timestamps the record that
/// comes later in the slice wins.
///
/// Pure: the same inputs always produce the same snapshot.
///
/// # Example
///
/// ```rust
/// use chrono::{Duration, TimeZone, Utc};
/// use pettrak_coordinator::aggregate;
/// use pettrak_types::RawReading;
///
/// let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
/// let readings = vec![
///     RawReading::new(now - Duration::hours(3), 120.0),
///     RawReading::new(now - Duration::hours(2), 150.0),
///     RawReading::new(now - Duration::hours(1), 90.0),
/// ];
///
/// let snapshot = aggregate(&readings, &[], now);
/// assert_eq!(snapshot.readings_in_window, 3);
/// assert_eq!(snapshot.average_glucose, Some(120.0));
/// assert_eq!(snapshot.glucose_level(), Some(90.0));
/// ```
pub fn aggregate(readings: &[RawReading], events: &[RawEvent], now: DateTime<Utc>) -> Snapshot {
    let window_start = now - Duration::days(ROLLING_WINDOW_DAYS);
    let in_window = |ts: DateTime<Utc>| ts >= window_start && ts <= now;

    let mut snapshot = Snapshot::empty(now);

    let mut latest_reading = Latest::default();
    let mut sum = 0.0;
    for reading in readings {
        let inside = in_window(reading.timestamp);
        if inside {
            snapshot.readings_in_window += 1;
            sum += reading.value;
        }
        latest_reading.offer(reading.timestamp, reading, inside);
    }
    if snapshot.readings_in_window > 0 {
        snapshot.average_glucose = Some(sum / f64::from(snapshot.readings_in_window));
    }
    snapshot.latest_reading = latest_reading.get().cloned();

    let mut last_events: BTreeMap<EventCategory, Latest<&RawEvent>> = BTreeMap::new();
    let mut last_dose = Latest::default();
    let mut last_weight = Latest::default();
    for event in events {
        let inside = in_window(event.timestamp);
        if inside {
            snapshot.categories.entry(event.category).or_default().count += 1;
        }
        last_events
            .entry(event.category)
            .or_default()
            .offer(event.timestamp, event, inside);

        if let Some(dose) = event.insulin_dose() {
            last_dose.offer(event.timestamp, dose, inside);
        }
        if let Some(weight) = event.weight() {
            last_weight.offer(event.timestamp, weight, inside);
        }
    }
    for (category, latest) in last_events {
        snapshot.categories.entry(category).or_default().last_event =
            latest.get().map(|event| event.timestamp);
    }
    snapshot.last_insulin_dose = last_dose.get();
    snapshot.last_weight = last_weight.get();

    snapshot
}

/// Fill "latest known" fields that `snapshot` lacks from an older snapshot.
///
/// A fetch only covers the rolling window, so a category that went quiet
/// would otherwise lose its last event time. Counts and the average are
/// never carried over.
pub fn carry_forward(snapshot: &mut Snapshot, previous: &Snapshot) {
    if snapshot.latest_reading.is_none() {
        snapshot.latest_reading = previous.latest_reading.clone();
    }
    if snapshot.last_insulin_dose.is_none() {
        snapshot.last_insulin_dose = previous.last_insulin_dose;
    }
    if snapshot.last_weight.is_none() {
        snapshot.last_weight = previous.last_weight;
    }
    for (category, old) in &previous.categories {
        let stats: &mut CategoryStats = snapshot.categories.entry(*category).or_default();
        if stats.last_event.is_none() {
            stats.last_event = old.last_event;
        }
    }
}

/// Tracks the newest item seen, in window and overall.
#[derive(Clone, Copy)]
struct Latest<T> {
    window: Option<(DateTime<Utc>, T)>,
    overall: Option<(DateTime<Utc>, T)>,
}

impl<T> Default for Latest<T> {
    fn default() -> Self {
        Self {
            window: None,
            overall: None,
        }
    }
}

impl<T: Copy> Latest<T> {
    fn offer(&mut self, timestamp: DateTime<Utc>, item: T, in_window: bool) {
        if in_window {
            keep_newer(&mut self.window, timestamp, item);
        }
        keep_newer(&mut self.overall, timestamp, item);
    }

    fn get(&self) -> Option<T> {
        self.window.or(self.overall).map(|(_, item)| item)
    }
}

// `>=` so a later duplicate timestamp replaces the earlier one.
fn keep_newer<T: Copy>(slot: &mut Option<(DateTime<Utc>, T)>, timestamp: DateTime<Utc>, item: T) {
    if slot.map_or(true, |(current, _)| timestamp >= current) {
        *slot = Some((timestamp, item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pettrak_types::{EventPayload, GlucoseFlags};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 8, 12, 0, 0).unwrap()
    }

    fn hours_ago(hours: i64) -> DateTime<Utc> {
        now() - Duration::hours(hours)
    }

    #[test]
    fn empty_input_gives_zeroed_snapshot() {
        let snapshot = aggregate(&[], &[], now());

        assert_eq!(snapshot.readings_in_window, 0);
        assert_eq!(snapshot.average_glucose, None);
        assert_eq!(snapshot.latest_reading, None);
        assert_eq!(snapshot.total_events(), 0);
        for category in EventCategory::ALL {
            assert_eq!(snapshot.count(category), 0);
            assert_eq!(snapshot.last_event(category), None);
        }
    }

    #[test]
    fn fluffy_three_readings() {
        let readings = vec![
            RawReading::new(hours_ago(30), 120.0),
            RawReading::new(hours_ago(20), 150.0),
            RawReading::new(hours_ago(10), 90.0),
        ];

        let snapshot = aggregate(&readings, &[], now());

        assert_eq!(snapshot.readings_in_window, 3);
        assert_eq!(snapshot.average_glucose, Some(120.0));
        let latest = snapshot.latest_reading.unwrap();
        assert_eq!(latest.value, 90.0);
        assert_eq!(latest.timestamp, hours_ago(10));
    }

    #[test]
    fn source_order_does_not_matter_for_latest() {
        let readings = vec![
            RawReading::new(hours_ago(10), 90.0),
            RawReading::new(hours_ago(30), 120.0),
            RawReading::new(hours_ago(20), 150.0),
        ];

        let snapshot = aggregate(&readings, &[], now());
        assert_eq!(snapshot.glucose_level(), Some(90.0));
    }

    #[test]
    fn timestamp_tie_picks_later_element() {
        let readings = vec![
            RawReading::new(hours_ago(1), 100.0),
            RawReading::new(hours_ago(1), 200.0),
        ];

        for _ in 0..3 {
            let snapshot = aggregate(&readings, &[], now());
            assert_eq!(snapshot.glucose_level(), Some(200.0));
        }
    }

    #[test]
    fn flags_come_from_latest_reading_only() {
        let readings = vec![
            RawReading::new(hours_ago(5), 300.0).with_flags(GlucoseFlags {
                after_meal: true,
                after_insulin: true,
                control_test: true,
            }),
            RawReading::new(hours_ago(1), 110.0),
        ];

        let snapshot = aggregate(&readings, &[], now());
        let flags = snapshot.latest_reading.unwrap().flags;
        assert_eq!(flags, GlucoseFlags::default());
    }

    #[test]
    fn window_bounds_counts_and_average() {
        let readings = vec![
            RawReading::new(now() - Duration::days(8), 400.0),
            RawReading::new(now() - Duration::days(7), 100.0),
            RawReading::new(now(), 200.0),
            RawReading::new(now() + Duration::minutes(5), 999.0),
        ];

        let snapshot = aggregate(&readings, &[], now());

        assert_eq!(snapshot.readings_in_window, 2);
        assert_eq!(snapshot.average_glucose, Some(150.0));
        assert_eq!(snapshot.glucose_level(), Some(200.0));
    }

    #[test]
    fn old_data_still_reports_latest_known_value() {
        let readings = vec![RawReading::new(now() - Duration::days(10), 140.0)];
        let events = vec![RawEvent::new(now() - Duration::days(9), EventCategory::Feeding)];

        let snapshot = aggregate(&readings, &events, now());

        assert_eq!(snapshot.readings_in_window, 0);
        assert_eq!(snapshot.average_glucose, None);
        assert_eq!(snapshot.glucose_level(), Some(140.0));
        assert_eq!(snapshot.count(EventCategory::Feeding), 0);
        assert_eq!(
            snapshot.last_event(EventCategory::Feeding),
            Some(now() - Duration::days(9))
        );
    }

    #[test]
    fn events_are_counted_per_category() {
        let events = vec![
            RawEvent::new(hours_ago(30), EventCategory::Feeding),
            RawEvent::new(hours_ago(6), EventCategory::Feeding),
            RawEvent::new(hours_ago(5), EventCategory::Vomiting),
            RawEvent::new(hours_ago(4), EventCategory::Insulin)
                .with_payload(EventPayload::InsulinDose(2.0)),
            RawEvent::new(hours_ago(2), EventCategory::Insulin),
            RawEvent::new(hours_ago(48), EventCategory::Weight)
                .with_payload(EventPayload::Weight(5.4)),
        ];

        let snapshot = aggregate(&[], &events, now());

        assert_eq!(snapshot.count(EventCategory::Feeding), 2);
        assert_eq!(snapshot.last_event(EventCategory::Feeding), Some(hours_ago(6)));
        assert_eq!(snapshot.count(EventCategory::Vomiting), 1);
        assert_eq!(snapshot.count(EventCategory::Exercise), 0);
        assert_eq!(snapshot.count(EventCategory::Insulin), 2);
        assert_eq!(snapshot.last_event(EventCategory::Insulin), Some(hours_ago(2)));
        // The newest injection has no dose, so the dose comes from the one before.
        assert_eq!(snapshot.last_insulin_dose, Some(2.0));
        assert_eq!(snapshot.last_weight, Some(5.4));
        assert_eq!(snapshot.total_events(), 6);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let readings = vec![
            RawReading::new(hours_ago(3), 101.5),
            RawReading::new(hours_ago(2), 99.25),
        ];
        let events = vec![RawEvent::new(hours_ago(1), EventCategory::Exercise)];

        let first = aggregate(&readings, &events, now());
        let second = aggregate(&readings, &events, now());

        assert_eq!(first, second);
        assert_eq!(
            first.average_glucose.map(f64::to_bits),
            second.average_glucose.map(f64::to_bits)
        );
    }

    #[test]
    fn carry_forward_fills_only_missing_latest_values() {
        let old = aggregate(
            &[RawReading::new(hours_ago(100), 180.0)],
            &[
                RawEvent::new(hours_ago(100), EventCategory::Urination),
                RawEvent::new(hours_ago(100), EventCategory::Weight)
                    .with_payload(EventPayload::Weight(6.0)),
            ],
            now() - Duration::days(3),
        );

        let mut fresh = aggregate(
            &[],
            &[RawEvent::new(hours_ago(1), EventCategory::Feeding)],
            now(),
        );
        carry_forward(&mut fresh, &old);

        assert_eq!(fresh.glucose_level(), Some(180.0));
        assert_eq!(fresh.readings_in_window, 0);
        assert_eq!(fresh.last_weight, Some(6.0));
        assert_eq!(fresh.last_event(EventCategory::Urination), Some(hours_ago(100)));
        assert_eq!(fresh.count(EventCategory::Urination), 0);
        assert_eq!(fresh.last_event(EventCategory::Feeding), Some(hours_ago(1)));
    }
}
