//! # pettrak-types
//!
//! Core types for pet glucose and activity monitoring. This crate defines the
//! schema shared by the cloud client, the coordinator, and any host that
//! renders pet data.
//!
//! ## Design Goals
//!
//! - **Stable snapshots**: A [`Snapshot`] is always derived from one fetch
//!   cycle and is never partially updated
//! - **Typed metrics**: Hosts read values through [`MetricKey`] instead of
//!   poking at fields or attribute bags
//! - **Optional serialization**: Enable the `serde` feature as needed
//!
//! ## Features
//!
//! - `serde`: JSON/etc. serialization via serde
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use pettrak_types::{MetricKey, MetricValue, Snapshot};
//!
//! let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
//! let snapshot = Snapshot::empty(now);
//!
//! assert_eq!(
//!     snapshot.metric(MetricKey::ReadingsLast7Days),
//!     Some(MetricValue::Count(0))
//! );
//! assert_eq!(snapshot.metric(MetricKey::GlucoseLevel), None);
//! ```

mod metrics;
mod pet;
mod record;
mod snapshot;

pub use metrics::*;
pub use pet::*;
pub use record::*;
pub use snapshot::*;

/// Length of the rolling window, in days.
///
/// Counts and averages only consider records inside
/// `[now - ROLLING_WINDOW_DAYS, now]`.
pub const ROLLING_WINDOW_DAYS: i64 = 7;
