//! Subscriber that writes every update to the log.

use std::sync::Arc;

use tracing::{info, warn};

use pettrak_coordinator::{SnapshotSubscriber, UnavailableReason};
use pettrak_types::{Pet, Snapshot};

/// Logs snapshot changes at `info` and lost pets at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSubscriber;

impl SnapshotSubscriber for LogSubscriber {
    fn on_snapshot_changed(&self, pet: &Pet, snapshot: &Arc<Snapshot>) {
        info!(
            pet = %pet,
            glucose = ?snapshot.glucose_level(),
            average_7d = ?snapshot.average_glucose,
            readings_7d = snapshot.readings_in_window,
            events_7d = snapshot.total_events(),
            "Snapshot updated"
        );
    }

    fn on_pet_unavailable(&self, pet: &Pet, reason: &UnavailableReason) {
        warn!(pet = %pet, reason = %reason, "Pet unavailable, polling stopped");
    }
}
