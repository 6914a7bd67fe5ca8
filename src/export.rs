//! JSON export of every pet's metrics, used by `--once`.

use serde_json::{json, Map, Value};

use pettrak_coordinator::{Availability, PetRegistry, PetStatus};
use pettrak_types::{Pet, Snapshot};

use crate::duration::format_duration;

/// One pet's metrics and polling health.
pub fn pet_to_json(pet: &Pet, snapshot: Option<&Snapshot>, status: Option<&PetStatus>) -> Value {
    let metrics: Map<String, Value> = snapshot
        .map(|snapshot| {
            snapshot
                .metrics()
                .into_iter()
                .map(|(name, value)| (name, json!(value)))
                .collect()
        })
        .unwrap_or_default();

    let mut pet_json = json!({
        "id": pet.id.0,
        "name": pet.name,
        "metrics": metrics,
    });

    if let Some(status) = status {
        pet_json["status"] = json!({
            "available": status.availability.is_active(),
            "unavailable_reason": match &status.availability {
                Availability::Active => None,
                Availability::Unavailable(reason) => Some(reason.to_string()),
            },
            "last_success": status.last_success.map(|ts| ts.to_rfc3339()),
            "stale": status.stale,
            "consecutive_failures": status.consecutive_failures,
            "next_poll_in": format_duration(status.interval),
            "last_error": status.last_error,
        });
    }

    pet_json
}

/// Every registered pet, in id order.
pub fn registry_to_json(registry: &PetRegistry) -> Value {
    let pets: Vec<Value> = registry
        .pets()
        .iter()
        .map(|pet| {
            let snapshot = registry.get_snapshot(pet.id);
            let status = registry.status(pet.id);
            pet_to_json(pet, snapshot.as_deref(), status.as_ref())
        })
        .collect();

    json!({ "pets": pets })
}
