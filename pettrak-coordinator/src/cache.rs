//! Per-pet cached state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use pettrak_types::{Pet, Snapshot};

use crate::backoff::BackoffPolicy;
use crate::status::{Availability, PetStatus, UnavailableReason};

/// Sequence number handed out when a cycle starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct CycleTicket(u64);

#[derive(Debug, Default)]
struct Entry {
    snapshot: Option<Arc<Snapshot>>,
    applied_cycle: u64,
    last_success: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_error: Option<String>,
    availability: Availability,
}

/// Thread-safe cache for a single pet.
///
/// Completions are applied in cycle order: a cycle that finishes after a
/// later-started one has already been applied is dropped.
#[derive(Debug)]
pub(crate) struct PetState {
    pet: Pet,
    next_cycle: AtomicU64,
    in_flight: AtomicBool,
    entry: RwLock<Entry>,
}

/// Marks a cycle as running until dropped.
pub(crate) struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl PetState {
    pub(crate) fn new(pet: Pet) -> Self {
        Self {
            pet,
            next_cycle: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
            entry: RwLock::new(Entry::default()),
        }
    }

    pub(crate) fn pet(&self) -> &Pet {
        &self.pet
    }

    /// Claim the single in-flight slot. `None` if a cycle is already running.
    pub(crate) fn enter(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                flag: &self.in_flight,
            })
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn begin_cycle(&self) -> CycleTicket {
        CycleTicket(self.next_cycle.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Swap in a new snapshot. Returns false if the ticket is stale.
    pub(crate) fn record_success(
        &self,
        ticket: CycleTicket,
        snapshot: Arc<Snapshot>,
        at: DateTime<Utc>,
    ) -> bool {
        let mut entry = self.entry.write();
        if ticket.0 <= entry.applied_cycle {
            return false;
        }
        entry.applied_cycle = ticket.0;
        entry.snapshot = Some(snapshot);
        entry.last_success = Some(at);
        entry.consecutive_failures = 0;
        entry.last_error = None;
        true
    }

    /// Count a failed cycle. Returns the new failure count, or `None` if the
    /// ticket is stale.
    pub(crate) fn record_failure(&self, ticket: CycleTicket, error: String) -> Option<u32> {
        let mut entry = self.entry.write();
        if ticket.0 <= entry.applied_cycle {
            return None;
        }
        entry.applied_cycle = ticket.0;
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_error = Some(error);
        Some(entry.consecutive_failures)
    }

    pub(crate) fn mark_unavailable(&self, reason: UnavailableReason) {
        let mut entry = self.entry.write();
        entry.last_error = Some(reason.to_string());
        entry.availability = Availability::Unavailable(reason);
    }

    pub(crate) fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.entry.read().snapshot.clone()
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.entry.read().consecutive_failures
    }

    pub(crate) fn is_active(&self) -> bool {
        self.entry.read().availability.is_active()
    }

    pub(crate) fn status(&self, policy: &BackoffPolicy, now: DateTime<Utc>) -> PetStatus {
        let entry = self.entry.read();
        PetStatus {
            pet: self.pet.clone(),
            availability: entry.availability.clone(),
            last_success: entry.last_success,
            cache_age: entry.last_success.map(|at| now - at),
            stale: entry.snapshot.is_some() && entry.consecutive_failures > 0,
            consecutive_failures: entry.consecutive_failures,
            interval: policy.interval(entry.consecutive_failures),
            last_error: entry.last_error.clone(),
        }
    }
}
