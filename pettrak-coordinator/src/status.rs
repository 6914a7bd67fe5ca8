//! Health of a registered pet, as reported to the host.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use pettrak_types::Pet;

/// Why a pet stopped being polled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UnavailableReason {
    /// The service no longer knows the pet.
    PetRemoved,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::PetRemoved => write!(f, "pet was removed from the account"),
        }
    }
}

/// Whether a pet is still being polled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Availability {
    #[default]
    Active,
    Unavailable(UnavailableReason),
}

impl Availability {
    pub fn is_active(&self) -> bool {
        matches!(self, Availability::Active)
    }
}

/// Point-in-time view of a pet's polling state.
#[derive(Debug, Clone, PartialEq)]
pub struct PetStatus {
    pub pet: Pet,
    pub availability: Availability,
    /// When the cached snapshot was produced.
    pub last_success: Option<DateTime<Utc>>,
    /// Time since `last_success`.
    pub cache_age: Option<chrono::Duration>,
    /// A snapshot is cached but the most recent cycle failed.
    pub stale: bool,
    pub consecutive_failures: u32,
    /// Delay before the next scheduled cycle.
    pub interval: Duration,
    pub last_error: Option<String>,
}
