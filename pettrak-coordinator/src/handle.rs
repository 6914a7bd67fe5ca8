//! Pet handle for reading cached data.

use std::sync::Arc;

use pettrak_types::{MetricKey, MetricValue, Pet, Snapshot};

use crate::coordinator::{FetchResult, PetCoordinator};
use crate::status::PetStatus;

/// A handle to one registered pet.
///
/// Obtain a handle by calling `PetRegistry::register_pet()`. Handles are
/// cheap to clone. After the pet is deregistered a handle keeps reporting
/// the last state it saw, but nothing updates it any more.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use pettrak_client::alphatrak::AlphaTrakClient;
/// use pettrak_client::Credential;
/// use pettrak_coordinator::PetRegistry;
/// use pettrak_types::{MetricKey, Pet, PetId};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Arc::new(AlphaTrakClient::builder().build()?);
///     let registry = PetRegistry::builder(client).build();
///
///     let handle = registry.register_pet(
///         Credential::new("owner@example.com", "secret"),
///         Pet::new(PetId(42), "Fluffy"),
///     );
///
///     handle.request_refresh();
///     if let Some(level) = handle.metric(MetricKey::GlucoseLevel) {
///         println!("{} is at {}", handle.pet(), level);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct PetHandle {
    pub(crate) coordinator: Arc<PetCoordinator>,
}

impl PetHandle {
    /// The pet this handle belongs to.
    pub fn pet(&self) -> &Pet {
        self.coordinator.pet()
    }

    /// Latest cached snapshot. `None` until the first successful cycle.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.coordinator.state.snapshot()
    }

    /// One metric from the cached snapshot.
    pub fn metric(&self, key: MetricKey) -> Option<MetricValue> {
        self.snapshot().and_then(|snapshot| snapshot.metric(key))
    }

    /// Polling health.
    pub fn status(&self) -> PetStatus {
        self.coordinator
            .state
            .status(&self.coordinator.policy, self.coordinator.now())
    }

    /// Ask for a cycle now.
    ///
    /// Returns false when a cycle is already in flight (the request is
    /// folded into it) or the pet is no longer polled.
    pub fn request_refresh(&self) -> bool {
        self.coordinator.request_refresh()
    }

    /// Run a cycle on the caller's task and wait for its outcome.
    ///
    /// Returns `None` if a cycle was already in flight or the pet is no
    /// longer polled. The poll loop's own schedule is unaffected.
    pub async fn poll_now(&self) -> Option<FetchResult> {
        self.coordinator.run_cycle().await
    }
}

impl std::fmt::Debug for PetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PetHandle")
            .field("pet", self.pet())
            .finish()
    }
}
