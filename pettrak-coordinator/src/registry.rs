//! The registry that owns every polled pet.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::info;

use pettrak_client::{ClientError, CloudClient, Credential};
use pettrak_types::{MetricKey, MetricValue, Pet, PetId, Snapshot};

use crate::backoff::BackoffPolicy;
use crate::cache::PetState;
use crate::cloud::{Cloud, DEFAULT_CALL_TIMEOUT};
use crate::coordinator::{Clock, PetCoordinator};
use crate::handle::PetHandle;
use crate::session::AccountSession;
use crate::status::PetStatus;
use crate::subscriber::SnapshotSubscriber;

struct Registration {
    handle: PetHandle,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// The main entry point for polling pets.
///
/// Each registered pet gets its own poll task. Pets on the same account
/// share one session. Deregistering a pet stops its task and discards its
/// cached snapshot.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use pettrak_client::alphatrak::AlphaTrakClient;
/// use pettrak_client::Credential;
/// use pettrak_coordinator::{BackoffPolicy, ChannelSubscriber, PetRegistry, PetUpdate};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Arc::new(AlphaTrakClient::builder().build()?);
///     let (subscriber, mut updates) = ChannelSubscriber::channel(64);
///
///     let registry = PetRegistry::builder(client)
///         .backoff(BackoffPolicy::new(
///             Duration::from_secs(300),
///             Duration::from_secs(3600),
///         ))
///         .subscriber(Arc::new(subscriber))
///         .build();
///
///     let credential = Credential::new("owner@example.com", "secret");
///     for pet in registry.discover_pets(&credential).await? {
///         registry.register_pet(credential.clone(), pet);
///     }
///
///     while let Some(update) = updates.recv().await {
///         if let PetUpdate::Snapshot { pet, snapshot } = update {
///             println!("{}: {:?}", pet, snapshot.glucose_level());
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct PetRegistry {
    cloud: Cloud,
    policy: BackoffPolicy,
    subscribers: Arc<Vec<Arc<dyn SnapshotSubscriber>>>,
    clock: Clock,
    accounts: RwLock<BTreeMap<String, Arc<AccountSession>>>,
    pets: RwLock<BTreeMap<PetId, Registration>>,
}

impl PetRegistry {
    /// Create a builder around the cloud client to poll through.
    pub fn builder(client: Arc<dyn CloudClient>) -> PetRegistryBuilder {
        PetRegistryBuilder::new(client)
    }

    fn account(&self, credential: &Credential) -> Arc<AccountSession> {
        // Fast path
        {
            let accounts = self.accounts.read();
            if let Some(account) = accounts.get(&credential.username) {
                if account.uses(credential) {
                    return account.clone();
                }
            }
        }

        // Slow path: a new password replaces the account's session
        let mut accounts = self.accounts.write();
        match accounts.get(&credential.username) {
            Some(account) if account.uses(credential) => account.clone(),
            _ => {
                let account = Arc::new(AccountSession::new(credential.clone()));
                accounts.insert(credential.username.clone(), account.clone());
                account
            }
        }
    }

    /// Start polling a pet and get a handle to its cached data.
    ///
    /// The first cycle runs immediately. If the pet is already registered,
    /// returns a handle to the existing registration. Pets sharing a
    /// username share the session of the first registration on that account.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register_pet(&self, credential: Credential, pet: Pet) -> PetHandle {
        // Fast path
        {
            let pets = self.pets.read();
            if let Some(registration) = pets.get(&pet.id) {
                return registration.handle.clone();
            }
        }

        let mut pets = self.pets.write();
        if let Some(registration) = pets.get(&pet.id) {
            return registration.handle.clone();
        }

        info!(pet = %pet, username = %credential.username, "Registering pet");

        let coordinator = Arc::new(PetCoordinator {
            state: Arc::new(PetState::new(pet.clone())),
            account: self.account(&credential),
            cloud: self.cloud.clone(),
            policy: self.policy,
            subscribers: self.subscribers.clone(),
            clock: self.clock.clone(),
            refresh: Notify::new(),
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = coordinator.clone().spawn(stop_rx);
        let handle = PetHandle { coordinator };

        pets.insert(
            pet.id,
            Registration {
                handle: handle.clone(),
                stop_tx,
                task,
            },
        );

        handle
    }

    /// Stop polling a pet and discard its cached snapshot.
    ///
    /// Returns `true` if the pet was registered. The account's session is
    /// dropped once its last pet is gone.
    pub fn deregister_pet(&self, pet: PetId) -> bool {
        let registration = self.pets.write().remove(&pet);
        let Some(registration) = registration else {
            return false;
        };

        let _ = registration.stop_tx.send(true);
        registration.task.abort();
        info!(pet = %registration.handle.pet(), "Deregistered pet");

        let pets = self.pets.read();
        self.accounts.write().retain(|username, _| {
            pets.values()
                .any(|r| r.handle.coordinator.account.username() == username)
        });

        true
    }

    /// Handle for a registered pet.
    pub fn handle(&self, pet: PetId) -> Option<PetHandle> {
        self.pets.read().get(&pet).map(|r| r.handle.clone())
    }

    /// Latest snapshot. `None` if the pet is unknown or has never been
    /// fetched successfully.
    pub fn get_snapshot(&self, pet: PetId) -> Option<Arc<Snapshot>> {
        self.handle(pet).and_then(|handle| handle.snapshot())
    }

    /// One metric of a pet's latest snapshot.
    pub fn metric(&self, pet: PetId, key: MetricKey) -> Option<MetricValue> {
        self.handle(pet).and_then(|handle| handle.metric(key))
    }

    /// Polling health of a pet.
    pub fn status(&self, pet: PetId) -> Option<PetStatus> {
        self.handle(pet).map(|handle| handle.status())
    }

    /// Ask for an immediate cycle. Returns false if the pet is unknown, a
    /// cycle is already in flight, or the pet is no longer polled.
    pub fn request_refresh(&self, pet: PetId) -> bool {
        self.handle(pet)
            .is_some_and(|handle| handle.request_refresh())
    }

    /// Every registered pet, ordered by id.
    pub fn pets(&self) -> Vec<Pet> {
        self.pets
            .read()
            .values()
            .map(|r| r.handle.pet().clone())
            .collect()
    }

    /// Log in and list the pets on an account.
    ///
    /// This is the setup flow: a rejected password surfaces as
    /// [`ClientError::Auth`] and is forgotten, so the caller can retry with
    /// corrected credentials. On success the session is kept for pets
    /// registered afterwards on the same account.
    pub async fn discover_pets(&self, credential: &Credential) -> Result<Vec<Pet>, ClientError> {
        let known = self
            .accounts
            .read()
            .get(&credential.username)
            .filter(|account| account.uses(credential))
            .cloned();
        let account =
            known.unwrap_or_else(|| Arc::new(AccountSession::new(credential.clone())));

        let pets = self.list_pets(&account).await?;

        // Only credentials that worked are kept
        let mut accounts = self.accounts.write();
        match accounts.get(&credential.username) {
            Some(current) if current.uses(credential) => {}
            _ => {
                accounts.insert(credential.username.clone(), account);
            }
        }
        Ok(pets)
    }

    async fn list_pets(&self, account: &AccountSession) -> Result<Vec<Pet>, ClientError> {
        let now = (self.clock)();
        let lease = account.acquire(&self.cloud, now).await?;
        match self.cloud.list_pets(&lease.session).await {
            Err(ClientError::AuthExpired) => {
                let fresh = account
                    .refresh(&self.cloud, Some(lease.generation), now)
                    .await?;
                self.cloud.list_pets(&fresh.session).await
            }
            result => result,
        }
    }
}

impl Drop for PetRegistry {
    fn drop(&mut self) {
        for registration in self.pets.get_mut().values() {
            registration.task.abort();
        }
    }
}

impl std::fmt::Debug for PetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PetRegistry")
            .field("policy", &self.policy)
            .field("pets", &self.pets())
            .finish()
    }
}

/// Builder for configuring a PetRegistry.
pub struct PetRegistryBuilder {
    client: Arc<dyn CloudClient>,
    policy: Option<BackoffPolicy>,
    call_timeout: Option<Duration>,
    subscribers: Vec<Arc<dyn SnapshotSubscriber>>,
    clock: Option<Clock>,
}

impl PetRegistryBuilder {
    /// Create a new builder.
    pub fn new(client: Arc<dyn CloudClient>) -> Self {
        Self {
            client,
            policy: None,
            call_timeout: None,
            subscribers: Vec::new(),
            clock: None,
        }
    }

    /// Set the polling backoff.
    ///
    /// Defaults to 5 minutes, backing off to at most 1 hour.
    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Bound on each network call. Defaults to 30 seconds.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Add a subscriber.
    ///
    /// Multiple subscribers can be added; every update goes to all of them.
    pub fn subscriber(mut self, subscriber: Arc<dyn SnapshotSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Replace the wall clock used for "now".
    pub fn clock(
        mut self,
        clock: impl Fn() -> chrono::DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        let clock: Clock = Arc::new(clock);
        self.clock = Some(clock);
        self
    }

    /// Build the registry.
    pub fn build(self) -> PetRegistry {
        PetRegistry {
            cloud: Cloud::new(
                self.client,
                self.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT),
            ),
            policy: self.policy.unwrap_or_default(),
            subscribers: Arc::new(self.subscribers),
            clock: self.clock.unwrap_or_else(|| Arc::new(Utc::now) as Clock),
            accounts: RwLock::new(BTreeMap::new()),
            pets: RwLock::new(BTreeMap::new()),
        }
    }
}
