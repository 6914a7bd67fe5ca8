//! One pet's poll cycle and the task that schedules it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pettrak_client::{ClientError, Records, Session};
use pettrak_types::{Pet, Snapshot, ROLLING_WINDOW_DAYS};

use crate::aggregate::{aggregate, carry_forward};
use crate::backoff::BackoffPolicy;
use crate::cache::{CycleTicket, PetState};
use crate::cloud::Cloud;
use crate::session::AccountSession;
use crate::status::UnavailableReason;
use crate::subscriber::SnapshotSubscriber;

/// Source of "now" for a registry.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Outcome of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Success(Arc<Snapshot>),
    /// The session was rejected, even after one re-login.
    AuthExpired,
    TransientFailure(String),
    PermanentFailure(PermanentReason),
}

/// Failures a retry will not fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermanentReason {
    /// The pet is gone from the account; polling stops.
    PetRemoved,
    /// A required field was missing or malformed; the cycle is skipped.
    Schema(String),
}

impl From<ClientError> for FetchResult {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::AuthExpired => FetchResult::AuthExpired,
            ClientError::PetRemoved(_) => FetchResult::PermanentFailure(PermanentReason::PetRemoved),
            ClientError::Schema(message) => {
                FetchResult::PermanentFailure(PermanentReason::Schema(message))
            }
            other => FetchResult::TransientFailure(other.to_string()),
        }
    }
}

/// Everything needed to poll one pet.
pub(crate) struct PetCoordinator {
    pub(crate) state: Arc<PetState>,
    pub(crate) account: Arc<AccountSession>,
    pub(crate) cloud: Cloud,
    pub(crate) policy: BackoffPolicy,
    pub(crate) subscribers: Arc<Vec<Arc<dyn SnapshotSubscriber>>>,
    pub(crate) clock: Clock,
    pub(crate) refresh: Notify,
}

impl PetCoordinator {
    pub(crate) fn pet(&self) -> &Pet {
        self.state.pet()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Run one cycle. Returns `None` if another cycle was already in flight
    /// or the pet is no longer polled.
    pub(crate) async fn run_cycle(&self) -> Option<FetchResult> {
        let _in_flight = self.state.enter()?;
        if !self.state.is_active() {
            return None;
        }
        let ticket = self.state.begin_cycle();
        let now = self.now();
        debug!(pet = %self.pet(), "Starting poll cycle");

        let lease = match self.account.acquire(&self.cloud, now).await {
            Ok(lease) => lease,
            Err(err) => {
                let result = FetchResult::TransientFailure(format!("login failed: {}", err));
                self.apply(ticket, &result, now);
                return Some(result);
            }
        };

        let mut result = self.fetch(&lease.session, now).await;

        if matches!(result, FetchResult::AuthExpired) {
            info!(pet = %self.pet(), "Session expired, logging in again");
            result = match self
                .account
                .refresh(&self.cloud, Some(lease.generation), now)
                .await
            {
                Ok(fresh) => self.fetch(&fresh.session, now).await,
                Err(err) => FetchResult::TransientFailure(format!("re-login failed: {}", err)),
            };
        }

        self.apply(ticket, &result, now);
        Some(result)
    }

    async fn fetch(&self, session: &Session, now: DateTime<Utc>) -> FetchResult {
        let since = now - Duration::days(ROLLING_WINDOW_DAYS);

        let Records { readings, events } =
            match self.cloud.fetch_records(session, self.pet(), since).await {
                Ok(records) => records,
                Err(err) => return err.into(),
            };

        debug!(
            pet = %self.pet(),
            readings = readings.len(),
            events = events.len(),
            "Fetched records"
        );

        let mut snapshot = aggregate(&readings, &events, now);
        if let Some(previous) = self.state.snapshot() {
            carry_forward(&mut snapshot, &previous);
        }
        FetchResult::Success(Arc::new(snapshot))
    }

    fn apply(&self, ticket: CycleTicket, result: &FetchResult, now: DateTime<Utc>) {
        let pet = self.pet();
        match result {
            FetchResult::Success(snapshot) => {
                if self.state.record_success(ticket, snapshot.clone(), now) {
                    debug!(pet = %pet, "Snapshot updated");
                    for subscriber in self.subscribers.iter() {
                        subscriber.on_snapshot_changed(pet, snapshot);
                    }
                } else {
                    debug!(pet = %pet, "Dropping result of superseded cycle");
                }
            }
            FetchResult::AuthExpired => {
                self.fail(ticket, "session rejected after re-login".to_string());
            }
            FetchResult::TransientFailure(reason) => {
                self.fail(ticket, reason.clone());
            }
            FetchResult::PermanentFailure(PermanentReason::Schema(message)) => {
                error!(pet = %pet, error = %message, "Malformed response, skipping cycle");
                self.fail(ticket, format!("Malformed response: {}", message));
            }
            FetchResult::PermanentFailure(PermanentReason::PetRemoved) => {
                error!(pet = %pet, "Pet was removed from the account, stopping polling");
                let reason = UnavailableReason::PetRemoved;
                self.state.mark_unavailable(reason.clone());
                for subscriber in self.subscribers.iter() {
                    subscriber.on_pet_unavailable(pet, &reason);
                }
            }
        }
    }

    fn fail(&self, ticket: CycleTicket, reason: String) {
        if let Some(failures) = self.state.record_failure(ticket, reason.clone()) {
            warn!(
                pet = %self.pet(),
                failures,
                retry_in = ?self.policy.interval(failures),
                error = %reason,
                "Poll cycle failed"
            );
        }
    }

    /// Ask for a cycle now. Ignored while one is in flight.
    pub(crate) fn request_refresh(&self) -> bool {
        if self.state.is_in_flight() || !self.state.is_active() {
            debug!(pet = %self.pet(), "Refresh coalesced");
            return false;
        }
        self.refresh.notify_one();
        true
    }

    /// Spawn the poll loop: one cycle right away, then one per interval,
    /// until the pet becomes unavailable or `stop` fires.
    pub(crate) fn spawn(self: Arc<Self>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.run_cycle().await;

                if !self.state.is_active() {
                    break;
                }

                let delay = self.policy.interval(self.state.consecutive_failures());
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.refresh.notified() => {
                        debug!(pet = %self.pet(), "Manual refresh");
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }

                // A cycle run through the handle may have found the pet gone
                if !self.state.is_active() {
                    break;
                }
            }
            debug!(pet = %self.pet(), "Poll loop stopped");
        })
    }
}
