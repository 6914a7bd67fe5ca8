//! Per-account session sharing.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use pettrak_client::{ClientError, Credential, Session};

use crate::cloud::Cloud;

/// A session together with the generation it was issued under.
#[derive(Debug, Clone)]
pub(crate) struct SessionLease {
    pub(crate) session: Session,
    pub(crate) generation: u64,
}

/// The session shared by every pet on one account.
///
/// Readers take the current session under a read lock. Logins
/// run one at a time per account; a caller that finds a newer generation
/// than the one it saw fail reuses it instead of logging in again.
pub(crate) struct AccountSession {
    credential: Credential,
    current: RwLock<Option<SessionLease>>,
    login_lock: tokio::sync::Mutex<()>,
}

impl AccountSession {
    pub(crate) fn new(credential: Credential) -> Self {
        Self {
            credential,
            current: RwLock::new(None),
            login_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub(crate) fn username(&self) -> &str {
        &self.credential.username
    }

    /// Whether this account logs in with `credential`.
    pub(crate) fn uses(&self, credential: &Credential) -> bool {
        self.credential == *credential
    }

    fn peek(&self) -> Option<SessionLease> {
        self.current.read().clone()
    }

    /// A usable session, logging in if there is none or it has expired.
    pub(crate) async fn acquire(
        &self,
        cloud: &Cloud,
        now: DateTime<Utc>,
    ) -> Result<SessionLease, ClientError> {
        match self.peek() {
            Some(lease) if !lease.session.is_expired(now) => Ok(lease),
            Some(lease) => self.refresh(cloud, Some(lease.generation), now).await,
            None => self.refresh(cloud, None, now).await,
        }
    }

    /// Replace the session of generation `stale`.
    pub(crate) async fn refresh(
        &self,
        cloud: &Cloud,
        stale: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<SessionLease, ClientError> {
        let _guard = self.login_lock.lock().await;

        if let Some(lease) = self.peek() {
            if Some(lease.generation) != stale && !lease.session.is_expired(now) {
                return Ok(lease);
            }
        }

        info!(username = %self.username(), "Logging in");
        let session = cloud.login(&self.credential).await?;

        let mut current = self.current.write();
        let generation = current.as_ref().map_or(1, |lease| lease.generation + 1);
        let lease = SessionLease {
            session,
            generation,
        };
        *current = Some(lease.clone());
        Ok(lease)
    }
}

impl std::fmt::Debug for AccountSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSession")
            .field("username", &self.credential.username)
            .field("generation", &self.peek().map(|lease| lease.generation))
            .finish()
    }
}
