//! Timeout-bounded access to the cloud client.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use pettrak_client::{ClientError, CloudClient, Credential, Records, Session};
use pettrak_types::Pet;

/// Default bound on a single network call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A cloud client whose calls each carry a timeout.
#[derive(Clone)]
pub(crate) struct Cloud {
    client: Arc<dyn CloudClient>,
    call_timeout: Duration,
}

impl Cloud {
    pub(crate) fn new(client: Arc<dyn CloudClient>, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or_else(|_| Err(ClientError::Timeout))
    }

    pub(crate) async fn login(&self, credential: &Credential) -> Result<Session, ClientError> {
        self.bounded(self.client.login(credential)).await
    }

    pub(crate) async fn list_pets(&self, session: &Session) -> Result<Vec<Pet>, ClientError> {
        self.bounded(self.client.list_pets(session)).await
    }

    pub(crate) async fn fetch_records(
        &self,
        session: &Session,
        pet: &Pet,
        since: DateTime<Utc>,
    ) -> Result<Records, ClientError> {
        self.bounded(self.client.fetch_records(session, pet, since))
            .await
    }
}
