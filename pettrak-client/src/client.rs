//! The cloud client contract.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pettrak_types::{Pet, RawEvent, RawReading};

use crate::ClientError;

/// Account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated session.
///
/// Produced by [`CloudClient::login`] and replaced wholesale on re-login.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    obtained_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a session with no known expiry.
    pub fn new(token: impl Into<String>, obtained_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            obtained_at,
            expires_at: None,
        }
    }

    /// Set the expiry reported by the service.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// When the session was issued.
    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    /// When the service said the session stops working, if it said.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns true if the expiry metadata says the token is dead.
    ///
    /// Sessions without expiry metadata never report expired; the service
    /// tells us with a 401 instead.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Access to the pet-health cloud service.
///
/// Implementations perform network I/O only: no caching across calls and no
/// retries. [`ClientError::AuthExpired`] must be kept distinct from network
/// and server failures so the caller can re-login exactly once.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Exchange credentials for a session.
    async fn login(&self, credential: &Credential) -> Result<Session, ClientError>;

    /// List the pets on the account. An empty list is a valid answer.
    async fn list_pets(&self, session: &Session) -> Result<Vec<Pet>, ClientError>;

    /// Glucose readings taken at or after `since`, in source order.
    async fn fetch_readings(
        &self,
        session: &Session,
        pet: &Pet,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawReading>, ClientError>;

    /// Activity-log entries recorded at or after `since`, in source order.
    async fn fetch_events(
        &self,
        session: &Session,
        pet: &Pet,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, ClientError>;

    /// Readings and events since `since`, taken from one view of the service.
    ///
    /// The default makes two calls. Services that return both in a single
    /// response should override it.
    async fn fetch_records(
        &self,
        session: &Session,
        pet: &Pet,
        since: DateTime<Utc>,
    ) -> Result<Records, ClientError> {
        let readings = self.fetch_readings(session, pet, since).await?;
        let events = self.fetch_events(session, pet, since).await?;
        Ok(Records { readings, events })
    }
}

/// Raw records from one fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Records {
    pub readings: Vec<RawReading>,
    pub events: Vec<RawEvent>,
}
