//! Error types for cloud clients.

use pettrak_types::PetId;
use thiserror::Error;

/// Errors that can occur when talking to the cloud service.
///
/// The coordinator decides what to do with each variant; clients never
/// retry on their own.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Username or password rejected. Terminal until the user re-enters them.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The session token is no longer accepted. One re-login may fix it.
    #[error("Session expired")]
    AuthExpired,

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Network(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The service answered with an error.
    #[error("Server error: {0}")]
    Server(String),

    /// A field required for correctness is missing or malformed.
    #[error("Malformed response: {0}")]
    Schema(String),

    /// The pet no longer exists on the account.
    #[error("Pet {0} was removed from the account")]
    PetRemoved(PetId),

    /// The client could not be constructed.
    #[error("Invalid client configuration: {0}")]
    Config(String),
}

#[cfg(feature = "alphatrak")]
impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Schema(err.to_string())
        } else if err.is_builder() {
            ClientError::Config(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}
