//! # pettrak-client
//!
//! Cloud access for pet glucose and activity data.
//!
//! This crate defines the [`CloudClient`] contract the coordinator polls
//! through, plus a ready-to-use implementation for the AlphaTRAK service.
//! Clients do network I/O and decoding only; retry, backoff and re-login are
//! the caller's business.
//!
//! ## Supported Services
//!
//! - **AlphaTRAK** (`alphatrak` feature, on by default) - Logs in with the
//!   account's credentials and reads glucose readings and the activity log
//!   through the mobile app's API
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pettrak_client::alphatrak::AlphaTrakClient;
//! use pettrak_client::{CloudClient, Credential};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AlphaTrakClient::builder()
//!         .timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     let session = client
//!         .login(&Credential::new("owner@example.com", "secret"))
//!         .await?;
//!     let pets = client.list_pets(&session).await?;
//!
//!     println!("Account has {} pets", pets.len());
//!     Ok(())
//! }
//! ```

mod client;
pub mod error;

#[cfg(feature = "alphatrak")]
pub mod alphatrak;

pub use client::{CloudClient, Credential, Records, Session};
pub use error::ClientError;

// Re-export types for convenience
pub use pettrak_types::{Pet, PetId, RawEvent, RawReading};
