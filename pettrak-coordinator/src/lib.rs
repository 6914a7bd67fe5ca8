//! # pettrak-coordinator
//!
//! Polling coordinator for pet glucose and activity data.
//!
//! This crate turns a [`CloudClient`](pettrak_client::CloudClient) into a set
//! of per-pet caches that the host reads without touching the network.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use pettrak_client::alphatrak::AlphaTrakClient;
//! use pettrak_client::Credential;
//! use pettrak_coordinator::PetRegistry;
//! use pettrak_types::{MetricKey, Pet, PetId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(AlphaTrakClient::builder().build()?);
//!     let registry = PetRegistry::builder(client).build();
//!
//!     // Register a pet; its first cycle starts right away
//!     let credential = Credential::new("owner@example.com", "secret");
//!     registry.register_pet(credential, Pet::new(PetId(42), "Fluffy"));
//!
//!     // ... later, read from the cache ...
//!     let level = registry.metric(PetId(42), MetricKey::GlucoseLevel);
//!     println!("glucose: {:?}", level);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **One task per pet**: A slow or failing pet never delays another
//! - **Exponential backoff**: Failed cycles back off up to a cap and reset on success
//! - **Shared sessions**: Pets on one account log in once; an expired session
//!   is renewed by exactly one re-login
//! - **Ordered updates**: A cycle that finishes late never overwrites a newer snapshot

mod aggregate;
mod backoff;
mod cache;
mod cloud;
mod coordinator;
mod handle;
mod registry;
mod session;
mod status;
mod subscriber;

pub use aggregate::{aggregate, carry_forward};
pub use backoff::{BackoffPolicy, DEFAULT_BASE_INTERVAL, DEFAULT_MAX_INTERVAL};
pub use cloud::DEFAULT_CALL_TIMEOUT;
pub use coordinator::{Clock, FetchResult, PermanentReason};
pub use handle::PetHandle;
pub use registry::{PetRegistry, PetRegistryBuilder};
pub use status::{Availability, PetStatus, UnavailableReason};
pub use subscriber::{ChannelSubscriber, PetUpdate, SnapshotSubscriber};

// Re-export types for convenience
pub use pettrak_types::{MetricKey, MetricValue, Pet, PetId, Snapshot};
