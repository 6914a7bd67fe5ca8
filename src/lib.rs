//! # pettrak
//!
//! A headless poller that mirrors AlphaTRAK pet glucose and activity logs
//! into per-pet snapshots.
//!
//! The heavy lifting lives in the member crates:
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌──────────────────┐
//! │ pettrak      │──▶│ pettrak-coordinator│──▶│ pettrak-client   │──▶ AlphaTRAK
//! │ (config,     │   │ (poll loops, cache,│   │ (login, pets,    │
//! │  CLI, export)│   │  backoff, sessions)│   │  activity lists) │
//! └──────────────┘   └─────────┬──────────┘   └──────────────────┘
//!                              ▼
//!                        pettrak-types
//!                 (records, snapshots, metrics)
//! ```
//!
//! This crate adds the host pieces:
//!
//! - **[`config`]**: layered [`Settings`] from a TOML file and `PETTRAK_*`
//!   environment variables
//! - **[`duration`]**: human duration strings such as `"5m"`
//! - **[`log_subscriber`]**: a [`SnapshotSubscriber`] that logs every update
//! - **[`export`]**: the JSON metric map printed by `pettrak --once`
//!
//! ## Usage
//!
//! ```bash
//! # Poll every pet on the configured accounts until Ctrl-C
//! pettrak --config pettrak.toml
//!
//! # Fetch once, print metrics as JSON, exit
//! pettrak --config pettrak.toml --once
//! ```
//!
//! [`SnapshotSubscriber`]: pettrak_coordinator::SnapshotSubscriber

pub mod config;
pub mod duration;
pub mod export;
pub mod log_subscriber;

pub use config::{AccountSettings, ConfigError, Settings};
pub use log_subscriber::LogSubscriber;
