//! Outbound notifications to the host's entity layer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use pettrak_types::{Pet, Snapshot};

use crate::status::UnavailableReason;

/// Receives snapshot changes.
///
/// Callbacks run on the pet's poll task, so they must return quickly and
/// never block.
pub trait SnapshotSubscriber: Send + Sync {
    /// A new snapshot replaced the cached one.
    fn on_snapshot_changed(&self, pet: &Pet, snapshot: &Arc<Snapshot>);

    /// The pet will not be polled again.
    fn on_pet_unavailable(&self, pet: &Pet, reason: &UnavailableReason);
}

/// An update delivered through a [`ChannelSubscriber`].
#[derive(Debug, Clone)]
pub enum PetUpdate {
    Snapshot { pet: Pet, snapshot: Arc<Snapshot> },
    Unavailable { pet: Pet, reason: UnavailableReason },
}

impl PetUpdate {
    pub fn pet(&self) -> &Pet {
        match self {
            PetUpdate::Snapshot { pet, .. } | PetUpdate::Unavailable { pet, .. } => pet,
        }
    }
}

/// Forwards updates through a bounded channel.
///
/// Delivery is best effort: when the receiver falls behind, updates are
/// dropped rather than stalling the poll loop.
///
/// # Example
///
/// ```rust
/// use pettrak_coordinator::ChannelSubscriber;
///
/// let (subscriber, mut rx) = ChannelSubscriber::channel(16);
///
/// // Later, receive updates
/// // while let Some(update) = rx.recv().await {
/// //     println!("{} changed", update.pet());
/// // }
/// ```
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::Sender<PetUpdate>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiver its updates arrive on.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<PetUpdate>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    fn send(&self, update: PetUpdate) {
        if let Err(mpsc::error::TrySendError::Full(update)) = self.tx.try_send(update) {
            warn!(pet = %update.pet(), "Update channel full, dropping update");
        }
    }
}

impl SnapshotSubscriber for ChannelSubscriber {
    fn on_snapshot_changed(&self, pet: &Pet, snapshot: &Arc<Snapshot>) {
        self.send(PetUpdate::Snapshot {
            pet: pet.clone(),
            snapshot: snapshot.clone(),
        });
    }

    fn on_pet_unavailable(&self, pet: &Pet, reason: &UnavailableReason) {
        self.send(PetUpdate::Unavailable {
            pet: pet.clone(),
            reason: reason.clone(),
        });
    }
}
