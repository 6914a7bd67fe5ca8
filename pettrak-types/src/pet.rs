//! Pet identity.

use core::fmt;
use core::str::FromStr;

/// Stable identifier the cloud service assigns to a pet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PetId(pub u64);

impl PetId {
    /// Create a pet id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric id.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PetId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for PetId {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// A pet registered on a cloud account.
///
/// Pets are immutable once discovered; a renamed pet shows up as the same
/// [`PetId`] with a new name on the next discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pet {
    /// Stable identifier.
    pub id: PetId,

    /// Display name. Falls back to `"Pet <id>"` when the service has none.
    pub name: String,
}

impl Pet {
    /// Create a pet.
    pub fn new(id: impl Into<PetId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Create a pet without a known name.
    pub fn unnamed(id: impl Into<PetId>) -> Self {
        let id = id.into();
        Self {
            id,
            name: format!("Pet {}", id),
        }
    }
}

impl fmt::Display for Pet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
