//! Modification stamps and identifier allocation.
//!
//! Every mutable scene object carries its own [`ModifiedStamp`]. Caches record
//! the stamp they were built from and compare against the live one, always
//! paired with the owning object's identity so two objects never alias.

use serde::{Deserialize, Serialize};

/// Monotonically increasing modification counter owned by one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ModifiedStamp(u64);

impl ModifiedStamp {
    /// A stamp that has already been modified once, so fresh objects are
    /// always newer than an empty cache.
    pub fn new() -> Self {
        Self(1)
    }

    /// Record a modification.
    pub fn modified(&mut self) {
        self.0 += 1;
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// True if this stamp has advanced past `cached` (or nothing is cached).
    pub fn is_newer_than(&self, cached: Option<ModifiedStamp>) -> bool {
        cached.map_or(true, |c| self.0 > c.0)
    }
}

/// Identifier of a volume registered in a [`crate::scene::Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VolumeId(pub u32);

/// Hands out unique ids. Owned by the registry that creates the objects.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn allocate(&mut self) -> VolumeId {
        let id = VolumeId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}
