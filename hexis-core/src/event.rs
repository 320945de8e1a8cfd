//! Owner life-cycle events.
//!
//! The vocabulary is fixed: games translate their own richer events into
//! these before handing them to [`crate::World::emit`].

use serde::{Deserialize, Serialize};

use crate::types::OwnerId;

/// Kinds of life-cycle event an owner can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerEventKind {
    /// The owner was removed from the world permanently.
    Destroyed,
    /// The owner's session disconnected.
    Quit,
    /// The owner died.
    Died,
    /// The owner moved (changed position, possibly within a room).
    Moved,
    /// The owner's posture or consciousness changed (woke, sat, fainted).
    StateChanged,
    /// The owner entered combat.
    JoinedCombat,
    /// The owner left combat.
    LeftCombat,
    /// Something was added to or removed from the owner's inventory.
    InventoryChanged,
    /// The owner changed location (entered another room).
    LocationChanged,
}

impl OwnerEventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Destroyed,
        Self::Quit,
        Self::Died,
        Self::Moved,
        Self::StateChanged,
        Self::JoinedCombat,
        Self::LeftCombat,
        Self::InventoryChanged,
        Self::LocationChanged,
    ];
}

/// A life-cycle event raised by one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerEvent {
    /// The owner the event happened to.
    pub source: OwnerId,
    /// What happened.
    pub kind: OwnerEventKind,
    /// Another owner involved, if any (combat opponent, destination room).
    pub counterpart: Option<OwnerId>,
}

impl OwnerEvent {
    /// An event with no counterpart.
    #[must_use]
    pub const fn new(source: OwnerId, kind: OwnerEventKind) -> Self {
        Self {
            source,
            kind,
            counterpart: None,
        }
    }

    /// An event involving a second owner.
    #[must_use]
    pub const fn with_counterpart(
        source: OwnerId,
        kind: OwnerEventKind,
        counterpart: OwnerId,
    ) -> Self {
        Self {
            source,
            kind,
            counterpart: Some(counterpart),
        }
    }

    /// Whether this event is of the given kind.
    #[must_use]
    pub fn is(&self, kind: OwnerEventKind) -> bool {
        self.kind == kind
    }
}
