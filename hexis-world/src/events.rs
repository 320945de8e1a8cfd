//! Game events and their translation into owner life-cycle events.
//!
//! Game code reports what happened in its own terms; the effect engine only
//! understands [`OwnerEvent`]s. One game event may concern several owners
//! (both sides of a fight) or several kinds of change (a move that also
//! changes room), so translation produces a list.

use hexis_core::{OwnerEvent, OwnerEventKind, OwnerId};

/// A game event that can end or trigger effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// An owner moved, possibly into another room.
    Moved {
        /// Who moved.
        who: OwnerId,
        /// Room before the move.
        from: OwnerId,
        /// Room after the move.
        to: OwnerId,
    },

    /// An owner died.
    Died {
        /// Who died.
        who: OwnerId,
        /// Who killed them, if anyone did.
        killer: Option<OwnerId>,
    },

    /// A fight started.
    CombatStarted {
        /// Who attacked.
        attacker: OwnerId,
        /// Who was attacked.
        defender: OwnerId,
    },

    /// A fight ended for everyone listed.
    CombatEnded {
        /// Everyone leaving the fight.
        participants: Vec<OwnerId>,
    },

    /// An owner changed posture or consciousness.
    StateChanged {
        /// Whose state changed.
        who: OwnerId,
        /// What it changed to, for logs.
        state: String,
    },

    /// An owner's session disconnected.
    Quit {
        /// Who quit.
        who: OwnerId,
    },

    /// An item entered or left an owner's inventory.
    InventoryChanged {
        /// Whose inventory changed.
        who: OwnerId,
        /// The item.
        item: OwnerId,
    },
}

impl GameEvent {
    /// The owner this event is mainly about.
    #[must_use]
    pub fn primary(&self) -> Option<OwnerId> {
        match self {
            Self::Moved { who, .. }
            | Self::Died { who, .. }
            | Self::StateChanged { who, .. }
            | Self::Quit { who }
            | Self::InventoryChanged { who, .. } => Some(*who),
            Self::CombatStarted { attacker, .. } => Some(*attacker),
            Self::CombatEnded { participants } => participants.first().copied(),
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Moved { .. } => "moved",
            Self::Died { .. } => "died",
            Self::CombatStarted { .. } => "combat_started",
            Self::CombatEnded { .. } => "combat_ended",
            Self::StateChanged { .. } => "state_changed",
            Self::Quit { .. } => "quit",
            Self::InventoryChanged { .. } => "inventory_changed",
        }
    }

    /// Owner events this game event raises, in the order they should be
    /// emitted.
    #[must_use]
    pub fn owner_events(&self) -> Vec<OwnerEvent> {
        match self {
            Self::Moved { who, from, to } => {
                let mut events =
                    vec![OwnerEvent::with_counterpart(*who, OwnerEventKind::Moved, *to)];
                if from != to {
                    events.push(OwnerEvent::with_counterpart(
                        *who,
                        OwnerEventKind::LocationChanged,
                        *to,
                    ));
                }
                events
            }
            Self::Died { who, killer } => vec![match killer {
                Some(killer) => OwnerEvent::with_counterpart(*who, OwnerEventKind::Died, *killer),
                None => OwnerEvent::new(*who, OwnerEventKind::Died),
            }],
            Self::CombatStarted { attacker, defender } => vec![
                OwnerEvent::with_counterpart(*attacker, OwnerEventKind::JoinedCombat, *defender),
                OwnerEvent::with_counterpart(*defender, OwnerEventKind::JoinedCombat, *attacker),
            ],
            Self::CombatEnded { participants } => participants
                .iter()
                .map(|who| OwnerEvent::new(*who, OwnerEventKind::LeftCombat))
                .collect(),
            Self::StateChanged { who, .. } => {
                vec![OwnerEvent::new(*who, OwnerEventKind::StateChanged)]
            }
            Self::Quit { who } => vec![OwnerEvent::new(*who, OwnerEventKind::Quit)],
            Self::InventoryChanged { who, item } => {
                vec![OwnerEvent::with_counterpart(*who, OwnerEventKind::InventoryChanged, *item)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: OwnerId = OwnerId(1);
    const B: OwnerId = OwnerId(2);
    const ROOM: OwnerId = OwnerId(100);
    const YARD: OwnerId = OwnerId(101);

    #[test]
    fn move_within_room_is_not_a_location_change() {
        let within = GameEvent::Moved {
            who: A,
            from: ROOM,
            to: ROOM,
        };
        assert_eq!(within.owner_events().len(), 1);

        let across = GameEvent::Moved {
            who: A,
            from: ROOM,
            to: YARD,
        };
        let kinds: Vec<_> = across.owner_events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![OwnerEventKind::Moved, OwnerEventKind::LocationChanged]);
    }

    #[test]
    fn combat_involves_both_sides() {
        let events = GameEvent::CombatStarted {
            attacker: A,
            defender: B,
        }
        .owner_events();
        assert_eq!(events[0].source, A);
        assert_eq!(events[0].counterpart, Some(B));
        assert_eq!(events[1].source, B);
        assert_eq!(events[1].counterpart, Some(A));
    }

    #[test]
    fn primary_owner() {
        assert_eq!(GameEvent::CombatEnded { participants: vec![] }.primary(), None);
        assert_eq!(GameEvent::Quit { who: B }.primary(), Some(B));
        assert_eq!(GameEvent::Died { who: A, killer: Some(B) }.label(), "died");
    }
}
