//! Constructors game systems call where things happen.
//!
//! Movement, combat, the death handler and the session layer each build a
//! [`GameEvent`] here and hand it to [`crate::systems::observe_event`].

use hexis_core::OwnerId;

use crate::events::GameEvent;

/// Create a movement event from the movement system.
#[must_use]
pub fn on_moved(who: OwnerId, from: OwnerId, to: OwnerId) -> GameEvent {
    GameEvent::Moved { who, from, to }
}

/// Create a death event.
#[must_use]
pub fn on_died(who: OwnerId, killer: Option<OwnerId>) -> GameEvent {
    GameEvent::Died { who, killer }
}

/// Create a combat-start event from the combat system.
#[must_use]
pub fn on_combat_started(attacker: OwnerId, defender: OwnerId) -> GameEvent {
    GameEvent::CombatStarted { attacker, defender }
}

/// Create a combat-end event.
#[must_use]
pub fn on_combat_ended(participants: Vec<OwnerId>) -> GameEvent {
    GameEvent::CombatEnded { participants }
}

/// Create a posture/consciousness change (stood, slept, fainted).
#[must_use]
pub fn on_state_changed(who: OwnerId, state: impl Into<String>) -> GameEvent {
    GameEvent::StateChanged {
        who,
        state: state.into(),
    }
}

/// Create a disconnect event from the session layer.
#[must_use]
pub fn on_quit(who: OwnerId) -> GameEvent {
    GameEvent::Quit { who }
}

/// Create an inventory change from the item system.
#[must_use]
pub fn on_inventory_changed(who: OwnerId, item: OwnerId) -> GameEvent {
    GameEvent::InventoryChanged { who, item }
}
