//! Pre-action checks: "can this owner do that right now?"
//!
//! Command handlers ask the gate before acting. A refusal carries the
//! player-facing explanation from the blocking effect.

use hexis_core::{ActionCategory, EffectRef, OwnerId, World};
use thiserror::Error;
use tracing::debug;

/// Why an action was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Refusal {
    /// The effect that blocked the action.
    pub effect: EffectRef,
    /// Its registered type tag.
    pub effect_type: &'static str,
    /// Text to show the actor.
    pub message: String,
}

/// Checks actions against the actor's blocking effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandGate;

impl CommandGate {
    /// Allow the action, or explain why not.
    ///
    /// The first blocking effect in the actor's insertion order wins.
    ///
    /// # Errors
    /// Returns a [`Refusal`] if any applicable effect blocks `category`.
    pub fn check(world: &World, actor: OwnerId, category: ActionCategory) -> Result<(), Refusal> {
        let Some(blocked) = world.blocking_effect(actor, category, Some(actor)) else {
            return Ok(());
        };
        debug!(
            actor = %actor,
            category = %category,
            effect = blocked.effect_type,
            "action refused"
        );
        Err(Refusal {
            effect: blocked.effect,
            effect_type: blocked.effect_type,
            message: blocked.message,
        })
    }

    /// Every refusal `actor` would get for `category`, in insertion order.
    #[must_use]
    pub fn all_refusals(world: &World, actor: OwnerId, category: ActionCategory) -> Vec<Refusal> {
        world
            .blocking_effects(actor, category, Some(actor))
            .into_iter()
            .map(|b| Refusal {
                effect: b.effect,
                effect_type: b.effect_type,
                message: b.message,
            })
            .collect()
    }
}
