//! Hidden: the owner is concealed from everyone who has not spotted it.

use hexis_core::query::CheckKind;
use hexis_core::{
    Applicability, Effect, EffectContext, EffectRef, HexisError, OwnerEvent, OwnerEventKind,
    OwnerId, QueryTarget, View, World,
};
use serde::{Deserialize, Serialize};

use crate::capability::{CheckModifier, ObscuresPerception};

/// Concealment with a per-observer spotted list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hidden {
    /// How hard the hiding place is to search.
    pub difficulty: u32,
    /// Observers who have already seen through it.
    #[serde(default)]
    pub spotted: Vec<OwnerId>,
}

impl Hidden {
    /// Registered tag.
    pub const TAG: &'static str = "hidden";

    /// Whether `observer` has already spotted the owner.
    #[must_use]
    pub fn spotted_by(&self, observer: OwnerId) -> bool {
        self.spotted.contains(&observer)
    }
}

/// Hide `owner`. An owner already hiding keeps its existing effect.
///
/// # Errors
/// Returns an error if the owner does not exist.
pub fn hide(world: &mut World, owner: OwnerId, difficulty: u32) -> hexis_core::Result<EffectRef> {
    let existing = world.first_of_type::<Hidden>(owner).map(|(target, _)| target);
    match existing {
        Some(existing) => Ok(existing),
        None => world.add_effect(
            owner,
            Hidden {
                difficulty,
                spotted: Vec::new(),
            },
            None,
        ),
    }
}

/// Record that `observer` has spotted `target`.
///
/// Returns `false` if the target was not hiding or the observer had already
/// spotted it.
///
/// # Errors
/// Returns [`HexisError::OwnerNotFound`] if the observer does not exist.
pub fn spot(world: &mut World, target: OwnerId, observer: OwnerId) -> hexis_core::Result<bool> {
    if world.owner(observer).is_none() {
        return Err(HexisError::OwnerNotFound(observer));
    }
    let Some(hidden) = world.first_of_type::<Hidden>(target).map(|(effect, _)| effect) else {
        return Ok(false);
    };
    let added = world
        .with_effect_mut::<Hidden, _>(hidden, |h| {
            if h.spotted_by(observer) {
                false
            } else {
                h.spotted.push(observer);
                true
            }
        })
        .unwrap_or(false);
    Ok(added)
}

impl Effect for Hidden {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            "You are hidden.".to_string()
        } else {
            format!("{} is hiding here.", view.owner_name())
        }
    }

    fn unrecognised_target(&self) -> Applicability {
        Applicability::Applies
    }

    fn saving_effect(&self) -> bool {
        true
    }

    fn save_definition(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    fn initial_effect(&mut self, cx: &mut EffectContext<'_>) {
        cx.send_owner("You slip out of sight.");
    }

    fn removal_effect(&mut self, cx: &mut EffectContext<'_>) {
        cx.send_owner("You are no longer hidden.");
    }

    fn removed_by(&self, event: &OwnerEvent) -> bool {
        matches!(event.kind, OwnerEventKind::JoinedCombat | OwnerEventKind::Died)
    }

    fn applies_to(&self, target: &QueryTarget) -> Applicability {
        match target {
            QueryTarget::Character(observer) => {
                Applicability::from_bool(!self.spotted_by(*observer))
            }
            QueryTarget::Check(CheckKind::Stealth) => Applicability::Applies,
            QueryTarget::Check(_) => Applicability::DoesNotApply,
            _ => Applicability::Unrecognised,
        }
    }
}

impl ObscuresPerception for Hidden {
    fn hides_from(&self, observer: OwnerId) -> bool {
        !self.spotted_by(observer)
    }
}

impl CheckModifier for Hidden {
    fn check_bonus(&self, check: CheckKind) -> f64 {
        match check {
            CheckKind::Stealth => f64::from(self.difficulty) / 10.0,
            _ => 0.0,
        }
    }
}
