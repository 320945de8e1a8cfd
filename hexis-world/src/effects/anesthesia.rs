//! Anesthetised, wearing off into Groggy.

use hexis_core::query::CheckKind;
use hexis_core::{
    ActionCategory, Applicability, Effect, EffectContext, EffectRef, Expiry, OwnerEvent,
    OwnerEventKind, OwnerId, QueryTarget, View, World,
};
use serde::{Deserialize, Serialize};

use crate::capability::CheckModifier;

/// Tunable: seconds of unconsciousness per point of potency.
pub const SECONDS_PER_POTENCY_TUNABLE: &str = "anesthesia_seconds_per_potency";
/// Tunable: seconds of grogginess after waking.
pub const GROGGY_TUNABLE: &str = "groggy_seconds";
const DEFAULT_SECONDS_PER_POTENCY: f64 = 30.0;
const DEFAULT_GROGGY_SECONDS: f64 = 60.0;

/// Unconscious under a drug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anesthetised {
    /// Dose strength; scales how long the owner stays under.
    pub potency: u32,
}

/// Slow to react after waking from anesthesia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Groggy;

impl Anesthetised {
    /// Registered tag.
    pub const TAG: &'static str = "anesthetised";
}

impl Groggy {
    /// Registered tag.
    pub const TAG: &'static str = "groggy";
}

/// Put `owner` under. A stronger dose on an already anesthetised owner
/// extends the time asleep; a weaker one changes nothing.
///
/// # Errors
/// Returns an error if the owner does not exist.
pub fn anesthetise(
    world: &mut World,
    owner: OwnerId,
    potency: u32,
) -> hexis_core::Result<EffectRef> {
    let duration = world.config().tunable_secs_scaled(
        SECONDS_PER_POTENCY_TUNABLE,
        DEFAULT_SECONDS_PER_POTENCY,
        f64::from(potency),
    );

    let existing = world.first_of_type::<Anesthetised>(owner).map(|(target, _)| target);
    if let Some(existing) = existing {
        world.with_effect_mut::<Anesthetised, _>(existing, |a| a.potency = a.potency.max(potency));
        world.reschedule_if_longer(existing, duration)?;
        return Ok(existing);
    }
    world.add_effect(owner, Anesthetised { potency }, Some(duration))
}

impl Effect for Anesthetised {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            "You are unconscious.".to_string()
        } else {
            format!("{} is sprawled out, unconscious.", view.owner_name())
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
        cx.send_owner("Your eyelids grow heavy and the world slips away.");
        cx.emit(OwnerEvent::new(cx.owner(), OwnerEventKind::StateChanged));
    }

    fn expire_effect(&mut self, cx: &mut EffectContext<'_>) -> Expiry {
        cx.send_owner("You come to, groggy and slow.");
        Expiry::Transform {
            into: Box::new(Groggy),
            duration: Some(cx.tunable_secs(GROGGY_TUNABLE, DEFAULT_GROGGY_SECONDS)),
        }
    }

    fn removed_by(&self, event: &OwnerEvent) -> bool {
        event.is(OwnerEventKind::Died)
    }

    fn blocks(&self) -> &[ActionCategory] {
        &[ActionCategory::General, ActionCategory::Movement, ActionCategory::Combat]
    }

    fn blocking_description(&self, _category: ActionCategory, view: &View<'_>) -> String {
        if view.is_self() {
            "You are unconscious.".to_string()
        } else {
            format!("{} is unconscious.", view.owner_name())
        }
    }
}

impl Effect for Groggy {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            "You feel groggy.".to_string()
        } else {
            format!("{} looks groggy.", view.owner_name())
        }
    }

    fn unrecognised_target(&self) -> Applicability {
        Applicability::Applies
    }

    fn saving_effect(&self) -> bool {
        true
    }

    fn removal_effect(&mut self, cx: &mut EffectContext<'_>) {
        cx.send_owner("Your head clears.");
    }

    fn applies_to(&self, target: &QueryTarget) -> Applicability {
        match target {
            QueryTarget::Check(CheckKind::Crafting) => Applicability::DoesNotApply,
            QueryTarget::Check(_) => Applicability::Applies,
            _ => Applicability::Unrecognised,
        }
    }

    fn blocks(&self) -> &[ActionCategory] {
        &[ActionCategory::Combat]
    }

    fn blocking_description(&self, _category: ActionCategory, _view: &View<'_>) -> String {
        "You are still too groggy to fight.".to_string()
    }
}

impl CheckModifier for Groggy {
    fn check_bonus(&self, _check: CheckKind) -> f64 {
        -2.0
    }
}
