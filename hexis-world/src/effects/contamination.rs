//! Contaminated: a substance clinging to the owner until it wears off.

use std::time::Duration;

use hexis_core::{Applicability, Effect, EffectContext, EffectRef, OwnerId, View, World};
use serde::{Deserialize, Serialize};

use crate::capability::{AddsWeight, DescriptionAddendum};

/// Kilograms of weight per unit of substance.
const WEIGHT_PER_UNIT: f64 = 0.1;

/// A coating of some substance. One effect per substance per owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contaminated {
    /// What the owner is covered in.
    pub substance: String,
    /// How much of it.
    pub amount: f64,
}

impl Contaminated {
    /// Registered tag.
    pub const TAG: &'static str = "contaminated";

    fn coverage(&self) -> &'static str {
        if self.amount >= 10.0 { "drenched in" } else { "spattered with" }
    }
}

/// Coat `owner` in `amount` of `substance` for at least `duration`.
///
/// Repeated contamination with the same substance adds to the existing
/// coating and only ever extends its lifetime.
///
/// # Errors
/// Returns an error if the owner does not exist.
pub fn contaminate(
    world: &mut World,
    owner: OwnerId,
    substance: &str,
    amount: f64,
    duration: Duration,
) -> hexis_core::Result<EffectRef> {
    let existing = world
        .effects_of_type::<Contaminated>(owner)
        .into_iter()
        .find(|(_, c)| c.substance == substance)
        .map(|(target, _)| target);

    if let Some(existing) = existing {
        world.with_effect_mut::<Contaminated, _>(existing, |c| c.amount += amount);
        world.reschedule_if_longer(existing, duration)?;
        return Ok(existing);
    }
    world.add_effect(
        owner,
        Contaminated {
            substance: substance.to_string(),
            amount,
        },
        Some(duration),
    )
}

impl Effect for Contaminated {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            format!("You are {} {}.", self.coverage(), self.substance)
        } else {
            format!("{} is {} {}.", view.owner_name(), self.coverage(), self.substance)
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

    fn removal_effect(&mut self, cx: &mut EffectContext<'_>) {
        cx.send_owner(format!("The last of the {} wears off.", self.substance));
    }
}

impl AddsWeight for Contaminated {
    fn added_weight(&self) -> f64 {
        self.amount * WEIGHT_PER_UNIT
    }
}

impl DescriptionAddendum for Contaminated {
    fn addendum(&self, _view: &View<'_>) -> Option<String> {
        Some(format!("{} {}", self.coverage(), self.substance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{added_weight, description_addenda};
    use crate::effects::testing::{ALDRIC, BRENNA, texts, world};

    #[test]
    fn same_substance_tops_up() {
        let mut world = world();
        let mud =
            contaminate(&mut world, ALDRIC, "mud", 4.0, Duration::from_secs(60)).expect("mud");
        let again =
            contaminate(&mut world, ALDRIC, "mud", 8.0, Duration::from_secs(30)).expect("more mud");

        assert_eq!(mud, again);
        assert_eq!(
            world.remaining(mud),
            Some(Duration::from_secs(60)),
            "shorter duration never shortens"
        );
        assert!((added_weight(&world, ALDRIC) - 1.2).abs() < 1e-9);
        assert_eq!(description_addenda(&world, ALDRIC, Some(BRENNA)), vec!["drenched in mud"]);
    }

    #[test]
    fn different_substances_coexist() {
        let mut world = world();
        contaminate(&mut world, ALDRIC, "mud", 1.0, Duration::from_secs(60)).expect("mud");
        contaminate(&mut world, ALDRIC, "soot", 1.0, Duration::from_secs(60)).expect("soot");

        assert_eq!(
            description_addenda(&world, ALDRIC, None),
            vec!["spattered with mud", "spattered with soot"]
        );
    }

    #[test]
    fn wears_off() {
        let mut world = world();
        let tar =
            contaminate(&mut world, ALDRIC, "tar", 2.0, Duration::from_secs(10)).expect("tar");
        world.pulse(Duration::from_secs(10));

        assert!(!world.is_attached(tar));
        assert_eq!(texts(&mut world), vec!["The last of the tar wears off."]);
        assert!(added_weight(&world, ALDRIC).abs() < f64::EPSILON);
    }

    #[test]
    fn longer_exposure_extends() {
        let mut world = world();
        let mud =
            contaminate(&mut world, ALDRIC, "mud", 1.0, Duration::from_secs(10)).expect("mud");
        contaminate(&mut world, ALDRIC, "mud", 1.0, Duration::from_secs(45)).expect("mud");
        assert_eq!(world.remaining(mud), Some(Duration::from_secs(45)));
    }
}
