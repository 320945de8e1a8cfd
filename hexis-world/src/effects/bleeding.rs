//! Bleeding: loses one point of severity per tick until it stops.

use hexis_core::query::CheckKind;
use hexis_core::{
    Applicability, Effect, EffectContext, EffectRef, Expiry, OwnerEvent, OwnerEventKind, OwnerId,
    QueryTarget, View, World,
};
use serde::{Deserialize, Serialize};

use crate::capability::{CheckModifier, DescriptionAddendum};

/// Tunable: seconds between bleeding ticks.
pub const TICK_TUNABLE: &str = "bleeding_tick_seconds";
const DEFAULT_TICK_SECONDS: f64 = 10.0;

/// Open wound losing blood every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bleeding {
    /// Remaining ticks; also the size of the check penalty.
    pub severity: u32,
}

impl Bleeding {
    /// Registered tag.
    pub const TAG: &'static str = "bleeding";

    fn adverb(&self) -> &'static str {
        match self.severity {
            0..=2 => "lightly",
            3..=5 => "steadily",
            _ => "heavily",
        }
    }
}

/// Start `owner` bleeding, or worsen an existing wound.
///
/// # Errors
/// Returns an error if the owner does not exist.
pub fn bleed(world: &mut World, owner: OwnerId, severity: u32) -> hexis_core::Result<EffectRef> {
    let existing = world.first_of_type::<Bleeding>(owner).map(|(target, _)| target);
    if let Some(existing) = existing {
        world.with_effect_mut::<Bleeding, _>(existing, |b| {
            b.severity = b.severity.saturating_add(severity)
        });
        return Ok(existing);
    }
    let tick = world.config().tunable_secs(TICK_TUNABLE, DEFAULT_TICK_SECONDS);
    world.add_effect(owner, Bleeding { severity }, Some(tick))
}

impl Effect for Bleeding {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            format!("You are bleeding {}.", self.adverb())
        } else {
            format!("{} is bleeding {}.", view.owner_name(), self.adverb())
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
        cx.send_owner("You start to bleed.");
    }

    fn expire_effect(&mut self, cx: &mut EffectContext<'_>) -> Expiry {
        self.severity = self.severity.saturating_sub(1);
        if self.severity == 0 {
            cx.send_owner("Your bleeding stops.");
            return Expiry::Remove;
        }
        cx.send_owner("You lose some blood.");
        Expiry::Reschedule(cx.tunable_secs(TICK_TUNABLE, DEFAULT_TICK_SECONDS))
    }

    fn removed_by(&self, event: &OwnerEvent) -> bool {
        event.is(OwnerEventKind::Died)
    }

    fn applies_to(&self, target: &QueryTarget) -> Applicability {
        match target {
            QueryTarget::Check(CheckKind::Willpower | CheckKind::Perception) => {
                Applicability::DoesNotApply
            }
            QueryTarget::Check(_) => Applicability::Applies,
            _ => Applicability::Unrecognised,
        }
    }
}

impl CheckModifier for Bleeding {
    fn check_bonus(&self, _check: CheckKind) -> f64 {
        -0.5 * f64::from(self.severity)
    }
}

impl DescriptionAddendum for Bleeding {
    fn addendum(&self, _view: &View<'_>) -> Option<String> {
        (self.severity > 0).then(|| "blood seeps from an open wound".to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::capability::{description_addenda, total_check_bonus};
    use crate::effects::testing::{ALDRIC, BRENNA, texts, world};

    fn default_tick() -> Duration {
        Duration::from_secs_f64(DEFAULT_TICK_SECONDS)
    }

    #[test]
    fn ticks_down_and_stops() {
        let mut world = world();
        let wound = bleed(&mut world, ALDRIC, 2).expect("bleed");
        assert_eq!(texts(&mut world), vec!["You start to bleed."]);

        world.pulse(default_tick());
        assert_eq!(texts(&mut world), vec!["You lose some blood."]);
        assert!(world.is_attached(wound));

        world.pulse(default_tick());
        assert_eq!(texts(&mut world), vec!["Your bleeding stops."]);
        assert!(!world.is_attached(wound));
    }

    #[test]
    fn second_wound_tops_up() {
        let mut world = world();
        let first = bleed(&mut world, ALDRIC, 2).expect("bleed");
        let second = bleed(&mut world, ALDRIC, 5).expect("bleed");

        assert_eq!(first, second);
        assert_eq!(world.effects_of_type::<Bleeding>(ALDRIC).len(), 1);
        let (_, wound) = world.first_of_type::<Bleeding>(ALDRIC).expect("bleeding");
        assert_eq!(wound.severity, 7);
        assert_eq!(
            world.describe(first, Some(BRENNA)).as_deref(),
            Some("Aldric is bleeding heavily.")
        );
    }

    #[test]
    fn penalises_physical_checks_only() {
        let mut world = world();
        bleed(&mut world, ALDRIC, 4).expect("bleed");

        assert!((total_check_bonus(&world, ALDRIC, CheckKind::Melee) + 2.0).abs() < f64::EPSILON);
        assert!(total_check_bonus(&world, ALDRIC, CheckKind::Willpower).abs() < f64::EPSILON);
        assert_eq!(
            description_addenda(&world, ALDRIC, Some(BRENNA)),
            vec!["blood seeps from an open wound"]
        );
    }

    #[test]
    fn death_stops_bleeding() {
        let mut world = world();
        let wound = bleed(&mut world, ALDRIC, 3).expect("bleed");
        world.emit(OwnerEvent::new(ALDRIC, OwnerEventKind::Died));
        assert!(!world.is_attached(wound));
    }

    #[test]
    fn tick_length_is_tunable() {
        let mut config = hexis_core::EngineConfig::default();
        config.tunables.insert(TICK_TUNABLE.to_string(), 2.0);
        let mut world = crate::effects::testing::world_with(config);
        let wound = bleed(&mut world, ALDRIC, 3).expect("bleed");

        assert_eq!(world.remaining(wound), Some(Duration::from_secs(2)));
    }
}
