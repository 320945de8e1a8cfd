//! Crafting: a multi-phase project that is paused, not lost, on cancel.

use hexis_core::{
    ActionCategory, Applicability, Effect, EffectContext, EffectRef, Expiry, OwnerId, View, World,
};
use serde::{Deserialize, Serialize};

/// Tunable: seconds per crafting phase.
pub const PHASE_TUNABLE: &str = "craft_phase_seconds";
const DEFAULT_PHASE_SECONDS: f64 = 20.0;

/// A project in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crafting {
    /// What is being made.
    pub recipe: String,
    /// Phases completed so far.
    pub phase: u32,
    /// Phases needed to finish.
    pub phases: u32,
}

/// A project put aside part way through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendedCraft {
    /// What was being made.
    pub recipe: String,
    /// Phases completed before it was put aside.
    pub phase: u32,
    /// Phases needed to finish.
    pub phases: u32,
}

impl Crafting {
    /// Registered tag.
    pub const TAG: &'static str = "crafting";

    fn is_finished(&self) -> bool {
        self.phase >= self.phases
    }
}

impl SuspendedCraft {
    /// Registered tag.
    pub const TAG: &'static str = "suspended_craft";
}

/// Start a new project of `phases` phases.
///
/// # Errors
/// Returns an error if the owner does not exist.
pub fn start_craft(
    world: &mut World,
    owner: OwnerId,
    recipe: &str,
    phases: u32,
) -> hexis_core::Result<EffectRef> {
    let phase = world.config().tunable_secs(PHASE_TUNABLE, DEFAULT_PHASE_SECONDS);
    world.add_effect(
        owner,
        Crafting {
            recipe: recipe.to_string(),
            phase: 0,
            phases: phases.max(1),
        },
        Some(phase),
    )
}

/// Pick up a suspended project where it was left.
///
/// Returns `Ok(None)` if `owner` has no suspended project for `recipe`.
///
/// # Errors
/// Returns an error if the owner does not exist.
pub fn resume_craft(
    world: &mut World,
    owner: OwnerId,
    recipe: &str,
) -> hexis_core::Result<Option<EffectRef>> {
    let suspended = world
        .effects_of_type::<SuspendedCraft>(owner)
        .into_iter()
        .find(|(_, s)| s.recipe == recipe)
        .map(|(target, s)| (target, s.clone()));
    let Some((target, suspended)) = suspended else {
        return Ok(None);
    };

    world.remove_effect(target, false);
    let phase = world.config().tunable_secs(PHASE_TUNABLE, DEFAULT_PHASE_SECONDS);
    let resumed = world.add_effect(
        owner,
        Crafting {
            recipe: suspended.recipe,
            phase: suspended.phase,
            phases: suspended.phases,
        },
        Some(phase),
    )?;
    Ok(Some(resumed))
}

impl Effect for Crafting {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            format!("You are making {} ({}/{}).", self.recipe, self.phase, self.phases)
        } else {
            format!("{} is busy making {}.", view.owner_name(), self.recipe)
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
        if self.phase == 0 {
            cx.send_owner(format!("You begin work on {}.", self.recipe));
        } else {
            cx.send_owner(format!("You pick up your work on {}.", self.recipe));
        }
    }

    fn expire_effect(&mut self, cx: &mut EffectContext<'_>) -> Expiry {
        self.phase += 1;
        if self.is_finished() {
            cx.send_owner(format!("You finish {}.", self.recipe));
            return Expiry::Remove;
        }
        cx.send_owner(format!("You make progress on {}.", self.recipe));
        Expiry::Reschedule(cx.tunable_secs(PHASE_TUNABLE, DEFAULT_PHASE_SECONDS))
    }

    fn removal_effect(&mut self, cx: &mut EffectContext<'_>) {
        if !self.is_finished() {
            cx.send_owner(format!("You abandon {}.", self.recipe));
        }
    }

    fn cancel_effect(&mut self, cx: &mut EffectContext<'_>) {
        cx.send_owner(format!("You put {} aside for later.", self.recipe));
        let owner = cx.owner();
        cx.add_effect(
            owner,
            SuspendedCraft {
                recipe: self.recipe.clone(),
                phase: self.phase,
                phases: self.phases,
            },
            None,
        );
    }

    fn blocks(&self) -> &[ActionCategory] {
        &[ActionCategory::Crafting]
    }

    fn blocking_description(&self, _category: ActionCategory, _view: &View<'_>) -> String {
        format!("You are already working on {}.", self.recipe)
    }
}

impl Effect for SuspendedCraft {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            format!("You have an unfinished {} ({}/{}).", self.recipe, self.phase, self.phases)
        } else {
            format!("{} has an unfinished {}.", view.owner_name(), self.recipe)
        }
    }

    fn unrecognised_target(&self) -> Applicability {
        Applicability::DoesNotApply
    }

    fn saving_effect(&self) -> bool {
        true
    }

    fn save_definition(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::effects::testing::{ALDRIC, texts, world};

    const PHASE: Duration = Duration::from_secs(20);

    #[test]
    fn runs_every_phase_then_finishes() {
        let mut world = world();
        let craft = start_craft(&mut world, ALDRIC, "a longbow", 3).expect("craft");
        assert!(world.is_blocked(ALDRIC, ActionCategory::Crafting));

        for _ in 0..3 {
            world.pulse(PHASE);
        }

        assert!(!world.is_attached(craft));
        assert_eq!(
            texts(&mut world),
            vec![
                "You begin work on a longbow.",
                "You make progress on a longbow.",
                "You make progress on a longbow.",
                "You finish a longbow.",
            ]
        );
        assert!(world.first_of_type::<SuspendedCraft>(ALDRIC).is_none());
    }

    #[test]
    fn cancel_suspends_and_resume_continues() {
        let mut world = world();
        let craft = start_craft(&mut world, ALDRIC, "a longbow", 3).expect("craft");
        world.pulse(PHASE);
        texts(&mut world);

        assert!(world.cancel(craft));
        let (_, suspended) = world.first_of_type::<SuspendedCraft>(ALDRIC).expect("suspended");
        assert_eq!(suspended.phase, 1);
        assert_eq!(texts(&mut world), vec!["You put a longbow aside for later."]);
        assert!(!world.is_blocked(ALDRIC, ActionCategory::Crafting));

        let resumed = resume_craft(&mut world, ALDRIC, "a longbow")
            .expect("resume")
            .expect("was suspended");
        assert!(world.first_of_type::<SuspendedCraft>(ALDRIC).is_none());
        assert_eq!(texts(&mut world), vec!["You pick up your work on a longbow."]);

        world.pulse(PHASE);
        world.pulse(PHASE);
        assert!(!world.is_attached(resumed));
        assert_eq!(texts(&mut world).last().map(String::as_str), Some("You finish a longbow."));
    }

    #[test]
    fn removal_abandons_without_suspending() {
        let mut world = world();
        let craft = start_craft(&mut world, ALDRIC, "a stool", 2).expect("craft");
        texts(&mut world);

        world.remove_effect(craft, true);

        assert_eq!(texts(&mut world), vec!["You abandon a stool."]);
        assert!(world.first_of_type::<SuspendedCraft>(ALDRIC).is_none());
    }

    #[test]
    fn resume_without_suspended_project() {
        let mut world = world();
        assert!(resume_craft(&mut world, ALDRIC, "a kite").expect("resume").is_none());
    }
}
