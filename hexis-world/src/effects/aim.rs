//! Aiming: a transient ranged bonus against one target.

use hexis_core::query::CheckKind;
use hexis_core::{
    Applicability, Effect, EffectContext, EffectRef, HexisError, OwnerEvent, OwnerEventKind,
    OwnerId, QueryTarget, SubscriptionHandle, View, World,
};

use crate::capability::CheckModifier;

const AIM_BONUS: f64 = 2.0;

/// Lined up on a target. Not saved: a reconnecting archer aims again.
#[derive(Debug, Clone)]
pub struct Aiming {
    /// Who is being aimed at.
    pub target: OwnerId,
    handles: Vec<SubscriptionHandle>,
}

impl Aiming {
    /// Registered tag.
    pub const TAG: &'static str = "aiming";
}

/// Start aiming at `target`, dropping any previous aim.
///
/// # Errors
/// Returns [`HexisError::OwnerNotFound`] if the target does not exist.
pub fn take_aim(
    world: &mut World,
    aimer: OwnerId,
    target: OwnerId,
) -> hexis_core::Result<EffectRef> {
    if world.owner(target).is_none() {
        return Err(HexisError::OwnerNotFound(target));
    }
    world.remove_effects_of_type::<Aiming>(aimer, false);
    world.add_effect(
        aimer,
        Aiming {
            target,
            handles: Vec::new(),
        },
        None,
    )
}

impl Effect for Aiming {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        let target = view.display_name(self.target);
        if view.is_self() {
            format!("You are aiming at {target}.")
        } else if view.voyeur() == Some(self.target) {
            format!("{} is aiming at you!", view.owner_name())
        } else {
            format!("{} is aiming at {target}.", view.owner_name())
        }
    }

    fn unrecognised_target(&self) -> Applicability {
        Applicability::DoesNotApply
    }

    fn initial_effect(&mut self, cx: &mut EffectContext<'_>) {
        self.handles = cx.subscribe_all(
            self.target,
            &[OwnerEventKind::Moved, OwnerEventKind::Destroyed, OwnerEventKind::Died],
        );
        let target = cx.name_of(self.target).to_string();
        cx.send_owner(format!("You take aim at {target}."));
    }

    fn on_event(&mut self, _event: &OwnerEvent, cx: &mut EffectContext<'_>) {
        cx.send_owner("You lose your aim.");
        cx.remove_self();
    }

    fn removal_effect(&mut self, cx: &mut EffectContext<'_>) {
        cx.unsubscribe_all(&mut self.handles);
    }

    fn removed_by(&self, event: &OwnerEvent) -> bool {
        matches!(event.kind, OwnerEventKind::Moved | OwnerEventKind::Died)
    }

    fn applies_to(&self, target: &QueryTarget) -> Applicability {
        match target {
            QueryTarget::Character(id) => Applicability::from_bool(*id == self.target),
            QueryTarget::Check(check) => Applicability::from_bool(*check == CheckKind::Ranged),
            _ => Applicability::Unrecognised,
        }
    }
}

impl CheckModifier for Aiming {
    fn check_bonus(&self, check: CheckKind) -> f64 {
        if check == CheckKind::Ranged { AIM_BONUS } else { 0.0 }
    }
}
