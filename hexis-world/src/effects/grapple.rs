//! Grappling / Grappled: a linked pair on two owners.
//!
//! Each side holds the other's [`EffectRef`]. Whichever side is removed
//! first queues removal of its partner from `removal_effect`; the partner's
//! own removal then finds the first side already gone and does nothing.
//! Both sides watch the other owner and let go when it moves, dies or is
//! destroyed.

use hexis_core::{
    ActionCategory, Applicability, Effect, EffectContext, EffectId, EffectRef, HexisError,
    LoadContext, LoadError, OwnerEvent, OwnerEventKind, OwnerId, QueryTarget, SubscriptionHandle,
    View, World,
};
use serde::{Deserialize, Serialize};

const WATCHED: [OwnerEventKind; 3] = [
    OwnerEventKind::Destroyed,
    OwnerEventKind::Died,
    OwnerEventKind::Moved,
];

/// Held by the attacker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grappling {
    /// Who is being held.
    pub victim: OwnerId,
    /// The matching [`Grappled`] effect.
    pub partner: EffectRef,
    #[serde(skip)]
    handles: Vec<SubscriptionHandle>,
}

/// Held by the victim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grappled {
    /// Who is holding.
    pub grappler: OwnerId,
    /// The matching [`Grappling`] effect.
    pub partner: EffectRef,
    #[serde(skip)]
    handles: Vec<SubscriptionHandle>,
}

impl Grappling {
    /// Registered tag.
    pub const TAG: &'static str = "grappling";
}

impl Grappled {
    /// Registered tag.
    pub const TAG: &'static str = "grappled";
}

/// Start a grapple. Both halves are attached under pre-allocated IDs so
/// each can name the other from the first hook.
///
/// # Errors
/// Returns [`HexisError::OwnerNotFound`] if either owner is missing.
pub fn grapple(
    world: &mut World,
    grappler: OwnerId,
    victim: OwnerId,
) -> hexis_core::Result<(EffectRef, EffectRef)> {
    for owner in [grappler, victim] {
        if world.owner(owner).is_none() {
            return Err(HexisError::OwnerNotFound(owner));
        }
    }
    let holding = EffectRef::new(grappler, EffectId::new());
    let held = EffectRef::new(victim, EffectId::new());

    world.add_effect_with_id(
        grappler,
        holding.effect,
        Box::new(Grappling {
            victim,
            partner: held,
            handles: Vec::new(),
        }),
        None,
    )?;
    world.add_effect_with_id(
        victim,
        held.effect,
        Box::new(Grappled {
            grappler,
            partner: holding,
            handles: Vec::new(),
        }),
        None,
    )?;
    Ok((holding, held))
}

/// Loader for [`Grappling`]; fails if the victim no longer exists.
///
/// # Errors
/// Returns a [`LoadError`] for a malformed payload or a missing victim.
pub fn load_grappling(
    payload: serde_json::Value,
    cx: &LoadContext<'_>,
) -> Result<Box<dyn Effect>, LoadError> {
    let effect: Grappling = serde_json::from_value(payload)?;
    cx.require_owner(effect.victim)?;
    Ok(Box::new(effect))
}

/// Loader for [`Grappled`]; fails if the grappler no longer exists.
///
/// # Errors
/// Returns a [`LoadError`] for a malformed payload or a missing grappler.
pub fn load_grappled(
    payload: serde_json::Value,
    cx: &LoadContext<'_>,
) -> Result<Box<dyn Effect>, LoadError> {
    let effect: Grappled = serde_json::from_value(payload)?;
    cx.require_owner(effect.grappler)?;
    Ok(Box::new(effect))
}

fn release(handles: &mut Vec<SubscriptionHandle>, partner: EffectRef, cx: &mut EffectContext<'_>) {
    cx.unsubscribe_all(handles);
    if cx.effect_exists(partner) {
        cx.remove_effect(partner, true);
    }
}

fn reconnect(partner: EffectRef, cx: &mut EffectContext<'_>) -> bool {
    if cx.effect_exists(partner) {
        true
    } else {
        cx.remove_self();
        false
    }
}

impl Effect for Grappling {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        let victim = view.display_name(self.victim);
        if view.is_self() {
            format!("You are grappling {victim}.")
        } else {
            format!("{} is grappling {victim}.", view.owner_name())
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

    fn initial_effect(&mut self, cx: &mut EffectContext<'_>) {
        self.login(cx);
        let victim = cx.name_of(self.victim).to_string();
        cx.send_owner(format!("You seize {victim}."));
    }

    fn login(&mut self, cx: &mut EffectContext<'_>) {
        self.handles = cx.subscribe_all(self.victim, &WATCHED);
    }

    fn after_load(&mut self, cx: &mut EffectContext<'_>) {
        if reconnect(self.partner, cx) {
            self.login(cx);
        }
    }

    fn on_event(&mut self, _event: &OwnerEvent, cx: &mut EffectContext<'_>) {
        cx.remove_self();
    }

    fn removal_effect(&mut self, cx: &mut EffectContext<'_>) {
        release(&mut self.handles, self.partner, cx);
        if cx.owner_exists(self.victim) {
            let victim = cx.name_of(self.victim).to_string();
            cx.send_owner(format!("You release {victim}."));
        }
    }

    fn removed_by(&self, event: &OwnerEvent) -> bool {
        matches!(event.kind, OwnerEventKind::Died | OwnerEventKind::Moved)
    }

    fn applies_to(&self, target: &QueryTarget) -> Applicability {
        match target {
            QueryTarget::Character(id) => Applicability::from_bool(*id == self.victim),
            _ => Applicability::Unrecognised,
        }
    }

    fn blocks(&self) -> &[ActionCategory] {
        &[ActionCategory::Movement]
    }

    fn blocking_description(&self, _category: ActionCategory, view: &View<'_>) -> String {
        format!("You can't go anywhere while holding {}.", view.display_name(self.victim))
    }
}

impl Effect for Grappled {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        let grappler = view.display_name(self.grappler);
        if view.is_self() {
            format!("You are held fast by {grappler}.")
        } else {
            format!("{} is held fast by {grappler}.", view.owner_name())
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

    fn initial_effect(&mut self, cx: &mut EffectContext<'_>) {
        self.login(cx);
        let grappler = cx.name_of(self.grappler).to_string();
        cx.send_owner(format!("{grappler} seizes you!"));
    }

    fn login(&mut self, cx: &mut EffectContext<'_>) {
        self.handles = cx.subscribe_all(self.grappler, &WATCHED);
    }

    fn after_load(&mut self, cx: &mut EffectContext<'_>) {
        if reconnect(self.partner, cx) {
            self.login(cx);
        }
    }

    fn on_event(&mut self, _event: &OwnerEvent, cx: &mut EffectContext<'_>) {
        cx.remove_self();
    }

    fn removal_effect(&mut self, cx: &mut EffectContext<'_>) {
        release(&mut self.handles, self.partner, cx);
        cx.send_owner("You are free.");
    }

    fn removed_by(&self, event: &OwnerEvent) -> bool {
        event.is(OwnerEventKind::Died)
    }

    fn applies_to(&self, target: &QueryTarget) -> Applicability {
        match target {
            QueryTarget::Character(id) => Applicability::from_bool(*id == self.grappler),
            _ => Applicability::Unrecognised,
        }
    }

    fn blocks(&self) -> &[ActionCategory] {
        &[ActionCategory::Movement, ActionCategory::Combat]
    }

    fn blocking_description(&self, category: ActionCategory, view: &View<'_>) -> String {
        let grappler = view.display_name(self.grappler);
        match category {
            ActionCategory::Combat => format!("You can't fight back while {grappler} holds you."),
            _ => format!("You can't move while {grappler} holds you."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::testing::{ALDRIC, BRENNA, texts, world};

    #[test]
    fn both_halves_attach_and_block() {
        let mut world = world();
        let (holding, held) = grapple(&mut world, ALDRIC, BRENNA).expect("grapple");

        assert!(world.is_attached(holding));
        assert!(world.is_attached(held));
        assert_eq!(texts(&mut world), vec!["You seize Brenna.", "Aldric seizes you!"]);

        let blocked = world
            .blocking_effect(BRENNA, ActionCategory::Combat, Some(BRENNA))
            .expect("blocked");
        assert_eq!(blocked.message, "You can't fight back while Aldric holds you.");
        assert!(world.is_blocked(ALDRIC, ActionCategory::Movement));
        assert!(!world.is_blocked(ALDRIC, ActionCategory::Combat));
    }

    #[test]
    fn removing_one_side_removes_the_other_once() {
        let mut world = world();
        let (holding, held) = grapple(&mut world, ALDRIC, BRENNA).expect("grapple");
        texts(&mut world);

        assert!(world.remove_effect(held, true));
        assert!(!world.is_attached(holding));
        assert_eq!(texts(&mut world), vec!["You are free.", "You release Brenna."]);
        assert!(world.subscriptions().is_empty());
        assert_eq!(world.counters().snapshot().zombie_subscriptions, 0);
    }

    #[test]
    fn victim_moving_breaks_the_hold() {
        let mut world = world();
        let (holding, held) = grapple(&mut world, ALDRIC, BRENNA).expect("grapple");

        world.emit(OwnerEvent::new(BRENNA, OwnerEventKind::Moved));

        assert!(!world.is_attached(holding));
        assert!(!world.is_attached(held));
    }

    #[test]
    fn destroying_victim_releases_grappler() {
        let mut world = world();
        let (holding, _) = grapple(&mut world, ALDRIC, BRENNA).expect("grapple");

        assert!(world.destroy_owner(BRENNA));
        assert!(!world.is_attached(holding));
        assert!(world.subscriptions().is_empty());
    }

    #[test]
    fn half_without_partner_lets_go_after_load() {
        let mut world = world();
        let (_, held) = grapple(&mut world, ALDRIC, BRENNA).expect("grapple");
        let mut record = world.owner_record(BRENNA).expect("record");
        record.effects.retain(|e| e.tag == Grappled::TAG);

        let mut restored = crate::effects::testing::world();
        let report = restored.restore(vec![record]);

        assert_eq!(report.loaded, 1);
        assert!(!restored.is_attached(held), "partner is missing, so the half removes itself");
    }
}
