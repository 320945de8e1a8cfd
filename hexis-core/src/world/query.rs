//! Read-only questions about owners and their effects.

use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::{error, warn};

use super::World;
use crate::effect::{Effect, View};
use crate::metrics::EngineCounters;
use crate::owner::AttachedEffect;
use crate::query::{ActionCategory, QueryTarget};
use crate::types::{EffectId, EffectRef, OwnerId, OwnerKind, WorldTime};

/// Refusal text used when a blocking effect supplies none.
const GENERIC_REFUSAL: &str = "You can't do that right now.";

/// Description used when an effect's `describe` panics.
const NEUTRAL_DESCRIPTION: &str = "an effect";

/// A blocking effect and the refusal text it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocked {
    /// The blocking effect.
    pub effect: EffectRef,
    /// Its type tag.
    pub effect_type: &'static str,
    /// Player-facing refusal.
    pub message: String,
}

/// One line of an owner snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectSummary {
    /// Instance ID.
    pub id: EffectId,
    /// Type tag.
    pub effect_type: String,
    /// Description as seen by the snapshot's voyeur.
    pub description: String,
    /// Pending due time.
    pub due_at: Option<WorldTime>,
    /// Whether the effect is persisted.
    pub saving: bool,
    /// Whether a hook panicked.
    pub faulted: bool,
}

/// Point-in-time view of an owner's effects, safe to hand to other threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerSnapshot {
    /// Owner ID.
    pub owner: OwnerId,
    /// Owner kind.
    pub kind: OwnerKind,
    /// Display name.
    pub name: String,
    /// When the snapshot was taken.
    pub taken_at: WorldTime,
    /// Effects in insertion order.
    pub effects: Vec<EffectSummary>,
}

impl World {
    /// Does the effect apply in the context of `target`?
    ///
    /// Faulted or detached effects never apply. An attached prog that
    /// rejects the owner wins over everything; with no target the effect
    /// applies; otherwise an unrecognised target falls back to the effect's
    /// `unrecognised_target`.
    #[must_use]
    pub fn applies(&self, effect: EffectRef, target: Option<&QueryTarget>) -> bool {
        self.slot_of(effect)
            .is_some_and(|slot| self.evaluate(effect, slot, target, None))
    }

    /// Does the effect apply to `target` with respect to `third`?
    #[must_use]
    pub fn applies_with(
        &self,
        effect: EffectRef,
        target: &QueryTarget,
        third: &QueryTarget,
    ) -> bool {
        self.slot_of(effect)
            .is_some_and(|slot| self.evaluate(effect, slot, Some(target), Some(third)))
    }

    /// Live effects of concrete type `T` on `owner`, in insertion order.
    #[must_use]
    pub fn effects_of_type<T: Effect>(&self, owner: OwnerId) -> Vec<(EffectRef, &T)> {
        self.owners
            .get(owner)
            .map(|o| {
                o.effects_of_type::<T>()
                    .into_iter()
                    .map(|(id, e)| (EffectRef::new(owner, id), e))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The earliest attached live effect of type `T` on `owner`.
    #[must_use]
    pub fn first_of_type<T: Effect>(&self, owner: OwnerId) -> Option<(EffectRef, &T)> {
        let (id, effect) = self.owners.get(owner)?.first_of_type::<T>()?;
        Some((EffectRef::new(owner, id), effect))
    }

    /// Live effects on `owner` that provide capability `C`.
    #[must_use]
    pub fn effects_with<C: ?Sized + 'static>(&self, owner: OwnerId) -> Vec<(EffectRef, &C)> {
        let Some(host) = self.owners.get(owner) else {
            return Vec::new();
        };
        host.effects()
            .filter_map(|(id, e)| {
                self.registry
                    .project::<C>(e)
                    .map(|c| (EffectRef::new(owner, id), c))
            })
            .collect()
    }

    /// Whether some effect providing `C` applies in the context of `target`.
    #[must_use]
    pub fn affected_by<C: ?Sized + 'static>(
        &self,
        owner: OwnerId,
        target: Option<&QueryTarget>,
    ) -> bool {
        self.effects_with::<C>(owner)
            .into_iter()
            .any(|(effect, _)| self.applies(effect, target))
    }

    /// Whether some effect of type `T` applies in the context of `target`.
    #[must_use]
    pub fn affected_by_type<T: Effect>(
        &self,
        owner: OwnerId,
        target: Option<&QueryTarget>,
    ) -> bool {
        self.effects_of_type::<T>(owner)
            .into_iter()
            .any(|(effect, _)| self.applies(effect, target))
    }

    /// Every applicable effect blocking `category`, with refusal text.
    #[must_use]
    pub fn blocking_effects(
        &self,
        owner: OwnerId,
        category: ActionCategory,
        voyeur: Option<OwnerId>,
    ) -> Vec<Blocked> {
        let Some(host) = self.owners.get(owner) else {
            return Vec::new();
        };
        let view = View::new(owner, voyeur, self.clock, &self.owners);
        host.effects
            .iter()
            .filter_map(|slot| {
                let target = EffectRef::new(owner, slot.id);
                let blocks = self.guarded(target, slot, "is_blocking_effect", false, |e| {
                    e.is_blocking_effect(category)
                });
                if !blocks {
                    return None;
                }
                if !self.evaluate(target, slot, None, None) {
                    return None;
                }
                let mut message =
                    self.guarded(target, slot, "blocking_description", String::new(), |e| {
                        e.blocking_description(category, &view)
                    });
                if message.trim().is_empty() {
                    warn!(
                        owner = %owner,
                        effect = %slot.id,
                        tag = slot.tag,
                        %category,
                        "blocking effect gave no refusal text"
                    );
                    message = GENERIC_REFUSAL.to_string();
                }
                Some(Blocked {
                    effect: target,
                    effect_type: slot.tag,
                    message,
                })
            })
            .collect()
    }

    /// The first applicable effect blocking `category`.
    #[must_use]
    pub fn blocking_effect(
        &self,
        owner: OwnerId,
        category: ActionCategory,
        voyeur: Option<OwnerId>,
    ) -> Option<Blocked> {
        self.blocking_effects(owner, category, voyeur).into_iter().next()
    }

    /// Whether anything blocks `category` for `owner`.
    #[must_use]
    pub fn is_blocked(&self, owner: OwnerId, category: ActionCategory) -> bool {
        self.blocking_effect(owner, category, None).is_some()
    }

    /// A description view of `owner` as seen by `voyeur`.
    #[must_use]
    pub fn view(&self, owner: OwnerId, voyeur: Option<OwnerId>) -> View<'_> {
        View::new(owner, voyeur, self.clock, &self.owners)
    }

    /// Describe one effect from `voyeur`'s point of view.
    #[must_use]
    pub fn describe(&self, effect: EffectRef, voyeur: Option<OwnerId>) -> Option<String> {
        let slot = self.slot_of(effect)?;
        Some(self.describe_slot(effect, slot, voyeur))
    }

    /// Snapshot an owner for display or for other threads.
    #[must_use]
    pub fn snapshot(&self, owner: OwnerId, voyeur: Option<OwnerId>) -> Option<OwnerSnapshot> {
        let host = self.owners.get(owner)?;
        let effects = host
            .effects
            .iter()
            .map(|slot| {
                let target = EffectRef::new(owner, slot.id);
                EffectSummary {
                    id: slot.id,
                    effect_type: slot.tag.to_string(),
                    description: self.describe_slot(target, slot, voyeur),
                    due_at: self.scheduler.due_at(&target),
                    saving: slot.saving,
                    faulted: slot.faulted.get(),
                }
            })
            .collect();
        Some(OwnerSnapshot {
            owner,
            kind: host.kind(),
            name: host.name().to_string(),
            taken_at: self.clock,
            effects,
        })
    }

    fn slot_of(&self, effect: EffectRef) -> Option<&AttachedEffect> {
        self.owners.get(effect.owner)?.slot(effect.effect)
    }

    fn describe_slot(
        &self,
        target: EffectRef,
        slot: &AttachedEffect,
        voyeur: Option<OwnerId>,
    ) -> String {
        let view = View::new(target.owner, voyeur, self.clock, &self.owners);
        self.guarded(target, slot, "describe", NEUTRAL_DESCRIPTION.to_string(), |e| {
            e.describe(&view)
        })
    }

    fn evaluate(
        &self,
        effect: EffectRef,
        slot: &AttachedEffect,
        target: Option<&QueryTarget>,
        third: Option<&QueryTarget>,
    ) -> bool {
        if slot.live().is_none() {
            return false;
        }
        if let Some(prog) = &slot.prog {
            let verdict = panic::catch_unwind(AssertUnwindSafe(|| {
                prog.evaluate(effect.owner, target, third)
            }));
            match verdict {
                Ok(true) => {}
                Ok(false) => return false,
                Err(_) => {
                    EngineCounters::incr(&self.counters.faulted);
                    error!(
                        effect = %effect,
                        prog = prog.id(),
                        "applicability prog panicked; treating as not applicable"
                    );
                    return false;
                }
            }
        }
        let Some(target) = target else {
            return true;
        };
        let verdict = self.guarded(effect, slot, "applies", None, |e| {
            let answer = match third {
                Some(third) => e.applies_with(target, third),
                None => e.applies_to(target),
            };
            Some(answer.resolve(e.unrecognised_target()))
        });
        verdict.unwrap_or(false)
    }
}
