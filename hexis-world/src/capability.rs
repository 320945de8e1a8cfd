//! Capability traits game subsystems use to query effects.
//!
//! The engine never names these traits. Each effect type declares the
//! capabilities it provides when it is registered (see
//! [`crate::registry::standard_registry`]), and subsystems ask the world
//! for `effects_with::<dyn Capability>(owner)`.

use std::any::Any;

use hexis_core::query::CheckKind;
use hexis_core::{OwnerId, QueryTarget, View, World};

use crate::effects::AdminSight;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Adjusts skill checks.
pub trait CheckModifier {
    /// Bonus (or penalty, if negative) applied to `check`.
    fn check_bonus(&self, check: CheckKind) -> f64;
}

/// Hides the owner from some observers.
pub trait ObscuresPerception {
    /// Whether `observer` fails to perceive the owner.
    fn hides_from(&self, observer: OwnerId) -> bool;
}

/// Adds carried weight.
pub trait AddsWeight {
    /// Extra weight in kilograms.
    fn added_weight(&self) -> f64;
}

/// Appends a clause to the owner's description.
pub trait DescriptionAddendum {
    /// Clause to append, if any, from the view's perspective.
    fn addendum(&self, view: &View<'_>) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// Registry projection for [`CheckModifier`].
#[must_use]
pub fn as_check_modifier<'e, E: CheckModifier + 'static>(
    effect: &'e (dyn Any + 'static),
) -> Option<&'e (dyn CheckModifier + 'static)> {
    let effect: &E = effect.downcast_ref()?;
    Some(effect)
}

/// Registry projection for [`ObscuresPerception`].
#[must_use]
pub fn as_obscures_perception<'e, E: ObscuresPerception + 'static>(
    effect: &'e (dyn Any + 'static),
) -> Option<&'e (dyn ObscuresPerception + 'static)> {
    let effect: &E = effect.downcast_ref()?;
    Some(effect)
}

/// Registry projection for [`AddsWeight`].
#[must_use]
pub fn as_adds_weight<'e, E: AddsWeight + 'static>(
    effect: &'e (dyn Any + 'static),
) -> Option<&'e (dyn AddsWeight + 'static)> {
    let effect: &E = effect.downcast_ref()?;
    Some(effect)
}

/// Registry projection for [`DescriptionAddendum`].
#[must_use]
pub fn as_description_addendum<'e, E: DescriptionAddendum + 'static>(
    effect: &'e (dyn Any + 'static),
) -> Option<&'e (dyn DescriptionAddendum + 'static)> {
    let effect: &E = effect.downcast_ref()?;
    Some(effect)
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Sum of every applicable check modifier on `owner`.
#[must_use]
pub fn total_check_bonus(world: &World, owner: OwnerId, check: CheckKind) -> f64 {
    let target = QueryTarget::Check(check);
    world
        .effects_with::<dyn CheckModifier>(owner)
        .into_iter()
        .filter(|(effect, _)| world.applies(*effect, Some(&target)))
        .map(|(_, modifier)| modifier.check_bonus(check))
        .sum()
}

/// Whether `observer` fails to perceive `owner`.
///
/// An observer with an applicable [`AdminSight`] sees through everything.
#[must_use]
pub fn is_hidden_from(world: &World, owner: OwnerId, observer: OwnerId) -> bool {
    if world.affected_by_type::<AdminSight>(observer, Some(&QueryTarget::Character(owner))) {
        return false;
    }
    let target = QueryTarget::Character(observer);
    world
        .effects_with::<dyn ObscuresPerception>(owner)
        .into_iter()
        .any(|(effect, obscures)| {
            world.applies(effect, Some(&target)) && obscures.hides_from(observer)
        })
}

/// Extra weight `owner` carries because of its effects.
#[must_use]
pub fn added_weight(world: &World, owner: OwnerId) -> f64 {
    world
        .effects_with::<dyn AddsWeight>(owner)
        .into_iter()
        .filter(|(effect, _)| world.applies(*effect, None))
        .map(|(_, weight)| weight.added_weight())
        .sum()
}

/// Description clauses contributed by `owner`'s effects, in insertion order.
#[must_use]
pub fn description_addenda(world: &World, owner: OwnerId, voyeur: Option<OwnerId>) -> Vec<String> {
    let view = world.view(owner, voyeur);
    world
        .effects_with::<dyn DescriptionAddendum>(owner)
        .into_iter()
        .filter(|(effect, _)| world.applies(*effect, None))
        .filter_map(|(_, addendum)| addendum.addendum(&view))
        .collect()
}
