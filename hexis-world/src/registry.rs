//! The standard effect registry for a Hexis world.
//!
//! Registration order is the order tags are listed in diagnostics. Every
//! durable effect gets a loader; transient ones are registered without one
//! so a stray saved entry for them is reported instead of silently loaded.

use hexis_core::{EffectRegistry, EffectType, load_serde};

use crate::capability::{
    AddsWeight, CheckModifier, DescriptionAddendum, ObscuresPerception, as_adds_weight,
    as_check_modifier, as_description_addendum, as_obscures_perception,
};
use crate::effects::{
    AdminSight, Aiming, Anesthetised, Bleeding, Contaminated, Crafting, Dreaming, Grappled,
    Grappling, Groggy, Hidden, OnTrial, SuspendedCraft, load_grappled, load_grappling,
    load_on_trial,
};

/// Build the registry of every effect this crate ships.
///
/// # Errors
/// Returns [`hexis_core::HexisError::DuplicateEffectType`] if two
/// registrations collide.
pub fn standard_registry() -> hexis_core::Result<EffectRegistry> {
    EffectRegistry::builder()
        .register(
            EffectType::new::<Bleeding>(Bleeding::TAG)
                .loader(load_serde::<Bleeding>)
                .provides::<dyn CheckModifier>(as_check_modifier::<Bleeding>)
                .provides::<dyn DescriptionAddendum>(as_description_addendum::<Bleeding>),
        )
        .register(EffectType::new::<Grappling>(Grappling::TAG).loader(load_grappling))
        .register(EffectType::new::<Grappled>(Grappled::TAG).loader(load_grappled))
        .register(
            EffectType::new::<Hidden>(Hidden::TAG)
                .loader(load_serde::<Hidden>)
                .provides::<dyn ObscuresPerception>(as_obscures_perception::<Hidden>)
                .provides::<dyn CheckModifier>(as_check_modifier::<Hidden>),
        )
        .register(
            EffectType::new::<Anesthetised>(Anesthetised::TAG)
                .loader(load_serde::<Anesthetised>),
        )
        .register(
            EffectType::new::<Groggy>(Groggy::TAG)
                .loader(load_serde::<Groggy>)
                .provides::<dyn CheckModifier>(as_check_modifier::<Groggy>),
        )
        .register(
            EffectType::new::<Aiming>(Aiming::TAG)
                .provides::<dyn CheckModifier>(as_check_modifier::<Aiming>),
        )
        .register(
            EffectType::new::<Contaminated>(Contaminated::TAG)
                .loader(load_serde::<Contaminated>)
                .provides::<dyn AddsWeight>(as_adds_weight::<Contaminated>)
                .provides::<dyn DescriptionAddendum>(as_description_addendum::<Contaminated>),
        )
        .register(EffectType::new::<Crafting>(Crafting::TAG).loader(load_serde::<Crafting>))
        .register(
            EffectType::new::<SuspendedCraft>(SuspendedCraft::TAG)
                .loader(load_serde::<SuspendedCraft>),
        )
        .register(EffectType::new::<Dreaming>(Dreaming::TAG).loader(load_serde::<Dreaming>))
        .register(EffectType::new::<AdminSight>(AdminSight::TAG))
        .register(EffectType::new::<OnTrial>(OnTrial::TAG).loader(load_on_trial))
        .build()
}
