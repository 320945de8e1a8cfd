//! Reference effects.
//!
//! Each effect is small on game rules and exists to exercise one or more
//! engine mechanics end to end:
//!
//! | Effect | Durable | Mechanics |
//! |--------|---------|-----------|
//! | [`Bleeding`] | yes | repeating reschedule, check penalty, tunables |
//! | [`Grappling`] / [`Grappled`] | yes | paired lifetime, cross-owner subscriptions, blocking |
//! | [`Hidden`] | yes | perception capability, spotted list, combat removal |
//! | [`Anesthetised`] → [`Groggy`] | yes | onset message, blocking, transform |
//! | [`Aiming`] | no | transient, subscription on another owner |
//! | [`Contaminated`] | yes | singleton top-up, addendum, weight |
//! | [`Crafting`] → [`SuspendedCraft`] | yes | multi-phase, pause on cancel |
//! | [`Dreaming`] | yes | recurring phases, minute heartbeat |
//! | [`AdminSight`] | no | always applies |
//! | [`OnTrial`] | yes | legal-authority applicability |

mod admin;
mod aim;
mod anesthesia;
mod bleeding;
mod contamination;
mod crafting;
mod dream;
mod grapple;
mod hidden;
mod trial;

pub use admin::AdminSight;
pub use aim::{Aiming, take_aim};
pub use anesthesia::{Anesthetised, Groggy, anesthetise};
pub use bleeding::{Bleeding, bleed};
pub use contamination::{Contaminated, contaminate};
pub use crafting::{Crafting, SuspendedCraft, resume_craft, start_craft};
pub use dream::{Dreaming, dream};
pub use grapple::{Grappled, Grappling, grapple, load_grappled, load_grappling};
pub use hidden::{Hidden, hide, spot};
pub use trial::{OnTrial, load_on_trial, put_on_trial};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use hexis_core::{EngineConfig, OwnerId, OwnerKind, World};

    pub(crate) const ALDRIC: OwnerId = OwnerId(1);
    pub(crate) const BRENNA: OwnerId = OwnerId(2);
    pub(crate) const HALL: OwnerId = OwnerId(100);

    pub(crate) fn world() -> World {
        world_with(EngineConfig::default())
    }

    pub(crate) fn world_with(config: EngineConfig) -> World {
        let registry = crate::registry::standard_registry().expect("standard registry");
        let mut world = World::new(Arc::new(registry), config);
        world.create_owner(ALDRIC, OwnerKind::Character, "Aldric").expect("aldric");
        world.create_owner(BRENNA, OwnerKind::Character, "Brenna").expect("brenna");
        world.create_owner(HALL, OwnerKind::Room, "the Great Hall").expect("hall");
        world
    }

    pub(crate) fn texts(world: &mut World) -> Vec<String> {
        world.drain_messages().into_iter().map(|m| m.text).collect()
    }
}
