//! AdminSight: staff see everything.

use hexis_core::{Applicability, Effect, View};

/// Lets an administrator perceive hidden owners. Transient; granted on
/// each login by the staff tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminSight;

impl AdminSight {
    /// Registered tag.
    pub const TAG: &'static str = "admin_sight";
}

impl Effect for AdminSight {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            "You see with the eyes of an administrator.".to_string()
        } else {
            format!("{} has a watchful air.", view.owner_name())
        }
    }

    fn unrecognised_target(&self) -> Applicability {
        Applicability::Applies
    }
}

#[cfg(test)]
mod tests {
    use hexis_core::QueryTarget;

    use super::*;
    use crate::effects::testing::{ALDRIC, BRENNA, HALL, world};

    #[test]
    fn applies_to_anything() {
        let mut world = world();
        let sight = world.add_effect(BRENNA, AdminSight, None).expect("admin");

        for target in [
            QueryTarget::Character(ALDRIC),
            QueryTarget::Room(HALL),
            QueryTarget::Keyword("anything".into()),
        ] {
            assert!(world.applies(sight, Some(&target)));
        }
        assert!(world.owner_record(BRENNA).expect("record").effects.is_empty());
    }
}
