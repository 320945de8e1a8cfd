//! OnTrial: answering a charge before a legal authority.

use hexis_core::{
    ActionCategory, Applicability, Effect, EffectContext, EffectRef, HexisError, LoadContext,
    LoadError, OwnerEvent, OwnerEventKind, OwnerId, QueryTarget, View, World,
};
use serde::{Deserialize, Serialize};

/// Definition kind checked on load.
pub const LEGAL_AUTHORITY: &str = "legal_authority";

/// A pending trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnTrial {
    /// Jurisdiction hearing the case.
    pub authority: u64,
    /// Who brought the charge, if anyone did.
    #[serde(default)]
    pub accuser: Option<OwnerId>,
    /// What the defendant is accused of.
    pub charge: String,
}

impl OnTrial {
    /// Registered tag.
    pub const TAG: &'static str = "on_trial";
}

/// Summon `defendant` to answer `charge`.
///
/// # Errors
/// Returns [`HexisError::OwnerNotFound`] if the accuser does not exist, or
/// an error if the defendant does not exist.
pub fn put_on_trial(
    world: &mut World,
    defendant: OwnerId,
    authority: u64,
    accuser: Option<OwnerId>,
    charge: &str,
) -> hexis_core::Result<EffectRef> {
    if let Some(accuser) = accuser.filter(|a| world.owner(*a).is_none()) {
        return Err(HexisError::OwnerNotFound(accuser));
    }
    world.add_effect(
        defendant,
        OnTrial {
            authority,
            accuser,
            charge: charge.to_string(),
        },
        None,
    )
}

/// Loader for [`OnTrial`]. The authority must still be defined; a vanished
/// accuser only drops the accusation.
///
/// # Errors
/// Returns a [`LoadError`] for a malformed payload or a missing authority.
pub fn load_on_trial(
    payload: serde_json::Value,
    cx: &LoadContext<'_>,
) -> Result<Box<dyn Effect>, LoadError> {
    let mut trial: OnTrial = serde_json::from_value(payload)?;
    cx.require_definition(LEGAL_AUTHORITY, trial.authority)?;
    trial.accuser = trial.accuser.filter(|a| cx.owner_exists(*a));
    Ok(Box::new(trial))
}

impl Effect for OnTrial {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            format!("You are on trial for {}.", self.charge)
        } else {
            format!("{} is on trial for {}.", view.owner_name(), self.charge)
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
        cx.send_owner(format!("You are summoned to answer a charge of {}.", self.charge));
    }

    fn removal_effect(&mut self, cx: &mut EffectContext<'_>) {
        cx.send_owner("Your trial is over.");
    }

    fn removed_by(&self, event: &OwnerEvent) -> bool {
        event.is(OwnerEventKind::Died)
    }

    fn applies_to(&self, target: &QueryTarget) -> Applicability {
        match target {
            QueryTarget::LegalAuthority(id) => Applicability::from_bool(*id == self.authority),
            QueryTarget::Character(id) => Applicability::from_bool(self.accuser == Some(*id)),
            _ => Applicability::Unrecognised,
        }
    }

    fn applies_with(&self, target: &QueryTarget, third: &QueryTarget) -> Applicability {
        match (target, third) {
            (QueryTarget::LegalAuthority(authority), QueryTarget::Character(accuser)) => {
                Applicability::from_bool(
                    *authority == self.authority && self.accuser == Some(*accuser),
                )
            }
            _ => Applicability::Unrecognised,
        }
    }

    fn blocks(&self) -> &[ActionCategory] {
        &[ActionCategory::Movement]
    }

    fn blocking_description(&self, _category: ActionCategory, _view: &View<'_>) -> String {
        format!("You may not leave while on trial for {}.", self.charge)
    }
}
