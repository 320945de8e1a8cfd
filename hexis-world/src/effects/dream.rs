//! Dreaming: cycles through dream phases once a minute until it ends.

use hexis_core::{
    Applicability, Effect, EffectContext, EffectRef, Expiry, Heartbeat, HexisError, OwnerEvent,
    OwnerEventKind, OwnerId, SubscriptionHandle, View, World,
};
use serde::{Deserialize, Serialize};

/// Tunable: how many minutes a dream lasts.
pub const LENGTH_TUNABLE: &str = "dream_minutes";
const DEFAULT_LENGTH_MINUTES: f64 = 10.0;

/// A sleeping owner's dream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dreaming {
    /// Name of the dream.
    pub dream: String,
    /// Lines shown in turn, one per minute, wrapping around.
    pub phases: Vec<String>,
    /// Index of the phase last shown.
    pub stage: usize,
    /// Minutes dreamt so far.
    pub minutes: u32,
    #[serde(skip)]
    handle: Option<SubscriptionHandle>,
}

impl Dreaming {
    /// Registered tag.
    pub const TAG: &'static str = "dreaming";

    fn current(&self) -> Option<&str> {
        self.phases.get(self.stage).map(String::as_str)
    }
}

/// Start `owner` dreaming.
///
/// # Errors
/// Returns [`HexisError::Config`] if `phases` is empty, or an error if the
/// owner does not exist.
pub fn dream(
    world: &mut World,
    owner: OwnerId,
    name: &str,
    phases: Vec<String>,
) -> hexis_core::Result<EffectRef> {
    if phases.is_empty() {
        return Err(HexisError::Config(format!("dream '{name}' has no phases")));
    }
    let length = world
        .config()
        .tunable_secs_scaled(LENGTH_TUNABLE, DEFAULT_LENGTH_MINUTES, 60.0);
    world.add_effect(
        owner,
        Dreaming {
            dream: name.to_string(),
            phases,
            stage: 0,
            minutes: 0,
            handle: None,
        },
        Some(length),
    )
}

impl Effect for Dreaming {
    fn effect_type(&self) -> &'static str {
        Self::TAG
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            format!("You are dreaming of {}.", self.dream)
        } else {
            format!("{} stirs in a restless sleep.", view.owner_name())
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
        if let Some(line) = self.current() {
            let line = line.to_string();
            cx.send_owner(line);
        }
    }

    fn login(&mut self, cx: &mut EffectContext<'_>) {
        if self.handle.is_none() {
            self.handle = Some(cx.subscribe_heartbeat(Heartbeat::Minute));
        }
    }

    fn on_heartbeat(&mut self, _beat: Heartbeat, cx: &mut EffectContext<'_>) {
        self.minutes += 1;
        if !self.phases.is_empty() {
            self.stage = (self.stage + 1) % self.phases.len();
        }
        if let Some(line) = self.current() {
            let line = line.to_string();
            cx.send_owner(line);
        }
    }

    fn expire_effect(&mut self, cx: &mut EffectContext<'_>) -> Expiry {
        cx.send_owner(format!("The dream of {} fades.", self.dream));
        Expiry::Remove
    }

    fn removal_effect(&mut self, cx: &mut EffectContext<'_>) {
        if let Some(handle) = self.handle.take() {
            cx.unsubscribe(handle);
        }
        cx.send_owner("You wake up.");
    }

    fn removed_by(&self, event: &OwnerEvent) -> bool {
        matches!(
            event.kind,
            OwnerEventKind::StateChanged | OwnerEventKind::Died | OwnerEventKind::JoinedCombat
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::effects::testing::{ALDRIC, texts, world, world_with};

    const MINUTE: Duration = Duration::from_secs(60);

    fn phases() -> Vec<String> {
        vec!["You float above a dark sea.".into(), "A gull calls your name.".into()]
    }

    #[test]
    fn phases_cycle_each_minute() {
        let mut world = world();
        let dreaming = dream(&mut world, ALDRIC, "the sea", phases()).expect("dream");

        world.pulse(MINUTE);
        world.pulse(MINUTE);

        assert_eq!(
            texts(&mut world),
            vec![
                "You float above a dark sea.",
                "A gull calls your name.",
                "You float above a dark sea."
            ]
        );
        assert!(world.is_attached(dreaming));
        assert_eq!(world.remaining(dreaming), Some(MINUTE * 8));
    }

    #[test]
    fn ends_after_configured_minutes() {
        let mut config = hexis_core::EngineConfig::default();
        config.tunables.insert(LENGTH_TUNABLE.to_string(), 2.0);
        let mut world = world_with(config);
        let dreaming = dream(&mut world, ALDRIC, "the sea", phases()).expect("dream");
        texts(&mut world);

        world.pulse(MINUTE);
        world.pulse(MINUTE);

        assert!(!world.is_attached(dreaming));
        assert_eq!(
            texts(&mut world),
            vec![
                "A gull calls your name.",
                "You float above a dark sea.",
                "The dream of the sea fades.",
                "You wake up."
            ]
        );
        assert!(world.subscriptions().is_empty());
    }

    #[test]
    fn state_change_wakes_dreamer() {
        let mut world = world();
        let dreaming = dream(&mut world, ALDRIC, "the sea", phases()).expect("dream");
        texts(&mut world);

        world.emit(OwnerEvent::new(ALDRIC, OwnerEventKind::StateChanged));

        assert!(!world.is_attached(dreaming));
        assert_eq!(texts(&mut world), vec!["You wake up."]);
    }

    #[test]
    fn resubscribes_after_load() {
        let mut world = world();
        dream(&mut world, ALDRIC, "the sea", phases()).expect("dream");
        world.pulse(MINUTE);
        let record = world.owner_record(ALDRIC).expect("record");

        let mut restored = crate::effects::testing::world();
        restored.restore(vec![record]);
        let (dreaming, state) = restored.first_of_type::<Dreaming>(ALDRIC).expect("dreaming");
        assert_eq!(state.minutes, 1);
        assert_eq!(state.stage, 1);
        assert_eq!(restored.remaining(dreaming), Some(MINUTE * 9));

        restored.pulse(MINUTE);
        assert_eq!(texts(&mut restored), vec!["You float above a dark sea."]);
    }

    #[test]
    fn huge_length_saturates_instead_of_panicking() {
        let mut config = hexis_core::EngineConfig::default();
        config.tunables.insert(LENGTH_TUNABLE.to_string(), 1e300);
        let mut world = world_with(config);

        let dreaming = dream(&mut world, ALDRIC, "the sea", phases()).expect("dream");

        world.pulse(MINUTE * 60);
        assert!(world.is_attached(dreaming));
    }

    #[test]
    fn long_pulse_counts_every_minute() {
        let mut world = world();
        let dreaming = dream(&mut world, ALDRIC, "the sea", phases()).expect("dream");

        world.pulse(MINUTE * 5);

        let (_, state) = world.first_of_type::<Dreaming>(ALDRIC).expect("dreaming");
        assert_eq!(state.minutes, 5);
        assert!(world.is_attached(dreaming));
    }

    #[test]
    fn empty_dream_is_rejected() {
        let mut world = world();
        assert!(dream(&mut world, ALDRIC, "nothing", Vec::new()).is_err());
    }
}
