//! Property-Based Tests for the scheduler and removal paths
//!
//! Uses `proptest` to check ordering and idempotence invariants under
//! random schedules, pulse sizes and removal sequences.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;

use hexis_core::{
    Applicability, Effect, EffectContext, EffectRegistry, EngineConfig, Expiry, OwnerId, OwnerKind,
    Scheduler, View, World, WorldTime,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Records `(index, world time)` when it fires and counts removals.
struct Tracer {
    index: usize,
    fired: Arc<Mutex<Vec<(usize, WorldTime)>>>,
    removals: Arc<Mutex<Vec<usize>>>,
}

impl Effect for Tracer {
    fn effect_type(&self) -> &'static str {
        "tracer"
    }

    fn describe(&self, _view: &View<'_>) -> String {
        format!("tracer {}", self.index)
    }

    fn unrecognised_target(&self) -> Applicability {
        Applicability::Applies
    }

    fn expire_effect(&mut self, cx: &mut EffectContext<'_>) -> Expiry {
        self.fired.lock().push((self.index, cx.now()));
        Expiry::Remove
    }

    fn removal_effect(&mut self, _cx: &mut EffectContext<'_>) {
        self.removals.lock().push(self.index);
    }
}

fn world() -> World {
    let mut world = World::new(Arc::new(EffectRegistry::default()), EngineConfig::default());
    world.create_owner(OwnerId(1), OwnerKind::Room, "Vault").expect("owner");
    world
}

// ---------------------------------------------------------------------------
// Property: earlier due times never fire in a later pulse
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn due_times_fire_in_order(
        delays in prop::collection::vec(0u64..120_000, 1..40),
        steps in prop::collection::vec(1u64..15_000, 1..60),
    ) {
        let mut world = world();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let removals = Arc::new(Mutex::new(Vec::new()));
        for (index, &delay) in delays.iter().enumerate() {
            world.add_effect(
                OwnerId(1),
                Tracer { index, fired: Arc::clone(&fired), removals: Arc::clone(&removals) },
                Some(Duration::from_millis(delay)),
            ).expect("attach");
        }
        for step in &steps {
            world.pulse(Duration::from_millis(*step));
        }
        world.pulse(Duration::from_millis(120_000));

        let fired = fired.lock();
        prop_assert_eq!(fired.len(), delays.len());
        for pair in fired.windows(2) {
            let (a, at_a) = pair[0];
            let (b, at_b) = pair[1];
            prop_assert!(at_a <= at_b);
            prop_assert!(delays[a] <= delays[b] || at_a < at_b);
        }
        for &(index, at) in fired.iter() {
            prop_assert!(at.as_millis() >= delays[index]);
        }
    }

    #[test]
    fn reschedule_if_longer_is_monotonic(
        initial in 0u64..100_000,
        extensions in prop::collection::vec(0u64..200_000, 1..30),
    ) {
        let mut scheduler = Scheduler::default();
        scheduler.schedule("effect", WorldTime(initial));
        let mut expected = initial;
        for ext in extensions {
            let before = scheduler.due_at(&"effect").expect("pending");
            let changed = scheduler.reschedule_if_longer("effect", WorldTime(ext));
            let after = scheduler.due_at(&"effect").expect("pending");
            prop_assert!(after >= before);
            prop_assert_eq!(changed, ext > expected);
            expected = expected.max(ext);
            prop_assert_eq!(after, WorldTime(expected));
        }
    }

    #[test]
    fn reschedule_always_replaces(dues in prop::collection::vec(0u64..1_000_000, 1..30)) {
        let mut scheduler = Scheduler::default();
        for due in &dues {
            scheduler.schedule(7u32, WorldTime(*due));
            prop_assert_eq!(scheduler.due_at(&7), Some(WorldTime(*due)));
            prop_assert_eq!(scheduler.len(), 1);
        }
        let last = *dues.last().expect("non-empty");
        prop_assert_eq!(scheduler.take_due(WorldTime(last)), vec![7]);
        prop_assert!(scheduler.is_empty());
    }

    #[test]
    fn removal_fires_hook_once(
        count in 1usize..20,
        removals in prop::collection::vec(0usize..20, 0..60),
    ) {
        let mut world = world();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let removed = Arc::new(Mutex::new(Vec::new()));
        let refs: Vec<_> = (0..count)
            .map(|index| {
                world.add_effect(
                    OwnerId(1),
                    Tracer { index, fired: Arc::clone(&fired), removals: Arc::clone(&removed) },
                    Some(Duration::from_secs(30)),
                ).expect("attach")
            })
            .collect();

        for pick in removals {
            if let Some(&target) = refs.get(pick) {
                world.remove_effect(target, true);
            }
        }
        world.pulse(Duration::from_secs(60));

        let removed = removed.lock();
        let mut seen = removed.clone();
        seen.sort_unstable();
        seen.dedup();
        prop_assert_eq!(seen.len(), removed.len(), "removal hook ran twice for one instance");
        prop_assert_eq!(removed.len(), count);
        for &(index, _) in fired.lock().iter() {
            // Anything that expired was never removed before its due time.
            prop_assert_eq!(removed.iter().filter(|&&r| r == index).count(), 1);
        }
    }
}
