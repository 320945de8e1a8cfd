//! Integration Tests: End-to-End Effect Life Cycles
//!
//! These tests drive a whole [`World`] through realistic sequences:
//! attach → pulse → expire, removal and cancellation paths, owner events,
//! and save → store → restore round-trips.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use hexis_core::config::PersistenceConfig;
use hexis_core::query::CheckKind;
use hexis_core::{
    ActionCategory, Applicability, ApplicabilityProg, Effect, EffectContext, EffectRegistry,
    EffectStore, EffectType, EngineConfig, Expiry, OwnerEvent, OwnerEventKind, OwnerId, OwnerKind,
    OwnerRecord, PersistedEffect, QueryTarget, SkipReason, SubscriptionHandle, View, World,
    WorldTime, load_serde,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

type Log = Arc<Mutex<Vec<&'static str>>>;

#[derive(Clone, Copy)]
enum Policy {
    Remove,
    Reschedule(Duration),
    Transform,
}

/// Non-durable effect that records every hook call.
struct Tracked {
    log: Log,
    policy: Policy,
}

impl Tracked {
    fn new(log: &Log, policy: Policy) -> Self {
        Self {
            log: Arc::clone(log),
            policy,
        }
    }
}

impl Effect for Tracked {
    fn effect_type(&self) -> &'static str {
        "tracked"
    }

    fn describe(&self, view: &View<'_>) -> String {
        format!("{} is being tracked", view.owner_name())
    }

    fn unrecognised_target(&self) -> Applicability {
        Applicability::Applies
    }

    fn initial_effect(&mut self, _cx: &mut EffectContext<'_>) {
        self.log.lock().push("initial");
    }

    fn expire_effect(&mut self, _cx: &mut EffectContext<'_>) -> Expiry {
        self.log.lock().push("expire");
        match self.policy {
            Policy::Remove => Expiry::Remove,
            Policy::Reschedule(delay) => Expiry::Reschedule(delay),
            Policy::Transform => Expiry::Transform {
                into: Box::new(Mark::new("scar", 2)),
                duration: None,
            },
        }
    }

    fn removal_effect(&mut self, _cx: &mut EffectContext<'_>) {
        self.log.lock().push("removal");
    }

    fn cancel_effect(&mut self, _cx: &mut EffectContext<'_>) {
        self.log.lock().push("cancel");
    }

    fn removed_by(&self, event: &OwnerEvent) -> bool {
        event.is(OwnerEventKind::Died)
    }
}

/// Durable effect with applicability and blocking behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Mark {
    label: String,
    strength: u8,
}

impl Mark {
    fn new(label: &str, strength: u8) -> Self {
        Self {
            label: label.to_string(),
            strength,
        }
    }
}

impl Effect for Mark {
    fn effect_type(&self) -> &'static str {
        "mark"
    }

    fn describe(&self, view: &View<'_>) -> String {
        if view.is_self() {
            format!("You bear a {} (strength {}).", self.label, self.strength)
        } else {
            format!("{} bears a {}.", view.owner_name(), self.label)
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

    fn applies_to(&self, target: &QueryTarget) -> Applicability {
        match target {
            QueryTarget::Check(CheckKind::Perception) => Applicability::Applies,
            QueryTarget::Check(_) => Applicability::DoesNotApply,
            _ => Applicability::Unrecognised,
        }
    }

    fn blocks(&self) -> &[ActionCategory] {
        if self.strength > 5 { &[ActionCategory::Speech] } else { &[] }
    }

    fn blocking_description(&self, _category: ActionCategory, _view: &View<'_>) -> String {
        format!("Your {} keeps you silent.", self.label)
    }
}

/// Blocks movement without explaining why.
struct Mute;

impl Effect for Mute {
    fn effect_type(&self) -> &'static str {
        "mute"
    }

    fn describe(&self, _view: &View<'_>) -> String {
        "rooted".to_string()
    }

    fn unrecognised_target(&self) -> Applicability {
        Applicability::Applies
    }

    fn blocks(&self) -> &[ActionCategory] {
        &[ActionCategory::Movement]
    }
}

/// Watches another owner and releases its handles on removal.
struct Watcher {
    target: OwnerId,
    heard: Arc<Mutex<u32>>,
    handles: Vec<SubscriptionHandle>,
}

impl Effect for Watcher {
    fn effect_type(&self) -> &'static str {
        "watcher"
    }

    fn describe(&self, _view: &View<'_>) -> String {
        "watching".to_string()
    }

    fn unrecognised_target(&self) -> Applicability {
        Applicability::DoesNotApply
    }

    fn initial_effect(&mut self, cx: &mut EffectContext<'_>) {
        self.handles.push(cx.subscribe(self.target, OwnerEventKind::Moved));
    }

    fn on_event(&mut self, _event: &OwnerEvent, _cx: &mut EffectContext<'_>) {
        *self.heard.lock() += 1;
    }

    fn removal_effect(&mut self, cx: &mut EffectContext<'_>) {
        cx.unsubscribe_all(&mut self.handles);
    }
}

#[derive(Debug)]
struct Never;

impl ApplicabilityProg for Never {
    fn id(&self) -> u64 {
        99
    }

    fn evaluate(
        &self,
        _owner: OwnerId,
        _target: Option<&QueryTarget>,
        _third: Option<&QueryTarget>,
    ) -> bool {
        false
    }
}

fn registry() -> Arc<EffectRegistry> {
    let registry = EffectRegistry::builder()
        .register(EffectType::new::<Mark>("mark").loader(load_serde::<Mark>))
        .register(EffectType::new::<Tracked>("tracked"))
        .register(EffectType::new::<Mute>("mute"))
        .register(EffectType::new::<Watcher>("watcher"))
        .build()
        .expect("registry builds");
    Arc::new(registry)
}

const HERO: OwnerId = OwnerId(1);
const RIVAL: OwnerId = OwnerId(2);

fn world() -> World {
    let mut world = World::new(registry(), EngineConfig::default());
    world.create_owner(HERO, OwnerKind::Character, "Aldric").expect("hero");
    world.create_owner(RIVAL, OwnerKind::Character, "Brenna").expect("rival");
    world
}

fn entries(log: &Log) -> Vec<&'static str> {
    log.lock().clone()
}

// ---------------------------------------------------------------------------
// Scheduling life cycle
// ---------------------------------------------------------------------------

#[test]
fn thirty_second_effect_expires_exactly_once() {
    let mut world = world();
    let log = Log::default();
    let effect = world
        .add_effect(HERO, Tracked::new(&log, Policy::Remove), Some(Duration::from_secs(30)))
        .expect("attach");

    world.pulse(Duration::from_secs(29));
    assert!(world.is_attached(effect));
    assert!(world.applies(effect, None));
    assert_eq!(entries(&log), vec!["initial"]);

    let summary = world.pulse(Duration::from_secs(2));
    assert_eq!(summary.fired, 1);
    assert!(!world.is_attached(effect));
    assert_eq!(entries(&log), vec!["initial", "expire", "removal"]);

    world.pulse(Duration::from_secs(60));
    assert_eq!(entries(&log), vec!["initial", "expire", "removal"]);
}

#[test]
fn rescheduling_effect_stays_attached_with_new_due_time() {
    let mut world = world();
    let log = Log::default();
    let effect = world
        .add_effect(
            HERO,
            Tracked::new(&log, Policy::Reschedule(Duration::from_secs(10))),
            Some(Duration::from_secs(30)),
        )
        .expect("attach");

    world.pulse(Duration::from_secs(29));
    world.pulse(Duration::from_secs(2));

    assert!(world.is_attached(effect));
    assert_eq!(world.due_at(effect), Some(WorldTime::from_secs(41)));
    assert_eq!(entries(&log), vec!["initial", "expire"]);
}

#[test]
fn transform_replaces_effect() {
    let mut world = world();
    let log = Log::default();
    let effect = world
        .add_effect(HERO, Tracked::new(&log, Policy::Transform), Some(Duration::from_secs(5)))
        .expect("attach");

    world.pulse(Duration::from_secs(5));

    assert!(!world.is_attached(effect));
    let (_, mark) = world.first_of_type::<Mark>(HERO).expect("replacement attached");
    assert_eq!(mark.label, "scar");
    assert_eq!(entries(&log), vec!["initial", "expire", "removal"]);
}

#[test]
fn earlier_due_time_fires_first() {
    let mut world = world();
    let log = Log::default();
    let late = world
        .add_effect(HERO, Tracked::new(&log, Policy::Remove), Some(Duration::from_secs(20)))
        .expect("attach");
    let early = world
        .add_effect(RIVAL, Tracked::new(&log, Policy::Remove), Some(Duration::from_secs(10)))
        .expect("attach");

    world.pulse(Duration::from_secs(15));
    assert!(!world.is_attached(early));
    assert!(world.is_attached(late));
}

#[test]
fn reschedule_if_longer_never_shortens() {
    let mut world = world();
    let log = Log::default();
    let effect = world
        .add_effect(HERO, Tracked::new(&log, Policy::Remove), Some(Duration::from_secs(30)))
        .expect("attach");

    assert!(!world.reschedule_if_longer(effect, Duration::from_secs(10)).expect("attached"));
    assert_eq!(world.due_at(effect), Some(WorldTime::from_secs(30)));
    assert!(world.reschedule_if_longer(effect, Duration::from_secs(60)).expect("attached"));
    assert_eq!(world.due_at(effect), Some(WorldTime::from_secs(60)));

    world.reschedule(effect, Duration::from_secs(5)).expect("attached");
    assert_eq!(world.due_at(effect), Some(WorldTime::from_secs(5)));
}

// ---------------------------------------------------------------------------
// Termination paths
// ---------------------------------------------------------------------------

#[test]
fn removal_is_idempotent() {
    let mut world = world();
    let log = Log::default();
    let effect = world.add_effect(HERO, Tracked::new(&log, Policy::Remove), None).expect("attach");

    assert!(world.remove_effect(effect, true));
    assert!(!world.remove_effect(effect, true));
    assert_eq!(entries(&log), vec!["initial", "removal"]);
}

#[test]
fn removed_effect_never_expires() {
    let mut world = world();
    let log = Log::default();
    let effect = world
        .add_effect(HERO, Tracked::new(&log, Policy::Remove), Some(Duration::from_secs(30)))
        .expect("attach");

    world.pulse(Duration::from_secs(10));
    assert!(world.remove_effect(effect, true));
    world.pulse(Duration::from_secs(60));

    assert!(!entries(&log).contains(&"expire"));
    assert_eq!(world.pending_count(), 0);
}

#[test]
fn cancel_runs_cancel_hook_only_when_scheduled() {
    let mut world = world();
    let log = Log::default();
    let scheduled = world
        .add_effect(HERO, Tracked::new(&log, Policy::Remove), Some(Duration::from_secs(30)))
        .expect("attach");
    assert!(world.cancel(scheduled));
    assert_eq!(entries(&log), vec!["initial", "cancel"]);

    let log = Log::default();
    let unscheduled = world
        .add_effect(HERO, Tracked::new(&log, Policy::Remove), None)
        .expect("attach");
    assert!(world.cancel(unscheduled));
    assert_eq!(entries(&log), vec!["initial", "removal"]);

    let counters = world.counters().snapshot();
    assert_eq!(counters.cancelled, 1);
    assert_eq!(counters.removed, 1);
}

#[test]
fn silent_removal_skips_hook() {
    let mut world = world();
    let log = Log::default();
    let effect = world.add_effect(HERO, Tracked::new(&log, Policy::Remove), None).expect("attach");

    assert!(world.remove_effect(effect, false));
    assert_eq!(entries(&log), vec!["initial"]);
}

#[test]
fn owner_event_removes_matching_effects() {
    let mut world = world();
    let log = Log::default();
    let effect = world.add_effect(HERO, Tracked::new(&log, Policy::Remove), None).expect("attach");

    world.emit(OwnerEvent::new(HERO, OwnerEventKind::Moved));
    assert!(world.is_attached(effect));

    world.emit(OwnerEvent::new(HERO, OwnerEventKind::Died));
    assert!(!world.is_attached(effect));
    assert_eq!(entries(&log), vec!["initial", "removal"]);
}

#[test]
fn destroying_owner_runs_removal_for_each_effect() {
    let mut world = world();
    let log = Log::default();
    world
        .add_effect(HERO, Tracked::new(&log, Policy::Remove), Some(Duration::from_secs(30)))
        .expect("attach");
    world.add_effect(HERO, Tracked::new(&log, Policy::Remove), None).expect("attach");

    assert!(world.destroy_owner(HERO));
    assert_eq!(entries(&log), vec!["initial", "initial", "removal", "removal"]);
    assert!(world.add_effect(HERO, Mute, None).is_err());
    assert_eq!(world.pending_count(), 0);
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[test]
fn watcher_hears_until_removed() {
    let mut world = world();
    let heard = Arc::new(Mutex::new(0));
    let watcher = world
        .add_effect(
            HERO,
            Watcher {
                target: RIVAL,
                heard: Arc::clone(&heard),
                handles: Vec::new(),
            },
            None,
        )
        .expect("attach");

    world.emit(OwnerEvent::new(RIVAL, OwnerEventKind::Moved));
    world.emit(OwnerEvent::new(RIVAL, OwnerEventKind::Died));
    assert_eq!(*heard.lock(), 1);

    assert!(world.remove_effect(watcher, true));
    world.emit(OwnerEvent::new(RIVAL, OwnerEventKind::Moved));
    assert_eq!(*heard.lock(), 1);
    assert!(world.subscriptions().is_empty());
    assert_eq!(world.counters().snapshot().zombie_subscriptions, 0);
}

#[test]
fn destroying_source_releases_subscriptions() {
    let mut world = world();
    let heard = Arc::new(Mutex::new(0));
    world
        .add_effect(
            HERO,
            Watcher {
                target: RIVAL,
                heard: Arc::clone(&heard),
                handles: Vec::new(),
            },
            None,
        )
        .expect("attach");

    assert!(world.destroy_owner(RIVAL));
    assert!(world.subscriptions().is_empty());
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[test]
fn applicability_uses_explicit_fallback() {
    let mut world = world();
    let mark = world.add_effect(HERO, Mark::new("brand", 3), None).expect("attach");

    assert!(world.applies(mark, None));
    assert!(world.applies(mark, Some(&QueryTarget::Check(CheckKind::Perception))));
    assert!(!world.applies(mark, Some(&QueryTarget::Check(CheckKind::Melee))));
    assert!(!world.applies(mark, Some(&QueryTarget::Item(OwnerId(40)))));

    let tracked = world
        .add_effect(HERO, Tracked::new(&Log::default(), Policy::Remove), None)
        .expect("attach");
    assert!(world.applies(tracked, Some(&QueryTarget::Item(OwnerId(40)))));
}

#[test]
fn prog_rejection_wins() {
    let mut world = world();
    let mark = world.add_effect(HERO, Mark::new("brand", 3), None).expect("attach");
    world.set_prog(mark, Some(Arc::new(Never))).expect("attached");

    assert!(!world.applies(mark, None));
    assert!(!world.applies(mark, Some(&QueryTarget::Check(CheckKind::Perception))));
}

#[test]
fn blocking_always_explains() {
    let mut world = world();
    world.add_effect(HERO, Mute, None).expect("attach");
    world.add_effect(HERO, Mark::new("gag", 9), None).expect("attach");

    let blocked = world
        .blocking_effect(HERO, ActionCategory::Movement, Some(HERO))
        .expect("movement blocked");
    assert_eq!(blocked.effect_type, "mute");
    assert!(!blocked.message.is_empty());

    let blocked = world
        .blocking_effect(HERO, ActionCategory::Speech, Some(HERO))
        .expect("speech blocked");
    assert_eq!(blocked.message, "Your gag keeps you silent.");

    assert!(world.blocking_effect(HERO, ActionCategory::Crafting, None).is_none());
    assert_eq!(world.blocking_effects(HERO, ActionCategory::Any, None).len(), 2);
}

#[test]
fn snapshot_describes_from_voyeur() {
    let mut world = world();
    world.add_effect(HERO, Mark::new("brand", 3), Some(Duration::from_secs(9))).expect("attach");

    let own = world.snapshot(HERO, Some(HERO)).expect("snapshot");
    assert_eq!(own.effects[0].description, "You bear a brand (strength 3).");
    assert_eq!(own.effects[0].due_at, Some(WorldTime::from_secs(9)));

    let other = world.snapshot(HERO, Some(RIVAL)).expect("snapshot");
    assert_eq!(other.effects[0].description, "Aldric bears a brand.");
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn save_store_restore_round_trip() {
    let mut world = world();
    let mark = world
        .add_effect(HERO, Mark::new("gag", 9), Some(Duration::from_secs(30)))
        .expect("attach");
    world.add_effect(HERO, Tracked::new(&Log::default(), Policy::Remove), None).expect("attach");
    world.pulse(Duration::from_secs(10));

    assert_eq!(world.dirty_owners(), vec![HERO]);
    let records = world.take_dirty_records();
    assert!(world.dirty_owners().is_empty());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].effects.len(), 1, "only durable effects are saved");
    assert_eq!(records[0].effects[0].remaining_ms, Some(20_000));

    let mut store = EffectStore::open_in_memory(&PersistenceConfig::default()).expect("store");
    store.save_owners(&records).expect("save");
    let loaded = store.load_all().expect("load");

    let mut restored = World::new(registry(), EngineConfig::default());
    let report = restored.restore(loaded);
    assert!(report.is_clean());
    assert_eq!(report.loaded, 1);
    assert!(restored.dirty_owners().is_empty());

    assert!(restored.is_attached(mark), "instance ID survives");
    assert_eq!(restored.remaining(mark), Some(Duration::from_secs(20)));
    for voyeur in [Some(HERO), None] {
        assert_eq!(restored.describe(mark, voyeur), world.describe(mark, voyeur));
    }
    for target in [
        QueryTarget::Check(CheckKind::Perception),
        QueryTarget::Check(CheckKind::Stealth),
        QueryTarget::Room(OwnerId(3)),
    ] {
        assert_eq!(restored.applies(mark, Some(&target)), world.applies(mark, Some(&target)));
    }
    assert_eq!(
        restored.is_blocked(HERO, ActionCategory::Speech),
        world.is_blocked(HERO, ActionCategory::Speech)
    );
}

#[test]
fn unknown_tag_skips_only_that_entry() {
    let mark = |label: &str| PersistedEffect {
        tag: "mark".to_string(),
        id: hexis_core::EffectId::new(),
        payload: serde_json::json!({ "label": label, "strength": 1 }),
        prog: None,
        remaining_ms: None,
    };
    let record = OwnerRecord {
        owner: HERO,
        kind: OwnerKind::Character,
        name: "Aldric".to_string(),
        effects: vec![
            mark("first"),
            PersistedEffect {
                tag: "retired_curse".to_string(),
                id: hexis_core::EffectId::new(),
                payload: serde_json::json!({}),
                prog: None,
                remaining_ms: None,
            },
            PersistedEffect {
                payload: serde_json::json!({ "label": 7 }),
                ..mark("broken")
            },
            mark("last"),
        ],
    };

    let mut world = World::new(registry(), EngineConfig::default());
    let report = world.restore(vec![record]);

    assert_eq!(report.loaded, 2);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.skipped[0].reason, SkipReason::UnknownType);
    assert!(matches!(report.skipped[1].reason, SkipReason::Failed(_)));
    let labels: Vec<String> = world
        .effects_of_type::<Mark>(HERO)
        .into_iter()
        .map(|(_, m)| m.label.clone())
        .collect();
    assert_eq!(labels, vec!["first", "last"]);
    assert_eq!(world.dirty_owners(), vec![HERO], "next save drops the junk");
    assert_eq!(world.counters().snapshot().loads_skipped, 2);
}

#[test]
fn restored_effects_skip_initial_hook() {
    let mut world = world();
    world.add_effect(HERO, Mark::new("brand", 1), None).expect("attach");
    let records = world.take_dirty_records();

    let mut restored = World::new(registry(), EngineConfig::default());
    restored.restore(records);

    assert_eq!(restored.counters().snapshot().added, 1);
    assert!(restored.messages().is_empty());
}
