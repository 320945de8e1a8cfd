//! The world: owners, their effects, and the single tick context that
//! mutates them.
//!
//! Public entry points apply a change, then drain the command queue that
//! hooks filled while it ran. Internal helpers (`attach`, `terminate`,
//! `dispatch`, `invoke`) never drain the queue themselves; the single
//! [`World::flush`] loop does, so hook cascades are processed iteratively.
//!
//! Every hook runs under `catch_unwind`. A panicking effect is marked
//! faulted: it stays in its owner's list (so the list never shifts) but
//! queries skip it and it never fires again. Its schedule entry and
//! subscriptions are released when the fault is seen. Effects paired with
//! a faulted one stay attached until their own removal path runs.

mod persist;
mod pulse;
mod query;

pub use persist::{LoadReport, SkipReason, SkippedEffect};
pub use pulse::PulseSummary;
pub use query::{Blocked, EffectSummary, OwnerSnapshot};

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::effect::{Command, Effect, EffectContext, Message};
use crate::error::{HexisError, Result};
use crate::event::{OwnerEvent, OwnerEventKind};
use crate::metrics::{EngineCounters, spans};
use crate::owner::{AttachedEffect, Owner, Owners};
use crate::query::ApplicabilityProg;
use crate::registry::{EffectRegistry, NullResolver, ReferenceResolver};
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::subscription::{SubscriptionRegistry, Topic};
use crate::types::{EffectId, EffectRef, OwnerId, OwnerKind, WorldTime};

/// How an effect left its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Explicit removal or a `removed_by` owner event.
    Removed,
    /// The due time arrived and the effect chose to go.
    Expired,
    /// Cancelled before its due time.
    Cancelled,
    /// The owner was destroyed.
    OwnerDestroyed,
}

/// The effect engine's world state.
pub struct World {
    clock: WorldTime,
    /// Elapsed time below clock resolution, applied by a later pulse.
    carry: Duration,
    owners: Owners,
    scheduler: Scheduler<EffectRef>,
    subscriptions: SubscriptionRegistry,
    registry: Arc<EffectRegistry>,
    resolver: Box<dyn ReferenceResolver>,
    config: EngineConfig,
    commands: VecDeque<Command>,
    outbox: Vec<Message>,
    destroyed: Vec<OwnerId>,
    counters: EngineCounters,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("clock", &self.clock)
            .field("owners", &self.owners.len())
            .field("pending", &self.scheduler.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new(registry: Arc<EffectRegistry>, config: EngineConfig) -> Self {
        Self {
            clock: WorldTime::ZERO,
            carry: Duration::ZERO,
            owners: Owners::default(),
            scheduler: Scheduler::new(config.scheduler.compaction_slack),
            subscriptions: SubscriptionRegistry::new(),
            registry,
            resolver: Box::new(NullResolver),
            config,
            commands: VecDeque::new(),
            outbox: Vec::new(),
            destroyed: Vec::new(),
            counters: EngineCounters::new(),
        }
    }

    /// Use `resolver` for definitions and progs while loading.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl ReferenceResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current world time.
    #[must_use]
    pub fn now(&self) -> WorldTime {
        self.clock
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The effect type registry.
    #[must_use]
    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    /// Life-cycle counters.
    #[must_use]
    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    /// Live subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Scheduler statistics.
    #[must_use]
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// All owners.
    #[must_use]
    pub fn owners(&self) -> &Owners {
        &self.owners
    }

    /// One owner.
    #[must_use]
    pub fn owner(&self, id: OwnerId) -> Option<&Owner> {
        self.owners.get(id)
    }

    /// Whether `target` is attached (faulted or not).
    #[must_use]
    pub fn is_attached(&self, target: EffectRef) -> bool {
        self.owners.get(target.owner).is_some_and(|o| o.contains(target.effect))
    }

    /// Whether `target` is attached and has been faulted by a panicking hook.
    #[must_use]
    pub fn is_faulted(&self, target: EffectRef) -> bool {
        self.owners.get(target.owner).is_some_and(|o| o.is_faulted(target.effect))
    }

    // ------------------------------------------------------------------
    // Owners
    // ------------------------------------------------------------------

    /// Register a new owner.
    ///
    /// # Errors
    /// Returns [`HexisError::DuplicateOwner`] if the ID is taken.
    pub fn create_owner(
        &mut self,
        id: OwnerId,
        kind: OwnerKind,
        name: impl Into<String>,
    ) -> Result<()> {
        if self.owners.contains(id) {
            return Err(HexisError::DuplicateOwner(id));
        }
        self.owners.insert(Owner::new(id, kind, name));
        debug!(owner = %id, kind = %kind, "owner registered");
        Ok(())
    }

    /// Run `login` on every effect of `owner`.
    ///
    /// # Errors
    /// Returns [`HexisError::OwnerNotFound`] if the owner does not exist.
    pub fn login(&mut self, owner: OwnerId) -> Result<()> {
        let ids = self.owners.get(owner).ok_or(HexisError::OwnerNotFound(owner))?.effect_ids();
        for id in ids {
            self.invoke(EffectRef::new(owner, id), "login", true, |e, cx| e.login(cx));
            self.flush();
        }
        Ok(())
    }

    /// Destroy an owner: notify subscribers, terminate every effect with
    /// `removal_effect`, purge subscriptions sourced at it, and forget it.
    ///
    /// Returns `false` if the owner did not exist.
    pub fn destroy_owner(&mut self, owner: OwnerId) -> bool {
        if !self.owners.contains(owner) {
            return false;
        }
        self.dispatch(OwnerEvent::new(owner, OwnerEventKind::Destroyed));
        self.flush();

        let mut rounds = 0;
        while let Some(id) = self.owners.get(owner).and_then(|o| o.effects.first().map(|s| s.id)) {
            self.terminate(EffectRef::new(owner, id), Termination::OwnerDestroyed, true);
            self.flush();
            rounds += 1;
            if rounds > self.config.scheduler.max_commands_per_flush {
                error!(
                    owner = %owner,
                    "effects kept re-attaching to a destroyed owner; dropping the rest"
                );
                break;
            }
        }

        if let Some(gone) = self.owners.remove(owner) {
            for slot in gone.effects {
                let target = EffectRef::new(owner, slot.id);
                self.scheduler.cancel(&target);
                self.subscriptions.release_subscriber(target);
            }
        }
        let released = self.subscriptions.release_source(owner);
        self.destroyed.push(owner);
        debug!(owner = %owner, released_subscriptions = released, "owner destroyed");
        true
    }

    /// Owners destroyed since the last call, for store cleanup.
    pub fn take_destroyed(&mut self) -> Vec<OwnerId> {
        std::mem::take(&mut self.destroyed)
    }

    // ------------------------------------------------------------------
    // Attachment
    // ------------------------------------------------------------------

    /// Attach `effect` to `owner`, optionally scheduling it to expire.
    ///
    /// Runs `initial_effect`, then applies any commands it issued.
    ///
    /// # Errors
    /// Returns [`HexisError::OwnerNotFound`] if the owner does not exist.
    pub fn add_effect(
        &mut self,
        owner: OwnerId,
        effect: impl Effect,
        duration: Option<Duration>,
    ) -> Result<EffectRef> {
        self.add_effect_with_id(owner, EffectId::new(), Box::new(effect), duration)
    }

    /// Attach an already boxed effect.
    ///
    /// # Errors
    /// Returns [`HexisError::OwnerNotFound`] if the owner does not exist.
    pub fn add_boxed_effect(
        &mut self,
        owner: OwnerId,
        effect: Box<dyn Effect>,
        duration: Option<Duration>,
    ) -> Result<EffectRef> {
        self.add_effect_with_id(owner, EffectId::new(), effect, duration)
    }

    /// Attach under a pre-allocated ID, so linked pairs can reference each
    /// other from the start.
    ///
    /// # Errors
    /// Returns [`HexisError::OwnerNotFound`] or [`HexisError::DuplicateEffect`].
    pub fn add_effect_with_id(
        &mut self,
        owner: OwnerId,
        id: EffectId,
        effect: Box<dyn Effect>,
        duration: Option<Duration>,
    ) -> Result<EffectRef> {
        let target = self.attach(owner, id, effect, duration, true)?;
        self.flush();
        Ok(target)
    }

    /// Attach or detach an applicability prog.
    ///
    /// # Errors
    /// Returns [`HexisError::EffectNotFound`] if the effect is not attached.
    pub fn set_prog(
        &mut self,
        target: EffectRef,
        prog: Option<Arc<dyn ApplicabilityProg>>,
    ) -> Result<()> {
        let owner = self
            .owners
            .get_mut(target.owner)
            .ok_or(HexisError::EffectNotFound(target))?;
        let slot = owner.slot_mut(target.effect).ok_or(HexisError::EffectNotFound(target))?;
        slot.prog = prog;
        let saving = slot.saving;
        if saving {
            slot.changed = true;
            owner.dirty = true;
        }
        Ok(())
    }

    /// Remove an effect. Removing a detached effect is a no-op returning
    /// `false`; `removal_effect` runs at most once per instance.
    pub fn remove_effect(&mut self, target: EffectRef, fire_removal: bool) -> bool {
        let removed = self.terminate(target, Termination::Removed, fire_removal);
        self.flush();
        removed
    }

    /// Remove every live effect of type `T` from `owner`. Returns the count.
    pub fn remove_effects_of_type<T: Effect>(
        &mut self,
        owner: OwnerId,
        fire_removal: bool,
    ) -> usize {
        let targets: Vec<EffectRef> = self
            .owners
            .get(owner)
            .map(|o| {
                o.effects_of_type::<T>()
                    .into_iter()
                    .map(|(id, _)| EffectRef::new(owner, id))
                    .collect()
            })
            .unwrap_or_default();
        targets
            .into_iter()
            .filter(|&target| self.remove_effect(target, fire_removal))
            .count()
    }

    /// Cancel an effect before its due time, running `cancel_effect`.
    ///
    /// An effect with nothing pending is removed normally.
    pub fn cancel(&mut self, target: EffectRef) -> bool {
        let cancelled = self.cancel_now(target);
        self.flush();
        cancelled
    }

    /// Mutate a concrete effect in place, marking it changed.
    pub fn with_effect_mut<T: Effect, R>(
        &mut self,
        target: EffectRef,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let owner = self.owners.get_mut(target.owner)?;
        let saving;
        let result = {
            let slot = owner.slot_mut(target.effect)?;
            if slot.faulted.get() {
                return None;
            }
            saving = slot.saving;
            let typed = slot.effect.as_deref_mut()?.as_any_mut().downcast_mut::<T>()?;
            let result = f(typed);
            if saving {
                slot.changed = true;
            }
            result
        };
        if saving {
            owner.dirty = true;
        }
        Some(result)
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Set the due time to `delay` from now, replacing any pending one.
    ///
    /// # Errors
    /// Returns [`HexisError::EffectNotFound`] if the effect is not attached.
    pub fn reschedule(&mut self, target: EffectRef, delay: Duration) -> Result<()> {
        self.schedule_at(target, self.clock + delay)
    }

    /// Set an absolute due time. A time in the past fires on the next pulse.
    ///
    /// # Errors
    /// Returns [`HexisError::EffectNotFound`] if the effect is not attached.
    pub fn schedule_at(&mut self, target: EffectRef, at: WorldTime) -> Result<()> {
        self.require_live(target)?;
        self.scheduler.schedule(target, at);
        EngineCounters::incr(&self.counters.rescheduled);
        Ok(())
    }

    /// Move the due time later only; schedules if nothing is pending.
    /// Returns whether the due time changed.
    ///
    /// # Errors
    /// Returns [`HexisError::EffectNotFound`] if the effect is not attached.
    pub fn reschedule_if_longer(&mut self, target: EffectRef, delay: Duration) -> Result<bool> {
        self.require_live(target)?;
        let changed = self.scheduler.reschedule_if_longer(target, self.clock + delay);
        if changed {
            EngineCounters::incr(&self.counters.rescheduled);
        }
        Ok(changed)
    }

    /// Pending due time of an effect.
    #[must_use]
    pub fn due_at(&self, target: EffectRef) -> Option<WorldTime> {
        self.scheduler.due_at(&target)
    }

    /// Time left before an effect fires.
    #[must_use]
    pub fn remaining(&self, target: EffectRef) -> Option<Duration> {
        self.scheduler.remaining(&target, self.clock)
    }

    /// Number of effects with a pending due time.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    // ------------------------------------------------------------------
    // Events & messages
    // ------------------------------------------------------------------

    /// Raise an owner event: the owner's own `removed_by` effects go first,
    /// then subscribers are notified in subscription order.
    pub fn emit(&mut self, event: OwnerEvent) {
        self.dispatch(event);
        self.flush();
    }

    /// Take every message produced since the last drain.
    pub fn drain_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbox)
    }

    /// Messages produced since the last drain.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.outbox
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_live(&self, target: EffectRef) -> Result<()> {
        if self.is_attached(target) && !self.is_faulted(target) {
            Ok(())
        } else {
            Err(HexisError::EffectNotFound(target))
        }
    }

    /// Push a slot onto the owner's list and schedule it. Hooks run only
    /// when `fresh`; restored effects get `after_load` from the restore pass.
    fn attach(
        &mut self,
        owner: OwnerId,
        id: EffectId,
        effect: Box<dyn Effect>,
        duration: Option<Duration>,
        fresh: bool,
    ) -> Result<EffectRef> {
        let target = EffectRef::new(owner, id);
        let host = self.owners.get_mut(owner).ok_or(HexisError::OwnerNotFound(owner))?;
        if host.contains(id) {
            return Err(HexisError::DuplicateEffect(target));
        }
        let slot = AttachedEffect::new(id, effect);
        let tag = slot.tag;
        if slot.saving {
            host.dirty = true;
        }
        host.effects.push(slot);
        EngineCounters::incr(&self.counters.added);
        debug!(owner = %owner, effect = %id, tag, "effect attached");

        if let Some(duration) = duration {
            self.scheduler.schedule(target, self.clock + duration);
        }
        if fresh {
            self.invoke(target, "initial_effect", true, |e, cx| e.initial_effect(cx));
        }
        Ok(target)
    }

    /// Detach an effect, running the matching hook first. Idempotent.
    fn terminate(&mut self, target: EffectRef, how: Termination, fire_hook: bool) -> bool {
        let Some(slot) = self.owners.get(target.owner).and_then(|o| o.slot(target.effect)) else {
            return false;
        };
        let faulted = slot.faulted.get();
        self.scheduler.cancel(&target);

        if fire_hook && !faulted {
            match how {
                Termination::Cancelled => {
                    self.invoke(target, "cancel_effect", false, |e, cx| e.cancel_effect(cx))
                }
                _ => self.invoke(target, "removal_effect", false, |e, cx| e.removal_effect(cx)),
            };
        }

        let Some(owner) = self.owners.get_mut(target.owner) else {
            return false;
        };
        let Some(detached) = owner.detach(target.effect) else {
            return false;
        };
        if detached.saving {
            owner.dirty = true;
        }

        let leftover = self.subscriptions.release_subscriber(target);
        if leftover > 0 {
            if fire_hook && !faulted {
                EngineCounters::add(&self.counters.zombie_subscriptions, leftover as u64);
                warn!(
                    owner = %target.owner,
                    effect = %target.effect,
                    tag = detached.tag,
                    leftover,
                    "effect terminated without releasing its subscriptions"
                );
            } else {
                debug!(
                    effect = %target.effect,
                    leftover,
                    "released subscriptions of silently removed effect"
                );
            }
        }

        let counter = match how {
            Termination::Removed | Termination::OwnerDestroyed => &self.counters.removed,
            Termination::Expired => &self.counters.expired,
            Termination::Cancelled => &self.counters.cancelled,
        };
        EngineCounters::incr(counter);
        debug!(
            owner = %target.owner,
            effect = %target.effect,
            tag = detached.tag,
            reason = ?how,
            "effect terminated"
        );
        true
    }

    fn cancel_now(&mut self, target: EffectRef) -> bool {
        if self.scheduler.contains(&target) {
            self.terminate(target, Termination::Cancelled, true)
        } else {
            self.terminate(target, Termination::Removed, true)
        }
    }

    /// Deliver an owner event without draining the command queue.
    fn dispatch(&mut self, event: OwnerEvent) {
        let _span =
            tracing::trace_span!(spans::EMIT, source = %event.source, kind = ?event.kind).entered();

        let doomed: Vec<EffectRef> = self
            .owners
            .get(event.source)
            .map(|owner| {
                owner
                    .effects
                    .iter()
                    .filter(|slot| {
                        let target = EffectRef::new(event.source, slot.id);
                        self.guarded(target, slot, "removed_by", false, |e| e.removed_by(&event))
                    })
                    .map(|slot| EffectRef::new(event.source, slot.id))
                    .collect()
            })
            .unwrap_or_default();
        for target in doomed {
            self.terminate(target, Termination::Removed, true);
        }

        let topic = Topic::Owner {
            source: event.source,
            kind: event.kind,
        };
        for (handle, subscriber) in self.subscriptions.subscribers(topic) {
            if self.subscriptions.is_active(handle) {
                self.invoke(subscriber, "on_event", true, |e, cx| e.on_event(&event, cx));
            }
        }
    }

    /// Apply queued commands until the queue is empty or the cascade cap
    /// is reached.
    fn flush(&mut self) {
        let limit = self.config.scheduler.max_commands_per_flush;
        let mut applied = 0usize;
        while let Some(command) = self.commands.pop_front() {
            if applied >= limit {
                let dropped = self.commands.len() + 1;
                self.commands.clear();
                EngineCounters::add(&self.counters.commands_dropped, dropped as u64);
                error!(
                    limit,
                    dropped,
                    "effect command cascade exceeded limit; dropping remaining commands"
                );
                break;
            }
            applied += 1;
            self.apply(command);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Add {
                owner,
                id,
                effect,
                duration,
            } => {
                if let Err(e) = self.attach(owner, id, effect, duration, true) {
                    warn!(
                        owner = %owner,
                        effect = %id,
                        error = %e,
                        "hook-issued effect could not be attached"
                    );
                }
            }
            Command::Remove { target, fire_removal } => {
                self.terminate(target, Termination::Removed, fire_removal);
            }
            Command::Schedule {
                target,
                due,
                only_if_longer,
            } => {
                if !self.is_attached(target) || self.is_faulted(target) {
                    return;
                }
                let changed = if only_if_longer {
                    self.scheduler.reschedule_if_longer(target, due)
                } else {
                    self.scheduler.schedule(target, due);
                    true
                };
                if changed {
                    EngineCounters::incr(&self.counters.rescheduled);
                }
            }
            Command::Cancel { target } => {
                self.cancel_now(target);
            }
            Command::Emit(event) => self.dispatch(event),
            Command::Changed(target) => self.mark_changed(target),
        }
    }

    fn mark_changed(&mut self, target: EffectRef) {
        if let Some(owner) = self.owners.get_mut(target.owner) {
            let saving = owner.slot_mut(target.effect).is_some_and(|slot| {
                slot.changed |= slot.saving;
                slot.saving
            });
            if saving {
                owner.dirty = true;
            }
        }
    }

    /// Run a mutable hook with the effect taken out of its slot.
    ///
    /// Returns `None` if the effect is missing, faulted, or panicked.
    fn invoke<R>(
        &mut self,
        target: EffectRef,
        hook: &'static str,
        mark_changed: bool,
        f: impl FnOnce(&mut dyn Effect, &mut EffectContext<'_>) -> R,
    ) -> Option<R> {
        let slot = self.owners.get_mut(target.owner)?.slot_mut(target.effect)?;
        if slot.faulted.get() {
            // Faulted by a read-only hook, which cannot release anything.
            self.release_faulted(target);
            return None;
        }
        let tag = slot.tag;
        let mut effect = slot.effect.take()?;

        let outcome = {
            let mut cx = EffectContext {
                this: target,
                now: self.clock,
                owners: &self.owners,
                config: &self.config,
                scheduler: &self.scheduler,
                subscriptions: &mut self.subscriptions,
                commands: &mut self.commands,
                outbox: &mut self.outbox,
            };
            panic::catch_unwind(AssertUnwindSafe(|| f(effect.as_mut(), &mut cx)))
        };

        let owner = self.owners.get_mut(target.owner)?;
        let slot = owner.slot_mut(target.effect)?;
        slot.effect = Some(effect);
        match outcome {
            Ok(value) => {
                if mark_changed && slot.saving {
                    slot.changed = true;
                    owner.dirty = true;
                }
                Some(value)
            }
            Err(payload) => {
                slot.faulted.set(true);
                EngineCounters::incr(&self.counters.faulted);
                error!(
                    owner = %target.owner,
                    effect = %target.effect,
                    tag,
                    hook,
                    panic = %panic_message(&*payload),
                    "effect hook panicked; effect is now inert"
                );
                self.release_faulted(target);
                None
            }
        }
    }

    /// Drop the schedule entry and subscriptions of a faulted effect.
    fn release_faulted(&mut self, target: EffectRef) {
        self.scheduler.cancel(&target);
        let released = self.subscriptions.release_subscriber(target);
        if released > 0 {
            debug!(effect = %target.effect, released, "released subscriptions of faulted effect");
        }
    }

    /// Run a read-only hook, treating a panic like [`Self::invoke`] does
    /// except that the schedule entry is left to be skipped when it fires.
    fn guarded<R>(
        &self,
        target: EffectRef,
        slot: &AttachedEffect,
        hook: &'static str,
        fallback: R,
        f: impl FnOnce(&dyn Effect) -> R,
    ) -> R {
        let Some(effect) = slot.live() else {
            return fallback;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| f(effect))) {
            Ok(value) => value,
            Err(payload) => {
                slot.faulted.set(true);
                EngineCounters::incr(&self.counters.faulted);
                error!(
                    owner = %target.owner,
                    effect = %target.effect,
                    tag = slot.tag,
                    hook,
                    panic = %panic_message(&*payload),
                    "effect hook panicked; effect is now inert"
                );
                fallback
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
