//! The effect contract and the context hooks run in.
//!
//! An [`Effect`] is a behaviour/state object attached to an owner. The
//! engine drives it through a fixed set of hooks; every hook that may
//! change the world receives an [`EffectContext`]. The context never
//! exposes the world mutably: scheduling, adding and removing effects,
//! emitting events and sending messages are queued as commands and applied
//! by the engine, in order, after the hook returns. Only subscriptions are
//! registered immediately so that a handle can be stored right away.

use std::any::Any;
use std::collections::VecDeque;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::event::{OwnerEvent, OwnerEventKind};
use crate::owner::Owners;
use crate::query::{ActionCategory, Applicability, QueryTarget};
use crate::scheduler::Scheduler;
use crate::subscription::{SubscriptionHandle, SubscriptionRegistry, Topic};
use crate::types::{EffectId, EffectRef, Heartbeat, OwnerId, OwnerKind, WorldTime};

// ---------------------------------------------------------------------------
// Downcasting support
// ---------------------------------------------------------------------------

/// Upcast to [`Any`] for concrete-type queries.
///
/// Implemented for every `'static` type; effects never implement it by
/// hand. Call it on `&dyn Effect`, not on `Box<dyn Effect>`.
pub trait AsAny: Any {
    /// Borrow as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Borrow as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Effect contract
// ---------------------------------------------------------------------------

/// What happens to an effect when its due time arrives.
pub enum Expiry {
    /// Terminate the effect, running `removal_effect`.
    Remove,
    /// Stay attached and fire again after the delay.
    Reschedule(Duration),
    /// Terminate the effect and attach a replacement in its place.
    Transform {
        /// The effect that takes over. `initial_effect` runs on it.
        into: Box<dyn Effect>,
        /// Optional lifetime of the replacement.
        duration: Option<Duration>,
    },
}

impl std::fmt::Debug for Expiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remove => f.write_str("Remove"),
            Self::Reschedule(d) => f.debug_tuple("Reschedule").field(d).finish(),
            Self::Transform { into, duration } => f
                .debug_struct("Transform")
                .field("into", &into.effect_type())
                .field("duration", duration)
                .finish(),
        }
    }
}

/// A behaviour/state object attached to an owner.
///
/// Every hook has a sensible default except [`Effect::effect_type`],
/// [`Effect::describe`] and [`Effect::unrecognised_target`]: each effect
/// must say explicitly whether it applies to targets it does not
/// understand.
pub trait Effect: AsAny + Send {
    /// Stable tag, used as the persistence discriminator.
    fn effect_type(&self) -> &'static str;

    /// Perceiver-relative description. Must not panic for any owner state.
    fn describe(&self, view: &View<'_>) -> String;

    /// Answer used when `applies_to`/`applies_with` return
    /// [`Applicability::Unrecognised`].
    fn unrecognised_target(&self) -> Applicability;

    /// Whether the effect survives a save/load cycle.
    fn saving_effect(&self) -> bool {
        false
    }

    /// Serialised state of a durable effect.
    fn save_definition(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Runs once after the first attachment, never after a reload.
    fn initial_effect(&mut self, _cx: &mut EffectContext<'_>) {}

    /// Runs whenever the owner's session reconnects.
    fn login(&mut self, _cx: &mut EffectContext<'_>) {}

    /// Runs once after the effect is reconstructed from storage.
    fn after_load(&mut self, cx: &mut EffectContext<'_>) {
        self.login(cx);
    }

    /// Runs when the scheduled due time arrives.
    fn expire_effect(&mut self, _cx: &mut EffectContext<'_>) -> Expiry {
        Expiry::Remove
    }

    /// Runs once on every termination path except cancellation.
    ///
    /// Referenced owners and partner effects may already be gone, or may be
    /// faulted: a faulted partner is still attached but inert, and removing
    /// it detaches it without running its hooks.
    fn removal_effect(&mut self, _cx: &mut EffectContext<'_>) {}

    /// Runs when a scheduled effect is cancelled before its due time.
    fn cancel_effect(&mut self, cx: &mut EffectContext<'_>) {
        self.removal_effect(cx);
    }

    /// Callback for owner-event subscriptions.
    fn on_event(&mut self, _event: &OwnerEvent, _cx: &mut EffectContext<'_>) {}

    /// Callback for heartbeat subscriptions.
    fn on_heartbeat(&mut self, _beat: Heartbeat, _cx: &mut EffectContext<'_>) {}

    /// Whether an event raised by the owner itself ends this effect.
    fn removed_by(&self, _event: &OwnerEvent) -> bool {
        false
    }

    /// Does this effect apply in the context of `target`?
    fn applies_to(&self, _target: &QueryTarget) -> Applicability {
        Applicability::Unrecognised
    }

    /// Does this effect apply to `target` with respect to `third`?
    fn applies_with(&self, _target: &QueryTarget, _third: &QueryTarget) -> Applicability {
        Applicability::Unrecognised
    }

    /// Action categories this effect prevents.
    fn blocks(&self) -> &[ActionCategory] {
        &[]
    }

    /// Whether this effect prevents actions of `category`.
    fn is_blocking_effect(&self, category: ActionCategory) -> bool {
        let blocks = self.blocks();
        match category {
            ActionCategory::Any => !blocks.is_empty(),
            _ => blocks.contains(&category),
        }
    }

    /// Player-facing refusal text for a blocked action.
    fn blocking_description(&self, _category: ActionCategory, _view: &View<'_>) -> String {
        String::new()
    }
}

// ---------------------------------------------------------------------------
// Perceiver view
// ---------------------------------------------------------------------------

/// Read-only view used by descriptions: who owns the effect, who is
/// looking, and the names of other owners.
#[derive(Clone, Copy)]
pub struct View<'a> {
    owner: OwnerId,
    voyeur: Option<OwnerId>,
    now: WorldTime,
    owners: &'a Owners,
}

impl<'a> View<'a> {
    pub(crate) fn new(
        owner: OwnerId,
        voyeur: Option<OwnerId>,
        now: WorldTime,
        owners: &'a Owners,
    ) -> Self {
        Self {
            owner,
            voyeur,
            now,
            owners,
        }
    }

    /// The owner hosting the effect.
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// The perceiver, if any.
    #[must_use]
    pub fn voyeur(&self) -> Option<OwnerId> {
        self.voyeur
    }

    /// Current world time.
    #[must_use]
    pub fn now(&self) -> WorldTime {
        self.now
    }

    /// Whether the owner is looking at itself.
    #[must_use]
    pub fn is_self(&self) -> bool {
        self.voyeur == Some(self.owner)
    }

    /// Name of any owner, if it still exists.
    #[must_use]
    pub fn name_of(&self, id: OwnerId) -> Option<&'a str> {
        self.owners.get(id).map(crate::owner::Owner::name)
    }

    /// Name of `id`, or "someone" if it no longer exists.
    #[must_use]
    pub fn display_name(&self, id: OwnerId) -> &'a str {
        self.name_of(id).unwrap_or("someone")
    }

    /// Name of the owner hosting the effect.
    #[must_use]
    pub fn owner_name(&self) -> &'a str {
        self.display_name(self.owner)
    }
}

// ---------------------------------------------------------------------------
// Commands & messages
// ---------------------------------------------------------------------------

/// A player-facing line of text produced by an effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Who should see it.
    pub recipient: OwnerId,
    /// The text.
    pub text: String,
    /// When it was produced.
    pub at: WorldTime,
}

/// Deferred world mutation queued by a hook.
pub(crate) enum Command {
    Add {
        owner: OwnerId,
        id: EffectId,
        effect: Box<dyn Effect>,
        duration: Option<Duration>,
    },
    Remove {
        target: EffectRef,
        fire_removal: bool,
    },
    Schedule {
        target: EffectRef,
        due: WorldTime,
        only_if_longer: bool,
    },
    Cancel {
        target: EffectRef,
    },
    Emit(OwnerEvent),
    Changed(EffectRef),
}

// ---------------------------------------------------------------------------
// Hook context
// ---------------------------------------------------------------------------

/// Everything a hook may see and do.
pub struct EffectContext<'a> {
    pub(crate) this: EffectRef,
    pub(crate) now: WorldTime,
    pub(crate) owners: &'a Owners,
    pub(crate) config: &'a EngineConfig,
    pub(crate) scheduler: &'a Scheduler<EffectRef>,
    pub(crate) subscriptions: &'a mut SubscriptionRegistry,
    pub(crate) commands: &'a mut VecDeque<Command>,
    pub(crate) outbox: &'a mut Vec<Message>,
}

impl EffectContext<'_> {
    /// The effect whose hook is running.
    #[must_use]
    pub fn this(&self) -> EffectRef {
        self.this
    }

    /// The owner hosting the running effect.
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.this.owner
    }

    /// Current world time.
    #[must_use]
    pub fn now(&self) -> WorldTime {
        self.now
    }

    /// A description view from `voyeur`'s point of view.
    #[must_use]
    pub fn view(&self, voyeur: Option<OwnerId>) -> View<'_> {
        View::new(self.this.owner, voyeur, self.now, self.owners)
    }

    /// Whether `id` is a registered owner.
    #[must_use]
    pub fn owner_exists(&self, id: OwnerId) -> bool {
        self.owners.contains(id)
    }

    /// Kind of owner `id`.
    #[must_use]
    pub fn owner_kind(&self, id: OwnerId) -> Option<OwnerKind> {
        self.owners.get(id).map(crate::owner::Owner::kind)
    }

    /// Display name of `id`, or "someone".
    #[must_use]
    pub fn name_of(&self, id: OwnerId) -> &str {
        self.owners.get(id).map_or("someone", crate::owner::Owner::name)
    }

    /// Whether the referenced effect is still attached.
    ///
    /// The running effect itself counts as attached.
    #[must_use]
    pub fn effect_exists(&self, target: EffectRef) -> bool {
        self.owners.get(target.owner).is_some_and(|o| o.contains(target.effect))
    }

    /// Pending due time of any effect.
    #[must_use]
    pub fn due_at(&self, target: EffectRef) -> Option<WorldTime> {
        self.scheduler.due_at(&target)
    }

    /// Time left before the running effect fires.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.scheduler.remaining(&self.this, self.now)
    }

    /// Read a numeric tunable.
    #[must_use]
    pub fn tunable(&self, key: &str, default: f64) -> f64 {
        self.config.tunable(key, default)
    }

    /// Read a duration tunable expressed in seconds.
    #[must_use]
    pub fn tunable_secs(&self, key: &str, default_secs: f64) -> Duration {
        self.config.tunable_secs(key, default_secs)
    }

    // -- subscriptions (immediate) ------------------------------------------

    /// Subscribe the running effect to `kind` events raised by `source`.
    pub fn subscribe(&mut self, source: OwnerId, kind: OwnerEventKind) -> SubscriptionHandle {
        self.subscriptions.subscribe(self.this, Topic::Owner { source, kind })
    }

    /// Subscribe the running effect to several event kinds at once.
    pub fn subscribe_all(
        &mut self,
        source: OwnerId,
        kinds: &[OwnerEventKind],
    ) -> Vec<SubscriptionHandle> {
        kinds.iter().map(|&kind| self.subscribe(source, kind)).collect()
    }

    /// Subscribe the running effect to a heartbeat.
    pub fn subscribe_heartbeat(&mut self, beat: Heartbeat) -> SubscriptionHandle {
        self.subscriptions.subscribe(self.this, Topic::Heartbeat(beat))
    }

    /// Release a subscription. Idempotent.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.subscriptions.unsubscribe(handle)
    }

    /// Release several subscriptions, emptying the list.
    pub fn unsubscribe_all(&mut self, handles: &mut Vec<SubscriptionHandle>) {
        for handle in handles.drain(..) {
            self.subscriptions.unsubscribe(handle);
        }
    }

    // -- deferred commands --------------------------------------------------

    /// Attach a new effect to any owner.
    pub fn add_effect(
        &mut self,
        owner: OwnerId,
        effect: impl Effect,
        duration: Option<Duration>,
    ) -> EffectRef {
        self.add_boxed_effect(owner, EffectId::new(), Box::new(effect), duration)
    }

    /// Attach an already boxed effect under a pre-allocated ID.
    pub fn add_boxed_effect(
        &mut self,
        owner: OwnerId,
        id: EffectId,
        effect: Box<dyn Effect>,
        duration: Option<Duration>,
    ) -> EffectRef {
        self.commands.push_back(Command::Add {
            owner,
            id,
            effect,
            duration,
        });
        EffectRef::new(owner, id)
    }

    /// Remove the running effect, running `removal_effect`.
    pub fn remove_self(&mut self) {
        let target = self.this;
        self.remove_effect(target, true);
    }

    /// Remove any effect. Removing a detached effect is a no-op.
    pub fn remove_effect(&mut self, target: EffectRef, fire_removal: bool) {
        self.commands.push_back(Command::Remove { target, fire_removal });
    }

    /// Replace the due time of any effect.
    pub fn reschedule(&mut self, target: EffectRef, delay: Duration) {
        self.commands.push_back(Command::Schedule {
            target,
            due: self.now + delay,
            only_if_longer: false,
        });
    }

    /// Replace the running effect's due time.
    pub fn reschedule_self(&mut self, delay: Duration) {
        let target = self.this;
        self.reschedule(target, delay);
    }

    /// Move the due time of any effect later only.
    pub fn reschedule_if_longer(&mut self, target: EffectRef, delay: Duration) {
        self.commands.push_back(Command::Schedule {
            target,
            due: self.now + delay,
            only_if_longer: true,
        });
    }

    /// Cancel any effect, running its `cancel_effect`.
    pub fn cancel(&mut self, target: EffectRef) {
        self.commands.push_back(Command::Cancel { target });
    }

    /// Raise an owner event.
    pub fn emit(&mut self, event: OwnerEvent) {
        self.commands.push_back(Command::Emit(event));
    }

    /// Flag the running effect's saved state as changed.
    pub fn mark_changed(&mut self) {
        let target = self.this;
        self.commands.push_back(Command::Changed(target));
    }

    /// Send a player-facing message.
    pub fn send(&mut self, recipient: OwnerId, text: impl Into<String>) {
        self.outbox.push(Message {
            recipient,
            text: text.into(),
            at: self.now,
        });
    }

    /// Send a player-facing message to the running effect's owner.
    pub fn send_owner(&mut self, text: impl Into<String>) {
        let owner = self.this.owner;
        self.send(owner, text);
    }
}
