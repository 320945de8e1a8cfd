//! Owners and their attached effect lists.
//!
//! Effects are stored in insertion order; "first matching" queries return
//! the earliest attached. While a mutable hook runs, the effect is taken
//! out of its slot and the slot stays in place, so the list never shifts
//! under a running hook.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::effect::Effect;
use crate::query::ApplicabilityProg;
use crate::types::{EffectId, OwnerId, OwnerKind};

/// One attached effect plus the engine's bookkeeping for it.
pub(crate) struct AttachedEffect {
    pub(crate) id: EffectId,
    pub(crate) tag: &'static str,
    pub(crate) effect: Option<Box<dyn Effect>>,
    pub(crate) prog: Option<Arc<dyn ApplicabilityProg>>,
    pub(crate) saving: bool,
    pub(crate) changed: bool,
    pub(crate) faulted: Cell<bool>,
}

impl AttachedEffect {
    pub(crate) fn new(id: EffectId, effect: Box<dyn Effect>) -> Self {
        let saving = effect.saving_effect();
        Self {
            id,
            tag: effect.effect_type(),
            saving,
            changed: saving,
            effect: Some(effect),
            prog: None,
            faulted: Cell::new(false),
        }
    }

    /// The effect, unless it is faulted or its hook is running.
    pub(crate) fn live(&self) -> Option<&dyn Effect> {
        if self.faulted.get() {
            None
        } else {
            self.effect.as_deref()
        }
    }
}

/// A perceivable entity hosting effects.
pub struct Owner {
    id: OwnerId,
    kind: OwnerKind,
    name: String,
    pub(crate) effects: Vec<AttachedEffect>,
    pub(crate) dirty: bool,
}

impl std::fmt::Debug for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("effects", &self.effects.iter().map(|e| e.tag).collect::<Vec<_>>())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl Owner {
    pub(crate) fn new(id: OwnerId, kind: OwnerKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            effects: Vec::new(),
            dirty: false,
        }
    }

    /// Owner ID.
    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Owner kind.
    #[must_use]
    pub fn kind(&self) -> OwnerKind {
        self.kind
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a durable effect changed since the last save.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of attached effects, faulted ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Whether no effects are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Whether the effect is attached (faulted or not).
    #[must_use]
    pub fn contains(&self, id: EffectId) -> bool {
        self.slot(id).is_some()
    }

    /// Whether the attached effect has been faulted by a panicking hook.
    #[must_use]
    pub fn is_faulted(&self, id: EffectId) -> bool {
        self.slot(id).is_some_and(|s| s.faulted.get())
    }

    /// Whether the attached effect's saved state is out of date.
    #[must_use]
    pub fn is_changed(&self, id: EffectId) -> bool {
        self.slot(id).is_some_and(|s| s.changed)
    }

    /// IDs of every attached effect, in insertion order.
    #[must_use]
    pub fn effect_ids(&self) -> Vec<EffectId> {
        self.effects.iter().map(|s| s.id).collect()
    }

    /// Live (non-faulted) effects, in insertion order.
    pub fn effects(&self) -> impl Iterator<Item = (EffectId, &dyn Effect)> + '_ {
        self.effects.iter().filter_map(|s| s.live().map(|e| (s.id, e)))
    }

    /// A live effect by ID.
    #[must_use]
    pub fn get(&self, id: EffectId) -> Option<&dyn Effect> {
        self.slot(id).and_then(AttachedEffect::live)
    }

    /// Live effects of concrete type `T`, with their IDs.
    #[must_use]
    pub fn effects_of_type<T: Effect>(&self) -> Vec<(EffectId, &T)> {
        self.effects()
            .filter_map(|(id, e)| e.as_any().downcast_ref::<T>().map(|t| (id, t)))
            .collect()
    }

    /// The earliest attached live effect of type `T`.
    #[must_use]
    pub fn first_of_type<T: Effect>(&self) -> Option<(EffectId, &T)> {
        self.effects()
            .find_map(|(id, e)| e.as_any().downcast_ref::<T>().map(|t| (id, t)))
    }

    /// Whether any live effect of type `T` is attached.
    #[must_use]
    pub fn has_effect_of_type<T: Effect>(&self) -> bool {
        self.first_of_type::<T>().is_some()
    }

    pub(crate) fn slot(&self, id: EffectId) -> Option<&AttachedEffect> {
        self.effects.iter().find(|s| s.id == id)
    }

    pub(crate) fn slot_mut(&mut self, id: EffectId) -> Option<&mut AttachedEffect> {
        self.effects.iter_mut().find(|s| s.id == id)
    }

    pub(crate) fn detach(&mut self, id: EffectId) -> Option<AttachedEffect> {
        let index = self.effects.iter().position(|s| s.id == id)?;
        Some(self.effects.remove(index))
    }
}

/// All owners in the world, ordered by ID.
#[derive(Debug, Default)]
pub struct Owners {
    map: BTreeMap<OwnerId, Owner>,
}

impl Owners {
    /// Look up an owner.
    #[must_use]
    pub fn get(&self, id: OwnerId) -> Option<&Owner> {
        self.map.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: OwnerId) -> Option<&mut Owner> {
        self.map.get_mut(&id)
    }

    /// Whether the owner exists.
    #[must_use]
    pub fn contains(&self, id: OwnerId) -> bool {
        self.map.contains_key(&id)
    }

    /// Number of owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the world has no owners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All owners, by ascending ID.
    pub fn iter(&self) -> impl Iterator<Item = &Owner> + '_ {
        self.map.values()
    }

    pub(crate) fn insert(&mut self, owner: Owner) {
        self.map.insert(owner.id, owner);
    }

    pub(crate) fn remove(&mut self, id: OwnerId) -> Option<Owner> {
        self.map.remove(&id)
    }
}
