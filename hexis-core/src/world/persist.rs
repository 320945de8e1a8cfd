//! Turning owners into saved records and back.
//!
//! Restore runs in three phases so that partner effects can find each
//! other: first every owner shell is registered, then every effect is
//! reconstructed by its loader, and only then does `after_load` run on the
//! effects that loaded. `initial_effect` never runs on a restored effect.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::World;
use crate::metrics::{EngineCounters, spans};
use crate::owner::Owner;
use crate::persistence::{OwnerRecord, PersistedEffect};
use crate::registry::LoadContext;
use crate::types::{EffectRef, OwnerId};

/// Why a saved effect was not restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No effect type is registered under the tag, or it has no loader.
    UnknownType,
    /// The loader rejected the payload.
    Failed(String),
    /// The loader panicked.
    Panicked,
    /// Another effect on the owner already uses the saved ID.
    DuplicateId,
}

/// A saved effect left out of a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEffect {
    /// Owner it was saved on.
    pub owner: OwnerId,
    /// Its saved tag.
    pub tag: String,
    /// What went wrong.
    pub reason: SkipReason,
}

/// Outcome of [`World::restore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Owner records processed.
    pub owners: usize,
    /// Effects reconstructed.
    pub loaded: usize,
    /// Effects left out.
    pub skipped: Vec<SkippedEffect>,
}

impl LoadReport {
    /// Whether every saved effect came back.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl World {
    /// Build the saved record for one owner: its durable effects, in
    /// insertion order, with remaining schedule time and prog IDs.
    ///
    /// Faulted effects are not saved.
    #[must_use]
    pub fn owner_record(&self, owner: OwnerId) -> Option<OwnerRecord> {
        let host = self.owners.get(owner)?;
        let effects = host
            .effects
            .iter()
            .filter(|slot| slot.saving)
            .filter_map(|slot| {
                let target = EffectRef::new(owner, slot.id);
                let payload = self.guarded(target, slot, "save_definition", None, |e| {
                    Some(e.save_definition())
                })?;
                Some(PersistedEffect {
                    tag: slot.tag.to_string(),
                    id: slot.id,
                    payload,
                    prog: slot.prog.as_ref().map(|p| p.id()),
                    remaining_ms: self
                        .scheduler
                        .remaining(&target, self.clock)
                        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                })
            })
            .collect();
        Some(OwnerRecord {
            owner,
            kind: host.kind(),
            name: host.name().to_string(),
            effects,
        })
    }

    /// Owners whose durable state changed since their last save.
    #[must_use]
    pub fn dirty_owners(&self) -> Vec<OwnerId> {
        self.owners.iter().filter(|o| o.is_dirty()).map(Owner::id).collect()
    }

    /// Clear the changed flags of an owner after it was written.
    pub fn mark_saved(&mut self, owner: OwnerId) {
        if let Some(host) = self.owners.get_mut(owner) {
            host.dirty = false;
            for slot in &mut host.effects {
                slot.changed = false;
            }
        }
    }

    /// Records for every dirty owner, marking them saved.
    pub fn take_dirty_records(&mut self) -> Vec<OwnerRecord> {
        let dirty = self.dirty_owners();
        let records: Vec<OwnerRecord> =
            dirty.iter().filter_map(|&id| self.owner_record(id)).collect();
        for id in dirty {
            self.mark_saved(id);
        }
        records
    }

    /// Reconstruct owners and their effects from saved records.
    ///
    /// Unknown tags and failing loaders skip the single effect and are
    /// reported; the rest of the owner still loads. Owners that lost an
    /// effect this way stay dirty so the next save drops it for good.
    pub fn restore(&mut self, records: Vec<OwnerRecord>) -> LoadReport {
        let _span = tracing::info_span!(spans::RESTORE, records = records.len()).entered();
        let mut report = LoadReport::default();

        for record in &records {
            if !self.owners.contains(record.owner) {
                self.owners.insert(Owner::new(record.owner, record.kind, record.name.clone()));
            }
            report.owners += 1;
        }

        let mut loaded = Vec::new();
        for record in records {
            let owner = record.owner;
            let mut lost = false;
            for entry in record.effects {
                match self.load_entry(owner, entry) {
                    Ok(target) => loaded.push(target),
                    Err(skipped) => {
                        EngineCounters::incr(&self.counters.loads_skipped);
                        warn!(
                            owner = %owner,
                            tag = %skipped.tag,
                            reason = ?skipped.reason,
                            "saved effect skipped"
                        );
                        report.skipped.push(skipped);
                        lost = true;
                    }
                }
            }
            if let Some(host) = self.owners.get_mut(owner) {
                for slot in &mut host.effects {
                    slot.changed = false;
                }
                host.dirty = lost;
            }
        }
        report.loaded = loaded.len();

        for target in loaded {
            self.invoke(target, "after_load", false, |e, cx| e.after_load(cx));
            self.flush();
        }

        info!(
            owners = report.owners,
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "effects restored"
        );
        report
    }

    fn load_entry(
        &mut self,
        owner: OwnerId,
        entry: PersistedEffect,
    ) -> Result<EffectRef, SkippedEffect> {
        let skip = |reason| SkippedEffect {
            owner,
            tag: entry.tag.clone(),
            reason,
        };
        let Some(loader) = self.registry.loader(&entry.tag) else {
            return Err(skip(SkipReason::UnknownType));
        };
        if self.owners.get(owner).is_some_and(|o| o.contains(entry.id)) {
            return Err(skip(SkipReason::DuplicateId));
        }

        let cx = LoadContext {
            owner,
            owners: &self.owners,
            resolver: &*self.resolver,
            now: self.clock,
        };
        let payload = entry.payload.clone();
        let effect = match panic::catch_unwind(AssertUnwindSafe(|| loader(payload, &cx))) {
            Ok(Ok(effect)) => effect,
            Ok(Err(e)) => return Err(skip(SkipReason::Failed(e.to_string()))),
            Err(_) => return Err(skip(SkipReason::Panicked)),
        };

        let prog = match entry.prog {
            Some(id) => {
                let prog = self.resolver.prog(id);
                if prog.is_none() {
                    warn!(
                        owner = %owner,
                        effect = %entry.id,
                        prog = id,
                        "saved prog no longer exists; effect loads without it"
                    );
                }
                prog
            }
            None => None,
        };

        let duration = entry.remaining_ms.map(Duration::from_millis);
        let target = self
            .attach(owner, entry.id, effect, duration, false)
            .map_err(|e| skip(SkipReason::Failed(e.to_string())))?;
        if let Some(slot) = self.owners.get_mut(owner).and_then(|o| o.slot_mut(entry.id)) {
            slot.prog = prog;
        }
        debug!(owner = %owner, effect = %entry.id, tag = %entry.tag, "effect restored");
        Ok(target)
    }
}
