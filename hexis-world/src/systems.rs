//! Server systems that drive the effect engine.
//!
//! These are plain functions over a [`World`]; the [`crate::heartbeat`]
//! driver calls them on its schedule, and tests call them directly.
//!
//! ## System Budget (per pulse):
//!
//! | System        | Budget  | Frequency            |
//! |---------------|---------|----------------------|
//! | Observe event | 0.05ms  | Per game event       |
//! | Pulse         | 20ms    | Every 100ms          |
//! | Autosave      | Async   | Every 5 min          |
//! | Restore       | Startup | Once                 |

use std::time::Duration;

use hexis_core::metrics::spans;
use hexis_core::{EffectStore, LoadReport, Message, PulseBudgetMonitor, PulseSummary, World};
use tracing::{debug, info, warn};

use crate::events::GameEvent;

/// Hand a game event to the engine.
///
/// Owner events about owners the world does not know are dropped. Returns
/// how many owner events were emitted.
pub fn observe_event(world: &mut World, event: &GameEvent) -> usize {
    let mut emitted = 0;
    for owner_event in event.owner_events() {
        if world.owner(owner_event.source).is_none() {
            debug!(
                event = event.label(),
                owner = %owner_event.source,
                "event for unknown owner dropped"
            );
            continue;
        }
        world.emit(owner_event);
        emitted += 1;
    }
    emitted
}

/// What one timed pulse produced.
#[derive(Debug, Clone)]
pub struct PulseReport {
    /// Engine-side summary.
    pub summary: PulseSummary,
    /// Messages produced during the pulse, ready for delivery.
    pub messages: Vec<Message>,
    /// Wall-clock time spent, in milliseconds.
    pub elapsed_ms: f64,
}

/// Advance the world by `elapsed` under the budget monitor.
///
/// Messages queued before the pulse (from events or commands since the last
/// one) are delivered with it.
pub fn run_pulse(
    world: &mut World,
    elapsed: Duration,
    monitor: &PulseBudgetMonitor,
) -> PulseReport {
    let summary = {
        let _guard = monitor.begin_pulse();
        world.pulse(elapsed)
    };
    let elapsed_ms = monitor.last_pulse_ms();
    if monitor.is_over_budget() {
        warn!(
            elapsed_ms,
            budget_ms = monitor.budget_ms(),
            fired = summary.fired,
            "pulse over budget"
        );
    }
    PulseReport {
        summary,
        messages: world.drain_messages(),
        elapsed_ms,
    }
}

/// What an autosave wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Owner records written.
    pub saved: usize,
    /// Records deleted for destroyed owners.
    pub deleted: usize,
}

/// Write every dirty owner and forget destroyed ones.
///
/// Owners are only marked saved once the batch has committed, so a failed
/// save is retried on the next autosave.
///
/// # Errors
/// Returns the store's error if the batch or a delete fails.
pub fn autosave(world: &mut World, store: &mut EffectStore) -> hexis_core::Result<SaveReport> {
    let _span = tracing::info_span!(spans::AUTOSAVE).entered();

    let dirty = world.dirty_owners();
    let records: Vec<_> = dirty.iter().filter_map(|&owner| world.owner_record(owner)).collect();
    store.save_owners(&records)?;
    for owner in dirty {
        world.mark_saved(owner);
    }

    let mut deleted = 0;
    for owner in world.take_destroyed() {
        if store.delete_owner(owner)? {
            deleted += 1;
        }
    }

    let report = SaveReport {
        saved: records.len(),
        deleted,
    };
    if report != SaveReport::default() {
        info!(saved = report.saved, deleted = report.deleted, "autosave complete");
    }
    Ok(report)
}

/// Load every saved owner into `world`.
///
/// # Errors
/// Returns the store's error if records cannot be read. Individual effects
/// that fail to load are reported in the [`LoadReport`], not as errors.
pub fn restore_world(world: &mut World, store: &EffectStore) -> hexis_core::Result<LoadReport> {
    let records = store.load_all()?;
    let report = world.restore(records);
    if !report.is_clean() {
        warn!(skipped = report.skipped.len(), "some saved effects were not restored");
    }
    Ok(report)
}
