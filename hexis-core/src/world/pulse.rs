//! Advancing world time: heartbeats first, then due effects.

use std::time::Duration;

use tracing::{trace, warn};

use super::{Termination, World};
use crate::effect::Expiry;
use crate::metrics::{EngineCounters, spans};
use crate::subscription::Topic;
use crate::types::{EffectId, EffectRef, Heartbeat, WorldTime};

const NANOS_PER_MILLI: u32 = 1_000_000;

/// What one pulse did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseSummary {
    /// World time after the pulse.
    pub now: WorldTime,
    /// Effects whose `expire_effect` ran.
    pub fired: usize,
    /// Heartbeats delivered, one entry per boundary crossed.
    pub heartbeats: Vec<Heartbeat>,
}

impl World {
    /// Advance the clock by `elapsed` and run everything that became due.
    ///
    /// The clock counts whole milliseconds; the sub-millisecond rest of
    /// `elapsed` is carried into the next pulse. Every heartbeat boundary
    /// crossed is delivered, up to `heartbeat.max_catch_up` beats of each
    /// kind. Due effects fire in `(due time, scheduling order)`; anything
    /// scheduled while this pass runs waits for the next pulse, even with a
    /// zero delay.
    pub fn pulse(&mut self, elapsed: Duration) -> PulseSummary {
        let previous = self.clock;
        let total = self.carry.saturating_add(elapsed);
        self.carry = Duration::from_nanos(u64::from(total.subsec_nanos() % NANOS_PER_MILLI));
        self.clock = previous + total.saturating_sub(self.carry);
        let _span = tracing::trace_span!(spans::PULSE, now = %self.clock).entered();

        let heartbeats = self.deliver_heartbeats(previous);

        let mut fired = 0;
        for target in self.scheduler.take_due(self.clock) {
            // Rescheduled by an earlier firing in this pass.
            if self.scheduler.contains(&target) {
                continue;
            }
            if !self.is_attached(target) || self.is_faulted(target) {
                continue;
            }
            fired += 1;
            self.fire(target);
        }

        EngineCounters::incr(&self.counters.pulses);
        trace!(now = %self.clock, fired, heartbeats = heartbeats.len(), "pulse complete");
        PulseSummary {
            now: self.clock,
            fired,
            heartbeats,
        }
    }

    fn deliver_heartbeats(&mut self, previous: WorldTime) -> Vec<Heartbeat> {
        let cap = u64::from(self.config.heartbeat.max_catch_up);
        let mut delivered = Vec::new();
        for beat in Heartbeat::ALL {
            let period = self.config.heartbeat.period_ms(beat);
            if period == 0 {
                continue;
            }
            let crossed = self.clock.as_millis() / period - previous.as_millis() / period;
            if crossed == 0 {
                continue;
            }
            if crossed > cap {
                warn!(beat = ?beat, crossed, delivered = cap, "heartbeat catch-up capped");
            }
            let _span = tracing::trace_span!(spans::HEARTBEAT, beat = ?beat).entered();
            for _ in 0..crossed.min(cap) {
                delivered.push(beat);
                for (handle, subscriber) in self.subscriptions.subscribers(Topic::Heartbeat(beat)) {
                    if self.subscriptions.is_active(handle) {
                        self.invoke(subscriber, "on_heartbeat", true, |e, cx| {
                            e.on_heartbeat(beat, cx)
                        });
                        self.flush();
                    }
                }
            }
        }
        delivered
    }

    fn fire(&mut self, target: EffectRef) {
        let expiry = self.invoke(target, "expire_effect", true, |e, cx| e.expire_effect(cx));
        self.flush();
        let Some(expiry) = expiry else {
            return;
        };

        match expiry {
            Expiry::Remove => {
                self.terminate(target, Termination::Expired, true);
            }
            Expiry::Reschedule(delay) => {
                if self.is_attached(target) && !self.is_faulted(target) {
                    self.scheduler.schedule(target, self.clock + delay);
                    EngineCounters::incr(&self.counters.rescheduled);
                }
            }
            Expiry::Transform { into, duration } => {
                self.terminate(target, Termination::Expired, true);
                self.flush();
                if let Err(e) = self.attach(target.owner, EffectId::new(), into, duration, true) {
                    warn!(
                        owner = %target.owner,
                        error = %e,
                        "transformed effect could not be attached"
                    );
                }
            }
        }
        self.flush();
    }
}
