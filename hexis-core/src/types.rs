//! Core type definitions for the Hexis effect engine.
//!
//! All types are serializable so they can appear inside saved effect
//! payloads (a grapple remembers its partner's [`EffectRef`], for example).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Stable identifier of a perceivable entity (character, item, room).
///
/// IDs are assigned by the game and survive restarts; the engine never
/// allocates them itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What sort of entity an owner is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OwnerKind {
    /// A player or non-player character.
    Character,
    /// A carried or placed object.
    Item,
    /// A location.
    Room,
    /// Anything else the game chooses to attach effects to.
    Other,
}

impl OwnerKind {
    /// Stable lowercase name, used as the `kind` column in the effect store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Item => "item",
            Self::Room => "room",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identifier of one attached effect instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectId(pub Uuid);

impl EffectId {
    /// Create a new random effect ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully-qualified address of an attached effect: its owner plus its ID.
///
/// This is the key used by the scheduler and by subscriptions, and the
/// way one effect refers to a partner effect on another owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectRef {
    /// The owner hosting the effect.
    pub owner: OwnerId,
    /// The effect instance.
    pub effect: EffectId,
}

impl EffectRef {
    /// Build a reference from its parts.
    #[must_use]
    pub const fn new(owner: OwnerId, effect: EffectId) -> Self {
        Self { owner, effect }
    }
}

impl fmt::Display for EffectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.effect)
    }
}

// ---------------------------------------------------------------------------
// World Time
// ---------------------------------------------------------------------------

/// Monotonic world clock in milliseconds since the world started ticking.
///
/// Only the world pulse advances it, so all scheduling is deterministic
/// with respect to pulses rather than wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct WorldTime(pub u64);

impl WorldTime {
    /// The instant the world started.
    pub const ZERO: Self = Self(0);

    /// Build a world time from whole seconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1000)
    }

    /// Milliseconds since world start.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, saturating at zero.
    #[must_use]
    pub const fn since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for WorldTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        let ms = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(ms))
    }
}

impl fmt::Display for WorldTime {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T+{:.1}s", self.0 as f64 / 1000.0)
    }
}

// ---------------------------------------------------------------------------
// Heartbeats
// ---------------------------------------------------------------------------

/// Coarse periodic signals delivered to subscribed effects.
///
/// Periods are configured in [`crate::config::HeartbeatConfig`]. Effects
/// that want "every minute, do a little" subscribe to a heartbeat instead
/// of rescheduling themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heartbeat {
    /// Fires every ten seconds by default.
    TenSeconds,
    /// Fires every minute by default.
    Minute,
    /// Fires every hour by default.
    Hour,
}

impl Heartbeat {
    /// All heartbeats, in delivery order.
    pub const ALL: [Self; 3] = [Self::TenSeconds, Self::Minute, Self::Hour];
}
