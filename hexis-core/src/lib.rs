//! # Hexis Core Library
//!
//! Game-agnostic effect engine for persistent-world game servers.
//!
//! Every perceivable entity (character, item, room) is an [`Owner`] that
//! hosts an ordered list of [`Effect`]s. An effect is a polymorphic
//! behaviour/state object (bleeding, grappled, hidden, on trial) that can
//! change what its owner can do, how it is perceived, and what happens to it
//! over time. The engine provides:
//!
//! - **Attachment**: add/remove with exactly-once lifecycle hooks
//! - **Scheduling**: due-time expiry driven by the world heartbeat
//! - **Subscriptions**: handle-based observers on owner life-cycle events
//! - **Queries**: applicability, capability and blocking predicates
//! - **Persistence**: tag-keyed loaders and a SQLite effect store
//!
//! ## Execution Model
//!
//! All mutation happens on one logical world-tick context. Hooks never touch
//! the world directly: they queue commands through an [`EffectContext`] that
//! the [`World`] applies, in order, once the hook returns.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod effect;
pub mod error;
pub mod event;
pub mod metrics;
pub mod owner;
pub mod persistence;
pub mod query;
pub mod registry;
pub mod scheduler;
pub mod subscription;
pub mod types;
pub mod world;

pub use config::EngineConfig;
pub use effect::{Effect, EffectContext, Expiry, Message, View};
pub use error::{HexisError, LoadError, Result};
pub use event::{OwnerEvent, OwnerEventKind};
pub use owner::Owner;
pub use metrics::{CounterSnapshot, EngineCounters, PulseBudgetMonitor};
pub use persistence::{EffectStore, OwnerRecord, PersistedEffect};
pub use query::{ActionCategory, Applicability, ApplicabilityProg, CheckKind, QueryTarget};
pub use registry::{
    EffectRegistry, EffectType, LoadContext, NullResolver, ReferenceResolver, load_serde,
};
pub use scheduler::{Scheduler, SchedulerStats};
pub use subscription::{SubscriptionHandle, Topic};
pub use types::*;
pub use world::{
    Blocked, EffectSummary, LoadReport, OwnerSnapshot, PulseSummary, SkipReason, SkippedEffect,
    Termination, World,
};
