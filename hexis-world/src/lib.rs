//! # hexis-world: World Integration for Hexis
//!
//! This crate connects the game-agnostic `hexis-core` engine to a running
//! game server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Game server                    │
//! │  sessions / commands ──► DriverHandle        │
//! │                              │ mpsc           │
//! │  ┌───────────────────────────▼────────────┐  │
//! │  │  HeartbeatDriver (one tokio task)      │  │
//! │  │   ┌──────────┐  ┌──────────┐           │  │
//! │  │   │ systems  │  │   gate   │           │  │
//! │  │   └────┬─────┘  └────┬─────┘           │  │
//! │  │        ▼             ▼                 │  │
//! │  │   ┌─────────────────────────────┐      │  │
//! │  │   │  hexis-core World           │      │  │
//! │  │   └─────────────────────────────┘      │  │
//! │  └────────────────────────────────────────┘  │
//! │          │ snapshots (RwLock board)          │
//! │          ▼                                   │
//! │  renderers / other readers                   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: world configuration and server profiles
//! - `capability`: capability traits game subsystems query effects by
//! - `effects`: reference effects
//! - `registry`: the startup registration table
//! - `gate`: blocking checks for action dispatch
//! - `events` / `hooks`: game events and their translation to owner events
//! - `systems`: pulse, autosave and restore passes
//! - `heartbeat`: the async driver owning the world
//! - `telemetry`: logging initialisation

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod capability;
pub mod config;
pub mod effects;
pub mod events;
pub mod gate;
pub mod heartbeat;
pub mod hooks;
pub mod registry;
pub mod systems;
pub mod telemetry;

pub use config::{ServerProfile, WorldConfig};
pub use events::GameEvent;
pub use gate::{CommandGate, Refusal};
pub use heartbeat::{
    DriverError, DriverHandle, HeartbeatDriver, SnapshotBoard, Stopped, WorldCommand,
};
pub use registry::standard_registry;
pub use systems::{PulseReport, SaveReport, autosave, observe_event, restore_world, run_pulse};
