//! Error types for the Hexis core library.

use thiserror::Error;

use crate::types::{EffectRef, OwnerId};

/// Top-level error type for all Hexis operations.
#[derive(Error, Debug)]
pub enum HexisError {
    /// No owner with the given ID is registered in the world.
    #[error("Owner not found: {0}")]
    OwnerNotFound(OwnerId),

    /// An owner with the given ID is already registered.
    #[error("Owner already exists: {0}")]
    DuplicateOwner(OwnerId),

    /// The referenced effect is not attached to its owner.
    #[error("Effect not found: {0}")]
    EffectNotFound(EffectRef),

    /// An effect with the same ID is already attached to the owner.
    #[error("Effect already attached: {0}")]
    DuplicateEffect(EffectRef),

    /// An effect type tag was registered twice.
    #[error("Effect type registered twice: {tag}")]
    DuplicateEffectType {
        /// The offending tag.
        tag: &'static str,
    },

    /// No loader is registered for the given effect type tag.
    #[error("Unknown effect type: {0}")]
    UnknownEffectType(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single persisted effect could not be reconstructed.
///
/// Loaders return this instead of panicking so that one bad entry never
/// prevents the rest of an owner's effects from loading.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The payload did not match the effect's saved shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload references an owner that no longer exists.
    #[error("referenced owner {0} no longer exists")]
    UnresolvedOwner(OwnerId),

    /// The payload references a definition (cell, authority, recipe…) that
    /// no longer exists.
    #[error("referenced {kind} #{id} no longer exists")]
    UnresolvedDefinition {
        /// Definition kind, e.g. `"legal_authority"`.
        kind: String,
        /// Definition ID.
        id: u64,
    },

    /// The payload is well-formed but describes an impossible state.
    #[error("invalid effect state: {0}")]
    Invalid(String),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, HexisError>;
