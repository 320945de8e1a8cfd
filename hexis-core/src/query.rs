//! Query vocabulary: applicability targets, answers, action categories and
//! externally defined applicability progs.
//!
//! "Does this effect apply to X?" is asked with a closed [`QueryTarget`]
//! union. Effects answer with an [`Applicability`]; an effect that does not
//! recognise the target says so, and the engine resolves the answer with the
//! effect's own declared default rather than a global guess.

use std::fmt;

use crate::types::OwnerId;

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Kinds of skill/attribute check an effect may modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    /// Noticing things.
    Perception,
    /// Not being noticed.
    Stealth,
    /// Hand-to-hand attacks.
    Melee,
    /// Shooting and throwing.
    Ranged,
    /// Avoiding attacks.
    Dodge,
    /// Treating wounds.
    Medicine,
    /// Making things.
    Crafting,
    /// Resisting mental effects.
    Willpower,
    /// A game-defined check outside this list.
    Other(u32),
}

/// Context object an applicability question is asked about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryTarget {
    /// A character owner.
    Character(OwnerId),
    /// An item owner.
    Item(OwnerId),
    /// A room owner.
    Room(OwnerId),
    /// A school of magic, by definition ID.
    MagicSchool(u64),
    /// A legal authority (jurisdiction), by definition ID.
    LegalAuthority(u64),
    /// A check being rolled.
    Check(CheckKind),
    /// A free-form keyword.
    Keyword(String),
}

impl QueryTarget {
    /// The owner this target names, if it names one.
    #[must_use]
    pub const fn owner(&self) -> Option<OwnerId> {
        match self {
            Self::Character(id) | Self::Item(id) | Self::Room(id) => Some(*id),
            _ => None,
        }
    }
}

/// An effect's answer to an applicability question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Applicability {
    /// The effect applies.
    Applies,
    /// The effect explicitly does not apply.
    DoesNotApply,
    /// The effect does not understand this kind of target.
    Unrecognised,
}

impl Applicability {
    /// Convert a boolean decision.
    #[must_use]
    pub const fn from_bool(applies: bool) -> Self {
        if applies { Self::Applies } else { Self::DoesNotApply }
    }

    /// Resolve to a boolean, using `fallback` for [`Self::Unrecognised`].
    ///
    /// A fallback of `Unrecognised` is treated as "does not apply".
    #[must_use]
    pub const fn resolve(self, fallback: Self) -> bool {
        match self {
            Self::Applies => true,
            Self::DoesNotApply => false,
            Self::Unrecognised => matches!(fallback, Self::Applies),
        }
    }
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

/// Categories of action an effect may prevent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionCategory {
    /// Any deliberate action at all.
    General,
    /// Leaving the current position or room.
    Movement,
    /// Attacking or defending.
    Combat,
    /// Talking aloud.
    Speech,
    /// Manipulating items.
    Manipulation,
    /// Starting or continuing a crafting project.
    Crafting,
    /// Casting spells.
    Magic,
    /// A game-defined category outside this list.
    Custom(&'static str),
    /// Query wildcard: matches an effect that blocks anything.
    Any,
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General => f.write_str("general"),
            Self::Movement => f.write_str("movement"),
            Self::Combat => f.write_str("combat"),
            Self::Speech => f.write_str("speech"),
            Self::Manipulation => f.write_str("manipulation"),
            Self::Crafting => f.write_str("crafting"),
            Self::Magic => f.write_str("magic"),
            Self::Custom(name) => f.write_str(name),
            Self::Any => f.write_str("any"),
        }
    }
}

// ---------------------------------------------------------------------------
// Progs
// ---------------------------------------------------------------------------

/// Externally defined boolean predicate consulted before an effect's own
/// applicability logic.
///
/// Progs are opaque to the engine: the game resolves them by ID through a
/// [`crate::registry::ReferenceResolver`] and they are persisted by ID only.
pub trait ApplicabilityProg: Send + Sync + fmt::Debug {
    /// Stable ID used when the owning effect is saved.
    fn id(&self) -> u64;

    /// Evaluate the predicate for an effect on `owner`.
    fn evaluate(
        &self,
        owner: OwnerId,
        target: Option<&QueryTarget>,
        third: Option<&QueryTarget>,
    ) -> bool;
}
