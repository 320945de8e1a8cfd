//! Effect type registry: loaders and capability projections.
//!
//! Built once at startup by an explicit, ordered builder. Each entry
//! registers one concrete effect type under its persistence tag, with an
//! optional loader (durable types only) and any number of capability
//! projections. A projection turns `&dyn Any` holding the concrete type
//! into `&C` for some capability trait object `C`, which is how
//! [`crate::World::effects_with`] finds "every effect that modifies
//! checks" without the engine naming the capability set.
//!
//! ```rust
//! use std::any::Any;
//! use hexis_core::{Applicability, Effect, EffectRegistry, EffectType, View};
//!
//! trait Glows: Effect {
//!     fn lumens(&self) -> u32;
//! }
//!
//! struct Lantern;
//! impl Effect for Lantern {
//!     fn effect_type(&self) -> &'static str { "Lantern" }
//!     fn describe(&self, _: &View<'_>) -> String { "a lantern glow".into() }
//!     fn unrecognised_target(&self) -> Applicability { Applicability::Applies }
//! }
//! impl Glows for Lantern {
//!     fn lumens(&self) -> u32 { 40 }
//! }
//!
//! fn as_glows<'e>(e: &'e (dyn Any + 'static)) -> Option<&'e (dyn Glows + 'static)> {
//!     e.downcast_ref::<Lantern>().map(|l| l as &(dyn Glows + 'static))
//! }
//!
//! let registry = EffectRegistry::builder()
//!     .register(EffectType::new::<Lantern>("Lantern").provides::<dyn Glows>(as_glows))
//!     .build()
//!     .expect("unique tags");
//! assert_eq!(registry.project::<dyn Glows>(&Lantern).map(|g| g.lumens()), Some(40));
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::effect::Effect;
use crate::error::{HexisError, LoadError, Result};
use crate::owner::Owners;
use crate::query::ApplicabilityProg;
use crate::types::{OwnerId, OwnerKind, WorldTime};

/// Reconstructs a durable effect from its saved payload.
pub type Loader =
    fn(serde_json::Value, &LoadContext<'_>) -> std::result::Result<Box<dyn Effect>, LoadError>;

/// Loader for effects whose whole state is their serde representation.
///
/// # Errors
/// Returns [`LoadError::Malformed`] if the payload does not deserialize.
pub fn load_serde<E>(
    payload: serde_json::Value,
    _cx: &LoadContext<'_>,
) -> std::result::Result<Box<dyn Effect>, LoadError>
where
    E: Effect + serde::de::DeserializeOwned,
{
    let effect: E = serde_json::from_value(payload)?;
    Ok(Box::new(effect))
}

// ---------------------------------------------------------------------------
// Reference resolution
// ---------------------------------------------------------------------------

/// Game-side lookups needed while loading effects.
///
/// Definitions are the game's static data (legal authorities, recipes,
/// cells); progs are the game's scripted predicates.
pub trait ReferenceResolver: Send {
    /// Whether the definition of `kind` with `id` still exists.
    fn definition_exists(&self, _kind: &str, _id: u64) -> bool {
        false
    }

    /// Resolve an applicability prog by ID.
    fn prog(&self, _id: u64) -> Option<Arc<dyn ApplicabilityProg>> {
        None
    }
}

/// Resolver that knows no definitions and no progs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl ReferenceResolver for NullResolver {}

/// What a loader can see while reconstructing an effect.
pub struct LoadContext<'a> {
    pub(crate) owner: OwnerId,
    pub(crate) owners: &'a Owners,
    pub(crate) resolver: &'a dyn ReferenceResolver,
    pub(crate) now: WorldTime,
}

impl LoadContext<'_> {
    /// The owner the effect is being loaded onto.
    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Current world time.
    #[must_use]
    pub fn now(&self) -> WorldTime {
        self.now
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

    /// Fail with [`LoadError::UnresolvedOwner`] unless `id` exists.
    ///
    /// # Errors
    /// Returns an error if the owner is not registered.
    pub fn require_owner(&self, id: OwnerId) -> std::result::Result<OwnerId, LoadError> {
        if self.owner_exists(id) {
            Ok(id)
        } else {
            Err(LoadError::UnresolvedOwner(id))
        }
    }

    /// Fail with [`LoadError::UnresolvedDefinition`] unless the definition exists.
    ///
    /// # Errors
    /// Returns an error if the resolver does not know the definition.
    pub fn require_definition(&self, kind: &str, id: u64) -> std::result::Result<u64, LoadError> {
        if self.resolver.definition_exists(kind, id) {
            Ok(id)
        } else {
            Err(LoadError::UnresolvedDefinition {
                kind: kind.to_string(),
                id,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Registration of one concrete effect type.
pub struct EffectType {
    tag: &'static str,
    type_id: TypeId,
    type_name: &'static str,
    loader: Option<Loader>,
    projections: Vec<(TypeId, Box<dyn Any + Send + Sync>)>,
}

impl EffectType {
    /// Register effect type `E` under `tag`.
    #[must_use]
    pub fn new<E: Effect>(tag: &'static str) -> Self {
        Self {
            tag,
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            loader: None,
            projections: Vec::new(),
        }
    }

    /// Make the type durable by giving it a loader.
    #[must_use]
    pub fn loader(mut self, loader: Loader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Declare that this type implements capability `C`.
    #[must_use]
    pub fn provides<C: ?Sized + 'static>(
        mut self,
        projection: for<'a> fn(&'a (dyn Any + 'static)) -> Option<&'a C>,
    ) -> Self {
        self.projections.push((TypeId::of::<C>(), Box::new(projection)));
        self
    }
}

/// Ordered builder for [`EffectRegistry`].
#[derive(Default)]
pub struct EffectRegistryBuilder {
    types: Vec<EffectType>,
}

impl EffectRegistryBuilder {
    /// Append a registration.
    #[must_use]
    pub fn register(mut self, effect_type: EffectType) -> Self {
        self.types.push(effect_type);
        self
    }

    /// Finish the registry.
    ///
    /// # Errors
    /// Returns [`HexisError::DuplicateEffectType`] if a tag or a concrete
    /// type is registered twice.
    pub fn build(self) -> Result<EffectRegistry> {
        let mut registry = EffectRegistry::default();
        for t in self.types {
            if registry.by_tag.contains_key(t.tag) || registry.by_type.contains_key(&t.type_id) {
                return Err(HexisError::DuplicateEffectType { tag: t.tag });
            }
            debug!(
                tag = t.tag,
                rust_type = t.type_name,
                durable = t.loader.is_some(),
                "registered effect type"
            );
            registry.by_type.insert(t.type_id, t.tag);
            registry.by_tag.insert(t.tag, t.loader);
            registry.order.push(t.tag);
            for (capability, projection) in t.projections {
                registry.projections.insert((t.type_id, capability), projection);
            }
        }
        Ok(registry)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable table of registered effect types.
#[derive(Default)]
pub struct EffectRegistry {
    order: Vec<&'static str>,
    by_tag: HashMap<&'static str, Option<Loader>>,
    by_type: HashMap<TypeId, &'static str>,
    projections: HashMap<(TypeId, TypeId), Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRegistry")
            .field("tags", &self.order)
            .field("projections", &self.projections.len())
            .finish()
    }
}

impl EffectRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> EffectRegistryBuilder {
        EffectRegistryBuilder::default()
    }

    /// Registered tags, in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().copied()
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether `tag` is registered.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    /// Whether `tag` has a loader.
    #[must_use]
    pub fn is_durable(&self, tag: &str) -> bool {
        self.loader(tag).is_some()
    }

    /// The loader for `tag`.
    #[must_use]
    pub fn loader(&self, tag: &str) -> Option<Loader> {
        self.by_tag.get(tag).copied().flatten()
    }

    /// The tag a concrete effect type was registered under.
    #[must_use]
    pub fn tag_of<E: Effect>(&self) -> Option<&'static str> {
        self.by_type.get(&TypeId::of::<E>()).copied()
    }

    /// View `effect` as capability `C`, if its type registered a projection.
    #[must_use]
    pub fn project<'e, C: ?Sized + 'static>(&self, effect: &'e dyn Effect) -> Option<&'e C> {
        let any = effect.as_any();
        let projection = self
            .projections
            .get(&(any.type_id(), TypeId::of::<C>()))?
            .downcast_ref::<for<'a> fn(&'a (dyn Any + 'static)) -> Option<&'a C>>()?;
        projection(any)
    }
}
