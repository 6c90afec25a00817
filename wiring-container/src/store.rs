//! Binding storage for a single registry.
//!
//! Entries live in a vector in registration order; a two-level index
//! (`type → name → position`) serves exact lookups. Keeping the order
//! explicit makes the assignability scan deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::binding::{AnyValue, Binding};
use crate::error::{AlreadyRegisteredError, Result, WiringError};
use crate::key::{BindingKey, TypeKey};

/// Converts a stored value into another type it is assignable to.
pub(crate) type CastFn = Arc<dyn Fn(&AnyValue) -> Option<AnyValue> + Send + Sync>;

/// What a slot holds: a concrete value or a factory.
#[derive(Clone)]
pub(crate) enum Slot {
    Value(AnyValue),
    Factory(Arc<Binding>),
}

impl Slot {
    fn kind(&self) -> &'static str {
        match self {
            Slot::Value(_) => "value",
            Slot::Factory(_) => "factory",
        }
    }
}

#[derive(Clone)]
pub(crate) struct Cast {
    pub target: TypeKey,
    pub convert: CastFn,
}

pub(crate) struct Entry {
    pub key: BindingKey,
    pub slot: Slot,
    pub casts: Vec<Cast>,
}

/// A fallback candidate: a slot of another type that declared a cast
/// to the requested type.
pub(crate) struct Candidate {
    pub key: BindingKey,
    pub slot: Slot,
    pub convert: CastFn,
}

#[derive(Default)]
pub(crate) struct Store {
    entries: Vec<Entry>,
    index: HashMap<TypeKey, HashMap<String, usize>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `slot` under `key`.
    ///
    /// A replaced entry keeps its position in registration order and
    /// drops the casts declared for the previous occupant.
    ///
    /// # Errors
    /// [`WiringError::AlreadyRegistered`] if the key is taken and
    /// `allow_override` is false; the store is left unchanged.
    pub fn insert(&mut self, key: BindingKey, slot: Slot, allow_override: bool) -> Result<()> {
        let names = self.index.entry(key.ty()).or_default();

        if let Some(&position) = names.get(key.name()) {
            if !allow_override {
                return Err(WiringError::AlreadyRegistered(AlreadyRegisteredError { key }));
            }
            debug!(key = %key, kind = slot.kind(), "Replaced binding");
            let entry = &mut self.entries[position];
            entry.slot = slot;
            entry.casts.clear();
            return Ok(());
        }

        debug!(key = %key, kind = slot.kind(), "Registered binding");
        names.insert(key.name().to_string(), self.entries.len());
        self.entries.push(Entry { key, slot, casts: Vec::new() });
        Ok(())
    }

    /// Declares that the entry under `key` is assignable to `cast.target`.
    ///
    /// Returns `false` if no such entry exists.
    pub fn add_cast(&mut self, key: &BindingKey, cast: Cast) -> bool {
        let Some(position) = self.position(&key.ty(), key.name()) else {
            return false;
        };
        let casts = &mut self.entries[position].casts;
        casts.retain(|existing| existing.target != cast.target);
        casts.push(cast);
        true
    }

    pub fn get(&self, ty: &TypeKey, name: &str) -> Option<&Entry> {
        self.position(ty, name).map(|position| &self.entries[position])
    }

    /// Entries of other types under the same name that can become `ty`,
    /// in registration order.
    pub fn candidates(&self, ty: &TypeKey, name: &str) -> Vec<Candidate> {
        self.entries
            .iter()
            .filter(|entry| entry.key.ty() != *ty && entry.key.name() == name)
            .filter_map(|entry| {
                let cast = entry.casts.iter().find(|cast| cast.target == *ty)?;
                Some(Candidate {
                    key: entry.key.clone(),
                    slot: entry.slot.clone(),
                    convert: cast.convert.clone(),
                })
            })
            .collect()
    }

    /// Returns `true` if any entry declared a cast to `ty`.
    pub fn has_cast_to(&self, ty: &TypeKey) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.casts.iter().any(|cast| cast.target == *ty))
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, ty: &TypeKey, name: &str) -> Option<usize> {
        self.index.get(ty)?.get(name).copied()
    }
}
