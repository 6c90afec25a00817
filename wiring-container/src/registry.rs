//! # The Registry — heart of Wiring
//!
//! A registry binds types (optionally qualified by a name) to values or
//! factories and resolves them on demand.
//!
//! # Resolution order
//! ```text
//! get::<T>(name)
//!   1. value bound under (T, name)            ┐
//!   2. factory bound under (T, name)          │ this registry,
//!   3. first entry of another type, same name,│ then each parent
//!      that is assignable to T                ┘
//!   4. implicit construction of an injectable struct T
//!   5. ValueNotFound
//! ```
//!
//! # Scoping
//! ```text
//! Registry ──fork()──> Registry (child)
//!    ▲                    │
//!    └──── lookups ───────┘   the child never writes to its parent
//! ```
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use wiring_container::prelude::*;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str);
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) { println!("{msg}"); }
//! }
//!
//! struct UserService {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! let registry = Registry::new();
//! registry
//!     .bind(Arc::new(ConsoleLogger))?
//!     .assignable_to(|logger| logger as Arc<dyn Logger>);
//! registry.shared_factory(|logger: Arc<dyn Logger>| Arc::new(UserService { logger }))?;
//!
//! let service: Arc<UserService> = registry.get()?;
//! service.logger.log("ready");
//! # Ok::<(), WiringError>(())
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, trace, warn};
use wiring_support::rendering::suggest_similar;

use crate::binding::{AnyValue, Binding, DynFn, DynReturn, Frame, ResolutionGuard};
use crate::error::{NotFoundError, Result, WiringError};
use crate::inject::{FieldInjector, Injectable, struct_kind};
use crate::injected::{FactoryOutput, Injected};
use crate::key::{BindingKey, TypeKey};
use crate::lifetime::Lifetime;
use crate::module::Module;
use crate::store::{Cast, Slot, Store};

/// Registry behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// A registration for an occupied `(type, name)` slot replaces the
    /// previous occupant. When `false` it fails with `AlreadyRegistered`.
    pub allow_override: bool,
    /// Build injectable structs that have no binding.
    pub implicit_construction: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            allow_override: true,
            implicit_construction: true,
        }
    }
}

/// Builds a root [`Registry`] with custom [`Settings`].
///
/// ```rust
/// use wiring_container::prelude::*;
///
/// let registry = Registry::builder().allow_override(false).build();
/// registry.bind(1u8).unwrap();
/// assert!(registry.bind(2u8).is_err());
/// ```
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    settings: Settings,
}

impl RegistryBuilder {
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.settings.allow_override = allow;
        self
    }

    pub fn implicit_construction(mut self, enabled: bool) -> Self {
        self.settings.implicit_construction = enabled;
        self
    }

    pub fn build(self) -> Registry {
        debug!(settings = ?self.settings, "Building registry");
        Registry::with_settings(None, self.settings)
    }
}

/// Type-indexed store of values and factories with scoped delegation.
///
/// A registry is `Send + Sync`; registration and resolution may happen
/// concurrently. Forking requires the registry to live in an [`Arc`].
pub struct Registry {
    parent: Option<Arc<Registry>>,
    store: RwLock<Store>,
    settings: Settings,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates an empty root registry with default settings.
    pub fn new() -> Self {
        Self::with_settings(None, Settings::default())
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    fn with_settings(parent: Option<Arc<Registry>>, settings: Settings) -> Self {
        Self {
            parent,
            store: RwLock::new(Store::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn parent(&self) -> Option<&Arc<Registry>> {
        self.parent.as_ref()
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.ancestry().count() - 1
    }

    /// Creates a child registry that inherits lookups from this one.
    ///
    /// Bindings added to the child shadow identically keyed bindings here
    /// and are invisible from this registry.
    pub fn fork(self: &Arc<Self>) -> Arc<Registry> {
        let child = Registry::with_settings(Some(Arc::clone(self)), self.settings.clone());
        debug!(depth = child.depth(), "Forked registry");
        Arc::new(child)
    }

    // ── Registration ──

    /// Binds a concrete value under its own type.
    ///
    /// Prefer distinct wrapper types over builtins such as `String` or
    /// `u32`: unrelated bindings of the same builtin type collide.
    pub fn bind<T: Clone + Send + Sync + 'static>(&self, value: T) -> Result<Registered<'_, T>> {
        self.named_bind("", value)
    }

    /// Binds a concrete value under its own type and `name`.
    pub fn named_bind<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        value: T,
    ) -> Result<Registered<'_, T>> {
        let key = BindingKey::named::<T>(name);
        if key.ty().is_builtin() {
            debug!(key = %key, "Binding a builtin type; a wrapper type avoids collisions");
        }
        self.store
            .write()
            .insert(key.clone(), Slot::Value(Arc::new(value)), self.settings.allow_override)?;
        Ok(Registered::new(self, key))
    }

    /// Registers a transient factory under its produced type.
    ///
    /// The factory's parameters are resolved on every call.
    pub fn factory<F, Args>(&self, factory: F) -> Result<Registered<'_, Produced<F, Args>>>
    where
        F: Injected<Args> + Send + Sync + 'static,
        F::Output: FactoryOutput,
        Args: 'static,
    {
        self.named_factory("", factory, Lifetime::Transient)
    }

    /// Registers a factory whose first successful result is cached.
    pub fn shared_factory<F, Args>(&self, factory: F) -> Result<Registered<'_, Produced<F, Args>>>
    where
        F: Injected<Args> + Send + Sync + 'static,
        F::Output: FactoryOutput,
        Args: 'static,
    {
        self.named_factory("", factory, Lifetime::Shared)
    }

    /// Registers a factory under its produced type and `name`.
    ///
    /// # Errors
    /// [`WiringError::CircularReference`] if the factory takes the type it
    /// returns; the registry is left unchanged.
    pub fn named_factory<F, Args>(
        &self,
        name: impl Into<String>,
        factory: F,
        lifetime: impl Into<Lifetime>,
    ) -> Result<Registered<'_, Produced<F, Args>>>
    where
        F: Injected<Args> + Send + Sync + 'static,
        F::Output: FactoryOutput,
        Args: 'static,
    {
        let binding = Binding::new(name, factory, lifetime.into())?;
        let key = self.insert_binding(binding)?;
        Ok(Registered::new(self, key))
    }

    /// Registers a runtime-assembled factory.
    pub fn factory_dyn(
        &self,
        name: impl Into<String>,
        factory: DynFn,
        lifetime: impl Into<Lifetime>,
    ) -> Result<BindingKey> {
        let binding = Binding::from_dyn(name, factory, lifetime.into())?;
        self.insert_binding(binding)
    }

    /// Like [`factory`](Self::factory), panicking on a registration error.
    #[track_caller]
    pub fn must_factory<F, Args>(&self, factory: F) -> Registered<'_, Produced<F, Args>>
    where
        F: Injected<Args> + Send + Sync + 'static,
        F::Output: FactoryOutput,
        Args: 'static,
    {
        match self.factory(factory) {
            Ok(registered) => registered,
            Err(error) => panic!("{error}"),
        }
    }

    /// Like [`named_factory`](Self::named_factory), panicking on a
    /// registration error.
    #[track_caller]
    pub fn must_named_factory<F, Args>(
        &self,
        name: impl Into<String>,
        factory: F,
        lifetime: impl Into<Lifetime>,
    ) -> Registered<'_, Produced<F, Args>>
    where
        F: Injected<Args> + Send + Sync + 'static,
        F::Output: FactoryOutput,
        Args: 'static,
    {
        match self.named_factory(name, factory, lifetime) {
            Ok(registered) => registered,
            Err(error) => panic!("{error}"),
        }
    }

    /// Applies a [`Module`]'s registrations.
    pub fn install(&self, module: &dyn Module) -> Result<()> {
        debug!(module = module.name(), "Installing module");
        module.register(self).inspect_err(|error| {
            warn!(module = module.name(), %error, "Module registration failed");
        })
    }

    fn insert_binding(&self, binding: Binding) -> Result<BindingKey> {
        let key = binding.key().clone();
        debug!(key = %key, lifetime = %binding.lifetime(), signature = %binding.signature(), "Registering factory");
        self.store.write().insert(
            key.clone(),
            Slot::Factory(Arc::new(binding)),
            self.settings.allow_override,
        )?;
        Ok(key)
    }

    // ── Resolution ──

    /// Resolves the default binding of `T`.
    ///
    /// ```rust,ignore
    /// let db: Arc<Database> = registry.get()?;
    /// ```
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Result<T> {
        self.named_get("")
    }

    /// Resolves `T` under `name`.
    ///
    /// A named request never falls back to the default slot of `T`.
    pub fn named_get<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<T> {
        let key = BindingKey::named::<T>(name);
        let value = self.get_key(&key)?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| WiringError::TypeMismatch {
                key,
                expected: type_name::<T>(),
            })
    }

    /// Like [`get`](Self::get), panicking on failure.
    #[track_caller]
    pub fn must_get<T: Clone + Send + Sync + 'static>(&self) -> T {
        self.must_named_get("")
    }

    /// Like [`named_get`](Self::named_get), panicking on failure.
    #[track_caller]
    pub fn must_named_get<T: Clone + Send + Sync + 'static>(&self, name: &str) -> T {
        match self.named_get(name) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Resolves a key to its type-erased value.
    pub fn get_key(&self, key: &BindingKey) -> Result<AnyValue> {
        trace!(key = %key, "Resolving");

        for registry in self.ancestry() {
            if let Some(value) = registry.lookup_local(key)? {
                return Ok(value);
            }
        }

        if let Some(value) = self.construct_implicitly(key)? {
            return Ok(value);
        }

        Err(self.not_found(key))
    }

    /// Returns `true` if `(T, name)` is bound here or in an ancestor.
    pub fn contains<T: ?Sized + 'static>(&self, name: &str) -> bool {
        let ty = TypeKey::of::<T>();
        self.ancestry()
            .any(|registry| registry.store.read().get(&ty, name).is_some())
    }

    /// Own keys, in registration order.
    pub fn keys(&self) -> Vec<BindingKey> {
        self.store
            .read()
            .entries()
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Number of own bindings; ancestors are not counted.
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// Steps 1–3 of the resolution order against this registry only.
    ///
    /// The store lock is released before any factory runs.
    fn lookup_local(&self, key: &BindingKey) -> Result<Option<AnyValue>> {
        let ty = key.ty();
        let (exact, candidates) = {
            let store = self.store.read();
            match store.get(&ty, key.name()) {
                Some(entry) => (Some(entry.slot.clone()), Vec::new()),
                None => (None, store.candidates(&ty, key.name())),
            }
        };

        match exact {
            Some(Slot::Value(value)) => {
                trace!(key = %key, depth = self.depth(), "Found bound value");
                return Ok(Some(value));
            }
            Some(Slot::Factory(binding)) => {
                trace!(key = %key, depth = self.depth(), "Found factory");
                return binding.make(self).map(Some);
            }
            None => {}
        }

        for candidate in candidates {
            let value = match candidate.slot {
                Slot::Value(value) => value,
                // a candidate that cannot be built is not a match
                Slot::Factory(binding) => match binding.make(self) {
                    Ok(value) => value,
                    Err(error) => {
                        debug!(key = %key, candidate = %candidate.key, %error, "Assignable factory failed, trying next");
                        continue;
                    }
                },
            };
            if let Some(converted) = (candidate.convert)(&value) {
                trace!(key = %key, candidate = %candidate.key, "Found assignable binding");
                return Ok(Some(converted));
            }
        }

        Ok(None)
    }

    fn construct_implicitly(&self, key: &BindingKey) -> Result<Option<AnyValue>> {
        if !self.settings.implicit_construction {
            return Ok(None);
        }
        let Some(kind) = struct_kind(key.ty().type_id()) else {
            return Ok(None);
        };

        let _guard = ResolutionGuard::enter(Frame::Struct(key.ty().type_id()), key)?;
        trace!(key = %key, "Constructing injectable struct");
        kind.build(self).map(Some)
    }

    fn not_found(&self, key: &BindingKey) -> WiringError {
        let visible = self.visible_keys();

        let mut suggestions: Vec<String> = visible
            .iter()
            .filter(|known| known.ty() == key.ty())
            .map(ToString::to_string)
            .collect();

        let others: Vec<&str> = visible
            .iter()
            .filter(|known| known.ty() != key.ty())
            .map(|known| known.ty().type_name())
            .collect();
        for similar in suggest_similar(key.ty().type_name(), &others, 3) {
            if !suggestions.contains(&similar) {
                suggestions.push(similar);
            }
        }

        WiringError::ValueNotFound(NotFoundError {
            requested: key.clone(),
            required_by: None,
            suggestions,
        })
    }

    // ── Struct injection ──

    /// Fills the requested fields of `target`, in declaration order.
    pub fn resolve<T: Injectable>(&self, target: &mut T) -> Result<()> {
        trace!(target = type_name::<T>(), "Injecting fields");
        let mut fields = FieldInjector::new::<T>(self);
        target.inject_fields(&mut fields)
    }

    /// Type-erased [`resolve`](Self::resolve) for structs submitted by
    /// `#[derive(Inject)]`.
    ///
    /// # Errors
    /// [`WiringError::NonStructResolveTarget`] if the target's type is not
    /// a known injectable struct.
    pub fn resolve_any(&self, target: &mut dyn Any) -> Result<()> {
        let type_id = (*target).type_id();
        match struct_kind(type_id) {
            Some(kind) => kind.inject(target, self),
            None => Err(WiringError::NonStructResolveTarget {
                target: format!("{type_id:?}"),
            }),
        }
    }

    /// Builds a default `T` and injects its fields.
    pub fn construct<T: Injectable>(&self) -> Result<T> {
        let mut target = T::default();
        self.resolve(&mut target)?;
        Ok(target)
    }

    // ── Invocation ──

    /// Calls `f` with every parameter resolved by type.
    ///
    /// The function's own return value is passed back untouched, including
    /// any `Result` it returns.
    pub fn invoke<F, Args>(&self, f: F) -> Result<F::Output>
    where
        F: Injected<Args>,
    {
        f.call_injected(self)
    }

    /// Calls a runtime-assembled function, returning its raw return slots.
    pub fn invoke_dyn(&self, f: &DynFn) -> Result<Vec<DynReturn>> {
        let body = f.callable().ok_or(WiringError::NonFunctionInvokeTarget)?;
        let args = self.resolve_params(f.signature().params())?;
        Ok(body(args))
    }

    pub(crate) fn resolve_params(&self, params: &[TypeKey]) -> Result<Vec<AnyValue>> {
        params
            .iter()
            .map(|ty| self.get_key(&BindingKey::new(*ty, "")))
            .collect()
    }

    // ── Internals shared with validation ──

    /// This registry followed by its ancestors.
    pub(crate) fn ancestry(&self) -> impl Iterator<Item = &Registry> {
        std::iter::successors(Some(self), |registry| registry.parent.as_deref())
    }

    pub(crate) fn store(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read()
    }

    /// Keys visible from here, nearest registry first, without duplicates.
    fn visible_keys(&self) -> Vec<BindingKey> {
        let mut keys: Vec<BindingKey> = Vec::new();
        for registry in self.ancestry() {
            for key in registry.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("registered", &self.len())
            .field("depth", &self.depth())
            .field("settings", &self.settings)
            .finish()
    }
}

/// The value type produced by factory `F`.
pub type Produced<F, Args> = <<F as Injected<Args>>::Output as FactoryOutput>::Value;

/// Handle to a fresh registration, used to declare what it is assignable to.
pub struct Registered<'r, S> {
    registry: &'r Registry,
    key: BindingKey,
    _marker: PhantomData<fn() -> S>,
}

impl<'r, S: Clone + Send + Sync + 'static> Registered<'r, S> {
    fn new(registry: &'r Registry, key: BindingKey) -> Self {
        Self {
            registry,
            key,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &BindingKey {
        &self.key
    }

    /// Declares that this binding can satisfy requests for `T`.
    ///
    /// Requests for `T` under the same name that find no exact binding
    /// consider this entry, converting its value with `convert`.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use wiring_container::prelude::*;
    ///
    /// trait Clock: Send + Sync {}
    /// struct SystemClock;
    /// impl Clock for SystemClock {}
    ///
    /// let registry = Registry::new();
    /// registry
    ///     .bind(Arc::new(SystemClock))?
    ///     .assignable_to(|clock| clock as Arc<dyn Clock>);
    ///
    /// let _clock: Arc<dyn Clock> = registry.get()?;
    /// # Ok::<(), WiringError>(())
    /// ```
    pub fn assignable_to<T, F>(self, convert: F) -> Self
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(S) -> T + Send + Sync + 'static,
    {
        let target = TypeKey::of::<T>();
        let cast = Cast {
            target,
            convert: Arc::new(move |value: &AnyValue| {
                value
                    .downcast_ref::<S>()
                    .cloned()
                    .map(|source| Arc::new(convert(source)) as AnyValue)
            }),
        };
        if self.registry.store.write().add_cast(&self.key, cast) {
            debug!(from = %self.key, to = %target, "Declared assignable");
        }
        self
    }
}

impl<S> fmt::Debug for Registered<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registered").field("key", &self.key).finish()
    }
}

pub mod prelude {
    pub use super::{Registered, Registry, RegistryBuilder, Settings};
    pub use crate::binding::{AnyValue, DynFn, DynReturn};
    pub use crate::context::{Context, Root};
    pub use crate::error::{Result, WiringError};
    pub use crate::inject::Injectable;
    pub use crate::key::{BindingKey, TypeKey, interface_of};
    pub use crate::lifetime::Lifetime;
    pub use crate::module::Module;
}
