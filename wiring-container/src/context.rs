//! Scope bridge: carrying a registry alongside a unit of work.
//!
//! ```text
//! Root ──new_scope(ctx)──> Context { registry: child of ctx's registry }
//!   │                          │
//!   └──── get(&ctx) ───────────┘  scoped registry first, root on not-found
//! ```
//!
//! Three ways to find "the registry for this work":
//! - pass a [`Context`] explicitly
//! - attach a registry to a scope identifier with [`Root::enter`]
//! - with the `async` feature, run a future under [`task::with_registry`]

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::error::{Result, WiringError};
use crate::inject::Injectable;
use crate::injected::{FactoryOutput, Injected};
use crate::lifetime::Lifetime;
use crate::registry::{Produced, Registered, Registry};

/// An immutable handle that may carry a registry.
///
/// Cloning is cheap; deriving a new context never changes the old one.
#[derive(Clone, Default)]
pub struct Context {
    registry: Option<Arc<Registry>>,
}

impl Context {
    /// A context with no registry attached.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a context carrying `registry`.
    pub fn with_registry(&self, registry: Arc<Registry>) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    pub fn registry(&self) -> Option<&Arc<Registry>> {
        self.registry.as_ref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry.as_ref().map(|r| r.depth()))
            .finish()
    }
}

impl Registry {
    /// Derives a context from `parent` that carries this registry.
    pub fn new_context(self: &Arc<Self>, parent: &Context) -> Context {
        parent.with_registry(Arc::clone(self))
    }
}

/// The top-level registry of an application, plus the scopes derived
/// from it.
///
/// Create one at startup and hand it to whatever needs it. Scopes are
/// keyed by an identifier of your choosing, such as a request id.
///
/// ```rust
/// use wiring_container::prelude::*;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct RequestId(u64);
///
/// let root: Root<u64> = Root::new();
/// let scoped = root.enter(7);
/// scoped.bind(RequestId(7))?;
///
/// let ctx = root.scope(&7).new_context(&Context::background());
/// assert_eq!(root.get::<RequestId>(&ctx)?, RequestId(7));
///
/// root.leave(&7);
/// assert!(root.get::<RequestId>(&Context::background()).is_err());
/// # Ok::<(), WiringError>(())
/// ```
pub struct Root<S = String>
where
    S: Eq + Hash,
{
    registry: Arc<Registry>,
    scopes: DashMap<S, Arc<Registry>>,
}

impl<S: Eq + Hash> Default for Root<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Eq + Hash> Root<S> {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Uses an already configured registry as the root.
    pub fn with_registry(registry: Registry) -> Self {
        debug!("Created root registry");
        Self {
            registry: Arc::new(registry),
            scopes: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // ── Scope table ──

    /// Forks the root and attaches the child to `scope`, replacing any
    /// registry already attached to it.
    pub fn enter(&self, scope: S) -> Arc<Registry> {
        let child = self.registry.fork();
        self.scopes.insert(scope, Arc::clone(&child));
        debug!(scopes = self.scopes.len(), "Entered scope");
        child
    }

    /// The registry attached to `scope`, or the root when none is.
    pub fn scope(&self, scope: &S) -> Arc<Registry> {
        match self.scopes.get(scope) {
            Some(registry) => Arc::clone(registry.value()),
            None => {
                trace!("No registry attached to scope, using root");
                Arc::clone(&self.registry)
            }
        }
    }

    /// Detaches and returns the registry attached to `scope`.
    pub fn leave(&self, scope: &S) -> Option<Arc<Registry>> {
        let removed = self.scopes.remove(scope).map(|(_, registry)| registry);
        if removed.is_some() {
            debug!(scopes = self.scopes.len(), "Left scope");
        }
        removed
    }

    /// Number of attached scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    // ── Registration on the root ──

    pub fn bind<T: Clone + Send + Sync + 'static>(&self, value: T) -> Result<Registered<'_, T>> {
        self.registry.bind(value)
    }

    pub fn named_bind<T: Clone + Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        value: T,
    ) -> Result<Registered<'_, T>> {
        self.registry.named_bind(name, value)
    }

    pub fn factory<F, Args>(&self, factory: F) -> Result<Registered<'_, Produced<F, Args>>>
    where
        F: Injected<Args> + Send + Sync + 'static,
        F::Output: FactoryOutput,
        Args: 'static,
    {
        self.registry.factory(factory)
    }

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
        self.registry.named_factory(name, factory, lifetime)
    }

    #[track_caller]
    pub fn must_factory<F, Args>(&self, factory: F) -> Registered<'_, Produced<F, Args>>
    where
        F: Injected<Args> + Send + Sync + 'static,
        F::Output: FactoryOutput,
        Args: 'static,
    {
        self.registry.must_factory(factory)
    }

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
        self.registry.must_named_factory(name, factory, lifetime)
    }

    // ── Resolution ──

    /// Injects `target` from the root registry.
    pub fn resolve<T: Injectable>(&self, target: &mut T) -> Result<()> {
        self.registry.resolve(target)
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self, ctx: &Context) -> Result<T> {
        self.named_get(ctx, "")
    }

    /// Tries the context's registry, then the root.
    ///
    /// Only a not-found result falls through to the root; any other
    /// failure in the scoped registry is returned as is.
    pub fn named_get<T: Clone + Send + Sync + 'static>(&self, ctx: &Context, name: &str) -> Result<T> {
        if let Some(scoped) = ctx.registry() {
            match scoped.named_get::<T>(name) {
                Err(WiringError::ValueNotFound(_)) => {
                    trace!(name, "Not found in scoped registry, falling back to root");
                }
                found => return found,
            }
        }
        self.registry.named_get(name)
    }

    #[track_caller]
    pub fn must_get<T: Clone + Send + Sync + 'static>(&self, ctx: &Context) -> T {
        self.must_named_get(ctx, "")
    }

    #[track_caller]
    pub fn must_named_get<T: Clone + Send + Sync + 'static>(&self, ctx: &Context, name: &str) -> T {
        match self.named_get(ctx, name) {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    /// Calls `f` with parameters resolved from the root registry.
    pub fn invoke<F, Args>(&self, f: F) -> Result<F::Output>
    where
        F: Injected<Args>,
    {
        self.registry.invoke(f)
    }

    // ── Scoping ──

    pub fn fork(&self) -> Arc<Registry> {
        self.registry.fork()
    }

    /// A context carrying the root registry.
    pub fn new_context(&self, parent: &Context) -> Context {
        self.registry.new_context(parent)
    }

    /// A context carrying a fresh child of `parent`'s registry (or of the
    /// root when `parent` carries none).
    pub fn new_scope(&self, parent: &Context) -> Context {
        let base = parent.registry().unwrap_or(&self.registry);
        base.fork().new_context(parent)
    }
}

impl<S: Eq + Hash> fmt::Debug for Root<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("registry", &self.registry)
            .field("scopes", &self.scopes.len())
            .finish()
    }
}

/// Task-local registry propagation for async code.
#[cfg(feature = "async")]
pub mod task {
    use std::future::Future;
    use std::sync::Arc;

    use crate::registry::Registry;

    tokio::task_local! {
        static CURRENT: Arc<Registry>;
    }

    /// Runs `future` with `registry` as the task's current registry.
    pub async fn with_registry<F: Future>(registry: Arc<Registry>, future: F) -> F::Output {
        CURRENT.scope(registry, future).await
    }

    /// The registry of the enclosing [`with_registry`], if any.
    pub fn current() -> Option<Arc<Registry>> {
        CURRENT.try_with(Arc::clone).ok()
    }
}
