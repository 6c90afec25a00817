//! Factory bindings.
//!
//! A [`Binding`] wraps a factory, the type it produces and its caching
//! policy. The factory's shape is checked once, when the binding is built:
//!
//! 1. it returns one value, or a value and an error;
//! 2. none of its parameters is the type it returns.
//!
//! Shared bindings cache their first successful result in a
//! [`OnceCell`]. One thread builds; concurrent first callers wait for it
//! and observe the same value. A caller whose wait would close a loop of
//! builders waiting on each other gets `CircularDependency` instead.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::error::{
    BoxError, CircularDependencyError, InvalidSignatureError, Result, WiringError,
};
use crate::injected::{FactoryOutput, Injected};
use crate::key::{BindingKey, TypeKey};
use crate::lifetime::Lifetime;
use crate::registry::Registry;

/// A type-erased value held by a registry.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

type ErasedFactory = Box<dyn Fn(&Registry) -> Result<AnyValue> + Send + Sync>;

/// Body of a [`DynFn`]: receives the resolved arguments in parameter order.
pub type DynBody = Arc<dyn Fn(Vec<AnyValue>) -> Vec<DynReturn> + Send + Sync>;

/// One declared return value of a factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnSlot {
    key: TypeKey,
    error: bool,
}

impl ReturnSlot {
    pub fn value<T: ?Sized + 'static>() -> Self {
        Self { key: TypeKey::of::<T>(), error: false }
    }

    /// A slot whose type is an error.
    pub fn error<E: ?Sized + 'static>() -> Self {
        Self { key: TypeKey::of::<E>(), error: true }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn is_error(&self) -> bool {
        self.error
    }
}

/// Declared parameters and return slots of a callable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<TypeKey>,
    returns: Vec<ReturnSlot>,
}

impl Signature {
    pub fn new(params: Vec<TypeKey>, returns: Vec<ReturnSlot>) -> Self {
        Self { params, returns }
    }

    pub fn params(&self) -> &[TypeKey] {
        &self.params
    }

    pub fn returns(&self) -> &[ReturnSlot] {
        &self.returns
    }

    /// Checks the factory shape and returns the produced type.
    pub fn validate(&self) -> Result<TypeKey> {
        let produced = match self.returns.as_slice() {
            [value] => value.key,
            [value, error] if error.error => value.key,
            [_, _] => return Err(self.invalid("the second return value must be an error")),
            _ => {
                return Err(self.invalid("a factory must return a value, or a value and an error"));
            }
        };

        if self.params.contains(&produced) {
            return Err(WiringError::CircularReference { key: produced });
        }

        Ok(produced)
    }

    fn invalid(&self, reason: &'static str) -> WiringError {
        WiringError::InvalidFactorySignature(InvalidSignatureError {
            signature: self.to_string(),
            reason,
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(TypeKey::short_name).collect();
        write!(f, "fn({})", params.join(", "))?;
        match self.returns.as_slice() {
            [] => Ok(()),
            [single] => write!(f, " -> {}", single.key.short_name()),
            many => {
                let returns: Vec<String> = many.iter().map(|slot| slot.key.short_name()).collect();
                write!(f, " -> ({})", returns.join(", "))
            }
        }
    }
}

/// A value returned by a [`DynFn`] body.
pub enum DynReturn {
    Value(AnyValue),
    /// An error slot; `None` means the call succeeded.
    Error(Option<BoxError>),
}

impl fmt::Debug for DynReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynReturn::Value(_) => f.write_str("Value(..)"),
            DynReturn::Error(error) => f.debug_tuple("Error").field(error).finish(),
        }
    }
}

/// A callable assembled at runtime from an explicit signature.
///
/// Use this when the parameter types are only known at runtime, e.g. for
/// plugin hosts. Typed closures go through [`Registry::factory`] and
/// [`Registry::invoke`] instead.
///
/// ```
/// use std::sync::Arc;
/// use wiring_container::binding::{AnyValue, DynFn, DynReturn};
///
/// #[derive(Clone)]
/// struct Port(u16);
///
/// let next_port = DynFn::new()
///     .param::<Port>()
///     .returns::<Port>()
///     .body(|args| {
///         let port = args[0].downcast_ref::<Port>().map_or(0, |p| p.0);
///         vec![DynReturn::Value(Arc::new(Port(port + 1)) as AnyValue)]
///     });
/// assert_eq!(next_port.signature().to_string(), "fn(Port) -> Port");
/// ```
#[derive(Clone, Default)]
pub struct DynFn {
    signature: Signature,
    body: Option<DynBody>,
}

impl DynFn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param<T: 'static>(mut self) -> Self {
        self.signature.params.push(TypeKey::of::<T>());
        self
    }

    pub fn returns<T: 'static>(mut self) -> Self {
        self.signature.returns.push(ReturnSlot::value::<T>());
        self
    }

    pub fn returns_error<E: std::error::Error + 'static>(mut self) -> Self {
        self.signature.returns.push(ReturnSlot::error::<E>());
        self
    }

    pub fn body(
        mut self,
        body: impl Fn(Vec<AnyValue>) -> Vec<DynReturn> + Send + Sync + 'static,
    ) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn callable(&self) -> Option<&DynBody> {
        self.body.as_ref()
    }
}

impl fmt::Debug for DynFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynFn")
            .field("signature", &self.signature.to_string())
            .field("callable", &self.body.is_some())
            .finish()
    }
}

/// A registered factory together with its produced type and caching policy.
pub struct Binding {
    key: BindingKey,
    signature: Signature,
    lifetime: Lifetime,
    factory: ErasedFactory,
    cached: OnceCell<AnyValue>,
}

impl Binding {
    /// Builds a binding from a typed factory.
    ///
    /// # Errors
    /// [`WiringError::CircularReference`] if a parameter has the produced type.
    pub fn new<F, Args>(name: impl Into<String>, factory: F, lifetime: Lifetime) -> Result<Self>
    where
        F: Injected<Args> + Send + Sync + 'static,
        F::Output: FactoryOutput,
        Args: 'static,
    {
        let signature = Signature::new(
            F::parameters(),
            <F::Output as FactoryOutput>::returns(),
        );
        let produced = signature.validate()?;

        let erased = move |registry: &Registry| -> Result<AnyValue> {
            let output = factory.call_injected(registry)?;
            let value = output.into_value().map_err(WiringError::from_factory)?;
            Ok(Arc::new(value) as AnyValue)
        };

        Ok(Self::assemble(
            BindingKey::new(produced, name),
            signature,
            lifetime,
            Box::new(erased),
        ))
    }

    /// Builds a binding from a runtime-assembled callable.
    ///
    /// # Errors
    /// - [`WiringError::NotAFactory`] if `factory` has no body
    /// - [`WiringError::InvalidFactorySignature`] for a bad return shape
    /// - [`WiringError::CircularReference`] if a parameter has the produced type
    pub fn from_dyn(name: impl Into<String>, factory: DynFn, lifetime: Lifetime) -> Result<Self> {
        let body = factory.callable().cloned().ok_or(WiringError::NotAFactory)?;
        let signature = factory.signature().clone();
        let produced = signature.validate()?;
        let key = BindingKey::new(produced, name);

        let params = signature.params().to_vec();
        let produced_key = key.clone();
        let erased = move |registry: &Registry| -> Result<AnyValue> {
            let args = registry.resolve_params(&params)?;
            let mut returned = body(args).into_iter();
            match (returned.next(), returned.next()) {
                (_, Some(DynReturn::Error(Some(error)))) => Err(WiringError::from_factory(error)),
                (Some(DynReturn::Value(value)), _)
                    if Any::type_id(&*value) == produced.type_id() =>
                {
                    Ok(value)
                }
                _ => Err(WiringError::TypeMismatch {
                    key: produced_key.clone(),
                    expected: produced.type_name(),
                }),
            }
        };

        Ok(Self::assemble(key, signature, lifetime, Box::new(erased)))
    }

    fn assemble(
        key: BindingKey,
        signature: Signature,
        lifetime: Lifetime,
        factory: ErasedFactory,
    ) -> Self {
        Self {
            key,
            signature,
            lifetime,
            factory,
            cached: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &BindingKey {
        &self.key
    }

    /// The abstract type this binding satisfies.
    pub fn produced(&self) -> TypeKey {
        self.key.ty()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Returns `true` once a shared binding holds its value.
    pub fn is_built(&self) -> bool {
        self.cached.get().is_some()
    }

    /// Produces a value, resolving the factory's parameters against `registry`.
    ///
    /// Shared bindings return the cached value after the first success.
    pub fn make(&self, registry: &Registry) -> Result<AnyValue> {
        if let Some(value) = self.cached.get() {
            return Ok(value.clone());
        }

        let _guard = ResolutionGuard::enter(Frame::Binding(self.address()), &self.key)?;
        if !self.lifetime.is_cached() {
            return self.produce(registry);
        }

        match BuildClaim::acquire(self)? {
            Turn::Ready(value) => Ok(value),
            Turn::Build(_claim) => {
                let value = self.produce(registry)?;
                Ok(self.cached.get_or_init(|| value).clone())
            }
        }
    }

    fn address(&self) -> usize {
        self as *const Binding as usize
    }

    fn produce(&self, registry: &Registry) -> Result<AnyValue> {
        trace!(key = %self.key, lifetime = %self.lifetime, "Invoking factory");
        (self.factory)(registry).map_err(|error| match error {
            WiringError::ValueNotFound(mut missing) if missing.required_by.is_none() => {
                missing.required_by = Some(self.key.to_string());
                WiringError::ValueNotFound(missing)
            }
            other => other,
        })
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("key", &self.key)
            .field("signature", &self.signature.to_string())
            .field("lifetime", &self.lifetime)
            .field("built", &self.is_built())
            .finish()
    }
}

/// Shared builds in flight across all threads.
#[derive(Default)]
struct Builds {
    /// binding address -> building thread
    builders: HashMap<usize, (ThreadId, BindingKey)>,
    /// thread -> address of the binding it waits for
    waiting: HashMap<ThreadId, usize>,
}

impl Builds {
    /// Follows builder -> awaited binding -> builder from `address`. Returns
    /// the chain of keys if it leads back to `me`.
    fn wait_cycle(&self, me: ThreadId, mut address: usize) -> Option<Vec<BindingKey>> {
        let mut chain = Vec::new();
        for _ in 0..=self.waiting.len() {
            let (builder, key) = self.builders.get(&address)?;
            if *builder == me {
                chain.insert(0, key.clone());
                chain.push(key.clone());
                return Some(chain);
            }
            chain.push(key.clone());
            address = *self.waiting.get(builder)?;
        }
        None
    }
}

static BUILDS: Lazy<(Mutex<Builds>, Condvar)> = Lazy::new(Default::default);

enum Turn {
    /// Another thread finished the build.
    Ready(AnyValue),
    /// This thread builds; other callers wait until the claim drops.
    Build(BuildClaim),
}

struct BuildClaim {
    address: usize,
}

impl BuildClaim {
    fn acquire(binding: &Binding) -> Result<Turn> {
        let me = thread::current().id();
        let address = binding.address();
        let (lock, finished) = &*BUILDS;
        let mut builds = lock.lock();

        loop {
            if let Some(value) = binding.cached.get() {
                return Ok(Turn::Ready(value.clone()));
            }
            if !builds.builders.contains_key(&address) {
                builds.builders.insert(address, (me, binding.key.clone()));
                return Ok(Turn::Build(BuildClaim { address }));
            }
            if let Some(chain) = builds.wait_cycle(me, address) {
                warn!(cycle = ?chain, "Circular dependency detected across threads");
                return Err(WiringError::CircularDependency(CircularDependencyError { chain }));
            }

            debug!(key = %binding.key, "Waiting for shared build on another thread");
            builds.waiting.insert(me, address);
            finished.wait(&mut builds);
            builds.waiting.remove(&me);
        }
    }
}

impl Drop for BuildClaim {
    fn drop(&mut self) {
        let (lock, finished) = &*BUILDS;
        lock.lock().builders.remove(&self.address);
        finished.notify_all();
    }
}

thread_local! {
    // Frames being resolved on this thread, outermost first.
    static RESOLVING: RefCell<Vec<(Frame, BindingKey)>> = const { RefCell::new(Vec::new()) };
}

/// What a resolution frame is building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame {
    /// A binding, by address; distinct registries own distinct bindings.
    Binding(usize),
    /// An implicitly constructed struct.
    Struct(TypeId),
}

/// Marks a frame as "being resolved" for the lifetime of the guard.
///
/// Entering a frame that is already on this thread's stack closes a
/// cycle; the guard reports it instead of recursing until the stack
/// overflows.
pub(crate) struct ResolutionGuard {
    frame: Frame,
}

impl ResolutionGuard {
    pub(crate) fn enter(frame: Frame, key: &BindingKey) -> Result<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack.iter().position(|(entry, _)| *entry == frame) {
                let mut chain: Vec<BindingKey> =
                    stack[start..].iter().map(|(_, key)| key.clone()).collect();
                chain.push(key.clone());
                warn!(cycle = ?chain, "Circular dependency detected");
                return Err(WiringError::CircularDependency(CircularDependencyError { chain }));
            }
            stack.push((frame, key.clone()));
            Ok(Self { frame })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack.iter().rposition(|(entry, _)| *entry == self.frame) {
                stack.truncate(position);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    struct Config {
        url: String,
    }

    struct Database {
        url: String,
    }

    #[derive(Debug)]
    struct ConnectError;

    impl fmt::Display for ConnectError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("connection refused")
        }
    }

    impl std::error::Error for ConnectError {}

    #[test]
    fn signature_display() {
        let binding = Binding::new(
            "",
            |c: Config| -> std::result::Result<Arc<Database>, ConnectError> {
                Ok(Arc::new(Database { url: c.url }))
            },
            Lifetime::Transient,
        )
        .unwrap();

        assert_eq!(
            binding.signature().to_string(),
            "fn(Config) -> (Arc<Database>, ConnectError)"
        );
        assert_eq!(binding.produced(), TypeKey::of::<Arc<Database>>());
    }

    #[test]
    fn self_referential_factory_rejected() {
        let err = Binding::new("", |c: Arc<Database>| c, Lifetime::Transient).unwrap_err();
        match err {
            WiringError::CircularReference { key } => {
                assert_eq!(key, TypeKey::of::<Arc<Database>>());
            }
            other => panic!("Expected CircularReference, got: {other:?}"),
        }
    }

    #[test]
    fn dyn_without_body_is_not_a_factory() {
        let factory = DynFn::new().returns::<Config>();
        assert!(matches!(
            Binding::from_dyn("", factory, Lifetime::Transient),
            Err(WiringError::NotAFactory)
        ));
    }

    #[test]
    fn dyn_signature_shapes() {
        let body = |_: Vec<AnyValue>| Vec::new();

        let no_returns = DynFn::new().body(body);
        let three = DynFn::new()
            .returns::<Config>()
            .returns::<u8>()
            .returns::<u8>()
            .body(body);
        let second_not_error = DynFn::new().returns::<Config>().returns::<u8>().body(body);
        let ok = DynFn::new()
            .returns::<Config>()
            .returns_error::<ConnectError>()
            .body(body);

        for factory in [no_returns, three, second_not_error] {
            assert!(matches!(
                Binding::from_dyn("", factory, Lifetime::Transient),
                Err(WiringError::InvalidFactorySignature(_))
            ));
        }
        assert!(Binding::from_dyn("", ok, Lifetime::Transient).is_ok());
    }

    #[test]
    fn dyn_self_reference_rejected() {
        let factory = DynFn::new()
            .param::<Config>()
            .returns::<Config>()
            .body(|args| vec![DynReturn::Value(args[0].clone())]);
        assert!(matches!(
            Binding::from_dyn("", factory, Lifetime::Transient),
            Err(WiringError::CircularReference { .. })
        ));
    }

    #[test]
    fn shared_binding_caches() {
        let calls = Arc::new(AtomicU32::new(0));
        let binding = Binding::new(
            "",
            {
                let calls = calls.clone();
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Arc::new(Config { url: "db".into() })
                }
            },
            Lifetime::Shared,
        )
        .unwrap();

        let registry = Registry::new();
        let a = binding.make(&registry).unwrap();
        let b = binding.make(&registry).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(binding.is_built());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_binding_rebuilds() {
        let calls = Arc::new(AtomicU32::new(0));
        let binding = Binding::new(
            "",
            {
                let calls = calls.clone();
                move || Arc::new(calls.fetch_add(1, Ordering::SeqCst))
            },
            Lifetime::Transient,
        )
        .unwrap();

        let registry = Registry::new();
        binding.make(&registry).unwrap();
        binding.make(&registry).unwrap();

        assert!(!binding.is_built());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_shared_build_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let binding = Binding::new(
            "",
            {
                let calls = calls.clone();
                move || -> std::result::Result<Config, ConnectError> {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ConnectError)
                    } else {
                        Ok(Config { url: "db".into() })
                    }
                }
            },
            Lifetime::Shared,
        )
        .unwrap();

        let registry = Registry::new();
        let err = binding.make(&registry).unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
        assert!(!binding.is_built());

        assert!(binding.make(&registry).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_parameter_names_consumer() {
        let binding = Binding::new(
            "",
            |c: Config| Arc::new(Database { url: c.url }),
            Lifetime::Transient,
        )
        .unwrap();

        match binding.make(&Registry::new()).unwrap_err() {
            WiringError::ValueNotFound(err) => {
                assert_eq!(err.requested, BindingKey::of::<Config>());
                assert!(err.required_by.unwrap().contains("Database"));
            }
            other => panic!("Expected ValueNotFound, got: {other:?}"),
        }
    }
}
