//! Binding lifetimes.
//!
//! - [`Lifetime::Transient`]: the factory runs on every resolve
//! - [`Lifetime::Shared`]: the first successful result is cached on the
//!   binding and returned thereafter
use std::fmt;

/// Caching policy of a factory binding.
///
/// # Examples
/// ```
/// use wiring_container::lifetime::Lifetime;
///
/// assert!(Lifetime::Shared.is_cached());
/// assert!(!Lifetime::Transient.is_cached());
/// assert_eq!(Lifetime::from(true), Lifetime::Shared);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
    /// New instance on every resolve call.
    ///
    /// # When to use
    /// - Lightweight stateless services
    /// - Objects with mutable state that shouldn't be shared
    #[default]
    Transient,

    /// One instance per binding, created on first resolve.
    ///
    /// A binding inherited by forked registries keeps a single cache, so
    /// every descendant observes the same instance.
    ///
    /// # When to use
    /// - Connection pools
    /// - Configuration objects
    /// - Shared caches
    Shared,
}

impl Lifetime {
    /// Returns `true` if this lifetime caches instances.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, Lifetime::Shared)
    }
}

impl From<bool> for Lifetime {
    fn from(shared: bool) -> Self {
        if shared {
            Lifetime::Shared
        } else {
            Lifetime::Transient
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Transient => write!(f, "Transient"),
            Lifetime::Shared => write!(f, "Shared"),
        }
    }
}
