//! Error types for registry operations.
//!
//! Every failure is an ordinary returned value. Only the `must_*`
//! conveniences turn one into a panic, and they do so at the call site.

use std::fmt;

use wiring_support::rendering::render_chain;

use crate::key::{BindingKey, TypeKey};

/// A factory's own failure, as returned by the factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all Wiring operations.
#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    /// A dynamic factory descriptor carries no callable body.
    #[error("wiring: the factory must be a function")]
    NotAFactory,

    /// Wrong return arity, or the second return slot is not an error.
    #[error("{}", .0)]
    InvalidFactorySignature(InvalidSignatureError),

    /// A factory takes the type it produces as a parameter.
    #[error("wiring: factory for {key} depends on the type it returns")]
    CircularReference { key: TypeKey },

    /// Bindings depend on each other through a longer chain.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// No resolution strategy produced a value.
    #[error("{}", .0)]
    ValueNotFound(NotFoundError),

    /// A field was requested for injection but cannot be assigned.
    #[error("wiring: cannot inject field `{field}` of {owner}: the field is not settable")]
    FieldNotSettable {
        owner: &'static str,
        field: &'static str,
    },

    /// `resolve_any` was given something that is not an injectable struct.
    ///
    /// `target` is the type name when it is known. A `&mut dyn Any` only
    /// exposes its `TypeId`, so `resolve_any` reports that instead.
    #[error("wiring: resolve target {target} is not an injectable struct")]
    NonStructResolveTarget { target: String },

    /// `invoke_dyn` was given a descriptor without a callable body.
    #[error("wiring: invoke target is not a function")]
    NonFunctionInvokeTarget,

    /// Duplicate registration while overrides are disabled.
    #[error("{}", .0)]
    AlreadyRegistered(AlreadyRegisteredError),

    /// A stored value did not downcast to the requested type.
    #[error("wiring: value bound under {key} is not a {expected}")]
    TypeMismatch {
        key: BindingKey,
        expected: &'static str,
    },

    /// The factory itself failed.
    #[error(transparent)]
    Factory(BoxError),
}

impl WiringError {
    /// Returns `true` for the "value not found" sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WiringError::ValueNotFound(_))
    }

    /// Wraps a factory's error, unwrapping a nested [`WiringError`] so that
    /// resolution failures inside factories keep their kind.
    pub(crate) fn from_factory(error: BoxError) -> Self {
        match error.downcast::<WiringError>() {
            Ok(inner) => *inner,
            Err(error) => WiringError::Factory(error),
        }
    }
}

/// Error when a factory's declared shape is invalid.
#[derive(Debug)]
pub struct InvalidSignatureError {
    /// Rendered signature, e.g. `fn(Config) -> (Database, u32)`.
    pub signature: String,
    pub reason: &'static str,
}

impl fmt::Display for InvalidSignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wiring: factory signature {} is invalid: {}",
            self.signature, self.reason
        )?;
        write!(f, "\n  Hint: a factory returns a value, or a value and an error")
    }
}

/// Error when bindings form a cycle at resolution time.
///
/// Shows the full chain so you can see where the cycle closes.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// Example: `[A, B, C, A]`
    pub chain: Vec<BindingKey>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.chain.iter().map(|k| k.ty().short_name()).collect();
        write!(f, "wiring: circular dependency detected:\n  {}", render_chain(&names))?;
        write!(
            f,
            "\n  Hint: break the cycle by binding one of these values directly"
        )
    }
}

/// Error when nothing satisfies a request.
#[derive(Debug)]
pub struct NotFoundError {
    pub requested: BindingKey,
    /// The binding whose parameter or the struct whose field asked for it.
    pub required_by: Option<String>,
    /// Similar keys that ARE registered.
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wiring: value not found: {}", self.requested)?;

        if let Some(ref consumer) = self.required_by {
            write!(f, "\n  Required by: {consumer}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        Ok(())
    }
}

/// Error when a slot is already taken and overrides are disabled.
#[derive(Debug)]
pub struct AlreadyRegisteredError {
    pub key: BindingKey,
}

impl fmt::Display for AlreadyRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wiring: already registered: {}", self.key)?;
        write!(
            f,
            "\n  Hint: fork the registry to shadow a binding, or enable allow_override"
        )
    }
}

/// Convenient Result type for Wiring operations.
pub type Result<T> = std::result::Result<T, WiringError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn not_found_display() {
        let err = WiringError::ValueNotFound(NotFoundError {
            requested: BindingKey::named::<String>("primary"),
            required_by: Some("app::Service".into()),
            suggestions: vec!["alloc::string::String".into()],
        });

        let msg = err.to_string();
        assert!(msg.contains("value not found"));
        assert!(msg.contains("primary"));
        assert!(msg.contains("Required by: app::Service"));
        assert!(msg.contains("Did you mean"));
        assert!(err.is_not_found());
    }

    #[test]
    fn circular_dependency_display() {
        let err = WiringError::CircularDependency(CircularDependencyError {
            chain: vec![
                BindingKey::of::<String>(),
                BindingKey::of::<i32>(),
                BindingKey::of::<String>(),
            ],
        });

        let msg = err.to_string();
        assert!(msg.contains("circular"));
        assert!(msg.contains("String → i32 → String"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn factory_error_is_transparent() {
        let err = WiringError::from_factory(Box::new(Boom));
        assert_eq!(err.to_string(), "boom");
        match err {
            WiringError::Factory(inner) => assert!(inner.downcast_ref::<Boom>().is_some()),
            other => panic!("Expected Factory, got: {other:?}"),
        }
    }

    #[test]
    fn nested_wiring_error_keeps_kind() {
        let nested = WiringError::ValueNotFound(NotFoundError {
            requested: BindingKey::of::<u8>(),
            required_by: None,
            suggestions: vec![],
        });
        assert!(WiringError::from_factory(Box::new(nested)).is_not_found());
    }
}
