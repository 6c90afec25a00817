//! Function-parameter injection.
//!
//! [`Injected`] is implemented for every `Fn(P1, ..., Pn) -> R` with up to
//! eight parameters whose types can be resolved from a [`Registry`]. Each
//! parameter is resolved with [`Registry::get`] in declaration order; the
//! first failure aborts the call and the values already resolved are
//! dropped.
//!
//! [`FactoryOutput`] describes the two return shapes a factory may have:
//! a bare `Arc<T>`, or `Result<T, E>` where `E` is an error.

use std::sync::Arc;

use crate::binding::ReturnSlot;
use crate::error::{BoxError, Result};
use crate::key::TypeKey;
use crate::registry::Registry;

/// A callable whose parameters are resolved from a [`Registry`].
///
/// `Args` is the tuple of parameter types; it only exists so that one
/// closure type can implement the trait for exactly one arity.
pub trait Injected<Args> {
    type Output;

    /// Declared parameter types, in order.
    fn parameters() -> Vec<TypeKey>;

    /// Resolves every parameter against `registry` and calls through.
    fn call_injected(&self, registry: &Registry) -> Result<Self::Output>;
}

macro_rules! impl_injected {
    ($($param:ident),*) => {
        impl<Func, Out, $($param,)*> Injected<($($param,)*)> for Func
        where
            Func: Fn($($param),*) -> Out,
            $($param: Clone + Send + Sync + 'static,)*
        {
            type Output = Out;

            fn parameters() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$param>()),*]
            }

            #[allow(non_snake_case, unused_variables)]
            fn call_injected(&self, registry: &Registry) -> Result<Out> {
                $(let $param = registry.get::<$param>()?;)*
                Ok((self)($($param),*))
            }
        }
    };
}

impl_injected!();
impl_injected!(P1);
impl_injected!(P1, P2);
impl_injected!(P1, P2, P3);
impl_injected!(P1, P2, P3, P4);
impl_injected!(P1, P2, P3, P4, P5);
impl_injected!(P1, P2, P3, P4, P5, P6);
impl_injected!(P1, P2, P3, P4, P5, P6, P7);
impl_injected!(P1, P2, P3, P4, P5, P6, P7, P8);

/// The return shape of a factory.
pub trait FactoryOutput: 'static {
    /// The produced value, stored under `TypeKey::of::<Value>()`.
    type Value: Clone + Send + Sync + 'static;

    /// Declared return slots, used for signature validation.
    fn returns() -> Vec<ReturnSlot>;

    fn into_value(self) -> std::result::Result<Self::Value, BoxError>;
}

/// Single-value form.
impl<T: ?Sized + Send + Sync + 'static> FactoryOutput for Arc<T> {
    type Value = Arc<T>;

    fn returns() -> Vec<ReturnSlot> {
        vec![ReturnSlot::value::<Arc<T>>()]
    }

    fn into_value(self) -> std::result::Result<Arc<T>, BoxError> {
        Ok(self)
    }
}

/// Value-and-error form.
impl<T, E> FactoryOutput for std::result::Result<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Into<BoxError> + 'static,
{
    type Value = T;

    fn returns() -> Vec<ReturnSlot> {
        vec![ReturnSlot::value::<T>(), ReturnSlot::error::<E>()]
    }

    fn into_value(self) -> std::result::Result<T, BoxError> {
        self.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Port(u16);

    #[derive(Clone)]
    struct Host(&'static str);

    fn parameters_of<Args, F: Injected<Args>>(_: &F) -> Vec<TypeKey> {
        F::parameters()
    }

    #[test]
    fn parameters_in_declaration_order() {
        let f = |_: Host, _: Port| ();
        assert_eq!(
            parameters_of(&f),
            vec![TypeKey::of::<Host>(), TypeKey::of::<Port>()]
        );
        assert!(parameters_of(&|| 1).is_empty());
    }

    #[test]
    fn call_resolves_each_parameter() {
        let registry = Registry::new();
        registry.bind(Host("localhost")).unwrap();
        registry.bind(Port(8080)).unwrap();

        let address = (|h: Host, p: Port| format!("{}:{}", h.0, p.0))
            .call_injected(&registry)
            .unwrap();
        assert_eq!(address, "localhost:8080");
    }

    #[test]
    fn first_missing_parameter_aborts() {
        let registry = Registry::new();
        registry.bind(Port(1)).unwrap();

        let err = (|_: Host, _: Port| ()).call_injected(&registry).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn return_shapes() {
        assert_eq!(<Arc<Port> as FactoryOutput>::returns().len(), 1);
        let slots = <std::result::Result<Port, std::io::Error> as FactoryOutput>::returns();
        assert_eq!(slots.len(), 2);
        assert!(slots[1].is_error());
    }
}
