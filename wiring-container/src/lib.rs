//! Core registry implementation for Wiring.

pub mod binding;
pub mod context;
pub mod error;
pub mod graph;
pub mod inject;
pub mod injected;
pub mod key;
pub mod lifetime;
pub mod module;
pub mod registry;
mod store;

pub use binding::{AnyValue, Binding, DynBody, DynFn, DynReturn, ReturnSlot, Signature};
pub use context::{Context, Root};
pub use error::{BoxError, Result, WiringError};
pub use inject::{FieldInjector, InjectDescriptor, Injectable, StructKind};
pub use injected::{FactoryOutput, Injected};
pub use key::{BindingKey, InterfacePtr, TypeKey, interface_of};
pub use lifetime::Lifetime;
pub use module::Module;
pub use registry::{Produced, Registered, Registry, RegistryBuilder, Settings, prelude};

#[cfg(feature = "async")]
pub use context::task;

#[doc(hidden)]
pub mod __private {
    pub use inventory;
}
