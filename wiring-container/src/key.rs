//! Type identity tokens.
//!
//! [`TypeKey`] identifies a Rust type at runtime without reflection: it
//! pairs the [`TypeId`] with the type name used in diagnostics.
//! [`BindingKey`] adds the registration name, giving the `(type, name)`
//! partition every registry slot lives in.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use wiring_support::rendering::shorten_type_name;

/// Identifies a type in the registry.
///
/// # Examples
/// ```
/// use wiring_container::key::TypeKey;
///
/// let key = TypeKey::of::<String>();
/// assert_eq!(key.type_name(), "alloc::string::String");
/// assert_eq!(key, TypeKey::of::<String>());
/// assert_ne!(key, TypeKey::of::<&'static str>());
/// ```
#[derive(Clone, Copy)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeKey {
    /// Creates a key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Creates a key from a raw [`TypeId`] and type name.
    ///
    /// Prefer [`TypeKey::of`] when possible; this is for tables built
    /// from function pointers, such as the injectable struct registry.
    #[inline]
    pub fn from_raw(type_id: TypeId, type_name: &'static str) -> Self {
        Self { type_id, type_name }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name with module paths stripped, e.g. `Arc<dyn Logger>`.
    pub fn short_name(&self) -> String {
        shorten_type_name(self.type_name)
    }

    /// Returns `true` for trait objects (`dyn Trait`).
    pub fn is_trait_object(&self) -> bool {
        self.type_name.starts_with("dyn ")
    }

    /// Returns `true` for builtin scalar and string types.
    ///
    /// Binding these directly makes unrelated registrations collide, so the
    /// registry logs a hint recommending a wrapper type.
    pub fn is_builtin(&self) -> bool {
        const BUILTINS: &[&str] = &[
            "bool", "char", "u8", "u16", "u32", "u64", "u128", "usize", "i8", "i16", "i32",
            "i64", "i128", "isize", "f32", "f64", "&str", "alloc::string::String",
        ];
        BUILTINS.contains(&self.type_name)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.type_name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// A `(type, name)` registry slot. The empty name is the default slot.
///
/// ```
/// use wiring_container::key::BindingKey;
///
/// let primary = BindingKey::named::<String>("primary");
/// let default = BindingKey::of::<String>();
/// assert_ne!(primary, default);
/// assert!(default.is_default());
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
    ty: TypeKey,
    name: String,
}

impl BindingKey {
    pub fn new(ty: TypeKey, name: impl Into<String>) -> Self {
        Self { ty, name: name.into() }
    }

    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(TypeKey::of::<T>(), "")
    }

    #[inline]
    pub fn named<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self::new(TypeKey::of::<T>(), name)
    }

    #[inline]
    pub fn ty(&self) -> TypeKey {
        self.ty
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Debug for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "BindingKey({})", self.ty.type_name)
        } else {
            write!(f, "BindingKey({}, name={:?})", self.ty.type_name, self.name)
        }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.ty.type_name)
        } else {
            write!(f, "{} (name={:?})", self.ty.type_name, self.name)
        }
    }
}

/// A pointer-like wrapper whose pointee may be a trait object.
pub trait InterfacePtr {
    type Pointee: ?Sized + 'static;
}

impl<T: ?Sized + 'static> InterfacePtr for &T {
    type Pointee = T;
}

impl<T: ?Sized + 'static> InterfacePtr for &mut T {
    type Pointee = T;
}

impl<T: ?Sized + 'static> InterfacePtr for *const T {
    type Pointee = T;
}

impl<T: ?Sized + 'static> InterfacePtr for *mut T {
    type Pointee = T;
}

impl<T: ?Sized + 'static> InterfacePtr for Box<T> {
    type Pointee = T;
}

impl<T: ?Sized + 'static> InterfacePtr for Arc<T> {
    type Pointee = T;
}

impl<T: ?Sized + 'static> InterfacePtr for Rc<T> {
    type Pointee = T;
}

/// Recovers the interface behind a pointer type.
///
/// ```
/// use std::sync::Arc;
/// use wiring_container::key::{TypeKey, interface_of};
///
/// trait Logger {}
///
/// assert_eq!(interface_of::<Arc<dyn Logger>>(), TypeKey::of::<dyn Logger>());
/// ```
///
/// Exactly one pointer level is unwrapped. `Arc<Box<dyn T>>` and
/// `&&dyn T` are rejected: a registry binds `Arc<dyn T>`, so the pointee
/// of any other nesting is never an interface key it can hold.
///
/// # Panics
/// If the pointee is not a trait object. This is a precondition
/// violation at the call site, not a recoverable condition.
#[track_caller]
pub fn interface_of<P: InterfacePtr + ?Sized>() -> TypeKey {
    let key = TypeKey::of::<P::Pointee>();
    if !key.is_trait_object() {
        panic!(
            "{} is not a pointer to an interface; expected e.g. Arc<dyn MyTrait>",
            type_name::<P>()
        );
    }
    key
}
