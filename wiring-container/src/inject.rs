//! Struct-field injection.
//!
//! An [`Injectable`] struct exposes a static descriptor table (one
//! [`InjectDescriptor`] per field, in declaration order) and visits its
//! fields through a [`FieldInjector`]. `#[derive(Inject)]` writes both;
//! hand-written impls can build the table from tags with
//! [`InjectDescriptor::from_tag`].
//!
//! Injection is fail-fast: the first required field that cannot be
//! resolved aborts the call and the fields after it are left untouched.
//!
//! Derived non-generic structs are also submitted to a link-time table of
//! [`StructKind`]s, which is how the registry recognises a struct it may
//! construct implicitly.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::trace;
use wiring_support::tag::parse_tag;

use crate::binding::AnyValue;
use crate::error::{Result, WiringError};
use crate::registry::Registry;

/// How one struct field takes part in injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectDescriptor {
    /// Field name, for diagnostics.
    pub field: &'static str,
    /// Lookup name; `""` is the default slot.
    pub name: &'static str,
    /// A resolution failure leaves the field at its default.
    pub optional: bool,
    /// `false` means the field is not an injection target at all.
    pub requested: bool,
    /// `false` for fields the registry cannot assign, such as references.
    pub settable: bool,
}

impl InjectDescriptor {
    /// A field without injection metadata.
    pub const fn skipped(field: &'static str) -> Self {
        Self {
            field,
            name: "",
            optional: false,
            requested: false,
            settable: true,
        }
    }

    /// Builds a descriptor from a field's tag; `None` means no tag.
    ///
    /// ```
    /// use wiring_container::inject::InjectDescriptor;
    ///
    /// let db = InjectDescriptor::from_tag("db", Some("primary,omitempty"));
    /// assert_eq!(db.name, "primary");
    /// assert!(db.optional && db.requested);
    ///
    /// assert!(!InjectDescriptor::from_tag("cache", None).requested);
    /// ```
    pub fn from_tag(field: &'static str, tag: Option<&'static str>) -> Self {
        match tag {
            None => Self::skipped(field),
            Some(tag) => {
                let parsed = parse_tag(tag);
                Self {
                    field,
                    name: parsed.name,
                    optional: parsed.omitempty,
                    requested: true,
                    settable: true,
                }
            }
        }
    }

    /// Marks the field as not assignable by the registry.
    pub const fn unsettable(self) -> Self {
        Self { settable: false, ..self }
    }
}

/// A struct whose fields can be filled from a [`Registry`].
///
/// `Default` supplies the zero-valued instance used for implicit
/// construction.
pub trait Injectable: Default + Send + Sync + 'static {
    /// One descriptor per field, in declaration order.
    fn descriptors() -> &'static [InjectDescriptor];

    /// Visits every field in declaration order.
    fn inject_fields(&mut self, fields: &mut FieldInjector<'_>) -> Result<()>;
}

/// Applies descriptors to fields on behalf of an [`Injectable`] impl.
pub struct FieldInjector<'r> {
    registry: &'r Registry,
    owner: &'static str,
    descriptors: &'static [InjectDescriptor],
}

impl<'r> FieldInjector<'r> {
    pub(crate) fn new<T: Injectable>(registry: &'r Registry) -> Self {
        Self {
            registry,
            owner: type_name::<T>(),
            descriptors: T::descriptors(),
        }
    }

    /// Resolves field `index` and assigns it to `slot`.
    pub fn inject<V>(&mut self, index: usize, slot: &mut V) -> Result<()>
    where
        V: Clone + Send + Sync + 'static,
    {
        let Some(descriptor) = self.requested(index) else {
            return Ok(());
        };
        if !descriptor.settable {
            return self.reject(descriptor);
        }

        match self.registry.named_get::<V>(descriptor.name) {
            Ok(value) => {
                trace!(owner = self.owner, field = descriptor.field, "Injected field");
                *slot = value;
                Ok(())
            }
            Err(error) if descriptor.optional => {
                trace!(owner = self.owner, field = descriptor.field, %error, "Skipped optional field");
                Ok(())
            }
            Err(WiringError::ValueNotFound(mut missing)) => {
                if missing.required_by.is_none() {
                    missing.required_by = Some(format!("{}.{}", self.owner, descriptor.field));
                }
                Err(WiringError::ValueNotFound(missing))
            }
            Err(error) => Err(error),
        }
    }

    /// Handles a requested field that cannot be assigned.
    pub fn unsettable(&mut self, index: usize) -> Result<()> {
        match self.requested(index) {
            Some(descriptor) => self.reject(descriptor),
            None => Ok(()),
        }
    }

    /// Passes over a field without metadata.
    pub fn skip(&mut self, index: usize) {
        if let Some(descriptor) = self.descriptors.get(index) {
            trace!(owner = self.owner, field = descriptor.field, "Field not requested");
        }
    }

    fn requested(&self, index: usize) -> Option<InjectDescriptor> {
        self.descriptors
            .get(index)
            .copied()
            .filter(|descriptor| descriptor.requested)
    }

    fn reject(&self, descriptor: InjectDescriptor) -> Result<()> {
        if descriptor.optional {
            trace!(owner = self.owner, field = descriptor.field, "Skipped unsettable optional field");
            return Ok(());
        }
        Err(WiringError::FieldNotSettable {
            owner: self.owner,
            field: descriptor.field,
        })
    }
}

/// Link-time record of an injectable struct type.
pub struct StructKind {
    type_id: fn() -> TypeId,
    type_name: fn() -> &'static str,
    build: fn(&Registry) -> Result<AnyValue>,
    inject: fn(&mut dyn Any, &Registry) -> Result<()>,
}

impl StructKind {
    pub const fn of<T: Injectable>() -> Self {
        Self {
            type_id: TypeId::of::<T>,
            type_name: type_name::<T>,
            build: build_erased::<T>,
            inject: inject_erased::<T>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        (self.type_name)()
    }

    /// Default-constructs the struct and injects its fields.
    pub(crate) fn build(&self, registry: &Registry) -> Result<AnyValue> {
        (self.build)(registry)
    }

    pub(crate) fn inject(&self, target: &mut dyn Any, registry: &Registry) -> Result<()> {
        (self.inject)(target, registry)
    }
}

inventory::collect!(StructKind);

static KINDS: Lazy<HashMap<TypeId, &'static StructKind>> = Lazy::new(|| {
    inventory::iter::<StructKind>
        .into_iter()
        .map(|kind| ((kind.type_id)(), kind))
        .collect()
});

/// Looks up a submitted injectable struct by type.
pub(crate) fn struct_kind(type_id: TypeId) -> Option<&'static StructKind> {
    KINDS.get(&type_id).copied()
}

fn build_erased<T: Injectable>(registry: &Registry) -> Result<AnyValue> {
    Ok(Arc::new(registry.construct::<T>()?))
}

fn inject_erased<T: Injectable>(target: &mut dyn Any, registry: &Registry) -> Result<()> {
    match target.downcast_mut::<T>() {
        Some(target) => registry.resolve(target),
        None => Err(WiringError::NonStructResolveTarget {
            target: type_name::<T>().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::BindingKey;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Dsn(String);

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Timeout(u64);

    #[derive(Debug, Default)]
    struct Repository {
        primary: Dsn,
        replica: Dsn,
        timeout: Timeout,
        label: &'static str,
        untouched: u32,
    }

    static REPOSITORY_FIELDS: Lazy<Vec<InjectDescriptor>> = Lazy::new(|| {
        vec![
            InjectDescriptor::from_tag("primary", Some("primary")),
            InjectDescriptor::from_tag("replica", Some("replica,omitempty")),
            InjectDescriptor::from_tag("timeout", Some("")),
            InjectDescriptor::from_tag("label", Some(",omitempty")).unsettable(),
            InjectDescriptor::from_tag("untouched", None),
        ]
    });

    impl Injectable for Repository {
        fn descriptors() -> &'static [InjectDescriptor] {
            &REPOSITORY_FIELDS
        }

        fn inject_fields(&mut self, fields: &mut FieldInjector<'_>) -> Result<()> {
            fields.inject(0, &mut self.primary)?;
            fields.inject(1, &mut self.replica)?;
            fields.inject(2, &mut self.timeout)?;
            fields.unsettable(3)?;
            fields.skip(4);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Strict {
        label: &'static str,
    }

    static STRICT_FIELDS: Lazy<Vec<InjectDescriptor>> =
        Lazy::new(|| vec![InjectDescriptor::from_tag("label", Some("")).unsettable()]);

    impl Injectable for Strict {
        fn descriptors() -> &'static [InjectDescriptor] {
            &STRICT_FIELDS
        }

        fn inject_fields(&mut self, fields: &mut FieldInjector<'_>) -> Result<()> {
            fields.unsettable(0)
        }
    }

    #[test]
    fn injects_named_and_default_fields() {
        let registry = Registry::new();
        registry.named_bind("primary", Dsn("pg://primary".into())).unwrap();
        registry.named_bind("replica", Dsn("pg://replica".into())).unwrap();
        registry.bind(Timeout(30)).unwrap();

        let mut repo = Repository { untouched: 7, ..Default::default() };
        registry.resolve(&mut repo).unwrap();

        assert_eq!(repo.primary, Dsn("pg://primary".into()));
        assert_eq!(repo.replica, Dsn("pg://replica".into()));
        assert_eq!(repo.timeout, Timeout(30));
        assert_eq!(repo.label, "");
        assert_eq!(repo.untouched, 7);
    }

    #[test]
    fn optional_field_left_at_default() {
        let registry = Registry::new();
        registry.named_bind("primary", Dsn("pg://primary".into())).unwrap();
        registry.bind(Timeout(5)).unwrap();

        let repo = registry.construct::<Repository>().unwrap();
        assert_eq!(repo.replica, Dsn::default());
        assert_eq!(repo.timeout, Timeout(5));
    }

    #[test]
    fn required_field_failure_stops_injection() {
        let registry = Registry::new();
        registry.named_bind("replica", Dsn("pg://replica".into())).unwrap();
        registry.bind(Timeout(30)).unwrap();

        let mut repo = Repository::default();
        match registry.resolve(&mut repo).unwrap_err() {
            WiringError::ValueNotFound(err) => {
                assert_eq!(err.requested, BindingKey::named::<Dsn>("primary"));
                assert!(err.required_by.unwrap().ends_with("Repository.primary"));
            }
            other => panic!("Expected ValueNotFound, got: {other:?}"),
        }
        // fields after the failing one are untouched
        assert_eq!(repo.replica, Dsn::default());
        assert_eq!(repo.timeout, Timeout::default());
    }

    #[test]
    fn named_field_does_not_fall_back_to_default_slot() {
        let registry = Registry::new();
        registry.bind(Dsn("pg://default".into())).unwrap();
        registry.bind(Timeout(1)).unwrap();

        let err = registry.construct::<Repository>().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn required_unsettable_field_fails() {
        let registry = Registry::new();
        match registry.construct::<Strict>() {
            Err(WiringError::FieldNotSettable { field, .. }) => assert_eq!(field, "label"),
            other => panic!("Expected FieldNotSettable, got: {:?}", other.map(|s| s.label)),
        }
    }

    #[test]
    fn resolve_any_rejects_unknown_types() {
        let registry = Registry::new();
        let mut target = 42u32;
        match registry.resolve_any(&mut target) {
            Err(WiringError::NonStructResolveTarget { target }) => {
                assert!(target.starts_with("TypeId"), "unexpected target: {target}");
            }
            other => panic!("Expected NonStructResolveTarget, got: {other:?}"),
        }
    }
}
