//! `#[derive(Inject)]` and struct-field injection through a registry.

use std::sync::Arc;

use wiring::prelude::*;
use wiring::{InjectDescriptor, StructKind};

#[derive(Clone, Debug, Default, PartialEq)]
struct Db(&'static str);

#[derive(Clone, Debug, Default, PartialEq)]
struct Cache(&'static str);

#[derive(Clone, Debug, Default, PartialEq)]
struct Clock(u64);

#[derive(Default, Inject)]
struct Store {
    #[ioc = "primary"]
    primary: Db,
    #[ioc("cache,omitempty")]
    cache: Cache,
    #[ioc]
    clock: Clock,
    hits: u64,
}

#[derive(Clone, Debug, Default, Inject)]
struct Handler {
    #[ioc]
    db: Db,
    #[ioc(",omitempty")]
    clock: Clock,
}

#[derive(Default, Inject)]
struct Labelled {
    #[ioc]
    label: &'static str,
}

#[derive(Default, Inject)]
struct OptionalLabel {
    #[ioc = ",omitempty"]
    label: &'static str,
    #[ioc]
    db: Db,
}

#[derive(Default, Inject)]
struct Wrapper<T: Clone + Default + Send + Sync + 'static> {
    #[ioc]
    inner: T,
}

#[derive(Default, Inject)]
struct MaybeCache {
    #[ioc(",omitempty")]
    cache: Option<Arc<Cache>>,
}

#[test]
fn option_field_is_keyed_on_the_option_type() {
    let registry = Registry::new();
    registry.bind(Arc::new(Cache("redis"))).unwrap();
    assert!(registry.construct::<MaybeCache>().unwrap().cache.is_none());

    registry.bind(Some(Arc::new(Cache("memcached")))).unwrap();
    let built = registry.construct::<MaybeCache>().unwrap();
    assert_eq!(built.cache.as_deref(), Some(&Cache("memcached")));
}

#[test]
fn descriptor_table_follows_declaration_order() {
    let descriptors = <Store as Injectable>::descriptors();
    assert_eq!(descriptors.len(), 4);

    assert_eq!(
        descriptors[0],
        InjectDescriptor {
            field: "primary",
            name: "primary",
            optional: false,
            requested: true,
            settable: true,
        }
    );
    assert!(descriptors[1].optional);
    assert_eq!(descriptors[1].name, "cache");
    assert_eq!(descriptors[2].name, "");
    assert!(!descriptors[3].requested);

    assert!(!<Labelled as Injectable>::descriptors()[0].settable);
}

#[test]
fn fills_requested_fields_only() {
    let registry = Registry::new();
    registry.named_bind("primary", Db("pg://primary")).unwrap();
    registry.named_bind("cache", Cache("redis")).unwrap();
    registry.bind(Clock(42)).unwrap();

    let mut store = Store { hits: 9, ..Default::default() };
    registry.resolve(&mut store).unwrap();

    assert_eq!(store.primary, Db("pg://primary"));
    assert_eq!(store.cache, Cache("redis"));
    assert_eq!(store.clock, Clock(42));
    assert_eq!(store.hits, 9);
}

#[test]
fn named_field_ignores_unnamed_binding() {
    let registry = Registry::new();
    registry.bind(Db("pg://default")).unwrap();
    registry.bind(Clock(1)).unwrap();

    let mut store = Store::default();
    match registry.resolve(&mut store).unwrap_err() {
        WiringError::ValueNotFound(err) => {
            assert_eq!(err.requested, BindingKey::named::<Db>("primary"));
            assert!(err.required_by.unwrap().ends_with("Store.primary"));
        }
        other => panic!("Expected ValueNotFound, got: {other:?}"),
    }
    // fail-fast: nothing after the failing field was touched
    assert_eq!(store.clock, Clock::default());
}

#[test]
fn omitempty_field_left_at_default() {
    let registry = Registry::new();
    registry.named_bind("primary", Db("pg://primary")).unwrap();
    registry.bind(Clock(7)).unwrap();

    let store = registry.construct::<Store>().unwrap();
    assert_eq!(store.cache, Cache::default());
    assert_eq!(store.clock, Clock(7));
}

#[test]
fn reference_field_is_not_settable() {
    let registry = Registry::new();
    match registry.construct::<Labelled>() {
        Err(WiringError::FieldNotSettable { field, owner }) => {
            assert_eq!(field, "label");
            assert!(owner.ends_with("Labelled"));
        }
        Err(other) => panic!("Expected FieldNotSettable, got: {other:?}"),
        Ok(_) => panic!("Expected FieldNotSettable"),
    }

    registry.bind(Db("pg://a")).unwrap();
    let optional = registry.construct::<OptionalLabel>().unwrap();
    assert_eq!(optional.label, "");
    assert_eq!(optional.db, Db("pg://a"));
}

#[test]
fn generic_structs_derive() {
    let registry = Registry::new();
    registry.bind(Clock(3)).unwrap();
    let wrapper = registry.construct::<Wrapper<Clock>>().unwrap();
    assert_eq!(wrapper.inner, Clock(3));
}

#[test]
fn resolve_any_finds_derived_structs() {
    let registry = Registry::new();
    registry.bind(Db("pg://any")).unwrap();

    let mut handler = Handler::default();
    registry.resolve_any(&mut handler).unwrap();
    assert_eq!(handler.db, Db("pg://any"));

    let mut not_a_struct = 5u8;
    assert!(matches!(
        registry.resolve_any(&mut not_a_struct),
        Err(WiringError::NonStructResolveTarget { .. })
    ));
}

#[test]
fn struct_kind_records_type() {
    let kind = StructKind::of::<Handler>();
    assert!(kind.type_name().ends_with("Handler"));
}

#[test]
fn implicit_construction_of_unbound_struct() {
    let registry = Registry::new();
    registry.bind(Db("pg://implicit")).unwrap();
    registry.bind(Clock(11)).unwrap();

    let handler: Handler = registry.get().unwrap();
    assert_eq!(handler.db, Db("pg://implicit"));
    assert_eq!(handler.clock, Clock(11));
}

#[test]
fn implicit_construction_failure_surfaces() {
    let registry = Registry::new();
    match registry.get::<Handler>().unwrap_err() {
        WiringError::ValueNotFound(err) => {
            assert_eq!(err.requested, BindingKey::of::<Db>());
        }
        other => panic!("Expected ValueNotFound, got: {other:?}"),
    }
}

#[test]
fn implicit_construction_can_be_disabled() {
    let registry = Registry::builder().implicit_construction(false).build();
    registry.bind(Db("pg://a")).unwrap();

    match registry.get::<Handler>().unwrap_err() {
        WiringError::ValueNotFound(err) => {
            assert_eq!(err.requested, BindingKey::of::<Handler>());
        }
        other => panic!("Expected ValueNotFound, got: {other:?}"),
    }
}

#[test]
fn implicit_construction_uses_requesting_registry() {
    let parent = Arc::new(Registry::new());
    parent.bind(Db("pg://parent")).unwrap();

    let child = parent.fork();
    child.bind(Db("pg://child")).unwrap();

    assert_eq!(child.get::<Handler>().unwrap().db, Db("pg://child"));
    assert_eq!(parent.get::<Handler>().unwrap().db, Db("pg://parent"));
}

#[test]
fn bound_struct_wins_over_implicit_construction() {
    let registry = Registry::new();
    registry
        .bind(Handler {
            db: Db("pg://bound"),
            clock: Clock(0),
        })
        .unwrap();

    assert_eq!(registry.get::<Handler>().unwrap().db, Db("pg://bound"));
}

#[derive(Clone, Default, Inject)]
struct Node {
    #[ioc]
    link: Option<Arc<Link>>,
}

struct Link;

#[test]
fn cycle_through_implicit_construction_is_reported() {
    let registry = Registry::new();
    registry
        .factory(|_: Node| -> Result<Option<Arc<Link>>> { Ok(Some(Arc::new(Link))) })
        .unwrap();

    assert!(matches!(
        registry.get::<Node>(),
        Err(WiringError::CircularDependency(_))
    ));
}
