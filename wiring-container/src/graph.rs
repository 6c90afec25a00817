//! Static validation of the dependency graph.
//!
//! Resolution already reports cycles as they happen; [`Registry::validate`]
//! finds them up front, together with parameters nothing can satisfy:
//! - every factory visible from the registry is a root
//! - an edge goes from a factory to each of its declared parameters
//! - a parameter is satisfied by a visible binding, by a binding declared
//!   assignable to it, or by an injectable struct the registry may build

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};
use wiring_support::rendering::suggest_similar;

use crate::error::{CircularDependencyError, NotFoundError, Result, WiringError};
use crate::inject::struct_kind;
use crate::key::{BindingKey, TypeKey};
use crate::registry::Registry;
use crate::store::Slot;

/// One visible binding and what it needs.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub key: BindingKey,
    /// Empty for bound values.
    pub dependencies: Vec<BindingKey>,
}

/// Depth-first walk over the visible bindings.
///
/// `visiting` holds the keys on the current path; meeting one of them
/// again closes a cycle.
pub(crate) struct GraphValidator {
    order: Vec<BindingKey>,
    nodes: HashMap<BindingKey, Node>,
    assignable: HashSet<TypeKey>,
    implicit_construction: bool,
    visiting: HashSet<BindingKey>,
    validated: HashSet<BindingKey>,
    path: Vec<BindingKey>,
}

impl GraphValidator {
    pub fn new(
        nodes: Vec<Node>,
        assignable: HashSet<TypeKey>,
        implicit_construction: bool,
    ) -> Self {
        let order = nodes.iter().map(|node| node.key.clone()).collect();
        Self {
            order,
            nodes: nodes.into_iter().map(|node| (node.key.clone(), node)).collect(),
            assignable,
            implicit_construction,
            visiting: HashSet::new(),
            validated: HashSet::new(),
            path: Vec::new(),
        }
    }

    /// Collects the bindings visible from `registry`; nearer registries
    /// shadow their ancestors.
    pub fn for_registry(registry: &Registry) -> Self {
        let mut nodes: Vec<Node> = Vec::new();
        let mut seen: HashSet<BindingKey> = HashSet::new();
        let mut assignable = HashSet::new();

        for owner in registry.ancestry() {
            let store = owner.store();
            for entry in store.entries() {
                if entry.key.is_default() {
                    assignable.extend(entry.casts.iter().map(|cast| cast.target));
                }
                if !seen.insert(entry.key.clone()) {
                    continue;
                }
                let dependencies = match &entry.slot {
                    Slot::Value(_) => Vec::new(),
                    Slot::Factory(binding) => binding
                        .signature()
                        .params()
                        .iter()
                        .map(|ty| BindingKey::new(*ty, ""))
                        .collect(),
                };
                nodes.push(Node {
                    key: entry.key.clone(),
                    dependencies,
                });
            }
        }

        Self::new(nodes, assignable, registry.settings().implicit_construction)
    }

    #[instrument(skip(self), name = "graph_validation")]
    pub fn validate(&mut self) -> Result<()> {
        debug!(bindings = self.order.len(), "Starting dependency graph validation");

        for key in self.order.clone() {
            self.validate_key(&key)?;
        }

        debug!("Dependency graph validation passed");
        Ok(())
    }

    fn validate_key(&mut self, key: &BindingKey) -> Result<()> {
        if self.validated.contains(key) {
            return Ok(());
        }

        if self.visiting.contains(key) {
            let start = self.path.iter().position(|k| k == key).unwrap_or(0);
            let mut chain = self.path[start..].to_vec();
            chain.push(key.clone());
            warn!(cycle = ?chain, "Circular dependency detected");
            return Err(WiringError::CircularDependency(CircularDependencyError { chain }));
        }

        let Some(node) = self.nodes.get(key).cloned() else {
            if self.satisfied_indirectly(key) {
                self.validated.insert(key.clone());
                return Ok(());
            }
            return Err(self.missing(key));
        };

        self.visiting.insert(key.clone());
        self.path.push(key.clone());

        for dependency in &node.dependencies {
            self.validate_key(dependency)?;
        }

        self.path.pop();
        self.visiting.remove(key);
        self.validated.insert(key.clone());
        Ok(())
    }

    fn satisfied_indirectly(&self, key: &BindingKey) -> bool {
        let ty = key.ty();
        self.assignable.contains(&ty)
            || (self.implicit_construction && struct_kind(ty.type_id()).is_some())
    }

    fn missing(&self, key: &BindingKey) -> WiringError {
        let known: Vec<&str> = self.order.iter().map(|k| k.ty().type_name()).collect();
        let suggestions = suggest_similar(key.ty().type_name(), &known, 3);
        warn!(missing = %key, required_by = ?self.path.last(), "Unsatisfied dependency");

        WiringError::ValueNotFound(NotFoundError {
            requested: key.clone(),
            required_by: self.path.last().map(ToString::to_string),
            suggestions,
        })
    }
}

impl Registry {
    /// Checks every visible factory for cycles and unsatisfiable parameters
    /// without running anything.
    ///
    /// # Errors
    /// - [`WiringError::CircularDependency`] for a cycle
    /// - [`WiringError::ValueNotFound`] for a parameter nothing provides
    pub fn validate(&self) -> Result<()> {
        GraphValidator::for_registry(self).validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Database;
    struct UserRepo;
    struct UserService;

    #[derive(Clone)]
    struct Config;

    #[derive(Debug)]
    struct Never;

    impl std::fmt::Display for Never {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("never")
        }
    }

    impl std::error::Error for Never {}

    fn node<T: 'static>(dependencies: Vec<BindingKey>) -> Node {
        Node {
            key: BindingKey::of::<T>(),
            dependencies,
        }
    }

    #[test]
    fn valid_chain() {
        let mut validator = GraphValidator::new(
            vec![
                node::<Database>(vec![]),
                node::<UserRepo>(vec![BindingKey::of::<Database>()]),
                node::<UserService>(vec![BindingKey::of::<UserRepo>()]),
            ],
            HashSet::new(),
            true,
        );
        assert!(validator.validate().is_ok());
    }

    #[test]
    fn detects_cycle() {
        struct A;
        struct B;
        struct C;

        let mut validator = GraphValidator::new(
            vec![
                node::<A>(vec![BindingKey::of::<B>()]),
                node::<B>(vec![BindingKey::of::<C>()]),
                node::<C>(vec![BindingKey::of::<A>()]),
            ],
            HashSet::new(),
            true,
        );

        match validator.validate().unwrap_err() {
            WiringError::CircularDependency(err) => {
                assert_eq!(err.chain.len(), 4);
                assert_eq!(err.chain.first(), err.chain.last());
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
    }

    #[test]
    fn detects_missing_dependency() {
        let mut validator = GraphValidator::new(
            vec![node::<UserRepo>(vec![BindingKey::of::<Database>()])],
            HashSet::new(),
            true,
        );

        match validator.validate().unwrap_err() {
            WiringError::ValueNotFound(err) => {
                assert_eq!(err.requested, BindingKey::of::<Database>());
                assert!(err.required_by.unwrap().contains("UserRepo"));
            }
            other => panic!("Expected ValueNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn assignable_type_counts_as_provided() {
        let mut assignable = HashSet::new();
        assignable.insert(TypeKey::of::<Database>());

        let mut validator = GraphValidator::new(
            vec![node::<UserRepo>(vec![BindingKey::of::<Database>()])],
            assignable,
            true,
        );
        assert!(validator.validate().is_ok());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        struct A;
        struct B;
        struct C;
        struct D;

        let mut validator = GraphValidator::new(
            vec![
                node::<A>(vec![BindingKey::of::<B>(), BindingKey::of::<C>()]),
                node::<B>(vec![BindingKey::of::<D>()]),
                node::<C>(vec![BindingKey::of::<D>()]),
                node::<D>(vec![]),
            ],
            HashSet::new(),
            true,
        );
        assert!(validator.validate().is_ok());
    }

    #[test]
    fn registry_validation_sees_parent_bindings() {
        let parent = Arc::new(Registry::new());
        parent.bind(Config).unwrap();

        let child = parent.fork();
        child
            .factory(|_: Config| -> std::result::Result<Arc<Database>, Never> { Ok(Arc::new(Database)) })
            .unwrap();
        assert!(child.validate().is_ok());

        child
            .factory(|_: Arc<UserRepo>| -> std::result::Result<Arc<UserService>, Never> {
                Ok(Arc::new(UserService))
            })
            .unwrap();
        assert!(child.validate().unwrap_err().is_not_found());
        assert!(parent.validate().is_ok());
    }
}
