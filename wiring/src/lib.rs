//! # Wiring — a scoped, type-indexed registry for Rust
//!
//! Bind values and factories by type (optionally qualified by a name),
//! resolve them on demand, inject struct fields and function parameters,
//! and fork child registries that shadow their parents.
//!
//! ```rust
//! use std::sync::Arc;
//! use wiring::prelude::*;
//!
//! #[derive(Clone, Default)]
//! struct Dsn(&'static str);
//!
//! #[derive(Default)]
//! struct Database {
//!     dsn: Dsn,
//! }
//!
//! #[derive(Default, Inject)]
//! struct UserRepository {
//!     #[ioc = "primary"]
//!     dsn: Dsn,
//!     #[ioc]
//!     db: Arc<Database>,
//! }
//!
//! let registry = Registry::new();
//! registry.named_bind("primary", Dsn("pg://primary"))?;
//! registry.shared_factory(|| Arc::new(Database { dsn: Dsn("pg://primary") }))?;
//!
//! let repo: UserRepository = registry.construct()?;
//! assert_eq!(repo.db.dsn.0, repo.dsn.0);
//! # Ok::<(), WiringError>(())
//! ```

pub use wiring_container::*;
pub use wiring_macros::Inject;
pub use wiring_support as support;

pub mod prelude {
    pub use wiring_container::prelude::*;
    pub use wiring_macros::Inject;
}
