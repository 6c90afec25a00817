//! Modules: groups of related registrations.
//!
//! ```rust
//! use std::sync::Arc;
//! use wiring_container::prelude::*;
//!
//! struct Pool;
//!
//! struct StorageModule;
//!
//! impl Module for StorageModule {
//!     fn register(&self, registry: &Registry) -> Result<()> {
//!         registry.shared_factory(|| Arc::new(Pool))?;
//!         Ok(())
//!     }
//! }
//!
//! let registry = Registry::new();
//! registry.install(&StorageModule)?;
//! let _pool: Arc<Pool> = registry.get()?;
//! # Ok::<(), WiringError>(())
//! ```

use crate::error::Result;
use crate::registry::Registry;

/// A set of registrations applied together with [`Registry::install`].
///
/// Split registrations by concern rather than keeping one long block.
pub trait Module: Send + Sync {
    fn register(&self, registry: &Registry) -> Result<()>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
