//! vipdev core
//!
//! Manages local development instances of VIP Go WordPress sites. Each
//! instance is a directory `dev-<slug>` holding a JSON descriptor and the
//! `.lando.yml` rendered from it.
//!
//! # Architecture
//!
//! ```text
//! selectors (CLI / inventory) → Resolver → descriptor → Acquisition → Store → Renderer → lando
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use vipdev_core::prelude::*;
//!
//! let config = VipdevConfig::load(None)?;
//! let lifecycle = Lifecycle::new(&config, Capabilities::from_config(&config));
//! lifecycle
//!     .create(CreateRequest {
//!         slug: "app1".into(),
//!         start: true,
//!         ..CreateRequest::default()
//!     })
//!     .await?;
//! ```

// Core modules
pub mod acquisition;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod orchestration;
pub mod render;
pub mod resolver;
pub mod selector;
pub mod store;
pub mod template;

// Re-exports
pub use error::{
    AcquisitionError, ConfigError, InventoryError, OrchestrationError, RenderError, Result,
    VipdevError,
};

/// Common imports for driving vipdev
pub mod prelude {
    pub use crate::acquisition::{Cloner, GitCloner};
    pub use crate::config::{ComponentDefaults, VipdevConfig};
    pub use crate::descriptor::InstanceDescriptor;
    pub use crate::error::VipdevError;
    pub use crate::inventory::{InventoryClient, VipgoCli};
    pub use crate::lifecycle::{Capabilities, CreateRequest, Lifecycle, Outcome, Stage, UpgradeRequest};
    pub use crate::orchestration::{LandoRunner, OrchestrationRunner};
    pub use crate::resolver::{Resolver, SelectorArgs};
    pub use crate::selector::{
        ClientCodeSelector, GitSource, JetpackSelector, MuPluginsSelector, WordPressSelector,
    };
    pub use crate::store::InstanceStore;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
