//! Catalog files
//!
//! ## Architecture
//!
//! - `schema` - Catalog file data structures and cross-reference checks
//! - `io` - Reading, validating, and writing catalog files
//!
//! ## Usage
//!
//! ```no_run
//! use composite_resolver::config;
//!
//! # fn example() -> anyhow::Result<()> {
//! let loaded = config::load_catalog("catalog.toml")?;
//! let engine = loaded.into_engine()?;
//! let app = engine.resolve("App")?;
//! # Ok(())
//! # }
//! ```

pub mod io;
pub mod schema;

pub use io::{load_catalog, read_config, save_config};
pub use schema::{
    AppliesToConfig, CatalogConfig, CompositeConfig, FragmentConfig, InterceptorConfig,
    LoadedCatalog, MixinConfig, SlotConfig,
};
