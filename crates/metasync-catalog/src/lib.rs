//! Live database catalogs for schema reconciliation
//!
//! A catalog answers introspection queries (does a table exist, what columns
//! does it have, does a constraint exist) and executes DDL. The engine only
//! sees the [`Catalog`] trait.
//!
//! ## Features
//!
//! - `postgres` (default) - PostgreSQL support via tokio-postgres, optional TLS
//!
//! ## Example
//!
//! ```rust,ignore
//! use metasync_catalog::{PostgresCatalog, SchemaIntrospector};
//!
//! let catalog = PostgresCatalog::connect(&config.database).await?;
//! let columns = catalog.columns("users").await?;
//! ```

pub mod catalog;
pub mod mock;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use catalog::{Catalog, CatalogError, DdlExecutor, SchemaIntrospector};
pub use mock::{MockCatalog, MockCatalogBuilder};

#[cfg(feature = "postgres")]
pub use postgres::PostgresCatalog;
