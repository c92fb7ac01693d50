//! Course catalog subsystem.
//!
//! The catalog (courses, chapters, lessons) is authored as TOML and pushed
//! into the database by [`sync::sync_catalog`]. The progress core only ever
//! reads it. See [`config`] for the TOML model.

pub mod config;
pub mod sync;

pub use config::{Catalog, load_catalog_path, load_catalog_str};
pub use sync::{SyncOptions, SyncSummary, sync_catalog};
