//! Implementations of [`crate::progress::CourseCatalog`] and
//! [`crate::progress::ProgressStore`].
//!
//! - [`SqliteStore`]: Diesel over SQLite, the production store.
//! - [`MemoryStore`]: mutex-guarded maps, for tests and tooling.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
