#![deny(missing_docs)]
//! Course progress tracking for an online course marketplace.
//!
//! Students report how far they watched each lesson; the crate stores that
//! per-lesson state and keeps each enrollment's completion percentage in sync
//! with it.
//!
//! Layout:
//! - [`progress`]: domain types, collaborator traits, and the
//!   [`progress::ProgressAggregator`] that rolls lesson reports up into
//!   enrollment progress
//! - [`store`]: SQLite (Diesel) and in-memory implementations of the traits
//! - [`api`]: handler bodies for the `POST`/`GET progress` endpoints
//! - [`catalog`]: TOML course catalog and its sync into the database
//! - [`db`]: connections and embedded migrations
//! - [`error`]: the error taxonomy and its HTTP-equivalent status codes

pub mod api;
pub mod catalog;
pub mod db;
pub mod error;
pub mod models;
pub mod progress;
#[allow(missing_docs)]
pub mod schema;
pub mod store;
pub mod tz;
