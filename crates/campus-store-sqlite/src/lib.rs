//! SQLite backend for the Campus store traits.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every operation that writes more than
//! one row runs inside a single SQLite transaction.

mod calendar;
mod catalogs;
mod classes;
mod encode;
mod notifications;
mod profiles;
mod programs;
mod schema;
mod schools;
mod statistics;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
