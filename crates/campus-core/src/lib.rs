//! Core types, business rules and store traits for the Campus school
//! administration back end.
//!
//! This crate is deliberately free of HTTP and database dependencies. Rules
//! that need stored data take that data as arguments, so storage backends can
//! run them inside their own transactions.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod calendar;
pub mod catalog;
pub mod enrollment;
pub mod error;
pub mod grading;
pub mod notification;
pub mod profile;
pub mod program;
pub mod school;
pub mod statistics;
pub mod store;
pub mod study_class;

pub use error::{Error, Result};
