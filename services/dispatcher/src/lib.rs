//! Backend dispatch for application staging and running.
//!
//! Decides which scheduler family (the legacy scheduler or the declarative
//! one) handles an application, builds the messages the declarative
//! scheduler consumes, applies staging completions that arrive later on the
//! bus, and reports instance counts and health from either family.
//!
//! The crate ships a `dispatcher` binary for local runs; the library surface
//! is what the API layer and the integration tests use.

pub mod app;
pub mod backend;
pub mod backends;
pub mod buildpacks;
pub mod bus;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod instances;
pub mod messenger;
pub mod protocol;
pub mod repository;
pub mod staging;
pub mod validation;

pub use backends::Backends;
pub use error::{DispatchError, DispatchResult};
