//! Core domain + application logic for the delivery slot SMS service.
//!
//! This crate is intentionally framework-agnostic. Storage, the SMS transport and
//! the HTTP surface live behind ports (traits) implemented in adapter crates.

pub mod bootstrap;
pub mod config;
pub mod datetime;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod notify;
pub mod reply;
pub mod scheduler;
pub mod store;

pub use errors::{Error, Result};
