//! HTTP adapter: management API, the inbound SMS webhook and trial reminder triggers.

mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{app, serve, AppState};
