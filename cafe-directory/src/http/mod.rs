//! HTTP layer: Axum router, handlers, sessions and responses.
//!
//! Pages are produced through the configured view renderer; the price update,
//! random pick and not-found paths answer with JSON.

mod auth;
mod error;
mod handlers;
mod responses;
mod state;

#[cfg(test)]
mod tests;

pub use handlers::router;
pub use state::{AppState, SessionStore};
