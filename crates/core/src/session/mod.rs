//! Authenticated shop session and its on-disk persistence.

mod models;
pub mod store;

pub use models::{PersistedSession, Session};
pub use store::SessionStore;
