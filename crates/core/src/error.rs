//! Error taxonomy shared by every console component.

use chrono::NaiveDate;
use thiserror::Error;

/// Fallback shown when the login endpoint does not explain a rejection.
pub const LOGIN_FAILED: &str = "Login failed";

/// Errors surfaced by the session, game, report and commission components.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// Bad credentials or an unreachable login endpoint.
    #[error("{0}")]
    Auth(String),

    /// Local input rejected before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The server refused to start the game.
    #[error("failed to start game: {0}")]
    GameStart(String),

    /// No shop identity is known for a shop-scoped call.
    #[error("shop id not found; please log in again")]
    MissingShop,

    /// Network or decode failure while reading reports or shop data.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The commission write was rejected.
    #[error("failed to update commission: {0}")]
    Update(String),

    /// Reading or writing the persisted session failed.
    #[error("session storage error: {0}")]
    Storage(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ConsoleError {
    /// Message shown to the operator on the status line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(detail) if detail.trim().is_empty() => LOGIN_FAILED.to_string(),
            Self::Auth(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}

/// Input rejected at the boundary.
#[allow(missing_docs)]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("please select at least one card")]
    EmptySelection,

    #[error("{field} must be a number (got {input:?})")]
    NotANumber { field: &'static str, input: String },

    #[error("{field} must be greater than zero (got {value})")]
    NotPositive { field: &'static str, value: f64 },

    #[error("commission rate must be between 0 and 1 (got {0})")]
    RateOutOfRange(f64),

    #[error("card {0} is outside 1..=200")]
    CardOutOfRange(u32),

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is not a valid date (got {input:?}, expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, input: String },

    #[error("start date {from} is after end date {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
}

/// Result alias used across the core crate.
pub type Result<T, E = ConsoleError> = std::result::Result<T, E>;
