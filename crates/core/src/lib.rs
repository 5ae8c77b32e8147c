#![warn(clippy::all, missing_docs)]

//! Core logic for the bingo shop console.
//!
//! This crate hosts the session store, the game-configuration builder,
//! the reporting aggregator and the commission editor, together with the
//! HTTP client and configuration they share. The terminal UI drives it,
//! but nothing here depends on a frontend.

pub mod api;
pub mod commission;
pub mod config;
pub mod error;
pub mod game;
pub mod report;
pub mod session;

pub use api::{HttpShopApi, ShopApi, ShopProfile};
pub use commission::{CommissionEditor, CommissionState};
pub use config::{AppConfig, GameDefaults};
pub use error::{ConsoleError, Result, ValidationError};
pub use game::{GameConfig, GameStarted, WinningPattern};
pub use report::{DateRange, ReportAggregator, ReportPeriod, ReportTotals, ReportView};
pub use session::{Session, SessionStore};
