//! Tripwire conditional-order trigger bot.
//!
//! Main application that orchestrates, per configured exchange:
//! - Order store and exchange connector
//! - Socket pools feeding prices and order updates (or a REST ticker poll)
//! - Trigger engine and order desk
//!
//! plus one control API serving every exchange.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, ExchangeSettings, PriceSource, SmsSettings, WsSettings};
pub use error::{AppError, AppResult};
