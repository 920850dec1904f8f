//! Order trigger engine for tripwire.
//!
//! Provides:
//! - `TriggerEngine`: price observation, atomic promotion, supervised
//!   placement with damping, order-update handling
//! - `OrderDesk`: control operations with channel reference counting
//! - Stream handlers and a REST polling loop that feed observations
//! - `Notifier` implementations for operator alerts

pub mod config;
pub mod desk;
pub mod disposition;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod limits;
pub mod notify;
pub mod placer;
pub mod poll;

pub use config::EngineConfig;
pub use desk::{
    spawn_channel_keeper, spawn_resubscriber, ChannelSink, CreateOrder, OrderDesk, OrderView,
    ProcessingView,
};
pub use disposition::Disposition;
pub use engine::TriggerEngine;
pub use error::{EngineError, EngineResult};
pub use handlers::{OrderUpdateHandler, PriceHandler};
pub use limits::TriggerLimits;
pub use notify::{LogNotifier, Notifier, SmsConfig, SmsNotifier, DEFAULT_SMS_URL};
pub use placer::{MockPlacer, OrderPlacer};
pub use poll::{poll_once, spawn_price_poll, TickerSource, DEFAULT_POLL_INTERVAL};
