//! tripwire-api - HTTP control surface for the tripwire bot.
//!
//! Every route is scoped by exchange name and served by that exchange's
//! `OrderDesk`:
//!
//! ```text
//! GET    /api/{exchange}/list/{orders|processing|symbols|buttons}
//! GET    /api/{exchange}/rate?ticker=BTC/USDT
//! GET    /api/{exchange}/user/info
//! POST   /api/{exchange}/order            DELETE /api/{exchange}/order/{id}
//! DELETE /api/{exchange}/orders
//! POST   /api/{exchange}/button           DELETE /api/{exchange}/button/{id}
//! POST   /api/{exchange}/update/symbols
//! POST   /api/{exchange}/update/symbol/{id}
//! DELETE /api/{exchange}/symbol/{id}
//! GET    /api/{exchange}/export           POST   /api/{exchange}/import
//! GET    /health                          GET    /metrics
//! ```
//!
//! Successful replies are `{ "data": ... }` (export returns the document
//! itself); failures are `{ "error": "..." }` with a matching status code.

mod config;
mod error;
mod server;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use server::{create_router, run_server, AppState};
