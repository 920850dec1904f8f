//! Exchange connectivity for the tripwire bot.
//!
//! Provides:
//! - `ExchangeConnector`: generic signed REST client with single-flight
//!   account-group resolution
//! - Capability traits (`Signer`, `UrlResolver`, `Dialect`) and the Binance
//!   and AscendEX implementations, plus their stream codecs
//! - `HttpTransport` seam with a reqwest implementation and a scripted mock

pub mod ascendex;
pub mod binance;
pub mod clock;
pub mod connector;
pub mod dialect;
pub mod error;
pub mod resolver;
pub mod signer;
pub mod transport;
pub mod venue;

pub use clock::{Clock, SystemClock, TimestampSource};
pub use connector::ExchangeConnector;
pub use dialect::{Auth, Dialect, PlaceOrderRequest, PlaceOrderResponse, RequestSpec};
pub use error::{ExchangeError, ExchangeResult};
pub use resolver::{AccountInfo, UrlResolver};
pub use signer::{ApiCredentials, HmacPathSigner, HmacQuerySigner, SignInput, SignedParts, Signer};
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockTransport, ReqwestTransport,
};
pub use venue::{build_venue, Venue, VenueEndpoints, VenueKind};
