//! Venue selection: wires the capability set for one configured exchange.

use crate::ascendex::{AscendexCodec, AscendexDialect, AscendexHandshake, AscendexResolver};
use crate::binance::{BinanceCodec, BinanceDialect, BinanceResolver};
use crate::clock::TimestampSource;
use crate::connector::ExchangeConnector;
use crate::error::ExchangeResult;
use crate::signer::{ApiCredentials, HmacPathSigner, HmacQuerySigner};
use crate::transport::HttpTransport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tripwire_ws::{HandshakeAuth, MessageCodec, NoAuth};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueKind {
    Binance,
    #[serde(alias = "bitmax")]
    Ascendex,
}

impl fmt::Display for VenueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binance => write!(f, "binance"),
            Self::Ascendex => write!(f, "ascendex"),
        }
    }
}

/// Optional endpoint overrides (testnets, mock servers).
#[derive(Debug, Clone, Default)]
pub struct VenueEndpoints {
    pub rest_url: Option<String>,
    pub stream_url: Option<String>,
}

pub struct Venue {
    pub kind: VenueKind,
    pub connector: Arc<ExchangeConnector>,
    pub codec: Arc<dyn MessageCodec>,
    pub handshake: Arc<dyn HandshakeAuth>,
}

pub fn build_venue(
    name: &str,
    kind: VenueKind,
    credentials: &ApiCredentials,
    endpoints: VenueEndpoints,
    transport: Arc<dyn HttpTransport>,
) -> ExchangeResult<Venue> {
    let timestamps = Arc::new(TimestampSource::system());
    let venue = match kind {
        VenueKind::Binance => Venue {
            kind,
            connector: Arc::new(ExchangeConnector::new(
                name,
                transport,
                Arc::new(HmacQuerySigner::new(credentials)?),
                Arc::new(BinanceResolver::new(endpoints.rest_url, endpoints.stream_url)),
                Arc::new(BinanceDialect),
                timestamps,
            )),
            codec: Arc::new(BinanceCodec),
            handshake: Arc::new(NoAuth),
        },
        VenueKind::Ascendex => {
            let signer = Arc::new(HmacPathSigner::new(credentials)?);
            Venue {
                kind,
                connector: Arc::new(ExchangeConnector::new(
                    name,
                    transport,
                    signer.clone(),
                    Arc::new(AscendexResolver::new(endpoints.rest_url, endpoints.stream_url)),
                    Arc::new(AscendexDialect),
                    timestamps.clone(),
                )),
                codec: Arc::new(AscendexCodec),
                handshake: Arc::new(AscendexHandshake::new(signer, timestamps)),
            }
        }
    };
    Ok(venue)
}
