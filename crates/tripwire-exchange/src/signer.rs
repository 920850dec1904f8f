//! Request signing schemes.
//!
//! Signers are pure: given the same path, parameters and timestamp they
//! produce the same output. Secrets are validated when the signer is built,
//! so `sign` cannot fail.

use crate::error::{ExchangeError, ExchangeResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// API key and secret for one exchange account.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiCredentials {
    pub api_key: String,
    pub secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
        }
    }

    /// Read both values from the named environment variables.
    pub fn from_env(key_var: &str, secret_var: &str) -> ExchangeResult<Self> {
        let api_key = std::env::var(key_var)
            .map_err(|_| ExchangeError::InvalidCredentials(format!("{key_var} is not set")))?;
        let secret = std::env::var(secret_var)
            .map_err(|_| ExchangeError::InvalidCredentials(format!("{secret_var} is not set")))?;
        Ok(Self::new(api_key, secret))
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Everything a signer may look at.
#[derive(Debug, Clone, Copy)]
pub struct SignInput<'a> {
    /// Path relative to the resolved base URL, e.g. `/cash/order`.
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub body: Option<&'a Value>,
    pub timestamp: u64,
    /// Whether the venue expects the timestamp as a query parameter.
    pub include_timestamp: bool,
}

/// Query parameters and headers to merge into the outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedParts {
    /// Appended after the caller's own query parameters, in order.
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

pub trait Signer: Send + Sync {
    fn sign(&self, input: &SignInput<'_>) -> SignedParts;

    /// Headers sent on every request, signed or not.
    fn key_headers(&self) -> Vec<(String, String)>;
}

/// URL-encode pairs the way the venues expect (`application/x-www-form-urlencoded`).
pub fn encode_query(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .finish()
}

/// Flatten a JSON object body into string pairs, preserving field order.
fn json_pairs(body: &Value) -> Vec<(String, String)> {
    let Some(map) = body.as_object() else {
        return Vec::new();
    };
    map.iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}

/// Binance scheme: hex HMAC-SHA256 over the URL-encoded parameters,
/// carried as a trailing `signature` query parameter.
pub struct HmacQuerySigner {
    api_key: String,
    mac: HmacSha256,
}

impl HmacQuerySigner {
    pub const KEY_HEADER: &'static str = "X-MBX-APIKEY";

    pub fn new(credentials: &ApiCredentials) -> ExchangeResult<Self> {
        if credentials.secret.is_empty() {
            return Err(ExchangeError::InvalidCredentials(
                "secret must not be empty".to_string(),
            ));
        }
        let mac = HmacSha256::new_from_slice(credentials.secret.as_bytes())
            .map_err(|e| ExchangeError::InvalidCredentials(format!("HMAC setup failed: {e}")))?;
        Ok(Self {
            api_key: credentials.api_key.clone(),
            mac,
        })
    }

    /// Lower-case hex signature of `message`.
    pub fn signature(&self, message: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl Signer for HmacQuerySigner {
    fn sign(&self, input: &SignInput<'_>) -> SignedParts {
        let mut extra = Vec::with_capacity(2);
        if input.include_timestamp {
            extra.push(("timestamp".to_string(), input.timestamp.to_string()));
        }

        let mut signed: Vec<(String, String)> = input.query.to_vec();
        signed.extend(extra.iter().cloned());
        let mut message = encode_query(&signed);
        if let Some(body) = input.body {
            message.push_str(&encode_query(&json_pairs(body)));
        }

        extra.push(("signature".to_string(), self.signature(&message)));
        SignedParts {
            query: extra,
            headers: Vec::new(),
        }
    }

    fn key_headers(&self) -> Vec<(String, String)> {
        vec![(Self::KEY_HEADER.to_string(), self.api_key.clone())]
    }
}

/// AscendEX scheme: base64 HMAC-SHA256 of `"{timestamp}+{last path segment}"`
/// keyed with the base64-decoded secret, carried in `x-auth-*` headers.
pub struct HmacPathSigner {
    api_key: String,
    mac: HmacSha256,
}

impl HmacPathSigner {
    pub fn new(credentials: &ApiCredentials) -> ExchangeResult<Self> {
        let mut key = BASE64.decode(credentials.secret.trim()).map_err(|e| {
            ExchangeError::InvalidCredentials(format!("secret is not valid base64: {e}"))
        })?;
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| ExchangeError::InvalidCredentials(format!("HMAC setup failed: {e}")));
        key.zeroize();
        Ok(Self {
            api_key: credentials.api_key.clone(),
            mac: mac?,
        })
    }

    pub fn signature(&self, timestamp: u64, path: &str) -> String {
        let segment = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let mut mac = self.mac.clone();
        mac.update(format!("{timestamp}+{segment}").as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    /// Full header set for `path` at `timestamp`, key included.
    pub fn auth_headers(&self, timestamp: u64, path: &str) -> Vec<(String, String)> {
        vec![
            ("x-auth-key".to_string(), self.api_key.clone()),
            ("x-auth-timestamp".to_string(), timestamp.to_string()),
            (
                "x-auth-signature".to_string(),
                self.signature(timestamp, path),
            ),
        ]
    }
}

impl Signer for HmacPathSigner {
    fn sign(&self, input: &SignInput<'_>) -> SignedParts {
        SignedParts {
            query: Vec::new(),
            headers: vec![
                ("x-auth-timestamp".to_string(), input.timestamp.to_string()),
                (
                    "x-auth-signature".to_string(),
                    self.signature(input.timestamp, input.path),
                ),
            ],
        }
    }

    fn key_headers(&self) -> Vec<(String, String)> {
        vec![("x-auth-key".to_string(), self.api_key.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_query_signature_matches_published_example() {
        // Binance REST docs example for HMAC SHA256 signed endpoints
        let creds = ApiCredentials::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A",
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
        );
        let signer = HmacQuerySigner::new(&creds).unwrap();
        let query = pairs(&[
            ("symbol", "LTCBTC"),
            ("side", "BUY"),
            ("type", "LIMIT"),
            ("timeInForce", "GTC"),
            ("quantity", "1"),
            ("price", "0.1"),
            ("recvWindow", "5000"),
        ]);

        let parts = signer.sign(&SignInput {
            path: "/api/v3/order",
            query: &query,
            body: None,
            timestamp: 1499827319559,
            include_timestamp: true,
        });

        assert_eq!(parts.query[0], ("timestamp".to_string(), "1499827319559".to_string()));
        assert_eq!(
            parts.query[1].1,
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
        assert_eq!(
            signer.key_headers()[0].0,
            HmacQuerySigner::KEY_HEADER.to_string()
        );
    }

    #[test]
    fn test_query_signer_rejects_empty_secret() {
        let creds = ApiCredentials::new("key", "");
        assert!(matches!(
            HmacQuerySigner::new(&creds),
            Err(ExchangeError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_path_signer_rejects_non_base64_secret() {
        let creds = ApiCredentials::new("key", "not base64 !!");
        assert!(matches!(
            HmacPathSigner::new(&creds),
            Err(ExchangeError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn test_path_signer_uses_last_segment() {
        let creds = ApiCredentials::new("key", BASE64.encode(b"secret-bytes"));
        let signer = HmacPathSigner::new(&creds).unwrap();

        let order = signer.signature(1_600_000_000_000, "/cash/order");
        assert_eq!(order, signer.signature(1_600_000_000_000, "order"));
        assert_ne!(order, signer.signature(1_600_000_000_001, "order"));
        assert_ne!(order, signer.signature(1_600_000_000_000, "info"));

        // Independent computation of the same MAC
        let mut mac = HmacSha256::new_from_slice(b"secret-bytes").unwrap();
        mac.update(b"1600000000000+order");
        assert_eq!(order, BASE64.encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn test_path_signer_headers() {
        let creds = ApiCredentials::new("my-key", BASE64.encode(b"k"));
        let signer = HmacPathSigner::new(&creds).unwrap();
        let parts = signer.sign(&SignInput {
            path: "/info",
            query: &[],
            body: None,
            timestamp: 42,
            include_timestamp: true,
        });

        assert!(parts.query.is_empty());
        assert_eq!(parts.headers[0], ("x-auth-timestamp".to_string(), "42".to_string()));
        assert_eq!(signer.key_headers()[0].1, "my-key");
        assert_eq!(signer.auth_headers(42, "stream").len(), 3);
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let creds = ApiCredentials::new("visible?", "secret?");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("visible?"));
        assert!(!debug.contains("secret?"));
    }
}
