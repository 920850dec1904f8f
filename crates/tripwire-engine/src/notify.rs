//! Operator notifications.
//!
//! The engine decides when to notify; a [`Notifier`] decides how. Delivery is
//! fire-and-forget so a slow gateway never stalls order handling.

use std::time::Duration;
use tracing::{info, warn};
use tripwire_telemetry::Metrics;

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!(message, "Notification");
    }
}

pub const DEFAULT_SMS_URL: &str = "https://smsc.ru/sys/send.php";

/// smsc-style HTTP gateway settings.
#[derive(Clone)]
pub struct SmsConfig {
    pub url: String,
    pub login: String,
    pub password: String,
    pub phones: Vec<String>,
}

impl std::fmt::Debug for SmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsConfig")
            .field("url", &self.url)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("phones", &self.phones)
            .finish()
    }
}

/// Sends each notification as an SMS through a GET request.
pub struct SmsNotifier {
    client: reqwest::Client,
    config: SmsConfig,
}

impl SmsNotifier {
    pub fn new(config: SmsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Query parameters for one message.
    pub fn params(&self, message: &str) -> Vec<(&'static str, String)> {
        vec![
            ("login", self.config.login.clone()),
            ("psw", self.config.password.clone()),
            ("phones", self.config.phones.join(",")),
            ("mes", message.to_string()),
            ("fmt", "3".to_string()),
            ("cost", "0".to_string()),
        ]
    }
}

impl Notifier for SmsNotifier {
    fn notify(&self, message: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(message, "No runtime, SMS dropped");
            Metrics::notification(false);
            return;
        };
        let request = self.client.get(&self.config.url).query(&self.params(message));
        runtime.spawn(async move {
            let sent = match request.send().await {
                Ok(response) => match response.json::<serde_json::Value>().await {
                    // The gateway reports failures as 200 with an "error" field
                    Ok(body) if body.get("error").is_some() => {
                        warn!(%body, "SMS gateway refused message");
                        false
                    }
                    Ok(_) => true,
                    Err(e) => {
                        warn!(error = %e, "SMS gateway reply unreadable");
                        false
                    }
                },
                Err(e) => {
                    warn!(error = %e, "SMS request failed");
                    false
                }
            };
            Metrics::notification(sent);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sms_params() {
        let notifier = SmsNotifier::new(SmsConfig {
            url: DEFAULT_SMS_URL.to_string(),
            login: "desk".to_string(),
            password: "pw".to_string(),
            phones: vec!["+100".to_string(), "+200".to_string()],
        });
        let params = notifier.params("filled");
        assert!(params.contains(&("phones", "+100,+200".to_string())));
        assert!(params.contains(&("psw", "pw".to_string())));
        assert!(params.contains(&("fmt", "3".to_string())));
        assert!(!format!("{:?}", notifier.config).contains("pw\""));
    }

    #[test]
    fn test_sms_without_runtime_does_not_panic() {
        let notifier = SmsNotifier::new(SmsConfig {
            url: "http://127.0.0.1:9/".to_string(),
            login: String::new(),
            password: String::new(),
            phones: Vec::new(),
        });
        notifier.notify("no runtime here");
    }
}
