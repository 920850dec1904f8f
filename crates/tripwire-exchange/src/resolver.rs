//! Base URL and stream URL resolution.

use crate::dialect::RequestSpec;
use crate::error::ExchangeResult;
use serde_json::Value;

/// Account details returned by the venue's account lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountInfo {
    /// Routing group, for venues that shard accounts by group.
    pub account_group: Option<String>,
    pub user_uid: Option<String>,
    pub raw: Value,
}

pub trait UrlResolver: Send + Sync {
    /// REST base for a resolved (or absent) account group.
    fn base_url(&self, group: Option<&str>) -> String;

    /// Whether group-scoped calls need an account lookup first.
    fn needs_group(&self) -> bool;

    /// Authenticated account lookup; always sent against `base_url(None)`.
    fn account_request(&self) -> RequestSpec;

    fn parse_account(&self, body: &Value) -> ExchangeResult<AccountInfo>;

    /// WebSocket endpoint for market and order streams.
    fn stream_url(&self, account: Option<&AccountInfo>) -> String;
}
