use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod aliyun;
pub mod aws;

/// Identity of the marketplace account the adapter meters against.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub name: String,
    pub account: Option<String>,
}

/// Contract every marketplace variant implements.
///
/// All calls are safe to retry from the caller's perspective; the
/// reconciliation interval is the only retry mechanism.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn identity(&self) -> ProviderIdentity;

    /// Release the currently held license back to the marketplace. Returns
    /// whether the marketplace acknowledged the release.
    async fn check_in(&self, consumption_token: &str) -> Result<bool>;

    /// Number of entitlements the account can still check out.
    async fn available_entitlements(&self) -> Result<u64>;

    /// Check out `amount` licenses, returning the consumption token and its
    /// expiry.
    async fn token_and_expiry(&self, amount: u64) -> Result<(String, DateTime<Utc>)>;
}
