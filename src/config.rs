use anyhow::Context;
use once_cell::sync::Lazy;

/// When set to a truthy value, raises the default log filter to `debug`.
pub static DEBUG: Lazy<bool> = Lazy::new(|| {
    std::env::var("ADAPTER_DEBUG")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// key: adapter-config -> compliance scan cadence
///
/// The fixed interval is also the only failure-recovery mechanism: a failed
/// cycle is simply retried on the next tick.
pub static POLL_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("ADAPTER_POLL_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(3600)
});

/// How many cluster nodes one marketplace license covers. Defaults to `20`.
pub static NODES_PER_LICENSE: Lazy<u64> = Lazy::new(|| {
    std::env::var("ADAPTER_NODES_PER_LICENSE")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value >= 1)
        .unwrap_or(20)
});

/// Namespace holding the checkout secret and compliance output. Defaults to
/// `cattle-system`.
pub static K8S_NAMESPACE: Lazy<String> =
    Lazy::new(|| std::env::var("K8S_NAMESPACE").unwrap_or_else(|_| "cattle-system".to_string()));

/// Optional override of the hostname-derived metrics endpoint.
pub static METRICS_ENDPOINT: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("ADAPTER_METRICS_ENDPOINT"));

/// Marketplace product SKU presented to the AWS license service. Required
/// when the `aws` driver is selected.
pub static AWS_PRODUCT_SKU: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("ADAPTER_AWS_PRODUCT_SKU"));

/// Marketplace the adapter meters against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketplaceDriver {
    Aws,
    Aliyun,
}

impl MarketplaceDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketplaceDriver::Aws => "aws",
            MarketplaceDriver::Aliyun => "aliyun",
        }
    }
}

pub fn marketplace_driver() -> anyhow::Result<MarketplaceDriver> {
    let raw = std::env::var("ADAPTER_DRIVER").context("ADAPTER_DRIVER must be set")?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "aws" => Ok(MarketplaceDriver::Aws),
        "aliyun" => Ok(MarketplaceDriver::Aliyun),
        other => anyhow::bail!("unknown ADAPTER_DRIVER value '{other}'; expected 'aws' or 'aliyun'"),
    }
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
