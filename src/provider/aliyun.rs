use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{ProviderClient, ProviderIdentity};

const METADATA_ENDPOINT: &str = "http://100.100.100.200/latest/meta-data/region-id";
const CHECKOUT_CHANNEL: &str = "ComputeNest";

/// License gateway client for the ComputeNest marketplace.
#[derive(Clone)]
pub struct AliyunClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    code: i64,
    #[serde(default)]
    result: Option<GatewayResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GatewayResult {
    #[serde(rename = "Token")]
    token: Option<String>,
    #[serde(rename = "ExpireTime")]
    expire_time: Option<String>,
    #[serde(rename = "LicenseMetadata")]
    license_metadata: Option<LicenseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LicenseMetadata {
    // decimal count of entitlements the template still has available
    #[serde(rename = "CustomData")]
    custom_data: Option<String>,
}

impl AliyunClient {
    /// Build a client against the regional gateway discovered from the
    /// instance metadata service.
    pub async fn discover() -> Result<Self> {
        let client = http_client()?;
        let region = client
            .get(METADATA_ENDPOINT)
            .send()
            .await
            .context("failed to contact instance metadata service")?
            .error_for_status()
            .context("instance metadata service rejected region lookup")?
            .text()
            .await
            .context("failed to read region id")?;
        let region = region.trim();
        if region.is_empty() {
            anyhow::bail!("instance metadata returned an empty region id");
        }
        Ok(Self {
            client,
            base_url: format!("https://{region}.axt.aliyun.com/computeNest/license"),
        })
    }

    /// Build a client against an explicit gateway endpoint.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check_out_license(&self) -> Result<GatewayResponse> {
        let payload = serde_json::json!({ "Channel": CHECKOUT_CHANNEL });
        let response = self
            .client
            .post(self.endpoint("check_out_license"))
            .json(&payload)
            .send()
            .await
            .context("failed to contact license gateway")?
            .error_for_status()
            .context("license gateway rejected checkout call")?;
        response
            .json()
            .await
            .context("failed to decode license gateway response")
    }

    fn result_of(response: GatewayResponse) -> Result<GatewayResult> {
        if response.code != 200 {
            anyhow::bail!("license gateway returned code {}", response.code);
        }
        response
            .result
            .context("license gateway response carried no result")
    }
}

#[async_trait]
impl ProviderClient for AliyunClient {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity {
            name: "aliyun".to_string(),
            account: None,
        }
    }

    async fn check_in(&self, _consumption_token: &str) -> Result<bool> {
        // the gateway has no dedicated check-in call; a fresh checkout
        // supersedes the previously issued token
        let response = self.check_out_license().await?;
        Ok(response.code == 200)
    }

    async fn available_entitlements(&self) -> Result<u64> {
        let result = Self::result_of(self.check_out_license().await?)?;
        let raw = result
            .license_metadata
            .and_then(|metadata| metadata.custom_data)
            .context("license metadata carried no entitlement count")?;
        raw.trim()
            .parse::<u64>()
            .with_context(|| format!("entitlement count '{raw}' is not a number"))
    }

    async fn token_and_expiry(&self, _amount: u64) -> Result<(String, DateTime<Utc>)> {
        let result = Self::result_of(self.check_out_license().await?)?;
        let token = result
            .token
            .filter(|token| !token.is_empty())
            .context("license gateway returned no consumption token")?;
        let raw = result
            .expire_time
            .context("license gateway returned no expiry")?;
        let expiry = DateTime::parse_from_rfc3339(&raw)
            .with_context(|| format!("expiry '{raw}' is not a valid RFC3339 timestamp"))?
            .with_timezone(&Utc);
        Ok((token, expiry))
    }
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build license gateway client")
}
