use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_licensemanager::types::{CheckoutType, EntitlementData, EntitlementDataUnit, Filter};
use chrono::{DateTime, NaiveDateTime, Utc};

use super::{ProviderClient, ProviderIdentity};

// entitlement dimension the marketplace license is issued against
const ENTITLEMENT_NAME: &str = "nodes";
const KEY_FINGERPRINT: &str = "aws:294406891311:AWS/Marketplace:issuer-fingerprint";

/// License Manager client for the AWS marketplace.
pub struct AwsClient {
    licensing: aws_sdk_licensemanager::Client,
    account_number: String,
    product_sku: String,
}

impl AwsClient {
    pub async fn new(product_sku: impl Into<String>) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let sts = aws_sdk_sts::Client::new(&config);
        let identity = sts
            .get_caller_identity()
            .send()
            .await
            .context("failed to resolve caller identity")?;
        let account_number = identity
            .account()
            .context("caller identity carried no account number")?
            .to_string();
        Ok(Self {
            licensing: aws_sdk_licensemanager::Client::new(&config),
            account_number,
            product_sku: product_sku.into(),
        })
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }
}

#[async_trait]
impl ProviderClient for AwsClient {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity {
            name: "aws".to_string(),
            account: Some(self.account_number.clone()),
        }
    }

    async fn check_in(&self, consumption_token: &str) -> Result<bool> {
        if consumption_token.is_empty() {
            return Ok(false);
        }
        self.licensing
            .check_in_license()
            .license_consumption_token(consumption_token)
            .send()
            .await
            .context("license service rejected check-in")?;
        Ok(true)
    }

    async fn available_entitlements(&self) -> Result<u64> {
        let received = self
            .licensing
            .list_received_licenses()
            .filters(
                Filter::builder()
                    .name("ProductSKU")
                    .values(&self.product_sku)
                    .build(),
            )
            .send()
            .await
            .context("failed to list received licenses")?;

        let total = received
            .licenses()
            .iter()
            .flat_map(|license| license.entitlements())
            .filter(|entitlement| entitlement.name() == ENTITLEMENT_NAME)
            .filter_map(|entitlement| entitlement.max_count())
            .map(|count| count.max(0) as u64)
            .sum();
        Ok(total)
    }

    async fn token_and_expiry(&self, amount: u64) -> Result<(String, DateTime<Utc>)> {
        let entitlement = EntitlementData::builder()
            .name(ENTITLEMENT_NAME)
            .unit(EntitlementDataUnit::Count)
            .value(amount.to_string())
            .build()
            .context("invalid entitlement payload")?;

        let checkout = self
            .licensing
            .checkout_license()
            .product_sku(&self.product_sku)
            .checkout_type(CheckoutType::Provisional)
            .key_fingerprint(KEY_FINGERPRINT)
            .entitlements(entitlement)
            .client_token(uuid::Uuid::new_v4().to_string())
            .send()
            .await
            .context("license service rejected checkout")?;

        let token = checkout
            .license_consumption_token()
            .context("checkout response carried no consumption token")?
            .to_string();
        let raw = checkout
            .expiration()
            .context("checkout response carried no expiration")?;
        Ok((token, parse_expiration(raw)?))
    }
}

fn parse_expiration(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    // the license service occasionally omits the offset
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .with_context(|| format!("expiration '{raw}' is not a recognized timestamp"))?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::parse_expiration;

    #[test]
    fn expiration_accepts_rfc3339_and_naive_timestamps() {
        let with_offset = parse_expiration("2026-09-01T12:00:00Z").unwrap();
        let without_offset = parse_expiration("2026-09-01T12:00:00").unwrap();
        assert_eq!(with_offset, without_offset);
        assert!(parse_expiration("next tuesday").is_err());
    }
}
