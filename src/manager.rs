use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::checkout::CheckoutInfo;
use crate::cluster::ClusterClient;
use crate::error::{CycleError, CycleResult};
use crate::provider::ProviderClient;
use crate::scraper::DemandScraper;
use crate::status::{ComplianceInfo, CspInfo, SupportConfig};

pub const STATUS_PREFIX: &str = "Marketplace Adapter:";

// key: license-reconciler -> periodic drift correction

/// Drives the license reconciliation cycle on a fixed interval.
///
/// Holds only collaborator handles; the working `CheckoutInfo` is a local
/// value inside each cycle, and the persisted secret is the only state that
/// crosses cycles or restarts.
pub struct Manager {
    provider: Arc<dyn ProviderClient>,
    cluster: Arc<dyn ClusterClient>,
    scraper: Arc<dyn DemandScraper>,
    interval: Duration,
    nodes_per_license: u64,
    product: Option<String>,
}

impl Manager {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        cluster: Arc<dyn ClusterClient>,
        scraper: Arc<dyn DemandScraper>,
        interval: Duration,
        nodes_per_license: u64,
        product: Option<String>,
    ) -> Self {
        Self {
            provider,
            cluster,
            scraper,
            interval,
            nodes_per_license: nodes_per_license.max(1),
            product,
        }
    }

    /// Spawn the background reconciliation task. At most one cycle is ever in
    /// flight: the next tick is not awaited until the previous cycle returns,
    /// so a slow cycle skips ticks instead of overlapping. Cycle failures go
    /// to `errs`; the loop itself only stops when `shutdown` flips.
    pub fn spawn(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
        errs: mpsc::Sender<CycleError>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }
                let outcome = tokio::select! {
                    outcome = self.run_cycle() => outcome,
                    _ = shutdown.changed() => break,
                };
                if let Err(err) = outcome {
                    if let Err(send) = errs.try_send(err) {
                        tracing::warn!(err = %send.into_inner(), "cycle failure report dropped, channel full");
                    }
                }
            }
            tracing::info!("reconciler exiting");
        })
    }

    /// One full measure, reconcile, persist, report pass.
    pub async fn run_cycle(&self) -> CycleResult<()> {
        let counts = self
            .scraper
            .current_demand()
            .await
            .map_err(CycleError::Demand)?;
        tracing::debug!(total = counts.total, "scraped active node count");

        let secret = match self.cluster.get_checkout_secret().await {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(?err, "unable to read checkout secret, starting fresh");
                Default::default()
            }
        };
        let mut info = match CheckoutInfo::from_secret(&secret) {
            Some(info) => info,
            None => {
                tracing::warn!("no usable checkout info persisted, assuming zero entitlement");
                CheckoutInfo::none()
            }
        };

        let required = required_units(counts.total, self.nodes_per_license);
        tracing::debug!(
            held = info.entitled_licenses,
            required,
            "comparing held entitlements against demand"
        );

        if info.entitled_licenses != required {
            self.reconcile(required, &mut info).await?;
        }

        if let Err(err) = self.cluster.update_checkout_secret(info.to_secret()).await {
            tracing::warn!(?err, "unable to persist checkout info, next cycle may repeat checkout work");
        }

        let compliance = compliance_for(required, info.entitled_licenses);
        self.cluster
            .update_user_notification(compliance.in_compliance(), &compliance.message)
            .await
            .map_err(CycleError::Notification)?;

        let document = self.support_config(&info, compliance);
        let payload =
            serde_json::to_vec(&document).map_err(|err| CycleError::Publish(err.into()))?;
        self.cluster
            .update_compliance_document(payload)
            .await
            .map_err(CycleError::Publish)?;
        Ok(())
    }

    /// Close the gap between held and required entitlements against the
    /// marketplace. `info.entitled_licenses` only ever takes values the
    /// provider confirmed.
    async fn reconcile(&self, required: u64, info: &mut CheckoutInfo) -> CycleResult<()> {
        match self.provider.check_in(&info.consumption_token).await {
            Ok(true) => {
                tracing::debug!("checked in previously held license");
                info.entitled_licenses = 0;
            }
            Ok(false) => tracing::warn!("marketplace declined license check-in"),
            Err(err) => tracing::warn!(?err, "unable to check in held license"),
        }

        let available = match self.provider.available_entitlements().await {
            Ok(count) => count,
            Err(err) => {
                // a transient query failure must not block an otherwise
                // achievable checkout
                tracing::warn!(?err, required, "unable to query available entitlements, attempting full checkout");
                required
            }
        };
        tracing::debug!(available, "entitlements available for checkout");

        let amount = required.min(available);
        if amount > 0 {
            let (token, expiry) = self
                .provider
                .token_and_expiry(amount)
                .await
                .map_err(|source| CycleError::Acquisition { amount, source })?;
            info.consumption_token = token;
            info.entitled_licenses = amount;
            info.expiry = expiry;
        }
        Ok(())
    }

    fn support_config(&self, info: &CheckoutInfo, compliance: ComplianceInfo) -> SupportConfig {
        let identity = self.provider.identity();
        let csp = CspInfo {
            name: identity.name,
            account_or_token: identity
                .account
                .unwrap_or_else(|| info.consumption_token.clone()),
            expiry: (info.entitled_licenses > 0)
                .then(|| info.expiry.to_rfc3339_opts(SecondsFormat::Secs, true)),
        };
        SupportConfig::new(csp, compliance, self.product.clone())
    }
}

fn required_units(total_nodes: u64, nodes_per_license: u64) -> u64 {
    total_nodes.div_ceil(nodes_per_license.max(1))
}

fn compliance_for(required: u64, held: u64) -> ComplianceInfo {
    if held == required {
        ComplianceInfo::new(
            true,
            format!("{STATUS_PREFIX} the server has the required amount of licenses"),
        )
    } else {
        ComplianceInfo::new(
            false,
            format!(
                "{STATUS_PREFIX} you have exceeded your licensed node count. At least {} more license(s) are required to become compliant.",
                required.saturating_sub(held)
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{compliance_for, required_units};

    #[test]
    fn required_units_rounds_up() {
        assert_eq!(required_units(0, 4), 0);
        assert_eq!(required_units(1, 4), 1);
        assert_eq!(required_units(4, 4), 1);
        assert_eq!(required_units(5, 4), 2);
        assert_eq!(required_units(8, 4), 2);
        assert_eq!(required_units(41, 20), 3);
    }

    #[test]
    fn required_units_tolerates_zero_divisor() {
        assert_eq!(required_units(7, 0), 7);
    }

    #[test]
    fn compliance_message_states_exact_shortfall() {
        let status = compliance_for(5, 2);
        assert!(!status.in_compliance());
        assert!(status.message.contains("At least 3 more license(s)"));

        let ok = compliance_for(2, 2);
        assert!(ok.in_compliance());
        assert!(ok.message.contains("required amount of licenses"));
    }
}
