use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{fmt, EnvFilter};

use marketplace_adapter::cluster::{ClusterClient, KubeClusterClient};
use marketplace_adapter::config::{self, MarketplaceDriver};
use marketplace_adapter::manager::{Manager, STATUS_PREFIX};
use marketplace_adapter::provider::aliyun::AliyunClient;
use marketplace_adapter::provider::aws::AwsClient;
use marketplace_adapter::provider::ProviderClient;
use marketplace_adapter::scraper::MetricsScraper;
use marketplace_adapter::status::{CspInfo, SupportConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = if *config::DEBUG {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    fmt().with_env_filter(filter).json().init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "marketplace adapter starting"
    );

    let driver = config::marketplace_driver()?;
    let cluster = Arc::new(KubeClusterClient::new().await?);

    let provider: Arc<dyn ProviderClient> = match build_provider(driver).await {
        Ok(provider) => provider,
        Err(err) => {
            register_startup_error(cluster.as_ref(), CspInfo::unknown(driver.as_str()), &err).await;
            return Err(err.context("unable to start provider client"));
        }
    };

    let hostname = match cluster.get_hostname().await {
        Ok(hostname) => hostname,
        Err(err) => {
            let identity = provider.identity();
            let csp = CspInfo {
                name: identity.name,
                account_or_token: identity.account.unwrap_or_else(|| "unknown".to_string()),
                expiry: None,
            };
            register_startup_error(cluster.as_ref(), csp, &err).await;
            return Err(err.context("unable to resolve server hostname"));
        }
    };

    let scraper = match config::METRICS_ENDPOINT.clone() {
        Some(endpoint) => MetricsScraper::new(endpoint)?,
        None => MetricsScraper::for_hostname(&hostname)?,
    };

    let product = match cluster.get_product_version().await {
        Ok(version) => Some(version),
        Err(err) => {
            tracing::warn!(?err, "unable to resolve product version, publishing without it");
            None
        }
    };

    let manager = Arc::new(Manager::new(
        provider,
        cluster.clone(),
        Arc::new(scraper),
        Duration::from_secs(*config::POLL_INTERVAL_SECS),
        *config::NODES_PER_LICENSE,
        product,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (err_tx, mut err_rx) = mpsc::channel(1);
    let handle = manager.spawn(shutdown_rx, err_tx);

    let drain = tokio::spawn(async move {
        while let Some(err) = err_rx.recv().await {
            tracing::error!(%err, "compliance cycle failed");
        }
    });

    wait_for_shutdown_signal().await?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = handle.await;
    let _ = drain.await;
    Ok(())
}

async fn build_provider(driver: MarketplaceDriver) -> anyhow::Result<Arc<dyn ProviderClient>> {
    match driver {
        MarketplaceDriver::Aws => {
            let sku = config::AWS_PRODUCT_SKU
                .clone()
                .context("ADAPTER_AWS_PRODUCT_SKU must be set for the aws driver")?;
            Ok(Arc::new(AwsClient::new(sku).await?))
        }
        MarketplaceDriver::Aliyun => Ok(Arc::new(AliyunClient::discover().await?)),
    }
}

/// Best-effort record of a startup failure into the cluster-visible status
/// surface before the process exits non-zero.
async fn register_startup_error(cluster: &dyn ClusterClient, csp: CspInfo, error: &anyhow::Error) {
    if let Err(err) = cluster
        .update_user_notification(
            false,
            &format!("{STATUS_PREFIX} unable to start the adapter, check the adapter logs"),
        )
        .await
    {
        tracing::warn!(?err, "unable to push startup failure notification");
    }
    let document = SupportConfig::startup_failure(csp, error);
    match serde_json::to_vec(&document) {
        Ok(payload) => {
            if let Err(err) = cluster.update_compliance_document(payload).await {
                tracing::warn!(?err, "unable to publish startup failure document");
            }
        }
        Err(err) => tracing::warn!(?err, "unable to serialize startup failure document"),
    }
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}
