use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

/// Node totals scraped from the cluster metrics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeCounts {
    pub total: u64,
}

/// Produces the demand snapshot a reconciliation cycle starts from.
#[async_trait]
pub trait DemandScraper: Send + Sync {
    async fn current_demand(&self) -> Result<NodeCounts>;
}

static NODE_GAUGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^cluster_managed_nodes(?:\{[^}]*\})?\s+([0-9]+(?:\.[0-9]+)?)\s*$")
        .expect("node gauge pattern")
});

/// Scrapes the node-count gauge from the Prometheus text exposition.
pub struct MetricsScraper {
    client: reqwest::Client,
    endpoint: String,
}

impl MetricsScraper {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build metrics client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn for_hostname(hostname: &str) -> Result<Self> {
        Self::new(format!("https://{hostname}/metrics"))
    }
}

#[async_trait]
impl DemandScraper for MetricsScraper {
    async fn current_demand(&self) -> Result<NodeCounts> {
        let body = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .context("failed to contact metrics endpoint")?
            .error_for_status()
            .context("metrics endpoint rejected scrape")?
            .text()
            .await
            .context("failed to read metrics body")?;
        Ok(NodeCounts {
            total: parse_node_total(&body)?,
        })
    }
}

fn parse_node_total(body: &str) -> Result<u64> {
    let mut total = 0.0f64;
    let mut seen = false;
    for captures in NODE_GAUGE.captures_iter(body) {
        let value: f64 = captures[1]
            .parse()
            .with_context(|| format!("malformed node gauge sample '{}'", &captures[1]))?;
        total += value;
        seen = true;
    }
    if !seen {
        anyhow::bail!("metrics exposition carried no cluster_managed_nodes samples");
    }
    Ok(total.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::parse_node_total;

    #[test]
    fn sums_labelled_samples() {
        let body = concat!(
            "# HELP cluster_managed_nodes Managed node count per pool.\n",
            "# TYPE cluster_managed_nodes gauge\n",
            "cluster_managed_nodes{pool=\"default\"} 3\n",
            "cluster_managed_nodes{pool=\"gpu\"} 2\n",
            "other_metric 99\n",
        );
        assert_eq!(parse_node_total(body).unwrap(), 5);
    }

    #[test]
    fn accepts_bare_gauge() {
        assert_eq!(parse_node_total("cluster_managed_nodes 7\n").unwrap(), 7);
    }

    #[test]
    fn missing_gauge_is_an_error() {
        assert!(parse_node_total("something_else 3\n").is_err());
    }
}
