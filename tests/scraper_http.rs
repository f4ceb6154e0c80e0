use httpmock::prelude::*;

use marketplace_adapter::scraper::{DemandScraper, MetricsScraper};

#[tokio::test]
async fn scrape_sums_node_gauge_samples() {
    let server = MockServer::start_async().await;

    let metrics_mock = server.mock(|when, then| {
        when.method(GET).path("/metrics");
        then.status(200).body(concat!(
            "# HELP cluster_managed_nodes Managed node count per pool.\n",
            "# TYPE cluster_managed_nodes gauge\n",
            "cluster_managed_nodes{pool=\"default\"} 3\n",
            "cluster_managed_nodes{pool=\"gpu\"} 2\n",
        ));
    });

    let scraper = MetricsScraper::new(format!("{}/metrics", server.base_url())).unwrap();
    let counts = scraper.current_demand().await.unwrap();
    assert_eq!(counts.total, 5);
    metrics_mock.assert();
}

#[tokio::test]
async fn scrape_without_node_gauge_is_an_error() {
    let server = MockServer::start_async().await;

    server.mock(|when, then| {
        when.method(GET).path("/metrics");
        then.status(200).body("something_else 42\n");
    });

    let scraper = MetricsScraper::new(format!("{}/metrics", server.base_url())).unwrap();
    assert!(scraper.current_demand().await.is_err());
}

#[tokio::test]
async fn scrape_http_failure_surfaces() {
    let server = MockServer::start_async().await;

    server.mock(|when, then| {
        when.method(GET).path("/metrics");
        then.status(500);
    });

    let scraper = MetricsScraper::new(format!("{}/metrics", server.base_url())).unwrap();
    assert!(scraper.current_demand().await.is_err());
}
