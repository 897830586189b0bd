use futures::stream::{self, StreamExt, TryStreamExt};
use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType};
use thiserror::Error;

use crate::config::Config;
use crate::discovery::{DiscoveryEngine, DiscoveryError};
use crate::extract::data_points;
use crate::model::{DataPoint, Labels};
use crate::upstream::{MetricsApi, UpstreamError};

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("endpoint discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("fetching {name} failed: {source}")]
    Fetch { name: String, source: UpstreamError },
}

/// Re-polls the upstream service on every scrape. Nothing is kept between
/// cycles; each one starts from a fresh discovery.
pub struct Scraper<D, A> {
    discovery: D,
    api: A,
    prefix: String,
    date_offset: u64,
    concurrency: usize,
}

impl<D: DiscoveryEngine, A: MetricsApi> Scraper<D, A> {
    pub fn new(discovery: D, api: A, config: &Config) -> Self {
        Self {
            discovery,
            api,
            prefix: config.metric_prefix.clone(),
            date_offset: config.date_offset,
            concurrency: config.max_concurrent_fetches,
        }
    }

    /// Runs one collection cycle, producing a gauge family for every
    /// discovered endpoint, including those without data.
    pub async fn collect(&self, labels: &Labels) -> Result<Vec<MetricFamily>, ScrapeError> {
        let endpoints = self.discovery.find_endpoints().await?;

        stream::iter(endpoints)
            .map(|(name, identifier)| async move {
                let response = self
                    .api
                    .fetch(Some(identifier.as_str()), Some(self.date_offset))
                    .await
                    .map_err(|source| ScrapeError::Fetch {
                        name: name.clone(),
                        source,
                    })?;

                Ok::<_, ScrapeError>(self.gauge_family(&name, data_points(&response), labels))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    fn gauge_family(
        &self,
        name: &str,
        points: impl Iterator<Item = DataPoint>,
        labels: &Labels,
    ) -> MetricFamily {
        let mut family = MetricFamily::default();
        family.set_name(format!("{}{}", self.prefix, name));
        family.set_help(name.to_owned());
        family.set_field_type(MetricType::GAUGE);

        for point in points {
            let mut gauge = Gauge::default();
            gauge.set_value(point.value);

            let mut metric = Metric::default();
            metric.set_gauge(gauge);
            for (key, value) in labels {
                let mut pair = LabelPair::default();
                pair.set_name(key.clone());
                pair.set_value(value.clone());
                metric.mut_label().push(pair);
            }

            family.mut_metric().push(metric);
        }

        family
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::SecurityMode;
    use crate::discovery::catalog::CatalogDiscovery;
    use crate::upstream::fake::FakeApi;
    use crate::upstream::{UpstreamClient, DEFAULT_DATE_OFFSET};

    fn config() -> Config {
        Config {
            metric_prefix: "test_case_".into(),
            host_address: "https://localhost".into(),
            host_port: 8993,
            metric_api_location: "services/internal/metrics".into(),
            security: SecurityMode::Secure,
            ca_cert_path: Path::new("/nonexistent/ca.pem").to_path_buf(),
            bind_port: 9170,
            date_offset: DEFAULT_DATE_OFFSET,
            request_timeout: Duration::from_secs(1),
            max_concurrent_fetches: 2,
            labels: Labels::new(),
        }
    }

    fn host_labels() -> Labels {
        let mut labels = Labels::new();
        labels.insert("host".into(), "https://localhost".into());
        labels
    }

    fn scraper(api: FakeApi) -> Scraper<CatalogDiscovery<Arc<FakeApi>>, Arc<FakeApi>> {
        let api = Arc::new(api);
        Scraper::new(CatalogDiscovery::new(api.clone()), api, &config())
    }

    fn values(family: &MetricFamily) -> Vec<f64> {
        family
            .get_metric()
            .iter()
            .map(|m| m.get_gauge().get_value())
            .collect()
    }

    #[tokio::test]
    async fn empty_endpoint_still_gets_a_family() {
        let api = FakeApi::new(json!({"queryCount": "q"}))
            .with_endpoint("queryCount", json!({"title": "Empty"}));
        let families = scraper(api).collect(&host_labels()).await.unwrap();

        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_name(), "test_case_query_count");
        assert_eq!(families[0].get_help(), "query_count");
        assert_eq!(families[0].get_field_type(), MetricType::GAUGE);
        assert!(families[0].get_metric().is_empty());
    }

    #[tokio::test]
    async fn one_family_per_endpoint_with_fixed_labels() {
        let api = FakeApi::new(json!({"catalogQueries": "a", "catalogLatency": "b"}))
            .with_endpoint(
                "catalogQueries",
                json!({"data": [{"value": 1.0, "timestamp": "t1"}, {"value": 2.0, "timestamp": "t2"}]}),
            )
            .with_endpoint(
                "catalogLatency",
                json!({"data": [{"value": 0.5, "timestamp": "t1"}, {"value": 0.25, "timestamp": "t2"}]}),
            );
        let families = scraper(api).collect(&host_labels()).await.unwrap();

        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert_eq!(names, vec!["test_case_catalog_latency", "test_case_catalog_queries"]);
        assert_eq!(values(&families[0]), vec![0.5, 0.25]);
        assert_eq!(values(&families[1]), vec![1.0, 2.0]);

        for metric in families.iter().flat_map(|f| f.get_metric()) {
            let labels: Vec<(&str, &str)> = metric
                .get_label()
                .iter()
                .map(|l| (l.get_name(), l.get_value()))
                .collect();
            assert_eq!(labels, vec![("host", "https://localhost")]);
        }
    }

    #[tokio::test]
    async fn fetches_with_default_offset() {
        let api = Arc::new(FakeApi::new(json!({"queryCount": "q"})));
        let scraper = Scraper::new(CatalogDiscovery::new(api.clone()), api.clone(), &config());
        scraper.collect(&Labels::new()).await.unwrap();

        let calls = api.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![(None, None), (Some("queryCount".to_string()), Some(120))]
        );
    }

    #[tokio::test]
    async fn empty_catalog_yields_nothing() {
        let families = scraper(FakeApi::new(json!({})))
            .collect(&host_labels())
            .await
            .unwrap();
        assert!(families.is_empty());
    }

    #[tokio::test]
    async fn malformed_endpoint_fails_the_cycle() {
        let api = FakeApi::new(json!({"queryCount": "q"})).with_garbled("queryCount");
        let err = scraper(api).collect(&host_labels()).await.unwrap_err();

        match err {
            ScrapeError::Fetch { name, source } => {
                assert_eq!(name, "query_count");
                assert!(matches!(source, UpstreamError::Malformed { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_certificate_fails_the_cycle() {
        let client = UpstreamClient::new(&config());
        let scraper = Scraper::new(CatalogDiscovery::new(client.clone()), client, &config());

        let err = scraper.collect(&host_labels()).await.unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::Discovery(DiscoveryError::Upstream(UpstreamError::MissingCertificate { .. }))
        ));
    }
}
