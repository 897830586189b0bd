use async_trait::async_trait;

use super::{DiscoveryEngine, DiscoveryError};
use crate::model::EndpointMapping;
use crate::normalize::camel_to_snake;
use crate::upstream::MetricsApi;

/// Discovers endpoints from the keys of the upstream metrics catalog.
#[derive(Debug, Clone)]
pub struct CatalogDiscovery<A> {
    api: A,
}

impl<A: MetricsApi> CatalogDiscovery<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<A: MetricsApi> DiscoveryEngine for CatalogDiscovery<A> {
    async fn find_endpoints(&self) -> Result<EndpointMapping, DiscoveryError> {
        let catalog = self.api.fetch(None, None).await?;

        let endpoints: EndpointMapping = match catalog.as_object() {
            Some(entries) => entries
                .keys()
                .map(|identifier| (camel_to_snake(identifier), identifier.clone()))
                .collect(),
            None => {
                tracing::warn!("metrics catalog is not an object: {}", catalog);
                EndpointMapping::new()
            }
        };

        tracing::info!("discovered {} endpoints", endpoints.len());
        Ok(endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::upstream::fake::FakeApi;

    #[tokio::test]
    async fn empty_catalog() {
        let discovery = CatalogDiscovery::new(FakeApi::new(json!({})));
        assert!(discovery.find_endpoints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn maps_normalized_names() {
        let discovery = CatalogDiscovery::new(FakeApi::new(json!({"fakeItemA": "a", "fakeItemB": "b"})));
        let endpoints = discovery.find_endpoints().await.unwrap();

        let expected: EndpointMapping = vec![
            ("fake_item_a".to_string(), "fakeItemA".to_string()),
            ("fake_item_b".to_string(), "fakeItemB".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(endpoints, expected);
    }

    #[tokio::test]
    async fn non_object_catalog_is_empty() {
        let discovery = CatalogDiscovery::new(FakeApi::new(json!(["fakeItemA"])));
        assert!(discovery.find_endpoints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn discovery_requests_without_offset() {
        let api = FakeApi::new(json!({"fakeItemA": "a"}));
        let discovery = CatalogDiscovery::new(api);
        discovery.find_endpoints().await.unwrap();

        let calls = discovery.api.calls.lock().unwrap();
        assert_eq!(*calls, vec![(None, None)]);
    }
}
