pub mod catalog;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::EndpointMapping;
use crate::upstream::UpstreamError;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[async_trait]
pub trait DiscoveryEngine: Send + Sync {
    /// Builds a fresh mapping of the endpoints currently available.
    async fn find_endpoints(&self) -> Result<EndpointMapping, DiscoveryError>;
}
