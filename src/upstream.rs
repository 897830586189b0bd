use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{Config, SecurityMode};

/// Lookback used for per-endpoint queries; anything shorter may find no
/// record while the upstream is still collecting.
pub const DEFAULT_DATE_OFFSET: u64 = 120;

static FILE_EXT: &str = ".json";
static SECURE_SCHEME: &str = "https://";

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error(
        "secure metric connections are enabled but no CA certificate was found at {}; \
         either set SECURE to \"False\" or place a certificate at the path named by CA_CERT_PATH",
        .path.display()
    )]
    MissingCertificate { path: PathBuf },
    #[error("could not read CA certificate {}: {source}", .path.display())]
    Certificate {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid CA certificate {}: {reason}", .path.display())]
    InvalidCertificate { path: PathBuf, reason: String },
    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("malformed response from {url}: {source}")]
    Malformed {
        url: String,
        source: serde_json::Error,
    },
}

/// Source of raw metric payloads.
#[async_trait]
pub trait MetricsApi: Send + Sync {
    /// Fetches the catalog when `identifier` is `None`, otherwise the data of
    /// that endpoint, looking back `offset` seconds when given.
    ///
    /// Transport failures resolve to an empty object.
    async fn fetch(&self, identifier: Option<&str>, offset: Option<u64>)
        -> Result<Value, UpstreamError>;
}

#[async_trait]
impl<T: MetricsApi + ?Sized> MetricsApi for Arc<T> {
    async fn fetch(
        &self,
        identifier: Option<&str>,
        offset: Option<u64>,
    ) -> Result<Value, UpstreamError> {
        (**self).fetch(identifier, offset).await
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Verification {
    Skip,
    CaBundle(PathBuf),
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    api_base: String,
    security: SecurityMode,
    ca_cert_path: PathBuf,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Self {
        Self {
            api_base: config.api_base(),
            security: config.security,
            ca_cert_path: config.ca_cert_path.clone(),
            timeout: config.request_timeout,
        }
    }

    fn url_for(&self, identifier: Option<&str>) -> String {
        match identifier {
            Some(id) => format!("{}{}{}", self.api_base, id, FILE_EXT),
            None => self.api_base.clone(),
        }
    }

    fn verification(&self, url: &str) -> Result<Verification, UpstreamError> {
        if self.security == SecurityMode::Insecure || !url.starts_with(SECURE_SCHEME) {
            return Ok(Verification::Skip);
        }

        if Path::new(&self.ca_cert_path).is_file() {
            Ok(Verification::CaBundle(self.ca_cert_path.clone()))
        } else {
            Err(UpstreamError::MissingCertificate {
                path: self.ca_cert_path.clone(),
            })
        }
    }

    async fn http_client(&self, verification: Verification) -> Result<reqwest::Client, UpstreamError> {
        let builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout);

        let builder = match verification {
            Verification::Skip => builder.danger_accept_invalid_certs(true),
            Verification::CaBundle(path) => load_bundle(&path)
                .await?
                .into_iter()
                .fold(builder, |builder, cert| builder.add_root_certificate(cert)),
        };

        builder.build().map_err(UpstreamError::Client)
    }
}

/// Reads every certificate of a PEM bundle, failing when there are none.
async fn load_bundle(path: &Path) -> Result<Vec<reqwest::Certificate>, UpstreamError> {
    let pem = tokio::fs::read(path)
        .await
        .map_err(|source| UpstreamError::Certificate {
            path: path.to_path_buf(),
            source,
        })?;

    let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
        UpstreamError::InvalidCertificate {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;

    if certs.is_empty() {
        return Err(UpstreamError::InvalidCertificate {
            path: path.to_path_buf(),
            reason: "no PEM certificates found".into(),
        });
    }
    Ok(certs)
}

fn empty() -> Value {
    Value::Object(Map::new())
}

#[async_trait]
impl MetricsApi for UpstreamClient {
    async fn fetch(
        &self,
        identifier: Option<&str>,
        offset: Option<u64>,
    ) -> Result<Value, UpstreamError> {
        let url = self.url_for(identifier);
        let client = self.http_client(self.verification(&url)?).await?;

        let mut request = client.get(&url);
        if let (Some(_), Some(offset)) = (identifier, offset) {
            request = request.query(&[("dateOffset", offset)]);
        }

        // DNS failure, refused connection, timeout, redirect loop
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("request to {} failed: {}", url, e);
                return Ok(empty());
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("{} answered {}, treating as no data", url, status);
            return Ok(empty());
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("reading response from {} failed: {}", url, e);
                return Ok(empty());
            }
        };

        serde_json::from_slice(&body).map_err(|source| UpstreamError::Malformed { url, source })
    }
}
