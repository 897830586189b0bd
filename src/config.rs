use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use regex::Regex;
use structopt::StructOpt;
use thiserror::Error;

use crate::model::Labels;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("unrecognized security mode {0:?}, expected \"True\" or \"False\"")]
    SecurityMode(String),
    #[error("malformed label {0:?}, expected KEY=VALUE with KEY matching [a-zA-Z_][a-zA-Z0-9_]*")]
    Label(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Whether upstream certificates are verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    Secure,
    Insecure,
}

impl FromStr for SecurityMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(SecurityMode::Secure),
            "false" => Ok(SecurityMode::Insecure),
            _ => Err(ConfigError::SecurityMode(s.to_owned())),
        }
    }
}

lazy_static! {
    static ref LABEL_NAME: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
}

fn parse_label(s: &str) -> Result<(String, String), ConfigError> {
    match s.find('=') {
        Some(idx) if LABEL_NAME.is_match(&s[..idx]) => {
            Ok((s[..idx].to_owned(), s[idx + 1..].to_owned()))
        }
        _ => Err(ConfigError::Label(s.to_owned())),
    }
}

#[derive(StructOpt, Debug, Clone)]
#[structopt(about = "Exports DDF internal metrics for Prometheus")]
pub struct Command {
    /// Prefix prepended to every exported metric name
    #[structopt(long, env = "METRIC_PREFIX", default_value = "ddf_")]
    pub metric_prefix: String,

    /// Scheme and host of the upstream service
    #[structopt(long, env = "HOST_ADDRESS", default_value = "https://localhost")]
    pub host_address: String,

    #[structopt(long, env = "HOST_PORT", default_value = "8993")]
    pub host_port: u16,

    /// Path of the metrics API on the upstream service
    #[structopt(long, env = "METRIC_API_LOCATION", default_value = "services/internal/metrics")]
    pub metric_api_location: String,

    /// "True" to verify upstream certificates, "False" to skip verification
    #[structopt(long, env = "SECURE", default_value = "True")]
    pub secure: SecurityMode,

    /// CA bundle used to verify the upstream service in secure mode
    #[structopt(long, env = "CA_CERT_PATH", default_value = "/certs/ca.pem", parse(from_os_str))]
    pub ca_cert_path: PathBuf,

    /// Local port serving /metrics
    #[structopt(long, env = "BIND_PORT", default_value = "9170")]
    pub bind_port: u16,

    /// Seconds into the past the upstream searches for data points
    #[structopt(long, env = "DATE_OFFSET", default_value = "120")]
    pub date_offset: u64,

    /// Timeout in seconds for each upstream request
    #[structopt(long, env = "REQUEST_TIMEOUT", default_value = "10")]
    pub request_timeout: u64,

    #[structopt(long, env = "MAX_CONCURRENT_FETCHES", default_value = "4")]
    pub max_concurrent_fetches: usize,

    /// Extra KEY=VALUE label attached to every sample
    #[structopt(long = "label", number_of_values = 1, parse(try_from_str = parse_label))]
    pub labels: Vec<(String, String)>,
}

/// Validated settings, immutable for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub metric_prefix: String,
    pub host_address: String,
    pub host_port: u16,
    pub metric_api_location: String,
    pub security: SecurityMode,
    pub ca_cert_path: PathBuf,
    pub bind_port: u16,
    pub date_offset: u64,
    pub request_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub labels: Labels,
}

impl Config {
    pub fn from_command(cmd: Command) -> Result<Self, ConfigError> {
        if cmd.request_timeout == 0 {
            return Err(ConfigError::Zero("request timeout"));
        }
        if cmd.max_concurrent_fetches == 0 {
            return Err(ConfigError::Zero("max concurrent fetches"));
        }

        let mut labels = Labels::new();
        labels.insert("host".into(), cmd.host_address.clone());
        labels.extend(cmd.labels);

        Ok(Config {
            metric_prefix: cmd.metric_prefix,
            host_address: cmd.host_address,
            host_port: cmd.host_port,
            metric_api_location: cmd.metric_api_location,
            security: cmd.secure,
            ca_cert_path: cmd.ca_cert_path,
            bind_port: cmd.bind_port,
            date_offset: cmd.date_offset,
            request_timeout: Duration::from_secs(cmd.request_timeout),
            max_concurrent_fetches: cmd.max_concurrent_fetches,
            labels,
        })
    }

    /// Base url of the metrics API, always ending in a slash.
    pub fn api_base(&self) -> String {
        format!(
            "{}:{}/{}/",
            self.host_address.trim_end_matches('/'),
            self.host_port,
            self.metric_api_location.trim_matches('/')
        )
    }
}
