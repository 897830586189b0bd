use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// Normalized metric name -> upstream identifier, rebuilt on every scrape.
pub type EndpointMapping = BTreeMap<String, String>;

/// Fixed label set applied to every sample of a collection cycle.
pub type Labels = BTreeMap<String, String>;

/// One entry of an endpoint's `data` list. The timestamp is opaque and may
/// hold any JSON value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataPoint {
    pub value: f64,
    pub timestamp: Option<Value>,
}
