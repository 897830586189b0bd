use serde::Deserialize;
use serde_json::Value;

use crate::model::DataPoint;

/// Lazily yields the data points of an endpoint response, in upstream order.
///
/// A response without a `data` list yields nothing. Entries lacking a numeric
/// `value` are skipped.
pub fn data_points(response: &Value) -> impl Iterator<Item = DataPoint> + '_ {
    response
        .get("data")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| match DataPoint::deserialize(entry) {
            Ok(point) => Some(point),
            Err(e) => {
                tracing::debug!("skipping data point {}: {}", entry, e);
                None
            }
        })
}
