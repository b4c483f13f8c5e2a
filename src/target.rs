use chrono::{DateTime, Utc};
use geoposition::GeoPosition;
use serde_json::Value;

use crate::store::StoreError;

/// The remotely reported position, as published under the target record.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetRecord {
    pub position: GeoPosition,
    /// Producer-defined tag, e.g. the kind of beacon.
    pub kind: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TargetRecord {
    /// Decodes a record with `lat`, the longitude under `longitude_key`, and optionally
    /// `type` and `timestamp` (milliseconds since the epoch).
    pub fn decode(record: &Value, longitude_key: &str) -> Result<Self, StoreError> {
        let Value::Object(fields) = record else {
            return Err(StoreError::Malformed("target record is not an object".to_owned()));
        };

        let coordinate = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_f64)
                .ok_or_else(|| StoreError::Malformed(format!("`{key}` is missing or not a number")))
        };

        let position = GeoPosition::new(coordinate("lat")?, coordinate(longitude_key)?);
        if !position.is_valid() {
            return Err(StoreError::Malformed(format!(
                "coordinates out of range: {position}"
            )));
        }

        let kind = fields
            .get("type")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned);

        let timestamp = fields
            .get("timestamp")
            .and_then(Value::as_i64)
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        Ok(Self {
            position,
            kind,
            timestamp,
        })
    }
}
