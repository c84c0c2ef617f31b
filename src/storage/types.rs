//! Core data types for the storage layer.
//!
//! - [`Measurement`] / [`Property`]: the wire shape accepted from clients
//! - [`MeasurementRecord`]: a measurement stamped with server-side metadata, ready to persist
//! - [`SqlValue`] / [`WriteOutcome`]: parameters and results of a single gateway write
//! - [`WritePolicy`]: how a measurement's properties are written

use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A single named, typed, unit-labelled value attached to a measurement.
///
/// `kind` is the wire field `type` (`int`, `float`, `string`). It is stored as
/// given and never validated against `value`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Property {
    #[serde(deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub value: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub units: String,
}

impl Property {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        kind: impl Into<String>,
        units: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: kind.into(),
            units: units.into(),
        }
    }
}

/// One reading as submitted by a client.
///
/// Missing or `null` fields fall back to their defaults and unknown fields
/// are ignored, so a client can never smuggle in a receipt time or source
/// address. A `null` entry in `properties` decodes as an empty property.
///
/// # Example
///
/// ```
/// use ingestd::Measurement;
///
/// let batch: Vec<Measurement> = serde_json::from_str(
///     r#"[{"unixtime": 1700000000.5, "properties": [{"key": "temp", "value": "21.5", "type": "float", "units": "C"}]}]"#,
/// )
/// .unwrap();
/// assert_eq!(batch[0].properties[0].kind, "float");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurement {
    /// Client-side time the reading was taken (seconds since epoch).
    #[serde(rename = "unixtime", deserialize_with = "null_as_default")]
    pub measured_unix_time: f64,
    #[serde(deserialize_with = "nullable_items")]
    pub properties: Vec<Property>,
}

/// Decode `null` as the type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Decode a possibly `null` array whose entries may also be `null`.
pub(crate) fn nullable_items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let items: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(items
        .unwrap_or_default()
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect())
}

/// A measurement enriched with server metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub measured_unix_time: f64,
    /// Server receipt time (seconds since epoch).
    pub received_unix_time: f64,
    /// Peer host the batch arrived from, port stripped.
    pub source_address: String,
    pub properties: Vec<Property>,
}

impl MeasurementRecord {
    /// Stamp a client measurement with server-side receipt time and address.
    pub fn stamp(measurement: Measurement, received_unix_time: f64, source_address: &str) -> Self {
        Self {
            measured_unix_time: measurement.measured_unix_time,
            received_unix_time,
            source_address: source_address.to_string(),
            properties: measurement.properties,
        }
    }
}

/// A bind parameter for [`crate::storage::StorageGateway::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Result of a single write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Row id generated by the statement (SQLite `last_insert_rowid`).
    pub last_insert_id: i64,
    pub rows_affected: u64,
}

/// Policy for writing a measurement's properties.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum WritePolicy {
    /// Measurement and all of its properties commit in one transaction.
    #[default]
    Atomic,
    /// Measurement row first, then one independent statement per property.
    /// Property failures are logged and reported, never fatal.
    BestEffort,
}
