use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::Config;

/// A single field value. JSON-native scalars only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::Float(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_owned())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FieldValueError {
    #[error("unsupported JSON value for a field: {0}")]
    Unsupported(&'static str),

    #[error("integer out of range for a field: {0}")]
    OutOfRange(u64),
}

impl TryFrom<serde_json::Value> for FieldValue {
    type Error = FieldValueError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        match value {
            Value::Bool(b) => Ok(FieldValue::Bool(b)),
            Value::String(s) => Ok(FieldValue::String(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(FieldValue::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Err(FieldValueError::OutOfRange(u))
                } else {
                    // as_f64 only fails for arbitrary-precision numbers
                    n.as_f64()
                        .map(FieldValue::Float)
                        .ok_or(FieldValueError::Unsupported("number"))
                }
            }
            Value::Null => Err(FieldValueError::Unsupported("null")),
            Value::Array(_) => Err(FieldValueError::Unsupported("array")),
            Value::Object(_) => Err(FieldValueError::Unsupported("object")),
        }
    }
}

/// Where a batch goes. Events with equal keys share a buffer, a timer and
/// a request; events with different keys never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationKey {
    pub api_host: Url,
    pub write_key: String,
    pub dataset: String,
}

/// One telemetry event.
///
/// Routing metadata is public so it can be overridden per event; fields are
/// only reachable through [`Event::add`] and the read accessors.
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub write_key: Option<String>,
    pub dataset: Option<String>,
    pub api_host: Url,
    pub sample_rate: u32,
    fields: HashMap<String, FieldValue>,
}

impl Event {
    /// An empty event stamped with the current time and the config's
    /// routing defaults.
    pub fn new(config: &Config) -> Self {
        Self {
            timestamp: Utc::now(),
            write_key: config.write_key.clone(),
            dataset: config.dataset.clone(),
            api_host: config.api_host.clone(),
            sample_rate: config.sample_rate,
            fields: HashMap::new(),
        }
    }

    /// Like [`Event::new`], seeded with `fields`.
    pub fn with_fields<I, K>(config: &Config, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        let mut event = Self::new(config);
        event.extend(fields);
        event
    }

    /// Insert or replace a field.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Merge fields into the event; incoming values win.
    pub fn extend<I, K>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        self.fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v)));
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &HashMap<String, FieldValue> {
        &self.fields
    }

    /// The buffering key, or `None` when the write key or dataset is
    /// missing or empty.
    pub fn destination(&self) -> Option<DestinationKey> {
        let write_key = self.write_key.as_deref().filter(|s| !s.is_empty())?;
        let dataset = self.dataset.as_deref().filter(|s| !s.is_empty())?;
        Some(DestinationKey {
            api_host: self.api_host.clone(),
            write_key: write_key.to_owned(),
            dataset: dataset.to_owned(),
        })
    }
}
