//! Keyed records carried by data items.
//!
//! A record is a flat map from field key to a typed value. Peers may send
//! keys this version does not know about; those are preserved here and
//! ignored by the merge.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::AssetRef;

/// Record keys understood by the weather merge.
pub mod keys {
    /// Short condition description (string).
    pub const CONDITION: &str = "condition";
    /// High temperature (double).
    pub const HIGH: &str = "high";
    /// Low temperature (double).
    pub const LOW: &str = "low";
    /// Condition icon (asset reference).
    pub const CONDITION_IMAGE: &str = "condition_image";
    /// When the companion produced the data (epoch millis, long).
    pub const UPDATE_TIME: &str = "update_time";
    /// Refresh interval the wearable should use (millis, integer).
    pub const REQUIRE_INTERVAL: &str = "require_interval";
    /// Theme selector (integer).
    pub const THEME: &str = "theme";
}

/// A typed value in an [`IncomingRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// UTF-8 string
    String(String),
    /// 64-bit float
    Double(f64),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// Reference to a binary asset
    Asset(AssetRef),
}

impl FieldValue {
    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Double(_) => "double",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Asset(_) => "asset",
        }
    }

    /// True for a string value that is empty or whitespace only.
    ///
    /// Blank strings mean "field cleared" for every key.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::String(s) if s.trim().is_empty())
    }

    /// The value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a float. Integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(f64::from(*v)),
            Self::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The value as an integer, if it is an int or long.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as an asset reference.
    pub fn as_asset(&self) -> Option<&AssetRef> {
        match self {
            Self::Asset(asset) => Some(asset),
            _ => None,
        }
    }
}

/// Inbound payload of a data item: field key to typed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncomingRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl IncomingRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    /// Add a string field.
    pub fn with_string(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, FieldValue::String(value.into()));
        self
    }

    /// Add a double field.
    pub fn with_double(mut self, key: &str, value: f64) -> Self {
        self.insert(key, FieldValue::Double(value));
        self
    }

    /// Add an integer field.
    pub fn with_int(mut self, key: &str, value: i32) -> Self {
        self.insert(key, FieldValue::Int(value));
        self
    }

    /// Add a long field.
    pub fn with_long(mut self, key: &str, value: i64) -> Self {
        self.insert(key, FieldValue::Long(value));
        self
    }

    /// Add an asset reference field.
    pub fn with_asset(mut self, key: &str, asset: AssetRef) -> Self {
        self.insert(key, FieldValue::Asset(asset));
        self
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Check whether a field is present.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Iterate fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
