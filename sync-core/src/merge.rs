//! Applying inbound records to the synchronized state.
//!
//! Merging never fails as a whole. Each recognized key is applied on its
//! own; a field that cannot be interpreted is skipped and reported, unknown
//! keys are ignored, and a blank string clears the field it names.

use std::time::Duration;
use sync_types::{keys, AssetRef, FieldValue, IncomingRecord, Timestamp};
use thiserror::Error;

use crate::snapshot::{Theme, WeatherSnapshot};

/// A single field that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Value has the wrong type for the key.
    #[error("field {key}: expected {expected}, got {actual}")]
    WrongType {
        /// Record key.
        key: &'static str,
        /// Type the key requires.
        expected: &'static str,
        /// Type that arrived.
        actual: &'static str,
    },
    /// Value has the right type but an unusable value.
    #[error("field {key}: value out of range: {value}")]
    OutOfRange {
        /// Record key.
        key: &'static str,
        /// The offending value, rendered.
        value: String,
    },
    /// Asset reference token is unusable.
    #[error("field {key}: invalid asset reference {token:?}")]
    InvalidAsset {
        /// Record key.
        key: &'static str,
        /// The offending token.
        token: String,
    },
}

/// Values a cleared configuration field falls back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeDefaults {
    /// Refresh interval restored when `require_interval` is cleared.
    pub refresh_interval: Duration,
    /// Theme restored when `theme` is cleared.
    pub theme: Theme,
}

/// What a merge did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Keys whose value was stored.
    pub applied: Vec<&'static str>,
    /// Keys cleared by a blank string.
    pub cleared: Vec<&'static str>,
    /// Fields skipped as malformed.
    pub skipped: Vec<FieldError>,
    /// Unrecognized keys.
    pub ignored: Vec<String>,
    /// Freshness timestamp now held by the state.
    pub received_at: Timestamp,
    /// True if `received_at` came from the record rather than the receipt time.
    pub stamped: bool,
    /// Asset that must be fetched, if the record named a new one.
    pub fetch: Option<AssetRef>,
    /// True if the refresh interval changed.
    pub interval_changed: bool,
}

impl MergeReport {
    fn new(received_at: Timestamp) -> Self {
        Self {
            applied: Vec::new(),
            cleared: Vec::new(),
            skipped: Vec::new(),
            ignored: Vec::new(),
            received_at,
            stamped: false,
            fetch: None,
            interval_changed: false,
        }
    }
}

fn wrong_type(key: &'static str, expected: &'static str, value: &FieldValue) -> FieldError {
    FieldError::WrongType {
        key,
        expected,
        actual: value.type_name(),
    }
}

fn temperature(key: &'static str, value: &FieldValue) -> Result<f64, FieldError> {
    let v = value
        .as_f64()
        .ok_or_else(|| wrong_type(key, "double", value))?;
    if !v.is_finite() {
        return Err(FieldError::OutOfRange {
            key,
            value: v.to_string(),
        });
    }
    Ok(v)
}

fn epoch_millis(key: &'static str, value: &FieldValue) -> Result<Timestamp, FieldError> {
    let v = value.as_i64().ok_or_else(|| wrong_type(key, "long", value))?;
    let millis = u64::try_from(v).map_err(|_| FieldError::OutOfRange {
        key,
        value: v.to_string(),
    })?;
    Ok(Timestamp::from_millis(millis))
}

fn interval(key: &'static str, value: &FieldValue) -> Result<Duration, FieldError> {
    let v = value.as_i64().ok_or_else(|| wrong_type(key, "int", value))?;
    match u64::try_from(v) {
        Ok(millis) if millis > 0 => Ok(Duration::from_millis(millis)),
        _ => Err(FieldError::OutOfRange {
            key,
            value: v.to_string(),
        }),
    }
}

fn theme(key: &'static str, value: &FieldValue) -> Result<Theme, FieldError> {
    let v = value.as_i64().ok_or_else(|| wrong_type(key, "int", value))?;
    u8::try_from(v)
        .map(Theme::new)
        .map_err(|_| FieldError::OutOfRange {
            key,
            value: v.to_string(),
        })
}

fn asset(key: &'static str, value: &FieldValue) -> Result<AssetRef, FieldError> {
    let asset = value
        .as_asset()
        .ok_or_else(|| wrong_type(key, "asset", value))?;
    asset.validate().map_err(|_| FieldError::InvalidAsset {
        key,
        token: asset.as_str().to_string(),
    })?;
    Ok(asset.clone())
}

/// Apply `record` to `state`.
///
/// `received_at` is the receipt time, used for freshness unless the record
/// carries `update_time`. Applying the same record twice with the same
/// receipt time leaves the state as applying it once did.
pub fn merge_record(
    state: &mut WeatherSnapshot,
    record: &IncomingRecord,
    received_at: Timestamp,
    defaults: &MergeDefaults,
) -> MergeReport {
    let mut report = MergeReport::new(received_at);

    for (key, value) in record.iter() {
        let blank = value.is_blank();
        let outcome: Result<&'static str, FieldError> = match key {
            keys::CONDITION => {
                let key = keys::CONDITION;
                if blank {
                    state.condition = None;
                    report.cleared.push(key);
                    continue;
                }
                match value.as_str() {
                    Some(s) => {
                        state.condition = Some(s.to_string());
                        Ok(key)
                    }
                    None => Err(wrong_type(key, "string", value)),
                }
            }
            keys::HIGH => {
                let key = keys::HIGH;
                if blank {
                    state.high = None;
                    report.cleared.push(key);
                    continue;
                }
                temperature(key, value).map(|v| {
                    state.high = Some(v);
                    key
                })
            }
            keys::LOW => {
                let key = keys::LOW;
                if blank {
                    state.low = None;
                    report.cleared.push(key);
                    continue;
                }
                temperature(key, value).map(|v| {
                    state.low = Some(v);
                    key
                })
            }
            keys::UPDATE_TIME => {
                let key = keys::UPDATE_TIME;
                if blank {
                    report.cleared.push(key);
                    continue;
                }
                epoch_millis(key, value).map(|at| {
                    report.received_at = at;
                    report.stamped = true;
                    key
                })
            }
            keys::REQUIRE_INTERVAL => {
                let key = keys::REQUIRE_INTERVAL;
                if blank {
                    report.interval_changed |= state.refresh_interval != defaults.refresh_interval;
                    state.refresh_interval = defaults.refresh_interval;
                    report.cleared.push(key);
                    continue;
                }
                interval(key, value).map(|next| {
                    report.interval_changed |= state.refresh_interval != next;
                    state.refresh_interval = next;
                    key
                })
            }
            keys::THEME => {
                let key = keys::THEME;
                if blank {
                    state.theme = defaults.theme;
                    report.cleared.push(key);
                    continue;
                }
                theme(key, value).map(|t| {
                    state.theme = t;
                    key
                })
            }
            keys::CONDITION_IMAGE => {
                let key = keys::CONDITION_IMAGE;
                if blank {
                    state.image.clear();
                    report.cleared.push(key);
                    continue;
                }
                asset(key, value).map(|asset| {
                    if state.image.request(&asset) {
                        report.fetch = Some(asset);
                    }
                    key
                })
            }
            other => {
                report.ignored.push(other.to_string());
                continue;
            }
        };

        match outcome {
            Ok(key) => report.applied.push(key),
            Err(err) => report.skipped.push(err),
        }
    }

    state.received_at = Some(report.received_at);
    report
}
