//! Companion (handheld) side: answers update requests with weather data.
//!
//! The companion owns the weather source. On each request it asks its
//! [`WeatherProvider`] for the current report, stores the icon as an asset
//! and publishes a `/weather/info` data item. Where the provider gets its
//! data is its own business.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use sync_core::Theme;
use sync_types::{keys, DataItem, IncomingRecord, PeerId, WireError, WEATHER_REQUIRE_PATH};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::transport::{CompanionTransport, InboundRequest, TransportError};

/// Weather source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The source could not produce a report.
    #[error("weather source unavailable: {0}")]
    Unavailable(String),
}

/// Companion errors.
#[derive(Debug, Error)]
pub enum CompanionError {
    /// The weather source failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Publishing failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The item could not be built.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

/// Current conditions as reported by the weather source.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReport {
    /// Short condition description.
    pub condition: String,
    /// High temperature.
    pub high: f64,
    /// Low temperature.
    pub low: f64,
    /// Encoded icon image, if the source has one.
    pub icon: Option<Vec<u8>>,
}

/// Source of weather reports.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// The current report, or `None` if nothing is known yet.
    async fn current(&self) -> Result<Option<WeatherReport>, ProviderError>;
}

#[async_trait]
impl<P: WeatherProvider + ?Sized> WeatherProvider for Arc<P> {
    async fn current(&self) -> Result<Option<WeatherReport>, ProviderError> {
        (**self).current().await
    }
}

/// Provider returning whatever it was last given.
#[derive(Debug, Default)]
pub struct FixedProvider {
    report: Mutex<Option<WeatherReport>>,
    fail_next: Mutex<Option<String>>,
}

impl FixedProvider {
    /// Create a provider serving `report`.
    pub fn new(report: WeatherReport) -> Self {
        Self {
            report: Mutex::new(Some(report)),
            fail_next: Mutex::new(None),
        }
    }

    /// Replace the served report.
    pub fn set(&self, report: WeatherReport) {
        *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
    }

    /// Serve nothing.
    pub fn clear(&self) {
        *self.report.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Cause the next `current()` to fail.
    pub fn fail_next(&self, error: &str) {
        *self.fail_next.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
    }
}

#[async_trait]
impl WeatherProvider for FixedProvider {
    async fn current(&self) -> Result<Option<WeatherReport>, ProviderError> {
        if let Some(error) = self
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(ProviderError::Unavailable(error));
        }
        Ok(self
            .report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Answers weather update requests over a [`CompanionTransport`].
pub struct CompanionService<T: CompanionTransport, P: WeatherProvider, C: Clock> {
    transport: T,
    provider: P,
    clock: C,
    require_interval: Option<Duration>,
    theme: Option<Theme>,
    last_requester: Mutex<Option<PeerId>>,
}

impl<T: CompanionTransport, P: WeatherProvider, C: Clock> CompanionService<T, P, C> {
    /// Create a service publishing through `transport`.
    pub fn new(transport: T, provider: P, clock: C) -> Self {
        Self {
            transport,
            provider,
            clock,
            require_interval: None,
            theme: None,
            last_requester: Mutex::new(None),
        }
    }

    /// Ask wearables to refresh at this interval.
    pub fn with_require_interval(mut self, interval: Duration) -> Self {
        self.require_interval = Some(interval);
        self
    }

    /// Tell wearables which theme to use.
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = Some(theme);
        self
    }

    /// The transport this service publishes through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The wearable that asked most recently.
    pub fn last_requester(&self) -> Option<PeerId> {
        self.last_requester
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Answer one request.
    ///
    /// Returns the published item, or `None` if the request was for another
    /// topic or the provider had nothing to report.
    pub async fn handle_request(
        &self,
        request: &InboundRequest,
    ) -> Result<Option<DataItem>, CompanionError> {
        if request.path != WEATHER_REQUIRE_PATH {
            debug!(path = %request.path, "ignoring request on unrelated topic");
            return Ok(None);
        }
        *self
            .last_requester
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(request.source.clone());
        debug!(peer = %request.source, "weather requested");

        let Some(report) = self.provider.current().await? else {
            info!("no weather report available, nothing published");
            return Ok(None);
        };

        let produced_at = i64::try_from(self.clock.now().as_millis()).unwrap_or(i64::MAX);
        let mut record = IncomingRecord::new()
            .with_string(keys::CONDITION, report.condition)
            .with_double(keys::HIGH, report.high)
            .with_double(keys::LOW, report.low)
            .with_long(keys::UPDATE_TIME, produced_at);
        if let Some(icon) = report.icon {
            let asset = self.transport.put_asset(icon).await?;
            record = record.with_asset(keys::CONDITION_IMAGE, asset);
        }
        if let Some(interval) = self.require_interval {
            let millis = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
            record = record.with_long(keys::REQUIRE_INTERVAL, millis);
        }
        if let Some(theme) = self.theme {
            record = record.with_int(keys::THEME, i32::from(theme.value()));
        }

        let item = DataItem::weather(self.transport.local_peer().clone(), record);
        self.transport.put_data_item(item.clone()).await?;
        info!(peer = %request.source, fields = item.record.len(), "published weather");
        Ok(Some(item))
    }

    /// Serve requests until the link closes.
    pub async fn run(&self) {
        loop {
            match self.transport.recv_request().await {
                Ok(request) => {
                    if let Err(e) = self.handle_request(&request).await {
                        warn!(peer = %request.source, error = %e, "failed to answer weather request");
                    }
                }
                Err(TransportError::ConnectionClosed) => {
                    info!("request stream closed, companion stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "receiving request failed");
                }
            }
        }
    }
}
