use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::ForecastStore;
use crate::config::RuntimeConfig;
use crate::error::{
    AppError, ERROR_CODE_RUNTIME_FORECAST, ERROR_CODE_RUNTIME_GEOCODER,
    ERROR_CODE_USER_ADDRESS_NOT_FOUND,
};
use crate::geocoding::{AddressResolver, Geocoder};
use crate::model::{
    Coordinates, DailySummary, ForecastOutput, ForecastPeriod, ForecastRequest, FreshnessStatus,
    LocalityKey, LocationQuery, OutputLocation, OutputPeriod,
};
use crate::providers::{HttpTransport, ProviderError, weather_gov};
use crate::summary;

pub const ADDRESS_NOT_FOUND_MESSAGE: &str =
    "Could not process entered text. Please check that you are entering a valid address";
pub const NO_FORECAST_MESSAGE: &str = "No forecast available for this location";
pub const LARGE_ICON_SIZE: u32 = 300;

/// Result of one [`ForecastEngine::fetch`]. Failures are values, never panics
/// or early returns past the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastOutcome {
    Ready {
        periods: Vec<ForecastPeriod>,
        freshness: FreshnessStatus,
    },
    /// The point resolved, but weather.gov has no forecast for it.
    NoForecast,
    Failed(ProviderError),
}

impl ForecastOutcome {
    /// Empty unless the outcome is `Ready`.
    pub fn periods(&self) -> &[ForecastPeriod] {
        match self {
            Self::Ready { periods, .. } => periods,
            Self::NoForecast | Self::Failed(_) => &[],
        }
    }

    pub fn cached(&self) -> bool {
        matches!(
            self,
            Self::Ready {
                freshness: FreshnessStatus::Cached,
                ..
            }
        )
    }

    pub fn freshness(&self) -> Option<FreshnessStatus> {
        match self {
            Self::Ready { freshness, .. } => Some(*freshness),
            Self::NoForecast | Self::Failed(_) => None,
        }
    }

    /// End-user text for a failed fetch. `NoForecast` carries no message.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Failed(error) => Some(error.to_string()),
            Self::Ready { .. } | Self::NoForecast => None,
        }
    }

    pub fn summarize(&self) -> Vec<DailySummary> {
        summary::summarize(self.periods())
    }
}

/// Cache-first weather.gov client: store lookup, grid resolution, forecast
/// fetch, store write.
#[derive(Debug, Clone)]
pub struct ForecastEngine<T, S> {
    transport: T,
    store: S,
    endpoint: String,
    cache_ttl: Duration,
    now_fn: fn() -> DateTime<Utc>,
}

impl<T: HttpTransport, S: ForecastStore> ForecastEngine<T, S> {
    pub fn new(transport: T, store: S, endpoint: impl Into<String>, cache_ttl: Duration) -> Self {
        Self {
            transport,
            store,
            endpoint: endpoint.into(),
            cache_ttl,
            now_fn: Utc::now,
        }
    }

    pub fn from_config(transport: T, store: S, config: &RuntimeConfig) -> Self {
        Self::new(
            transport,
            store,
            config.weather_endpoint.clone(),
            config.cache_ttl(),
        )
    }

    pub fn with_clock(mut self, now_fn: fn() -> DateTime<Utc>) -> Self {
        self.now_fn = now_fn;
        self
    }

    pub fn fetch(&self, coordinates: Coordinates, locality: &LocalityKey) -> ForecastOutcome {
        let now = (self.now_fn)();
        let key = locality.cache_key();

        match self.store.read(&key, now) {
            Ok(Some(periods)) => {
                tracing::debug!(key = %key, "forecast cache hit");
                return ForecastOutcome::Ready {
                    periods,
                    freshness: FreshnessStatus::Cached,
                };
            }
            Ok(None) => tracing::debug!(key = %key, "forecast cache miss"),
            Err(error) => tracing::warn!(key = %key, %error, "forecast cache read failed"),
        }

        let periods = match self.fetch_live(coordinates) {
            Ok(Some(periods)) if !periods.is_empty() => periods,
            Ok(_) => {
                tracing::info!(%coordinates, "no forecast published for point");
                return ForecastOutcome::NoForecast;
            }
            Err(error) => {
                tracing::error!(%coordinates, %error, "forecast fetch failed");
                return ForecastOutcome::Failed(error);
            }
        };

        match self.store.write(&key, &periods, now, self.cache_ttl) {
            Ok(()) => tracing::info!(
                key = %key,
                periods = periods.len(),
                ttl_secs = self.cache_ttl.as_secs(),
                "forecast cached"
            ),
            Err(error) => tracing::warn!(key = %key, %error, "forecast cache write failed"),
        }

        ForecastOutcome::Ready {
            periods,
            freshness: FreshnessStatus::Live,
        }
    }

    fn fetch_live(
        &self,
        coordinates: Coordinates,
    ) -> Result<Option<Vec<ForecastPeriod>>, ProviderError> {
        let Some(forecast_url) =
            weather_gov::fetch_forecast_url(&self.transport, &self.endpoint, coordinates)?
        else {
            return Ok(None);
        };

        weather_gov::fetch_periods(&self.transport, &forecast_url).map(Some)
    }
}

/// Address or coordinates in, renderable forecast out.
pub fn resolve_forecast<G, T, S>(
    resolver: &AddressResolver<G>,
    engine: &ForecastEngine<T, S>,
    request: &ForecastRequest,
) -> Result<ForecastOutput, AppError>
where
    G: Geocoder,
    T: HttpTransport,
    S: ForecastStore,
{
    let (address, postal_code, coordinates) = match &request.location {
        LocationQuery::Address(text) => {
            let resolved = resolver
                .resolve(text)
                .map_err(|error| {
                    AppError::runtime(
                        ERROR_CODE_RUNTIME_GEOCODER,
                        format!("failed to resolve address '{text}': {error}"),
                    )
                })?
                .ok_or_else(|| {
                    AppError::user(ERROR_CODE_USER_ADDRESS_NOT_FOUND, ADDRESS_NOT_FOUND_MESSAGE)
                })?;
            (
                Some(resolved.formatted_address),
                resolved.postal_code,
                resolved.coordinates,
            )
        }
        LocationQuery::Coordinates {
            coordinates,
            postal_code,
        } => (None, postal_code.clone(), *coordinates),
    };

    let locality = LocalityKey::from_postal_code(postal_code.as_deref());
    let outcome = engine.fetch(coordinates, &locality);
    let summary = outcome.summarize();

    match outcome {
        ForecastOutcome::Ready { periods, freshness } if !periods.is_empty() => {
            Ok(build_output(
                OutputLocation {
                    address,
                    postal_code: locality.as_str().to_string(),
                    latitude: coordinates.latitude(),
                    longitude: coordinates.longitude(),
                },
                periods,
                freshness,
                summary,
            ))
        }
        ForecastOutcome::Failed(error) => Err(AppError::runtime(
            ERROR_CODE_RUNTIME_FORECAST,
            error.to_string(),
        )),
        ForecastOutcome::Ready { .. } | ForecastOutcome::NoForecast => Err(AppError::runtime(
            ERROR_CODE_RUNTIME_FORECAST,
            NO_FORECAST_MESSAGE,
        )),
    }
}

fn build_output(
    location: OutputLocation,
    periods: Vec<ForecastPeriod>,
    freshness: FreshnessStatus,
    summary: Vec<DailySummary>,
) -> ForecastOutput {
    ForecastOutput {
        location,
        freshness,
        periods: periods
            .into_iter()
            .map(|period| OutputPeriod {
                icon_large: period.large_icon_url(LARGE_ICON_SIZE),
                period,
            })
            .collect(),
        summary,
    }
}
