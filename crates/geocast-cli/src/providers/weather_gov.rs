//! api.weather.gov payloads: `/points/{lat},{lon}` yields a forecast URL,
//! which in turn yields the ordered forecast periods.

use serde::Deserialize;
use serde_json::Value;

use crate::model::{Coordinates, ForecastPeriod};

use super::{HttpTransport, ProviderError, validate_response};

#[derive(Debug, Deserialize)]
struct GridPointResponse {
    #[serde(default)]
    properties: Option<GridPointProperties>,
}

#[derive(Debug, Deserialize)]
struct GridPointProperties {
    #[serde(default)]
    forecast: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    properties: Option<ForecastProperties>,
}

#[derive(Debug, Deserialize)]
struct ForecastProperties {
    #[serde(default)]
    periods: Option<Vec<WirePeriod>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePeriod {
    #[serde(default)]
    name: String,
    temperature: i32,
    #[serde(default)]
    short_forecast: String,
    #[serde(default)]
    icon: String,
    start_time: String,
    #[serde(default)]
    probability_of_precipitation: Option<QuantitativeValue>,
}

#[derive(Debug, Deserialize)]
struct QuantitativeValue {
    #[serde(default)]
    value: Option<f64>,
}

impl From<WirePeriod> for ForecastPeriod {
    fn from(period: WirePeriod) -> Self {
        Self {
            name: period.name,
            temperature: period.temperature,
            short_forecast: period.short_forecast,
            icon: period.icon,
            start_time: period.start_time,
            precipitation_probability: period
                .probability_of_precipitation
                .and_then(|quantity| quantity.value)
                .map(clamp_percentage),
        }
    }
}

pub fn points_url(endpoint: &str, coordinates: Coordinates) -> String {
    format!("{endpoint}/points/{coordinates}")
}

/// Grid resolution. `Ok(None)` means the point has no forecast link.
pub fn fetch_forecast_url<T: HttpTransport>(
    transport: &T,
    endpoint: &str,
    coordinates: Coordinates,
) -> Result<Option<String>, ProviderError> {
    let response = transport.get(&points_url(endpoint, coordinates))?;
    let json = validate_response(&response)?;
    parse_grid_point(json)
}

pub fn fetch_periods<T: HttpTransport>(
    transport: &T,
    forecast_url: &str,
) -> Result<Vec<ForecastPeriod>, ProviderError> {
    let response = transport.get(forecast_url)?;
    let json = validate_response(&response)?;
    parse_forecast(json)
}

fn parse_grid_point(json: Value) -> Result<Option<String>, ProviderError> {
    let payload: GridPointResponse = serde_json::from_value(json)
        .map_err(|error| ProviderError::UnexpectedShape(format!("points payload: {error}")))?;

    Ok(payload
        .properties
        .and_then(|properties| properties.forecast)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty()))
}

fn parse_forecast(json: Value) -> Result<Vec<ForecastPeriod>, ProviderError> {
    let payload: ForecastResponse = serde_json::from_value(json)
        .map_err(|error| ProviderError::UnexpectedShape(format!("forecast payload: {error}")))?;

    let periods = payload
        .properties
        .and_then(|properties| properties.periods)
        .ok_or_else(|| {
            ProviderError::UnexpectedShape("forecast payload: missing periods".to_string())
        })?;

    Ok(periods.into_iter().map(ForecastPeriod::from).collect())
}

fn clamp_percentage(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.clamp(0.0, 100.0).round() as u8
}
