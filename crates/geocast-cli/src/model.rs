use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Locality used when a lookup has no postal code. Unrelated localities
/// without postal codes share this cache partition.
pub const DEFAULT_LOCALITY: &str = "00000";

const COORDINATE_SCALE: f64 = 10_000.0;

/// Latitude/longitude pair rounded to the 4 decimal digits weather.gov accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: round4(latitude),
            longitude: round4(longitude),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

fn round4(value: f64) -> f64 {
    (value * COORDINATE_SCALE).round() / COORDINATE_SCALE
}

/// Cache partition for a forecast: the postal code, or [`DEFAULT_LOCALITY`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalityKey(String);

impl LocalityKey {
    pub fn from_postal_code(postal_code: Option<&str>) -> Self {
        let value = postal_code
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_LOCALITY);
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn cache_key(&self) -> String {
        format!("weather_forecast:{}", self.0)
    }
}

impl fmt::Display for LocalityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAddress {
    pub formatted_address: String,
    pub postal_code: Option<String>,
    pub coordinates: Coordinates,
}

impl ResolvedAddress {
    pub fn locality_key(&self) -> LocalityKey {
        LocalityKey::from_postal_code(self.postal_code.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastPeriod {
    pub name: String,
    pub temperature: i32,
    pub short_forecast: String,
    pub icon: String,
    pub start_time: String,
    #[serde(default)]
    pub precipitation_probability: Option<u8>,
}

impl ForecastPeriod {
    /// Icon URL with weather.gov's `size=medium` swapped for `size`.
    pub fn large_icon_url(&self, size: u32) -> String {
        self.icon.replace("=medium", &format!("={size}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub high_temp: i32,
    pub low_temp: i32,
    pub avg_chance_of_rain: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessStatus {
    Live,
    Cached,
}

impl FreshnessStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Live => "Live results",
            Self::Cached => "Cached results",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputLocation {
    pub address: Option<String>,
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputPeriod {
    #[serde(flatten)]
    pub period: ForecastPeriod,
    pub icon_large: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastOutput {
    pub location: OutputLocation,
    pub freshness: FreshnessStatus,
    pub periods: Vec<OutputPeriod>,
    pub summary: Vec<DailySummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Json,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    Address(String),
    Coordinates {
        coordinates: Coordinates,
        postal_code: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub location: LocationQuery,
    pub output_mode: OutputMode,
}

impl ForecastRequest {
    pub fn new(
        address: Option<&str>,
        lat: Option<f64>,
        lon: Option<f64>,
        postal_code: Option<&str>,
        output_mode: OutputMode,
    ) -> Result<Self, ValidationError> {
        let has_address = address.is_some();
        let has_coords = lat.is_some() || lon.is_some();

        if has_address && has_coords {
            return Err(ValidationError::ConflictingLocationInput);
        }
        if has_address && postal_code.is_some() {
            return Err(ValidationError::PostalCodeWithoutCoordinates);
        }

        let location = match (address, lat, lon) {
            (Some(raw_address), None, None) => {
                LocationQuery::Address(normalize_address(raw_address)?)
            }
            (None, Some(lat), Some(lon)) => {
                validate_coordinates(lat, lon)?;
                LocationQuery::Coordinates {
                    coordinates: Coordinates::new(lat, lon),
                    postal_code: postal_code
                        .map(str::trim)
                        .filter(|value| !value.is_empty())
                        .map(str::to_string),
                }
            }
            (None, None, None) => return Err(ValidationError::MissingLocationInput),
            (None, _, _) => return Err(ValidationError::PartialCoordinates),
            (Some(_), _, _) => return Err(ValidationError::ConflictingLocationInput),
        };

        Ok(Self {
            location,
            output_mode,
        })
    }
}

pub fn normalize_address(raw: &str) -> Result<String, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::EmptyAddress);
    }
    Ok(value.to_string())
}

pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), ValidationError> {
    if !((-90.0)..=90.0).contains(&lat) {
        return Err(ValidationError::InvalidLatitude(lat));
    }
    if !((-180.0)..=180.0).contains(&lon) {
        return Err(ValidationError::InvalidLongitude(lon));
    }
    Ok(())
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("missing location input: use --address or --lat/--lon")]
    MissingLocationInput,
    #[error("partial coordinates: provide both --lat and --lon")]
    PartialCoordinates,
    #[error("conflicting location input: use either --address or --lat/--lon")]
    ConflictingLocationInput,
    #[error("--postal-code only applies to --lat/--lon lookups")]
    PostalCodeWithoutCoordinates,
    #[error("Please enter address")]
    EmptyAddress,
    #[error("invalid latitude: {0}")]
    InvalidLatitude(f64),
    #[error("invalid longitude: {0}")]
    InvalidLongitude(f64),
}
