use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::geocoding::{GeocodeCandidate, Geocoder};

use super::{HttpTransport, ProviderError, validate_response};

const RESULT_LIMIT: &str = "5";

#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: String,
    lon: String,
    #[serde(default)]
    address: Option<SearchAddress>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchAddress {
    house_number: Option<String>,
    road: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    county: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
}

/// OpenStreetMap Nominatim forward search.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder<T> {
    transport: T,
    endpoint: String,
}

impl<T: HttpTransport> NominatimGeocoder<T> {
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }
}

impl<T: HttpTransport> Geocoder for NominatimGeocoder<T> {
    fn search(&self, text: &str) -> Result<Vec<GeocodeCandidate>, ProviderError> {
        let url = search_url(&self.endpoint, text)?;
        let response = self.transport.get(&url)?;
        let json = validate_response(&response)?;
        parse_search_results(json)
    }
}

fn search_url(endpoint: &str, text: &str) -> Result<String, ProviderError> {
    Url::parse_with_params(
        endpoint,
        &[
            ("q", text),
            ("format", "jsonv2"),
            ("addressdetails", "1"),
            ("limit", RESULT_LIMIT),
        ],
    )
    .map(|url| url.to_string())
    .map_err(|error| ProviderError::Transport(format!("invalid geocoder endpoint: {error}")))
}

fn parse_search_results(json: Value) -> Result<Vec<GeocodeCandidate>, ProviderError> {
    let results: Vec<SearchResult> = serde_json::from_value(json)
        .map_err(|error| ProviderError::UnexpectedShape(format!("geocode payload: {error}")))?;

    let mut results = results.into_iter();
    let Some(first) = results.next() else {
        return Ok(Vec::new());
    };

    // Only the first match must be well formed; later ones are dropped if not.
    let mut candidates = vec![into_candidate(first)?];
    candidates.extend(results.filter_map(|result| {
        into_candidate(result)
            .inspect_err(|error| tracing::debug!(%error, "skipping geocode candidate"))
            .ok()
    }));
    Ok(candidates)
}

fn into_candidate(result: SearchResult) -> Result<GeocodeCandidate, ProviderError> {
    let latitude = parse_degrees(&result.lat, "lat")?;
    let longitude = parse_degrees(&result.lon, "lon")?;
    let address = result.address.unwrap_or_default();

    Ok(GeocodeCandidate {
        latitude,
        longitude,
        house_number: address.house_number,
        street: address.road,
        city: address.city.or(address.town).or(address.village),
        county: address.county,
        state: address.state,
        postal_code: address.postcode,
    })
}

fn parse_degrees(raw: &str, field: &str) -> Result<f64, ProviderError> {
    raw.trim().parse::<f64>().map_err(|_| {
        ProviderError::UnexpectedShape(format!("geocode payload: invalid {field} '{raw}'"))
    })
}
