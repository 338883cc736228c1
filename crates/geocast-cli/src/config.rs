use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const FORECAST_CACHE_TTL_SECS: u64 = 30 * 60;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

pub const WEATHER_GOV_ENDPOINT: &str = "https://api.weather.gov";
pub const NOMINATIM_SEARCH_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

// weather.gov has no API keys; it asks every client to identify itself instead.
pub const DEFAULT_API_CLIENT: &str = "nils-geocast";
pub const DEFAULT_API_CONTACT: &str = "https://github.com/sympoies/nils-geocast";

pub const GEOCAST_CACHE_DIR_ENV: &str = "GEOCAST_CACHE_DIR";
pub const GEOCAST_CACHE_TTL_SECS_ENV: &str = "GEOCAST_CACHE_TTL_SECS";
pub const GEOCAST_WEATHER_ENDPOINT_ENV: &str = "GEOCAST_WEATHER_ENDPOINT";
pub const GEOCAST_GEOCODER_ENDPOINT_ENV: &str = "GEOCAST_GEOCODER_ENDPOINT";
pub const GEOCAST_API_CLIENT_ENV: &str = "GEOCAST_API_CLIENT";
pub const GEOCAST_API_CONTACT_ENV: &str = "GEOCAST_API_CONTACT";
pub const GEOCAST_TIMEOUT_SECS_ENV: &str = "GEOCAST_TIMEOUT_SECS";
pub const GEOCAST_LOG_ENV: &str = "GEOCAST_LOG";
const HOME_ENV: &str = "HOME";

pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub cache_dir: PathBuf,
    pub cache_ttl_secs: u64,
    pub weather_endpoint: String,
    pub geocoder_endpoint: String,
    pub api_client: String,
    pub api_contact: String,
    pub timeout_secs: u64,
    pub log_filter: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub(crate) fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            cache_dir: resolve_cache_dir(&map),
            cache_ttl_secs: resolve_positive_secs(
                &map,
                GEOCAST_CACHE_TTL_SECS_ENV,
                FORECAST_CACHE_TTL_SECS,
            ),
            weather_endpoint: resolve_string(&map, GEOCAST_WEATHER_ENDPOINT_ENV)
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| WEATHER_GOV_ENDPOINT.to_string()),
            geocoder_endpoint: resolve_string(&map, GEOCAST_GEOCODER_ENDPOINT_ENV)
                .unwrap_or_else(|| NOMINATIM_SEARCH_ENDPOINT.to_string()),
            api_client: resolve_string(&map, GEOCAST_API_CLIENT_ENV)
                .unwrap_or_else(|| DEFAULT_API_CLIENT.to_string()),
            api_contact: resolve_string(&map, GEOCAST_API_CONTACT_ENV)
                .unwrap_or_else(|| DEFAULT_API_CONTACT.to_string()),
            timeout_secs: resolve_positive_secs(
                &map,
                GEOCAST_TIMEOUT_SECS_ENV,
                REQUEST_TIMEOUT_SECS,
            ),
            log_filter: resolve_string(&map, GEOCAST_LOG_ENV)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    /// `User-Agent` value in the `(application, contact)` form weather.gov asks for.
    pub fn user_agent(&self) -> String {
        format!("({}, {})", self.api_client, self.api_contact)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn resolve_string(env_map: &HashMap<String, String>, key: &str) -> Option<String> {
    env_map
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn resolve_cache_dir(env_map: &HashMap<String, String>) -> PathBuf {
    let home = env_map.get(HOME_ENV).map(String::as_str);
    resolve_string(env_map, GEOCAST_CACHE_DIR_ENV)
        .map(|value| expand_home_path(&value, home))
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("nils-geocast-cli"))
}

fn expand_home_path(raw: &str, home: Option<&str>) -> String {
    let trimmed = raw.trim();
    let Some(home) = home.map(str::trim).filter(|value| !value.is_empty()) else {
        return trimmed.to_string();
    };

    let home = home.trim_end_matches('/');
    let mut expanded = trimmed.replace("$HOME", home);

    if expanded == "~" {
        expanded = home.to_string();
    } else if let Some(rest) = expanded.strip_prefix("~/") {
        expanded = format!("{home}/{rest}");
    }

    expanded
}

fn resolve_positive_secs(env_map: &HashMap<String, String>, key: &str, default: u64) -> u64 {
    resolve_string(env_map, key)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
