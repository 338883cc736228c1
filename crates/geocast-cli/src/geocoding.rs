use crate::model::{Coordinates, ResolvedAddress};
use crate::providers::ProviderError;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeocodeCandidate {
    pub latitude: f64,
    pub longitude: f64,
    pub house_number: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

pub trait Geocoder {
    fn search(&self, text: &str) -> Result<Vec<GeocodeCandidate>, ProviderError>;
}

impl<G: Geocoder + ?Sized> Geocoder for &G {
    fn search(&self, text: &str) -> Result<Vec<GeocodeCandidate>, ProviderError> {
        (**self).search(text)
    }
}

/// Turns free text into the first geocoder match.
#[derive(Debug, Clone)]
pub struct AddressResolver<G> {
    geocoder: G,
}

impl<G: Geocoder> AddressResolver<G> {
    pub fn new(geocoder: G) -> Self {
        Self { geocoder }
    }

    /// `Ok(None)` when the address is blank or nothing matched. Blank input
    /// never reaches the geocoder.
    pub fn resolve(&self, address: &str) -> Result<Option<ResolvedAddress>, ProviderError> {
        let query = address.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let candidates = self.geocoder.search(query).inspect_err(|error| {
            tracing::error!(%error, "geocoder search failed");
        })?;

        let Some(first) = candidates.into_iter().next() else {
            tracing::debug!(query, "geocoder returned no candidates");
            return Ok(None);
        };

        Ok(Some(ResolvedAddress {
            formatted_address: format_address(&first),
            postal_code: non_blank(first.postal_code.as_deref()).map(str::to_string),
            coordinates: Coordinates::new(first.latitude, first.longitude),
        }))
    }
}

/// `"{house number} {street}, {city or county}, {state}, {postal code}"`,
/// leaving out whatever is missing.
pub fn format_address(candidate: &GeocodeCandidate) -> String {
    let street = [
        non_blank(candidate.house_number.as_deref()),
        non_blank(candidate.street.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    let locality =
        non_blank(candidate.city.as_deref()).or_else(|| non_blank(candidate.county.as_deref()));

    [
        Some(street.as_str()).filter(|value| !value.is_empty()),
        locality,
        non_blank(candidate.state.as_deref()),
        non_blank(candidate.postal_code.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(", ")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
