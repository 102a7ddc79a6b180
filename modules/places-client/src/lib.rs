pub mod error;
pub mod types;

pub use error::{PlacesError, Result};
pub use types::{
    DetailsResponse, FindPlaceResponse, Geometry, LatLng, OpeningHours, PlaceCandidate,
    PlaceDetails,
};

const BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

const FIND_PLACE_FIELDS: &str =
    "name,formatted_address,place_id,business_status,types,geometry/location";

const DETAILS_FIELDS: &str = "formatted_phone_number,opening_hours/weekday_text";

/// Thin client for a Google-Places-style find/details API. All format
/// assumptions about the upstream live here; callers get typed candidates
/// and a typed error surface.
pub struct PlacesClient {
    client: reqwest::Client,
    api_key: String,
}

impl PlacesClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Look up a place from free text. Returns the best candidate, or
    /// `None` if the API found nothing.
    pub async fn find_place(&self, query: &str) -> Result<Option<PlaceCandidate>> {
        if self.api_key.is_empty() {
            return Err(PlacesError::Denied("API key is empty".to_string()));
        }

        let url = format!("{BASE_URL}/findplacefromtext/json");
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("input", query),
                ("inputtype", "textquery"),
                ("fields", FIND_PLACE_FIELDS),
                ("key", &self.api_key),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PlacesError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: FindPlaceResponse = resp.json().await?;
        match parsed.status.as_str() {
            "OK" => {
                tracing::debug!(query, candidates = parsed.candidates.len(), "Find place ok");
                Ok(parsed.candidates.into_iter().next())
            }
            "ZERO_RESULTS" => Ok(None),
            other => Err(classify_status(other, parsed.error_message)),
        }
    }

    /// Fetch contact details for a confirmed place.
    pub async fn details(&self, place_id: &str) -> Result<Option<PlaceDetails>> {
        if self.api_key.is_empty() {
            return Err(PlacesError::Denied("API key is empty".to_string()));
        }

        let url = format!("{BASE_URL}/details/json");
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("place_id", place_id),
                ("fields", DETAILS_FIELDS),
                ("key", &self.api_key),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PlacesError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: DetailsResponse = resp.json().await?;
        match parsed.status.as_str() {
            "OK" => Ok(parsed.result),
            "ZERO_RESULTS" | "NOT_FOUND" => Ok(None),
            other => Err(classify_status(other, parsed.error_message)),
        }
    }
}

/// Map API status strings onto the typed error surface.
fn classify_status(status: &str, error_message: Option<String>) -> PlacesError {
    let detail = error_message.unwrap_or_else(|| status.to_string());
    match status {
        "REQUEST_DENIED" => PlacesError::Denied(detail),
        "OVER_QUERY_LIMIT" => PlacesError::Quota(detail),
        _ => PlacesError::Api {
            status: 200,
            message: format!("{status}: {detail}"),
        },
    }
}
