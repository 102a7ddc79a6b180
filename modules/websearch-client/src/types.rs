use serde::{Deserialize, Serialize};

/// Request body for the places search endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PlacesSearchInput {
    pub q: String,
}

/// Response envelope for a places search.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacesSearchResponse {
    #[serde(default)]
    pub places: Vec<PlaceHit>,
}

/// One place mention from a web search. Free-text sourced — every field
/// beyond the title is best-effort.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceHit {
    pub title: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "phoneNumber", default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(rename = "openingHours", default)]
    pub opening_hours: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}
