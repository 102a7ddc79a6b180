pub mod error;
pub mod types;

pub use error::{Result, SearchError};
pub use types::{PlaceHit, PlacesSearchInput, PlacesSearchResponse};

const BASE_URL: &str = "https://google.serper.dev";

/// Thin client for a Serper-style places web search API.
pub struct SearchClient {
    client: reqwest::Client,
    api_key: String,
}

impl SearchClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Run a places search for a free-text query. Returns a finite list of
    /// partial place mentions; length is whatever the upstream felt like.
    pub async fn places(&self, query: &str) -> Result<Vec<PlaceHit>> {
        let url = format!("{BASE_URL}/places");
        let input = PlacesSearchInput {
            q: query.to_string(),
        };

        let resp = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: PlacesSearchResponse = resp.json().await?;
        tracing::debug!(query, hits = parsed.places.len(), "Places search complete");
        Ok(parsed.places)
    }
}
