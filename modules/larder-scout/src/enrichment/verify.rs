//! Production `Verifier` backed by the places lookup API. All format
//! assumptions about the upstream response live in places-client; this
//! module turns a typed candidate into the classified outcome the
//! enrichment state machine branches on, including the fuzzy name
//! cross-check that guards against the API returning a different business
//! at the same address.

use async_trait::async_trait;
use tracing::{debug, warn};

use larder_common::{GeoPoint, Verified, VerifyError, VerifyOutcome, VerifyRequest};
use places_client::{PlaceCandidate, PlacesClient, PlacesError};

use crate::matcher;
use crate::traits::Verifier;

/// Place types that disqualify a result outright.
const BLOCKED_PLACE_TYPES: &[&str] = &[
    "atm",
    "bank",
    "finance",
    "insurance_agency",
    "real_estate_agency",
    "storage",
    "moving_company",
    "lodging",
    "car_dealer",
];

/// Place types that independently suggest the result really is a food
/// resource. A close (but not full) name match is accepted when one of
/// these is present.
const FOOD_PLACE_TYPES: &[&str] = &[
    "food",
    "food_bank",
    "meal_delivery",
    "meal_takeaway",
    "grocery_or_supermarket",
    "supermarket",
    "charity",
];

pub struct PlacesVerifier {
    client: PlacesClient,
}

impl PlacesVerifier {
    pub fn new(client: PlacesClient) -> Self {
        Self { client }
    }

    fn build_query(request: &VerifyRequest) -> String {
        let mut parts = vec![request.name.as_str(), request.address.as_str()];
        if let Some(city) = request.city.as_deref() {
            parts.push(city);
        }
        if let Some(state) = request.state.as_deref() {
            parts.push(state);
        }
        parts.join(" ")
    }
}

fn map_error(err: PlacesError) -> VerifyError {
    match err {
        PlacesError::Denied(msg) => VerifyError::Configuration(msg),
        other => VerifyError::Transient(other.to_string()),
    }
}

fn is_food_related(types: &[String]) -> bool {
    types.iter().any(|t| FOOD_PLACE_TYPES.contains(&t.as_str()))
}

/// Classify a lookup candidate against the original request.
fn classify(request: &VerifyRequest, candidate: PlaceCandidate) -> VerifyOutcome {
    match candidate.business_status.as_deref() {
        Some("CLOSED_PERMANENTLY") => return VerifyOutcome::PermanentlyClosed,
        Some("CLOSED_TEMPORARILY") => return VerifyOutcome::TemporarilyClosed,
        _ => {}
    }

    if let Some(blocked) = candidate
        .types
        .iter()
        .find(|t| BLOCKED_PLACE_TYPES.contains(&t.as_str()))
    {
        return VerifyOutcome::BlockedCategory(blocked.clone());
    }

    let name_match = matcher::match_names(&request.name, &candidate.name);
    let accepted = name_match.is_match
        || (name_match.is_close_match && is_food_related(&candidate.types));
    if !accepted {
        return VerifyOutcome::NameMismatch {
            found: candidate.name,
            ratio: name_match.ratio,
        };
    }

    VerifyOutcome::Confirmed(Verified {
        name: candidate.name,
        formatted_address: candidate.formatted_address,
        location: candidate.geometry.map(|g| GeoPoint {
            lat: g.location.lat,
            lng: g.location.lng,
        }),
        phone: None,
        hours: None,
        external_id: Some(candidate.place_id),
    })
}

#[async_trait]
impl Verifier for PlacesVerifier {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyOutcome, VerifyError> {
        let query = Self::build_query(request);
        let candidate = self.client.find_place(&query).await.map_err(map_error)?;

        let candidate = match candidate {
            Some(c) => c,
            None => {
                debug!(name = %request.name, "Place lookup found nothing");
                return Ok(VerifyOutcome::NotFound);
            }
        };

        let place_id = candidate.place_id.clone();
        let mut outcome = classify(request, candidate);

        // Contact details are nice-to-have: a details failure never fails
        // an otherwise confirmed verification.
        if let VerifyOutcome::Confirmed(ref mut verified) = outcome {
            match self.client.details(&place_id).await {
                Ok(Some(details)) => {
                    verified.phone = details.formatted_phone_number;
                    verified.hours = details
                        .opening_hours
                        .map(|h| h.weekday_text.join("; "))
                        .filter(|h| !h.is_empty());
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(place_id = %place_id, error = %e, "Details lookup failed, continuing without contact fields");
                }
            }
        }

        Ok(outcome)
    }
}
