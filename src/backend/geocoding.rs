use crate::backend::traits::Geocoder;
use crate::backend::types::GeocodedAddress;
use crate::error::GeocodeError;
use crate::models::GeoPoint;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// Geocoder backed by the Google Geocoding JSON API
pub struct GoogleGeocoder {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>) -> Result<Self, GeocodeError> {
        Self::with_endpoint(api_key, GOOGLE_GEOCODE_URL)
    }

    /// Point the geocoder at a different API endpoint
    pub fn with_endpoint(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GeocodeError::Request {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    #[instrument(skip(self))]
    async fn geocode(&self, address: &str) -> Result<GeocodedAddress, GeocodeError> {
        debug!("Geocoding address");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| GeocodeError::Request {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            warn!("Geocoding API returned status: {}", response.status());
            return Err(GeocodeError::Status {
                status: response.status().to_string(),
            });
        }

        let body: GeocodeResponse = response.json().await.map_err(|e| GeocodeError::Request {
            message: format!("failed to parse geocoding response: {e}"),
        })?;

        interpret(address, body)
    }
}

fn interpret(address: &str, body: GeocodeResponse) -> Result<GeocodedAddress, GeocodeError> {
    match body.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => {
            return Err(GeocodeError::NoResults {
                address: address.to_string(),
            })
        }
        other => {
            return Err(GeocodeError::Status {
                status: other.to_string(),
            })
        }
    }

    let first = body
        .results
        .into_iter()
        .next()
        .ok_or_else(|| GeocodeError::NoResults {
            address: address.to_string(),
        })?;

    // The API echoes "undefined" back for addresses it could not place
    if first.formatted_address.contains("undefined") {
        return Err(GeocodeError::NoResults {
            address: address.to_string(),
        });
    }

    Ok(GeocodedAddress {
        point: GeoPoint {
            lat: first.geometry.location.lat,
            lng: first.geometry.location.lng,
        },
        formatted_address: first.formatted_address,
    })
}
