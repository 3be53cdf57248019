//! Great-circle distance and viewer geolocation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Used when the viewer location cannot be determined (São Paulo centre).
pub const FALLBACK_VIEWER: Coordinates = Coordinates {
    lat: -23.55052,
    lng: -46.633308,
};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Haversine distance between two points, rounded to 0.1 km.
///
/// Returns `None` when either side is missing.
pub fn distance_km(a: Option<Coordinates>, b: Option<Coordinates>) -> Option<f64> {
    let (a, b) = (a?, b?);
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    Some((EARTH_RADIUS_KM * c * 10.0).round() / 10.0)
}

/// Response shape of the IP geolocation endpoint.
#[derive(Debug, Deserialize)]
struct GeolocationResponse {
    #[serde(alias = "lat")]
    latitude: f64,
    #[serde(alias = "lon", alias = "lng")]
    longitude: f64,
}

/// Best-effort lookup of the viewer's position.
///
/// Makes a single request bounded by `timeout`. Any failure, including an
/// unconfigured endpoint, yields [`FALLBACK_VIEWER`].
pub async fn locate_viewer(endpoint: Option<&str>, timeout: Duration) -> Coordinates {
    let Some(endpoint) = endpoint else {
        tracing::info!("No geolocation endpoint configured, using fallback viewer location");
        return FALLBACK_VIEWER;
    };

    match lookup(endpoint, timeout).await {
        Ok(coords) => {
            tracing::info!("Viewer located at {:.4}, {:.4}", coords.lat, coords.lng);
            coords
        }
        Err(e) => {
            tracing::warn!("Geolocation failed ({}), using fallback viewer location", e);
            FALLBACK_VIEWER
        }
    }
}

async fn lookup(endpoint: &str, timeout: Duration) -> Result<Coordinates, reqwest::Error> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let body: GeolocationResponse = client
        .get(endpoint)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(Coordinates::new(body.latitude, body.longitude))
}
