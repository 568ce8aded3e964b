//! Mapbox HTTP adapter for geocoding, duration matrices and directions.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::config::PlannerConfig;
use crate::error::UpstreamError;
use crate::model::{Coordinates, TravelMatrix};
use crate::polyline::Polyline;
use crate::traits::{DirectionsProvider, Directions, DistanceMatrixProvider, Geocoder};

const GEOCODER: &str = "geocoding provider";
const MATRIX: &str = "matrix provider";
const DIRECTIONS: &str = "directions provider";

#[derive(Debug, Clone)]
pub struct MapboxConfig {
    pub base_url: String,
    pub access_token: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl MapboxConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.mapbox.com".to_string(),
            access_token: access_token.into(),
            profile: "driving".to_string(),
            timeout_secs: 10,
        }
    }

    /// Live-provider settings from the planner config, if a key is present.
    pub fn from_planner(config: &PlannerConfig) -> Option<Self> {
        let token = config.routing_api_key.clone()?;
        Some(Self {
            base_url: config.routing_base_url.clone(),
            timeout_secs: config.provider_timeout.as_secs().max(1),
            ..Self::new(token)
        })
    }
}

#[derive(Debug, Clone)]
pub struct MapboxClient {
    config: MapboxConfig,
    client: reqwest::blocking::Client,
}

impl MapboxClient {
    pub fn new(config: MapboxConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| UpstreamError::from_reqwest(MATRIX, &err))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, service: &'static str, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = Url::parse(&self.config.base_url).map_err(|err| UpstreamError::Unavailable {
            service,
            message: format!("invalid base url {}: {err}", self.config.base_url),
        })?;
        url.path_segments_mut()
            .map_err(|()| UpstreamError::Unavailable {
                service,
                message: format!("base url {} cannot take a path", self.config.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("access_token", &self.config.access_token);
        Ok(url)
    }

    fn geocode_url(&self, address: &str) -> Result<Url, UpstreamError> {
        let mut url = self.endpoint(
            GEOCODER,
            &["geocoding", "v5", "mapbox.places", &format!("{address}.json")],
        )?;
        url.query_pairs_mut().append_pair("limit", "1");
        Ok(url)
    }

    fn matrix_url(&self, locations: &[Coordinates]) -> Result<Url, UpstreamError> {
        let mut url = self.endpoint(
            MATRIX,
            &["directions-matrix", "v1", "mapbox", &self.config.profile, &coordinate_path(locations)],
        )?;
        url.query_pairs_mut().append_pair("annotations", "duration");
        Ok(url)
    }

    fn directions_url(&self, from: Coordinates, to: Coordinates) -> Result<Url, UpstreamError> {
        let mut url = self.endpoint(
            DIRECTIONS,
            &["directions", "v5", "mapbox", &self.config.profile, &coordinate_path(&[from, to])],
        )?;
        url.query_pairs_mut()
            .append_pair("geometries", "geojson")
            .append_pair("overview", "full")
            .append_pair("steps", "false");
        Ok(url)
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        service: &'static str,
        url: Url,
    ) -> Result<T, UpstreamError> {
        self.client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::json::<T>)
            .map_err(|err| UpstreamError::from_reqwest(service, &err))
    }
}

impl Geocoder for MapboxClient {
    fn geocode(&self, address: &str) -> Result<Option<Coordinates>, UpstreamError> {
        let url = self.geocode_url(address)?;
        let body: GeocodeResponse = self.get_json(GEOCODER, url)?;
        let found = convert_geocode(body)?;
        debug!(address, found = found.is_some(), "geocoded address");
        Ok(found)
    }
}

impl DistanceMatrixProvider for MapboxClient {
    fn matrix_for(&self, locations: &[Coordinates]) -> Result<TravelMatrix, UpstreamError> {
        if locations.len() < 2 {
            return Ok(TravelMatrix::new(locations.len()));
        }
        let url = self.matrix_url(locations)?;
        let body: MatrixResponse = self.get_json(MATRIX, url)?;
        convert_matrix(body, locations.len())
    }
}

impl DirectionsProvider for MapboxClient {
    fn directions(&self, from: Coordinates, to: Coordinates) -> Result<Directions, UpstreamError> {
        let url = self.directions_url(from, to)?;
        let body: DirectionsResponse = self.get_json(DIRECTIONS, url)?;
        convert_directions(body)
    }
}

fn coordinate_path(locations: &[Coordinates]) -> String {
    locations
        .iter()
        .map(|c| format!("{:.6},{:.6}", c.longitude, c.latitude))
        .collect::<Vec<_>>()
        .join(";")
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    features: Vec<GeocodeFeature>,
}

#[derive(Debug, Deserialize)]
struct GeocodeFeature {
    /// `[lon, lat]`
    center: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    code: String,
    message: Option<String>,
    durations: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    duration: f64,
    distance: f64,
    geometry: Option<RouteGeometry>,
}

#[derive(Debug, Deserialize)]
struct RouteGeometry {
    coordinates: Vec<[f64; 2]>,
}

fn convert_geocode(body: GeocodeResponse) -> Result<Option<Coordinates>, UpstreamError> {
    let Some(feature) = body.features.into_iter().next() else {
        return Ok(None);
    };
    match feature.center.as_slice() {
        [lon, lat] if lon.is_finite() && lat.is_finite() => Ok(Some(Coordinates::new(*lon, *lat))),
        other => Err(UpstreamError::malformed(
            GEOCODER,
            format!("feature center {other:?} is not a lon,lat pair"),
        )),
    }
}

fn convert_matrix(body: MatrixResponse, expected: usize) -> Result<TravelMatrix, UpstreamError> {
    if body.code != "Ok" {
        return Err(UpstreamError::malformed(
            MATRIX,
            format!("{}: {}", body.code, body.message.unwrap_or_default()),
        ));
    }
    let durations = body
        .durations
        .ok_or_else(|| UpstreamError::malformed(MATRIX, "response missing durations"))?;
    if durations.len() != expected || durations.iter().any(|row| row.len() != expected) {
        return Err(UpstreamError::malformed(
            MATRIX,
            format!("durations are not {expected}x{expected}"),
        ));
    }

    let rows = durations
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    Some(seconds) if seconds.is_finite() && seconds >= 0.0 => {
                        Ok(seconds.round() as u64)
                    }
                    _ => Err(UpstreamError::malformed(
                        MATRIX,
                        "unroutable or invalid duration in matrix",
                    )),
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    TravelMatrix::from_rows(rows).ok_or_else(|| UpstreamError::malformed(MATRIX, "matrix is not square"))
}

fn convert_directions(body: DirectionsResponse) -> Result<Directions, UpstreamError> {
    if body.code != "Ok" {
        return Err(UpstreamError::malformed(
            DIRECTIONS,
            format!("{}: {}", body.code, body.message.unwrap_or_default()),
        ));
    }
    let route = body
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| UpstreamError::malformed(DIRECTIONS, "no routes returned"))?;

    Ok(Directions {
        duration_seconds: route.duration,
        distance_meters: route.distance,
        geometry: route
            .geometry
            .map(|geometry| Polyline::from_lon_lat(&geometry.coordinates)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> MapboxClient {
        MapboxClient::new(MapboxConfig {
            base_url: base_url.to_string(),
            timeout_secs: 1,
            ..MapboxConfig::new("pk.test")
        })
        .unwrap()
    }

    #[test]
    fn geocode_url_escapes_address() {
        let url = client("https://api.mapbox.com").geocode_url("1 Rocket Road, Hawthorne").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.mapbox.com/geocoding/v5/mapbox.places/1%20Rocket%20Road,%20Hawthorne.json?access_token=pk.test&limit=1"
        );
    }

    #[test]
    fn matrix_url_uses_lon_lat_pairs() {
        let url = client("https://api.mapbox.com/")
            .matrix_url(&[Coordinates::new(-118.0, 34.0), Coordinates::new(-117.5, 33.5)])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.mapbox.com/directions-matrix/v1/mapbox/driving/-118.000000,34.000000;-117.500000,33.500000?access_token=pk.test&annotations=duration"
        );
    }

    #[test]
    fn from_planner_requires_key() {
        assert!(MapboxConfig::from_planner(&PlannerConfig::default()).is_none());
        let config = PlannerConfig {
            routing_api_key: Some("pk.live".to_string()),
            ..PlannerConfig::default()
        };
        let mapbox = MapboxConfig::from_planner(&config).unwrap();
        assert_eq!(mapbox.access_token, "pk.live");
        assert_eq!(mapbox.timeout_secs, 10);
    }

    #[test]
    fn geocode_without_features_is_not_found() {
        let body: GeocodeResponse = serde_json::from_str(r#"{"features": []}"#).unwrap();
        assert_eq!(convert_geocode(body).unwrap(), None);
    }

    #[test]
    fn geocode_reads_center() {
        let body: GeocodeResponse =
            serde_json::from_str(r#"{"features": [{"center": [-118.33, 33.92]}]}"#).unwrap();
        assert_eq!(convert_geocode(body).unwrap(), Some(Coordinates::new(-118.33, 33.92)));
    }

    #[test]
    fn geocode_rejects_short_center() {
        let body: GeocodeResponse = serde_json::from_str(r#"{"features": [{"center": [1.0]}]}"#).unwrap();
        assert!(convert_geocode(body).unwrap_err().is_malformed());
    }

    #[test]
    fn matrix_rounds_seconds() {
        let body: MatrixResponse = serde_json::from_str(
            r#"{"code": "Ok", "durations": [[0.0, 120.4], [119.6, 0.0]]}"#,
        )
        .unwrap();
        let matrix = convert_matrix(body, 2).unwrap();
        assert_eq!(matrix.rows(), vec![vec![0, 120], vec![120, 0]]);
    }

    #[test]
    fn matrix_rejects_nulls_and_bad_codes() {
        let nulls: MatrixResponse =
            serde_json::from_str(r#"{"code": "Ok", "durations": [[0.0, null], [1.0, 0.0]]}"#).unwrap();
        assert!(convert_matrix(nulls, 2).is_err());

        let failed: MatrixResponse =
            serde_json::from_str(r#"{"code": "InvalidInput", "message": "too many coordinates"}"#).unwrap();
        let err = convert_matrix(failed, 2).unwrap_err();
        assert!(err.to_string().contains("too many coordinates"));
    }

    #[test]
    fn matrix_rejects_wrong_shape() {
        let body: MatrixResponse =
            serde_json::from_str(r#"{"code": "Ok", "durations": [[0.0, 1.0], [1.0, 0.0]]}"#).unwrap();
        assert!(convert_matrix(body, 3).is_err());
    }

    #[test]
    fn directions_keep_geometry() {
        let body: DirectionsResponse = serde_json::from_str(
            r#"{"code": "Ok", "routes": [{"duration": 600.5, "distance": 8000.0,
                "geometry": {"coordinates": [[-118.0, 34.0], [-117.9, 34.1]]}}]}"#,
        )
        .unwrap();
        let directions = convert_directions(body).unwrap();
        assert_eq!(directions.distance_meters, 8000.0);
        assert_eq!(directions.geometry.unwrap().points(), &[(34.0, -118.0), (34.1, -117.9)]);
    }

    #[test]
    fn unreachable_provider_is_unavailable() {
        let err = client("http://127.0.0.1:9").geocode("anywhere").unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable { .. }), "got {err:?}");
    }
}
