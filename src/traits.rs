//! Collaborator seams for the planning pipeline.
//!
//! Each external system the pipeline talks to sits behind one of these
//! traits. The HTTP adapters in [`crate::mapbox`], [`crate::fleet`] and
//! [`crate::dispatch`] implement them for production; tests plug in stubs.

use crate::error::UpstreamError;
use crate::model::{Coordinates, Fleet, TravelMatrix};
use crate::polyline::Polyline;

/// Resolves a free-text address to coordinates.
pub trait Geocoder {
    /// `Ok(None)` means the provider answered but found nothing.
    fn geocode(&self, address: &str) -> Result<Option<Coordinates>, UpstreamError>;
}

/// Provides a duration matrix for a set of coordinates.
///
/// The matrix is indexed by the provided location order.
pub trait DistanceMatrixProvider {
    fn matrix_for(&self, locations: &[Coordinates]) -> Result<TravelMatrix, UpstreamError>;
}

/// Point-to-point route between two coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Directions {
    pub duration_seconds: f64,
    pub distance_meters: f64,
    /// Full route geometry as `(lat, lng)` points, if the provider sent one.
    pub geometry: Option<Polyline>,
}

pub trait DirectionsProvider {
    fn directions(&self, from: Coordinates, to: Coordinates) -> Result<Directions, UpstreamError>;
}

/// Everything the live matrix path needs from one provider.
pub trait RoutingProvider: Geocoder + DistanceMatrixProvider + DirectionsProvider {}

impl<T> RoutingProvider for T where T: Geocoder + DistanceMatrixProvider + DirectionsProvider {}

/// Source of pending orders, drivers and the depot for one area/date.
pub trait FleetSource {
    fn fetch_fleet(&self, area: &str, date: &str) -> Result<Fleet, UpstreamError>;
}

/// One route as submitted to the delivery system.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSubmission {
    pub driver_id: String,
    pub route_date: String,
    pub stops: Vec<RouteStop>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub order_id: String,
    pub delivery_address: String,
}

/// What the delivery system hands back for an accepted route.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub route_number: Option<String>,
}

/// Commits routes to the delivery system of record.
pub trait DispatchSink {
    fn submit(&self, submission: &RouteSubmission) -> Result<Acknowledgment, UpstreamError>;
}
