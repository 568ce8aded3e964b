//! Distance/time matrix builder.
//!
//! Tries the live provider first: geocode every location (in parallel, with a
//! bounded worker pool), then ask for a duration matrix in one request. Any
//! failure along the way (missing key, an address that does not geocode, a
//! provider error, cancellation) abandons the live attempt and the whole
//! matrix comes from the deterministic [`FallbackEstimator`] instead. Partial
//! live matrices are never returned.

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::PlannerConfig;
use crate::error::{LiveRoutingError, UpstreamError};
use crate::estimate::FallbackEstimator;
use crate::mapbox::{MapboxClient, MapboxConfig};
use crate::model::{Coordinates, LocationList, TravelMatrix};
use crate::polyline::{MAX_RENDER_POINTS, Polyline};
use crate::traits::RoutingProvider;

/// Where a matrix or route estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixSource {
    Live,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixOutcome {
    pub matrix: TravelMatrix,
    pub source: MatrixSource,
}

/// Point-to-point estimate for presentation consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEstimate {
    pub duration_seconds: u64,
    pub distance_meters: u64,
    /// Down-sampled geometry; only the live path has one.
    pub geometry: Option<Polyline>,
    pub source: MatrixSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Local,
    Regional,
    LongHaul,
}

impl RouteEstimate {
    pub fn route_class(&self) -> RouteClass {
        match self.distance_meters {
            d if d < 100_000 => RouteClass::Local,
            d if d < 500_000 => RouteClass::Regional,
            _ => RouteClass::LongHaul,
        }
    }
}

pub struct MatrixBuilder<P> {
    provider: Option<P>,
    estimator: FallbackEstimator,
    concurrency_limit: usize,
}

impl MatrixBuilder<MapboxClient> {
    /// Live Mapbox routing when the config carries a key, fallback otherwise.
    pub fn from_config(config: &PlannerConfig) -> Result<Self, UpstreamError> {
        let provider = MapboxConfig::from_planner(config)
            .map(MapboxClient::new)
            .transpose()?;
        Ok(Self {
            provider,
            estimator: FallbackEstimator::default(),
            concurrency_limit: config.geocode_concurrency_limit,
        })
    }

    /// A builder that never touches the network.
    pub fn fallback_only(estimator: FallbackEstimator) -> Self {
        Self {
            provider: None,
            estimator,
            concurrency_limit: 1,
        }
    }
}

impl<P> MatrixBuilder<P>
where
    P: RoutingProvider + Sync,
{
    pub fn with_provider(provider: P, concurrency_limit: usize) -> Self {
        Self {
            provider: Some(provider),
            estimator: FallbackEstimator::default(),
            concurrency_limit,
        }
    }

    #[must_use]
    pub fn with_estimator(mut self, estimator: FallbackEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn estimator(&self) -> &FallbackEstimator {
        &self.estimator
    }

    /// Builds the travel matrix for `locations`. Never fails: the fallback
    /// estimator covers every live-path failure.
    pub fn build_matrix(&self, locations: &LocationList, cancel: &CancellationToken) -> MatrixOutcome {
        if locations.len() < 2 {
            return MatrixOutcome {
                matrix: TravelMatrix::new(locations.len()),
                source: MatrixSource::Fallback,
            };
        }

        match self.live_matrix(locations, cancel) {
            Ok(matrix) => {
                info!(locations = locations.len(), "built matrix from live provider");
                MatrixOutcome {
                    matrix,
                    source: MatrixSource::Live,
                }
            }
            Err(cause) => {
                warn!(locations = locations.len(), %cause, "live matrix unavailable, using fallback estimator");
                MatrixOutcome {
                    matrix: self.estimator.matrix_for(locations.addresses()),
                    source: MatrixSource::Fallback,
                }
            }
        }
    }

    /// Single point-to-point estimate, with geometry when live routing works.
    pub fn route_between(&self, origin: &str, destination: &str, cancel: &CancellationToken) -> RouteEstimate {
        match self.live_route(origin, destination, cancel) {
            Ok(estimate) => estimate,
            Err(cause) => {
                warn!(origin, destination, %cause, "live directions unavailable, using fallback estimator");
                let estimate = self.estimator.route_between(origin, destination);
                RouteEstimate {
                    duration_seconds: estimate.duration_seconds,
                    distance_meters: u64::from(estimate.distance_km) * 1000,
                    geometry: None,
                    source: MatrixSource::Fallback,
                }
            }
        }
    }

    fn live_matrix(
        &self,
        locations: &LocationList,
        cancel: &CancellationToken,
    ) -> Result<TravelMatrix, LiveRoutingError> {
        let provider = self.provider.as_ref().ok_or(LiveRoutingError::MissingApiKey)?;
        let coordinates = self.geocode_all(provider, locations.addresses(), cancel)?;
        if cancel.is_cancelled() {
            return Err(LiveRoutingError::Cancelled);
        }

        let matrix = provider.matrix_for(&coordinates)?;
        if matrix.size() != locations.len() {
            return Err(LiveRoutingError::MatrixShape {
                expected: locations.len(),
                actual: matrix.size(),
            });
        }
        Ok(matrix)
    }

    /// Geocodes every address on a bounded pool. Results come back in input
    /// order regardless of completion order. The first failure stops any
    /// lookup that has not started yet.
    fn geocode_all(
        &self,
        provider: &P,
        addresses: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Coordinates>, LiveRoutingError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.concurrency_limit.max(1))
            .build()
            .map_err(|err| LiveRoutingError::ThreadPool(err.to_string()))?;

        let resolved = pool.install(|| {
            addresses
                .par_iter()
                .map(|address| geocode_one(provider, address, cancel))
                .collect::<Result<Vec<Coordinates>, LiveRoutingError>>()
        });
        debug!(addresses = addresses.len(), ok = resolved.is_ok(), "geocoding finished");

        resolved
    }

    fn live_route(
        &self,
        origin: &str,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<RouteEstimate, LiveRoutingError> {
        let provider = self.provider.as_ref().ok_or(LiveRoutingError::MissingApiKey)?;
        let from = geocode_one(provider, origin, cancel)?;
        let to = geocode_one(provider, destination, cancel)?;
        if cancel.is_cancelled() {
            return Err(LiveRoutingError::Cancelled);
        }

        let directions = provider.directions(from, to)?;
        Ok(RouteEstimate {
            duration_seconds: directions.duration_seconds.max(0.0).round() as u64,
            distance_meters: directions.distance_meters.max(0.0).round() as u64,
            geometry: directions
                .geometry
                .map(|geometry| geometry.downsample(MAX_RENDER_POINTS)),
            source: MatrixSource::Live,
        })
    }
}

fn geocode_one<P: RoutingProvider>(
    provider: &P,
    address: &str,
    cancel: &CancellationToken,
) -> Result<Coordinates, LiveRoutingError> {
    if cancel.is_cancelled() {
        return Err(LiveRoutingError::Cancelled);
    }
    provider
        .geocode(address)?
        .ok_or_else(|| LiveRoutingError::GeocodeNotFound {
            address: address.to_string(),
        })
}
