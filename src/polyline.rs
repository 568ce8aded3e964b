//! Route geometry for map-rendering consumers.
//!
//! Providers return full-resolution geometries; consumers only need a coarse
//! outline, so geometries are down-sampled before they leave the builder.

use serde::{Deserialize, Serialize};

/// Most points a down-sampled geometry keeps.
pub const MAX_RENDER_POINTS: usize = 50;

/// A route geometry as decoded `(latitude, longitude)` points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

impl Polyline {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Builds a polyline from GeoJSON `[lon, lat]` positions.
    pub fn from_lon_lat(positions: &[[f64; 2]]) -> Self {
        Self::new(positions.iter().map(|[lon, lat]| (*lat, *lon)).collect())
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn into_points(self) -> Vec<(f64, f64)> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keeps every k-th point so at most `max_points` remain, always ending on
    /// the final point of the original geometry.
    pub fn downsample(&self, max_points: usize) -> Self {
        let len = self.points.len();
        if max_points == 0 {
            return Self::new(Vec::new());
        }
        if len <= max_points {
            return self.clone();
        }

        let stride = len.div_ceil(max_points);
        let mut points: Vec<(f64, f64)> = self.points.iter().copied().step_by(stride).collect();
        if let (Some(kept), Some(end)) = (points.last_mut(), self.points.last()) {
            *kept = *end;
        }
        Self::new(points)
    }
}
