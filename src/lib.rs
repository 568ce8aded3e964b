//! Last-mile route planning.
//!
//! One planning run pulls pending orders for an area and date, builds a
//! travel-time matrix (live Mapbox data, or a deterministic estimate when the
//! provider is unavailable), solves a capacitated routing problem across the
//! configured drivers, and commits the routes to the delivery service.
//!
//! [`pipeline::Pipeline`] sequences the stages; every external system sits
//! behind a trait in [`traits`] so each stage can be driven in isolation.

pub mod cancel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod estimate;
pub mod fleet;
pub mod mapbox;
pub mod matrix;
pub mod model;
pub mod pipeline;
pub mod polyline;
pub mod solver;
pub mod traits;

pub use cancel::CancellationToken;
pub use config::PlannerConfig;
pub use error::{DispatchError, PlanningError, UpstreamError};
pub use pipeline::{Pipeline, PlanningRequest, PlanningResponse};
