//! Error types for collaborator calls and pipeline stages.

use thiserror::Error;

use crate::dispatch::DispatchConfirmation;
use crate::pipeline::PipelineStage;

/// Failure talking to an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Network failure, timeout, or a client that could not be built.
    #[error("{service} is unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },
    /// The collaborator answered with a non-success status.
    #[error("{service} rejected the request with status {status}")]
    Rejected { service: &'static str, status: u16 },
    /// The response did not match the expected schema.
    #[error("{service} returned malformed data: {message}")]
    MalformedData {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    pub(crate) fn from_reqwest(service: &'static str, err: &reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::MalformedData {
                service,
                message: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return Self::Rejected {
                service,
                status: status.as_u16(),
            };
        }
        Self::Unavailable {
            service,
            message: err.to_string(),
        }
    }

    pub(crate) fn malformed(service: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedData {
            service,
            message: message.into(),
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            Self::Unavailable { service, .. }
            | Self::Rejected { service, .. }
            | Self::MalformedData { service, .. } => service,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedData { .. })
    }
}

/// Why the live matrix path was abandoned. Every variant selects the
/// deterministic fallback; none reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveRoutingError {
    #[error("no routing provider key configured")]
    MissingApiKey,
    #[error("address could not be geocoded: {address}")]
    GeocodeNotFound { address: String },
    #[error("live routing cancelled")]
    Cancelled,
    #[error("provider matrix has {actual} rows, expected {expected}")]
    MatrixShape { expected: usize, actual: usize },
    #[error("failed to start geocoding workers: {0}")]
    ThreadPool(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// The solver was handed a matrix that does not describe the orders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    #[error("travel matrix is {actual}x{actual}, expected {expected}x{expected}")]
    MatrixShape { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// At least one route submission failed. The confirmation still lists the
    /// routes that were committed.
    #[error("dispatch failed for drivers: {}", failed_driver_ids.join(", "))]
    PartialDispatchFailure {
        failed_driver_ids: Vec<String>,
        confirmation: DispatchConfirmation,
    },
}

impl DispatchError {
    pub fn failed_driver_ids(&self) -> &[String] {
        match self {
            Self::PartialDispatchFailure {
                failed_driver_ids, ..
            } => failed_driver_ids,
        }
    }

    pub fn confirmation(&self) -> &DispatchConfirmation {
        match self {
            Self::PartialDispatchFailure { confirmation, .. } => confirmation,
        }
    }
}

/// A planning run that ended in the `Failed` state, tagged with its stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("invalid planning request: {message}")]
    InvalidRequest { message: String },
    #[error("fetching fleet failed: {0}")]
    Fleet(#[source] UpstreamError),
    #[error("solving routes failed: {0}")]
    Solve(#[source] SolveError),
    #[error("dispatching routes failed: {0}")]
    Dispatch(#[source] DispatchError),
}

impl PlanningError {
    /// Stage the run was in when it failed.
    pub const fn stage(&self) -> PipelineStage {
        match self {
            Self::InvalidRequest { .. } => PipelineStage::Idle,
            Self::Fleet(_) => PipelineStage::FetchingFleet,
            Self::Solve(_) => PipelineStage::Solving,
            Self::Dispatch(_) => PipelineStage::Dispatching,
        }
    }
}
