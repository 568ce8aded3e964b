//! Commits solved plans to the delivery service.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::PlannerConfig;
use crate::error::{DispatchError, UpstreamError};
use crate::model::{Plan, Route};
use crate::traits::{Acknowledgment, DispatchSink, RouteStop, RouteSubmission};

const DELIVERY_SERVICE: &str = "delivery service";

/// `POST {delivery_service_url}/delivery/routes`, one call per route.
pub struct HttpDispatchSink {
    client: reqwest::blocking::Client,
    delivery_service_url: String,
}

impl HttpDispatchSink {
    pub fn new(config: &PlannerConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.provider_timeout.max(Duration::from_secs(1)))
            .build()
            .map_err(|err| UpstreamError::from_reqwest(DELIVERY_SERVICE, &err))?;

        Ok(Self {
            client,
            delivery_service_url: config.delivery_service_url.trim_end_matches('/').to_string(),
        })
    }

    fn routes_url(&self) -> String {
        format!("{}/delivery/routes", self.delivery_service_url)
    }
}

impl DispatchSink for HttpDispatchSink {
    fn submit(&self, submission: &RouteSubmission) -> Result<Acknowledgment, UpstreamError> {
        let body = self
            .client
            .post(self.routes_url())
            .json(submission)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::bytes)
            .map_err(|err| UpstreamError::from_reqwest(DELIVERY_SERVICE, &err))?;

        // The route was accepted; an unreadable body only costs us the ids.
        Ok(serde_json::from_slice(&body).unwrap_or_default())
    }
}

/// Result of one driver's submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DriverDispatch {
    Submitted {
        #[serde(rename = "driverId")]
        driver_id: String,
        acknowledgment: Acknowledgment,
    },
    Failed {
        #[serde(rename = "driverId")]
        driver_id: String,
        reason: String,
    },
}

impl DriverDispatch {
    /// Driver the outcome belongs to.
    pub fn driver_id(&self) -> &str {
        match self {
            Self::Submitted { driver_id, .. } | Self::Failed { driver_id, .. } => driver_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }
}

/// Per-driver outcomes of one dispatch, in driver id order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfirmation {
    pub route_date: String,
    pub outcomes: Vec<DriverDispatch>,
}

impl DispatchConfirmation {
    pub fn new(route_date: impl Into<String>) -> Self {
        Self {
            route_date: route_date.into(),
            outcomes: Vec::new(),
        }
    }

    /// Number of routes the delivery service accepted.
    pub fn submitted(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_success()).count()
    }

    /// Drivers whose submission failed, in dispatch order.
    pub fn failed_driver_ids(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.is_success())
            .map(|outcome| outcome.driver_id().to_string())
            .collect()
    }

    /// Returns the outcome recorded for `driver_id`, if it had a route.
    pub fn outcome_for(&self, driver_id: &str) -> Option<&DriverDispatch> {
        self.outcomes.iter().find(|outcome| outcome.driver_id() == driver_id)
    }
}

/// Submits a plan's routes through a [`DispatchSink`].
pub struct Dispatcher<S> {
    sink: S,
}

impl<S: DispatchSink> Dispatcher<S> {
    /// Creates a dispatcher that submits through `sink`.
    pub const fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Submits every non-empty route. A failed submission does not stop the
    /// remaining ones; the error carries the full confirmation so callers can
    /// retry only the failed drivers.
    pub fn dispatch(&self, plan: &Plan, date: &str) -> Result<DispatchConfirmation, DispatchError> {
        let mut confirmation = DispatchConfirmation::new(date);

        for (driver_id, route) in plan.routes.iter().filter(|(_, route)| !route.is_empty()) {
            let submission = submission_for(driver_id, route, date);
            let outcome = match self.sink.submit(&submission) {
                Ok(acknowledgment) => DriverDispatch::Submitted {
                    driver_id: driver_id.clone(),
                    acknowledgment,
                },
                Err(err) => {
                    warn!(driver_id = %driver_id, error = %err, "route submission failed");
                    DriverDispatch::Failed {
                        driver_id: driver_id.clone(),
                        reason: err.to_string(),
                    }
                }
            };
            confirmation.outcomes.push(outcome);
        }

        let failed_driver_ids = confirmation.failed_driver_ids();
        info!(
            date,
            submitted = confirmation.submitted(),
            failed = failed_driver_ids.len(),
            "dispatched routes"
        );
        if failed_driver_ids.is_empty() {
            Ok(confirmation)
        } else {
            Err(DispatchError::PartialDispatchFailure {
                failed_driver_ids,
                confirmation,
            })
        }
    }
}

fn submission_for(driver_id: &str, route: &Route, date: &str) -> RouteSubmission {
    RouteSubmission {
        driver_id: driver_id.to_string(),
        route_date: date.to_string(),
        stops: route
            .stops()
            .map(|(order_id, delivery_address)| RouteStop {
                order_id: order_id.to_string(),
                delivery_address: delivery_address.to_string(),
            })
            .collect(),
    }
}
