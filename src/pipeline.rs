//! Planning-run orchestrator.
//!
//! A run walks `Idle → FetchingFleet → BuildingMatrix → Solving →
//! Dispatching → Completed` strictly in sequence, each stage fully
//! materialised before the next starts. Any stage error ends the run in
//! `Failed(stage, cause)`; nothing is retried here.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::config::PlannerConfig;
use crate::dispatch::{DispatchConfirmation, Dispatcher, HttpDispatchSink};
use crate::error::{DispatchError, PlanningError, UpstreamError};
use crate::fleet::HttpFleetSource;
use crate::mapbox::MapboxClient;
use crate::matrix::{MatrixBuilder, MatrixSource};
use crate::model::{LocationList, Plan};
use crate::solver::{self, SolveOptions};
use crate::traits::{DispatchSink, FleetSource, RoutingProvider};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineStage {
    Idle,
    FetchingFleet,
    BuildingMatrix,
    Solving,
    Dispatching,
    Completed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::FetchingFleet => "fetching fleet",
            Self::BuildingMatrix => "building matrix",
            Self::Solving => "solving",
            Self::Dispatching => "dispatching",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Trigger for one planning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningRequest {
    pub area: String,
    /// Route date, `YYYY-MM-DD`.
    pub date: String,
}

impl PlanningRequest {
    pub fn new(area: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            date: date.into(),
        }
    }

    pub fn route_date(&self) -> Result<NaiveDate, PlanningError> {
        NaiveDate::parse_from_str(self.date.trim(), DATE_FORMAT).map_err(|err| PlanningError::InvalidRequest {
            message: format!("date {:?} is not YYYY-MM-DD: {err}", self.date),
        })
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningReport {
    pub plan: Plan,
    pub matrix_source: MatrixSource,
    pub confirmation: DispatchConfirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Plan-shaped payload of a [`PlanningResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningResult {
    #[serde(flatten)]
    pub plan: Plan,
    pub matrix_source: MatrixSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchConfirmation>,
}

/// What the caller of a run always gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningResponse {
    pub status: RunStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PipelineStage>,
    pub result: Option<PlanningResult>,
}

impl PlanningResponse {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Output of the stages that have finished so far.
#[derive(Default)]
struct Progress {
    plan: Option<Plan>,
    matrix_source: Option<MatrixSource>,
}

impl Progress {
    fn into_result(self, dispatch: Option<DispatchConfirmation>) -> Option<PlanningResult> {
        Some(PlanningResult {
            plan: self.plan?,
            matrix_source: self.matrix_source?,
            dispatch,
        })
    }
}

pub struct Pipeline<F, P, S> {
    fleet: F,
    matrix_builder: MatrixBuilder<P>,
    solve_options: SolveOptions,
    dispatcher: Dispatcher<S>,
}

impl Pipeline<HttpFleetSource, MapboxClient, HttpDispatchSink> {
    /// Production wiring: order service, Mapbox (when keyed), delivery service.
    pub fn from_config(config: &PlannerConfig) -> Result<Self, UpstreamError> {
        Ok(Self::new(
            HttpFleetSource::new(config)?,
            MatrixBuilder::from_config(config)?,
            SolveOptions::from_config(config),
            Dispatcher::new(HttpDispatchSink::new(config)?),
        ))
    }
}

impl<F, P, S> Pipeline<F, P, S>
where
    F: FleetSource,
    P: RoutingProvider + Sync,
    S: DispatchSink,
{
    pub fn new(
        fleet: F,
        matrix_builder: MatrixBuilder<P>,
        solve_options: SolveOptions,
        dispatcher: Dispatcher<S>,
    ) -> Self {
        Self {
            fleet,
            matrix_builder,
            solve_options,
            dispatcher,
        }
    }

    /// Runs every stage in order and returns the full report.
    pub fn execute(
        &self,
        request: &PlanningRequest,
        cancel: &CancellationToken,
    ) -> Result<PlanningReport, PlanningError> {
        let mut progress = Progress::default();
        let confirmation = self.drive(request, cancel, &mut progress)?;

        Ok(PlanningReport {
            plan: progress.plan.unwrap_or_default(),
            matrix_source: progress.matrix_source.unwrap_or(MatrixSource::Fallback),
            confirmation,
        })
    }

    /// Like [`Pipeline::execute`], folded into a caller-facing response.
    /// A partial dispatch failure still carries the plan and the per-driver
    /// confirmation.
    pub fn run(&self, request: &PlanningRequest, cancel: &CancellationToken) -> PlanningResponse {
        let mut progress = Progress::default();
        match self.drive(request, cancel, &mut progress) {
            Ok(confirmation) => {
                let message = completion_message(request, progress.plan.as_ref());
                PlanningResponse {
                    status: RunStatus::Completed,
                    message,
                    failed_stage: None,
                    result: progress.into_result(Some(confirmation)),
                }
            }
            Err(err) => {
                let dispatch = match &err {
                    PlanningError::Dispatch(DispatchError::PartialDispatchFailure { confirmation, .. }) => {
                        Some(confirmation.clone())
                    }
                    _ => None,
                };
                PlanningResponse {
                    status: RunStatus::Failed,
                    message: err.to_string(),
                    failed_stage: Some(err.stage()),
                    result: progress.into_result(dispatch),
                }
            }
        }
    }

    fn drive(
        &self,
        request: &PlanningRequest,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<DispatchConfirmation, PlanningError> {
        let area = request.area.as_str();
        let date = request.date.trim();

        let outcome = self.stages(request, date, cancel, progress);
        match &outcome {
            Ok(_) => info!(area, date, stage = %PipelineStage::Completed, "planning run finished"),
            Err(err) => warn!(area, date, stage = %err.stage(), error = %err, "planning run failed"),
        }
        outcome
    }

    fn stages(
        &self,
        request: &PlanningRequest,
        date: &str,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<DispatchConfirmation, PlanningError> {
        let area = request.area.as_str();
        request.route_date()?;

        enter(area, date, PipelineStage::FetchingFleet);
        let fleet = self.fleet.fetch_fleet(area, date).map_err(PlanningError::Fleet)?;

        enter(area, date, PipelineStage::BuildingMatrix);
        let locations = LocationList::from_fleet(&fleet);
        let outcome = self.matrix_builder.build_matrix(&locations, cancel);
        progress.matrix_source = Some(outcome.source);

        enter(area, date, PipelineStage::Solving);
        let plan = solver::solve(&outcome.matrix, &fleet.orders, &fleet.drivers, &self.solve_options)
            .map_err(PlanningError::Solve)?;

        enter(area, date, PipelineStage::Dispatching);
        let dispatched = self.dispatcher.dispatch(&plan, date);
        progress.plan = Some(plan);
        dispatched.map_err(PlanningError::Dispatch)
    }
}

fn enter(area: &str, date: &str, stage: PipelineStage) {
    info!(area, date, stage = %stage, "planning run entered stage");
}

fn completion_message(request: &PlanningRequest, plan: Option<&Plan>) -> String {
    let Some(plan) = plan else {
        return format!("planned routes for {} on {}", request.area, request.date);
    };
    let mut message = format!(
        "planned {} route(s) for {} on {}",
        plan.routes.len(),
        request.area,
        request.date.trim()
    );
    if plan.is_infeasible() {
        message.push_str(&format!(
            "; {} order(s) exceed fleet capacity and were left unassigned",
            plan.unassigned_order_ids.len()
        ));
    }
    message
}
