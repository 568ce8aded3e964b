use std::collections::HashMap;
use std::sync::Mutex;

use lastmile_planner::cancel::CancellationToken;
use lastmile_planner::dispatch::{Dispatcher, DriverDispatch};
use lastmile_planner::error::{PlanningError, UpstreamError};
use lastmile_planner::estimate::FallbackEstimator;
use lastmile_planner::matrix::{MatrixBuilder, MatrixSource};
use lastmile_planner::model::{Coordinates, Depot, Driver, Fleet, LocationList, Order, TravelMatrix};
use lastmile_planner::pipeline::{Pipeline, PipelineStage, PlanningRequest, RunStatus};
use lastmile_planner::solver::SolveOptions;
use lastmile_planner::traits::{
    Acknowledgment, Directions, DirectionsProvider, DispatchSink, DistanceMatrixProvider, FleetSource, Geocoder,
    RouteSubmission,
};

const DEPOT: &str = "1 Rocket Road, Hawthorne, CA";

struct StaticFleet {
    fleet: Fleet,
}

impl StaticFleet {
    fn new(orders: Vec<Order>, drivers: Vec<Driver>) -> Self {
        Self {
            fleet: Fleet {
                orders,
                drivers,
                depot: Depot::new(DEPOT),
            },
        }
    }
}

impl FleetSource for StaticFleet {
    fn fetch_fleet(&self, _area: &str, _date: &str) -> Result<Fleet, UpstreamError> {
        Ok(self.fleet.clone())
    }
}

struct UnreachableFleet;

impl FleetSource for UnreachableFleet {
    fn fetch_fleet(&self, _area: &str, _date: &str) -> Result<Fleet, UpstreamError> {
        Err(UpstreamError::Unavailable {
            service: "order service",
            message: "connection refused".to_string(),
        })
    }
}

/// Known addresses sit on a grid; travel time is the Manhattan distance in
/// minutes.
struct GridProvider {
    places: HashMap<&'static str, (f64, f64)>,
}

impl GridProvider {
    fn new(places: &[(&'static str, (f64, f64))]) -> Self {
        Self {
            places: places.iter().copied().collect(),
        }
    }
}

impl Geocoder for GridProvider {
    fn geocode(&self, address: &str) -> Result<Option<Coordinates>, UpstreamError> {
        Ok(self.places.get(address).map(|&(x, y)| Coordinates::new(x, y)))
    }
}

impl DistanceMatrixProvider for GridProvider {
    fn matrix_for(&self, locations: &[Coordinates]) -> Result<TravelMatrix, UpstreamError> {
        let rows = locations
            .iter()
            .map(|a| {
                locations
                    .iter()
                    .map(|b| (((a.longitude - b.longitude).abs() + (a.latitude - b.latitude).abs()) * 60.0) as u64)
                    .collect()
            })
            .collect();
        TravelMatrix::from_rows(rows).ok_or_else(|| UpstreamError::MalformedData {
            service: "matrix provider",
            message: "ragged".to_string(),
        })
    }
}

impl DirectionsProvider for GridProvider {
    fn directions(&self, _from: Coordinates, _to: Coordinates) -> Result<Directions, UpstreamError> {
        Err(UpstreamError::Rejected {
            service: "directions provider",
            status: 503,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    reject: Vec<&'static str>,
    submissions: Mutex<Vec<RouteSubmission>>,
}

impl DispatchSink for RecordingSink {
    fn submit(&self, submission: &RouteSubmission) -> Result<Acknowledgment, UpstreamError> {
        self.submissions.lock().unwrap().push(submission.clone());
        if self.reject.contains(&submission.driver_id.as_str()) {
            return Err(UpstreamError::Rejected {
                service: "delivery service",
                status: 500,
            });
        }
        Ok(Acknowledgment {
            id: Some(format!("route-{}", submission.driver_id)),
            route_number: Some("R-1".to_string()),
        })
    }
}

fn grid() -> GridProvider {
    GridProvider::new(&[
        (DEPOT, (0.0, 0.0)),
        ("1 North St", (0.0, 1.0)),
        ("2 North St", (0.0, 2.0)),
        ("1 East St", (1.0, 0.0)),
        ("2 East St", (2.0, 0.0)),
    ])
}

fn request() -> PlanningRequest {
    PlanningRequest::new("hawthorne", "2025-07-11")
}

fn pipeline<F: FleetSource>(
    fleet: F,
    provider: GridProvider,
    sink: RecordingSink,
) -> Pipeline<F, GridProvider, RecordingSink> {
    Pipeline::new(
        fleet,
        MatrixBuilder::with_provider(provider, 4),
        SolveOptions::default(),
        Dispatcher::new(sink),
    )
}

fn north_and_east_orders() -> Vec<Order> {
    vec![
        Order::new("n2", "2 North St", 1),
        Order::new("e1", "1 East St", 1),
        Order::new("n1", "1 North St", 1),
        Order::new("e2", "2 East St", 1),
    ]
}

#[test]
fn live_run_routes_every_order_and_dispatches() {
    let fleet = StaticFleet::new(north_and_east_orders(), vec![Driver::new("DRV-A", 2), Driver::new("DRV-B", 2)]);
    let report = pipeline(fleet, grid(), RecordingSink::default())
        .execute(&request(), &CancellationToken::new())
        .unwrap();

    assert_eq!(report.matrix_source, MatrixSource::Live);
    assert!(report.plan.unassigned_order_ids.is_empty());
    assert_eq!(report.plan.route_for("DRV-A").unwrap().order_ids, ["e1", "e2"]);
    assert_eq!(report.plan.route_for("DRV-B").unwrap().order_ids, ["n1", "n2"]);
    assert_eq!(report.confirmation.submitted(), 2);
    assert_eq!(report.confirmation.route_date, "2025-07-11");
}

#[test]
fn unknown_address_switches_whole_run_to_fallback() {
    let mut orders = north_and_east_orders();
    orders.push(Order::new("x", "Nowhere Lane", 1));
    let drivers = vec![Driver::new("DRV-A", 5)];
    let expected_matrix = FallbackEstimator::default().matrix_for(
        LocationList::new(&Depot::new(DEPOT), &orders).addresses(),
    );

    let fleet = StaticFleet::new(orders.clone(), drivers.clone());
    let report = pipeline(fleet, grid(), RecordingSink::default())
        .execute(&request(), &CancellationToken::new())
        .unwrap();

    assert_eq!(report.matrix_source, MatrixSource::Fallback);
    let expected_plan =
        lastmile_planner::solver::solve(&expected_matrix, &orders, &drivers, &SolveOptions::default()).unwrap();
    assert_eq!(report.plan, expected_plan);
}

#[test]
fn cancelled_run_still_completes_on_fallback() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let fleet = StaticFleet::new(north_and_east_orders(), vec![Driver::new("DRV-A", 4)]);

    let response = pipeline(fleet, grid(), RecordingSink::default()).run(&request(), &cancel);

    assert_eq!(response.status, RunStatus::Completed);
    assert_eq!(response.result.unwrap().matrix_source, MatrixSource::Fallback);
}

#[test]
fn fleet_failure_aborts_before_routing() {
    let planner = pipeline(UnreachableFleet, grid(), RecordingSink::default());

    let err = planner.execute(&request(), &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, PlanningError::Fleet(_)));
    assert_eq!(err.stage(), PipelineStage::FetchingFleet);

    let response = planner.run(&request(), &CancellationToken::new());
    assert_eq!(response.status, RunStatus::Failed);
    assert_eq!(response.failed_stage, Some(PipelineStage::FetchingFleet));
    assert_eq!(
        response.message,
        "fetching fleet failed: order service is unavailable: connection refused"
    );
    assert!(response.result.is_none());
}

#[test]
fn partial_dispatch_failure_names_the_rejected_driver() {
    let orders = vec![Order::new("n1", "1 North St", 1), Order::new("e1", "1 East St", 1)];
    let drivers = vec![Driver::new("DRV-A", 1), Driver::new("DRV-B", 1)];
    let sink = RecordingSink {
        reject: vec!["DRV-B"],
        ..RecordingSink::default()
    };
    let planner = pipeline(StaticFleet::new(orders, drivers), grid(), sink);

    let response = planner.run(&request(), &CancellationToken::new());

    assert_eq!(response.status, RunStatus::Failed);
    assert_eq!(response.failed_stage, Some(PipelineStage::Dispatching));
    assert_eq!(
        response.message,
        "dispatching routes failed: dispatch failed for drivers: DRV-B"
    );

    let result = response.result.unwrap();
    assert_eq!(result.plan.routes.len(), 2);
    let dispatch = result.dispatch.unwrap();
    assert!(dispatch.outcome_for("DRV-A").unwrap().is_success());
    assert!(matches!(
        dispatch.outcome_for("DRV-B"),
        Some(DriverDispatch::Failed { .. })
    ));
    assert_eq!(dispatch.failed_driver_ids(), ["DRV-B"]);
}

#[test]
fn empty_fleet_completes_without_submissions() {
    let fleet = StaticFleet::new(Vec::new(), vec![Driver::new("DRV-A", 15)]);
    let planner = pipeline(fleet, grid(), RecordingSink::default());

    let report = planner.execute(&request(), &CancellationToken::new()).unwrap();

    assert!(report.plan.is_empty());
    assert!(report.confirmation.outcomes.is_empty());
}

#[test]
fn independent_runs_can_share_a_pipeline_across_threads() {
    let fleet = StaticFleet::new(north_and_east_orders(), vec![Driver::new("DRV-A", 2), Driver::new("DRV-B", 2)]);
    let planner = pipeline(fleet, grid(), RecordingSink::default());
    let baseline = planner.execute(&request(), &CancellationToken::new()).unwrap();

    let reports: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["2025-07-12", "2025-07-13", "2025-07-14"]
            .into_iter()
            .map(|date| {
                let planner = &planner;
                scope.spawn(move || {
                    planner
                        .execute(&PlanningRequest::new("hawthorne", date), &CancellationToken::new())
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    for report in reports {
        assert_eq!(report.plan, baseline.plan);
        assert_eq!(report.confirmation.submitted(), 2);
    }
}

#[test]
fn route_between_falls_back_when_directions_fail() {
    let builder = MatrixBuilder::with_provider(grid(), 2);
    let estimate = builder.route_between(DEPOT, "1 North St", &CancellationToken::new());

    let fallback = FallbackEstimator::default().route_between(DEPOT, "1 North St");
    assert_eq!(estimate.source, MatrixSource::Fallback);
    assert_eq!(estimate.duration_seconds, fallback.duration_seconds);
    assert_eq!(estimate.distance_meters, u64::from(fallback.distance_km) * 1000);
}
