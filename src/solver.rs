//! Capacitated route solver.
//!
//! Heuristic, not exact: the plan is capacity-feasible and fully determined
//! by its inputs, but not guaranteed optimal. Phases:
//!
//! 1. Admission: when total demand exceeds total capacity, orders are packed
//!    first-fit in increasing demand order; whatever does not fit is reported
//!    unassigned up front.
//! 2. Construction: each driver in turn extends their route from the depot
//!    with the cheapest-arc unvisited order that still fits, until full.
//! 3. Repair: admitted orders left over by construction are placed at their
//!    cheapest feasible insertion point in any route.
//! 4. Local search: 2-opt within routes and relocate moves across routes,
//!    accepting strictly improving moves only.
//!
//! Ties always go to the lower input index (orders, then drivers, then
//! positions), so identical inputs give identical plans.

use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::error::SolveError;
use crate::model::{Driver, LocationList, Order, Plan, Route, TravelMatrix};

/// Matrix index of the depot.
const DEPOT: usize = 0;

#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Count the return leg to the depot in route cost.
    pub round_trip_cost: bool,
    /// Maximum rounds of local search improvement.
    pub local_search_iterations: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            round_trip_cost: true,
            local_search_iterations: 100,
        }
    }
}

impl SolveOptions {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            round_trip_cost: config.round_trip_cost,
            local_search_iterations: config.local_search_iterations,
        }
    }
}

#[derive(Debug, Clone)]
struct RouteState<'a> {
    driver: &'a Driver,
    /// Positions into the order slice, in visiting order.
    stops: Vec<usize>,
    load: u64,
    cost: u64,
}

impl RouteState<'_> {
    fn capacity(&self) -> u64 {
        u64::from(self.driver.capacity)
    }

    fn fits(&self, demand: u32) -> bool {
        self.load + u64::from(demand) <= self.capacity()
    }
}

#[derive(Debug, Clone, Copy)]
struct CostModel<'a> {
    matrix: &'a TravelMatrix,
    round_trip: bool,
}

impl CostModel<'_> {
    fn arc(&self, from: usize, to: usize) -> u64 {
        self.matrix.get(from, to)
    }

    fn route_cost(&self, stops: &[usize]) -> u64 {
        let mut cost = 0u64;
        let mut previous = DEPOT;
        for &position in stops {
            let node = LocationList::order_index(position);
            cost = cost.saturating_add(self.arc(previous, node));
            previous = node;
        }
        if self.round_trip && !stops.is_empty() {
            cost = cost.saturating_add(self.arc(previous, DEPOT));
        }
        cost
    }

    /// Cost change from inserting order `position` before `stops[at]`.
    fn insertion_delta(&self, stops: &[usize], at: usize, position: usize) -> i128 {
        let node = LocationList::order_index(position);
        let previous = if at == 0 {
            DEPOT
        } else {
            LocationList::order_index(stops[at - 1])
        };
        let next = match stops.get(at) {
            Some(&following) => Some(LocationList::order_index(following)),
            None if self.round_trip => Some(DEPOT),
            None => None,
        };

        let added = self
            .arc(previous, node)
            .saturating_add(next.map_or(0, |next| self.arc(node, next)));
        let removed = next.map_or(0, |next| self.arc(previous, next));
        i128::from(added) - i128::from(removed)
    }
}

/// Assigns orders to drivers and sequences each route.
///
/// Fails only when `matrix` does not have one row per order plus the depot.
pub fn solve(
    matrix: &TravelMatrix,
    orders: &[Order],
    drivers: &[Driver],
    options: &SolveOptions,
) -> Result<Plan, SolveError> {
    let expected = orders.len() + 1;
    if matrix.size() != expected {
        return Err(SolveError::MatrixShape {
            expected,
            actual: matrix.size(),
        });
    }

    let costs = CostModel {
        matrix,
        round_trip: options.round_trip_cost,
    };
    let admitted = admit_orders(orders, drivers);
    let mut placed = vec![false; orders.len()];
    let mut routes: Vec<RouteState<'_>> = drivers
        .iter()
        .map(|driver| RouteState {
            driver,
            stops: Vec::new(),
            load: 0,
            cost: 0,
        })
        .collect();

    construct(&mut routes, orders, &admitted, &mut placed, costs);
    repair(&mut routes, orders, &admitted, &mut placed, costs);
    local_search(&mut routes, orders, costs, options.local_search_iterations);

    let plan = build_plan(&routes, orders, &placed);
    info!(
        routes = plan.routes.len(),
        unassigned = plan.unassigned_order_ids.len(),
        total_time_seconds = plan.total_time_seconds(),
        "solved routes"
    );
    Ok(plan)
}

/// Orders that take part in routing. Everything is admitted when the fleet
/// can carry the total demand; otherwise orders are packed first-fit by
/// increasing demand and the rest are turned away.
fn admit_orders(orders: &[Order], drivers: &[Driver]) -> Vec<bool> {
    let total_demand: u64 = orders.iter().map(|order| u64::from(order.demand)).sum();
    let total_capacity: u64 = drivers.iter().map(|driver| u64::from(driver.capacity)).sum();
    if total_demand <= total_capacity {
        return vec![true; orders.len()];
    }

    let mut by_demand: Vec<usize> = (0..orders.len()).collect();
    by_demand.sort_by_key(|&position| (orders[position].demand, position));

    let mut residual: Vec<u64> = drivers.iter().map(|driver| u64::from(driver.capacity)).collect();
    let mut admitted = vec![false; orders.len()];
    for position in by_demand {
        let demand = u64::from(orders[position].demand);
        if let Some(slot) = residual.iter_mut().find(|slot| **slot >= demand) {
            *slot -= demand;
            admitted[position] = true;
        }
    }

    debug!(
        total_demand,
        total_capacity,
        admitted = admitted.iter().filter(|&&a| a).count(),
        "demand exceeds fleet capacity"
    );
    admitted
}

fn construct(
    routes: &mut [RouteState<'_>],
    orders: &[Order],
    admitted: &[bool],
    placed: &mut [bool],
    costs: CostModel<'_>,
) {
    for route in routes.iter_mut() {
        let mut current = DEPOT;
        loop {
            let next = (0..orders.len())
                .filter(|&position| admitted[position] && !placed[position])
                .filter(|&position| route.fits(orders[position].demand))
                .min_by_key(|&position| (costs.arc(current, LocationList::order_index(position)), position));

            let Some(position) = next else { break };
            placed[position] = true;
            route.stops.push(position);
            route.load += u64::from(orders[position].demand);
            current = LocationList::order_index(position);
        }
        route.cost = costs.route_cost(&route.stops);

        if (0..orders.len()).all(|position| !admitted[position] || placed[position]) {
            break;
        }
    }
}

fn repair(
    routes: &mut [RouteState<'_>],
    orders: &[Order],
    admitted: &[bool],
    placed: &mut [bool],
    costs: CostModel<'_>,
) {
    for position in 0..orders.len() {
        if !admitted[position] || placed[position] {
            continue;
        }

        let mut best: Option<(i128, usize, usize)> = None;
        for (route_index, route) in routes.iter().enumerate() {
            if !route.fits(orders[position].demand) {
                continue;
            }
            for at in 0..=route.stops.len() {
                let candidate = (costs.insertion_delta(&route.stops, at, position), route_index, at);
                if best.is_none_or(|current| candidate < current) {
                    best = Some(candidate);
                }
            }
        }

        if let Some((_, route_index, at)) = best {
            let route = &mut routes[route_index];
            route.stops.insert(at, position);
            route.load += u64::from(orders[position].demand);
            route.cost = costs.route_cost(&route.stops);
            placed[position] = true;
        }
    }
}

/// 2-opt: reverse a segment within a route. Segments are evaluated on the
/// full route cost, so asymmetric matrices are handled correctly.
fn two_opt_improve(route: &mut RouteState<'_>, costs: CostModel<'_>) -> bool {
    let n = route.stops.len();
    if n < 2 {
        return false;
    }

    for i in 0..n - 1 {
        for j in i + 1..n {
            let mut candidate = route.stops.clone();
            candidate[i..=j].reverse();
            let cost = costs.route_cost(&candidate);
            if cost < route.cost {
                route.stops = candidate;
                route.cost = cost;
                return true;
            }
        }
    }

    false
}

/// Relocate: move one stop to another position, in the same route or in a
/// different route with spare capacity.
fn relocate_improve(routes: &mut [RouteState<'_>], orders: &[Order], costs: CostModel<'_>) -> bool {
    for from in 0..routes.len() {
        for k in 0..routes[from].stops.len() {
            let position = routes[from].stops[k];
            let demand = orders[position].demand;

            let mut shortened = routes[from].stops.clone();
            shortened.remove(k);
            let shortened_cost = costs.route_cost(&shortened);

            for to in 0..routes.len() {
                if to == from {
                    for at in 0..=shortened.len() {
                        if at == k {
                            continue;
                        }
                        let mut candidate = shortened.clone();
                        candidate.insert(at, position);
                        let cost = costs.route_cost(&candidate);
                        if cost < routes[from].cost {
                            routes[from].stops = candidate;
                            routes[from].cost = cost;
                            return true;
                        }
                    }
                    continue;
                }

                if !routes[to].fits(demand) {
                    continue;
                }
                let before = routes[from].cost.saturating_add(routes[to].cost);
                for at in 0..=routes[to].stops.len() {
                    let mut candidate = routes[to].stops.clone();
                    candidate.insert(at, position);
                    let cost = costs.route_cost(&candidate);
                    if shortened_cost.saturating_add(cost) < before {
                        routes[from].stops = shortened;
                        routes[from].cost = shortened_cost;
                        routes[from].load -= u64::from(demand);
                        routes[to].stops = candidate;
                        routes[to].cost = cost;
                        routes[to].load += u64::from(demand);
                        return true;
                    }
                }
            }
        }
    }

    false
}

/// Run local search until no move improves or the iteration budget runs out.
fn local_search(routes: &mut [RouteState<'_>], orders: &[Order], costs: CostModel<'_>, iterations: usize) {
    for _ in 0..iterations {
        let mut improved = false;

        for route in routes.iter_mut() {
            if two_opt_improve(route, costs) {
                improved = true;
            }
        }

        if relocate_improve(routes, orders, costs) {
            improved = true;
        }

        if !improved {
            break;
        }
    }
}

fn build_plan(routes: &[RouteState<'_>], orders: &[Order], placed: &[bool]) -> Plan {
    let mut plan = Plan::default();
    for route in routes.iter().filter(|route| !route.stops.is_empty()) {
        let stops = route.stops.iter().map(|&position| &orders[position]);
        plan.routes.insert(
            route.driver.id.clone(),
            Route {
                order_ids: stops.clone().map(|order| order.id.clone()).collect(),
                addresses: stops.map(|order| order.delivery_address.clone()).collect(),
                total_time_seconds: route.cost,
                load: u32::try_from(route.load).unwrap_or(route.driver.capacity),
            },
        );
    }
    plan.unassigned_order_ids = orders
        .iter()
        .zip(placed)
        .filter(|(_, placed)| !**placed)
        .map(|(order, _)| order.id.clone())
        .collect();
    plan
}
