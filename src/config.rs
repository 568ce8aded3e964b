//! Planner configuration.
//!
//! One explicit struct handed to every component constructor. Environment
//! variables are read once, at the edge, by [`PlannerConfig::from_env`].

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::model::{Depot, Driver};

const DEFAULT_ROUTING_BASE_URL: &str = "https://api.mapbox.com";
const DEFAULT_ORDER_SERVICE_URL: &str = "http://order-service:3002";
const DEFAULT_DELIVERY_SERVICE_URL: &str = "http://delivery-service:3004";
const DEFAULT_DEPOT_ADDRESS: &str = "1 Rocket Road, Hawthorne, CA";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_GEOCODE_CONCURRENCY: usize = 5;
const MAX_GEOCODE_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Enables the live geocoding + matrix path when present.
    pub routing_api_key: Option<String>,
    pub routing_base_url: String,
    /// Per-call timeout for every collaborator request.
    pub provider_timeout: Duration,
    /// Upper bound on parallel geocode lookups.
    pub geocode_concurrency_limit: usize,
    /// Include the return-to-depot leg in route cost.
    pub round_trip_cost: bool,
    pub local_search_iterations: usize,
    pub order_service_url: String,
    pub delivery_service_url: String,
    pub depot: Depot,
    pub drivers: Vec<Driver>,
    /// Demand assigned to orders that carry no line items.
    pub default_order_demand: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            routing_api_key: None,
            routing_base_url: DEFAULT_ROUTING_BASE_URL.to_string(),
            provider_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            geocode_concurrency_limit: DEFAULT_GEOCODE_CONCURRENCY,
            round_trip_cost: true,
            local_search_iterations: 100,
            order_service_url: DEFAULT_ORDER_SERVICE_URL.to_string(),
            delivery_service_url: DEFAULT_DELIVERY_SERVICE_URL.to_string(),
            depot: Depot::new(DEFAULT_DEPOT_ADDRESS),
            drivers: vec![Driver::new("DRV-A", 15), Driver::new("DRV-B", 15)],
            default_order_demand: 1,
        }
    }
}

impl PlannerConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, falling back to defaults for
    /// anything missing or unparseable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let routing_api_key = get("MAPPING_API_KEY").or_else(|| get("MAPBOX_API_KEY"));
        let timeout_secs = parse_or("PROVIDER_TIMEOUT_SECS", get("PROVIDER_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS);
        let round_trip_cost = match get("ROUND_TRIP_COST") {
            Some(raw) => parse_flag(&raw).unwrap_or_else(|| {
                warn!(variable = "ROUND_TRIP_COST", value = %raw, "unrecognised flag, using default");
                defaults.round_trip_cost
            }),
            None => defaults.round_trip_cost,
        };
        let drivers = match get("FLEET_DRIVERS") {
            Some(raw) => parse_drivers(&raw).unwrap_or_else(|| {
                warn!(variable = "FLEET_DRIVERS", value = %raw, "invalid driver list, using default fleet");
                defaults.drivers.clone()
            }),
            None => defaults.drivers.clone(),
        };

        Self {
            routing_api_key,
            routing_base_url: get("MAPPING_API_URL").unwrap_or(defaults.routing_base_url),
            provider_timeout: Duration::from_secs(timeout_secs),
            geocode_concurrency_limit: parse_or(
                "GEOCODE_CONCURRENCY_LIMIT",
                get("GEOCODE_CONCURRENCY_LIMIT"),
                DEFAULT_GEOCODE_CONCURRENCY,
            )
            .clamp(1, MAX_GEOCODE_CONCURRENCY),
            round_trip_cost,
            local_search_iterations: parse_or(
                "LOCAL_SEARCH_ITERATIONS",
                get("LOCAL_SEARCH_ITERATIONS"),
                defaults.local_search_iterations,
            ),
            order_service_url: get("ORDER_SERVICE_URL").unwrap_or(defaults.order_service_url),
            delivery_service_url: get("DELIVERY_SERVICE_URL").unwrap_or(defaults.delivery_service_url),
            depot: get("DEPOT_ADDRESS").map_or(defaults.depot, Depot::new),
            drivers,
            default_order_demand: parse_or(
                "DEFAULT_ORDER_DEMAND",
                get("DEFAULT_ORDER_DEMAND"),
                defaults.default_order_demand,
            ),
        }
    }

    /// True when the live routing path can be attempted at all.
    pub fn has_routing_key(&self) -> bool {
        self.routing_api_key.is_some()
    }
}

fn parse_or<T: FromStr + Copy>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "unparseable value, using default");
            default
        }),
        None => default,
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses `id:capacity,id:capacity`. Every entry must have a non-empty id and
/// a positive capacity.
fn parse_drivers(raw: &str) -> Option<Vec<Driver>> {
    raw.split(',')
        .map(|entry| {
            let (id, capacity) = entry.trim().split_once(':')?;
            let capacity: u32 = capacity.trim().parse().ok()?;
            let id = id.trim();
            (!id.is_empty() && capacity > 0).then(|| Driver::new(id, capacity))
        })
        .collect()
}
