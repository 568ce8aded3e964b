//! Fleet data source backed by the order service.
//!
//! Pending orders come from `GET {order_service_url}/orders`. The order
//! service knows nothing about drivers or depots, so those come from the
//! planner configuration.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::PlannerConfig;
use crate::error::UpstreamError;
use crate::model::{Depot, Driver, Fleet, Order};
use crate::traits::FleetSource;

const ORDER_SERVICE: &str = "order service";
const PENDING: &str = "PENDING";

/// Raw order record as served by the order service. Only the fields the
/// planner reads are modelled; everything else is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: Option<String>,
    pub status: Option<String>,
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub demand: Option<u32>,
    #[serde(default)]
    pub items: Vec<OrderItemRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemRecord {
    #[serde(default)]
    pub quantity: u32,
}

impl OrderRecord {
    /// Total item quantity, else the explicit demand, else `default`.
    /// `None` when the item quantities do not fit in a `u32`.
    fn demand_or(&self, default: u32) -> Option<u32> {
        if self.items.is_empty() {
            return Some(self.demand.unwrap_or(default));
        }
        self.items
            .iter()
            .try_fold(0u32, |total, item| total.checked_add(item.quantity))
    }
}

pub struct HttpFleetSource {
    client: reqwest::blocking::Client,
    order_service_url: String,
    depot: Depot,
    drivers: Vec<Driver>,
    default_demand: u32,
}

impl HttpFleetSource {
    pub fn new(config: &PlannerConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.provider_timeout.max(Duration::from_secs(1)))
            .build()
            .map_err(|err| UpstreamError::from_reqwest(ORDER_SERVICE, &err))?;

        Ok(Self {
            client,
            order_service_url: config.order_service_url.trim_end_matches('/').to_string(),
            depot: config.depot.clone(),
            drivers: config.drivers.clone(),
            default_demand: config.default_order_demand,
        })
    }

    fn orders_url(&self) -> String {
        format!("{}/orders", self.order_service_url)
    }

    fn fetch_records(&self) -> Result<Vec<OrderRecord>, UpstreamError> {
        self.client
            .get(self.orders_url())
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::json::<Vec<OrderRecord>>)
            .map_err(|err| UpstreamError::from_reqwest(ORDER_SERVICE, &err))
    }
}

impl FleetSource for HttpFleetSource {
    fn fetch_fleet(&self, area: &str, date: &str) -> Result<Fleet, UpstreamError> {
        let records = self.fetch_records()?;
        let orders = pending_orders(records, self.default_demand)?;
        let drivers = validate_drivers(&self.drivers)?;
        info!(area, date, orders = orders.len(), drivers = drivers.len(), "fetched fleet");

        Ok(Fleet {
            orders,
            drivers,
            depot: self.depot.clone(),
        })
    }
}

/// Turns raw records into routable orders.
///
/// Records without an id or status are schema violations and fail the call.
/// Non-pending records are skipped. Pending records without a usable address,
/// repeats of an id already seen, and records whose demand cannot be
/// represented are dropped with a warning.
pub fn pending_orders(records: Vec<OrderRecord>, default_demand: u32) -> Result<Vec<Order>, UpstreamError> {
    let mut seen = HashSet::new();
    let mut orders = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        let id = record
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| UpstreamError::malformed(ORDER_SERVICE, format!("order record {index} has no id")))?;
        let status = record
            .status
            .as_deref()
            .ok_or_else(|| UpstreamError::malformed(ORDER_SERVICE, format!("order {id} has no status")))?;
        if status != PENDING {
            continue;
        }

        let Some(address) = record
            .shipping_address
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
        else {
            warn!(order_id = id, "dropping pending order without a delivery address");
            continue;
        };
        if !seen.insert(id.to_string()) {
            warn!(order_id = id, "dropping duplicate order id");
            continue;
        }

        let Some(demand) = record.demand_or(default_demand) else {
            warn!(order_id = id, "dropping order whose item quantities overflow");
            continue;
        };

        orders.push(Order::new(id, address, demand));
    }

    Ok(orders)
}

fn validate_drivers(drivers: &[Driver]) -> Result<Vec<Driver>, UpstreamError> {
    let mut seen = HashSet::new();
    for driver in drivers {
        if driver.capacity == 0 {
            return Err(UpstreamError::malformed(
                "fleet configuration",
                format!("driver {} has zero capacity", driver.id),
            ));
        }
        if !seen.insert(driver.id.as_str()) {
            return Err(UpstreamError::malformed(
                "fleet configuration",
                format!("driver id {} appears twice", driver.id),
            ));
        }
    }
    Ok(drivers.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(json: &str) -> Vec<OrderRecord> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn keeps_only_pending_orders() {
        let orders = pending_orders(
            records(
                r#"[
                {"id": "o1", "status": "PENDING", "shippingAddress": "1 First St"},
                {"id": "o2", "status": "SHIPPED", "shippingAddress": "2 Second St"},
                {"id": "o3", "status": "PENDING", "shippingAddress": "3 Third St", "totalAmount": 12.5}
            ]"#,
            ),
            1,
        )
        .unwrap();
        let ids: Vec<_> = orders.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["o1", "o3"]);
    }

    #[test]
    fn demand_comes_from_line_items() {
        let orders = pending_orders(
            records(
                r#"[
                {"id": "o1", "status": "PENDING", "shippingAddress": "A", "items": [{"quantity": 2}, {"quantity": 3}]},
                {"id": "o2", "status": "PENDING", "shippingAddress": "B", "demand": 4},
                {"id": "o3", "status": "PENDING", "shippingAddress": "C"}
            ]"#,
            ),
            1,
        )
        .unwrap();
        let demands: Vec<_> = orders.iter().map(|o| o.demand).collect();
        assert_eq!(demands, [5, 4, 1]);
    }

    #[test]
    fn drops_pending_orders_without_address() {
        let orders = pending_orders(
            records(
                r#"[
                {"id": "o1", "status": "PENDING", "shippingAddress": "  "},
                {"id": "o2", "status": "PENDING"},
                {"id": "o3", "status": "PENDING", "shippingAddress": "3 Third St"}
            ]"#,
            ),
            1,
        )
        .unwrap();
        assert_eq!(orders, vec![Order::new("o3", "3 Third St", 1)]);
    }

    #[test]
    fn drops_duplicate_ids() {
        let orders = pending_orders(
            records(
                r#"[
                {"id": "o1", "status": "PENDING", "shippingAddress": "first"},
                {"id": "o1", "status": "PENDING", "shippingAddress": "second"}
            ]"#,
            ),
            1,
        )
        .unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].delivery_address, "first");
    }

    #[test]
    fn drops_orders_whose_quantities_overflow() {
        let orders = pending_orders(
            records(
                r#"[
                {"id": "o1", "status": "PENDING", "shippingAddress": "A",
                 "items": [{"quantity": 3000000000}, {"quantity": 3000000000}]},
                {"id": "o2", "status": "PENDING", "shippingAddress": "B", "items": [{"quantity": 4294967295}]}
            ]"#,
            ),
            1,
        )
        .unwrap();
        assert_eq!(orders, vec![Order::new("o2", "B", u32::MAX)]);
    }

    #[test]
    fn missing_id_is_malformed() {
        let err = pending_orders(records(r#"[{"status": "PENDING", "shippingAddress": "A"}]"#), 1).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn missing_status_is_malformed() {
        let err = pending_orders(records(r#"[{"id": "o1", "shippingAddress": "A"}]"#), 1).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn zero_capacity_driver_is_rejected() {
        assert!(validate_drivers(&[Driver::new("d", 0)]).is_err());
        assert!(validate_drivers(&[Driver::new("d", 1), Driver::new("d", 2)]).is_err());
        assert!(validate_drivers(&[Driver::new("d", 1)]).is_ok());
    }

    #[test]
    fn unreachable_order_service_is_unavailable() {
        let config = PlannerConfig {
            order_service_url: "http://127.0.0.1:9/".to_string(),
            provider_timeout: Duration::from_secs(1),
            ..PlannerConfig::default()
        };
        let source = HttpFleetSource::new(&config).unwrap();
        assert_eq!(source.orders_url(), "http://127.0.0.1:9/orders");

        let err = source.fetch_fleet("downtown", "2025-07-11").unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable { .. }), "got {err:?}");
    }
}
