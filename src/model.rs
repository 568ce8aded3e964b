//! Planning-run data model.
//!
//! Everything here lives for exactly one planning run: the fleet snapshot
//! pulled from the order service, the location list handed to the matrix
//! builder, the travel matrix, and the plan produced by the solver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A pending delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub delivery_address: String,
    pub demand: u32,
}

impl Order {
    pub fn new(id: impl Into<String>, delivery_address: impl Into<String>, demand: u32) -> Self {
        Self {
            id: id.into(),
            delivery_address: delivery_address.into(),
            demand,
        }
    }
}

/// A driver and their vehicle. One vehicle per driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub capacity: u32,
}

impl Driver {
    pub fn new(id: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            capacity,
        }
    }
}

/// Where every route starts. Always matrix index 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depot {
    pub address: String,
}

impl Depot {
    /// Creates a depot at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// Output of the fleet data source: everything the rest of the run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fleet {
    pub orders: Vec<Order>,
    pub drivers: Vec<Driver>,
    pub depot: Depot,
}

/// A geocoded point. Providers speak `lon,lat`; keep both named to avoid
/// swapping them by accident.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

/// Ordered addresses for one run: the depot at index 0, then every order in
/// input order, so order `k` sits at index `k + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationList {
    addresses: Vec<String>,
}

impl LocationList {
    pub fn new(depot: &Depot, orders: &[Order]) -> Self {
        let mut addresses = Vec::with_capacity(orders.len() + 1);
        addresses.push(depot.address.clone());
        addresses.extend(orders.iter().map(|order| order.delivery_address.clone()));
        Self { addresses }
    }

    pub fn from_fleet(fleet: &Fleet) -> Self {
        Self::new(&fleet.depot, &fleet.orders)
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn depot_address(&self) -> &str {
        &self.addresses[0]
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Always false: the depot is present in every list.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Matrix index of the order at `position` in the input order list.
    pub const fn order_index(position: usize) -> usize {
        position + 1
    }
}

/// Dense `n×n` travel-time matrix in seconds, row-major.
///
/// The diagonal is always zero. Entries may be asymmetric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelMatrix {
    data: Vec<u64>,
    size: usize,
}

impl TravelMatrix {
    /// Creates a zero matrix of the given size.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size * size],
            size,
        }
    }

    /// Builds a matrix from explicit rows.
    ///
    /// Returns `None` unless `rows` is square. Diagonal entries are forced to
    /// zero.
    pub fn from_rows(rows: Vec<Vec<u64>>) -> Option<Self> {
        let size = rows.len();
        if rows.iter().any(|row| row.len() != size) {
            return None;
        }
        let mut matrix = Self {
            data: rows.into_iter().flatten().collect(),
            size,
        };
        for i in 0..size {
            matrix.set(i, i, 0);
        }
        Some(matrix)
    }

    /// Travel time from `from` to `to` in seconds.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn get(&self, from: usize, to: usize) -> u64 {
        self.data[from * self.size + to]
    }

    /// Sets the travel time from `from` to `to`.
    ///
    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn set(&mut self, from: usize, to: usize, seconds: u64) {
        self.data[from * self.size + to] = seconds;
    }

    /// Number of locations (rows and columns).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Copies the matrix out as one `Vec` per origin.
    pub fn rows(&self) -> Vec<Vec<u64>> {
        if self.size == 0 {
            return Vec::new();
        }
        self.data.chunks(self.size).map(<[u64]>::to_vec).collect()
    }

    /// True when every travel time is the same in both directions.
    pub fn is_symmetric(&self) -> bool {
        (0..self.size).all(|i| ((i + 1)..self.size).all(|j| self.get(i, j) == self.get(j, i)))
    }
}

/// One driver's visiting sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(rename = "routeOrderIds")]
    pub order_ids: Vec<String>,
    #[serde(rename = "routeAddresses")]
    pub addresses: Vec<String>,
    pub total_time_seconds: u64,
    pub load: u32,
}

impl Route {
    pub fn len(&self) -> usize {
        self.order_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order_ids.is_empty()
    }

    /// `(order id, delivery address)` pairs in visiting order.
    pub fn stops(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order_ids
            .iter()
            .zip(&self.addresses)
            .map(|(id, address)| (id.as_str(), address.as_str()))
    }
}

/// Solver output: routes keyed by driver id plus the orders nobody could take.
///
/// Drivers without stops never appear in `routes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub routes: BTreeMap<String, Route>,
    pub unassigned_order_ids: Vec<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// True when some orders could not be placed.
    pub fn is_infeasible(&self) -> bool {
        !self.unassigned_order_ids.is_empty()
    }

    pub fn route_for(&self, driver_id: &str) -> Option<&Route> {
        self.routes.get(driver_id)
    }

    pub fn routed_order_ids(&self) -> impl Iterator<Item = &str> {
        self.routes
            .values()
            .flat_map(|route| route.order_ids.iter().map(String::as_str))
    }

    pub fn total_time_seconds(&self) -> u64 {
        self.routes.values().map(|route| route.total_time_seconds).sum()
    }
}
