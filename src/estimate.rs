//! Deterministic travel estimates (fallback when live routing is unavailable).
//!
//! Distances are derived from a stable hash of the two address strings, so
//! the same pair of addresses yields the same estimate in every process, in
//! either order. Addresses that mention a major hub are pushed further apart.
//! The result is not a geographic distance; it only has to be stable and
//! plausible enough to rank routes.

use crate::model::TravelMatrix;

/// Keywords marking a major hub.
const MAJOR_HUBS: &[&str] = &[
    "delhi",
    "mumbai",
    "bangalore",
    "chennai",
    "kolkata",
    "new york",
    "los angeles",
    "london",
    "tokyo",
];

/// Tunable breakpoints of the estimator. None of the values are load-bearing.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackTuning {
    /// Lower bound of the base pseudo-distance, km.
    pub base_min_km: u32,
    /// Width of the base range, km.
    pub base_span_km: u32,
    /// Floor and span applied when both ends are hubs.
    pub hub_pair_min_km: u32,
    pub hub_pair_span_km: u32,
    /// Floor and span applied when exactly one end is a hub.
    pub single_hub_min_km: u32,
    pub single_hub_span_km: u32,
    /// Average speed used to turn distance into time.
    pub average_speed_kmh: u32,
}

impl Default for FallbackTuning {
    fn default() -> Self {
        Self {
            base_min_km: 200,
            base_span_km: 1000,
            hub_pair_min_km: 800,
            hub_pair_span_km: 600,
            single_hub_min_km: 400,
            single_hub_span_km: 400,
            average_speed_kmh: 55,
        }
    }
}

/// Point-to-point estimate without live routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairEstimate {
    pub distance_km: u32,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct FallbackEstimator {
    pub tuning: FallbackTuning,
}

impl FallbackEstimator {
    pub fn new(tuning: FallbackTuning) -> Self {
        Self { tuning }
    }

    /// Pseudo-distance between two addresses in km. Symmetric in its
    /// arguments; zero for the same normalised address.
    pub fn pseudo_distance_km(&self, a: &str, b: &str) -> u32 {
        let a = normalise(a);
        let b = normalise(b);
        if a == b {
            return 0;
        }
        let (first, second) = if a <= b { (&a, &b) } else { (&b, &a) };
        let hash = pair_hash(first, second);
        let t = &self.tuning;

        let mut km = t.base_min_km + spread(hash, t.base_span_km);
        match (is_hub(&a), is_hub(&b)) {
            (true, true) => km = km.max(t.hub_pair_min_km + spread(hash, t.hub_pair_span_km)),
            (true, false) | (false, true) => {
                km = km.max(t.single_hub_min_km + spread(hash, t.single_hub_span_km));
            }
            (false, false) => {}
        }
        km
    }

    /// Travel time for `km` at the configured average speed, rounded to the
    /// nearest second.
    pub fn km_to_seconds(&self, km: u32) -> u64 {
        let speed = u64::from(self.tuning.average_speed_kmh.max(1));
        (u64::from(km) * 3600 + speed / 2) / speed
    }

    pub fn duration_seconds(&self, a: &str, b: &str) -> u64 {
        self.km_to_seconds(self.pseudo_distance_km(a, b))
    }

    pub fn route_between(&self, origin: &str, destination: &str) -> PairEstimate {
        let distance_km = self.pseudo_distance_km(origin, destination);
        PairEstimate {
            distance_km,
            duration_seconds: self.km_to_seconds(distance_km),
        }
    }

    /// Full symmetric matrix for `addresses`, indexed in input order.
    pub fn matrix_for<S: AsRef<str>>(&self, addresses: &[S]) -> TravelMatrix {
        let n = addresses.len();
        let mut matrix = TravelMatrix::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let seconds = self.duration_seconds(addresses[i].as_ref(), addresses[j].as_ref());
                matrix.set(i, j, seconds);
                matrix.set(j, i, seconds);
            }
        }
        matrix
    }
}

fn normalise(address: &str) -> String {
    address.trim().to_lowercase()
}

fn is_hub(normalised: &str) -> bool {
    MAJOR_HUBS.iter().any(|hub| normalised.contains(hub))
}

/// First four bytes of the BLAKE3 digest of the ordered pair.
fn pair_hash(first: &str, second: &str) -> u32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(first.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(second.as_bytes());
    let digest = hasher.finalize();
    let bytes = digest.as_bytes();
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn spread(hash: u32, span: u32) -> u32 {
    if span == 0 { 0 } else { hash % span }
}
