use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// Ordered waypoints of one leg. Shared so cache hits hand out the same route.
pub type Route = Arc<[Location]>;

/// Number of segments in a synthesized straight-line route.
pub const FALLBACK_STEPS: usize = 10;

impl Location {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Great-circle distance to `other` in km.
    pub fn distance_km(&self, other: &Location) -> f64 {
        haversine_distance(self.lat, self.lng, other.lat, other.lng)
    }
}

// Calculate haversine distance between two GPS coordinates (returns km)
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let r = 6371.0; // Earth radius in km
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    r * c
}

/// Sum of segment lengths from `waypoints[from]` to the last waypoint, in km.
pub fn path_distance_km(waypoints: &[Location], from: usize) -> f64 {
    waypoints
        .get(from..)
        .unwrap_or_default()
        .windows(2)
        .map(|pair| pair[0].distance_km(&pair[1]))
        .sum()
}

/// Evenly spaced points from `start` to `end`, both included.
pub fn straight_line(start: Location, end: Location, steps: usize) -> Route {
    let steps = steps.max(1);
    (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            Location {
                lat: start.lat + (end.lat - start.lat) * t,
                lng: start.lng + (end.lng - start.lng) * t,
            }
        })
        .collect()
}
