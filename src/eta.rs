//! Remaining-distance and arrival-time estimation.

use crate::location::{path_distance_km, Location};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nominal bus speed used for estimates. The simulated speed is noisy, so the
/// ETA is computed against this instead.
pub const REFERENCE_SPEED_KMH: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    #[default]
    #[serde(alias = "light", alias = "Low", alias = "Light")]
    Low,
    #[serde(alias = "medium", alias = "Moderate", alias = "Medium")]
    Moderate,
    #[serde(alias = "high", alias = "Heavy", alias = "High")]
    Heavy,
    #[serde(alias = "Severe")]
    Severe,
}

impl TrafficLevel {
    pub fn multiplier(self) -> f64 {
        match self {
            TrafficLevel::Low => 1.0,
            TrafficLevel::Moderate => 1.5,
            TrafficLevel::Heavy => 2.0,
            TrafficLevel::Severe => 3.0,
        }
    }
}

impl fmt::Display for TrafficLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrafficLevel::Low => "low",
            TrafficLevel::Moderate => "moderate",
            TrafficLevel::Heavy => "heavy",
            TrafficLevel::Severe => "severe",
        };
        f.write_str(name)
    }
}

/// Minutes needed to cover `distance_km` at `speed_kmh`, stretched by traffic.
///
/// A non-positive speed means no estimate is needed and yields 0.
pub fn calculate_eta(distance_km: f64, speed_kmh: f64, level: Option<TrafficLevel>) -> f64 {
    if speed_kmh <= 0.0 {
        return 0.0;
    }

    let multiplier = level.map_or(1.0, TrafficLevel::multiplier);
    let time_hours = distance_km / speed_kmh;
    time_hours * 60.0 * multiplier
}

/// Distance left on `route` when the bus sits at waypoint `index`, in km.
pub fn remaining_distance_km(route: &[Location], index: usize) -> f64 {
    path_distance_km(route, index)
}

/// ETA in minutes for a bus at waypoint `index`, using the reference speed.
pub fn estimate(route: &[Location], index: usize, level: TrafficLevel) -> f64 {
    calculate_eta(
        remaining_distance_km(route, index),
        REFERENCE_SPEED_KMH,
        Some(level),
    )
}

/// Where the bus is along its current leg, as far as the ETA text cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegProgress {
    Moving,
    /// Stopped at the rider, waiting for the handoff to the college leg.
    AtPickup,
    Finished,
}

/// Rider-facing rendering of an ETA, e.g. `1 hr 4 min 30 sec`.
pub fn format_eta(eta_minutes: Option<f64>, progress: LegProgress) -> String {
    if progress == LegProgress::Finished {
        return "Arrived at College".to_string();
    }
    let Some(eta) = eta_minutes else {
        return "Calculating...".to_string();
    };
    if progress == LegProgress::AtPickup {
        return "Arrived at You".to_string();
    }
    if eta < 1.0 / 60.0 {
        return "Arriving now".to_string();
    }

    let total_seconds = (eta * 60.0).floor() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours} hr {minutes} min {seconds} sec")
    } else {
        format!("{minutes} min {seconds} sec")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::straight_line;
    use approx::assert_relative_eq;

    #[test]
    fn test_calculate_eta_with_traffic() {
        assert_relative_eq!(calculate_eta(10.0, 40.0, Some(TrafficLevel::Severe)), 45.0);
        assert_relative_eq!(calculate_eta(10.0, 40.0, Some(TrafficLevel::Heavy)), 30.0);
        assert_relative_eq!(calculate_eta(10.0, 40.0, Some(TrafficLevel::Moderate)), 22.5);
        assert_relative_eq!(calculate_eta(10.0, 40.0, None), 15.0);
        assert_eq!(calculate_eta(0.0, 40.0, Some(TrafficLevel::Low)), 0.0);
    }

    #[test]
    fn test_zero_speed_needs_no_estimate() {
        for level in [None, Some(TrafficLevel::Low), Some(TrafficLevel::Severe)] {
            assert_eq!(calculate_eta(12.5, 0.0, level), 0.0);
            assert_eq!(calculate_eta(12.5, -3.0, level), 0.0);
        }
    }

    #[test]
    fn test_traffic_level_aliases() {
        let parse = |s: &str| serde_json::from_str::<TrafficLevel>(&format!("\"{s}\"")).unwrap();
        assert_eq!(parse("light"), TrafficLevel::Low);
        assert_eq!(parse("low"), TrafficLevel::Low);
        assert_eq!(parse("medium"), TrafficLevel::Moderate);
        assert_eq!(parse("high"), TrafficLevel::Heavy);
        assert_eq!(parse("severe"), TrafficLevel::Severe);
        assert_eq!(serde_json::to_string(&TrafficLevel::Heavy).unwrap(), "\"heavy\"");
    }

    #[test]
    fn test_estimate_shrinks_along_route() {
        let route = straight_line(Location::new(17.40, 78.44), Location::new(17.44, 78.44), 10);
        let at_start = estimate(&route, 0, TrafficLevel::Low);
        let halfway = estimate(&route, 5, TrafficLevel::Low);

        assert!(at_start > halfway);
        assert_relative_eq!(halfway * 2.0, at_start, epsilon = 1e-6);
        assert_eq!(estimate(&route, 10, TrafficLevel::Severe), 0.0);
    }

    #[test]
    fn test_format_eta() {
        use LegProgress::*;
        assert_eq!(format_eta(Some(3.0), Finished), "Arrived at College");
        assert_eq!(format_eta(None, Moving), "Calculating...");
        assert_eq!(format_eta(None, AtPickup), "Calculating...");
        assert_eq!(format_eta(Some(0.0), AtPickup), "Arrived at You");
        assert_eq!(format_eta(Some(0.001), Moving), "Arriving now");
        assert_eq!(format_eta(Some(4.5), Moving), "4 min 30 sec");
        assert_eq!(format_eta(Some(64.5), Moving), "1 hr 4 min 30 sec");
    }
}
