use crate::alerts::COLLEGE_LOCATION;
use crate::location::Location;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

/// Stand-in rider position used whenever the real one is unusable.
pub const DEMO_USER_LOCATION: Location = Location::new(17.4375, 78.4484);
pub const SERVICE_RADIUS_KM: f64 = 50.0;

/// Degrees between the rider and the spot the simulated bus sets off from.
const BUS_START_OFFSET_MIN: f64 = 0.015;
const BUS_START_OFFSET_SPAN: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LocationSource {
    Reported,
    /// No position was shared (denied or unsupported).
    DemoUnavailable,
    /// The shared position lies outside the service area.
    DemoOutOfArea,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub location: Location,
    pub source: LocationSource,
}

pub fn resolve_rider_location(reported: Option<Location>) -> ResolvedLocation {
    let Some(location) = reported.filter(Location::is_finite) else {
        warn!("rider location unavailable, using demo location");
        return ResolvedLocation {
            location: DEMO_USER_LOCATION,
            source: LocationSource::DemoUnavailable,
        };
    };

    let distance_km = location.distance_km(&COLLEGE_LOCATION);
    if distance_km > SERVICE_RADIUS_KM {
        info!(distance_km, "rider is outside the service area, switching to demo location");
        return ResolvedLocation {
            location: DEMO_USER_LOCATION,
            source: LocationSource::DemoOutOfArea,
        };
    }

    ResolvedLocation {
        location,
        source: LocationSource::Reported,
    }
}

/// A point a short drive away from the rider in a random diagonal direction.
pub fn bus_start_near<R: Rng>(rider: Location, rng: &mut R) -> Location {
    let mut offset = || {
        let magnitude = BUS_START_OFFSET_MIN + rng.gen::<f64>() * BUS_START_OFFSET_SPAN;
        if rng.gen_bool(0.5) {
            magnitude
        } else {
            -magnitude
        }
    };

    let lat = rider.lat + offset();
    let lng = rider.lng + offset();
    Location::new(lat, lng)
}
