use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Delayed,
    Maintenance,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusInfo {
    pub id: u32,
    pub route: &'static str,
    pub start_point: &'static str,
    pub end_point: &'static str,
    pub status: ServiceStatus,
    pub eta: &'static str,
    pub passengers: u32,
    pub max_passengers: u32,
    pub rating: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("bus '{0}' does not exist")]
    Unknown(String),
    #[error("bus {0} is under maintenance")]
    UnderMaintenance(u32),
}

const fn bus(
    id: u32,
    route: &'static str,
    start_point: &'static str,
    status: ServiceStatus,
    eta: &'static str,
    passengers: u32,
    rating: f32,
) -> BusInfo {
    BusInfo {
        id,
        route,
        start_point,
        end_point: "College",
        status,
        eta,
        passengers,
        max_passengers: 45,
        rating,
    }
}

pub static FLEET: [BusInfo; 9] = [
    bus(1, "Route 1", "Banjara Hills", ServiceStatus::Active, "5 min", 28, 4.8),
    bus(2, "Route 2", "Hitech City", ServiceStatus::Active, "12 min", 35, 4.6),
    bus(3, "Route 3", "Secunderabad", ServiceStatus::Delayed, "18 min", 22, 4.5),
    bus(4, "Route 4", "Kukatpally", ServiceStatus::Active, "8 min", 31, 4.7),
    bus(5, "Route 5", "Dilsukhnagar", ServiceStatus::Active, "15 min", 19, 4.4),
    bus(6, "Route 6", "Gachibowli", ServiceStatus::Maintenance, "--", 0, 4.3),
    bus(7, "Route 7", "LB Nagar", ServiceStatus::Active, "20 min", 40, 4.2),
    bus(8, "Route 8", "Kompally", ServiceStatus::Active, "25 min", 15, 4.6),
    bus(9, "Route 9", "Nizampet", ServiceStatus::Delayed, "30 min", 25, 4.1),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetOverview {
    pub active_buses: usize,
    pub total_passengers: u32,
    pub buses: &'static [BusInfo],
}

pub fn overview() -> FleetOverview {
    FleetOverview {
        active_buses: FLEET
            .iter()
            .filter(|bus| bus.status == ServiceStatus::Active)
            .count(),
        total_passengers: FLEET.iter().map(|bus| bus.passengers).sum(),
        buses: &FLEET,
    }
}

/// Looks up a bus a rider may track. Buses in maintenance cannot be selected.
pub fn select(bus_id: &str) -> Result<&'static BusInfo, SelectionError> {
    let bus = bus_id
        .parse::<u32>()
        .ok()
        .and_then(|id| FLEET.iter().find(|bus| bus.id == id))
        .ok_or_else(|| SelectionError::Unknown(bus_id.to_string()))?;

    if bus.status == ServiceStatus::Maintenance {
        return Err(SelectionError::UnderMaintenance(bus.id));
    }
    Ok(bus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_active_and_delayed() {
        assert_eq!(select("1").unwrap().start_point, "Banjara Hills");
        assert_eq!(select("9").unwrap().status, ServiceStatus::Delayed);
        assert_eq!(select("4").unwrap().route, "Route 4");
    }

    #[test]
    fn test_select_rejects_maintenance_and_unknown() {
        assert_eq!(select("6").unwrap_err(), SelectionError::UnderMaintenance(6));
        assert_eq!(select("42").unwrap_err(), SelectionError::Unknown("42".to_string()));
        assert_eq!(select("bus-1").unwrap_err(), SelectionError::Unknown("bus-1".to_string()));
    }

    #[test]
    fn test_overview_counts() {
        let overview = overview();
        assert_eq!(overview.active_buses, 6);
        assert_eq!(overview.total_passengers, 215);
        assert_eq!(overview.buses.len(), 9);
    }
}
