//! One-shot rider notifications.
//!
//! Every alert is edge-triggered: its flag flips false -> true exactly once and
//! stays set until the journey restarts, so a condition that holds across many
//! ticks produces a single notification.

use crate::location::Location;
use crate::simulator::JourneyStage;
use serde::Serialize;

pub const COLLEGE_LOCATION: Location = Location::new(17.4185, 78.4451);
pub const COLLEGE_BOUNDARY_RADIUS_M: f64 = 500.0;

/// Default lower bound (exclusive, minutes) of the five-minute window.
pub const FIVE_MINUTE_ALERT_FLOOR: f64 = 1.0;
pub const FIVE_MINUTE_ALERT_CEILING: f64 = 5.0;
const ONE_MINUTE_ALERT_CEILING: f64 = 1.0;

/// Fixed-radius circle around a point of interest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    pub center: Location,
    pub radius_m: f64,
}

impl Boundary {
    pub const fn new(center: Location, radius_m: f64) -> Self {
        Self { center, radius_m }
    }

    pub fn college() -> Self {
        Self::new(COLLEGE_LOCATION, COLLEGE_BOUNDARY_RADIUS_M)
    }

    pub fn contains(&self, location: &Location) -> bool {
        location.distance_km(&self.center) * 1000.0 <= self.radius_m
    }

    /// True only on an inside -> outside transition between two readings.
    pub fn has_exited(&self, current: &Location, previous: Option<&Location>) -> bool {
        let Some(previous) = previous else {
            return false;
        };
        self.contains(previous) && !self.contains(current)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertState {
    pub five_minute_warning: bool,
    pub one_minute_warning: bool,
    pub arrival_warning: bool,
    pub college_exit_warning: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Alert {
    FiveMinute { stage: JourneyStage, eta_minutes: f64 },
    OneMinute { stage: JourneyStage, eta_minutes: f64 },
    Arrival,
    CollegeExit,
}

impl Alert {
    /// Text shown to (or spoken to) the rider.
    pub fn message(&self, bus_id: &str) -> String {
        match self {
            Alert::FiveMinute {
                stage: JourneyStage::ToUser,
                eta_minutes,
            } => format!(
                "Bus {bus_id} is reaching your pickup location in about {} minutes. Please get ready.",
                eta_minutes.round()
            ),
            Alert::FiveMinute {
                stage: JourneyStage::ToCollege,
                eta_minutes,
            } => format!(
                "Bus {bus_id} will reach the college in about {} minutes.",
                eta_minutes.round()
            ),
            Alert::OneMinute {
                stage: JourneyStage::ToUser,
                ..
            } => format!("Bus {bus_id} is less than a minute from your pickup location."),
            Alert::OneMinute {
                stage: JourneyStage::ToCollege,
                ..
            } => format!("Bus {bus_id} is less than a minute from the college."),
            Alert::Arrival => format!("Bus {bus_id} is here! Get ready to board."),
            Alert::CollegeExit => {
                format!("Bus {bus_id} has left the college and is on the way.")
            }
        }
    }
}

/// Evaluates alert conditions and remembers which ones have fired.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    state: AlertState,
    boundary: Boundary,
    five_minute_floor: f64,
    previous_location: Option<Location>,
}

impl AlertEngine {
    pub fn new(boundary: Boundary, five_minute_floor: f64) -> Self {
        Self {
            state: AlertState::default(),
            boundary,
            five_minute_floor,
            previous_location: None,
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Alerts raised by a fresh ETA reading.
    pub fn on_eta(&mut self, eta_minutes: f64, stage: JourneyStage) -> Vec<Alert> {
        let mut raised = Vec::new();

        if eta_minutes > self.five_minute_floor
            && eta_minutes <= FIVE_MINUTE_ALERT_CEILING
            && !self.state.five_minute_warning
        {
            self.state.five_minute_warning = true;
            raised.push(Alert::FiveMinute { stage, eta_minutes });
        }

        if eta_minutes > 0.0
            && eta_minutes <= ONE_MINUTE_ALERT_CEILING
            && !self.state.one_minute_warning
        {
            self.state.one_minute_warning = true;
            raised.push(Alert::OneMinute { stage, eta_minutes });
        }

        raised
    }

    /// Alerts raised by a new bus position.
    pub fn on_position(&mut self, location: Location) -> Option<Alert> {
        let exited = self
            .boundary
            .has_exited(&location, self.previous_location.as_ref());
        self.previous_location = Some(location);

        if exited && !self.state.college_exit_warning {
            self.state.college_exit_warning = true;
            return Some(Alert::CollegeExit);
        }
        None
    }

    /// Alert raised when the bus reaches the end of a leg.
    pub fn on_arrival(&mut self, stage: JourneyStage) -> Option<Alert> {
        if stage != JourneyStage::ToUser || self.state.arrival_warning {
            return None;
        }
        self.state.arrival_warning = true;
        Some(Alert::Arrival)
    }

    /// Re-arms the proximity warning for the leg toward the college.
    pub fn begin_college_leg(&mut self) {
        self.state.five_minute_warning = false;
    }

    pub fn reset(&mut self) {
        self.state = AlertState::default();
        self.previous_location = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> AlertEngine {
        AlertEngine::new(Boundary::college(), FIVE_MINUTE_ALERT_FLOOR)
    }

    // ~0.0045 degrees of latitude is roughly 500 m
    const INSIDE: Location = Location::new(17.4195, 78.4451);
    const OUTSIDE: Location = Location::new(17.4285, 78.4451);

    #[test]
    fn test_boundary_contains() {
        let boundary = Boundary::college();
        assert!(boundary.contains(&COLLEGE_LOCATION));
        assert!(boundary.contains(&INSIDE));
        assert!(!boundary.contains(&OUTSIDE));
    }

    #[test]
    fn test_has_exited_requires_previous_reading() {
        let boundary = Boundary::college();
        assert!(!boundary.has_exited(&OUTSIDE, None));
        assert!(!boundary.has_exited(&INSIDE, None));
        assert!(boundary.has_exited(&OUTSIDE, Some(&INSIDE)));
        assert!(!boundary.has_exited(&OUTSIDE, Some(&OUTSIDE)));
        assert!(!boundary.has_exited(&INSIDE, Some(&OUTSIDE)));
        assert!(!boundary.has_exited(&INSIDE, Some(&INSIDE)));
    }

    #[test]
    fn test_college_exit_fires_once() {
        let mut engine = engine();
        assert_eq!(engine.on_position(INSIDE), None);
        assert_eq!(engine.on_position(OUTSIDE), Some(Alert::CollegeExit));
        assert_eq!(engine.on_position(OUTSIDE), None);

        // Re-entering and leaving again does not notify twice.
        assert_eq!(engine.on_position(INSIDE), None);
        assert_eq!(engine.on_position(OUTSIDE), None);
        assert!(engine.state().college_exit_warning);
    }

    #[test]
    fn test_five_minute_alert_is_edge_triggered() {
        let mut engine = engine();
        assert!(engine.on_eta(7.0, JourneyStage::ToUser).is_empty());

        let raised = engine.on_eta(4.5, JourneyStage::ToUser);
        assert_eq!(
            raised,
            vec![Alert::FiveMinute {
                stage: JourneyStage::ToUser,
                eta_minutes: 4.5
            }]
        );

        assert!(engine.on_eta(4.5, JourneyStage::ToUser).is_empty());
        assert!(engine.on_eta(2.0, JourneyStage::ToUser).is_empty());
        assert!(engine.state().five_minute_warning);
    }

    #[test]
    fn test_five_minute_window_bounds() {
        let mut engine = engine();
        assert!(engine.on_eta(5.01, JourneyStage::ToUser).is_empty());
        let at_floor = engine.on_eta(1.0, JourneyStage::ToUser);
        assert!(!at_floor
            .iter()
            .any(|alert| matches!(alert, Alert::FiveMinute { .. })));
        assert!(!engine.state().five_minute_warning);

        assert_eq!(engine.on_eta(5.0, JourneyStage::ToUser).len(), 1);

        let mut strict = AlertEngine::new(Boundary::college(), 3.0);
        assert!(strict.on_eta(2.5, JourneyStage::ToUser).is_empty());
        assert_eq!(strict.on_eta(3.5, JourneyStage::ToUser).len(), 1);
    }

    #[test]
    fn test_one_minute_alert_fires_once() {
        let mut engine = engine();
        let raised = engine.on_eta(0.8, JourneyStage::ToUser);
        assert!(matches!(raised.as_slice(), [Alert::OneMinute { .. }]));
        assert!(engine.on_eta(0.4, JourneyStage::ToUser).is_empty());
        assert!(engine.on_eta(0.0, JourneyStage::ToUser).is_empty());
    }

    #[test]
    fn test_one_minute_alert_ignores_zero_eta() {
        let mut engine = engine();
        assert!(engine.on_eta(0.0, JourneyStage::ToCollege).is_empty());
        assert!(!engine.state().one_minute_warning);
    }

    #[test]
    fn test_arrival_alert_only_at_pickup() {
        let mut engine = engine();
        assert_eq!(engine.on_arrival(JourneyStage::ToCollege), None);
        assert_eq!(engine.on_arrival(JourneyStage::ToUser), Some(Alert::Arrival));
        assert_eq!(engine.on_arrival(JourneyStage::ToUser), None);
    }

    #[test]
    fn test_college_leg_rearms_only_five_minute_warning() {
        let mut engine = engine();
        engine.on_eta(4.0, JourneyStage::ToUser);
        engine.on_eta(0.5, JourneyStage::ToUser);
        engine.on_arrival(JourneyStage::ToUser);

        engine.begin_college_leg();
        let state = engine.state();
        assert!(!state.five_minute_warning);
        assert!(state.one_minute_warning);
        assert!(state.arrival_warning);

        assert_eq!(engine.on_eta(4.0, JourneyStage::ToCollege).len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut engine = engine();
        engine.on_position(INSIDE);
        engine.on_eta(4.0, JourneyStage::ToUser);
        engine.on_arrival(JourneyStage::ToUser);

        engine.reset();
        assert_eq!(engine.state(), AlertState::default());
        // Previous reading is forgotten too, so leaving the boundary now is not an exit.
        assert_eq!(engine.on_position(OUTSIDE), None);
        assert_eq!(engine.on_eta(4.0, JourneyStage::ToUser).len(), 1);
    }

    #[test]
    fn test_messages_name_the_bus() {
        let alert = Alert::FiveMinute {
            stage: JourneyStage::ToUser,
            eta_minutes: 4.4,
        };
        assert_eq!(
            alert.message("3"),
            "Bus 3 is reaching your pickup location in about 4 minutes. Please get ready."
        );
        assert!(Alert::CollegeExit.message("7").starts_with("Bus 7 has left"));
    }
}
