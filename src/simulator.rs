//! Virtual bus stepping through the waypoints of one leg at a time.

use crate::location::{Location, Route};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use std::ops::RangeInclusive;

pub const INITIAL_SPEED_KMH: f64 = 40.0;
const SPEED_RANGE_KMH: RangeInclusive<u32> = 35..=42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JourneyStage {
    ToUser,
    ToCollege,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusStatus {
    Enroute,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatorPhase {
    Idle,
    Enroute,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BusState {
    pub location: Location,
    pub status: BusStatus,
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrivalPoint {
    User,
    College,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Nothing to advance: no leg running, or the leg already ended.
    Idle,
    Moved(BusState),
    Arrived { at: ArrivalPoint, bus: BusState },
}

pub struct JourneySimulator {
    route: Route,
    index: usize,
    bus: Option<BusState>,
    stage: JourneyStage,
    leg_complete: bool,
    rng: StdRng,
}

impl JourneySimulator {
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            route: Route::from([]),
            index: 0,
            bus: None,
            stage: JourneyStage::ToUser,
            leg_complete: false,
            rng,
        }
    }

    /// Puts the bus at the head of `route`. Empty routes leave the simulator untouched.
    pub fn start(&mut self, route: Route) -> bool {
        let Some(&first) = route.first() else {
            return false;
        };

        self.route = route;
        self.index = 0;
        self.leg_complete = false;
        self.bus = Some(BusState {
            location: first,
            status: BusStatus::Enroute,
            speed: INITIAL_SPEED_KMH,
        });
        true
    }

    pub fn tick(&mut self) -> Tick {
        if self.leg_complete || self.route.is_empty() {
            return Tick::Idle;
        }
        let Some(bus) = self.bus.as_mut() else {
            return Tick::Idle;
        };
        if bus.status != BusStatus::Enroute {
            return Tick::Idle;
        }

        self.index += 1;
        if self.index >= self.route.len() {
            self.index = self.route.len() - 1;
            self.leg_complete = true;

            bus.location = self.route[self.index];
            bus.speed = 0.0;
            let at = match self.stage {
                JourneyStage::ToUser => ArrivalPoint::User,
                JourneyStage::ToCollege => {
                    bus.status = BusStatus::Finished;
                    ArrivalPoint::College
                }
            };
            return Tick::Arrived { at, bus: *bus };
        }

        bus.location = self.route[self.index];
        bus.speed = f64::from(self.rng.gen_range(SPEED_RANGE_KMH));
        Tick::Moved(*bus)
    }

    /// Leaves the rider's pickup point: drops the finished leg and switches to
    /// the college stage. Returns false unless the pickup leg has completed.
    pub fn begin_college_stage(&mut self) -> bool {
        if self.stage != JourneyStage::ToUser || !self.leg_complete {
            return false;
        }
        self.route = Route::from([]);
        self.index = 0;
        self.leg_complete = false;
        self.stage = JourneyStage::ToCollege;
        true
    }

    pub fn restart(&mut self) {
        self.route = Route::from([]);
        self.index = 0;
        self.bus = None;
        self.leg_complete = false;
        self.stage = JourneyStage::ToUser;
    }

    pub fn phase(&self) -> SimulatorPhase {
        match self.bus {
            None => SimulatorPhase::Idle,
            Some(bus) if bus.status == BusStatus::Finished => SimulatorPhase::Finished,
            Some(_) => SimulatorPhase::Enroute,
        }
    }

    pub fn stage(&self) -> JourneyStage {
        self.stage
    }

    pub fn bus(&self) -> Option<BusState> {
        self.bus
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn remaining_route(&self) -> &[Location] {
        self.route.get(self.index..).unwrap_or_default()
    }
}
