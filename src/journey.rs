//! One rider's trip: pickup leg, handoff, college leg.
//!
//! A [`Journey`] owns the simulator, the alert engine and the timers driving
//! them. Timer tasks only hold weak references, so dropping the journey stops
//! all of its periodic work. Every state change is published as a
//! [`JourneyEvent`] for whoever subscribed (UI stream, notifier, logs).

use crate::alerts::{Alert, AlertEngine, AlertState, Boundary, FIVE_MINUTE_ALERT_FLOOR};
use crate::eta::{self, format_eta, LegProgress, TrafficLevel};
use crate::geolocation::{bus_start_near, resolve_rider_location, LocationSource, ResolvedLocation};
use crate::location::Location;
use crate::route::RouteProvider;
use crate::scheduler::{DelayedTask, RepeatingTask};
use crate::simulator::{
    ArrivalPoint, BusState, JourneySimulator, JourneyStage, SimulatorPhase, Tick,
};
use crate::traffic::{TrafficError, TrafficInsight, TrafficInsightClient, TrafficRequest};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct JourneySettings {
    pub tick_interval: Duration,
    /// Pause at the pickup point before heading to the college.
    pub handoff_delay: Duration,
    pub five_minute_floor: f64,
    pub boundary: Boundary,
}

impl Default for JourneySettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            handoff_delay: Duration::from_secs(3),
            five_minute_floor: FIVE_MINUTE_ALERT_FLOOR,
            boundary: Boundary::college(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JourneyEvent {
    #[serde(rename_all = "camelCase")]
    LegStarted { stage: JourneyStage, waypoints: usize },
    #[serde(rename_all = "camelCase")]
    Moved {
        bus: BusState,
        eta_minutes: Option<f64>,
    },
    Alert { alert: Alert, message: String },
    Arrived { at: ArrivalPoint, message: String },
    StageChanged { stage: JourneyStage },
    Finished,
    RoutingFailed { stage: JourneyStage, message: String },
    TrafficUpdated { level: TrafficLevel },
    Restarted,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneySnapshot {
    pub bus_id: String,
    pub stage: JourneyStage,
    pub status: SimulatorPhase,
    pub bus: Option<BusState>,
    pub eta: Option<f64>,
    pub eta_display: String,
    pub route: Vec<Location>,
    pub remaining_route: Vec<Location>,
    pub alerts: AlertState,
    pub traffic_level: TrafficLevel,
    pub user_location: Location,
    pub location_source: LocationSource,
    pub college_location: Location,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("Waiting for bus location data...")]
    NoBusData,
    #[error(transparent)]
    Traffic(#[from] TrafficError),
}

struct JourneyCore {
    /// Bumped on restart and shutdown; work started under an older epoch is dropped.
    epoch: u64,
    simulator: JourneySimulator,
    alerts: AlertEngine,
    traffic: TrafficLevel,
    eta: Option<f64>,
    rider: ResolvedLocation,
    rng: StdRng,
    timer: Option<RepeatingTask>,
    handoff: Option<DelayedTask>,
}

impl JourneyCore {
    fn refresh_eta(&mut self) -> Vec<Alert> {
        let route = self.simulator.route();
        if route.is_empty() {
            self.eta = None;
            return Vec::new();
        }

        let eta = eta::estimate(route, self.simulator.index(), self.traffic);
        self.eta = Some(eta);
        self.alerts.on_eta(eta, self.simulator.stage())
    }

    /// Position-driven alerts followed by ETA-driven ones.
    fn observe(&mut self, location: Location) -> Vec<Alert> {
        let mut raised: Vec<Alert> = self.alerts.on_position(location).into_iter().collect();
        raised.extend(self.refresh_eta());
        raised
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.timer.take().filter(|timer| !timer.is_finished()) {
            timer.stop();
        }
        if let Some(handoff) = self.handoff.take().filter(|handoff| !handoff.is_finished()) {
            handoff.cancel();
        }
    }
}

struct JourneyInner {
    bus_id: String,
    settings: JourneySettings,
    routes: Arc<RouteProvider>,
    core: Mutex<JourneyCore>,
    events: broadcast::Sender<JourneyEvent>,
}

impl JourneyInner {
    fn publish(&self, event: JourneyEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn publish_alerts(&self, alerts: Vec<Alert>) {
        for alert in alerts {
            let message = alert.message(&self.bus_id);
            info!(bus_id = %self.bus_id, %message, "rider alert");
            self.publish(JourneyEvent::Alert { alert, message });
        }
    }

    /// Fetches the route for the current stage and sets the bus moving on it.
    async fn run_leg(self: &Arc<Self>, epoch: u64, start: Location, end: Location) {
        let route = self.routes.get_route(start, end).await;

        let mut core = self.core.lock().await;
        if core.epoch != epoch {
            debug!(bus_id = %self.bus_id, "discarding route for a superseded journey");
            return;
        }

        let stage = core.simulator.stage();
        let waypoints = route.len();
        if !core.simulator.start(route) {
            warn!(bus_id = %self.bus_id, ?stage, "no route available for leg");
            core.eta = None;
            self.publish(JourneyEvent::RoutingFailed {
                stage,
                message: "Could not calculate the bus route.".to_string(),
            });
            return;
        }

        let origin = start_of(&core);
        let raised = core.observe(origin);
        info!(bus_id = %self.bus_id, ?stage, waypoints, eta = ?core.eta, "leg started");
        self.publish(JourneyEvent::LegStarted { stage, waypoints });
        self.publish_alerts(raised);

        core.timer = Some(self.spawn_timer());
    }

    fn spawn_timer(self: &Arc<Self>) -> RepeatingTask {
        let weak = Arc::downgrade(self);
        RepeatingTask::spawn(self.settings.tick_interval, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.on_tick().await,
                    None => ControlFlow::Break(()),
                }
            }
        })
    }

    async fn on_tick(self: Arc<Self>) -> ControlFlow<()> {
        let mut core = self.core.lock().await;

        match core.simulator.tick() {
            Tick::Idle => ControlFlow::Break(()),
            Tick::Moved(bus) => {
                let raised = core.observe(bus.location);
                self.publish(JourneyEvent::Moved {
                    bus,
                    eta_minutes: core.eta,
                });
                self.publish_alerts(raised);
                ControlFlow::Continue(())
            }
            Tick::Arrived { at, bus } => {
                let stage = core.simulator.stage();
                let mut raised = core.observe(bus.location);
                raised.extend(core.alerts.on_arrival(stage));

                self.publish(JourneyEvent::Moved {
                    bus,
                    eta_minutes: core.eta,
                });
                self.publish_alerts(raised);

                let message = match at {
                    ArrivalPoint::User => {
                        format!("Bus {} is here! Get ready to board.", self.bus_id)
                    }
                    ArrivalPoint::College => format!(
                        "Bus {} has reached the college. Journey complete!",
                        self.bus_id
                    ),
                };
                info!(bus_id = %self.bus_id, ?at, "bus arrived");
                self.publish(JourneyEvent::Arrived { at, message });

                match at {
                    ArrivalPoint::User => {
                        let epoch = core.epoch;
                        core.handoff = Some(self.schedule_handoff(epoch));
                    }
                    ArrivalPoint::College => self.publish(JourneyEvent::Finished),
                }
                ControlFlow::Break(())
            }
        }
    }

    fn schedule_handoff(self: &Arc<Self>, epoch: u64) -> DelayedTask {
        let weak = Arc::downgrade(self);
        DelayedTask::spawn(self.settings.handoff_delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.hand_off(epoch).await;
            }
        })
    }

    /// Pickup done: re-arm the proximity alert and head for the college.
    async fn hand_off(self: Arc<Self>, epoch: u64) {
        let start = {
            let mut core = self.core.lock().await;
            if core.epoch != epoch || !core.simulator.begin_college_stage() {
                return;
            }
            core.timer = None;
            core.eta = None;
            core.alerts.begin_college_leg();
            self.publish(JourneyEvent::StageChanged {
                stage: JourneyStage::ToCollege,
            });

            match core.simulator.bus() {
                Some(bus) => bus.location,
                None => return,
            }
        };

        let college = self.settings.boundary.center;
        self.run_leg(epoch, start, college).await;
    }
}

fn start_of(core: &JourneyCore) -> Location {
    core.simulator
        .bus()
        .map_or(core.rider.location, |bus| bus.location)
}

/// Handle to a running journey. Dropping it stops the simulation.
pub struct Journey {
    inner: Arc<JourneyInner>,
}

impl Journey {
    pub fn new(
        bus_id: impl Into<String>,
        settings: JourneySettings,
        routes: Arc<RouteProvider>,
        reported_location: Option<Location>,
    ) -> Self {
        Self::with_rng(
            bus_id,
            settings,
            routes,
            reported_location,
            StdRng::from_entropy(),
        )
    }

    pub fn with_rng(
        bus_id: impl Into<String>,
        settings: JourneySettings,
        routes: Arc<RouteProvider>,
        reported_location: Option<Location>,
        mut rng: StdRng,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let simulator_rng = StdRng::from_rng(&mut rng).unwrap_or_else(|_| StdRng::from_entropy());
        let simulator = JourneySimulator::with_rng(simulator_rng);
        let core = JourneyCore {
            epoch: 0,
            simulator,
            alerts: AlertEngine::new(settings.boundary, settings.five_minute_floor),
            traffic: TrafficLevel::default(),
            eta: None,
            rider: resolve_rider_location(reported_location),
            rng,
            timer: None,
            handoff: None,
        };

        Self {
            inner: Arc::new(JourneyInner {
                bus_id: bus_id.into(),
                settings,
                routes,
                core: Mutex::new(core),
                events,
            }),
        }
    }

    pub fn bus_id(&self) -> &str {
        &self.inner.bus_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JourneyEvent> {
        self.inner.events.subscribe()
    }

    /// Starts the pickup leg from a point near the rider.
    pub async fn start(&self) {
        let (epoch, start, rider) = {
            let mut core = self.inner.core.lock().await;
            let rider = core.rider.location;
            let start = bus_start_near(rider, &mut core.rng);
            (core.epoch, start, rider)
        };

        info!(bus_id = %self.inner.bus_id, ?rider, "journey starting");
        self.inner.run_leg(epoch, start, rider).await;
    }

    /// Tears everything down and begins a fresh pickup leg. This is the only
    /// way the journey stage moves backward.
    pub async fn restart(&self) {
        {
            let mut core = self.inner.core.lock().await;
            core.epoch += 1;
            core.cancel_timers();
            core.simulator.restart();
            core.alerts.reset();
            core.eta = None;
        }

        info!(bus_id = %self.inner.bus_id, "journey restarted");
        self.inner.publish(JourneyEvent::Restarted);
        self.start().await;
    }

    /// Stops all timers. The journey keeps its last state for inspection.
    pub async fn shutdown(&self) {
        let mut core = self.inner.core.lock().await;
        core.epoch += 1;
        core.cancel_timers();
        debug!(bus_id = %self.inner.bus_id, "journey shut down");
    }

    pub async fn set_traffic_level(&self, level: TrafficLevel) {
        let raised = {
            let mut core = self.inner.core.lock().await;
            core.traffic = level;
            core.refresh_eta()
        };

        self.inner.publish(JourneyEvent::TrafficUpdated { level });
        self.inner.publish_alerts(raised);
    }

    /// Describes the current bus state for the traffic model.
    pub async fn traffic_request(&self) -> Option<TrafficRequest> {
        let core = self.inner.core.lock().await;
        let bus = core.simulator.bus()?;
        Some(TrafficRequest {
            location: format!("{}, {}", bus.location.lat, bus.location.lng),
            time: chrono::Local::now().format("%-I:%M:%S %p").to_string(),
            current_speed: bus.speed,
        })
    }

    /// Asks the traffic model about the bus's surroundings and applies the
    /// returned traffic level to the ETA.
    pub async fn analyze_traffic(
        &self,
        client: &TrafficInsightClient,
    ) -> Result<TrafficInsight, AnalyzeError> {
        let request = self.traffic_request().await.ok_or(AnalyzeError::NoBusData)?;
        let insight = client.analyze(&request).await?;
        self.set_traffic_level(insight.traffic_level).await;
        Ok(insight)
    }

    pub async fn snapshot(&self) -> JourneySnapshot {
        let core = self.inner.core.lock().await;
        let phase = core.simulator.phase();
        let stage = core.simulator.stage();
        let bus = core.simulator.bus();
        let progress = match bus {
            _ if phase == SimulatorPhase::Finished => LegProgress::Finished,
            Some(bus) if stage == JourneyStage::ToUser && bus.speed == 0.0 => {
                LegProgress::AtPickup
            }
            _ => LegProgress::Moving,
        };

        JourneySnapshot {
            bus_id: self.inner.bus_id.clone(),
            stage,
            status: phase,
            bus,
            eta: core.eta,
            eta_display: format_eta(core.eta, progress),
            route: core.simulator.route().to_vec(),
            remaining_route: core.simulator.remaining_route().to_vec(),
            alerts: core.alerts.state(),
            traffic_level: core.traffic,
            user_location: core.rider.location,
            location_source: core.rider.source,
            college_location: self.inner.settings.boundary.center,
        }
    }
}
