use crate::eta::TrafficLevel;
use crate::fleet::{self, FleetOverview, SelectionError};
use crate::journey::{AnalyzeError, Journey, JourneySettings, JourneySnapshot};
use crate::location::Location;
use crate::route::RouteProvider;
use crate::traffic::{TrafficError, TrafficInsight, TrafficInsightClient, TrafficRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteProvider>,
    pub traffic: Arc<TrafficInsightClient>,
    pub settings: JourneySettings,
    pub journeys: Arc<RwLock<HashMap<String, Arc<Journey>>>>,
}

impl AppState {
    pub fn new(
        routes: Arc<RouteProvider>,
        traffic: Arc<TrafficInsightClient>,
        settings: JourneySettings,
    ) -> Self {
        Self {
            routes,
            traffic,
            settings,
            journeys: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'static str>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            title: None,
        }),
    )
}

#[derive(Debug, Deserialize)]
struct RouteRequest {
    start: Location,
    end: Location,
}

#[derive(Debug, Serialize)]
struct RouteResponse {
    coordinates: Vec<Location>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartJourney {
    #[serde(default)]
    user_location: Option<Location>,
}

#[derive(Debug, Deserialize)]
struct TrafficLevelUpdate {
    level: TrafficLevel,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/buses", get(list_buses))
        .route("/route", post(get_route))
        .route("/traffic", post(analyze_traffic))
        .route(
            "/journeys/{bus_id}",
            get(get_journey).post(start_journey).delete(stop_journey),
        )
        .route("/journeys/{bus_id}/restart", post(restart_journey))
        .route("/journeys/{bus_id}/traffic", post(journey_traffic))
        .route("/journeys/{bus_id}/traffic-level", put(set_traffic_level))
        .route("/journeys/{bus_id}/events", get(journey_events))
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn list_buses() -> Json<FleetOverview> {
    Json(fleet::overview())
}

async fn get_route(
    State(state): State<AppState>,
    Json(request): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, ApiError> {
    if !request.start.is_finite() || !request.end.is_finite() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "start and end must be finite coordinates",
        ));
    }

    let route = state.routes.get_route(request.start, request.end).await;
    if route.is_empty() {
        return Err(api_error(StatusCode::NOT_FOUND, "No route found"));
    }

    Ok(Json(RouteResponse {
        coordinates: route.to_vec(),
    }))
}

fn traffic_error(e: &TrafficError) -> ApiError {
    let status = match e {
        TrafficError::MissingApiKey { .. } => StatusCode::SERVICE_UNAVAILABLE,
        TrafficError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        TrafficError::AccessDenied { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::BAD_GATEWAY,
    };

    (
        status,
        Json(ErrorResponse {
            error: e.user_message(),
            title: Some(e.title()),
        }),
    )
}

async fn analyze_traffic(
    State(state): State<AppState>,
    Json(request): Json<TrafficRequest>,
) -> Result<Json<TrafficInsight>, ApiError> {
    state.traffic.analyze(&request).await.map(Json).map_err(|e| {
        error!(error = %e, "traffic analysis failed");
        traffic_error(&e)
    })
}

fn selection_error(e: SelectionError) -> ApiError {
    let status = match e {
        SelectionError::Unknown(_) => StatusCode::NOT_FOUND,
        SelectionError::UnderMaintenance(_) => StatusCode::CONFLICT,
    };
    api_error(status, e.to_string())
}

fn no_journey(bus_id: &str) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        format!("No journey is running for bus '{}'", bus_id),
    )
}

/// Registry key for a path segment, so `01` and `1` name the same journey.
fn canonical_id(bus_id: &str) -> String {
    bus_id
        .parse::<u32>()
        .map_or_else(|_| bus_id.to_string(), |id| id.to_string())
}

/// Clones the journey out of the registry. Callers await on it after the
/// read guard is gone, so a slow journey never blocks other buses.
async fn find_journey(state: &AppState, bus_id: &str) -> Result<Arc<Journey>, ApiError> {
    state
        .journeys
        .read()
        .await
        .get(&canonical_id(bus_id))
        .cloned()
        .ok_or_else(|| no_journey(bus_id))
}

async fn start_journey(
    State(state): State<AppState>,
    Path(bus_id): Path<String>,
    Json(body): Json<StartJourney>,
) -> Result<Json<JourneySnapshot>, ApiError> {
    let bus = fleet::select(&bus_id).map_err(selection_error)?;

    let journey = Arc::new(Journey::new(
        bus.id.to_string(),
        state.settings.clone(),
        state.routes.clone(),
        body.user_location,
    ));
    journey.start().await;
    let snapshot = journey.snapshot().await;

    let previous = state
        .journeys
        .write()
        .await
        .insert(bus.id.to_string(), journey);
    // Other requests may still hold the old journey, so stop it explicitly.
    if let Some(previous) = previous {
        previous.shutdown().await;
        info!(bus_id = %previous.bus_id(), "replaced running journey");
    }
    Ok(Json(snapshot))
}

async fn get_journey(
    State(state): State<AppState>,
    Path(bus_id): Path<String>,
) -> Result<Json<JourneySnapshot>, ApiError> {
    let journey = find_journey(&state, &bus_id).await?;
    Ok(Json(journey.snapshot().await))
}

async fn restart_journey(
    State(state): State<AppState>,
    Path(bus_id): Path<String>,
) -> Result<Json<JourneySnapshot>, ApiError> {
    let journey = find_journey(&state, &bus_id).await?;
    journey.restart().await;
    Ok(Json(journey.snapshot().await))
}

async fn journey_traffic(
    State(state): State<AppState>,
    Path(bus_id): Path<String>,
) -> Result<Json<TrafficInsight>, ApiError> {
    let journey = find_journey(&state, &bus_id).await?;

    match journey.analyze_traffic(&state.traffic).await {
        Ok(insight) => Ok(Json(insight)),
        Err(AnalyzeError::NoBusData) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: AnalyzeError::NoBusData.to_string(),
                title: Some("No Bus Data"),
            }),
        )),
        Err(AnalyzeError::Traffic(e)) => {
            error!(bus_id = %bus_id, error = %e, "traffic analysis failed");
            Err(traffic_error(&e))
        }
    }
}

async fn set_traffic_level(
    State(state): State<AppState>,
    Path(bus_id): Path<String>,
    Json(update): Json<TrafficLevelUpdate>,
) -> Result<Json<JourneySnapshot>, ApiError> {
    let journey = find_journey(&state, &bus_id).await?;
    journey.set_traffic_level(update.level).await;
    Ok(Json(journey.snapshot().await))
}

async fn journey_events(
    State(state): State<AppState>,
    Path(bus_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let receiver = find_journey(&state, &bus_id).await?.subscribe();

    // Lagged receivers skip what they missed; the next snapshot catches them up.
    let stream = BroadcastStream::new(receiver).filter_map(|event| {
        let event = event.ok()?;
        Event::default().json_data(event).ok().map(Ok)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn stop_journey(
    State(state): State<AppState>,
    Path(bus_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let journey = state
        .journeys
        .write()
        .await
        .remove(&canonical_id(&bus_id))
        .ok_or_else(|| no_journey(&bus_id))?;

    journey.shutdown().await;
    info!(bus_id = %journey.bus_id(), "journey stopped");
    Ok(StatusCode::NO_CONTENT)
}
