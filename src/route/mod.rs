//! Route lookup: cached live directions with a straight-line fallback.

pub mod cache;
pub mod directions;

use crate::location::{straight_line, Location, Route, FALLBACK_STEPS};
use cache::{RouteCache, RouteKey};
use directions::DirectionsSource;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct RouteProvider {
    source: Arc<dyn DirectionsSource>,
    cache: Mutex<RouteCache>,
}

impl RouteProvider {
    pub fn new(source: Arc<dyn DirectionsSource>, cache: RouteCache) -> Self {
        Self {
            source,
            cache: Mutex::new(cache),
        }
    }

    /// Always resolves to a route. Lookup failures degrade to a straight line;
    /// the only empty result is the directions API explicitly finding nothing.
    pub async fn get_route(&self, start: Location, end: Location) -> Route {
        let key = RouteKey::new(start, end);

        if let Some(route) = self.cache.lock().await.get(&key, Instant::now()) {
            debug!(?key, "route cache hit");
            return route;
        }

        match self.source.directions(start, end).await {
            Ok(waypoints) if waypoints.is_empty() => {
                warn!(?start, ?end, "directions API returned no route");
                Route::from([])
            }
            Ok(waypoints) => {
                let route: Route = waypoints.into();
                let mut cache = self.cache.lock().await;
                cache.insert(key, route.clone(), Instant::now());
                info!(
                    waypoints = route.len(),
                    cached = cache.len(),
                    "route fetched and cached"
                );
                route
            }
            Err(e) => {
                warn!(error = %e, "directions lookup failed, using straight-line fallback");
                straight_line(start, end, FALLBACK_STEPS)
            }
        }
    }
}
