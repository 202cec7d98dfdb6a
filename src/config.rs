use crate::alerts::{Boundary, FIVE_MINUTE_ALERT_CEILING, FIVE_MINUTE_ALERT_FLOOR};
use crate::journey::JourneySettings;
use crate::route::cache::{RouteCache, DEFAULT_CAPACITY, DEFAULT_TTL};
use clap::Parser;
use std::time::Duration;

/// Older deployments exported the directions key under the frontend name.
const LEGACY_DIRECTIONS_KEY_VAR: &str = "NEXT_PUBLIC_OPENROUTESERVICE_API_KEY";

#[derive(Debug, Clone, Parser)]
#[command(name = "buslive")]
#[command(about = "Live college bus tracking with simulated journeys and traffic insight")]
pub struct Config {
    /// Port to run the HTTP server on
    #[arg(short, long, env = "SERVER_PORT", default_value = "3030")]
    pub port: u16,

    /// OpenRouteService key used for driving directions
    #[arg(long, env = "OPENROUTESERVICE_API_KEY", hide_env_values = true)]
    pub openrouteservice_api_key: Option<String>,

    /// Gemini key for traffic insight (primary model)
    #[arg(long, env = "GOOGLE_GENAI_API_KEY", hide_env_values = true)]
    pub google_genai_api_key: Option<String>,

    /// Groq key for traffic insight (fallback model)
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    #[arg(long, env = "ROUTE_CACHE_TTL_SECS", default_value_t = DEFAULT_TTL.as_secs())]
    pub route_cache_ttl_secs: u64,

    #[arg(long, env = "ROUTE_CACHE_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub route_cache_capacity: usize,

    /// Milliseconds between bus movements
    #[arg(long, env = "TICK_INTERVAL_MS", default_value_t = 2000)]
    pub tick_interval_ms: u64,

    /// Milliseconds the bus waits at the pickup point
    #[arg(long, env = "HANDOFF_DELAY_MS", default_value_t = 3000)]
    pub handoff_delay_ms: u64,

    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 15)]
    pub http_timeout_secs: u64,

    /// Lower bound (exclusive, minutes) of the five-minute alert window
    #[arg(
        long,
        env = "FIVE_MINUTE_ALERT_FLOOR",
        default_value_t = FIVE_MINUTE_ALERT_FLOOR,
        value_parser = parse_alert_floor
    )]
    pub five_minute_alert_floor: f64,
}

impl Config {
    pub fn directions_key(&self) -> Option<String> {
        non_empty(self.openrouteservice_api_key.clone())
            .or_else(|| non_empty(std::env::var(LEGACY_DIRECTIONS_KEY_VAR).ok()))
    }

    pub fn gemini_key(&self) -> Option<String> {
        non_empty(self.google_genai_api_key.clone())
    }

    pub fn groq_key(&self) -> Option<String> {
        non_empty(self.groq_api_key.clone())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn route_cache(&self) -> RouteCache {
        RouteCache::new(
            Duration::from_secs(self.route_cache_ttl_secs),
            self.route_cache_capacity,
        )
    }

    pub fn journey_settings(&self) -> JourneySettings {
        JourneySettings {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            handoff_delay: Duration::from_millis(self.handoff_delay_ms),
            five_minute_floor: self.five_minute_alert_floor,
            boundary: Boundary::college(),
        }
    }
}

/// The floor must leave the `(floor, 5]` window non-empty, or the alert never fires.
fn parse_alert_floor(value: &str) -> Result<f64, String> {
    let floor: f64 = value.trim().parse().map_err(|e| format!("{e}"))?;
    if !(0.0..FIVE_MINUTE_ALERT_CEILING).contains(&floor) {
        return Err(format!(
            "must be at least 0 and below {FIVE_MINUTE_ALERT_CEILING} minutes"
        ));
    }
    Ok(floor)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
