//! AI traffic commentary for riders.
//!
//! Gemini is asked first. When it is out of quota the same question goes to
//! Groq once; every other failure is handed back to the caller.

pub mod gemini;
pub mod groq;

use crate::eta::TrafficLevel;
use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRequest {
    pub location: String,
    pub time: String,
    pub current_speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficInsight {
    pub analysis: String,
    pub recommendation: String,
    pub traffic_level: TrafficLevel,
    #[serde(default = "no_delay")]
    pub predicted_delay: String,
}

fn no_delay() -> String {
    "None".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    Groq,
}

impl Provider {
    pub fn key_variable(self) -> &'static str {
        match self {
            Provider::Gemini => "GOOGLE_GENAI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => f.write_str("Gemini"),
            Provider::Groq => f.write_str("Groq"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrafficError {
    #[error("{provider} API key not configured. Please add {} to your .env file.", .provider.key_variable())]
    MissingApiKey { provider: Provider },
    #[error("{provider} rate limit reached (quota exceeded): {detail}")]
    RateLimited { provider: Provider, detail: String },
    #[error("{provider} API access denied: {detail}")]
    AccessDenied { provider: Provider, detail: String },
    #[error("{provider} API error: {status} - {body}")]
    Upstream {
        provider: Provider,
        status: StatusCode,
        body: String,
    },
    #[error("{provider} request failed: {source}")]
    Http {
        provider: Provider,
        #[source]
        source: reqwest::Error,
    },
    #[error("no usable response from {provider}: {reason}")]
    Malformed { provider: Provider, reason: String },
}

impl TrafficError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TrafficError::RateLimited { .. })
    }

    /// Short heading for the rider-facing error notice.
    pub fn title(&self) -> &'static str {
        match self {
            TrafficError::RateLimited { .. } => "Rate Limit Reached",
            TrafficError::AccessDenied { .. } => "Access Denied",
            _ => "Analysis Failed",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            TrafficError::MissingApiKey { provider } => format!(
                "{provider} API key is missing. Please configure {} in your .env file.",
                provider.key_variable()
            ),
            TrafficError::RateLimited { provider, .. } => format!(
                "{provider} API rate limit exceeded. Please try again later or upgrade your API quota."
            ),
            TrafficError::AccessDenied { provider, .. } => {
                format!("API access denied. Please check your {provider} API key permissions.")
            }
            other => other.to_string(),
        }
    }
}

/// Maps a non-success provider reply onto the error the caller can act on.
pub fn classify_failure(provider: Provider, status: StatusCode, body: String) -> TrafficError {
    let lowered = body.to_lowercase();
    if status == StatusCode::TOO_MANY_REQUESTS
        || lowered.contains("quota")
        || lowered.contains("rate limit")
        || lowered.contains("resource_exhausted")
    {
        return TrafficError::RateLimited {
            provider,
            detail: body,
        };
    }
    if status == StatusCode::FORBIDDEN
        || status == StatusCode::UNAUTHORIZED
        || lowered.contains("forbidden")
        || lowered.contains("permission_denied")
    {
        return TrafficError::AccessDenied {
            provider,
            detail: body,
        };
    }
    TrafficError::Upstream {
        provider,
        status,
        body,
    }
}

pub(crate) async fn read_reply(
    provider: Provider,
    response: reqwest::Response,
) -> Result<String, TrafficError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| TrafficError::Http { provider, source })?;
    if !status.is_success() {
        return Err(classify_failure(provider, status, body));
    }
    Ok(body)
}

/// Decodes the JSON text a model produced into an insight.
pub(crate) fn parse_insight(provider: Provider, text: &str) -> Result<TrafficInsight, TrafficError> {
    serde_json::from_str(text.trim()).map_err(|e| TrafficError::Malformed {
        provider,
        reason: e.to_string(),
    })
}

/// Instructions shared by both providers: rider-facing guidance only.
pub fn build_prompt(request: &TrafficRequest) -> String {
    format!(
        "You are the traffic analysis assistant of BusLive, a bus tracking app. \
You are speaking directly to a rider who is waiting for the bus or riding it.\n\
\n\
Analyze the traffic conditions from this data:\n\
- Location: {location}\n\
- Current time: {time}\n\
- Bus speed: {speed} km/h\n\
\n\
Provide:\n\
1. analysis: a brief explanation of the traffic situation (why is it slow or fast?).\n\
2. recommendation: advice for the rider only (e.g. \"Relax\", \"Start walking to the stop\").\n\
3. trafficLevel: one of \"low\", \"moderate\", \"heavy\", \"severe\".\n\
4. predictedDelay: e.g. \"None\", \"+5 mins\", \"+15 mins\".\n\
\n\
Do not give advice to the driver and do not address the driver.\n\
A speed below 20 km/h means heavy traffic unless the bus is at a stop. \
A speed above 40 km/h means low traffic.",
        location = request.location,
        time = request.time,
        speed = request.current_speed,
    )
}

/// A language model that can produce a [`TrafficInsight`].
pub trait TrafficModel: Send + Sync {
    fn provider(&self) -> Provider;

    fn analyze<'a>(
        &'a self,
        request: &'a TrafficRequest,
    ) -> BoxFuture<'a, Result<TrafficInsight, TrafficError>>;
}

pub struct TrafficInsightClient {
    primary: Option<Arc<dyn TrafficModel>>,
    secondary: Arc<dyn TrafficModel>,
}

impl TrafficInsightClient {
    /// `primary` is `None` when its key is missing, in which case every
    /// request goes straight to `secondary`.
    pub fn new(primary: Option<Arc<dyn TrafficModel>>, secondary: Arc<dyn TrafficModel>) -> Self {
        Self { primary, secondary }
    }

    pub fn from_keys(
        client: reqwest::Client,
        gemini_key: Option<String>,
        groq_key: Option<String>,
    ) -> Self {
        let primary = gemini_key.map(|key| {
            Arc::new(gemini::Gemini::new(client.clone(), key)) as Arc<dyn TrafficModel>
        });
        if primary.is_none() {
            warn!("GOOGLE_GENAI_API_KEY is missing, traffic analysis will use Groq only");
        }
        Self::new(primary, Arc::new(groq::Groq::new(client, groq_key)))
    }

    pub async fn analyze(&self, request: &TrafficRequest) -> Result<TrafficInsight, TrafficError> {
        let Some(primary) = &self.primary else {
            return self.secondary.analyze(request).await;
        };

        match primary.analyze(request).await {
            Ok(insight) => {
                info!(provider = %primary.provider(), level = %insight.traffic_level, "traffic analysed");
                Ok(insight)
            }
            Err(e) if e.is_rate_limited() => {
                warn!(
                    error = %e,
                    fallback = %self.secondary.provider(),
                    "primary traffic model rate limited, retrying with fallback"
                );
                let insight = self.secondary.analyze(request).await?;
                info!(provider = %self.secondary.provider(), level = %insight.traffic_level, "traffic analysed");
                Ok(insight)
            }
            Err(e) => Err(e),
        }
    }
}
