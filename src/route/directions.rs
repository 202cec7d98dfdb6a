use crate::location::Location;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const DIRECTIONS_URL: &str = "https://api.openrouteservice.org/v2/directions/driving-car/geojson";

/// Somewhere that can answer "how do I drive from A to B".
pub trait DirectionsSource: Send + Sync {
    fn directions(
        &self,
        start: Location,
        end: Location,
    ) -> BoxFuture<'_, Result<Vec<Location>, DirectionsError>>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    #[error("OpenRouteService API key is not configured")]
    MissingApiKey,
    #[error("directions API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("directions request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid directions response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("directions response contained a coordinate with fewer than two components")]
    MalformedCoordinate,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    coordinates: Vec<Vec<f64>>,
}

/// OpenRouteService driving directions.
pub struct OpenRouteService {
    client: reqwest::Client,
    api_key: Option<String>,
    url: String,
}

impl OpenRouteService {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            url: DIRECTIONS_URL.to_string(),
        }
    }

    async fn fetch(&self, start: Location, end: Location) -> Result<Vec<Location>, DirectionsError> {
        let api_key = self.api_key.as_deref().ok_or(DirectionsError::MissingApiKey)?;

        debug!(?start, ?end, "requesting directions");
        let body = json!({
            "coordinates": [
                [start.lng, start.lat],
                [end.lng, end.lat],
            ]
        });

        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, api_key)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(
                ACCEPT,
                "application/json, application/geo+json, application/gpx+xml, img/png; charset=utf-8",
            )
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(DirectionsError::Status { status, body: text });
        }

        parse_directions(&text)
    }
}

impl DirectionsSource for OpenRouteService {
    fn directions(
        &self,
        start: Location,
        end: Location,
    ) -> BoxFuture<'_, Result<Vec<Location>, DirectionsError>> {
        self.fetch(start, end).boxed()
    }
}

/// Waypoints of the first feature, flipped from `[lng, lat]` to `Location`.
///
/// A response with no features is a valid "no route" answer and yields an
/// empty list.
pub fn parse_directions(body: &str) -> Result<Vec<Location>, DirectionsError> {
    let response: DirectionsResponse = serde_json::from_str(body)?;

    let Some(feature) = response.features.into_iter().next() else {
        return Ok(Vec::new());
    };

    feature
        .geometry
        .coordinates
        .iter()
        .map(|coord| match coord.as_slice() {
            [lng, lat, ..] => Ok(Location::new(*lat, *lng)),
            _ => Err(DirectionsError::MalformedCoordinate),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flips_coordinate_order() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[78.4552, 17.4262], [78.4558, 17.4268, 512.0]]
                }
            }]
        }"#;

        let waypoints = parse_directions(body).unwrap();
        assert_eq!(
            waypoints,
            vec![Location::new(17.4262, 78.4552), Location::new(17.4268, 78.4558)]
        );
    }

    #[test]
    fn test_parse_empty_feature_list() {
        assert!(parse_directions(r#"{"features": []}"#).unwrap().is_empty());
        assert!(parse_directions(r#"{"type": "FeatureCollection"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_directions("<html>502</html>"),
            Err(DirectionsError::Decode(_))
        ));
        assert!(matches!(
            parse_directions(r#"{"features": [{"geometry": {"coordinates": [[78.0]]}}]}"#),
            Err(DirectionsError::MalformedCoordinate)
        ));
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let ors = OpenRouteService::new(reqwest::Client::new(), None);
        let result = ors
            .directions(Location::new(17.0, 78.0), Location::new(17.1, 78.1))
            .await;
        assert!(matches!(result, Err(DirectionsError::MissingApiKey)));
    }
}
