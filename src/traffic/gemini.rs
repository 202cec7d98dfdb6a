use super::{build_prompt, parse_insight, read_reply, Provider, TrafficError, TrafficInsight, TrafficModel, TrafficRequest};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

pub struct Gemini {
    client: reqwest::Client,
    api_key: String,
}

impl Gemini {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    async fn generate(&self, request: &TrafficRequest) -> Result<TrafficInsight, TrafficError> {
        debug!(location = %request.location, "asking Gemini about traffic");

        let response = self
            .client
            .post(GENERATE_URL)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|source| TrafficError::Http {
                provider: Provider::Gemini,
                source,
            })?;

        let body = read_reply(Provider::Gemini, response).await?;
        parse_response(&body)
    }
}

impl TrafficModel for Gemini {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn analyze<'a>(
        &'a self,
        request: &'a TrafficRequest,
    ) -> BoxFuture<'a, Result<TrafficInsight, TrafficError>> {
        self.generate(request).boxed()
    }
}

/// Output schema the model is constrained to.
fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "analysis": { "type": "STRING" },
            "recommendation": { "type": "STRING" },
            "trafficLevel": {
                "type": "STRING",
                "enum": ["low", "moderate", "heavy", "severe"]
            },
            "predictedDelay": { "type": "STRING" }
        },
        "required": ["analysis", "recommendation", "trafficLevel", "predictedDelay"]
    })
}

fn request_body(request: &TrafficRequest) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": build_prompt(request) }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema()
        }
    })
}

fn parse_response(body: &str) -> Result<TrafficInsight, TrafficError> {
    let malformed = |reason: String| TrafficError::Malformed {
        provider: Provider::Gemini,
        reason,
    };

    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

    let text = response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .find_map(|part| part.text)
        .ok_or_else(|| malformed("Failed to generate traffic analysis".to_string()))?;

    parse_insight(Provider::Gemini, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eta::TrafficLevel;

    #[test]
    fn test_request_body_carries_prompt_and_schema() {
        let body = request_body(&TrafficRequest {
            location: "17.43, 78.45".to_string(),
            time: "17:45:00".to_string(),
            current_speed: 12.0,
        });

        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.contains("17.43, 78.45"));
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            body["generationConfig"]["responseSchema"]["properties"]["trafficLevel"]["enum"][3],
            "severe"
        );
    }

    #[test]
    fn test_parse_candidate_text() {
        let body = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "text": "{\"analysis\":\"Evening rush near Ameerpet\",\"recommendation\":\"Leave for the stop in 10 minutes\",\"trafficLevel\":\"heavy\",\"predictedDelay\":\"+10 mins\"}"
                    }]
                },
                "finishReason": "STOP"
            }]
        }"#;

        let insight = parse_response(body).unwrap();
        assert_eq!(insight.traffic_level, TrafficLevel::Heavy);
        assert_eq!(insight.predicted_delay, "+10 mins");
    }

    #[test]
    fn test_parse_without_candidates_fails() {
        assert!(matches!(
            parse_response(r#"{"candidates": []}"#),
            Err(TrafficError::Malformed {
                provider: Provider::Gemini,
                ..
            })
        ));
    }
}
