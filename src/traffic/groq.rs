use super::{build_prompt, parse_insight, read_reply, Provider, TrafficError, TrafficInsight, TrafficModel, TrafficRequest};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const CHAT_COMPLETIONS_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const MODEL: &str = "llama-3.1-8b-instant";
const PLACEHOLDER_KEY: &str = "your_groq_api_key_here";

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// Groq chat completions in JSON-object mode.
pub struct Groq {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl Groq {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        let api_key = api_key.filter(|key| !key.is_empty() && key != PLACEHOLDER_KEY);
        Self { client, api_key }
    }

    async fn complete(&self, request: &TrafficRequest) -> Result<TrafficInsight, TrafficError> {
        let api_key = self.api_key.as_deref().ok_or(TrafficError::MissingApiKey {
            provider: Provider::Groq,
        })?;

        debug!(location = %request.location, "asking Groq about traffic");
        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|source| TrafficError::Http {
                provider: Provider::Groq,
                source,
            })?;

        let body = read_reply(Provider::Groq, response).await?;
        parse_response(&body)
    }
}

impl TrafficModel for Groq {
    fn provider(&self) -> Provider {
        Provider::Groq
    }

    fn analyze<'a>(
        &'a self,
        request: &'a TrafficRequest,
    ) -> BoxFuture<'a, Result<TrafficInsight, TrafficError>> {
        self.complete(request).boxed()
    }
}

fn request_body(request: &TrafficRequest) -> Value {
    let prompt = format!(
        "{}\n\nRespond with a single JSON object with the keys \
analysis, recommendation, trafficLevel and predictedDelay.",
        build_prompt(request)
    );

    json!({
        "model": MODEL,
        "messages": [
            {
                "role": "system",
                "content": "You are a helpful traffic analysis assistant. Always respond with valid JSON."
            },
            { "role": "user", "content": prompt }
        ],
        "response_format": { "type": "json_object" },
        "temperature": 0.7
    })
}

fn parse_response(body: &str) -> Result<TrafficInsight, TrafficError> {
    let completion: ChatCompletion =
        serde_json::from_str(body).map_err(|e| TrafficError::Malformed {
            provider: Provider::Groq,
            reason: e.to_string(),
        })?;

    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| TrafficError::Malformed {
            provider: Provider::Groq,
            reason: "No response from Groq API".to_string(),
        })?;

    parse_insight(Provider::Groq, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eta::TrafficLevel;

    #[test]
    fn test_placeholder_key_counts_as_missing() {
        let groq = Groq::new(reqwest::Client::new(), Some(PLACEHOLDER_KEY.to_string()));
        assert!(groq.api_key.is_none());
        let groq = Groq::new(reqwest::Client::new(), Some("gsk_live".to_string()));
        assert_eq!(groq.api_key.as_deref(), Some("gsk_live"));
    }

    #[tokio::test]
    async fn test_missing_key_is_a_configuration_error() {
        let groq = Groq::new(reqwest::Client::new(), None);
        let request = TrafficRequest {
            location: "17.43, 78.45".to_string(),
            time: "09:00:00".to_string(),
            current_speed: 38.0,
        };
        let err = groq.analyze(&request).await.unwrap_err();
        assert!(matches!(
            err,
            TrafficError::MissingApiKey {
                provider: Provider::Groq
            }
        ));
    }

    #[test]
    fn test_request_body_uses_json_mode() {
        let body = request_body(&TrafficRequest {
            location: "17.43, 78.45".to_string(),
            time: "09:00:00".to_string(),
            current_speed: 38.0,
        });
        assert_eq!(body["model"], MODEL);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("predictedDelay"));
    }

    #[test]
    fn test_parse_choice_content() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "{\"analysis\":\"Free-flowing\",\"recommendation\":\"Relax\",\"trafficLevel\":\"low\",\"predictedDelay\":\"None\"}"
                }
            }]
        }"#;
        let insight = parse_response(body).unwrap();
        assert_eq!(insight.traffic_level, TrafficLevel::Low);
        assert_eq!(insight.recommendation, "Relax");

        assert!(parse_response(r#"{"choices": []}"#).is_err());
    }
}
