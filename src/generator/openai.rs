use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{
    error,
    warn,
};

use super::{
    prompts,
    PairGenerator,
};
use crate::core::{
    CardContent,
    ForgeError,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_OUTPUT_TOKENS: u32 = 1024;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Deserialize)]
struct CardsEnvelope {
    #[serde(rename = "Cards")]
    cards: Vec<CardContent>,
}

#[derive(Debug, Deserialize)]
struct NestedCardsEnvelope {
    #[serde(rename = "Cards")]
    cards: Vec<Vec<CardContent>>,
}

fn pair_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "Front": { "type": "string" },
            "Back": { "type": "string" }
        },
        "required": ["Front", "Back"],
        "additionalProperties": false
    })
}

fn cards_schema(nested: bool) -> serde_json::Value {
    let items = if nested {
        json!({ "type": "array", "items": pair_schema() })
    } else {
        pair_schema()
    };
    json!({
        "type": "object",
        "properties": {
            "Cards": { "type": "array", "items": items }
        },
        "required": ["Cards"],
        "additionalProperties": false
    })
}

/// Pair generator backed by the OpenAI Responses API with strict
/// JSON-schema output.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ForgeError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn run_structured(
        &self,
        instructions: &str,
        input: serde_json::Value,
        schema: serde_json::Value,
    ) -> Result<String, ForgeError> {
        let body = json!({
            "model": self.model,
            "instructions": instructions,
            "input": input,
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": "anki_cards",
                    "strict": true,
                    "schema": schema,
                }
            },
            "max_output_tokens": MAX_OUTPUT_TOKENS,
        });

        let response = self
            .http
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: serde_json::Value = response.json().await?;
        if !status.is_success() {
            return Err(ForgeError::Custom(format!(
                "model API returned {}: {}",
                status, payload
            )));
        }

        extract_output_text(&payload)
            .ok_or_else(|| ForgeError::Custom("no output text in model response".to_string()))
    }
}

/// Concatenates every output_text item in the response's message output.
fn extract_output_text(payload: &serde_json::Value) -> Option<String> {
    let mut chunks = Vec::new();
    for item in payload.get("output")?.as_array()? {
        if item.get("type").and_then(|t| t.as_str()) != Some("message") {
            continue;
        }
        let Some(content) = item.get("content").and_then(|c| c.as_array()) else {
            continue;
        };
        for part in content {
            if part.get("type").and_then(|t| t.as_str()) == Some("output_text") {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    chunks.push(text);
                }
            }
        }
    }
    let joined = chunks.concat().trim().to_string();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[async_trait]
impl PairGenerator for OpenAiGenerator {
    async fn pairs_from_text(&self, text: &str) -> Vec<CardContent> {
        let input = json!(text);
        match self.run_structured(prompts::EXTRACT_TEXT, input, cards_schema(false)).await {
            Ok(output) => match serde_json::from_str::<CardsEnvelope>(&output) {
                Ok(envelope) => envelope.cards,
                Err(e) => {
                    error!("model output did not match card schema: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                error!("text extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn pairs_from_image(&self, base64_image: &str, caption: &str) -> Vec<CardContent> {
        let mut content = Vec::new();
        if !caption.is_empty() {
            content.push(json!({
                "type": "input_text",
                "text": format!("Image caption: {}", caption),
            }));
        }
        content.push(json!({
            "type": "input_image",
            "image_url": format!("data:image/jpeg;base64,{}", base64_image),
        }));
        let input = json!([{ "role": "user", "content": content }]);

        match self.run_structured(prompts::EXTRACT_IMAGE, input, cards_schema(false)).await {
            Ok(output) => match serde_json::from_str::<CardsEnvelope>(&output) {
                Ok(envelope) => envelope.cards,
                Err(e) => {
                    error!("model output did not match card schema: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                error!("image extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn regenerate(&self, pairs: &[CardContent]) -> Vec<Vec<CardContent>> {
        let input = match serde_json::to_value(pairs) {
            Ok(v) => json!(v.to_string()),
            Err(e) => {
                error!("failed to serialize pairs: {}", e);
                return vec![Vec::new(); pairs.len()];
            }
        };

        match self.run_structured(prompts::CHANGE_PAIRS, input, cards_schema(true)).await {
            Ok(output) => match serde_json::from_str::<NestedCardsEnvelope>(&output) {
                Ok(envelope) => {
                    if envelope.cards.len() != pairs.len() {
                        warn!(
                            "model returned {} candidate sets, expected {}",
                            envelope.cards.len(),
                            pairs.len()
                        );
                    }
                    envelope.cards
                }
                Err(e) => {
                    error!("model output did not match nested card schema: {}", e);
                    vec![Vec::new(); pairs.len()]
                }
            },
            Err(e) => {
                error!("regenerate failed: {}", e);
                vec![Vec::new(); pairs.len()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_output_text_from_response_payload() {
        let payload = json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                {
                    "type": "message",
                    "content": [
                        { "type": "output_text", "text": "{\"Cards\":" },
                        { "type": "output_text", "text": "[]}" }
                    ]
                }
            ]
        });
        assert_eq!(extract_output_text(&payload).as_deref(), Some("{\"Cards\":[]}"));
    }

    #[test]
    fn missing_output_yields_none() {
        assert!(extract_output_text(&json!({})).is_none());
        assert!(extract_output_text(&json!({ "output": [] })).is_none());
    }

    #[test]
    fn nested_schema_shapes_inner_arrays() {
        let schema = cards_schema(true);
        assert_eq!(schema["properties"]["Cards"]["items"]["type"], "array");
        let schema = cards_schema(false);
        assert_eq!(schema["properties"]["Cards"]["items"]["type"], "object");
    }
}
