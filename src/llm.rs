use crate::error::{CorplinkError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// One alias sent for review, with the advisory match if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryRequest {
    pub alias: String,
    pub advisory_name: String,
}

/// The model's verdict on one alias.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdvisoryVerdict {
    #[serde(alias = "is_company")]
    pub is_entity: bool,
    #[serde(default)]
    pub clean_name: String,
    #[serde(default, alias = "matches_advice")]
    pub matches_advisory: bool,
}

#[async_trait]
pub trait AdvisoryService: Send + Sync {
    /// Verdicts keyed by the alias text exactly as sent. Aliases missing from
    /// the map were not judged.
    async fn review_batch(&self, batch: &[AdvisoryRequest]) -> Result<HashMap<String, AdvisoryVerdict>>;
}

/// Parse a response body, keeping only entries that deserialize cleanly.
pub fn parse_verdicts(content: &str) -> Result<HashMap<String, AdvisoryVerdict>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let object = value
        .as_object()
        .ok_or_else(|| CorplinkError::Llm("advisory response is not a JSON object".to_string()))?;

    let mut verdicts = HashMap::new();
    for (alias, entry) in object {
        match serde_json::from_value::<AdvisoryVerdict>(entry.clone()) {
            Ok(verdict) => {
                verdicts.insert(alias.clone(), verdict);
            }
            Err(e) => debug!("Skipping malformed verdict for {:?}: {}", alias, e),
        }
    }
    Ok(verdicts)
}

fn build_prompt(batch: &[AdvisoryRequest]) -> Result<String> {
    let input = serde_json::to_string(batch)?;
    Ok(format!(
        r#"You are a data cleaning expert for business strategy research.
Analyze the list of "alias" strings and determine the organizational entity behind each one.

Set "is_entity": true for:
1. Commercial companies (e.g. Toyota, Google, OpenAI)
2. Educational institutions (e.g. Harvard University, Tokyo High School)
3. Government bodies and municipalities (e.g. Osaka Prefecture, Ministry of Economy)
4. NGOs, NPOs and associations (e.g. Red Cross, IEEE)

If the alias is a product, service or fictional character, map it to its owner company instead of rejecting it:
- "iPhone" -> is_entity: true, clean_name: "Apple"
- "ChatGPT" -> is_entity: true, clean_name: "OpenAI"
- "Mario" -> is_entity: true, clean_name: "Nintendo"

Set "is_entity": false for:
1. General nouns that are not proper nouns (e.g. "external researchers", "local governments", "our partners", "video games")
2. Job titles and departments (e.g. "CEO", "Sales Department")
3. Individuals, unless the name refers to a sole proprietorship or studio

Rules for "clean_name":
- Remove legal suffixes (Inc., Ltd., Corp., K.K., etc.).
- For a product or IP, use the owner company name.
- Keep the full proper name (e.g. "University of Tokyo").

"matches_advisory" is true when "advisory_name" refers to the same entity as the alias.

Input: {}

Return a JSON object keyed by the alias text exactly as given:
{{
  "<alias>": {{"is_entity": true, "clean_name": "...", "matches_advisory": false}}
}}

Only return the JSON, no other text."#,
        input
    ))
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are a precise JSON-only responder. Always return valid JSON, no other text."},
                {"role": "user", "content": prompt}
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| CorplinkError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CorplinkError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CorplinkError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| CorplinkError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl AdvisoryService for LlmClient {
    async fn review_batch(&self, batch: &[AdvisoryRequest]) -> Result<HashMap<String, AdvisoryVerdict>> {
        if batch.is_empty() {
            return Ok(HashMap::new());
        }
        let prompt = build_prompt(batch)?;
        let content = self.call_llm(&prompt).await?;
        parse_verdicts(&content)
    }
}
