//! Google Gemini provider using the `generateContent` REST endpoint.
//!
//! Structured output is requested with `responseMimeType: application/json`
//! plus a `responseSchema`. Safety thresholds are all set to `BLOCK_NONE`;
//! a refusal still surfaces as `ProviderError::Blocked`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use slyusha_core::config::ModelConfig;

use crate::provider::{
    Content, GenerateRequest, GenerateResponse, GenerationProvider, Part, ProviderError, Role,
};

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_CIVIC_INTEGRITY",
];

/// Finish reasons that mean the candidate was withheld for policy reasons.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
];

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| slyusha_core::config::DEFAULT_GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub fn from_config(cfg: &ModelConfig) -> Result<Self, ProviderError> {
        if cfg.api_key.is_empty() {
            return Err(ProviderError::Unavailable(
                "model.api_key is not configured".to_string(),
            ));
        }
        Ok(Self::new(cfg.api_key.clone(), Some(cfg.base_url.clone())))
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

/// Build the request body for the `generateContent` endpoint.
pub(crate) fn build_body(req: &GenerateRequest) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = req.contents.iter().map(content_json).collect();

    let safety: Vec<serde_json::Value> = SAFETY_CATEGORIES
        .iter()
        .map(|c| serde_json::json!({ "category": c, "threshold": "BLOCK_NONE" }))
        .collect();

    let mut generation_config = serde_json::json!({
        "temperature": req.sampling.temperature,
        "topK": req.sampling.top_k,
        "topP": req.sampling.top_p,
        "maxOutputTokens": req.sampling.max_output_tokens,
    });
    if let Some(ref schema) = req.response_schema {
        generation_config["responseMimeType"] = serde_json::json!("application/json");
        generation_config["responseSchema"] = schema.clone();
    }

    let mut body = serde_json::json!({
        "contents": contents,
        "safetySettings": safety,
        "generationConfig": generation_config,
    });

    if !req.system.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": req.system }]
        });
    }

    body
}

fn content_json(content: &Content) -> serde_json::Value {
    let role = match content.role {
        Role::User => "user",
        Role::Model => "model",
    };
    let parts: Vec<serde_json::Value> = content
        .parts
        .iter()
        .map(|p| match p {
            Part::Text(text) => serde_json::json!({ "text": text }),
            Part::InlineData { mime_type, data } => serde_json::json!({
                "inlineData": { "mimeType": mime_type, "data": data }
            }),
        })
        .collect();
    serde_json::json!({ "role": role, "parts": parts })
}

/// Turn a decoded response into text, or a `Blocked` error.
pub(crate) fn interpret_response(
    resp: GeminiResponse,
    model: &str,
) -> Result<GenerateResponse, ProviderError> {
    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Blocked {
            reason: Some(reason),
        });
    }

    let Some(candidate) = resp.candidates.into_iter().next() else {
        return Err(ProviderError::Blocked { reason: None });
    };

    let finish_reason = candidate.finish_reason.unwrap_or_default();
    if BLOCKING_FINISH_REASONS.contains(&finish_reason.as_str()) {
        return Err(ProviderError::Blocked {
            reason: Some(finish_reason),
        });
    }

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let usage = resp.usage_metadata.unwrap_or_default();
    Ok(GenerateResponse {
        text,
        model: model.to_string(),
        tokens_in: usage.prompt_token_count,
        tokens_out: usage.candidates_token_count,
        finish_reason,
    })
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let url = self.endpoint(&req.model);
        let body = build_body(req);

        debug!(model = %req.model, blocks = req.contents.len(), "sending request to Gemini");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_ms: 5000,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Gemini error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        interpret_response(api_resp, &req.model)
    }
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SamplingParams;

    fn request(schema: Option<serde_json::Value>) -> GenerateRequest {
        GenerateRequest {
            model: "gemini-test".to_string(),
            system: "be brief".to_string(),
            contents: vec![
                Content::text(Role::User, "Alice: hi"),
                Content {
                    role: Role::Model,
                    parts: vec![
                        Part::Text("hello".to_string()),
                        Part::InlineData {
                            mime_type: "image/jpeg".to_string(),
                            data: "AAAA".to_string(),
                        },
                    ],
                },
            ],
            response_schema: schema,
            sampling: SamplingParams {
                temperature: 0.5,
                top_k: 10,
                top_p: 0.9,
                max_output_tokens: 100,
            },
        }
    }

    fn parse(json: &str) -> GeminiResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn body_carries_roles_media_and_sampling() {
        let body = build_body(&request(None));
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(
            body["contents"][1]["parts"][1]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(body["generationConfig"]["topK"], 10);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(body["generationConfig"].get("responseSchema").is_none());
    }

    #[test]
    fn body_sets_every_safety_category_to_block_none() {
        let body = build_body(&request(None));
        let settings = body["safetySettings"].as_array().unwrap();
        assert_eq!(settings.len(), SAFETY_CATEGORIES.len());
        assert!(settings.iter().all(|s| s["threshold"] == "BLOCK_NONE"));
    }

    #[test]
    fn body_requests_json_when_schema_given() {
        let body = build_body(&request(Some(serde_json::json!({"type": "ARRAY"}))));
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "ARRAY");
    }

    #[test]
    fn prompt_block_reason_surfaces_as_blocked() {
        let resp = parse(r#"{"promptFeedback":{"blockReason":"PROHIBITED_CONTENT"}}"#);
        match interpret_response(resp, "m") {
            Err(ProviderError::Blocked { reason }) => {
                assert_eq!(reason.as_deref(), Some("PROHIBITED_CONTENT"))
            }
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[test]
    fn safety_finish_reason_surfaces_as_blocked() {
        let resp = parse(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#);
        assert!(matches!(
            interpret_response(resp, "m"),
            Err(ProviderError::Blocked { reason: Some(ref r) }) if r == "SAFETY"
        ));
    }

    #[test]
    fn no_candidates_is_blocked_without_reason() {
        let resp = parse(r#"{"candidates":[]}"#);
        assert!(matches!(
            interpret_response(resp, "m"),
            Err(ProviderError::Blocked { reason: None })
        ));
    }

    #[test]
    fn text_parts_are_joined() {
        let resp = parse(
            r#"{"candidates":[{"content":{"parts":[{"text":"[{\"text\":"},{"text":"\"hi\"}]"}]},
               "finishReason":"STOP"}],
               "usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":3}}"#,
        );
        let out = interpret_response(resp, "m").unwrap();
        assert_eq!(out.text, r#"[{"text":"hi"}]"#);
        assert_eq!(out.tokens_in, 12);
        assert_eq!(out.tokens_out, 3);
        assert_eq!(out.finish_reason, "STOP");
    }
}
