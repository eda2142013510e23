use crate::LanguageModel;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::agent_api::ApiKey;
use shared::settings::ModelProvider;
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_settings(settings: &ModelProvider) -> Result<Self> {
        Self::new(
            &settings.gemini_base_url,
            &settings.gemini_model,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn endpoint(&self, api_key: &ApiKey) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        ))?;
        url.query_pairs_mut().append_pair("key", api_key.expose());
        Ok(url)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, api_key: &ApiKey, prompt: &str) -> Result<String> {
        let url = self.endpoint(api_key)?;
        let req = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
        };
        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "gemini request");
        // The key rides in the query string; keep it out of error text.
        let resp = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| anyhow!("gemini request failed: {}", e.without_url()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let body = body.trim();
            if body.is_empty() {
                return Err(anyhow!("gemini error: {}", status));
            }
            let body = if body.len() > 800 {
                let cut = (0..=800).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
                format!("{}...", &body[..cut])
            } else {
                body.to_string()
            };
            return Err(anyhow!("gemini error: {}\n{}", status, body));
        }
        let body: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| anyhow!("invalid gemini response: {}", e.without_url()))?;
        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow!("gemini response had no candidate text"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(&server.uri(), "gemini-pro", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_generate_posts_flattened_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-pro:generateContent"))
            .and(query_param("key", "secret-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"parts": [{"text": "User: hi\n\nAssistant:"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "Hello there"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let key = ApiKey::new("secret-key").unwrap();
        let reply = client(&server)
            .generate(&key, "User: hi\n\nAssistant:")
            .await
            .unwrap();
        assert_eq!(reply, "Hello there");
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let key = ApiKey::new("bad").unwrap();
        let err = client(&server).generate(&key, "x").await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("403"));
        assert!(text.contains("API key not valid"));
    }

    #[tokio::test]
    async fn test_missing_candidate_text_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
            )
            .mount(&server)
            .await;

        let key = ApiKey::new("k").unwrap();
        assert!(client(&server).generate(&key, "x").await.is_err());
    }
}
