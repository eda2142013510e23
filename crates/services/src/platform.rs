//! Client for the practice site's REST API (student profile and problem data).
//!
//! Both calls are bearer-authenticated with the token from the site's auth cookie.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shared::agent_api::ProblemContext;
use shared::settings::PlatformEndpoints;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    pub id: String,
}

/// Where a session gets identity and problem metadata from
#[async_trait]
pub trait ProblemSource: Send + Sync {
    async fn fetch_profile(&self, token: &str) -> Result<StudentProfile>;
    async fn fetch_problem(&self, token: &str, problem_id: &str) -> Result<ProblemContext>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    id: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Hints {
    solution_approach: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditorialCode {
    #[serde(default)]
    code: Option<String>,
}

// The site sends `null` for fields a problem does not have
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProblemData {
    title: Option<String>,
    body: Option<String>,
    input_format: Option<String>,
    output_format: Option<String>,
    constraints: Option<String>,
    hints: Option<Hints>,
    editorial_code: Option<Vec<EditorialCode>>,
}

impl From<ProblemData> for ProblemContext {
    fn from(data: ProblemData) -> Self {
        Self {
            title: data.title.unwrap_or_default(),
            body: data.body.unwrap_or_default(),
            input_format: data.input_format.unwrap_or_default(),
            output_format: data.output_format.unwrap_or_default(),
            constraints: data.constraints.unwrap_or_default(),
            solution_hint: data
                .hints
                .and_then(|h| h.solution_approach)
                .unwrap_or_default(),
            reference_solution: data
                .editorial_code
                .unwrap_or_default()
                .into_iter()
                .next()
                .and_then(|e| e.code)
                .unwrap_or_default(),
        }
    }
}

pub struct PlatformClient {
    http: Client,
    endpoints: PlatformEndpoints,
}

impl PlatformClient {
    pub fn new(endpoints: PlatformEndpoints) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(20)).build()?,
            endpoints,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.api_base.trim_end_matches('/'), path)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str, token: &str) -> Result<T> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| anyhow!("request to {} failed: {}", url, e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "platform error {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            ));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ProblemSource for PlatformClient {
    async fn fetch_profile(&self, token: &str) -> Result<StudentProfile> {
        let url = self.url(&self.endpoints.profile_path);
        let body: Envelope<ProfileData> = self.get_json(&url, token).await?;
        let id = match body.data.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => return Err(anyhow!("unexpected profile id: {}", other)),
        };
        Ok(StudentProfile { id })
    }

    async fn fetch_problem(&self, token: &str, problem_id: &str) -> Result<ProblemContext> {
        let url = self.url(&format!("{}{}", self.endpoints.problem_path, problem_id));
        let body: Envelope<ProblemData> = self.get_json(&url, token).await?;
        Ok(body.data.into())
    }
}
