#![allow(dead_code)]

use agent_host::{MemoryClipboard, PulldownEngine, SessionDeps};
use anyhow::Result;
use async_trait::async_trait;
use extension::host_page::HostPage;
use extension::Extension;
use parking_lot::Mutex;
use providers::LanguageModel;
use services::{CredentialStore, ProblemSource, StudentProfile};
use shared::agent_api::{ApiKey, ProblemContext};
use shared::settings::AssistantSettings;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Numbers its replies and records every prompt and key it saw.
#[derive(Default)]
pub struct CountingModel {
    calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    pub keys: Mutex<Vec<String>>,
}

impl CountingModel {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for CountingModel {
    fn name(&self) -> &str {
        "counting"
    }

    async fn generate(&self, api_key: &ApiKey, prompt: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().push(prompt.to_string());
        self.keys.lock().push(api_key.expose().to_string());
        Ok(format!("reply #{}", n))
    }
}

pub struct StaticProblems;

#[async_trait]
impl ProblemSource for StaticProblems {
    async fn fetch_profile(&self, _token: &str) -> Result<StudentProfile> {
        Ok(StudentProfile { id: "42".into() })
    }

    async fn fetch_problem(&self, _token: &str, problem_id: &str) -> Result<ProblemContext> {
        Ok(ProblemContext {
            title: format!("Problem {}", problem_id),
            body: "Find two numbers that add up to target".into(),
            ..ProblemContext::default()
        })
    }
}

pub struct Harness {
    pub page: HostPage,
    pub ext: Extension,
    pub model: Arc<CountingModel>,
    _dir: TempDir,
}

/// Logged-in page with the whole extension running; `key` goes to the store.
pub fn launch(page: HostPage, key: Option<&str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::at_path(dir.path().join("credentials.json"));
    if let Some(key) = key {
        store.set_api_key(key).unwrap();
    }
    page.window.set_cookie("access_token=tok");

    let settings = AssistantSettings::default();
    let model = Arc::new(CountingModel::default());
    let deps = SessionDeps {
        window: page.window.clone(),
        problems: Arc::new(StaticProblems),
        model: model.clone(),
        engine: Arc::new(PulldownEngine::new(
            page.window.document().clone(),
            &settings.assets.renderer_script_src,
        )),
        clipboard: Arc::new(MemoryClipboard::default()),
        settings,
    };
    let ext = Extension::launch(deps, Arc::new(store));
    Harness {
        page,
        ext,
        model,
        _dir: dir,
    }
}

/// Let every spawned task run to its next timer.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
