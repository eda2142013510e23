use agent_host::{ChatSession, PulldownEngine, SessionDeps, SessionState, SystemClipboard};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use extension::config::load_settings_or_default;
use extension::host_page::HostPage;
use extension::Extension;
use providers::GeminiClient;
use services::{CredentialStore, PlatformClient};
use shared::route::{code_cache_key, ProblemRoutes};
use shared::wait::{await_condition, RetryPolicy, WaitOutcome};
use shared::widget;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "problem-assistant", about = "In-page coding assistant for practice problems")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save the generative API key (read from stdin when omitted)
    SetKey { key: Option<String> },
    /// Show whether an API key is configured
    KeyStatus,
    /// Open a simulated problem page and chat with the assistant
    Chat {
        /// Route to open
        #[arg(long, default_value = "/problems/two-sum-1234")]
        route: String,
        /// Language shown in the page's language picker
        #[arg(long, default_value = "cpp")]
        language: String,
        /// Site access token (enables profile and problem lookups)
        #[arg(long, env = "ASSISTANT_ACCESS_TOKEN")]
        token: Option<String>,
        /// Draft code to place in the page's code cache
        #[arg(long)]
        code_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = CredentialStore::open_default()?;

    match cli.command {
        Command::SetKey { key } => {
            let key = match key {
                Some(key) => key,
                None => {
                    eprint!("API key: ");
                    let mut line = String::new();
                    std::io::stdin().read_line(&mut line)?;
                    line
                }
            };
            store.set_api_key(&key)?;
            println!("Settings saved!");
        }
        Command::KeyStatus => {
            let status = if store.api_key()?.is_some() {
                "configured"
            } else {
                "not set"
            };
            println!("API key: {} ({})", status, store.path().display());
        }
        Command::Chat {
            route,
            language,
            token,
            code_file,
        } => {
            let code = code_file
                .map(|path| {
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))
                })
                .transpose()?;
            chat(store, &route, &language, token, code).await?;
        }
    }
    Ok(())
}

async fn chat(
    store: CredentialStore,
    route: &str,
    language: &str,
    token: Option<String>,
    code: Option<String>,
) -> Result<()> {
    let settings = load_settings_or_default();
    let routes = ProblemRoutes::new(&settings.problem_route_prefix);
    let page = HostPage::new();
    if let Some(token) = token {
        page.window
            .set_cookie(&format!("{}={}", settings.platform.auth_cookie, token));
    }

    let document = page.window.document().clone();
    let deps = SessionDeps {
        window: page.window.clone(),
        problems: Arc::new(PlatformClient::new(settings.platform.clone())?),
        model: Arc::new(GeminiClient::from_settings(&settings.model)?),
        engine: Arc::new(PulldownEngine::new(
            document.clone(),
            &settings.assets.renderer_script_src,
        )),
        clipboard: Arc::new(SystemClipboard),
        settings: settings.clone(),
    };
    let ext = Extension::launch(deps, Arc::new(store));
    open_route(&page, &routes, route, language);

    let session = wait_for_session(&ext)
        .await
        .ok_or_else(|| anyhow!("assistant did not start on {}", route))?;
    if let Some(code) = code {
        seed_code(&page, &routes, &session, language, &code);
    }
    document.click(widget::TRIGGER_ID);

    println!("Chatting about {}. Commands: /reset, /go <path>, /quit", route);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let reply_wait = RetryPolicy::fixed(
        Duration::from_millis(100),
        ((settings.model.request_timeout_secs + 10) * 10) as u32,
    );

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                if !ext.watcher.request_reset() {
                    println!("(no assistant on this page)");
                }
            }
            _ if line.starts_with("/go ") => {
                let path = line.trim_start_matches("/go ").trim();
                open_route(&page, &routes, path, language);
            }
            message => {
                let Some(session) = ext.sessions.current() else {
                    println!("(no assistant on this page)");
                    continue;
                };
                let before = session.history().len();
                let Some(input) = document.get_element_by_id(widget::INPUT_ID) else {
                    continue;
                };
                document.set_value(input, message);
                document.key_down(widget::INPUT_ID, "Enter", false);

                let outcome = await_condition(reply_wait, || {
                    session.state() == SessionState::Ready && session.history().len() > before
                })
                .await;
                if outcome == WaitOutcome::TimedOut {
                    println!("(no reply)");
                    continue;
                }
                print_last_reply(&page, &session);
            }
        }
    }

    ext.shutdown();
    Ok(())
}

fn open_route(page: &HostPage, routes: &ProblemRoutes, path: &str, language: &str) {
    let language = routes.is_problem_route(path).then_some(language);
    page.navigate(path, language);
}

async fn wait_for_session(ext: &Extension) -> Option<ChatSession> {
    let policy = RetryPolicy::fixed(Duration::from_millis(100), 50)
        .with_backoff(1.5, Duration::from_secs(2));
    let mut found = None;
    let outcome = await_condition(policy, || {
        found = ext
            .sessions
            .current()
            .filter(|s| s.state() == SessionState::Ready);
        found.is_some()
    })
    .await;
    match outcome {
        WaitOutcome::Ready => found,
        WaitOutcome::TimedOut => None,
    }
}

fn seed_code(page: &HostPage, routes: &ProblemRoutes, session: &ChatSession, language: &str, code: &str) {
    let path = page.window.location_path();
    match (session.student_id(), routes.problem_id(&path)) {
        (Some(student_id), Some(problem_id)) => {
            let key = code_cache_key(&student_id, &problem_id, language);
            page.window.local_storage().set_item(&key, code);
        }
        _ => tracing::warn!("no student id or problem id, draft code not attached"),
    }
}

fn print_last_reply(page: &HostPage, session: &ChatSession) {
    let history = session.history();
    match history.last() {
        Some(last) if last.role == shared::agent_api::Role::Assistant => {
            println!("\n{}\n", last.content);
        }
        _ => {
            // Failed cycles only leave a bubble behind
            let doc = page.window.document();
            let text = doc
                .get_element_by_id(widget::MESSAGES_ID)
                .and_then(|messages| doc.last_element_child(messages))
                .map(|node| doc.text_content(node))
                .unwrap_or_default();
            println!("\n{}\n", text);
        }
    }
}
