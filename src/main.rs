mod classification;
mod cli;
mod command;
mod context;
mod error;
mod memory;
mod message;
mod orchestrator;
mod provider;
mod queue;
mod renderer;
mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use classification::schema::SchemaRegistry;
use classification::{Classifier, ClassifierConfig};
use memory::AppendOnlyLog;
use orchestrator::Orchestrator;
use provider::config::{self, PromptConfig};
use provider::handler::PromptHandler;
use queue::MessageQueue;
use workflow::PlanThenSummarizeWorkflow;

#[derive(Parser, Debug)]
#[command(name = "agentcore", about = "Interactive agent runtime: classification, queueing, and provider dispatch")]
struct Args {
    /// Path to the TOML configuration file. Defaults to $AGENTCORE_HOME/agentcore.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single prompt headlessly instead of reading from stdin.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Override RUST_LOG for this run.
    #[arg(long)]
    log_level: Option<String>,

    /// Session identifier; also gates whether the append-only memory log is written
    /// under $AGENTCORE_HOME/sessions/<id>.
    #[arg(long)]
    session: Option<String>,
}

fn init_tracing(log_level: Option<&str>) {
    let filter = log_level
        .map(|s| s.to_string())
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter)).try_init();
}

fn load_dotenv() {
    let home = config::config_home_dir();
    let _ = dotenvy::from_path(home.join(".env"));
    let _ = dotenvy::dotenv();
}

fn default_prompt_config() -> PromptConfig {
    use provider::config::{Defaults, Features, ModelInfoConfig, ProviderConfig, ProviderKind};
    use std::collections::HashMap;

    let mut providers = HashMap::new();
    providers.insert(
        "local".to_string(),
        ProviderConfig {
            kind: ProviderKind::Local,
            base_url: Some("http://localhost:11434".to_string()),
            api_key: None,
            timeout_ms: 30_000,
            models: vec![ModelInfoConfig {
                name: "llama3".to_string(),
                display_name: Some("Llama 3 (local)".to_string()),
                default: true,
                context_length: 8192,
                capabilities: vec!["text-generation".to_string()],
            }],
        },
    );
    PromptConfig {
        providers,
        defaults: Defaults { provider: "local".to_string(), model: None, temperature: 0.7, max_tokens: 2048, timeout_ms: 30_000 },
        features: Features { enable_streaming: true, enable_retries: true, enable_fallback: true, ensemble_escalation: false },
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());
    load_dotenv();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let config_handle = if config_path.exists() {
        match config::ConfigHandle::load(config_path.clone()) {
            Ok(handle) => Some(Arc::new(handle)),
            Err(err) => {
                eprintln!("invalid configuration at {}: {}", config_path.display(), err.message);
                return std::process::ExitCode::from(2);
            }
        }
    } else {
        tracing::warn!(path = %config_path.display(), "no config file found, using a local-only default");
        None
    };
    let prompt_config = config_handle.as_ref().map(|h| h.current()).unwrap_or_else(default_prompt_config);

    let session_id = args.session.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let registry = Arc::new(SchemaRegistry::new());
    let handler = Arc::new(PromptHandler::from_config(&prompt_config));
    let classifier = Arc::new(Classifier::new(ClassifierConfig::default(), handler.clone(), registry));
    let workflow = Arc::new(PlanThenSummarizeWorkflow::new(handler.clone()));

    let memory_enabled = args.session.is_some();
    let memory = if memory_enabled {
        AppendOnlyLog::new(config::config_home_dir().join("sessions").join(&session_id), true)
    } else {
        AppendOnlyLog::disabled()
    };

    let input_queue = MessageQueue::with_defaults();
    let output_queue = MessageQueue::with_defaults();

    #[cfg(unix)]
    if let Some(config_handle) = config_handle.clone() {
        let reload_handler = handler.clone();
        tokio::spawn(async move {
            let Ok(mut hangup) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) else { return };
            loop {
                hangup.recv().await;
                match config_handle.reload_config() {
                    Ok(fresh) => {
                        let _ = reload_handler.reload(&fresh);
                        tracing::info!(path = %config_handle.path().display(), "reloaded configuration on SIGHUP");
                    }
                    Err(err) => tracing::warn!(error = %err.message, "configuration reload failed, keeping previous config"),
                }
            }
        });
    }

    let orchestrator = Arc::new(Orchestrator::new(
        input_queue.clone(),
        output_queue.clone(),
        classifier,
        handler,
        workflow,
        memory,
        session_id,
    ));
    let orchestrator_task = tokio::spawn(orchestrator.run());

    let render = renderer::Renderer::new(output_queue);
    let renderer_task = tokio::spawn(async move { render.run().await });

    let shutdown_queue = input_queue.clone();
    let cli_input = cli::CliInput::new(input_queue, "cli");
    let mut exit_code = std::process::ExitCode::SUCCESS;
    if let Some(prompt) = args.prompt {
        cli_input.run_once(&prompt).await;
    } else {
        tokio::select! {
            _ = cli_input.run() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received interrupt, shutting down");
                let _ = shutdown_queue.enqueue(message::Message::shutdown("SIGINT")).await;
                shutdown_queue.close().await;
                exit_code = std::process::ExitCode::from(130);
            }
        }
    }

    let _ = orchestrator_task.await;
    let _ = renderer_task.await;

    exit_code
}
