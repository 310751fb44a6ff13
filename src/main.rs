mod agent;
mod config;
mod console;
mod error;
mod history;
mod llm;
mod server;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::agent::Agent;
use crate::config::Config;

#[tokio::main]
async fn main() {
    // Load .env file (if present) before anything reads env vars
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    if args.iter().any(|a| a == "--default-config") {
        print!("{}", Config::default_config_contents());
        return;
    }

    // Logs go to stderr; stdout carries the chat.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = flag_value(&args, "--config").map(PathBuf::from);

    let config = match Config::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    if args.iter().any(|a| a == "--check") {
        if !run_checks(config) {
            std::process::exit(1);
        }
        return;
    }

    let bind = flag_value(&args, "--bind")
        .cloned()
        .unwrap_or_else(|| config.server_bind());
    let serve_http = args.iter().any(|a| a == "--serve" || a == "--bind");

    info!(
        agent_name = %config.agent_name,
        model = %config.llm.model,
        mode = if serve_http { "server" } else { "console" },
        "file-agent starting"
    );

    let agent = match Agent::from_config(config) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            error!("failed to initialize agent: {e}");
            std::process::exit(1);
        }
    };

    if serve_http {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let server_handle = {
            let agent = agent.clone();
            tokio::spawn(async move {
                if let Err(e) = server::serve(agent, &bind, shutdown_rx).await {
                    error!("server error: {e}");
                    std::process::exit(1);
                }
            })
        };

        info!("file-agent is running, press Ctrl+C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl+c: {e}");
        }
        info!("shutdown signal received, stopping...");
        let _ = shutdown_tx.send(());
        let _ = server_handle.await;
        info!("file-agent stopped");
    } else if let Err(e) = console::run(agent).await {
        error!("console error: {e}");
        std::process::exit(1);
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
}

/// Validate config and backend settings without talking to the model.
fn run_checks(config: Config) -> bool {
    info!("running pre-flight checks...");
    info!("config: OK");
    info!("  agent_name: {}", config.agent_name);
    info!("  model: {}", config.llm.model);
    info!("  max_tool_turns: {}", config.max_tool_turns);
    info!("  bind: {}", config.server_bind());

    let tools = match tools::build_registry(&config) {
        Ok(t) => t,
        Err(e) => {
            error!("tools: {e}");
            return false;
        }
    };
    info!("tools: OK ({})", tools.names().join(", "));

    let backend = match llm::build_backend(&config) {
        Ok(b) => b,
        Err(e) => {
            error!("llm backend: {e}");
            return false;
        }
    };
    info!("llm backend: OK ({} / {})", backend.name(), backend.model());

    match Agent::new(config, tools, backend) {
        Ok(agent) => {
            info!(
                "workspace: OK ({}, confined: {})",
                agent.ctx.workspace.root().display(),
                agent.ctx.workspace.is_confined()
            );
            true
        }
        Err(e) => {
            error!("workspace: {e}");
            false
        }
    }
}

fn print_usage() {
    println!(
        "file-agent: conversational assistant that reads and edits files in a workspace

USAGE:
    file-agent [OPTIONS]

OPTIONS:
    --config <PATH>     Path to config file (default: ~/.config/file-agent/config.toml)
    --default-config    Print default config to stdout and exit
    --serve             Serve the HTTP API instead of the interactive console
    --bind <ADDR>       Listen address for the HTTP API (implies --serve)
    --check             Validate config and backend settings, then exit
    -h, --help          Print this help message

ENVIRONMENT:
    OPENAI_API_KEY        API key for the OpenAI Responses API (required)
    OPENAI_MODEL          Model name (default: gpt-5-nano)
    OPENAI_BASE_URL       API base URL (default: https://api.openai.com/v1)
    FILE_AGENT_WORKSPACE  Directory the file tools operate in
    FILE_AGENT_BIND       Listen address for the HTTP API
    RUST_LOG              Log filter (default: info)

HTTP API:
    POST /run             {{\"query\", \"user_id\"?, \"session_id\"?}} -> {{\"response\"}}
    GET  /health          {{\"status\", \"tools\"}}"
    );
}
