// src/main.rs

use std::net::SocketAddr;

use anyhow::Context;
use evm_multichain_mcp::{api::create_router, config::Config, mcp::stdio, AppState, ToolDispatcher};
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Where MCP traffic arrives.
enum Transport {
    Stdio,
    Http,
}

impl Transport {
    /// `--mcp` or a set `MCP_MODE` selects stdio; HTTP otherwise.
    fn from_env() -> Self {
        if std::env::args().any(|arg| arg == "--mcp") || std::env::var_os("MCP_MODE").is_some() {
            Transport::Stdio
        } else {
            Transport::Http
        }
    }
}

fn init_tracing() {
    // stderr only: stdout carries the stdio protocol stream
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "evm_multichain_mcp=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn serve_http(state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], state.config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "🚀 HTTP transport listening");
    let app = create_router(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("HTTP transport stopped")
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    let dispatcher =
        ToolDispatcher::from_config(&config).context("failed to build the tool dispatcher")?;
    info!(
        networks = dispatcher.registry().all().len(),
        default_network = %dispatcher.registry().default_network(),
        "network registry loaded"
    );

    // Entries are otherwise only evicted when read after expiry.
    let sweeper = dispatcher.cache().spawn_sweeper(config.cache_sweep_interval);
    let state = AppState::new(config, dispatcher);

    let outcome = match Transport::from_env() {
        Transport::Stdio => {
            info!("🚀 MCP transport on stdin/stdout");
            stdio::serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), state)
                .await
                .context("stdio transport failed")
        }
        Transport::Http => serve_http(state).await,
    };
    sweeper.abort();
    outcome
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }
}
