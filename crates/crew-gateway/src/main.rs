use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crew_comments::CommentStore;
use crew_relay::{run_inbound_relay, LiveFanout};
use crew_telegram::{
    subscribe_inbound, StdinLoginCodePrompt, TelegramSessionConfig, TelegramSessionManager,
    DEFAULT_CONNECT_RETRY_BASE_DELAY_MS, DEFAULT_CONNECT_RETRY_MAX_ATTEMPTS,
    DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TELEGRAM_API_BASE,
};

use crew_gateway::{build_gateway_router, AppState};

const BOOTSTRAP_RETRY_DELAY_SECONDS: u64 = 60;

#[derive(Debug, Parser)]
#[command(name = "crew-gateway", about = "Crew comments service with telegram bridge")]
struct GatewayArgs {
    #[arg(long, env = "CREW_BIND", default_value = "127.0.0.1:5000")]
    bind: String,
    #[arg(long, env = "CREW_STATE_DIR", default_value = ".crew/state")]
    state_dir: PathBuf,
    #[arg(long, env = "CREW_TELEGRAM_API_BASE", default_value = DEFAULT_TELEGRAM_API_BASE)]
    telegram_api_base: String,
    #[arg(long, env = "CREW_TELEGRAM_API_ID")]
    telegram_api_id: i64,
    #[arg(long, env = "CREW_TELEGRAM_API_HASH")]
    telegram_api_hash: String,
    /// Durable session token; omit it to run the interactive first login.
    #[arg(long, env = "CREW_TELEGRAM_SESSION")]
    telegram_session: Option<String>,
    #[arg(long, env = "CREW_TELEGRAM_PHONE")]
    telegram_phone: Option<String>,
    #[arg(long, env = "CREW_TELEGRAM_2FA")]
    telegram_two_factor: Option<String>,
    #[arg(long, env = "CREW_TELEGRAM_CONNECT_RETRIES", default_value_t = DEFAULT_CONNECT_RETRY_MAX_ATTEMPTS)]
    telegram_connect_retries: usize,
    #[arg(long, env = "CREW_TELEGRAM_CONNECT_RETRY_DELAY_MS", default_value_t = DEFAULT_CONNECT_RETRY_BASE_DELAY_MS)]
    telegram_connect_retry_delay_ms: u64,
    #[arg(long, env = "CREW_TELEGRAM_HTTP_TIMEOUT_MS", default_value_t = DEFAULT_HTTP_TIMEOUT_MS)]
    telegram_http_timeout_ms: u64,
    #[arg(long, env = "CREW_TELEGRAM_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    telegram_poll_interval_ms: u64,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn build_session_config(args: &GatewayArgs) -> TelegramSessionConfig {
    TelegramSessionConfig {
        api_base: args.telegram_api_base.clone(),
        api_id: args.telegram_api_id,
        api_hash: args.telegram_api_hash.clone(),
        session_token: args.telegram_session.clone(),
        phone_number: args.telegram_phone.clone(),
        two_factor_secret: args.telegram_two_factor.clone(),
        connect_retry_max_attempts: args.telegram_connect_retries,
        connect_retry_base_delay_ms: args.telegram_connect_retry_delay_ms,
        http_timeout_ms: args.telegram_http_timeout_ms,
        poll_interval_ms: args.telegram_poll_interval_ms,
    }
}

/// Bootstraps the session and pumps inbound messages into the fan-out.
/// Bootstrap failure leaves the process serving HTTP in a disconnected
/// state; the relay retries until the platform comes back.
async fn run_inbound_relay_supervisor(manager: Arc<TelegramSessionManager>, fanout: LiveFanout) {
    loop {
        match manager.bootstrap().await {
            Ok(session) => {
                let inbound = subscribe_inbound(session.clone());
                run_inbound_relay(inbound, session, fanout.clone()).await;
                tracing::warn!("inbound relay ended; restarting subscription");
            }
            Err(error) => {
                tracing::error!(
                    "telegram session bootstrap failed, continuing disconnected: {error:#}"
                );
                tokio::time::sleep(Duration::from_secs(BOOTSTRAP_RETRY_DELAY_SECONDS)).await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = GatewayArgs::parse();

    let store = Arc::new(
        CommentStore::open(&args.state_dir)
            .context("failed to open comment store state directory")?,
    );
    let manager = Arc::new(TelegramSessionManager::new(
        build_session_config(&args),
        Arc::new(StdinLoginCodePrompt),
    )?);
    let fanout = LiveFanout::new();
    let state = Arc::new(AppState::new(store, manager.clone(), fanout.clone()));

    tokio::spawn(run_inbound_relay_supervisor(manager, fanout));

    let listener = TcpListener::bind(args.bind.as_str())
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound address")?;
    println!("crew gateway listening: addr={local_addr}");

    let app = build_gateway_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("crew gateway server exited unexpectedly")?;
    Ok(())
}
