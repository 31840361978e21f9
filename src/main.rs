use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::time::interval;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use taskboard_gate::config::Args;
use taskboard_gate::router::build_router;
use taskboard_gate::state::{AppState, Limiters};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let state = Arc::new(AppState::from_args(&args)?);

    if args.sweep_interval_secs > 0 {
        let sweep_state = state.clone();
        let every = Duration::from_secs(args.sweep_interval_secs);
        tokio::spawn(async move {
            idle_key_sweeper(sweep_state, every).await;
        });
    }

    let app = build_router(state.clone(), None);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "Task board gate running");
    let limiters: &Limiters = &state.limiters;
    for limiter in [&limiters.general, &limiters.auth, &limiters.ai] {
        let policy = limiter.policy();
        info!(
            limiter = limiter.name(),
            max_requests = policy.max_requests(),
            window_secs = policy.window().as_secs(),
            "Rate limit policy"
        );
    }
    info!(scope = ?args.limiter_scope, "Limiter scope");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Task board gate stopped");
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// Evicts drained ledgers so never-repeating keys do not pile up
async fn idle_key_sweeper(state: Arc<AppState>, every: Duration) {
    let mut ticker = interval(every);
    info!(interval = ?every, "Idle key sweeper started");

    loop {
        ticker.tick().await;
        let removed = state.limiters.sweep();
        if removed > 0 {
            debug!(removed, "Evicted idle rate limit keys");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
