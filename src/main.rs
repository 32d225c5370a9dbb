use anyhow::{Context, Result};
use clap::Parser;
use companion_sessions::{
    create_router, AppState, CompanionCatalog, Config, Evaluator, HttpMetricsSource, MemoryStore,
    MetricsSource, NatsVoiceTransport, NoMetrics, SessionStore, SqliteStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "companion-sessions")]
#[command(about = "Voice tutor session service", long_about = None)]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/companion-sessions")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    info!("Companion Sessions v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let (sessions, catalog): (Arc<dyn SessionStore>, Arc<dyn CompanionCatalog>) =
        match &cfg.store.sqlite_path {
            Some(path) => {
                info!("Using SQLite session store at {}", path);
                if let Some(dir) = std::path::Path::new(path).parent() {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("Failed to create {}", dir.display()))?;
                }
                let store = Arc::new(
                    SqliteStore::open(path)
                        .with_context(|| format!("Failed to open SQLite store {}", path))?,
                );
                (store.clone(), store)
            }
            None => {
                warn!("No store.sqlite_path configured, sessions are kept in memory");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

    let metrics: Arc<dyn MetricsSource> = match &cfg.metrics.api_key {
        Some(api_key) => Arc::new(
            HttpMetricsSource::new(&cfg.metrics.base_url, api_key, cfg.metrics.timeout())
                .context("Failed to build metrics client")?,
        ),
        None => {
            info!("No metrics.api_key configured, provider metrics disabled");
            Arc::new(NoMetrics)
        }
    };
    let evaluator = Evaluator::new(metrics, cfg.metrics.timeout());

    let transport = Arc::new(
        NatsVoiceTransport::connect(&cfg.voice.nats_url, cfg.voice.connect_timeout()).await?,
    );

    let state = AppState::new(
        transport,
        evaluator,
        sessions,
        catalog,
        cfg.voice.clone(),
        cfg.session.evaluation_notice(),
    );
    spawn_controller_sweep(state.clone(), cfg.session.sweep_interval());
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}

/// Periodically drop controllers that no longer hold a call
fn spawn_controller_sweep(state: AppState, every: Duration) {
    if every.is_zero() {
        warn!("session.sweep_interval_secs is 0, idle controllers are never dropped");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            state.evict_idle().await;
        }
    });
}
