use clap::Parser;
use quorate::adapters::{
    FilePreferenceStore, HttpCandidateSource, HttpChainSubmitter, HttpDecisionEngine,
    JsonRpcConnectivityProbe, NullConnectivityProbe,
};
use quorate::api::{create_router, AppState};
use quorate::cli::{Cli, Commands};
use quorate::collaborators::{
    CandidateSource, ChainSubmitter, ConnectivityProbe, DecisionEngine, PreferenceStore,
};
use quorate::config::{AppConfig, LoggingConfig};
use quorate::error::{AgentError, Result};
use quorate::health::HealthAggregator;
use quorate::orchestrator::RunOrchestrator;
use quorate::projections::RunProjections;
use quorate::{ActivityLedger, AttestationQueue, CheckpointStore, StateTransitionTracker};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config_dir)?;
    if let Some(dir) = &cli.store_dir {
        config.store.dir = dir.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("config error: {e}");
        }
        return Err(AgentError::Internal("invalid configuration".to_string()));
    }

    match &cli.command {
        Some(Commands::ShowConfig) => {
            println!("{config:#?}");
            Ok(())
        }
        Some(Commands::RunOnce { collection }) => {
            init_logging(&config.logging);
            let app = build_app(&config).await?;
            let summary = app
                .orchestrator
                .trigger_run(collection, cli.dry_run)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Some(Commands::Serve) | None => {
            init_logging(&config.logging);
            run_daemon(config).await
        }
    }
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let state = build_app(&config).await?;
    let orchestrator = state.orchestrator.clone();
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr, "voting agent listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            orchestrator.request_shutdown();
            info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn build_app(config: &AppConfig) -> Result<AppState> {
    let store = CheckpointStore::new(&config.store.dir);

    let tracker = Arc::new(StateTransitionTracker::load(store.clone(), &config.tracker).await?);
    let ledger = Arc::new(ActivityLedger::load(store.clone(), &config.activity).await?);
    let queue = Arc::new(AttestationQueue::load(store.clone(), &config.attestation).await?);

    let preferences: Arc<dyn PreferenceStore> = Arc::new(FilePreferenceStore::new(
        Path::new(&config.store.dir).join("preferences.json"),
    ));
    let candidates: Arc<dyn CandidateSource> = Arc::new(HttpCandidateSource::new(
        require_url(&config.collaborators.candidate_source_url, "candidate_source_url")?,
    ));
    let engine: Arc<dyn DecisionEngine> = Arc::new(HttpDecisionEngine::new(require_url(
        &config.collaborators.decision_engine_url,
        "decision_engine_url",
    )?));
    let submitter: Arc<dyn ChainSubmitter> = Arc::new(HttpChainSubmitter::new(require_url(
        &config.collaborators.submitter_url,
        "submitter_url",
    )?));
    let probe: Arc<dyn ConnectivityProbe> = match &config.collaborators.rpc_url {
        Some(url) => Arc::new(JsonRpcConnectivityProbe::new(url.clone())),
        None => {
            warn!("no rpc_url configured, chain connectivity will report unhealthy");
            Arc::new(NullConnectivityProbe)
        }
    };

    let health = Arc::new(HealthAggregator::new(
        &config.health,
        &config.orchestrator,
        probe,
        ledger.clone(),
        tracker.clone(),
    ));
    let orchestrator = Arc::new(RunOrchestrator::new(
        config.orchestrator.clone(),
        store.clone(),
        tracker.clone(),
        ledger.clone(),
        queue.clone(),
        preferences,
        candidates,
        engine,
        submitter,
    ));
    let projections = Arc::new(RunProjections::new(store));

    Ok(AppState {
        orchestrator,
        tracker,
        ledger,
        queue,
        health,
        projections,
        start_time: chrono::Utc::now(),
    })
}

fn require_url(url: &Option<String>, name: &str) -> Result<String> {
    url.clone()
        .ok_or_else(|| AgentError::Validation(format!("collaborators.{name} is not configured")))
}

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::Layer;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},quorate=debug", logging.level)));

    // `tracing_appender::rolling::daily` aborts if it cannot create the
    // initial log file, so writability is preflighted first.
    let file_layer = logging.dir.as_deref().and_then(|log_dir| {
        if std::fs::create_dir_all(log_dir).is_err() {
            eprintln!("Warning: could not create log directory {log_dir}, file logging disabled");
            return None;
        }
        let test_path = Path::new(log_dir).join(".quorate_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(log_dir, "quorate.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Keep the guard alive for the life of the process.
                Box::leak(Box::new(guard));
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!("Warning: could not write to log directory {log_dir} ({e}), file logging disabled");
                None
            }
        }
    });

    let console_layer = if logging.json {
        tracing_subscriber::fmt::layer().json().with_target(true).boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
