use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use dotenvy::dotenv;
use sm_common::db::{
    DbPoolError, MigrationError, PgProfileSource, PgRecommendationStore, ProfileFetchError,
    create_pool_from_url, run_migrations, upsert_profiles,
};
use sm_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use sm_common::matching::weights::WeightError;
use sm_common::store::SourceError;
use sm_common::vocabulary::VocabularyError;
use sm_common::{
    EngineConfig, Profile, ProfileSource, RecommendationEngine, RefreshError, RefreshReport,
    Vocabulary, run_id,
};
use thiserror::Error;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info, warn};

const APP_NAME: &str = "sm-refresh";

type PgEngine = RecommendationEngine<PgProfileSource, PgRecommendationStore>;

#[derive(Debug, Parser)]
#[command(
    name = "sm-refresh",
    about = "Recompute study-partner recommendations from the profiles table"
)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    db_url: String,

    /// JSON vocabulary file (built-in vocabulary when omitted)
    #[arg(long, env = "SM_VOCABULARY_PATH")]
    vocabulary: Option<PathBuf>,

    /// Keep running and refresh every N seconds instead of exiting after one run
    #[arg(long, env = "SM_REFRESH_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// JSON array of profiles to upsert before refreshing
    #[arg(long)]
    import_profiles: Option<PathBuf>,

    /// Do not apply schema migrations on startup
    #[arg(long, default_value_t = false)]
    skip_migrations: bool,

    /// Compute and print recommendations without swapping the stored set
    #[arg(long, default_value_t = false, conflicts_with = "interval_secs")]
    dry_run: bool,
}

#[derive(Debug, Error)]
enum RefreshJobError {
    #[error(transparent)]
    Pool(#[from] DbPoolError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("invalid vocabulary: {0}")]
    Vocabulary(#[from] VocabularyError),
    #[error("invalid engine configuration: {0}")]
    Config(#[from] WeightError),
    #[error("failed to read {path}: {source}")]
    ImportRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    ImportParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to import profiles: {0}")]
    Import(#[from] ProfileFetchError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("failed to render recommendations: {0}")]
    Render(#[source] serde_json::Error),
    #[error("interval must be at least one second")]
    ZeroInterval,
}

fn load_vocabulary(path: Option<&Path>) -> Result<Vocabulary, VocabularyError> {
    match path {
        Some(path) => Vocabulary::from_path(path),
        None => Ok(Vocabulary::default()),
    }
}

fn read_profiles(path: &Path) -> Result<Vec<Profile>, RefreshJobError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RefreshJobError::ImportRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| RefreshJobError::ImportParse {
        path: path.to_path_buf(),
        source,
    })
}

fn record_outcome(result: &Result<RefreshReport, RefreshError>, started: Instant) {
    match result {
        Ok(report) => sm_metrics::record_refresh_success(
            report.profile_count,
            report.recommendation_count,
            report.attempts,
            report.elapsed,
        ),
        Err(err) => {
            error!(kind = err.kind().as_ref(), error = %err, "recommendation refresh failed");
            sm_metrics::record_refresh_failure(err.kind().as_ref(), started.elapsed());
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn dry_run(engine: &PgEngine) -> Result<(), RefreshJobError> {
    let profiles = engine.source().load_profiles().await?;
    let set = engine.compute(&profiles).map_err(RefreshError::from)?;
    info!(
        run_id = %set.run_id,
        profiles = set.profile_count(),
        recommendations = set.recommendation_count(),
        "dry run computed recommendations; stored set untouched"
    );
    let rendered =
        serde_json::to_string_pretty(&set.recommendations).map_err(RefreshJobError::Render)?;
    println!("{rendered}");
    Ok(())
}

async fn run_scheduled(engine: Arc<PgEngine>, every: Duration) {
    sm_metrics::init_metrics("SM_METRICS_PORT", 9464);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = every.as_secs(), "scheduled refresh started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => break,
        }

        let started = Instant::now();
        let handle = engine.spawn_refresh();
        let abort = handle.abort_handle();
        tokio::select! {
            result = handle.join() => record_outcome(&result, started),
            _ = &mut shutdown => {
                abort.abort();
                warn!("shutdown requested during refresh; previous recommendations stay active");
                break;
            }
        }
    }

    info!("scheduled refresh stopped");
}

async fn run() -> Result<(), RefreshJobError> {
    dotenv().ok();
    init_tracing_subscriber(APP_NAME);
    install_tracing_panic_hook(APP_NAME);

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    let vocabulary = load_vocabulary(cli.vocabulary.as_deref())?;

    let pool = create_pool_from_url(&cli.db_url)?;
    let status = pool.status();
    info!(
        process_id = run_id::process(),
        max_size = status.max_size,
        vocabulary = vocabulary.version(),
        top_k = config.top_k,
        "created postgres connection pool for refresh job"
    );

    if !cli.skip_migrations {
        run_migrations(&pool).await?;
    }

    if let Some(path) = cli.import_profiles.as_deref() {
        let profiles = read_profiles(path)?;
        let written = upsert_profiles(&pool, &profiles).await?;
        info!(path = %path.display(), written, "imported profiles");
    }

    let engine = Arc::new(RecommendationEngine::new(
        PgProfileSource::new(pool.clone()),
        PgRecommendationStore::new(pool),
        vocabulary,
        config,
    ));

    if cli.dry_run {
        return dry_run(&engine).await;
    }

    match cli.interval_secs {
        Some(0) => Err(RefreshJobError::ZeroInterval),
        Some(secs) => {
            run_scheduled(engine, Duration::from_secs(secs)).await;
            Ok(())
        }
        None => {
            let started = Instant::now();
            let result = engine.refresh().await;
            record_outcome(&result, started);
            result.map(|_| ()).map_err(RefreshJobError::from)
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "sm-refresh failed");
        eprintln!("sm-refresh failed: {err}");
        std::process::exit(1);
    }
}
