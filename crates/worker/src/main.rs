use anyhow::Context;
use clap::Parser;
use powerco_core::predict::error::raw_model_response;
use powerco_core::predict::http::HttpScoringModel;
use powerco_core::predict::ChurnModel;
use powerco_core::report::ProbabilityThreshold;
use powerco_core::storage::lock::{scoring_lock_key, ScoringLock};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod output;
mod scoring;

#[derive(Debug, Parser)]
#[command(name = "powerco_worker")]
struct Args {
    /// Client extract (CSV). Defaults to CLIENT_DATA_PATH.
    #[arg(long)]
    client_data: Option<PathBuf>,

    /// Price extract (CSV). Defaults to PRICE_DATA_PATH.
    #[arg(long)]
    price_data: Option<PathBuf>,

    /// Scoring as-of date (YYYY-MM-DD). Defaults to today's UTC date.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Churn probability at or above which a client is reported at risk.
    #[arg(long, default_value_t = powerco_core::report::DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Write the derived feature table to this CSV file.
    #[arg(long)]
    features_out: Option<PathBuf>,

    /// Write per-client predictions to this CSV file.
    #[arg(long)]
    predictions_out: Option<PathBuf>,

    /// Do everything except writing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = powerco_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let as_of_date = resolve_as_of_date(args.as_of_date.as_deref())?;
    let threshold = ProbabilityThreshold::try_new(args.threshold)?;
    let client_data = resolve_path(
        args.client_data,
        settings.client_data_path.as_deref(),
        "CLIENT_DATA_PATH",
    )?;
    let price_data = resolve_path(
        args.price_data,
        settings.price_data_path.as_deref(),
        "PRICE_DATA_PATH",
    )?;

    let model = HttpScoringModel::from_settings(&settings)?;

    let db = if args.dry_run {
        None
    } else {
        let db_url = settings.require_database_url()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;
        powerco_core::storage::migrate(&pool).await?;

        let key = scoring_lock_key(as_of_date, &client_data, &price_data);
        let Some(lock) = ScoringLock::try_acquire(&pool, key).await? else {
            tracing::warn!(%as_of_date, key, "scoring lock not acquired; another run in progress");
            return Ok(());
        };
        Some((pool, lock))
    };

    let input = scoring::ScoringInput {
        client_data: &client_data,
        price_data: &price_data,
        as_of_date,
        threshold,
    };
    let result = scoring::score(input, &model).await;

    let (outcome, db) = match (result, db) {
        (Ok(outcome), db) => (outcome, db),
        (Err(err), None) => return Err(err),
        (Err(err), Some((pool, lock))) => {
            sentry_anyhow::capture_anyhow(&err);
            let run_id = powerco_core::storage::predictions::persist_failure(
                &pool,
                as_of_date,
                chrono::Utc::now(),
                model.name(),
                &format!("{:#}", err),
                raw_model_response(&err),
            )
            .await?;
            tracing::error!(%as_of_date, %run_id, error = %err, "scoring run failed");
            release(lock).await;
            return Err(err);
        }
    };

    let summary = &outcome.at_risk;
    tracing::info!(
        %as_of_date,
        clients = outcome.predictions.len(),
        threshold = threshold.value(),
        at_risk = summary.count,
        avg_churn_probability_pct = ?summary.avg_churn_probability_pct,
        avg_price_var = ?summary.avg_price_var,
        avg_price_fix = ?summary.avg_price_fix,
        "clients scored"
    );

    if let Some(path) = &args.features_out {
        output::write_features(path, &outcome.features.features)?;
    }
    if let Some(path) = &args.predictions_out {
        output::write_predictions(path, &outcome.run.clients)?;
    }

    let Some((pool, lock)) = db else {
        tracing::info!(%as_of_date, dry_run = true, "skipping database write");
        return Ok(());
    };

    let run_id = powerco_core::storage::predictions::persist_success(&pool, &outcome.run).await?;
    tracing::info!(%as_of_date, %run_id, "persisted churn predictions");

    release(lock).await;
    Ok(())
}

/// Error paths that skip this drop the guard instead, which also frees the lock.
async fn release(lock: ScoringLock) {
    let key = lock.key();
    if let Err(e) = lock.release().await {
        tracing::warn!(key, error = %e, "failed to release scoring lock");
    }
}

fn init_sentry(settings: &powerco_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn resolve_as_of_date(as_of_date_arg: Option<&str>) -> anyhow::Result<chrono::NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return Ok(chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?);
    }
    Ok(chrono::Utc::now().date_naive())
}

fn resolve_path(
    arg: Option<PathBuf>,
    env_value: Option<&str>,
    env_name: &str,
) -> anyhow::Result<PathBuf> {
    arg.or_else(|| env_value.map(PathBuf::from))
        .with_context(|| format!("pass a path or set {env_name}"))
}
