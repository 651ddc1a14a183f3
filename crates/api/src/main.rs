use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use powerco_core::domain::prediction::{ClientPrediction, PredictionRun, ScoredClient};
use powerco_core::report::{self, AtRiskSummary, HistogramBin, ProbabilityThreshold};

const MAX_HISTOGRAM_BINS: usize = 1000;

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
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match powerco_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState { pool };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/runs/latest", get(get_latest_run))
        .route("/runs/latest/at_risk", get(get_latest_at_risk))
        .route("/runs/latest/histogram", get(get_latest_histogram))
        .route("/runs/:as_of_date", get(get_run_by_date))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<PgPool>,
}

#[derive(Debug, Serialize)]
struct ApiRun {
    run_id: Uuid,
    run: PredictionRun,
}

#[derive(Debug, Deserialize)]
struct AtRiskParams {
    threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ApiAtRisk {
    run_id: Uuid,
    threshold: ProbabilityThreshold,
    summary: AtRiskSummary,
    clients: Vec<ScoredClient>,
}

#[derive(Debug, Deserialize)]
struct HistogramParams {
    bins: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ApiHistogram {
    run_id: Uuid,
    bins: Vec<HistogramBin>,
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn latest_run(state: &AppState) -> Result<(Uuid, PredictionRun), StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    fetch_run(pool, None)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_latest_run(State(state): State<AppState>) -> Result<Json<ApiRun>, StatusCode> {
    let (run_id, run) = latest_run(&state).await?;
    Ok(Json(ApiRun { run_id, run }))
}

async fn get_run_by_date(
    State(state): State<AppState>,
    Path(as_of_date): Path<String>,
) -> Result<Json<ApiRun>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let as_of_date =
        NaiveDate::parse_from_str(&as_of_date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;

    let (run_id, run) = fetch_run(pool, Some(as_of_date))
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiRun { run_id, run }))
}

async fn get_latest_at_risk(
    State(state): State<AppState>,
    Query(params): Query<AtRiskParams>,
) -> Result<Json<ApiAtRisk>, StatusCode> {
    let threshold = match params.threshold {
        Some(t) => ProbabilityThreshold::try_new(t).map_err(|_| StatusCode::BAD_REQUEST)?,
        None => ProbabilityThreshold::default(),
    };

    let (run_id, run) = latest_run(&state).await?;
    let (clients, summary) = report::at_risk(&run.clients, threshold);

    Ok(Json(ApiAtRisk {
        run_id,
        threshold,
        summary,
        clients,
    }))
}

async fn get_latest_histogram(
    State(state): State<AppState>,
    Query(params): Query<HistogramParams>,
) -> Result<Json<ApiHistogram>, StatusCode> {
    let bins = params.bins.unwrap_or(report::DEFAULT_HISTOGRAM_BINS);
    if bins == 0 || bins > MAX_HISTOGRAM_BINS {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (run_id, run) = latest_run(&state).await?;
    let predictions: Vec<ClientPrediction> = run
        .clients
        .iter()
        .map(|c| ClientPrediction {
            client_id: c.client_id.clone(),
            churn_probability: c.churn_probability,
        })
        .collect();

    Ok(Json(ApiHistogram {
        run_id,
        bins: report::probability_histogram(&predictions, bins),
    }))
}

async fn fetch_run(
    pool: &PgPool,
    as_of_date: Option<NaiveDate>,
) -> anyhow::Result<Option<(Uuid, PredictionRun)>> {
    let row = match as_of_date {
        Some(d) => {
            sqlx::query_as::<_, (Uuid, NaiveDate, DateTime<Utc>, String, Option<i64>)>(
                "SELECT id, as_of_date, generated_at, model, row_count \
                 FROM churn_prediction_runs \
                 WHERE status = 'success' AND as_of_date = $1 \
                 ORDER BY generated_at DESC \
                 LIMIT 1",
            )
            .bind(d)
            .fetch_optional(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, (Uuid, NaiveDate, DateTime<Utc>, String, Option<i64>)>(
                "SELECT id, as_of_date, generated_at, model, row_count \
                 FROM churn_prediction_runs \
                 WHERE status = 'success' \
                 ORDER BY as_of_date DESC, generated_at DESC \
                 LIMIT 1",
            )
            .fetch_optional(pool)
            .await?
        }
    };

    let Some((id, as_of_date, generated_at, model, row_count)) = row else {
        return Ok(None);
    };

    let clients = fetch_clients(pool, id).await?;

    Ok(Some((
        id,
        PredictionRun {
            as_of_date,
            generated_at,
            model,
            row_count: row_count.unwrap_or_default().max(0) as usize,
            clients,
        },
    )))
}

async fn fetch_clients(pool: &PgPool, run_id: Uuid) -> anyhow::Result<Vec<ScoredClient>> {
    let rows = sqlx::query_as::<_, (String, f64, Option<f64>, Option<f64>)>(
        "SELECT client_id, churn_probability, price_var, price_fix \
         FROM churn_predictions \
         WHERE run_id = $1 \
         ORDER BY client_id COLLATE \"C\" DESC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(client_id, churn_probability, price_var, price_fix)| ScoredClient {
            client_id,
            churn_probability,
            price_var,
            price_fix,
        })
        .collect())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
