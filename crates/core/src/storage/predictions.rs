use crate::domain::prediction::{PredictionRun, ScoredClient};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

const DEFAULT_INSERT_BATCH: usize = 500;

pub async fn persist_success(pool: &sqlx::PgPool, run: &PredictionRun) -> anyhow::Result<Uuid> {
    anyhow::ensure!(!run.clients.is_empty(), "prediction run must have clients");

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let run_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO churn_prediction_runs \
         (id, as_of_date, generated_at, model, status, error, row_count, client_count) \
         VALUES ($1, $2, $3, $4, 'success', NULL, $5, $6)",
    )
    .bind(run_id)
    .bind(run.as_of_date)
    .bind(run.generated_at)
    .bind(&run.model)
    .bind(run.row_count as i64)
    .bind(run.clients.len() as i64)
    .execute(&mut *tx)
    .await
    .context("insert churn_prediction_runs failed")?;

    let chunk_size: usize = std::env::var("PREDICTIONS_INSERT_BATCH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_INSERT_BATCH);
    anyhow::ensure!(chunk_size >= 1, "PREDICTIONS_INSERT_BATCH must be >= 1");

    for (batch_idx, chunk) in run.clients.chunks(chunk_size).enumerate() {
        insert_clients(&mut tx, run_id, chunk).await?;
        tracing::debug!(
            %run_id,
            batch_idx,
            batch_size = chunk.len(),
            "churn_predictions batch insert"
        );
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(run_id)
}

pub async fn persist_failure(
    pool: &sqlx::PgPool,
    as_of_date: NaiveDate,
    generated_at: DateTime<Utc>,
    model: &str,
    error: &str,
    raw_model_response: Option<serde_json::Value>,
) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO churn_prediction_runs \
         (id, as_of_date, generated_at, model, status, error, raw_model_response) \
         VALUES ($1, $2, $3, $4, 'error', $5, $6)",
    )
    .bind(run_id)
    .bind(as_of_date)
    .bind(generated_at)
    .bind(model)
    .bind(error)
    .bind(raw_model_response)
    .execute(pool)
    .await
    .context("insert error churn_prediction_runs failed")?;

    Ok(run_id)
}

async fn insert_clients(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    run_id: Uuid,
    clients: &[ScoredClient],
) -> anyhow::Result<()> {
    let mut qb = sqlx::QueryBuilder::new(
        "INSERT INTO churn_predictions (run_id, client_id, churn_probability, price_var, price_fix) ",
    );
    qb.push_values(clients, |mut b, c| {
        b.push_bind(run_id)
            .push_bind(c.client_id.clone())
            .push_bind(c.churn_probability)
            .push_bind(c.price_var)
            .push_bind(c.price_fix);
    });

    qb.build()
        .persistent(false)
        .execute(&mut **tx)
        .await
        .context("batch insert churn_predictions failed")?;
    Ok(())
}
