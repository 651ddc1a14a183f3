use anyhow::Context;
use chrono::{NaiveDate, Utc};
use powerco_core::domain::prediction::{ClientPrediction, PredictionRun};
use powerco_core::features::{FeatureOutput, FeaturePipeline};
use powerco_core::ingest::{csv, merge};
use powerco_core::predict::{aggregate_predictions, churn_class, ChurnModel};
use powerco_core::report::{self, AtRiskSummary, ProbabilityThreshold};
use std::path::Path;

pub struct ScoringInput<'a> {
    pub client_data: &'a Path,
    pub price_data: &'a Path,
    pub as_of_date: NaiveDate,
    pub threshold: ProbabilityThreshold,
}

pub struct ScoringOutcome {
    pub features: FeatureOutput,
    pub predictions: Vec<ClientPrediction>,
    pub run: PredictionRun,
    pub at_risk: AtRiskSummary,
}

pub async fn score(
    input: ScoringInput<'_>,
    model: &dyn ChurnModel,
) -> anyhow::Result<ScoringOutcome> {
    let client = csv::load_table(input.client_data)?;
    let price = csv::load_table(input.price_data)?;

    let mut merged = merge::merge_client_prices(&client, &price)
        .context("merge client and price data failed")?;
    if merge::drop_label(&mut merged) {
        tracing::info!(
            column = merge::LABEL_COLUMN,
            "dropped training label from client data"
        );
    }
    let merged = merge::sort_for_scoring(&merged)?;

    let features = FeaturePipeline::new()
        .run(&merged)
        .context("feature derivation failed")?;
    tracing::info!(
        rows = features.features.height(),
        derived = features.derived_column_names().len(),
        "features engineered"
    );

    let pairs = model
        .predict_proba(&features.features)
        .await
        .context("model scoring failed")?;
    let predictions = aggregate_predictions(&features.client_ids, &churn_class(&pairs))?;

    let profiles = report::price_profiles(&features)?;
    let clients = report::score_clients(&predictions, &profiles);
    let (_, at_risk) = report::at_risk(&clients, input.threshold);

    let run = PredictionRun {
        as_of_date: input.as_of_date,
        generated_at: Utc::now(),
        model: model.name().to_string(),
        row_count: features.features.height(),
        clients,
    };

    Ok(ScoringOutcome {
        features,
        predictions,
        run,
        at_risk,
    })
}
