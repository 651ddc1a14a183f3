//! Display-side summaries over scored clients. Nothing here feeds back into feature
//! derivation.

use crate::domain::prediction::{ClientPrediction, ScoredClient};
use crate::features::FeatureOutput;
use crate::frame;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_HISTOGRAM_BINS: usize = 40;
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Cut-off for retention offers, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct ProbabilityThreshold(f64);

impl ProbabilityThreshold {
    pub fn try_new(value: f64) -> anyhow::Result<Self> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&value),
            "probability threshold must be between 0 and 1 (got {value})"
        );
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for ProbabilityThreshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceProfile {
    pub price_var: Option<f64>,
    pub price_fix: Option<f64>,
}

fn mean((sum, n): (f64, usize)) -> Option<f64> {
    (n > 0).then(|| sum / n as f64)
}

const CLIENT_ID: &str = "client_id";

/// Mean `price_var` / `price_fix` per client over its feature rows.
pub fn price_profiles(output: &FeatureOutput) -> anyhow::Result<HashMap<String, PriceProfile>> {
    let mut df = output.features.select(["price_var", "price_fix"])?;
    df.with_column(Series::new(CLIENT_ID.into(), output.client_ids.as_slice()))?;

    let means = df
        .lazy()
        .group_by([col(CLIENT_ID)])
        .agg([
            col("price_var").cast(DataType::Float64).mean(),
            col("price_fix").cast(DataType::Float64).mean(),
        ])
        .collect()?;

    let ids = frame::texts(&means, CLIENT_ID)?;
    let var = frame::numeric(&means, "price_var")?;
    let fix = frame::numeric(&means, "price_fix")?;

    Ok(ids
        .into_iter()
        .zip(var.into_iter().zip(fix))
        .filter_map(|(id, (price_var, price_fix))| {
            Some((
                id?,
                PriceProfile {
                    price_var,
                    price_fix,
                },
            ))
        })
        .collect())
}

/// Joins predictions with price profiles, keeping prediction order.
pub fn score_clients(
    predictions: &[ClientPrediction],
    profiles: &HashMap<String, PriceProfile>,
) -> Vec<ScoredClient> {
    predictions
        .iter()
        .map(|p| {
            let profile = profiles.get(&p.client_id).copied().unwrap_or_default();
            ScoredClient {
                client_id: p.client_id.clone(),
                churn_probability: p.churn_probability,
                price_var: profile.price_var,
                price_fix: profile.price_fix,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtRiskSummary {
    pub count: usize,
    /// Average churn probability, in percent.
    pub avg_churn_probability_pct: Option<f64>,
    pub min_churn_probability: Option<f64>,
    pub max_churn_probability: Option<f64>,
    pub avg_price_var: Option<f64>,
    pub avg_price_fix: Option<f64>,
}

fn mean_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    mean((sum, n))
}

/// Clients with `churn_probability >= threshold`, plus their summary.
pub fn at_risk(
    clients: &[ScoredClient],
    threshold: ProbabilityThreshold,
) -> (Vec<ScoredClient>, AtRiskSummary) {
    let selected: Vec<ScoredClient> = clients
        .iter()
        .filter(|c| c.churn_probability >= threshold.value())
        .cloned()
        .collect();

    if selected.is_empty() {
        return (selected, AtRiskSummary::default());
    }

    let probs = || selected.iter().map(|c| c.churn_probability);
    let summary = AtRiskSummary {
        count: selected.len(),
        avg_churn_probability_pct: mean_of(probs()).map(|p| p * 100.0),
        min_churn_probability: probs().reduce(f64::min),
        max_churn_probability: probs().reduce(f64::max),
        avg_price_var: mean_of(selected.iter().filter_map(|c| c.price_var)),
        avg_price_fix: mean_of(selected.iter().filter_map(|c| c.price_fix)),
    };
    (selected, summary)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width histogram over the observed probability range; the last bin is closed.
pub fn probability_histogram(predictions: &[ClientPrediction], bins: usize) -> Vec<HistogramBin> {
    let values: Vec<f64> = predictions
        .iter()
        .map(|p| p.churn_probability)
        .filter(|p| p.is_finite())
        .collect();
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let mut lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: lo + width * i as f64,
            upper: if i + 1 == bins { hi } else { lo + width * (i + 1) as f64 },
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: &str, p: f64, var: Option<f64>, fix: Option<f64>) -> ScoredClient {
        ScoredClient {
            client_id: id.to_string(),
            churn_probability: p,
            price_var: var,
            price_fix: fix,
        }
    }

    fn prediction(id: &str, p: f64) -> ClientPrediction {
        ClientPrediction {
            client_id: id.to_string(),
            churn_probability: p,
        }
    }

    #[test]
    fn threshold_must_be_a_probability() {
        assert!(ProbabilityThreshold::try_new(0.0).is_ok());
        assert!(ProbabilityThreshold::try_new(1.0).is_ok());
        assert!(ProbabilityThreshold::try_new(1.01).is_err());
        assert!(ProbabilityThreshold::try_new(-0.1).is_err());
        assert!(ProbabilityThreshold::try_new(f64::NAN).is_err());
    }

    #[test]
    fn summarizes_clients_at_or_above_threshold() {
        let clients = vec![
            scored("c", 0.9, Some(0.2), Some(40.0)),
            scored("b", 0.5, Some(0.1), None),
            scored("a", 0.1, Some(0.9), Some(10.0)),
        ];
        let (selected, summary) = at_risk(&clients, ProbabilityThreshold::try_new(0.5).unwrap());

        assert_eq!(selected.len(), 2);
        assert_eq!(summary.count, 2);
        assert!((summary.avg_churn_probability_pct.unwrap() - 70.0).abs() < 1e-9);
        assert_eq!(summary.min_churn_probability, Some(0.5));
        assert_eq!(summary.max_churn_probability, Some(0.9));
        assert!((summary.avg_price_var.unwrap() - 0.15).abs() < 1e-12);
        assert_eq!(summary.avg_price_fix, Some(40.0));
    }

    #[test]
    fn nobody_at_risk_gives_empty_summary() {
        let clients = vec![scored("a", 0.1, None, None)];
        let (selected, summary) = at_risk(&clients, ProbabilityThreshold::try_new(0.2).unwrap());
        assert!(selected.is_empty());
        assert_eq!(summary, AtRiskSummary::default());
    }

    #[test]
    fn score_clients_keeps_prediction_order() {
        let mut profiles = HashMap::new();
        profiles.insert(
            "a".to_string(),
            PriceProfile {
                price_var: Some(0.1),
                price_fix: Some(44.0),
            },
        );
        let out = score_clients(&[prediction("b", 0.3), prediction("a", 0.6)], &profiles);
        assert_eq!(out[0], scored("b", 0.3, None, None));
        assert_eq!(out[1], scored("a", 0.6, Some(0.1), Some(44.0)));
    }

    #[test]
    fn price_profiles_average_rows_per_client() {
        let output = FeatureOutput {
            features: df!(
                "price_var" => [Some(0.1), Some(0.3), None],
                "price_fix" => [Some(40.0), Some(44.0), None],
            )
            .unwrap(),
            client_ids: vec!["a".into(), "a".into(), "b".into()],
            original_columns: 0,
        };

        let profiles = price_profiles(&output).unwrap();

        assert_eq!(profiles.len(), 2);
        assert!((profiles["a"].price_var.unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(profiles["a"].price_fix, Some(42.0));
        assert_eq!(profiles["b"], PriceProfile::default());
    }

    #[test]
    fn histogram_covers_observed_range() {
        let preds = vec![prediction("a", 0.0), prediction("b", 0.5), prediction("c", 1.0)];
        let hist = probability_histogram(&preds, 4);
        assert_eq!(hist.len(), 4);
        assert_eq!(hist.iter().map(|b| b.count).collect::<Vec<_>>(), vec![1, 0, 1, 1]);
        assert_eq!(hist[0].lower, 0.0);
        assert_eq!(hist[3].upper, 1.0);
    }

    #[test]
    fn histogram_of_identical_values_has_one_filled_bin() {
        let preds = vec![prediction("a", 0.3), prediction("b", 0.3)];
        let hist = probability_histogram(&preds, DEFAULT_HISTOGRAM_BINS);
        assert_eq!(hist.len(), DEFAULT_HISTOGRAM_BINS);
        assert_eq!(hist.iter().map(|b| b.count).sum::<usize>(), 2);
    }
}
