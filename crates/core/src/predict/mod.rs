pub mod aggregate;
pub mod error;
pub mod http;

pub use aggregate::aggregate_predictions;

use polars::prelude::DataFrame;

/// `[p(stay), p(churn)]` for one feature row.
pub type ProbabilityPair = [f64; 2];

#[async_trait::async_trait]
pub trait ChurnModel: Send + Sync {
    fn name(&self) -> &str;

    /// One probability pair per row of `features`, in row order.
    async fn predict_proba(&self, features: &DataFrame) -> anyhow::Result<Vec<ProbabilityPair>>;
}

/// Churn-class column of the model output.
pub fn churn_class(pairs: &[ProbabilityPair]) -> Vec<f64> {
    pairs.iter().map(|p| p[1]).collect()
}
