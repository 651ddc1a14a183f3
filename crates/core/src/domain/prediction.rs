use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Mean churn probability of one client across its feature rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientPrediction {
    pub client_id: String,
    pub churn_probability: f64,
}

/// A client prediction joined with the client's average prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredClient {
    pub client_id: String,
    pub churn_probability: f64,
    pub price_var: Option<f64>,
    pub price_fix: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRun {
    pub as_of_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub model: String,
    pub row_count: usize,
    pub clients: Vec<ScoredClient>,
}
