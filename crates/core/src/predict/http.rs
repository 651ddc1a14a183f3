use crate::config::Settings;
use crate::frame;
use crate::predict::error::ModelDiagnosticsError;
use crate::predict::{ChurnModel, ProbabilityPair};
use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/predict_proba";
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_MODEL_NAME: &str = "churn_classifier";
const MAX_BACKOFF_SHIFT: u32 = 6;

/// Column-major header plus row-major cells, as the scoring service expects.
#[derive(Debug, Clone, Serialize)]
pub struct PredictRequest {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl PredictRequest {
    pub fn from_frame(features: &DataFrame) -> Result<Self> {
        Ok(Self {
            columns: frame::column_names(features),
            rows: frame::rows_json(features).context("failed to encode feature rows")?,
        })
    }
}

/// Delay before retry number `attempt + 1`: 1s, 2s, 4s, ... capped at 64s.
fn backoff_for(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT))
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictResponse {
    pub probabilities: Vec<ProbabilityPair>,
}

/// Pre-trained classifier served over HTTP.
#[derive(Debug, Clone)]
pub struct HttpScoringModel {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
    name: String,
}

impl HttpScoringModel {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build model http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
            path: DEFAULT_PATH.to_string(),
            retries: DEFAULT_RETRIES,
            name: DEFAULT_MODEL_NAME.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_model_endpoint_url()?.to_string();
        let api_key = settings.model_api_key.clone();

        let timeout_secs = std::env::var("MODEL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("MODEL_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES);

        let path = std::env::var("MODEL_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let name = std::env::var("MODEL_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build model http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
            name,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    fn diagnostics(
        &self,
        stage: &'static str,
        detail: String,
        raw: Option<String>,
    ) -> ModelDiagnosticsError {
        let raw_response_json = raw
            .as_deref()
            .and_then(|text| serde_json::from_str::<Value>(text).ok());
        ModelDiagnosticsError {
            model: self.name.clone(),
            stage,
            detail,
            raw_output: raw,
            raw_response_json,
        }
    }

    async fn predict_once(&self, body: &PredictRequest) -> Result<(PredictResponse, String)> {
        let res = self
            .http
            .post(self.url())
            .headers(self.headers()?)
            .json(body)
            .send()
            .await
            .context("model request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read model response body")?;
        if !status.is_success() {
            return Err(self
                .diagnostics("http", format!("status={status}"), Some(text))
                .into());
        }

        let parsed = serde_json::from_str::<PredictResponse>(&text).map_err(|e| {
            self.diagnostics("decode", format!("invalid response shape: {e}"), Some(text.clone()))
        })?;
        Ok((parsed, text))
    }

    fn validate(&self, resp: &PredictResponse, raw: &str, expected_rows: usize) -> Result<()> {
        if resp.probabilities.len() != expected_rows {
            return Err(self
                .diagnostics(
                    "validate",
                    format!(
                        "expected {expected_rows} probability pairs, got {}",
                        resp.probabilities.len()
                    ),
                    Some(raw.to_string()),
                )
                .into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChurnModel for HttpScoringModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict_proba(&self, features: &DataFrame) -> Result<Vec<ProbabilityPair>> {
        let body = PredictRequest::from_frame(features)?;
        let rows = features.height();

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.predict_once(&body).await {
                Ok((parsed, raw)) => {
                    self.validate(&parsed, &raw, rows)?;
                    tracing::debug!(rows, attempt, "model scored feature table");
                    return Ok(parsed.probabilities);
                }
                Err(err) => {
                    if attempt >= self.retries.max(1) {
                        return Err(err);
                    }
                    let backoff = backoff_for(attempt);
                    tracing::warn!(
                        attempt,
                        ?backoff,
                        error = %err,
                        "model request failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
