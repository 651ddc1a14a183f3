use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct ModelDiagnosticsError {
    pub model: String,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl fmt::Display for ModelDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model error (model={}, stage={}): {}",
            self.model, self.stage, self.detail
        )
    }
}

impl std::error::Error for ModelDiagnosticsError {}

impl ModelDiagnosticsError {
    /// The model's reply as JSON: the parsed body, or the raw text under `raw_text`.
    pub fn raw_model_response(&self) -> Option<Value> {
        self.raw_response_json.clone().or_else(|| {
            self.raw_output
                .as_deref()
                .map(|raw| serde_json::json!({ "raw_text": raw }))
        })
    }
}

/// Raw model reply carried by any [`ModelDiagnosticsError`] in the error chain.
pub fn raw_model_response(err: &anyhow::Error) -> Option<Value> {
    err.chain()
        .find_map(|e| e.downcast_ref::<ModelDiagnosticsError>())
        .and_then(ModelDiagnosticsError::raw_model_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use serde_json::json;

    fn diagnostics(raw: Option<&str>) -> ModelDiagnosticsError {
        ModelDiagnosticsError {
            model: "churn_classifier".into(),
            stage: "http",
            detail: "status=502".into(),
            raw_output: raw.map(str::to_string),
            raw_response_json: raw.and_then(|r| serde_json::from_str(r).ok()),
        }
    }

    #[test]
    fn json_reply_is_kept_as_parsed() {
        let err = anyhow::Error::new(diagnostics(Some(r#"{"error":"overloaded"}"#)));
        assert_eq!(raw_model_response(&err), Some(json!({"error": "overloaded"})));
    }

    #[test]
    fn text_reply_is_wrapped_and_found_under_context() {
        let err = Err::<(), _>(diagnostics(Some("Bad Gateway")))
            .context("scoring failed")
            .unwrap_err();
        assert_eq!(raw_model_response(&err), Some(json!({"raw_text": "Bad Gateway"})));
    }

    #[test]
    fn other_errors_carry_no_reply() {
        assert_eq!(raw_model_response(&anyhow::anyhow!("connect refused")), None);
        assert_eq!(raw_model_response(&anyhow::Error::new(diagnostics(None))), None);
    }
}
