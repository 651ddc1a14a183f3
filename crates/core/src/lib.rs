pub mod domain;
pub mod features;
pub mod frame;
pub mod ingest;
pub mod predict;
pub mod report;
pub mod storage;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub model_endpoint_url: Option<String>,
        pub model_api_key: Option<String>,
        pub client_data_path: Option<String>,
        pub price_data_path: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                model_endpoint_url: std::env::var("MODEL_ENDPOINT_URL").ok(),
                model_api_key: std::env::var("MODEL_API_KEY").ok(),
                client_data_path: std::env::var("CLIENT_DATA_PATH").ok(),
                price_data_path: std::env::var("PRICE_DATA_PATH").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_model_endpoint_url(&self) -> anyhow::Result<&str> {
            self.model_endpoint_url
                .as_deref()
                .context("MODEL_ENDPOINT_URL is required")
        }
    }
}
