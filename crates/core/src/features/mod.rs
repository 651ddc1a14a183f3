//! Feature derivation for churn scoring.
//!
//! [`FeaturePipeline::run`] turns the merged client/price table into the model-ready feature
//! table. Steps run in a fixed order and the resulting column order is the feature schema:
//!
//! 1. total consumption
//! 2. averaged prices and period differentials
//! 3. quantile bins ([`default_bin_specs`])
//! 4. seasonal off-peak differentials (drops `id`)
//! 5. calendar parts of the five date columns
//! 6. contract durations in days
//!
//! The client ids are captured before anything is dropped and returned next to the table.

pub mod binning;
pub mod dates;
pub mod error;
pub mod preprocess;
pub mod prices;

mod consumption;
mod duration;

pub use binning::BinSpec;
pub use error::FeatureError;

use crate::frame;
use polars::prelude::DataFrame;

pub const CALENDAR_COLUMNS: [&str; 5] = [
    "date_activ",
    "date_end",
    "date_modif_prod",
    "date_renewal",
    "price_date",
];

const DEFAULT_BINS: [(&str, usize); 11] = [
    ("total_cons", 10),
    ("cons_12m", 10),
    ("cons_last_month", 2),
    ("forecast_cons_year", 2),
    ("forecast_cons_12m", 10),
    ("imp_cons", 2),
    ("net_margin", 10),
    ("forecast_meter_rent_12m", 4),
    ("margin_gross_pow_ele", 4),
    ("margin_net_pow_ele", 4),
    ("pow_max", 4),
];

pub fn default_bin_specs() -> Vec<BinSpec> {
    DEFAULT_BINS
        .iter()
        .map(|(column, q)| BinSpec::new(*column, *q))
        .collect()
}

#[derive(Debug, Clone)]
pub struct FeatureOutput {
    /// Model-ready features, without `id`.
    pub features: DataFrame,
    /// Client id per feature row, captured before `id` was dropped.
    pub client_ids: Vec<String>,
    /// Number of leading columns that came from the input (excluding `id`).
    pub original_columns: usize,
}

impl FeatureOutput {
    pub fn derived_column_names(&self) -> Vec<String> {
        frame::column_names(&self.features).split_off(self.original_columns)
    }
}

#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    bins: Vec<BinSpec>,
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FeaturePipeline {
    pub fn new() -> Self {
        Self {
            bins: default_bin_specs(),
        }
    }

    pub fn with_bins(bins: Vec<BinSpec>) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[BinSpec] {
        &self.bins
    }

    /// Derives the feature table from the merged client/price rows.
    ///
    /// Pure over `(merged, bins)`: the input is not modified and a failure at any step
    /// returns the error without partial output.
    pub fn run(&self, merged: &DataFrame) -> Result<FeatureOutput, FeatureError> {
        let preprocess::Prepared {
            frame: mut df,
            client_ids,
        } = preprocess::preprocess(merged)?;
        let input_rows = df.height();
        let original_columns = df.width() - 1;

        df = consumption::add_total_consumption(df)?;
        df = prices::add_price_features(df)?;
        for spec in &self.bins {
            df = binning::add_binned(df, spec)?;
        }
        df = prices::add_seasonal_offpeak_diff(df)?;
        for col in CALENDAR_COLUMNS {
            df = dates::extract_date_parts(df, col)?;
        }
        df = duration::add_durations(df)?;

        if df.height() != input_rows {
            return Err(FeatureError::schema(
                preprocess::ID_COLUMN,
                format!("feature table has {} rows, input had {input_rows}", df.height()),
            ));
        }

        tracing::debug!(
            rows = df.height(),
            columns = df.width(),
            derived = df.width() - original_columns,
            "feature table derived"
        );

        Ok(FeatureOutput {
            features: df,
            client_ids,
            original_columns,
        })
    }
}
