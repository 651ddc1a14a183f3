use crate::features::error::FeatureError;
use crate::features::preprocess::categorical_dtype;
use crate::frame::{self, polars_error};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

const BASE_PRECISION: i32 = 3;
const MAX_PRECISION: i32 = 20;

/// One equal-frequency binning request: `<column>_binned` with `q` bins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinSpec {
    pub column: String,
    pub q: usize,
}

impl BinSpec {
    pub fn new(column: impl Into<String>, q: usize) -> Self {
        Self {
            column: column.into(),
            q,
        }
    }
}

/// Quantile edges over the non-missing values, linear interpolation between order statistics.
pub(crate) fn quantile_edges(values: &[Option<f64>], q: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    if sorted.is_empty() || q == 0 {
        return Vec::new();
    }
    sorted.sort_by(f64::total_cmp);

    let last = (sorted.len() - 1) as f64;
    (0..=q)
        .map(|k| {
            let pos = last * k as f64 / q as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        })
        .collect()
}

/// Bin index for `x`: right-closed intervals, the first one also closed on the left.
fn assign(edges: &[f64], x: f64) -> Option<usize> {
    let first = *edges.first()?;
    let last = *edges.last()?;
    if x.is_nan() || x < first || x > last {
        return None;
    }
    if x == first {
        return Some(0);
    }
    Some(edges.partition_point(|e| *e < x) - 1)
}

fn round_to(x: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (x * scale).round() / scale
}

/// Rounds to `precision` significant digits of the fractional part.
fn round_frac(x: f64, precision: i32) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    let whole = x.trunc();
    let digits = if whole == 0.0 {
        -(x.abs().log10().floor() as i32) - 1 + precision
    } else {
        precision
    };
    round_to(x, digits)
}

fn infer_precision(edges: &[f64]) -> i32 {
    (BASE_PRECISION..MAX_PRECISION)
        .find(|&p| {
            let mut levels: Vec<f64> = edges.iter().map(|e| round_frac(*e, p)).collect();
            levels.dedup();
            levels.len() == edges.len()
        })
        .unwrap_or(BASE_PRECISION)
}

fn interval_labels(edges: &[f64]) -> Vec<String> {
    let precision = infer_precision(edges);
    let mut breaks: Vec<f64> = edges.iter().map(|e| round_frac(*e, precision)).collect();
    breaks[0] -= 10f64.powi(-precision);

    breaks
        .windows(2)
        .map(|w| format!("({:?}, {:?}]", w[0], w[1]))
        .collect()
}

/// Interval labels and the bin code of every row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Binned {
    pub categories: Vec<String>,
    pub codes: Vec<Option<usize>>,
}

impl Binned {
    fn label(&self, row: usize) -> Option<&str> {
        self.codes[row].map(|c| self.categories[c].as_str())
    }
}

/// Two passes over the whole column: edges first, then assignment.
pub(crate) fn cut_quantiles(
    values: &[Option<f64>],
    column: &str,
    q: usize,
) -> Result<Binned, FeatureError> {
    if q == 0 {
        return Err(FeatureError::schema(column, "bin count must be positive"));
    }

    let edges = quantile_edges(values, q);
    let mut distinct = edges.clone();
    distinct.dedup();
    if distinct.len() != q + 1 {
        return Err(FeatureError::InsufficientCardinality {
            column: column.to_string(),
            q,
            distinct_edges: distinct.len(),
        });
    }

    let codes = values
        .iter()
        .map(|v| v.and_then(|x| assign(&edges, x)))
        .collect();

    Ok(Binned {
        categories: interval_labels(&edges),
        codes,
    })
}

/// Adds `<column>_binned` as a categorical of interval labels.
pub(crate) fn add_binned(mut df: DataFrame, spec: &BinSpec) -> Result<DataFrame, FeatureError> {
    let values = frame::numeric(&df, &spec.column)?;
    let binned = cut_quantiles(&values, &spec.column, spec.q)?;

    let output = format!("{}_binned", spec.column);
    let labels: Vec<Option<&str>> = (0..values.len()).map(|row| binned.label(row)).collect();
    let series = Series::new(output.as_str().into(), labels)
        .cast(&categorical_dtype())
        .map_err(polars_error(&output))?;
    df.with_column(series).map_err(polars_error(&output))?;

    tracing::trace!(column = %spec.column, q = spec.q, "quantile bins assigned");
    Ok(df)
}
