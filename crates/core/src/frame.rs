//! Typed access to polars frames for the feature steps and the model boundary.
//!
//! Lookups fail with [`FeatureError::SchemaMismatch`] naming the column, so callers never see
//! a bare `PolarsError`.

use crate::features::error::FeatureError;
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde_json::Value;

pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Datetime dtype every parsed date column ends up with.
pub fn datetime_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Microseconds, None)
}

pub(crate) fn polars_error(column: &str) -> impl FnOnce(PolarsError) -> FeatureError + '_ {
    move |e| FeatureError::schema(column, e.to_string())
}

pub fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series, FeatureError> {
    df.column(name)
        .map(Column::as_materialized_series)
        .map_err(|_| FeatureError::schema(name, "column not found"))
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .collect()
}

pub fn contains(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

fn is_integer(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn is_numeric(dtype: &DataType) -> bool {
    is_integer(dtype) || matches!(dtype, DataType::Float32 | DataType::Float64)
}

pub(crate) fn require_numeric(df: &DataFrame, name: &str) -> Result<(), FeatureError> {
    let s = series(df, name)?;
    if is_numeric(s.dtype()) {
        Ok(())
    } else {
        Err(FeatureError::schema(
            name,
            format!("expected numeric column, found {}", s.dtype()),
        ))
    }
}

pub(crate) fn require_datetime(df: &DataFrame, name: &str) -> Result<(), FeatureError> {
    match series(df, name)?.dtype() {
        DataType::Datetime(_, _) => Ok(()),
        other => Err(FeatureError::schema(
            name,
            format!("expected datetime column, found {other}"),
        )),
    }
}

/// Numeric view of an integer or float column.
pub fn numeric(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, FeatureError> {
    require_numeric(df, name)?;
    let cast = series(df, name)?
        .cast(&DataType::Float64)
        .map_err(polars_error(name))?;
    let values = cast.f64().map_err(polars_error(name))?;
    Ok(values.into_iter().collect())
}

pub fn integers(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, FeatureError> {
    let s = series(df, name)?;
    if !is_integer(s.dtype()) {
        return Err(FeatureError::schema(
            name,
            format!("expected integer column, found {}", s.dtype()),
        ));
    }
    let cast = s.cast(&DataType::Int64).map_err(polars_error(name))?;
    let values = cast.i64().map_err(polars_error(name))?;
    Ok(values.into_iter().collect())
}

pub fn texts(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, FeatureError> {
    let s = series(df, name)?;
    let values = s.str().map_err(|_| {
        FeatureError::schema(name, format!("expected text column, found {}", s.dtype()))
    })?;
    Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Text view of any column: category labels for categoricals, rendered values otherwise.
pub fn labels(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, FeatureError> {
    let cast = series(df, name)?
        .cast(&DataType::String)
        .map_err(polars_error(name))?;
    let values = cast.str().map_err(polars_error(name))?;
    Ok(values.into_iter().map(|v| v.map(str::to_string)).collect())
}

fn to_micros(raw: i64, unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Nanoseconds => raw.div_euclid(1_000),
        TimeUnit::Microseconds => raw,
        TimeUnit::Milliseconds => raw.saturating_mul(1_000),
    }
}

pub fn datetimes(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDateTime>>, FeatureError> {
    let s = series(df, name)?;
    let DataType::Datetime(unit, _) = s.dtype() else {
        return Err(FeatureError::schema(
            name,
            format!("expected datetime column, found {}", s.dtype()),
        ));
    };
    let unit = *unit;

    let raw = s.cast(&DataType::Int64).map_err(polars_error(name))?;
    let values = raw.i64().map_err(polars_error(name))?;
    Ok(values
        .into_iter()
        .map(|v| {
            v.and_then(|v| DateTime::from_timestamp_micros(to_micros(v, unit)))
                .map(|d| d.naive_utc())
        })
        .collect())
}

/// Datetime series (microsecond precision) from chrono values.
pub fn datetime_series(name: &str, values: &[Option<NaiveDateTime>]) -> PolarsResult<Series> {
    let micros: Vec<Option<i64>> = values
        .iter()
        .map(|v| v.map(|d| d.and_utc().timestamp_micros()))
        .collect();
    Series::new(name.into(), micros).cast(&datetime_dtype())
}

/// JSON cells of one column, as sent across the model boundary.
pub fn json_cells(df: &DataFrame, name: &str) -> Result<Vec<Value>, FeatureError> {
    let dtype = series(df, name)?.dtype().clone();
    let cells = match dtype {
        DataType::Datetime(_, _) => datetimes(df, name)?
            .into_iter()
            .map(|d| {
                d.map(|d| Value::from(d.format(DATETIME_FORMAT).to_string()))
                    .unwrap_or(Value::Null)
            })
            .collect(),
        DataType::Float32 | DataType::Float64 => numeric(df, name)?
            .into_iter()
            .map(|v| v.map(Value::from).unwrap_or(Value::Null))
            .collect(),
        ref d if is_integer(d) => integers(df, name)?
            .into_iter()
            .map(|v| v.map(Value::from).unwrap_or(Value::Null))
            .collect(),
        _ => labels(df, name)?
            .into_iter()
            .map(|v| v.map(Value::from).unwrap_or(Value::Null))
            .collect(),
    };
    Ok(cells)
}

/// Row-major JSON cells in column order.
pub fn rows_json(df: &DataFrame) -> Result<Vec<Vec<Value>>, FeatureError> {
    let mut rows: Vec<Vec<Value>> = (0..df.height())
        .map(|_| Vec::with_capacity(df.width()))
        .collect();
    for name in column_names(df) {
        for (row, cell) in json_cells(df, &name)?.into_iter().enumerate() {
            rows[row].push(cell);
        }
    }
    Ok(rows)
}
