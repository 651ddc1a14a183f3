use crate::features::error::FeatureError;
use crate::frame::{self, datetime_dtype, polars_error};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Columns treated as calendar values: any name containing "date".
pub(crate) fn date_columns(df: &DataFrame) -> Vec<String> {
    frame::column_names(df)
        .into_iter()
        .filter(|n| n.contains("date"))
        .collect()
}

pub(crate) fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parses every date-named column in place. Already-parsed columns pass through.
pub(crate) fn normalize_dates(mut df: DataFrame) -> Result<DataFrame, FeatureError> {
    for name in date_columns(&df) {
        let s = frame::series(&df, &name)?;
        let parsed = match s.dtype() {
            DataType::Datetime(TimeUnit::Microseconds, None) => continue,
            _ if s.null_count() == s.len() => {
                Series::full_null(name.as_str().into(), s.len(), &datetime_dtype())
            }
            DataType::String => {
                let values = parse_text_column(&name, &frame::texts(&df, &name)?)?;
                frame::datetime_series(&name, &values).map_err(polars_error(&name))?
            }
            DataType::Datetime(_, _) | DataType::Date => {
                s.cast(&datetime_dtype()).map_err(polars_error(&name))?
            }
            _ => return Err(first_value_error(&df, &name)?),
        };

        df.with_column(parsed).map_err(polars_error(&name))?;
    }
    Ok(df)
}

fn parse_text_column(
    name: &str,
    values: &[Option<String>],
) -> Result<Vec<Option<NaiveDateTime>>, FeatureError> {
    values
        .iter()
        .enumerate()
        .map(|(row, v)| match v.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_datetime(s)
                .map(Some)
                .ok_or_else(|| FeatureError::MalformedDate {
                    column: name.to_string(),
                    row,
                    value: s.to_string(),
                }),
        })
        .collect()
}

/// A non-text date column holding values: reported at its first present value.
fn first_value_error(df: &DataFrame, name: &str) -> Result<FeatureError, FeatureError> {
    let (row, value) = frame::labels(df, name)?
        .into_iter()
        .enumerate()
        .find_map(|(row, v)| v.map(|v| (row, v)))
        .ok_or_else(|| FeatureError::schema(name, "expected date values"))?;

    Ok(FeatureError::MalformedDate {
        column: name.to_string(),
        row,
        value,
    })
}

/// Adds `<col>_year`, `<col>_month` and `<col>_dow` (Monday = 0).
pub(crate) fn extract_date_parts(df: DataFrame, col_name: &str) -> Result<DataFrame, FeatureError> {
    frame::require_datetime(&df, col_name)?;

    df.lazy()
        .with_columns([
            col(col_name)
                .dt()
                .year()
                .cast(DataType::Int64)
                .alias(format!("{col_name}_year")),
            col(col_name)
                .dt()
                .month()
                .cast(DataType::Int64)
                .alias(format!("{col_name}_month")),
            (col(col_name).dt().weekday().cast(DataType::Int64) - lit(1i64))
                .alias(format!("{col_name}_dow")),
        ])
        .collect()
        .map_err(polars_error(col_name))
}
