use crate::features::dates::normalize_dates;
use crate::features::error::FeatureError;
use crate::frame::{self, polars_error};
use polars::prelude::*;

pub const ID_COLUMN: &str = "id";
pub const FLAG_COLUMNS: [&str; 1] = ["has_gas"];

/// Yes/no flag as stored in the raw client extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Yes,
    No,
}

impl Flag {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "1" => Some(Self::Yes),
            "f" | "false" | "0" => Some(Self::No),
            _ => None,
        }
    }

    pub fn as_int(self) -> i64 {
        match self {
            Self::Yes => 1,
            Self::No => 0,
        }
    }
}

pub(crate) fn categorical_dtype() -> DataType {
    DataType::Categorical(None, CategoricalOrdering::Lexical)
}

/// The `id` side channel, in row order. Every row must carry an id.
pub(crate) fn capture_client_ids(df: &DataFrame) -> Result<Vec<String>, FeatureError> {
    frame::texts(df, ID_COLUMN)?
        .into_iter()
        .enumerate()
        .map(|(row, id)| {
            id.ok_or_else(|| {
                FeatureError::schema(ID_COLUMN, format!("missing client id at row {row}"))
            })
        })
        .collect()
}

/// Rewrites a flag column to 0/1. Unknown values fail; missing stays missing.
pub(crate) fn map_flag(mut df: DataFrame, col_name: &str) -> Result<DataFrame, FeatureError> {
    let unrecognized = |row: usize, value: String| FeatureError::UnrecognizedFlag {
        column: col_name.to_string(),
        row,
        value,
    };

    let mapped: Vec<Option<i64>> = match frame::series(&df, col_name)?.dtype() {
        DataType::String => frame::texts(&df, col_name)?
            .into_iter()
            .enumerate()
            .map(|(row, v)| match v {
                None => Ok(None),
                Some(s) => Flag::parse(&s)
                    .map(|f| Some(f.as_int()))
                    .ok_or_else(|| unrecognized(row, s)),
            })
            .collect::<Result<_, _>>()?,
        DataType::Float32 | DataType::Float64 => {
            return Err(FeatureError::schema(
                col_name,
                "expected flag values, found float column",
            ))
        }
        _ => frame::integers(&df, col_name)?
            .into_iter()
            .enumerate()
            .map(|(row, v)| match v {
                Some(0) | Some(1) | None => Ok(v),
                Some(other) => Err(unrecognized(row, other.to_string())),
            })
            .collect::<Result<_, _>>()?,
    };

    df.with_column(Series::new(col_name.into(), mapped))
        .map_err(polars_error(col_name))?;
    Ok(df)
}

/// Every remaining text column except `id` becomes categorical.
pub(crate) fn categorize_text(mut df: DataFrame) -> Result<DataFrame, FeatureError> {
    let text_columns: Vec<String> = frame::column_names(&df)
        .into_iter()
        .filter(|name| name != ID_COLUMN)
        .filter(|name| {
            frame::series(&df, name).is_ok_and(|s| s.dtype() == &DataType::String)
        })
        .collect();

    for name in text_columns {
        let categorical = frame::series(&df, &name)?
            .cast(&categorical_dtype())
            .map_err(polars_error(&name))?;
        df.with_column(categorical).map_err(polars_error(&name))?;
    }
    Ok(df)
}

pub(crate) struct Prepared {
    pub frame: DataFrame,
    pub client_ids: Vec<String>,
}

pub(crate) fn preprocess(raw: &DataFrame) -> Result<Prepared, FeatureError> {
    let client_ids = capture_client_ids(raw)?;

    let mut df = normalize_dates(raw.clone())?;
    for col_name in FLAG_COLUMNS {
        if frame::contains(&df, col_name) {
            df = map_flag(df, col_name)?;
        }
    }
    let frame = categorize_text(df)?;

    Ok(Prepared { frame, client_ids })
}
