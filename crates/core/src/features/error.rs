use std::fmt;

/// Fatal feature derivation failure. Every variant aborts the run.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureError {
    MalformedDate {
        column: String,
        row: usize,
        value: String,
    },
    InsufficientCardinality {
        column: String,
        q: usize,
        distinct_edges: usize,
    },
    SchemaMismatch {
        column: String,
        detail: String,
    },
    UnrecognizedFlag {
        column: String,
        row: usize,
        value: String,
    },
}

impl FeatureError {
    pub(crate) fn schema(column: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            column: column.into(),
            detail: detail.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::MalformedDate { column, .. }
            | Self::InsufficientCardinality { column, .. }
            | Self::SchemaMismatch { column, .. }
            | Self::UnrecognizedFlag { column, .. } => column,
        }
    }
}

impl fmt::Display for FeatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedDate { column, row, value } => write!(
                f,
                "malformed date in column {column} at row {row}: {value:?}"
            ),
            Self::InsufficientCardinality {
                column,
                q,
                distinct_edges,
            } => write!(
                f,
                "cannot cut column {column} into {q} quantile bins: only {distinct_edges} distinct edges (need {})",
                q + 1
            ),
            Self::SchemaMismatch { column, detail } => {
                write!(f, "schema mismatch on column {column}: {detail}")
            }
            Self::UnrecognizedFlag { column, row, value } => write!(
                f,
                "unrecognized flag value in column {column} at row {row}: {value:?}"
            ),
        }
    }
}

impl std::error::Error for FeatureError {}
