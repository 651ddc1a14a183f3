use crate::features::error::FeatureError;
use crate::frame::{self, polars_error};
use polars::prelude::*;

/// `total_cons = cons_12m + cons_gas_12m`. A missing operand yields a missing total.
pub(crate) fn add_total_consumption(df: DataFrame) -> Result<DataFrame, FeatureError> {
    frame::require_numeric(&df, "cons_12m")?;
    frame::require_numeric(&df, "cons_gas_12m")?;

    df.lazy()
        .with_column(
            (col("cons_12m").cast(DataType::Float64) + col("cons_gas_12m").cast(DataType::Float64))
                .alias("total_cons"),
        )
        .collect()
        .map_err(polars_error("total_cons"))
}
