use crate::features::error::FeatureError;
use crate::features::preprocess::ID_COLUMN;
use crate::frame::{self, polars_error};
use polars::prelude::*;

pub const ENERGY_DIFF: &str = "offpeak_diff_dec_january_energy";
pub const POWER_DIFF: &str = "offpeak_diff_dec_january_power";

const PRICE_DATE: &str = "price_date";
const OFF_PEAK_VAR: &str = "price_off_peak_var";
const OFF_PEAK_FIX: &str = "price_off_peak_fix";

const ROW: &str = "__row";
const VAR_MEAN: &str = "__var_mean";
const FIX_MEAN: &str = "__fix_mean";
const DATE_GROUPS: &str = "__date_groups";

/// Period suffix pairs `(later, earlier, i, j)` for the differential columns.
/// Subtraction is always `later - earlier`.
const PERIOD_DIFFS: [(&str, &str, u8, u8); 3] = [
    ("peak", "off_peak", 1, 2),
    ("mid_peak", "off_peak", 1, 3),
    ("mid_peak", "peak", 2, 3),
];

fn float(name: &str) -> Expr {
    col(name).cast(DataType::Float64)
}

/// Adds `price_var`, `price_fix` and the six `price_p{i}_p{j}_{var|fix}_diff` columns.
pub(crate) fn add_price_features(df: DataFrame) -> Result<DataFrame, FeatureError> {
    let mut derived = Vec::with_capacity(8);

    for kind in ["var", "fix"] {
        let off_peak = format!("price_off_peak_{kind}");
        let peak = format!("price_peak_{kind}");
        let mid_peak = format!("price_mid_peak_{kind}");
        for name in [&off_peak, &peak, &mid_peak] {
            frame::require_numeric(&df, name)?;
        }

        derived.push(
            ((float(&off_peak) + float(&peak) + float(&mid_peak)) / lit(3.0))
                .alias(format!("price_{kind}")),
        );
    }

    for kind in ["var", "fix"] {
        for (later, earlier, i, j) in PERIOD_DIFFS {
            let minuend = format!("price_{later}_{kind}");
            let subtrahend = format!("price_{earlier}_{kind}");
            derived.push(
                (float(&minuend) - float(&subtrahend))
                    .alias(format!("price_p{i}_p{j}_{kind}_diff")),
            );
        }
    }

    df.lazy()
        .with_columns(derived)
        .collect()
        .map_err(polars_error("price_var"))
}

/// Per client: off-peak prices averaged per price date, then latest minus earliest date
/// group, broadcast to every row of the client. Drops `id` afterwards.
pub(crate) fn add_seasonal_offpeak_diff(df: DataFrame) -> Result<DataFrame, FeatureError> {
    frame::texts(&df, ID_COLUMN)?;
    frame::require_datetime(&df, PRICE_DATE)?;
    frame::require_numeric(&df, OFF_PEAK_VAR)?;
    frame::require_numeric(&df, OFF_PEAK_FIX)?;

    let rows = df.height();
    let diffs = df
        .clone()
        .lazy()
        .filter(col(PRICE_DATE).is_not_null())
        .group_by([col(ID_COLUMN), col(PRICE_DATE)])
        .agg([
            float(OFF_PEAK_VAR).mean().alias(VAR_MEAN),
            float(OFF_PEAK_FIX).mean().alias(FIX_MEAN),
        ])
        .sort_by_exprs(
            [col(ID_COLUMN), col(PRICE_DATE)],
            SortMultipleOptions::default(),
        )
        .group_by_stable([col(ID_COLUMN)])
        .agg([
            (col(VAR_MEAN).last() - col(VAR_MEAN).first()).alias(ENERGY_DIFF),
            (col(FIX_MEAN).last() - col(FIX_MEAN).first()).alias(POWER_DIFF),
            col(PRICE_DATE).len().alias(DATE_GROUPS),
        ]);

    let mut joined = df
        .lazy()
        .with_row_index(ROW, None)
        .join(
            diffs,
            [col(ID_COLUMN)],
            [col(ID_COLUMN)],
            JoinArgs::new(JoinType::Left),
        )
        .sort_by_exprs([col(ROW)], SortMultipleOptions::default())
        .collect()
        .map_err(polars_error(ID_COLUMN))?;

    let unmatched = frame::series(&joined, DATE_GROUPS)?.null_count();
    if unmatched > 0 || joined.height() != rows {
        return Err(FeatureError::schema(
            ID_COLUMN,
            format!(
                "seasonal price join would change cardinality: \
                 {unmatched} of {rows} rows have no dated price group"
            ),
        ));
    }

    for helper in [ROW, DATE_GROUPS, ID_COLUMN] {
        joined.drop_in_place(helper).map_err(polars_error(helper))?;
    }

    tracing::debug!(rows, "seasonal off-peak differentials joined");
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dates::normalize_dates;

    fn price_frame(off: f64, peak: f64, mid: f64) -> DataFrame {
        df!(
            "price_off_peak_var" => [off],
            "price_peak_var" => [peak],
            "price_mid_peak_var" => [mid],
            "price_off_peak_fix" => [off],
            "price_peak_fix" => [peak],
            "price_mid_peak_fix" => [mid],
        )
        .unwrap()
    }

    fn value(df: &DataFrame, name: &str) -> Option<f64> {
        frame::numeric(df, name).unwrap()[0]
    }

    #[test]
    fn differentials_subtract_earlier_period() {
        let df = add_price_features(price_frame(2.0, 5.0, 9.0)).unwrap();

        assert_eq!(value(&df, "price_p1_p2_var_diff"), Some(3.0));
        assert_eq!(value(&df, "price_p1_p3_var_diff"), Some(7.0));
        assert_eq!(value(&df, "price_p2_p3_var_diff"), Some(4.0));
        assert_eq!(value(&df, "price_p1_p2_fix_diff"), Some(3.0));
        assert_eq!(value(&df, "price_p1_p3_fix_diff"), Some(7.0));
        assert_eq!(value(&df, "price_p2_p3_fix_diff"), Some(4.0));
        assert_eq!(value(&df, "price_var"), Some(16.0 / 3.0));
        assert_eq!(value(&df, "price_fix"), Some(16.0 / 3.0));
    }

    #[test]
    fn derived_columns_follow_fixed_order() {
        let df = add_price_features(price_frame(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(
            &frame::column_names(&df)[6..],
            [
                "price_var",
                "price_fix",
                "price_p1_p2_var_diff",
                "price_p1_p3_var_diff",
                "price_p2_p3_var_diff",
                "price_p1_p2_fix_diff",
                "price_p1_p3_fix_diff",
                "price_p2_p3_fix_diff",
            ]
        );
    }

    #[test]
    fn missing_price_column_is_named() {
        let df = price_frame(1.0, 1.0, 1.0).drop("price_mid_peak_fix").unwrap();
        assert_eq!(
            add_price_features(df).unwrap_err().column(),
            "price_mid_peak_fix"
        );
    }

    fn seasonal_frame(
        ids: &[&str],
        dates: &[Option<&str>],
        var: &[Option<f64>],
        fix: &[f64],
    ) -> DataFrame {
        let df = df!(
            "id" => ids,
            "price_date" => dates,
            "price_off_peak_var" => var,
            "price_off_peak_fix" => fix,
        )
        .unwrap();
        normalize_dates(df).unwrap()
    }

    #[test]
    fn broadcasts_latest_minus_earliest_per_client() {
        let df = seasonal_frame(
            &["a", "b", "a", "a", "a"],
            &[
                Some("2015-12-01"),
                Some("2015-01-01"),
                Some("2015-01-01"),
                Some("2015-06-01"),
                Some("2015-12-01"),
            ],
            &[Some(0.20), Some(0.50), Some(0.10), Some(0.15), Some(0.30)],
            &[40.0, 10.0, 44.0, 44.0, 42.0],
        );

        let df = add_seasonal_offpeak_diff(df).unwrap();

        assert_eq!(df.height(), 5);
        assert!(!frame::contains(&df, "id"));
        assert_eq!(
            &frame::column_names(&df)[3..],
            [ENERGY_DIFF, POWER_DIFF]
        );
        let energy = frame::numeric(&df, ENERGY_DIFF).unwrap();
        let power = frame::numeric(&df, POWER_DIFF).unwrap();
        // Client a: December group averages 0.25 / 41.0, January 0.10 / 44.0.
        for row in [0, 2, 3, 4] {
            assert!((energy[row].unwrap() - 0.15).abs() < 1e-12);
            assert_eq!(power[row], Some(-3.0));
        }
        assert_eq!(energy[1], Some(0.0));
        assert_eq!(power[1], Some(0.0));
    }

    #[test]
    fn single_price_date_yields_zero() {
        let df = seasonal_frame(
            &["solo", "solo"],
            &[Some("2015-03-01"), Some("2015-03-01")],
            &[Some(0.1), Some(0.3)],
            &[40.0, 42.0],
        );
        let df = add_seasonal_offpeak_diff(df).unwrap();
        assert_eq!(
            frame::numeric(&df, ENERGY_DIFF).unwrap(),
            vec![Some(0.0), Some(0.0)]
        );
        assert_eq!(
            frame::numeric(&df, POWER_DIFF).unwrap(),
            vec![Some(0.0), Some(0.0)]
        );
    }

    #[test]
    fn missing_earliest_group_mean_makes_diff_missing() {
        let df = seasonal_frame(
            &["a", "a", "a"],
            &[Some("2015-01-01"), Some("2015-06-01"), Some("2015-12-01")],
            &[None, Some(0.1), Some(0.3)],
            &[1.0, 2.0, 3.0],
        );
        let df = add_seasonal_offpeak_diff(df).unwrap();
        assert_eq!(
            frame::numeric(&df, ENERGY_DIFF).unwrap(),
            vec![None, None, None]
        );
        assert_eq!(
            frame::numeric(&df, POWER_DIFF).unwrap(),
            vec![Some(2.0), Some(2.0), Some(2.0)]
        );
    }

    #[test]
    fn client_without_dated_rows_breaks_cardinality() {
        let df = seasonal_frame(
            &["a", "b"],
            &[Some("2015-01-01"), None],
            &[Some(0.1), Some(0.2)],
            &[1.0, 2.0],
        );

        let err = add_seasonal_offpeak_diff(df).unwrap_err();
        assert!(matches!(err, FeatureError::SchemaMismatch { .. }));
        assert_eq!(err.column(), "id");
    }
}
