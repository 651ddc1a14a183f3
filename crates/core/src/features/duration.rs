use crate::features::error::FeatureError;
use crate::frame::{self, polars_error};
use chrono::NaiveDateTime;
use polars::prelude::*;

const SECONDS_PER_DAY: i64 = 86_400;

/// `(output, end, start)`: each output is `end - start` in whole days.
const DURATIONS: [(&str, &str, &str); 3] = [
    ("contract_duration", "date_end", "date_activ"),
    ("next_renewal", "date_renewal", "date_activ"),
    ("days_since_modif_prod", "date_modif_prod", "date_activ"),
];

/// Whole days between two instants, floored. Negative spans are kept as-is.
fn elapsed_days(end: NaiveDateTime, start: NaiveDateTime) -> i64 {
    (end - start).num_seconds().div_euclid(SECONDS_PER_DAY)
}

pub(crate) fn add_durations(mut df: DataFrame) -> Result<DataFrame, FeatureError> {
    for (output, end, start) in DURATIONS {
        let ends = frame::datetimes(&df, end)?;
        let starts = frame::datetimes(&df, start)?;
        let days: Vec<Option<i64>> = ends
            .into_iter()
            .zip(starts)
            .map(|(e, s)| Some(elapsed_days(e?, s?)))
            .collect();

        df.with_column(Series::new(output.into(), days))
            .map_err(polars_error(output))?;
    }
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dates::normalize_dates;

    fn frame_of(activ: &[Option<&str>], end: &[Option<&str>]) -> DataFrame {
        let df = df!(
            "date_activ" => activ,
            "date_end" => end,
            "date_renewal" => end,
            "date_modif_prod" => activ,
        )
        .unwrap();
        normalize_dates(df).unwrap()
    }

    #[test]
    fn counts_calendar_days_across_leap_years() {
        let df = frame_of(
            &[Some("2015-03-01"), Some("2015-03-01")],
            &[Some("2016-03-01"), Some("2016-02-28")],
        );
        let df = add_durations(df).unwrap();

        // 2016 is a leap year: 2015-03-01 .. 2016-03-01 spans Feb 29.
        assert_eq!(
            frame::integers(&df, "contract_duration").unwrap(),
            vec![Some(366), Some(364)]
        );
        assert_eq!(
            frame::integers(&df, "days_since_modif_prod").unwrap(),
            vec![Some(0), Some(0)]
        );
    }

    #[test]
    fn keeps_negative_spans_and_missing_operands() {
        let df = frame_of(
            &[Some("2016-01-10"), None],
            &[Some("2016-01-01"), Some("2016-01-01")],
        );
        let df = add_durations(df).unwrap();
        assert_eq!(
            frame::integers(&df, "next_renewal").unwrap(),
            vec![Some(-9), None]
        );
    }

    #[test]
    fn missing_input_column_is_a_schema_error() {
        let df = df!("date_activ" => ["2016-01-01"]).unwrap();
        let df = normalize_dates(df).unwrap();
        assert_eq!(add_durations(df).unwrap_err().column(), "date_end");
    }

    #[test]
    fn floors_partial_days() {
        let fmt = "%Y-%m-%d %H:%M:%S";
        let start = NaiveDateTime::parse_from_str("2016-01-02 12:00:00", fmt).unwrap();
        let end = NaiveDateTime::parse_from_str("2016-01-01 00:00:00", fmt).unwrap();
        assert_eq!(elapsed_days(end, start), -2);
        assert_eq!(elapsed_days(start, end), 1);
    }
}
