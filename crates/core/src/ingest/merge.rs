use crate::features::dates::normalize_dates;
use crate::features::error::FeatureError;
use crate::features::preprocess::ID_COLUMN;
use crate::frame::{self, polars_error};
use polars::prelude::*;

/// Training label carried by historical client extracts. Never a model input.
pub const LABEL_COLUMN: &str = "churn";
const PRICE_DATE: &str = "price_date";

const CLIENT_ROW: &str = "__client_row";
const PRICE_ROW: &str = "__price_row";
const PRICE_TS: &str = "__price_ts";

/// Inner join on `id`: one row per (client row, matching price row), in client order then
/// price order. Client columns come first, then price columns without the key.
pub fn merge_client_prices(
    client: &DataFrame,
    price: &DataFrame,
) -> Result<DataFrame, FeatureError> {
    frame::texts(client, ID_COLUMN)?;
    frame::texts(price, ID_COLUMN)?;

    for name in frame::column_names(price) {
        if name != ID_COLUMN && frame::contains(client, &name) {
            return Err(FeatureError::schema(
                name,
                "column present in both client and price data",
            ));
        }
    }

    let mut merged = client
        .clone()
        .lazy()
        .with_row_index(CLIENT_ROW, None)
        .join(
            price.clone().lazy().with_row_index(PRICE_ROW, None),
            [col(ID_COLUMN)],
            [col(ID_COLUMN)],
            JoinArgs::new(JoinType::Inner),
        )
        .sort_by_exprs(
            [col(CLIENT_ROW), col(PRICE_ROW)],
            SortMultipleOptions::default(),
        )
        .collect()
        .map_err(polars_error(ID_COLUMN))?;
    merged.drop_in_place(CLIENT_ROW).map_err(polars_error(CLIENT_ROW))?;
    merged.drop_in_place(PRICE_ROW).map_err(polars_error(PRICE_ROW))?;

    if merged.height() == 0 {
        return Err(FeatureError::schema(
            ID_COLUMN,
            "no client id matched a price record",
        ));
    }

    tracing::debug!(
        client_rows = client.height(),
        price_rows = price.height(),
        merged_rows = merged.height(),
        "client and price records merged"
    );
    Ok(merged)
}

/// Removes the training label, if present.
pub fn drop_label(df: &mut DataFrame) -> bool {
    df.drop_in_place(LABEL_COLUMN).is_ok()
}

/// Orders rows by client id descending (byte order), then price date ascending. Rows without
/// a price date sort last within their client; ties keep input order.
pub fn sort_for_scoring(df: &DataFrame) -> Result<DataFrame, FeatureError> {
    frame::texts(df, ID_COLUMN)?;
    let dates = normalize_dates(df.select([PRICE_DATE]).map_err(polars_error(PRICE_DATE))?)?;
    let key = frame::series(&dates, PRICE_DATE)?
        .clone()
        .with_name(PRICE_TS.into());

    let mut keyed = df.clone();
    keyed.with_column(key).map_err(polars_error(PRICE_TS))?;

    let mut sorted = keyed
        .lazy()
        .sort_by_exprs(
            [col(ID_COLUMN), col(PRICE_TS)],
            SortMultipleOptions::default()
                .with_order_descending_multi([true, false])
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()
        .map_err(polars_error(ID_COLUMN))?;
    sorted.drop_in_place(PRICE_TS).map_err(polars_error(PRICE_TS))?;
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::csv::read_table;

    fn table(csv: &str) -> DataFrame {
        read_table(csv.as_bytes()).unwrap()
    }

    #[test]
    fn inner_join_keeps_client_order_and_price_order() {
        let client = table("id,cons_12m,churn\nb,10,0\nz,5,1\na,20,1\n");
        let price = table(
            "id,price_date,price_off_peak_var\n\
             a,2015-01-01,0.1\n\
             b,2015-01-01,0.2\n\
             a,2015-02-01,0.3\n",
        );

        let merged = merge_client_prices(&client, &price).unwrap();

        assert_eq!(
            frame::column_names(&merged),
            ["id", "cons_12m", "churn", "price_date", "price_off_peak_var"]
        );
        assert_eq!(merged.height(), 3);
        assert_eq!(
            frame::texts(&merged, ID_COLUMN).unwrap(),
            [Some("b".to_string()), Some("a".to_string()), Some("a".to_string())]
        );
        assert_eq!(
            frame::numeric(&merged, "price_off_peak_var").unwrap(),
            vec![Some(0.2), Some(0.1), Some(0.3)]
        );
    }

    #[test]
    fn merge_without_matches_is_a_schema_error() {
        let client = table("id,cons_12m\na,1\n");
        let price = table("id,price_date\nb,2015-01-01\n");
        assert!(matches!(
            merge_client_prices(&client, &price),
            Err(FeatureError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn overlapping_columns_are_rejected() {
        let client = table("id,pow_max\na,1\n");
        let price = table("id,pow_max\na,2\n");
        let err = merge_client_prices(&client, &price).unwrap_err();
        assert_eq!(err.column(), "pow_max");
    }

    #[test]
    fn drops_label_only_when_present() {
        let mut df = table("id,churn\na,1\n");
        assert!(drop_label(&mut df));
        assert!(!drop_label(&mut df));
        assert_eq!(frame::column_names(&df), ["id"]);
    }

    #[test]
    fn sorts_by_id_descending_then_date_ascending() {
        let df = table(
            "id,price_date\n\
             a,2015-02-01\n\
             b,2015-03-01\n\
             a,2015-01-01\n\
             b,\n\
             b,2015-01-01\n",
        );
        let sorted = sort_for_scoring(&df).unwrap();

        let ids = frame::texts(&sorted, ID_COLUMN).unwrap();
        let dates = frame::texts(&sorted, PRICE_DATE).unwrap();
        let rows: Vec<(String, String)> = ids
            .into_iter()
            .zip(dates)
            .map(|(id, date)| (id.unwrap_or_default(), date.unwrap_or_default()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("b".to_string(), "2015-01-01".to_string()),
                ("b".to_string(), "2015-03-01".to_string()),
                ("b".to_string(), String::new()),
                ("a".to_string(), "2015-01-01".to_string()),
                ("a".to_string(), "2015-02-01".to_string()),
            ]
        );
    }

    #[test]
    fn unparsable_price_date_is_reported() {
        let df = table("id,price_date\na,2015-01-01\na,2015-13-45\n");
        assert!(matches!(
            sort_for_scoring(&df),
            Err(FeatureError::MalformedDate { row: 1, .. })
        ));
    }
}
