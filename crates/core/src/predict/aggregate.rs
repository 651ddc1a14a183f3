use crate::domain::prediction::ClientPrediction;
use crate::features::error::FeatureError;
use crate::features::preprocess::ID_COLUMN;
use std::collections::BTreeMap;

/// Averages row-level probabilities per client id, highest id first.
///
/// Values are averaged as given (no clamping); NaN rows are skipped, and a client with only
/// NaN rows keeps NaN.
pub fn aggregate_predictions(
    client_ids: &[String],
    probabilities: &[f64],
) -> Result<Vec<ClientPrediction>, FeatureError> {
    if client_ids.len() != probabilities.len() {
        return Err(FeatureError::schema(
            ID_COLUMN,
            format!(
                "{} client ids for {} predicted probabilities",
                client_ids.len(),
                probabilities.len()
            ),
        ));
    }

    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (id, p) in client_ids.iter().zip(probabilities) {
        let entry = sums.entry(id.as_str()).or_insert((0.0, 0));
        if !p.is_nan() {
            entry.0 += p;
            entry.1 += 1;
        }
    }

    Ok(sums
        .into_iter()
        .rev()
        .map(|(id, (sum, n))| ClientPrediction {
            client_id: id.to_string(),
            churn_probability: if n == 0 { f64::NAN } else { sum / n as f64 },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn averages_per_client_in_descending_id_order() {
        let out = aggregate_predictions(&ids(&["A", "B", "A"]), &[0.2, 0.5, 0.8]).unwrap();
        assert_eq!(
            out,
            vec![
                ClientPrediction {
                    client_id: "B".into(),
                    churn_probability: 0.5,
                },
                ClientPrediction {
                    client_id: "A".into(),
                    churn_probability: 0.5,
                },
            ]
        );
    }

    #[test]
    fn out_of_range_values_are_not_clamped() {
        let out = aggregate_predictions(&ids(&["x", "x"]), &[1.5, 0.5]).unwrap();
        assert_eq!(out[0].churn_probability, 1.0);

        let out = aggregate_predictions(&ids(&["y"]), &[-0.25]).unwrap();
        assert_eq!(out[0].churn_probability, -0.25);
    }

    #[test]
    fn nan_rows_are_skipped() {
        let out =
            aggregate_predictions(&ids(&["a", "a", "b"]), &[f64::NAN, 0.4, f64::NAN]).unwrap();
        assert_eq!(out[0].client_id, "b");
        assert!(out[0].churn_probability.is_nan());
        assert_eq!(out[1].churn_probability, 0.4);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = aggregate_predictions(&ids(&["a", "b"]), &[0.1]).unwrap_err();
        assert!(matches!(err, FeatureError::SchemaMismatch { .. }));
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(aggregate_predictions(&[], &[]).unwrap().is_empty());
    }
}
