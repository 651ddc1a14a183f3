use anyhow::Context;
use polars::prelude::*;
use powerco_core::domain::prediction::ScoredClient;
use std::fs::File;
use std::path::Path;

fn write_csv(path: &Path, df: &mut DataFrame) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    CsvWriter::new(file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_features(path: &Path, features: &DataFrame) -> anyhow::Result<()> {
    write_csv(path, &mut features.clone())?;

    tracing::info!(path = %path.display(), rows = features.height(), "wrote feature table");
    Ok(())
}

pub fn write_predictions(path: &Path, clients: &[ScoredClient]) -> anyhow::Result<()> {
    let mut df = df!(
        "client_id" => clients.iter().map(|c| c.client_id.as_str()).collect::<Vec<_>>(),
        "churn_probability" => clients.iter().map(|c| c.churn_probability).collect::<Vec<_>>(),
        "price_var" => clients.iter().map(|c| c.price_var).collect::<Vec<_>>(),
        "price_fix" => clients.iter().map(|c| c.price_fix).collect::<Vec<_>>(),
    )?;
    write_csv(path, &mut df)?;

    tracing::info!(path = %path.display(), clients = clients.len(), "wrote client predictions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictions_csv_leaves_missing_prices_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictions.csv");
        let clients = vec![
            ScoredClient {
                client_id: "b".into(),
                churn_probability: 0.75,
                price_var: Some(0.125),
                price_fix: None,
            },
            ScoredClient {
                client_id: "a".into(),
                churn_probability: 0.25,
                price_var: None,
                price_fix: Some(44.5),
            },
        ];

        write_predictions(&path, &clients).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "client_id,churn_probability,price_var,price_fix\nb,0.75,0.125,\na,0.25,,44.5\n"
        );
    }
}
