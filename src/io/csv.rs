use std::{collections::BTreeMap, fs::File, path::Path};

use anyhow::{anyhow, Context, Result};
use log::warn;
use polars::{frame::DataFrame, io::SerReader, prelude::{CsvReadOptions, DataType}};

use crate::types::{PopulationWeightMap, UnitId, Weight};

/// Read a CSV file with every column as text, so ids keep their leading zeros.
pub(crate) fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("[io::csv] Failed to open CSV file: {}", path.display()))?;
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(file)
        .finish()
        .with_context(|| format!("[io::csv] Failed to read CSV from {}", path.display()))
}

/// Read population weights from a CSV file: the `id_column` names each fine unit and every
/// other column becomes a named weight field. Cells that are not numbers are skipped.
/// A missing `weight_field` column is not an error but is logged, since every weight then
/// reads as zero.
pub fn read_weights_csv(path: &Path, id_column: &str, weight_field: &str) -> Result<PopulationWeightMap> {
    let df = read_csv(path)?;
    if !df.get_column_names().iter().any(|name| name.as_str() == weight_field) {
        warn!(
            "[io::csv] {} has no {weight_field:?} column; all weights will be zero (columns: {:?})",
            path.display(), df.get_column_names(),
        );
    }

    let ids = df.column(id_column)
        .with_context(|| format!("[io::csv] {} has no id column {id_column:?}", path.display()))?
        .str()?
        .into_iter()
        .collect::<Vec<_>>();

    let mut fields: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new(); df.height()];
    for column in df.get_columns() {
        if column.name().as_str() == id_column { continue }
        let values = column.cast(&DataType::Float64)?;
        for (row, value) in values.f64()?.into_iter().enumerate() {
            if let Some(value) = value.filter(|v| !v.is_nan()) {
                fields[row].insert(column.name().to_string(), value);
            }
        }
    }

    ids.into_iter().zip(fields)
        .enumerate()
        .map(|(row, (id, fields))| {
            let id = id.map(str::trim).filter(|id| !id.is_empty())
                .ok_or_else(|| anyhow!("[io::csv] row {row} of {} has no id", path.display()))?;
            Ok((UnitId::new(id), Weight::Fields(fields)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::read_weights_csv;

    #[test]
    fn reads_named_weight_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.csv");
        fs::write(&path, "GEOID,TOT,TOT18,NOTE\n010010201001000,12,9,x\n010010201001001,0,,y\n").unwrap();

        let weights = read_weights_csv(&path, "GEOID", "TOT18").unwrap();
        assert_eq!(weights.len(), 2);
        let first = weights.get("010010201001000").unwrap();
        assert_eq!(first.field("TOT"), 12.0);
        assert_eq!(first.field("TOT18"), 9.0);
        assert_eq!(first.field("NOTE"), 0.0);
        assert_eq!(weights.get("010010201001001").unwrap().field("TOT18"), 0.0);

        assert!(read_weights_csv(&path, "BLOCKID", "TOT18").is_err());
    }

    #[test]
    fn missing_weight_column_still_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.csv");
        fs::write(&path, "GEOID,TOT\n010010201001000,12\n").unwrap();

        let weights = read_weights_csv(&path, "GEOID", "TOT18").unwrap();
        assert_eq!(weights.len(), 1);
        assert!(!weights.has_field("TOT18"));
        assert!(weights.has_field("TOT"));
    }
}
