use std::collections::BTreeMap;

use log::{info, warn};

use crate::{
    config::RunConfig,
    policy::{FieldFilter, FieldRenamer},
    types::{FieldValue, PropertyTable, Record},
};

/// Per-field comparison of two tables' column totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verification {
    pub original: BTreeMap<String, f64>,
    pub round_tripped: BTreeMap<String, f64>,
    /// `original - round_tripped` for every field present in both.
    pub diffs: BTreeMap<String, f64>,
    /// Fields of the original missing from the round-tripped table.
    pub missing: Vec<String>,
    pub tolerance: f64,
}

impl Verification {
    /// Fields whose totals differ by at least the tolerance.
    pub fn exceeding(&self) -> Vec<(&str, f64)> {
        self.diffs.iter()
            .filter(|(_, diff)| diff.abs() >= self.tolerance)
            .map(|(name, diff)| (name.as_str(), *diff))
            .collect()
    }

    /// No field differs beyond the tolerance and none is missing.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.exceeding().is_empty()
    }
}

/// Compares column totals of an original table with a redistributed one.
pub struct Verifier<'a> {
    config: &'a RunConfig,
    filter: &'a dyn FieldFilter,
    renamer: Option<&'a FieldRenamer>,
}

impl<'a> Verifier<'a> {
    pub fn new(config: &'a RunConfig, filter: &'a dyn FieldFilter) -> Self {
        Self { config, filter, renamer: None }
    }

    /// Map flattened field names (`dataset.field`) through `renamer` before comparing.
    pub fn with_renamer(mut self, renamer: &'a FieldRenamer) -> Self {
        self.renamer = Some(renamer);
        self
    }

    /// Sum every eligible numeric field over all units of `table`.
    pub fn totals(&self, table: &PropertyTable) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();
        for (_, record) in table.iter() {
            self.add_record(record, "", &mut totals);
        }
        totals
    }

    fn add_record(&self, record: &Record, dataset: &str, totals: &mut BTreeMap<String, f64>) {
        for (name, value) in record {
            if !self.filter.accepts(name, value) { continue }
            match value {
                FieldValue::Group(group) => {
                    let path = if dataset.is_empty() { name.clone() } else { format!("{dataset}.{name}") };
                    self.add_record(group, &path, totals);
                }
                value => {
                    let Some(number) = value.number().filter(|n| !n.is_nan()) else { continue };
                    *totals.entry(self.field_name(dataset, name)).or_default() += number.to_f64();
                }
            }
        }
    }

    /// Name a leaf is compared under: the renamer's canonical name if it has one, else
    /// `dataset.field`.
    fn field_name(&self, dataset: &str, name: &str) -> String {
        if let Some(canonical) = self.renamer.and_then(|renamer| renamer.lookup(dataset, name)) {
            return canonical.to_string();
        }
        if dataset.is_empty() { name.to_string() } else { format!("{dataset}.{name}") }
    }

    /// Compare per-field totals. Differences never fail; those at or beyond the tolerance
    /// are logged as warnings.
    pub fn verify(&self, original: &PropertyTable, round_tripped: &PropertyTable) -> Verification {
        let original = self.totals(original);
        let round_tripped = self.totals(round_tripped);

        let mut diffs = BTreeMap::new();
        let mut missing = Vec::new();
        for (name, total) in &original {
            match round_tripped.get(name) {
                Some(other) => { diffs.insert(name.clone(), total - other); }
                None => missing.push(name.clone()),
            }
        }

        let verification = Verification { original, round_tripped, diffs, missing, tolerance: self.config.tolerance };
        for (name, diff) in verification.exceeding() {
            warn!(
                "[verify] {name}: original {} vs {} (difference {diff})",
                verification.original[name], verification.round_tripped[name],
            );
        }
        if !verification.missing.is_empty() {
            warn!("[verify] fields missing after redistribution: {:?}", verification.missing);
        }
        info!(
            "[verify] compared {} fields, {} beyond tolerance {}",
            verification.diffs.len(), verification.exceeding().len(), verification.tolerance,
        );

        verification
    }
}

#[cfg(test)]
mod tests {
    use super::Verifier;
    use crate::{
        config::RunConfig,
        policy::{DefaultFieldFilter, FieldRenamer},
        types::{FieldValue, PropertyTable, Record},
    };

    fn record(fields: &[(&str, FieldValue)]) -> Record {
        fields.iter().map(|(name, value)| (name.to_string(), value.clone())).collect()
    }

    #[test]
    fn reports_signed_differences_and_missing_fields() {
        let config = RunConfig::default();
        let filter = DefaultFieldFilter::default();
        let original: PropertyTable = [
            ("P1".into(), record(&[("TOT", FieldValue::Int(10)), ("VAP", FieldValue::Int(8)), ("NAME", FieldValue::Text("x".into()))])),
            ("P2".into(), record(&[("TOT", FieldValue::Int(7)), ("DEM", FieldValue::Int(2))])),
        ].into_iter().collect();
        let round_tripped: PropertyTable = [
            ("P1".into(), record(&[("TOT", FieldValue::Int(17)), ("VAP", FieldValue::Int(5))])),
        ].into_iter().collect();

        let verification = Verifier::new(&config, &filter).verify(&original, &round_tripped);
        assert_eq!(verification.diffs["TOT"], 0.0);
        assert_eq!(verification.diffs["VAP"], 3.0);
        assert_eq!(verification.missing, vec!["DEM".to_string()]);
        assert_eq!(verification.exceeding(), vec![("VAP", 3.0)]);
        assert!(!verification.original.contains_key("NAME"));
        assert!(!verification.is_clean());
    }

    #[test]
    fn tolerance_absorbs_rounding_noise() {
        let config = RunConfig { tolerance: 0.01, ..RunConfig::default() };
        let filter = |_: &str, value: &FieldValue| value.number().is_some() || value.is_group();
        let original: PropertyTable = [("P1".into(), record(&[("AREA", FieldValue::Float(1.0))]))].into_iter().collect();
        let split: PropertyTable = [
            ("A".into(), record(&[("AREA", FieldValue::Float(0.333))])),
            ("B".into(), record(&[("AREA", FieldValue::Float(0.667))])),
        ].into_iter().collect();

        let verification = Verifier::new(&config, &filter).verify(&original, &split);
        assert!(verification.diffs["AREA"].abs() < 0.01);
        assert!(verification.is_clean());
    }

    #[test]
    fn grouped_fields_compare_under_canonical_names() {
        let config = RunConfig::default();
        let filter = DefaultFieldFilter::default();
        let mut renamer = FieldRenamer::default();
        renamer.insert("D10F", "Tot", "TOT");

        let original: PropertyTable = [(
            "P1".into(),
            record(&[("D10F", FieldValue::Group(record(&[("Tot", FieldValue::Int(9)), ("Hsp", FieldValue::Int(2))])))]),
        )].into_iter().collect();
        let blocks: PropertyTable = [
            ("A".into(), record(&[("TOT", FieldValue::Int(4))])),
            ("B".into(), record(&[("TOT", FieldValue::Int(5))])),
        ].into_iter().collect();

        let verification = Verifier::new(&config, &filter).with_renamer(&renamer).verify(&original, &blocks);
        assert_eq!(verification.diffs["TOT"], 0.0);
        assert_eq!(verification.missing, vec!["D10F.Hsp".to_string()]);
    }
}
