use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

use crate::{
    config::RunConfig,
    map::AssignmentMap,
    policy::{FieldFilter, FieldRenamer},
    types::{accumulate, FieldValue, PropertyTable, Record},
};

/// Counters and side totals for one aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationReport {
    pub fine_units: usize,
    pub coarse_units: usize,
    /// Fine units absent from the assignment.
    pub unassigned: usize,
    /// Fine units assigned to no coarse unit.
    pub unmatched: usize,
    /// Per-field sum over contributing fine units; group leaves as `dataset.field`.
    pub totals: BTreeMap<String, f64>,
    /// Per-field number of contributing fine units.
    pub counts: BTreeMap<String, usize>,
    pub failed_fields: BTreeSet<String>,
}

/// Result of [`Aggregator::aggregate`].
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub table: PropertyTable,
    pub report: AggregationReport,
}

/// Sums fine-unit attribute data into the coarse units they are assigned to.
pub struct Aggregator<'a> {
    config: &'a RunConfig,
    filter: &'a dyn FieldFilter,
    renamer: Option<&'a FieldRenamer>,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a RunConfig, filter: &'a dyn FieldFilter) -> Self {
        Self { config, filter, renamer: None }
    }

    /// Rewrite output field names through `renamer`.
    pub fn with_renamer(mut self, renamer: &'a FieldRenamer) -> Self {
        self.renamer = Some(renamer);
        self
    }

    /// Add every eligible numeric field of each fine unit into its coarse unit(s).
    /// Coarse rows appear in the order their first fine unit is met.
    pub fn aggregate(&self, fine: &PropertyTable, assignment: &AssignmentMap) -> Aggregation {
        let mut report = AggregationReport { fine_units: fine.len(), ..Default::default() };
        let mut table = PropertyTable::new();

        for (id, record) in fine.iter() {
            let parents = match assignment.get(id.as_str()) {
                None => {
                    report.unassigned += 1;
                    continue;
                }
                Some([]) => {
                    report.unmatched += 1;
                    continue;
                }
                Some(parents) => parents,
            };

            let contribution = self.numeric_fields(record, "", "", &mut BTreeSet::new(), &mut report);
            if self.config.traces(id.as_str()) {
                debug!("[aggregate] {id} -> {parents:?}: {contribution:?}");
            }

            for parent in parents {
                let target = table.entry(parent);
                contribution.iter().for_each(|(name, value)| accumulate(target, name.clone(), value.clone()));
            }
        }
        report.coarse_units = table.len();

        info!(
            "[aggregate] {} fine units into {} coarse units ({} unassigned, {} unmatched)",
            report.fine_units, report.coarse_units, report.unassigned, report.unmatched,
        );
        if !report.failed_fields.is_empty() {
            warn!("[aggregate] non-numeric values in fields: {:?}", report.failed_fields);
        }

        Aggregation { table, report }
    }

    /// Eligible fields of `record` as numbers (groups kept as groups), renamed, with each
    /// leaf added to the side totals under `path`. NaN becomes `Int(0)` and is not tallied.
    /// `counted` holds the leaves this fine unit has already been counted for.
    fn numeric_fields(&self, record: &Record, dataset: &str, path: &str, counted: &mut BTreeSet<String>, report: &mut AggregationReport) -> Record {
        let mut fields = Record::new();

        for (name, value) in record {
            if !self.filter.accepts_name(name) { continue }
            let output = match self.renamer {
                Some(renamer) => renamer.rename(dataset, name).to_string(),
                None => name.clone(),
            };
            let leaf = if path.is_empty() { output.clone() } else { format!("{path}.{output}") };

            let value = match value {
                FieldValue::Group(group) if self.filter.accepts(name, value) => {
                    FieldValue::Group(self.numeric_fields(group, name, &leaf, counted, report))
                }
                value => match value.number() {
                    Some(number) if number.is_nan() => FieldValue::Int(0),
                    Some(number) if self.filter.accepts(name, value) => {
                        *report.totals.entry(leaf.clone()).or_default() += number.to_f64();
                        if counted.insert(leaf.clone()) {
                            *report.counts.entry(leaf).or_default() += 1;
                        }
                        number.into()
                    }
                    _ => {
                        let raw = if dataset.is_empty() { name.clone() } else { format!("{dataset}.{name}") };
                        report.failed_fields.insert(raw);
                        continue;
                    }
                },
            };
            accumulate(&mut fields, output, value);
        }

        fields
    }
}
