use std::collections::BTreeSet;

use ahash::AHashMap;
use log::{debug, info, warn};

use crate::{
    apportion::{apportion_signed, split_proportional},
    config::RunConfig,
    map::AssignmentMap,
    policy::{FieldFilter, FieldRenamer},
    types::{accumulate, FieldValue, PopulationWeightMap, PropertyTable, Record, UnitId},
};

/// Counters and data-loss accounting for one disaggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisaggregationReport {
    pub coarse_units: usize,
    /// Fine units that received a record.
    pub fine_units: usize,
    /// Fine units skipped because they have no population weight.
    pub missing_weight: usize,
    /// Fine units assigned to no coarse unit.
    pub unmatched: usize,
    /// Unmatched fine units with non-zero population; their share of the data is lost.
    pub unmatched_with_population: usize,
    pub unmatched_population: f64,
    /// Assignments naming a coarse unit absent from the coarse table.
    pub unknown_parent: usize,
    /// Coarse units whose members all have zero weight; their values went to the first member.
    pub zero_weight_coarse_units: usize,
    /// Coarse units no fine unit is assigned to; their values are lost.
    pub coarse_without_members: usize,
    /// Fields that passed the name filter but held a non-numeric value somewhere.
    pub failed_fields: BTreeSet<String>,
    /// No weight carries the configured weight field, so every weight read as zero.
    pub weight_field_missing: bool,
}

/// Result of [`Disaggregator::disaggregate`].
#[derive(Debug, Clone)]
pub struct Disaggregation {
    pub table: PropertyTable,
    pub report: DisaggregationReport,
}

/// Splits coarse-unit attribute data onto fine units in proportion to population weight.
pub struct Disaggregator<'a> {
    config: &'a RunConfig,
    filter: &'a dyn FieldFilter,
    renamer: Option<&'a FieldRenamer>,
}

impl<'a> Disaggregator<'a> {
    pub fn new(config: &'a RunConfig, filter: &'a dyn FieldFilter) -> Self {
        Self { config, filter, renamer: None }
    }

    /// Rewrite output field names through `renamer`.
    pub fn with_renamer(mut self, renamer: &'a FieldRenamer) -> Self {
        self.renamer = Some(renamer);
        self
    }

    /// Apportion every eligible field of every coarse unit across the fine units assigned to
    /// it. Integer fields are split exactly (largest remainder), so per-field totals are kept
    /// for every coarse unit that has at least one member.
    pub fn disaggregate(&self, coarse: &PropertyTable, assignment: &AssignmentMap, weights: &PopulationWeightMap) -> Disaggregation {
        let mut report = DisaggregationReport {
            coarse_units: coarse.len(),
            weight_field_missing: !weights.is_empty() && !weights.has_field(&self.config.weight_field),
            ..Default::default()
        };
        let members = self.members(coarse, assignment, weights, &mut report);

        let mut table = PropertyTable::new();
        for (id, record) in coarse.iter() {
            let Some(members) = members.get(id) else {
                report.coarse_without_members += 1;
                debug!("[disaggregate] {id} has no fine units, its values are dropped");
                continue;
            };

            if members.iter().all(|(_, weight)| *weight <= 0.0) {
                report.zero_weight_coarse_units += 1;
                debug!("[disaggregate] {id} has zero total weight, everything goes to {}", members[0].0);
            }

            let split = self.split_record(record, "", members, &mut report);
            for ((fine, _), part) in members.iter().zip(split) {
                let target = table.entry(fine);
                part.into_iter().for_each(|(name, value)| accumulate(target, name, value));
            }

            if self.config.traces(id.as_str()) {
                debug!("[disaggregate] {id} -> {:?}", members.iter().map(|(fine, _)| fine.as_str()).collect::<Vec<_>>());
            }
        }
        report.fine_units = table.len();

        self.log_report(&report);
        Disaggregation { table, report }
    }

    /// Coarse id -> [(fine id, weight)], fine ids in assignment order. Fine units without a
    /// weight are left out and counted, as are unmatched units and unknown parents.
    fn members(&self, coarse: &PropertyTable, assignment: &AssignmentMap, weights: &PopulationWeightMap, report: &mut DisaggregationReport) -> AHashMap<UnitId, Vec<(UnitId, f64)>> {
        for (fine, parents) in assignment.iter() {
            let Some(weight) = weights.get(fine.as_str()) else {
                report.missing_weight += 1;
                if self.config.traces(fine.as_str()) {
                    debug!("[disaggregate] {fine} has no population weight");
                }
                continue;
            };

            if parents.is_empty() {
                report.unmatched += 1;
                let population = weight.field(&self.config.population_field);
                if population > 0.0 {
                    report.unmatched_with_population += 1;
                    report.unmatched_population += population;
                    debug!("[disaggregate] {fine} is unmatched but has population {population}");
                }
            }
        }

        let mut members = AHashMap::new();
        for (parent, fines) in assignment.invert() {
            let weighted = fines.into_iter()
                .filter_map(|fine| {
                    let share = weights.get(fine.as_str())?.field(&self.config.weight_field);
                    Some((fine, share))
                })
                .collect::<Vec<_>>();
            if weighted.is_empty() { continue }

            if !coarse.contains(parent.as_str()) {
                report.unknown_parent += weighted.len();
                continue;
            }
            members.insert(parent, weighted);
        }

        members
    }

    /// Split one record across `members`, returning one partial record per member.
    /// `dataset` is the enclosing group's name, or "" at the top level.
    fn split_record(&self, record: &Record, dataset: &str, members: &[(UnitId, f64)], report: &mut DisaggregationReport) -> Vec<Record> {
        let buckets = members.iter().enumerate().map(|(i, (_, weight))| (i, *weight)).collect::<Vec<_>>();
        let mut parts = vec![Record::new(); members.len()];

        for (name, value) in record {
            if !self.filter.accepts_name(name) { continue }
            let output = match self.renamer {
                Some(renamer) => renamer.rename(dataset, name).to_string(),
                None => name.clone(),
            };
            if !self.filter.accepts(name, value) {
                report.failed_fields.insert(qualified(dataset, name));
                continue;
            }

            match value {
                FieldValue::Group(group) => {
                    let split = self.split_record(group, name, members, report);
                    for (part, sub) in parts.iter_mut().zip(split) {
                        accumulate(part, output.clone(), FieldValue::Group(sub));
                    }
                }
                value => {
                    let Some(shares) = self.split_value(value, &buckets) else {
                        report.failed_fields.insert(qualified(dataset, name));
                        continue;
                    };
                    // Several raw fields may share one output name; their shares add up.
                    for (i, share) in shares {
                        accumulate(&mut parts[i], output.clone(), share);
                    }
                }
            }
        }

        parts
    }

    /// Shares of a scalar value, or `None` if it is not a usable number.
    fn split_value(&self, value: &FieldValue, buckets: &[(usize, f64)]) -> Option<Vec<(usize, FieldValue)>> {
        if let Some(integer) = value.as_integer() {
            return Some(apportion_signed(integer, buckets).into_iter()
                .map(|(i, share)| (i, FieldValue::Int(share)))
                .collect());
        }

        let number = value.number().filter(|n| !n.is_nan())?;
        Some(split_proportional(number.to_f64(), buckets, self.config.decimals).into_iter()
            .map(|(i, share)| (i, FieldValue::Float(share)))
            .collect())
    }

    fn log_report(&self, report: &DisaggregationReport) {
        if report.weight_field_missing {
            warn!(
                "[disaggregate] no population weight has a {:?} field; every coarse unit went to its first fine unit",
                self.config.weight_field,
            );
        }
        info!(
            "[disaggregate] {} coarse units onto {} fine units ({} without weight, {} unmatched)",
            report.coarse_units, report.fine_units, report.missing_weight, report.unmatched,
        );
        if report.unmatched_with_population > 0 {
            warn!(
                "[disaggregate] {} unmatched fine units carry population {}; their share is lost",
                report.unmatched_with_population, report.unmatched_population,
            );
        }
        if report.coarse_without_members > 0 {
            warn!("[disaggregate] {} coarse units have no fine units; their values are lost", report.coarse_without_members);
        }
        if report.unknown_parent > 0 {
            warn!("[disaggregate] {} assignments name coarse units missing from the table", report.unknown_parent);
        }
        if report.zero_weight_coarse_units > 0 {
            info!("[disaggregate] {} coarse units had zero total weight", report.zero_weight_coarse_units);
        }
        if !report.failed_fields.is_empty() {
            warn!("[disaggregate] non-numeric values in fields: {:?}", report.failed_fields);
        }
    }
}

/// Name of a field within its group, as reported.
fn qualified(dataset: &str, name: &str) -> String {
    if dataset.is_empty() { name.to_string() } else { format!("{dataset}.{name}") }
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use super::Disaggregator;
    use crate::{
        config::RunConfig,
        map::AssignmentMap,
        policy::{DefaultFieldFilter, FieldRenamer},
        types::{FieldValue, PopulationWeightMap, PropertyTable, Record, UnitId, Weight},
    };

    fn record(fields: &[(&str, FieldValue)]) -> Record {
        fields.iter().map(|(name, value)| (name.to_string(), value.clone())).collect()
    }

    fn assignment(pairs: &[(&str, &str)]) -> AssignmentMap {
        pairs.iter()
            .map(|&(fine, coarse)| {
                let parents = if coarse.is_empty() { smallvec![] } else { smallvec![UnitId::new(coarse)] };
                (UnitId::new(fine), parents)
            })
            .collect()
    }

    fn weights(pairs: &[(&str, f64)]) -> PopulationWeightMap {
        pairs.iter().map(|&(id, w)| (UnitId::new(id), Weight::Scalar(w))).collect()
    }

    fn precincts() -> PropertyTable {
        [
            ("P1".into(), record(&[("TOT", FieldValue::Int(10)), ("NAME", FieldValue::Text("North".into()))])),
            ("P2".into(), record(&[("TOT", FieldValue::Int(7))])),
        ].into_iter().collect()
    }

    #[test]
    fn splits_by_weight_with_largest_remainder() {
        let config = RunConfig::default();
        let filter = DefaultFieldFilter::default();
        let result = Disaggregator::new(&config, &filter).disaggregate(
            &precincts(),
            &assignment(&[("A", "P1"), ("B", "P1"), ("C", "P2"), ("D", "P2"), ("E", "P2")]),
            &weights(&[("A", 3.0), ("B", 7.0), ("C", 1.0), ("D", 1.0), ("E", 1.0)]),
        );

        let tot = |id: &str| result.table.get(id).unwrap()["TOT"].clone();
        assert_eq!(tot("A"), FieldValue::Int(3));
        assert_eq!(tot("B"), FieldValue::Int(7));
        // Equal remainders: the extra unit goes to the first fine unit seen.
        assert_eq!(tot("C"), FieldValue::Int(3));
        assert_eq!(tot("D"), FieldValue::Int(2));
        assert_eq!(tot("E"), FieldValue::Int(2));
        // Metadata is never apportioned.
        assert!(!result.table.get("A").unwrap().contains_key("NAME"));
        assert_eq!(result.report.fine_units, 5);
        assert!(result.report.failed_fields.is_empty());
    }

    #[test]
    fn zero_weight_sends_everything_to_first_member() {
        let config = RunConfig::default();
        let filter = DefaultFieldFilter::default();
        let result = Disaggregator::new(&config, &filter).disaggregate(
            &precincts(),
            &assignment(&[("A", "P1"), ("B", "P1"), ("C", "P2")]),
            &weights(&[("A", 0.0), ("B", 0.0), ("C", 4.0)]),
        );

        assert_eq!(result.table.get("A").unwrap()["TOT"], FieldValue::Int(10));
        assert_eq!(result.table.get("B").unwrap()["TOT"], FieldValue::Int(0));
        assert_eq!(result.report.zero_weight_coarse_units, 1);
    }

    #[test]
    fn accounts_for_unmatched_and_missing_units() {
        let config = RunConfig::default();
        let filter = DefaultFieldFilter::default();
        let weights: PopulationWeightMap = [
            ("A".into(), Weight::Fields([("TOT".to_string(), 5.0), ("TOT18".to_string(), 4.0)].into())),
            ("Z".into(), Weight::Fields([("TOT".to_string(), 12.0), ("TOT18".to_string(), 0.0)].into())),
            ("Y".into(), Weight::Fields([("TOT".to_string(), 0.0)].into())),
            ("Q".into(), Weight::Scalar(1.0)),
        ].into_iter().collect();
        let result = Disaggregator::new(&config, &filter).disaggregate(
            &precincts(),
            &assignment(&[("A", "P1"), ("Z", ""), ("Y", ""), ("X", "P1"), ("Q", "P9")]),
            &weights,
        );

        let report = &result.report;
        assert_eq!(report.missing_weight, 1);
        assert_eq!(report.unmatched, 2);
        assert_eq!(report.unmatched_with_population, 1);
        assert_eq!(report.unmatched_population, 12.0);
        assert_eq!(report.unknown_parent, 1);
        assert_eq!(report.coarse_without_members, 1);
        assert_eq!(result.table.get("A").unwrap()["TOT"], FieldValue::Int(10));
        // Unmatched and unweighted fine units receive no record at all.
        assert_eq!(result.table.ids(), &[UnitId::new("A")]);
    }

    #[test]
    fn groups_split_leaf_by_leaf_and_rename() {
        let config = RunConfig::default();
        let filter = DefaultFieldFilter::default();
        let mut renamer = FieldRenamer::default();
        renamer.insert("D10F", "Tot", "TOT");
        renamer.insert("", "G16PRERTRU", "PRES16R");

        let coarse: PropertyTable = [(
            "P1".into(),
            record(&[
                ("D10F", FieldValue::Group(record(&[("Tot", FieldValue::Int(9)), ("Wht", FieldValue::Text("n/a".into()))]))),
                ("G16PRERTRU", FieldValue::Text("-5".into())),
            ]),
        )].into_iter().collect();
        let result = Disaggregator::new(&config, &filter).with_renamer(&renamer).disaggregate(
            &coarse,
            &assignment(&[("A", "P1"), ("B", "P1")]),
            &weights(&[("A", 1.0), ("B", 2.0)]),
        );

        let a = result.table.get("A").unwrap();
        let b = result.table.get("B").unwrap();
        assert_eq!(a["D10F"], FieldValue::Group(record(&[("TOT", FieldValue::Int(3))])));
        assert_eq!(b["D10F"], FieldValue::Group(record(&[("TOT", FieldValue::Int(6))])));
        let a_pres = a["PRES16R"].as_integer().unwrap();
        let b_pres = b["PRES16R"].as_integer().unwrap();
        assert_eq!(a_pres + b_pres, -5);
        assert!(a_pres <= 0 && b_pres <= 0);
        assert!(result.report.failed_fields.contains("D10F.Wht"));
    }

    #[test]
    fn renamed_fields_sharing_a_name_add_up() {
        let config = RunConfig::default();
        let filter = DefaultFieldFilter::default();
        let mut renamer = FieldRenamer::default();
        renamer.insert("", "G16PRERTRU", "PRES16R");
        renamer.insert("", "G16PRERTrump", "PRES16R");

        let coarse: PropertyTable = [(
            "P1".into(),
            record(&[("G16PRERTRU", FieldValue::Int(5)), ("G16PRERTrump", FieldValue::Int(3))]),
        )].into_iter().collect();
        let result = Disaggregator::new(&config, &filter).with_renamer(&renamer).disaggregate(
            &coarse,
            &assignment(&[("A", "P1")]),
            &weights(&[("A", 1.0)]),
        );

        assert_eq!(result.table.get("A").unwrap(), &record(&[("PRES16R", FieldValue::Int(8))]));
    }

    #[test]
    fn absent_weight_field_is_reported() {
        let config = RunConfig::default();
        let filter = DefaultFieldFilter::default();
        let weights: PopulationWeightMap = [
            ("A".into(), Weight::Fields([("TOT".to_string(), 1.0)].into())),
            ("B".into(), Weight::Fields([("TOT".to_string(), 3.0)].into())),
        ].into_iter().collect();
        let result = Disaggregator::new(&config, &filter).disaggregate(
            &precincts(),
            &assignment(&[("A", "P1"), ("B", "P1")]),
            &weights,
        );

        assert!(result.report.weight_field_missing);
        assert_eq!(result.table.get("A").unwrap()["TOT"], FieldValue::Int(10));

        let config = RunConfig { weight_field: "TOT".into(), ..RunConfig::default() };
        let result = Disaggregator::new(&config, &filter).disaggregate(
            &precincts(),
            &assignment(&[("A", "P1"), ("B", "P1")]),
            &weights,
        );
        assert!(!result.report.weight_field_missing);
        assert_eq!(result.table.get("A").unwrap()["TOT"], FieldValue::Int(3));
        assert_eq!(result.table.get("B").unwrap()["TOT"], FieldValue::Int(7));
    }

    #[test]
    fn decimals_split_when_filter_allows() {
        let config = RunConfig::default();
        let filter = |name: &str, _: &FieldValue| name != "NAME";
        let coarse: PropertyTable = [("P1".into(), record(&[("AREA", FieldValue::Float(10.5))]))]
            .into_iter().collect();
        let result = Disaggregator::new(&config, &filter).disaggregate(
            &coarse,
            &assignment(&[("A", "P1"), ("B", "P1")]),
            &weights(&[("A", 1.0), ("B", 3.0)]),
        );

        assert_eq!(result.table.get("A").unwrap()["AREA"], FieldValue::Float(2.625));
        assert_eq!(result.table.get("B").unwrap()["AREA"], FieldValue::Float(7.875));
    }

    #[test]
    fn multi_parent_units_receive_from_each() {
        let config = RunConfig::default();
        let filter = DefaultFieldFilter::default();
        let assignment: AssignmentMap = [
            (UnitId::new("A"), smallvec![UnitId::new("P1"), UnitId::new("P2")]),
        ].into_iter().collect();
        let result = Disaggregator::new(&config, &filter).disaggregate(&precincts(), &assignment, &weights(&[("A", 1.0)]));

        assert_eq!(result.table.get("A").unwrap()["TOT"], FieldValue::Int(17));
    }
}
