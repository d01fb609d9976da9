// End-to-end tests: layers -> containment -> assignment -> disaggregate -> aggregate -> verify.

use std::fs;

use crosswalk::{
    compute_containment, derive_final_assignment, io, AssignmentMap, Aggregator, DefaultFieldFilter,
    Disaggregator, FieldValue, GeoUnit, KeySelector, Layer, PopulationWeightMap, PropertyTable, Record,
    RunConfig, UnitId, Verifier, Weight,
};
use geo::{polygon, MultiPolygon};
use serde_json::json;
use smallvec::smallvec;

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]])
}

fn record(fields: &[(&str, FieldValue)]) -> Record {
    fields.iter().map(|(name, value)| (name.to_string(), value.clone())).collect()
}

/// P1 = [0,2]x[0,2] and P2 = [2,5]x[0,2]; blocks A, B in P1, C, D, E in P2, X outside both.
fn layers() -> (Layer, Layer) {
    let precincts = Layer::new(vec![
        GeoUnit::new("P1", rect(0.0, 0.0, 2.0, 2.0)),
        GeoUnit::new("P2", rect(2.0, 0.0, 5.0, 2.0)),
    ], None).unwrap();
    let blocks = Layer::new(vec![
        GeoUnit::new("A", rect(0.0, 0.0, 1.0, 2.0)),
        // Shares the x = 2 edge with P2.
        GeoUnit::new("B", rect(1.0, 0.0, 2.0, 2.0)),
        GeoUnit::new("C", rect(2.2, 0.2, 2.8, 1.8)),
        GeoUnit::new("D", rect(3.2, 0.2, 3.8, 1.8)),
        GeoUnit::new("E", rect(4.2, 0.2, 4.8, 1.8)),
        GeoUnit::new("X", rect(10.0, 10.0, 11.0, 11.0)),
    ], None).unwrap();
    (precincts, blocks)
}

fn precinct_table() -> PropertyTable {
    [
        ("P1".into(), record(&[("TOT", FieldValue::Int(10)), ("NAME", FieldValue::Text("North".into()))])),
        ("P2".into(), record(&[("TOT", FieldValue::Int(7)), ("NAME", FieldValue::Text("South".into()))])),
    ].into_iter().collect()
}

fn block_weights() -> PopulationWeightMap {
    [("A", 3.0), ("B", 7.0), ("C", 1.0), ("D", 1.0), ("E", 1.0), ("X", 5.0)].into_iter()
        .map(|(id, w)| (UnitId::new(id), Weight::Scalar(w)))
        .collect()
}

#[test]
fn precinct_data_round_trips_through_blocks() {
    let config = RunConfig::default();
    let filter = DefaultFieldFilter::default();
    let (precincts, blocks) = layers();

    let containment = compute_containment(&precincts, &blocks, &config).unwrap();
    assert_eq!(containment.map.len(), blocks.len());
    assert_eq!(containment.stats.unmatched, 1);

    let assignment = derive_final_assignment(&containment.map, None);
    assert_eq!(assignment.map.get("B"), Some(&[UnitId::new("P1")][..]));
    assert_eq!(assignment.map.get("X"), Some(&[][..]));

    let disaggregated = Disaggregator::new(&config, &filter)
        .disaggregate(&precinct_table(), &assignment.map, &block_weights());
    let tot = |id: &str| disaggregated.table.get(id).unwrap()["TOT"].clone();
    assert_eq!([tot("A"), tot("B")], [FieldValue::Int(3), FieldValue::Int(7)]);
    assert_eq!([tot("C"), tot("D"), tot("E")], [FieldValue::Int(3), FieldValue::Int(2), FieldValue::Int(2)]);
    assert_eq!(disaggregated.report.unmatched, 1);
    assert_eq!(disaggregated.report.unmatched_with_population, 1);
    assert!(!disaggregated.table.contains("X"));

    let aggregated = Aggregator::new(&config, &filter).aggregate(&disaggregated.table, &assignment.map);
    assert_eq!(aggregated.table.get("P1").unwrap()["TOT"], FieldValue::Int(10));
    assert_eq!(aggregated.table.get("P2").unwrap()["TOT"], FieldValue::Int(7));

    let verifier = Verifier::new(&config, &filter);
    let round_trip = verifier.verify(&precinct_table(), &aggregated.table);
    assert_eq!(round_trip.diffs["TOT"], 0.0);
    assert!(round_trip.is_clean());

    let fine_check = verifier.verify(&precinct_table(), &disaggregated.table);
    assert_eq!(fine_check.diffs["TOT"], 0.0);
}

#[test]
fn hundred_split_thirty_seventy() {
    let config = RunConfig::default();
    let filter = DefaultFieldFilter::default();
    let coarse: PropertyTable = [("C1".into(), record(&[("VOTES", FieldValue::Int(100))]))].into_iter().collect();
    let assignment: AssignmentMap = [
        (UnitId::new("f1"), smallvec![UnitId::new("C1")]),
        (UnitId::new("f2"), smallvec![UnitId::new("C1")]),
    ].into_iter().collect();
    let weights: PopulationWeightMap = [
        (UnitId::new("f1"), Weight::Scalar(30.0)),
        (UnitId::new("f2"), Weight::Scalar(70.0)),
    ].into_iter().collect();

    let fine = Disaggregator::new(&config, &filter).disaggregate(&coarse, &assignment, &weights).table;
    assert_eq!(fine.get("f1").unwrap()["VOTES"], FieldValue::Int(30));
    assert_eq!(fine.get("f2").unwrap()["VOTES"], FieldValue::Int(70));

    let back = Aggregator::new(&config, &filter).aggregate(&fine, &assignment).table;
    let verification = Verifier::new(&config, &filter).verify(&coarse, &back);
    assert_eq!(verification.diffs["VOTES"], 0.0);
    assert!(verification.exceeding().is_empty());
}

#[test]
fn filter_is_idempotent_across_passes() {
    let config = RunConfig::default();
    let filter = DefaultFieldFilter::default();
    let (precincts, blocks) = layers();
    let assignment = derive_final_assignment(&compute_containment(&precincts, &blocks, &config).unwrap().map, None).map;

    let once = Disaggregator::new(&config, &filter).disaggregate(&precinct_table(), &assignment, &block_weights()).table;
    let twice = Aggregator::new(&config, &filter).aggregate(&once, &assignment).table;
    let thrice = Disaggregator::new(&config, &filter).disaggregate(&twice, &assignment, &block_weights()).table;

    for (id, record) in once.iter() {
        assert_eq!(thrice.get(id.as_str()), Some(record));
        assert!(!record.contains_key("NAME"));
    }
}

#[test]
fn files_on_disk_drive_the_same_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let precincts = dir.path().join("precincts.geojson");
    let blocks = dir.path().join("blocks.geojson");
    let weights = dir.path().join("blocks.csv");

    let feature = |id: &str, coords: serde_json::Value, props: serde_json::Value| json!({
        "type": "Feature",
        "geometry": { "type": "Polygon", "coordinates": [coords] },
        "properties": { "GEOID": id, "data": props },
    });
    fs::write(&precincts, json!({
        "type": "FeatureCollection",
        "features": [
            feature("P1", json!([[0, 0], [2, 0], [2, 2], [0, 2], [0, 0]]), json!(null)),
            feature("P2", json!([[2, 0], [4, 0], [4, 2], [2, 2], [2, 0]]), json!(null)),
        ]
    }).to_string()).unwrap();
    fs::write(&blocks, json!({
        "type": "FeatureCollection",
        "features": [
            feature("010010001001000", json!([[0.5, 0.5], [1.5, 0.5], [1.5, 1.5], [0.5, 1.5]]), json!(null)),
            // Three quarters inside P2.
            feature("010010001001001", json!([[1.5, 0.5], [3.5, 0.5], [3.5, 1.5], [1.5, 1.5]]), json!(null)),
        ]
    }).to_string()).unwrap();
    fs::write(&weights, "GEOID,TOT,TOT18\n010010001001000,4,3\n010010001001001,6,6\n").unwrap();

    let key = KeySelector::field("GEOID");
    let (coarse_layer, _) = io::read_layer(&precincts, &key).unwrap();
    let (fine_layer, _) = io::read_layer(&blocks, &key).unwrap();

    let config = RunConfig::default();
    let cache = dir.path().join("containment.json");
    let containment = io::cached_containment(&cache, &[precincts.as_path(), blocks.as_path()], || {
        Ok(compute_containment(&coarse_layer, &fine_layer, &config)?.map)
    }).unwrap();
    let straddler = containment.get("010010001001001").unwrap();
    assert_eq!(straddler.len(), 2);
    assert!((straddler[1].fraction - 0.75).abs() < 1e-9);

    let assignment_path = dir.path().join("assignment.json");
    io::write_assignment(&assignment_path, &derive_final_assignment(&containment, None).map).unwrap();
    let assignment = io::read_assignment(&assignment_path).unwrap();
    assert_eq!(assignment.get("010010001001001"), Some(&[UnitId::new("P2")][..]));

    let coarse_table: PropertyTable = [
        ("P1".into(), record(&[("G16PRERTRU", FieldValue::Int(5))])),
        ("P2".into(), record(&[("G16PRERTRU", FieldValue::Int(9))])),
    ].into_iter().collect();
    let filter = DefaultFieldFilter::default();
    let weights = io::read_weights(&weights, "GEOID", &config.weight_field).unwrap();
    let fine = Disaggregator::new(&config, &filter).disaggregate(&coarse_table, &assignment, &weights).table;

    let out = dir.path().join("blocks_out.geojson");
    io::write_table(&out, &fine, "GEOID").unwrap();
    let reread = io::read_table(&out, &key).unwrap();
    assert_eq!(reread.get("010010001001000").unwrap()["G16PRERTRU"], FieldValue::Int(5));
    assert_eq!(reread.get("010010001001001").unwrap()["G16PRERTRU"], FieldValue::Int(9));
}
