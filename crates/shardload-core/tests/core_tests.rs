use std::fs;
use tempfile::TempDir;

use shardload_core::catalog::{self, station_schema};
use shardload_core::coerce::{CoercionRule, Coercer, NumericKind};
use shardload_core::config::Settings;
use shardload_core::data_processor::DataProcessor;
use shardload_core::error::Error;
use shardload_core::types::{DatasetSpec, FieldValue};

fn spec_in(dir: &TempDir, file: &str) -> DatasetSpec {
    DatasetSpec {
        name: "globalClimate".to_string(),
        source_path: dir.path().join(file),
        index_fields: vec!["date".to_string(), "location".to_string(), "event_type".to_string()],
        shard_key_field: "station_id".to_string(),
    }
}

fn processor() -> DataProcessor {
    DataProcessor::new(Coercer::new(vec![
        CoercionRule::new("temperature_c", NumericKind::Float),
        CoercionRule::new("humidity_percent", NumericKind::Integer),
    ]))
}

#[test]
fn load_single_record_coerces_temperature() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("global_climate.json"),
        r#"[{"station_id":"A1","date":"2020-01-01","location":"X","temperature_c":"12.5"}]"#,
    )
    .unwrap();

    let spec = spec_in(&tmp, "global_climate.json");
    let loaded = processor().load(&spec, &station_schema()).expect("load");

    assert_eq!(loaded.records.len(), 1);
    assert_eq!(loaded.records[0].get("temperature_c"), Some(&FieldValue::Float(12.5)));
    assert_eq!(loaded.coercion.converted, 1);
}

#[test]
fn extra_fields_are_kept_unchanged() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("a.json"),
        r#"[{"station_id":"A1","date":"d","location":"X",
             "event_type":"Storm","severity":3,"verified":false}]"#,
    )
    .unwrap();

    let loaded = processor().load(&spec_in(&tmp, "a.json"), &station_schema()).expect("load");
    let record = &loaded.records[0];
    assert_eq!(record.get("event_type"), Some(&FieldValue::Text("Storm".into())));
    assert_eq!(record.get("severity"), Some(&FieldValue::Int(3)));
    assert_eq!(record.get("verified"), Some(&FieldValue::Bool(false)));
}

#[test]
fn missing_file_is_a_data_format_error() {
    let tmp = TempDir::new().unwrap();
    let err = processor().load(&spec_in(&tmp, "absent.json"), &station_schema()).unwrap_err();
    assert!(matches!(err, Error::DataFormat { ref dataset, .. } if dataset == "globalClimate"));
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn malformed_json_is_a_data_format_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("bad.json"), "[{\"station_id\": ").unwrap();
    let err = processor().load(&spec_in(&tmp, "bad.json"), &station_schema()).unwrap_err();
    assert!(matches!(err, Error::DataFormat { .. }));
}

#[test]
fn record_without_required_field_fails_the_dataset() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("a.json"),
        r#"[{"station_id":"A1","date":"d","location":"X"},{"station_id":"A2","date":"d"}]"#,
    )
    .unwrap();
    let err = processor().load(&spec_in(&tmp, "a.json"), &station_schema()).unwrap_err();
    assert!(err.to_string().contains("record 1: missing required field 'location'"));
}

#[test]
fn empty_array_loads_zero_records() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("empty.json"), "[]").unwrap();
    let loaded = processor().load(&spec_in(&tmp, "empty.json"), &station_schema()).expect("load");
    assert!(loaded.records.is_empty());
}

#[test]
fn check_sources_counts_missing_files() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("global_climate.json"), "[]").unwrap();
    let base_dir = tmp.path().to_string_lossy().to_string();
    let settings = Settings {
        data: shardload_core::config::DataSettings { base_dir },
        ..Settings::default()
    };
    let (catalog, _) = catalog::from_settings(&settings);
    assert_eq!(processor().check_sources(&catalog), 2, "two of three default sources are absent");
}
