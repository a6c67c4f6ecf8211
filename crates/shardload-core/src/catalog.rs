//! Schema registry and dataset catalog. Both are built once at startup and
//! only ever read afterwards.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{resolve_with_base, Settings};
use crate::error::{Error, Result};
use crate::types::{DatasetSpec, FieldType, ValidationSchema};

/// The station schema every weather export shares. Only identity fields are
/// constrained so that every supplied record can load.
pub fn station_schema() -> ValidationSchema {
    ValidationSchema::required([
        ("station_id", FieldType::String),
        ("date", FieldType::String),
        ("location", FieldType::String),
    ])
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, ValidationSchema>,
}

impl SchemaRegistry {
    pub fn new<I: IntoIterator<Item = (String, ValidationSchema)>>(schemas: I) -> Self {
        Self { schemas: schemas.into_iter().collect() }
    }

    pub fn schema_for(&self, name: &str) -> Result<&ValidationSchema> {
        self.schemas.get(name).ok_or_else(|| Error::UnknownDataset(name.to_string()))
    }
}

/// Ordered list of datasets; provisioning walks them in this order.
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    specs: Vec<DatasetSpec>,
}

impl DatasetCatalog {
    pub fn new(specs: Vec<DatasetSpec>) -> Self { Self { specs } }

    pub fn spec_for(&self, name: &str) -> Result<&DatasetSpec> {
        self.specs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::UnknownDataset(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetSpec> { self.specs.iter() }

    pub fn len(&self) -> usize { self.specs.len() }

    pub fn is_empty(&self) -> bool { self.specs.is_empty() }
}

/// Builds the catalog and a registry with one schema per dataset from settings.
pub fn from_settings(settings: &Settings) -> (DatasetCatalog, SchemaRegistry) {
    let base = Path::new(&settings.data.base_dir);
    let specs: Vec<DatasetSpec> = settings
        .datasets
        .iter()
        .map(|entry| DatasetSpec {
            name: entry.name.clone(),
            source_path: resolve_with_base(base, &entry.source),
            index_fields: entry.index_fields.clone(),
            shard_key_field: entry.shard_key.clone(),
        })
        .collect();
    let registry = SchemaRegistry::new(specs.iter().map(|s| (s.name.clone(), station_schema())));
    (DatasetCatalog::new(specs), registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_catalog_has_the_three_weather_datasets_in_order() {
        let (catalog, registry) = from_settings(&Settings::default());
        let names: Vec<&str> = catalog.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["globalClimate", "usWeatherEvents", "weatherHistory"]);
        let climate = catalog.spec_for("globalClimate").expect("spec");
        assert_eq!(climate.source_path, PathBuf::from("/app/Data/global_climate.json"));
        assert_eq!(climate.shard_key_field, "station_id");
        let history = registry.schema_for("weatherHistory").expect("schema");
        assert!(history.required_fields.contains("location"));
    }

    #[test]
    fn history_dataset_has_no_event_type_index() {
        let (catalog, _) = from_settings(&Settings::default());
        let history = catalog.spec_for("weatherHistory").expect("spec");
        assert!(!history.index_fields.iter().any(|f| f == "event_type"));
        let events = catalog.spec_for("usWeatherEvents").expect("spec");
        assert!(events.index_fields.iter().any(|f| f == "event_type"));
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        let (catalog, registry) = from_settings(&Settings::default());
        assert!(matches!(catalog.spec_for("nope"), Err(Error::UnknownDataset(n)) if n == "nope"));
        assert!(registry.schema_for("nope").is_err());
    }
}
