use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::catalog::DatasetCatalog;
use crate::coerce::{Coercer, CoercionStats};
use crate::error::{Error, Result};
use crate::types::{DatasetSpec, Record, ValidationSchema};

/// Records read from one source file, coerced and checked, ready for insert.
#[derive(Debug, Clone, Default)]
pub struct LoadedSource {
    pub records: Vec<Record>,
    pub coercion: CoercionStats,
}

#[derive(Debug, Clone, Default)]
pub struct DataProcessor {
    coercer: Coercer,
}

impl DataProcessor {
    pub fn new(coercer: Coercer) -> Self { Self { coercer } }

    /// Logs the presence of every source file and returns how many are missing.
    /// A missing file is only fatal for its own dataset, later.
    pub fn check_sources(&self, catalog: &DatasetCatalog) -> usize {
        let mut missing = 0;
        for spec in catalog.iter() {
            if spec.source_path.is_file() {
                info!(dataset = %spec.name, path = %spec.source_path.display(), "data file found");
            } else {
                let path = spec.source_path.display();
                warn!(dataset = %spec.name, path = %path, "data file NOT found");
                missing += 1;
            }
        }
        missing
    }

    /// Reads, coerces and validates a dataset's source file. Any problem is a
    /// data-format error for this dataset alone.
    pub fn load(&self, spec: &DatasetSpec, schema: &ValidationSchema) -> Result<LoadedSource> {
        let raw = read_records(&spec.name, &spec.source_path)?;
        let mut loaded = LoadedSource {
            records: Vec::with_capacity(raw.len()),
            coercion: CoercionStats::default(),
        };
        for (index, record) in raw.into_iter().enumerate() {
            let (record, stats) = self.coercer.apply(record);
            schema.check(&record).map_err(|reason| {
                Error::data_format(&spec.name, format!("record {}: {}", index, reason))
            })?;
            loaded.coercion += stats;
            loaded.records.push(record);
        }
        if loaded.coercion.unparseable > 0 {
            warn!(
                dataset = %spec.name,
                fields = loaded.coercion.unparseable,
                "unparseable numeric text stored as NaN"
            );
        }
        Ok(loaded)
    }

    /// Number of top-level records in the source, without coercion or checks.
    pub fn count_records(&self, spec: &DatasetSpec) -> Result<usize> {
        Ok(read_records(&spec.name, &spec.source_path)?.len())
    }
}

fn read_records(dataset: &str, path: &Path) -> Result<Vec<Record>> {
    let fail = |reason: String| Error::data_format(dataset, reason);
    if !path.is_file() {
        return Err(fail(format!("source file {} does not exist", path.display())));
    }
    let content = fs::read_to_string(path)
        .map_err(|e| fail(format!("cannot read {}: {}", path.display(), e)))?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| fail(format!("{} is not a JSON array: {}", path.display(), e)))?;
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let object = value
                .as_object()
                .ok_or_else(|| fail(format!("record {} is not an object", index)))?;
            Record::from_json_object(object)
                .map_err(|reason| fail(format!("record {}: {}", index, reason)))
        })
        .collect()
}
