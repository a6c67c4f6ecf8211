//! Read-only post-run check of document counts and indexes.

use tracing::{info, warn};

use crate::catalog::{self, DatasetCatalog};
use crate::coerce::Coercer;
use crate::config::{Settings, StoreSettings};
use crate::data_processor::DataProcessor;
use crate::error::{Error, Result};
use crate::traits::{DocumentStore, StoreConnector};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetCheck {
    pub name: String,
    /// `None` when the source file could not be read.
    pub source_records: Option<usize>,
    pub documents: u64,
    pub indexes: Vec<String>,
    pub problems: Vec<String>,
}

impl DatasetCheck {
    pub fn is_consistent(&self) -> bool { self.problems.is_empty() }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub datasets: Vec<DatasetCheck>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool { self.datasets.iter().all(DatasetCheck::is_consistent) }
}

pub struct Verifier {
    catalog: DatasetCatalog,
    processor: DataProcessor,
}

impl Verifier {
    pub fn new(catalog: DatasetCatalog, processor: DataProcessor) -> Self {
        Self { catalog, processor }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let (catalog, _) = catalog::from_settings(settings);
        Self::new(catalog, DataProcessor::new(Coercer::new(settings.coercion.clone())))
    }

    pub async fn run<C: StoreConnector>(
        &self,
        connector: &C,
        settings: &StoreSettings,
    ) -> Result<VerifyReport> {
        let store = connector.connect(settings).await?;
        let result = self.check(&store).await;
        store.close().await;
        result
    }

    /// A store error on one collection becomes a problem of that dataset.
    /// Only run-fatal errors end the check early.
    pub async fn check<S: DocumentStore + ?Sized>(&self, store: &S) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        for spec in self.catalog.iter() {
            let mut check = DatasetCheck { name: spec.name.clone(), ..DatasetCheck::default() };
            match store.count_documents(&spec.name).await {
                Ok(n) => check.documents = n,
                Err(e) => record_store_error(&mut check, e)?,
            }
            match store.list_index_fields(&spec.name).await {
                Ok(fields) => check.indexes = fields,
                Err(e) => record_store_error(&mut check, e)?,
            }

            match self.processor.count_records(spec) {
                Ok(n) => {
                    check.source_records = Some(n);
                    if n as u64 != check.documents {
                        let problem =
                            format!("{} documents but source has {} records", check.documents, n);
                        check.problems.push(problem);
                    }
                }
                Err(e) => check.problems.push(e.to_string()),
            }
            for field in &spec.index_fields {
                if !check.indexes.contains(field) {
                    check.problems.push(format!("index on '{}' is missing", field));
                }
            }

            if check.is_consistent() {
                let documents = check.documents;
                info!(dataset = %spec.name, documents, "collection matches its source");
            } else {
                warn!(
                    dataset = %spec.name,
                    problems = ?check.problems,
                    "collection does not match its source"
                );
            }
            report.datasets.push(check);
        }
        Ok(report)
    }
}

fn record_store_error(check: &mut DatasetCheck, err: Error) -> Result<()> {
    if err.is_run_fatal() {
        return Err(err);
    }
    check.problems.push(err.to_string());
    Ok(())
}
