//! Provisioning orchestrator.
//!
//! Walks the catalog in order and brings every collection to its provisioned
//! state: validator attached, sharded, contents replaced, indexes built. Every
//! step tolerates a cluster that is already partly or fully provisioned, so a
//! run can simply be repeated.

use tracing::{error, info, info_span, warn, Instrument};

use crate::catalog::{self, DatasetCatalog, SchemaRegistry};
use crate::coerce::Coercer;
use crate::config::{Settings, StoreSettings};
use crate::data_processor::DataProcessor;
use crate::error::Result;
use crate::traits::{DocumentStore, StoreConnector};
use crate::types::{
    DatasetSpec, EnforcementLevel, KeyingStrategy, StepOutcome, ValidationSchema,
};

/// What one dataset went through during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetReport {
    pub name: String,
    pub deleted: u64,
    pub inserted: u64,
    /// Fields left as `NaN` because their text had no numeric prefix.
    pub unparseable: usize,
    pub indexes: Vec<String>,
    pub notes: Vec<String>,
    pub error: Option<String>,
}

impl DatasetReport {
    fn new(name: &str) -> Self { Self { name: name.to_string(), ..Self::default() } }

    fn note(&mut self, outcome: &StepOutcome) {
        if outcome.is_noop() {
            info!("Note: {}", outcome.note());
        } else {
            info!("{}", outcome.note());
        }
        self.notes.push(outcome.note().to_string());
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub datasets: Vec<DatasetReport>,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &DatasetReport> {
        self.datasets.iter().filter(|d| d.error.is_some())
    }

    pub fn is_success(&self) -> bool { self.failed().next().is_none() }

    pub fn dataset(&self, name: &str) -> Option<&DatasetReport> {
        self.datasets.iter().find(|d| d.name == name)
    }
}

pub struct Provisioner {
    catalog: DatasetCatalog,
    registry: SchemaRegistry,
    processor: DataProcessor,
    database: String,
    level: EnforcementLevel,
}

impl Provisioner {
    pub fn new(
        catalog: DatasetCatalog,
        registry: SchemaRegistry,
        processor: DataProcessor,
        database: &str,
    ) -> Self {
        Self {
            catalog,
            registry,
            processor,
            database: database.to_string(),
            level: EnforcementLevel::Strict,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let (catalog, registry) = catalog::from_settings(settings);
        let processor = DataProcessor::new(Coercer::new(settings.coercion.clone()));
        Self::new(catalog, registry, processor, &settings.store.database)
    }

    pub fn catalog(&self) -> &DatasetCatalog { &self.catalog }

    pub fn processor(&self) -> &DataProcessor { &self.processor }

    pub async fn run<C: StoreConnector>(
        &self,
        connector: &C,
        settings: &StoreSettings,
    ) -> Result<RunReport> {
        self.run_with(connector, settings, |_| {}).await
    }

    /// Single entry point for one run. The connection is acquired here and
    /// closed before returning, whether the run succeeded or not.
    /// `on_dataset` fires after each dataset finishes.
    pub async fn run_with<C, F>(
        &self,
        connector: &C,
        settings: &StoreSettings,
        on_dataset: F,
    ) -> Result<RunReport>
    where
        C: StoreConnector,
        F: FnMut(&DatasetReport) + Send,
    {
        info!(database = %self.database, "connecting to document store");
        let store = connector.connect(settings).await.map_err(|e| {
            error!(error = %e, "could not connect to document store");
            e
        })?;
        info!("connected to document store");
        let result = self.provision_all(&store, on_dataset).await;
        store.close().await;
        info!("document store connection closed");
        result
    }

    /// Provisions every cataloged dataset in order. A dataset's failure is
    /// recorded in its report and the next dataset still runs; only errors
    /// that make the store unusable abort the loop.
    pub async fn provision_all<S, F>(&self, store: &S, mut on_dataset: F) -> Result<RunReport>
    where
        S: DocumentStore + ?Sized,
        F: FnMut(&DatasetReport) + Send,
    {
        self.processor.check_sources(&self.catalog);
        match store.enable_partitioning(&self.database).await {
            Ok(StepOutcome::Applied(note)) => info!("{}", note),
            Ok(StepOutcome::AlreadySatisfied(note)) => info!("Note: {}", note),
            Err(e) if e.is_run_fatal() => return Err(e),
            Err(e) => warn!(database = %self.database, "Note: {}", e),
        }

        let mut report = RunReport::default();
        for spec in self.catalog.iter() {
            let mut dataset = DatasetReport::new(&spec.name);
            let span = info_span!("dataset", name = %spec.name);
            let outcome = self.provision_dataset(store, spec, &mut dataset).instrument(span).await;
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_run_fatal() => {
                    error!(dataset = %spec.name, error = %e, "aborting run");
                    return Err(e);
                }
                Err(e) => {
                    error!(dataset = %spec.name, error = %e, "dataset provisioning failed");
                    dataset.error = Some(e.to_string());
                }
            }
            on_dataset(&dataset);
            report.datasets.push(dataset);
        }
        if report.is_success() {
            info!("data loading completed successfully");
        }
        Ok(report)
    }

    async fn provision_dataset<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        spec: &DatasetSpec,
        report: &mut DatasetReport,
    ) -> Result<()> {
        let schema = self.registry.schema_for(&spec.name)?;
        self.ensure_collection(store, spec, schema, report).await?;
        self.ensure_partitioning(store, spec, report).await?;
        self.load(store, spec, schema, report).await?;
        self.build_indexes(store, spec, report).await
    }

    async fn ensure_collection<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        spec: &DatasetSpec,
        schema: &ValidationSchema,
        report: &mut DatasetReport,
    ) -> Result<()> {
        let outcome = store.create_collection(&spec.name, schema, self.level).await?;
        report.note(&outcome);
        if outcome.is_noop() {
            store.alter_collection_validator(&spec.name, schema, self.level).await?;
            let note = format!("updated validator on collection {}", spec.name);
            report.note(&StepOutcome::Applied(note));
        }
        Ok(())
    }

    async fn ensure_partitioning<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        spec: &DatasetSpec,
        report: &mut DatasetReport,
    ) -> Result<()> {
        let outcome = store
            .partition_collection(&spec.name, &spec.shard_key_field, KeyingStrategy::Hashed)
            .await?;
        report.note(&outcome);
        Ok(())
    }

    /// Full refresh. The source is read and checked before anything is
    /// deleted, so an unreadable file leaves the previous contents in place.
    async fn load<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        spec: &DatasetSpec,
        schema: &ValidationSchema,
        report: &mut DatasetReport,
    ) -> Result<()> {
        let loaded = self.processor.load(spec, schema)?;
        report.unparseable = loaded.coercion.unparseable;
        report.deleted = store.delete_all(&spec.name).await?;
        info!(deleted = report.deleted, "cleared existing documents");
        if loaded.records.is_empty() {
            info!("no valid data to insert into collection {}", spec.name);
            report.notes.push("source is empty, insert skipped".to_string());
            return Ok(());
        }
        report.inserted = store.insert_many(&spec.name, &loaded.records).await?;
        info!("inserted {} documents into collection {}", report.inserted, spec.name);
        Ok(())
    }

    async fn build_indexes<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        spec: &DatasetSpec,
        report: &mut DatasetReport,
    ) -> Result<()> {
        for field in &spec.index_fields {
            store.create_index(&spec.name, field).await?;
            report.indexes.push(field.clone());
        }
        info!(indexes = ?report.indexes, "created indexes for collection {}", spec.name);
        Ok(())
    }
}
