use async_trait::async_trait;

use crate::config::StoreSettings;
use crate::error::Result;
use crate::types::{
    AdminCredential, EnforcementLevel, KeyingStrategy, Record, StepOutcome, ValidationSchema,
};

/// Administrative and bulk-write surface of the external document store.
///
/// Backends translate their own "already exists" signals into
/// [`StepOutcome::AlreadySatisfied`]; everything in the `Err` arm is a real
/// failure classified by [`crate::error::Error`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_collection(
        &self,
        name: &str,
        schema: &ValidationSchema,
        level: EnforcementLevel,
    ) -> Result<StepOutcome>;

    async fn alter_collection_validator(
        &self,
        name: &str,
        schema: &ValidationSchema,
        level: EnforcementLevel,
    ) -> Result<()>;

    async fn enable_partitioning(&self, database: &str) -> Result<StepOutcome>;

    async fn partition_collection(
        &self,
        name: &str,
        key_field: &str,
        strategy: KeyingStrategy,
    ) -> Result<StepOutcome>;

    /// Returns the number of documents removed.
    async fn delete_all(&self, name: &str) -> Result<u64>;

    /// One bulk call. Returns the number of documents inserted.
    async fn insert_many(&self, name: &str, records: &[Record]) -> Result<u64>;

    /// Ascending single-field index; existing identical indexes are fine.
    async fn create_index(&self, name: &str, field: &str) -> Result<()>;

    async fn ensure_user(&self, credential: &AdminCredential) -> Result<StepOutcome>;

    async fn count_documents(&self, name: &str) -> Result<u64>;

    /// Single-field index keys present on the collection, `_id` excluded.
    async fn list_index_fields(&self, name: &str) -> Result<Vec<String>>;

    async fn close(&self);
}

/// Opens a store connection bounded by the configured timeouts.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: DocumentStore;

    async fn connect(&self, settings: &StoreSettings) -> Result<Self::Store>;
}
