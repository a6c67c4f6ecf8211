//! In-process document store.
//!
//! Behaves like the sharded cluster for everything the orchestrator relies on:
//! strict validators reject a whole bulk insert, repeated creation reports
//! "already exists", and partitioning is remembered per collection. Used by the
//! tests and by `--dry-run`.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::StoreSettings;
use crate::error::{Error, Result};
use crate::traits::{DocumentStore, StoreConnector};
use crate::types::{
    AdminCredential, EnforcementLevel, KeyingStrategy, Record, StepOutcome, ValidationSchema,
};

#[derive(Debug, Default)]
struct Collection {
    validator: Option<(ValidationSchema, EnforcementLevel)>,
    shard_key: Option<(String, KeyingStrategy)>,
    documents: Vec<Record>,
    indexes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Rejected,
    Unreachable,
}

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    partitioned_databases: BTreeSet<String>,
    users: BTreeMap<String, AdminCredential>,
    faults: HashMap<(String, String), Fault>,
    closed: usize,
}

/// Cheap to clone; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Makes every future `operation` on `collection` fail with a store rejection.
    pub async fn inject_rejection(&self, operation: &str, collection: &str) {
        self.inject(operation, collection, Fault::Rejected).await;
    }

    /// Makes every future `operation` on `collection` fail as if the cluster
    /// had gone away mid-run.
    pub async fn inject_unreachable(&self, operation: &str, collection: &str) {
        self.inject(operation, collection, Fault::Unreachable).await;
    }

    async fn inject(&self, operation: &str, collection: &str, fault: Fault) {
        let key = (operation.to_string(), collection.to_string());
        self.state.write().await.faults.insert(key, fault);
    }

    pub async fn documents(&self, collection: &str) -> Vec<Record> {
        let state = self.state.read().await;
        state.collections.get(collection).map(|c| c.documents.clone()).unwrap_or_default()
    }

    pub async fn validator(
        &self,
        collection: &str,
    ) -> Option<(ValidationSchema, EnforcementLevel)> {
        let state = self.state.read().await;
        state.collections.get(collection).and_then(|c| c.validator.clone())
    }

    pub async fn shard_key(&self, collection: &str) -> Option<(String, KeyingStrategy)> {
        let state = self.state.read().await;
        state.collections.get(collection).and_then(|c| c.shard_key.clone())
    }

    pub async fn has_user(&self, user: &str) -> bool {
        self.state.read().await.users.contains_key(user)
    }

    pub async fn is_partitioned(&self, database: &str) -> bool {
        self.state.read().await.partitioned_databases.contains(database)
    }

    /// How many times `close` has been called across all clones.
    pub async fn close_count(&self) -> usize { self.state.read().await.closed }

    fn check_fault(state: &State, operation: &'static str, collection: &str) -> Result<()> {
        match state.faults.get(&(operation.to_string(), collection.to_string())) {
            None => Ok(()),
            Some(Fault::Rejected) => {
                Err(Error::rejected(operation, collection, "injected failure"))
            }
            Some(Fault::Unreachable) => Err(Error::Unreachable {
                operation,
                reason: format!("connection lost during {} on {}", operation, collection),
            }),
        }
    }

    fn missing_namespace(operation: &'static str, name: &str) -> Error {
        Error::rejected(operation, name, "ns does not exist")
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create_collection(
        &self,
        name: &str,
        schema: &ValidationSchema,
        level: EnforcementLevel,
    ) -> Result<StepOutcome> {
        let mut state = self.state.write().await;
        Self::check_fault(&state, "create_collection", name)?;
        if state.collections.contains_key(name) {
            let note = format!("collection {} already exists", name);
            return Ok(StepOutcome::AlreadySatisfied(note));
        }
        let collection =
            Collection { validator: Some((schema.clone(), level)), ..Collection::default() };
        state.collections.insert(name.to_string(), collection);
        Ok(StepOutcome::Applied(format!("created collection {} with validation schema", name)))
    }

    async fn alter_collection_validator(
        &self,
        name: &str,
        schema: &ValidationSchema,
        level: EnforcementLevel,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        Self::check_fault(&state, "alter_collection_validator", name)?;
        let collection = state
            .collections
            .get_mut(name)
            .ok_or_else(|| Self::missing_namespace("alter_collection_validator", name))?;
        collection.validator = Some((schema.clone(), level));
        Ok(())
    }

    async fn enable_partitioning(&self, database: &str) -> Result<StepOutcome> {
        let mut state = self.state.write().await;
        if state.partitioned_databases.insert(database.to_string()) {
            Ok(StepOutcome::Applied(format!("enabled sharding for database {}", database)))
        } else {
            let note = format!("sharding already enabled for database {}", database);
            Ok(StepOutcome::AlreadySatisfied(note))
        }
    }

    async fn partition_collection(
        &self,
        name: &str,
        key_field: &str,
        strategy: KeyingStrategy,
    ) -> Result<StepOutcome> {
        let mut state = self.state.write().await;
        Self::check_fault(&state, "partition_collection", name)?;
        let collection = state.collections.entry(name.to_string()).or_default();
        if let Some((field, existing)) = &collection.shard_key {
            if field == key_field && *existing == strategy {
                let note = format!("collection {} already sharded by {}", name, key_field);
                return Ok(StepOutcome::AlreadySatisfied(note));
            }
            return Err(Error::rejected(
                "partition_collection",
                name,
                format!("already sharded with a different key ({})", field),
            ));
        }
        collection.shard_key = Some((key_field.to_string(), strategy));
        Ok(StepOutcome::Applied(format!("sharded collection {} by {}", name, key_field)))
    }

    async fn delete_all(&self, name: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        Self::check_fault(&state, "delete_all", name)?;
        let removed = state.collections.get_mut(name).map(|c| std::mem::take(&mut c.documents));
        Ok(removed.map_or(0, |documents| documents.len() as u64))
    }

    async fn insert_many(&self, name: &str, records: &[Record]) -> Result<u64> {
        let mut state = self.state.write().await;
        Self::check_fault(&state, "insert_many", name)?;
        let collection = state.collections.entry(name.to_string()).or_default();
        if let Some((schema, EnforcementLevel::Strict)) = &collection.validator {
            for (index, record) in records.iter().enumerate() {
                schema.check(record).map_err(|reason| {
                    let reason =
                        format!("Document failed validation (index {}): {}", index, reason);
                    Error::rejected("insert_many", name, reason)
                })?;
            }
        }
        collection.documents.extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn create_index(&self, name: &str, field: &str) -> Result<()> {
        let mut state = self.state.write().await;
        Self::check_fault(&state, "create_index", name)?;
        let collection = state.collections.entry(name.to_string()).or_default();
        if !collection.indexes.iter().any(|f| f == field) {
            collection.indexes.push(field.to_string());
        }
        Ok(())
    }

    async fn ensure_user(&self, credential: &AdminCredential) -> Result<StepOutcome> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&credential.user) {
            let note = format!("admin user {} already exists", credential.user);
            return Ok(StepOutcome::AlreadySatisfied(note));
        }
        state.users.insert(credential.user.clone(), credential.clone());
        Ok(StepOutcome::Applied(format!("admin user {} created", credential.user)))
    }

    async fn count_documents(&self, name: &str) -> Result<u64> {
        let state = self.state.read().await;
        Self::check_fault(&state, "count_documents", name)?;
        Ok(state.collections.get(name).map_or(0, |c| c.documents.len() as u64))
    }

    /// Unknown collections are rejected, as `listIndexes` is on the server.
    async fn list_index_fields(&self, name: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Self::check_fault(&state, "list_indexes", name)?;
        state
            .collections
            .get(name)
            .map(|c| c.indexes.clone())
            .ok_or_else(|| Self::missing_namespace("list_indexes", name))
    }

    async fn close(&self) { self.state.write().await.closed += 1; }
}

/// Hands out clones of one shared [`InMemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    store: InMemoryStore,
    unreachable: bool,
}

impl InMemoryConnector {
    pub fn new(store: InMemoryStore) -> Self { Self { store, unreachable: false } }

    /// A connector whose every connection attempt times out.
    pub fn unreachable() -> Self { Self { store: InMemoryStore::new(), unreachable: true } }

    pub fn store(&self) -> &InMemoryStore { &self.store }
}

#[async_trait]
impl StoreConnector for InMemoryConnector {
    type Store = InMemoryStore;

    async fn connect(&self, settings: &StoreSettings) -> Result<InMemoryStore> {
        if self.unreachable {
            return Err(Error::Unreachable {
                operation: "connect",
                reason: format!(
                    "server selection timed out after {:?}",
                    settings.server_selection_timeout()
                ),
            });
        }
        Ok(self.store.clone())
    }
}
