use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, ValidationAction, ValidationLevel};
use mongodb::{Client, Database, IndexModel};
use tracing::{debug, info};

use shardload_core::config::StoreSettings;
use shardload_core::error::{Error, Result};
use shardload_core::traits::{DocumentStore, StoreConnector};
use shardload_core::types::{
    AdminCredential, EnforcementLevel, KeyingStrategy, Record, StepOutcome, ValidationSchema,
};

use crate::error_map::{
    self, classify, ErrorParts, ALREADY_INITIALIZED, NAMESPACE_EXISTS, USER_ALREADY_EXISTS,
};
use crate::schema::{build_validator, shard_key, to_document};

/// A connected client bound to one target database.
pub struct MongoStore {
    client: Client,
    database: String,
}

impl MongoStore {
    fn db(&self) -> Database { self.client.database(&self.database) }

    fn admin(&self) -> Database { self.client.database("admin") }

    fn namespace(&self, collection: &str) -> String { format!("{}.{}", self.database, collection) }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db().collection::<Document>(name)
    }

    /// Runs `pipeline` against `collection` and collects every result document.
    pub async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>> {
        let cursor = self
            .collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| error_map::fatal("aggregate", collection, &e))?;
        cursor
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| error_map::fatal("aggregate", collection, &e))
    }
}

fn validation_level(level: EnforcementLevel) -> ValidationLevel {
    match level {
        EnforcementLevel::Strict => ValidationLevel::Strict,
        EnforcementLevel::Moderate => ValidationLevel::Moderate,
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn create_collection(
        &self,
        name: &str,
        schema: &ValidationSchema,
        level: EnforcementLevel,
    ) -> Result<StepOutcome> {
        let created = self
            .db()
            .create_collection(name)
            .validator(build_validator(schema))
            .validation_level(validation_level(level))
            .validation_action(ValidationAction::Error)
            .await;
        match created {
            Ok(()) => {
                let note = format!("created collection {} with validation schema", name);
                Ok(StepOutcome::Applied(note))
            }
            Err(e) => {
                classify("create_collection", name, ErrorParts::from(&e), &[NAMESPACE_EXISTS])
            }
        }
    }

    async fn alter_collection_validator(
        &self,
        name: &str,
        schema: &ValidationSchema,
        level: EnforcementLevel,
    ) -> Result<()> {
        let command = doc! {
            "collMod": name,
            "validator": build_validator(schema),
            "validationLevel": level.as_str(),
            "validationAction": "error",
        };
        self.db()
            .run_command(command)
            .await
            .map_err(|e| error_map::fatal("alter_collection_validator", name, &e))?;
        Ok(())
    }

    async fn enable_partitioning(&self, database: &str) -> Result<StepOutcome> {
        match self.admin().run_command(doc! { "enableSharding": database }).await {
            Ok(_) => {
                let note = format!("enabled sharding for database {}", database);
                Ok(StepOutcome::Applied(note))
            }
            Err(e) => {
                let parts = ErrorParts::from(&e);
                classify("enable_partitioning", database, parts, &[ALREADY_INITIALIZED])
            }
        }
    }

    async fn partition_collection(
        &self,
        name: &str,
        key_field: &str,
        strategy: KeyingStrategy,
    ) -> Result<StepOutcome> {
        let command = doc! {
            "shardCollection": self.namespace(name),
            "key": shard_key(key_field, strategy),
        };
        match self.admin().run_command(command).await {
            Ok(reply) => {
                // Servers from 4.4 on answer ok:1 for a repeat with the same key.
                if reply.get_str("collectionsharded").is_ok() {
                    let note = format!("sharded collection {} by {}", name, key_field);
                    Ok(StepOutcome::Applied(note))
                } else {
                    debug!(?reply, "shardCollection reply without collectionsharded");
                    let note = format!("collection {} already sharded by {}", name, key_field);
                    Ok(StepOutcome::AlreadySatisfied(note))
                }
            }
            Err(e) => {
                let parts = ErrorParts::from(&e);
                classify("partition_collection", name, parts, &[ALREADY_INITIALIZED])
            }
        }
    }

    async fn delete_all(&self, name: &str) -> Result<u64> {
        let result = self
            .collection(name)
            .delete_many(doc! {})
            .await
            .map_err(|e| error_map::fatal("delete_all", name, &e))?;
        Ok(result.deleted_count)
    }

    async fn insert_many(&self, name: &str, records: &[Record]) -> Result<u64> {
        let documents: Vec<Document> = records.iter().map(to_document).collect();
        let result = self
            .collection(name)
            .insert_many(documents)
            .await
            .map_err(|e| error_map::fatal("insert_many", name, &e))?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn create_index(&self, name: &str, field: &str) -> Result<()> {
        let mut keys = Document::new();
        keys.insert(field, 1);
        let model = IndexModel::builder().keys(keys).build();
        self.collection(name)
            .create_index(model)
            .await
            .map_err(|e| error_map::fatal("create_index", name, &e))?;
        Ok(())
    }

    async fn ensure_user(&self, credential: &AdminCredential) -> Result<StepOutcome> {
        let auth_db = self.client.database(&credential.auth_database);
        let info = auth_db
            .run_command(doc! { "usersInfo": credential.user.as_str() })
            .await
            .map_err(|e| error_map::fatal("ensure_user", &credential.user, &e))?;
        let exists = info.get_array("users").map(|users| !users.is_empty()).unwrap_or(false);
        if exists {
            let note = format!("admin user {} already exists", credential.user);
            return Ok(StepOutcome::AlreadySatisfied(note));
        }
        let role = doc! {
            "role": credential.role.as_str(),
            "db": credential.auth_database.as_str(),
        };
        let command = doc! {
            "createUser": credential.user.as_str(),
            "pwd": credential.password.as_str(),
            "roles": [role],
        };
        match auth_db.run_command(command).await {
            Ok(_) => Ok(StepOutcome::Applied(format!("admin user {} created", credential.user))),
            Err(e) => {
                let parts = ErrorParts::from(&e);
                classify("ensure_user", &credential.user, parts, &[USER_ALREADY_EXISTS])
            }
        }
    }

    async fn count_documents(&self, name: &str) -> Result<u64> {
        self.collection(name)
            .count_documents(doc! {})
            .await
            .map_err(|e| error_map::fatal("count_documents", name, &e))
    }

    async fn list_index_fields(&self, name: &str) -> Result<Vec<String>> {
        let cursor = self
            .collection(name)
            .list_indexes()
            .await
            .map_err(|e| error_map::fatal("list_indexes", name, &e))?;
        let models: Vec<IndexModel> = cursor
            .try_collect()
            .await
            .map_err(|e| error_map::fatal("list_indexes", name, &e))?;
        Ok(models
            .iter()
            .filter(|m| m.keys.len() == 1)
            .filter_map(|m| m.keys.keys().next().cloned())
            .filter(|field| field != "_id")
            .collect())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        info!("MongoDB connection closed");
    }
}

/// Connects with the configured timeouts and pings the cluster, so an
/// unreachable router fails here instead of on the first write.
#[derive(Debug, Clone, Default)]
pub struct MongoConnector;

#[async_trait]
impl StoreConnector for MongoConnector {
    type Store = MongoStore;

    async fn connect(&self, settings: &StoreSettings) -> Result<MongoStore> {
        let mut options = ClientOptions::parse(&settings.uri)
            .await
            .map_err(|e| Error::InvalidConfig(format!("store.uri: {}", e)))?;
        options.connect_timeout = Some(settings.connect_timeout());
        options.server_selection_timeout = Some(settings.server_selection_timeout());
        options.app_name = Some(settings.app_name.clone());
        let client =
            Client::with_options(options).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::Unreachable { operation: "connect", reason: e.to_string() })?;
        info!(database = %settings.database, "connected to MongoDB cluster");
        Ok(MongoStore { client, database: settings.database.clone() })
    }
}
