//! MongoDB backend for the provisioning pipeline.
//!
//! Talks to a sharded cluster through its router (`mongos`). Collection
//! validators are sent as `$jsonSchema` documents and sharding uses the admin
//! commands `enableSharding` and `shardCollection`. [`reports`] holds the
//! read-only aggregation pipelines behind `shardload report`.

pub mod error_map;
pub mod reports;
pub mod schema;
pub mod store;

pub use store::{MongoConnector, MongoStore};
