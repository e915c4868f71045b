//! Document-store interface consumed by this layer.
//!
//! Each entity gets a small org-scoped repository trait; `Stores` bundles the
//! handles a request needs. Two adapters ship with the crate: a Postgres
//! JSONB adapter (`postgres`) and an in-memory adapter (`memory`) used by
//! tests and credential-less development.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::datasource::DataSource;
use crate::models::dimension_slices::DimensionSlices;
use crate::models::fact_table::FactTable;
use crate::models::organization::Organization;
use crate::models::query::Query;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait DataSourceStore: Send + Sync {
    async fn list_for_org(&self, org: &str) -> Result<Vec<DataSource>, StoreError>;
    async fn get(&self, org: &str, id: &str) -> Result<Option<DataSource>, StoreError>;
    async fn insert(&self, ds: &DataSource) -> Result<(), StoreError>;
    async fn update(&self, ds: &DataSource) -> Result<(), StoreError>;
    async fn delete(&self, org: &str, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn count_for_datasource(&self, org: &str, datasource: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait SegmentStore: Send + Sync {
    async fn count_for_datasource(&self, org: &str, datasource: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait DimensionStore: Send + Sync {
    async fn count_for_datasource(&self, org: &str, datasource: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait FactTableStore: Send + Sync {
    async fn list_for_datasource(
        &self,
        org: &str,
        datasource: &str,
    ) -> Result<Vec<FactTable>, StoreError>;
}

#[async_trait]
pub trait DimensionSlicesStore: Send + Sync {
    async fn insert(&self, record: &DimensionSlices) -> Result<(), StoreError>;
    async fn update(&self, record: &DimensionSlices) -> Result<(), StoreError>;
    async fn get(&self, org: &str, id: &str) -> Result<Option<DimensionSlices>, StoreError>;
    /// Most recently created record for a (data source, exposure query) pair.
    async fn latest_for_query(
        &self,
        org: &str,
        datasource: &str,
        exposure_query_id: &str,
    ) -> Result<Option<DimensionSlices>, StoreError>;
}

#[async_trait]
pub trait QueryStore: Send + Sync {
    async fn insert(&self, query: &Query) -> Result<(), StoreError>;
    async fn update(&self, query: &Query) -> Result<(), StoreError>;
    /// Fetch by id, preserving input order; missing ids yield `None`.
    async fn get_by_ids(&self, org: &str, ids: &[String])
        -> Result<Vec<Option<Query>>, StoreError>;
}

#[async_trait]
pub trait InformationSchemaStore: Send + Sync {
    async fn delete(&self, org: &str, id: &str) -> Result<(), StoreError>;
    /// Remove the table-metadata rows attached to a snapshot.
    async fn delete_table_data(&self, org: &str, information_schema_id: &str)
        -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn get(&self, org: &str) -> Result<Option<Organization>, StoreError>;
}

/// Bundle of repository handles carried in the application state.
#[derive(Clone)]
pub struct Stores {
    pub datasources: Arc<dyn DataSourceStore>,
    pub metrics: Arc<dyn MetricStore>,
    pub segments: Arc<dyn SegmentStore>,
    pub dimensions: Arc<dyn DimensionStore>,
    pub fact_tables: Arc<dyn FactTableStore>,
    pub dimension_slices: Arc<dyn DimensionSlicesStore>,
    pub queries: Arc<dyn QueryStore>,
    pub information_schemas: Arc<dyn InformationSchemaStore>,
    pub organizations: Arc<dyn OrganizationStore>,
}
