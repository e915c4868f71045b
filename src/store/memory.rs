//! In-memory document store. Backs tests and credential-less development;
//! same contract as the Postgres adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    DataSourceStore, DimensionSlicesStore, DimensionStore, FactTableStore,
    InformationSchemaStore, MetricStore, OrganizationStore, QueryStore, SegmentStore, StoreError,
    Stores,
};
use crate::models::datasource::DataSource;
use crate::models::dimension_slices::DimensionSlices;
use crate::models::fact_table::FactTable;
use crate::models::metric::{Dimension, Metric, Segment};
use crate::models::organization::Organization;
use crate::models::query::Query;

#[derive(Default)]
pub struct MemoryStore {
    datasources: RwLock<HashMap<String, DataSource>>,
    metrics: RwLock<Vec<Metric>>,
    segments: RwLock<Vec<Segment>>,
    dimensions: RwLock<Vec<Dimension>>,
    fact_tables: RwLock<Vec<FactTable>>,
    dimension_slices: RwLock<HashMap<String, DimensionSlices>>,
    queries: RwLock<HashMap<String, Query>>,
    information_schemas: RwLock<HashMap<String, ()>>,
    organizations: RwLock<HashMap<String, Organization>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A `Stores` bundle where every repository is this instance.
    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            datasources: self.clone(),
            metrics: self.clone(),
            segments: self.clone(),
            dimensions: self.clone(),
            fact_tables: self.clone(),
            dimension_slices: self.clone(),
            queries: self.clone(),
            information_schemas: self.clone(),
            organizations: self.clone(),
        }
    }

    // Seeding helpers for tests and local development fixtures.

    pub async fn seed_organization(&self, org: Organization) {
        self.organizations.write().await.insert(org.id.clone(), org);
    }

    pub async fn seed_metric(&self, metric: Metric) {
        self.metrics.write().await.push(metric);
    }

    pub async fn seed_segment(&self, segment: Segment) {
        self.segments.write().await.push(segment);
    }

    pub async fn seed_dimension(&self, dimension: Dimension) {
        self.dimensions.write().await.push(dimension);
    }

    pub async fn seed_fact_table(&self, fact_table: FactTable) {
        self.fact_tables.write().await.push(fact_table);
    }

    pub async fn seed_query(&self, query: Query) {
        self.queries.write().await.insert(query.id.clone(), query);
    }

    pub async fn seed_information_schema(&self, id: &str) {
        self.information_schemas.write().await.insert(id.to_string(), ());
    }

    pub async fn information_schema_exists(&self, id: &str) -> bool {
        self.information_schemas.read().await.contains_key(id)
    }
}

#[async_trait]
impl DataSourceStore for MemoryStore {
    async fn list_for_org(&self, org: &str) -> Result<Vec<DataSource>, StoreError> {
        let map = self.datasources.read().await;
        let mut list: Vec<DataSource> =
            map.values().filter(|ds| ds.organization == org).cloned().collect();
        list.sort_by(|a, b| a.date_created.cmp(&b.date_created));
        Ok(list)
    }

    async fn get(&self, org: &str, id: &str) -> Result<Option<DataSource>, StoreError> {
        let map = self.datasources.read().await;
        Ok(map.get(id).filter(|ds| ds.organization == org).cloned())
    }

    async fn insert(&self, ds: &DataSource) -> Result<(), StoreError> {
        let mut map = self.datasources.write().await;
        if map.contains_key(&ds.id) {
            return Err(StoreError::Conflict(format!(
                "data source {} already exists",
                ds.id
            )));
        }
        map.insert(ds.id.clone(), ds.clone());
        Ok(())
    }

    async fn update(&self, ds: &DataSource) -> Result<(), StoreError> {
        let mut map = self.datasources.write().await;
        match map.get(&ds.id) {
            Some(existing) if existing.organization == ds.organization => {
                map.insert(ds.id.clone(), ds.clone());
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!(
                "data source {} not found",
                ds.id
            ))),
        }
    }

    async fn delete(&self, org: &str, id: &str) -> Result<(), StoreError> {
        let mut map = self.datasources.write().await;
        match map.get(id) {
            Some(existing) if existing.organization == org => {
                map.remove(id);
                Ok(())
            }
            _ => Err(StoreError::NotFound(format!("data source {} not found", id))),
        }
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn count_for_datasource(&self, org: &str, datasource: &str) -> Result<i64, StoreError> {
        let list = self.metrics.read().await;
        Ok(list
            .iter()
            .filter(|m| m.organization == org && m.datasource == datasource)
            .count() as i64)
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn count_for_datasource(&self, org: &str, datasource: &str) -> Result<i64, StoreError> {
        let list = self.segments.read().await;
        Ok(list
            .iter()
            .filter(|s| s.organization == org && s.datasource == datasource)
            .count() as i64)
    }
}

#[async_trait]
impl DimensionStore for MemoryStore {
    async fn count_for_datasource(&self, org: &str, datasource: &str) -> Result<i64, StoreError> {
        let list = self.dimensions.read().await;
        Ok(list
            .iter()
            .filter(|d| d.organization == org && d.datasource == datasource)
            .count() as i64)
    }
}

#[async_trait]
impl FactTableStore for MemoryStore {
    async fn list_for_datasource(
        &self,
        org: &str,
        datasource: &str,
    ) -> Result<Vec<FactTable>, StoreError> {
        let list = self.fact_tables.read().await;
        Ok(list
            .iter()
            .filter(|t| t.organization == org && t.datasource == datasource)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DimensionSlicesStore for MemoryStore {
    async fn insert(&self, record: &DimensionSlices) -> Result<(), StoreError> {
        self.dimension_slices
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &DimensionSlices) -> Result<(), StoreError> {
        let mut map = self.dimension_slices.write().await;
        if !map.contains_key(&record.id) {
            return Err(StoreError::NotFound(format!(
                "dimension slices {} not found",
                record.id
            )));
        }
        map.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, org: &str, id: &str) -> Result<Option<DimensionSlices>, StoreError> {
        let map = self.dimension_slices.read().await;
        Ok(map.get(id).filter(|r| r.organization == org).cloned())
    }

    async fn latest_for_query(
        &self,
        org: &str,
        datasource: &str,
        exposure_query_id: &str,
    ) -> Result<Option<DimensionSlices>, StoreError> {
        let map = self.dimension_slices.read().await;
        Ok(map
            .values()
            .filter(|r| {
                r.organization == org
                    && r.datasource == datasource
                    && r.exposure_query_id == exposure_query_id
            })
            .max_by_key(|r| r.date_created)
            .cloned())
    }
}

#[async_trait]
impl QueryStore for MemoryStore {
    async fn insert(&self, query: &Query) -> Result<(), StoreError> {
        self.queries.write().await.insert(query.id.clone(), query.clone());
        Ok(())
    }

    async fn update(&self, query: &Query) -> Result<(), StoreError> {
        let mut map = self.queries.write().await;
        if !map.contains_key(&query.id) {
            return Err(StoreError::NotFound(format!("query {} not found", query.id)));
        }
        map.insert(query.id.clone(), query.clone());
        Ok(())
    }

    async fn get_by_ids(
        &self,
        org: &str,
        ids: &[String],
    ) -> Result<Vec<Option<Query>>, StoreError> {
        let map = self.queries.read().await;
        Ok(ids
            .iter()
            .map(|id| map.get(id).filter(|q| q.organization == org).cloned())
            .collect())
    }
}

#[async_trait]
impl InformationSchemaStore for MemoryStore {
    async fn delete(&self, _org: &str, id: &str) -> Result<(), StoreError> {
        self.information_schemas.write().await.remove(id);
        Ok(())
    }

    async fn delete_table_data(
        &self,
        _org: &str,
        _information_schema_id: &str,
    ) -> Result<(), StoreError> {
        // Table metadata rows live with the snapshot in this adapter
        Ok(())
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn get(&self, org: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self.organizations.read().await.get(org).cloned())
    }
}
