//! Postgres adapter: one JSONB document table per entity, runtime-checked
//! queries over a shared pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::{
    DataSourceStore, DimensionSlicesStore, DimensionStore, FactTableStore,
    InformationSchemaStore, MetricStore, OrganizationStore, QueryStore, SegmentStore, StoreError,
    Stores,
};
use crate::config;
use crate::models::datasource::DataSource;
use crate::models::dimension_slices::DimensionSlices;
use crate::models::fact_table::FactTable;
use crate::models::organization::Organization;
use crate::models::query::Query;

const SCHEMA_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS data_sources (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        doc JSONB NOT NULL,
        date_created TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS metrics (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        doc JSONB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS segments (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        doc JSONB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS dimensions (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        doc JSONB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS fact_tables (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        doc JSONB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS dimension_slices (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        doc JSONB NOT NULL,
        date_created TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS queries (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        doc JSONB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS information_schemas (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        doc JSONB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS information_schema_tables (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        information_schema_id TEXT NOT NULL,
        doc JSONB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS organizations (
        id TEXT PRIMARY KEY,
        doc JSONB NOT NULL
    )",
];

pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(url: &str) -> Result<Arc<Self>, StoreError> {
        let db = &config::config().database;
        let pool = PgPoolOptions::new()
            .max_connections(db.max_connections)
            .acquire_timeout(Duration::from_secs(db.connection_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Arc::new(Self { pool });
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_SQL {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        Ok(())
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

    async fn fetch_doc<T: DeserializeOwned>(
        &self,
        table: &str,
        org: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let sql = format!(
            "SELECT doc FROM {} WHERE id = $1 AND organization = $2",
            table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(org)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match row {
            Some(row) => {
                let doc: serde_json::Value = row
                    .try_get("doc")
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                Ok(Some(serde_json::from_value(doc)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_doc<T: Serialize>(
        &self,
        table: &str,
        org: &str,
        id: &str,
        doc: &T,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, organization, doc) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc
             WHERE {}.organization = EXCLUDED.organization",
            table, table
        );
        sqlx::query(&sql)
            .bind(id)
            .bind(org)
            .bind(serde_json::to_value(doc)?)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn count_referencing(
        &self,
        table: &str,
        org: &str,
        datasource: &str,
    ) -> Result<i64, StoreError> {
        let sql = format!(
            "SELECT count(*) AS n FROM {} WHERE organization = $1 AND doc->>'datasource' = $2",
            table
        );
        let row = sqlx::query(&sql)
            .bind(org)
            .bind(datasource)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        row.try_get("n").map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[async_trait]
impl DataSourceStore for PgDocumentStore {
    async fn list_for_org(&self, org: &str) -> Result<Vec<DataSource>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc FROM data_sources WHERE organization = $1 ORDER BY date_created",
        )
        .bind(org)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let doc: serde_json::Value = row
                    .try_get("doc")
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                serde_json::from_value(doc).map_err(StoreError::from)
            })
            .collect()
    }

    async fn get(&self, org: &str, id: &str) -> Result<Option<DataSource>, StoreError> {
        self.fetch_doc("data_sources", org, id).await
    }

    async fn insert(&self, ds: &DataSource) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO data_sources (id, organization, doc, date_created)
             VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO NOTHING",
        )
        .bind(&ds.id)
        .bind(&ds.organization)
        .bind(serde_json::to_value(ds)?)
        .bind(ds.date_created)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "data source {} already exists",
                ds.id
            )));
        }
        Ok(())
    }

    async fn update(&self, ds: &DataSource) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE data_sources SET doc = $3 WHERE id = $1 AND organization = $2")
                .bind(&ds.id)
                .bind(&ds.organization)
                .bind(serde_json::to_value(ds)?)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "data source {} not found",
                ds.id
            )));
        }
        Ok(())
    }

    async fn delete(&self, org: &str, id: &str) -> Result<(), StoreError> {
        let result =
            sqlx::query("DELETE FROM data_sources WHERE id = $1 AND organization = $2")
                .bind(id)
                .bind(org)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("data source {} not found", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricStore for PgDocumentStore {
    async fn count_for_datasource(&self, org: &str, datasource: &str) -> Result<i64, StoreError> {
        self.count_referencing("metrics", org, datasource).await
    }
}

#[async_trait]
impl SegmentStore for PgDocumentStore {
    async fn count_for_datasource(&self, org: &str, datasource: &str) -> Result<i64, StoreError> {
        self.count_referencing("segments", org, datasource).await
    }
}

#[async_trait]
impl DimensionStore for PgDocumentStore {
    async fn count_for_datasource(&self, org: &str, datasource: &str) -> Result<i64, StoreError> {
        self.count_referencing("dimensions", org, datasource).await
    }
}

#[async_trait]
impl FactTableStore for PgDocumentStore {
    async fn list_for_datasource(
        &self,
        org: &str,
        datasource: &str,
    ) -> Result<Vec<FactTable>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc FROM fact_tables WHERE organization = $1 AND doc->>'datasource' = $2",
        )
        .bind(org)
        .bind(datasource)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let doc: serde_json::Value = row
                    .try_get("doc")
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                serde_json::from_value(doc).map_err(StoreError::from)
            })
            .collect()
    }
}

#[async_trait]
impl DimensionSlicesStore for PgDocumentStore {
    async fn insert(&self, record: &DimensionSlices) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO dimension_slices (id, organization, doc, date_created)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&record.id)
        .bind(&record.organization)
        .bind(serde_json::to_value(record)?)
        .bind(record.date_created)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn update(&self, record: &DimensionSlices) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE dimension_slices SET doc = $3 WHERE id = $1 AND organization = $2",
        )
        .bind(&record.id)
        .bind(&record.organization)
        .bind(serde_json::to_value(record)?)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "dimension slices {} not found",
                record.id
            )));
        }
        Ok(())
    }

    async fn get(&self, org: &str, id: &str) -> Result<Option<DimensionSlices>, StoreError> {
        self.fetch_doc("dimension_slices", org, id).await
    }

    async fn latest_for_query(
        &self,
        org: &str,
        datasource: &str,
        exposure_query_id: &str,
    ) -> Result<Option<DimensionSlices>, StoreError> {
        let row = sqlx::query(
            "SELECT doc FROM dimension_slices
             WHERE organization = $1
               AND doc->>'datasource' = $2
               AND doc->>'exposureQueryId' = $3
             ORDER BY date_created DESC LIMIT 1",
        )
        .bind(org)
        .bind(datasource)
        .bind(exposure_query_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        match row {
            Some(row) => {
                let doc: serde_json::Value = row
                    .try_get("doc")
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                Ok(Some(serde_json::from_value(doc)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl QueryStore for PgDocumentStore {
    async fn insert(&self, query: &Query) -> Result<(), StoreError> {
        self.upsert_doc("queries", &query.organization, &query.id, query).await
    }

    async fn update(&self, query: &Query) -> Result<(), StoreError> {
        self.upsert_doc("queries", &query.organization, &query.id, query).await
    }

    async fn get_by_ids(
        &self,
        org: &str,
        ids: &[String],
    ) -> Result<Vec<Option<Query>>, StoreError> {
        // One lookup per id: input order is part of the endpoint contract
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.fetch_doc("queries", org, id).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl InformationSchemaStore for PgDocumentStore {
    async fn delete(&self, org: &str, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM information_schemas WHERE id = $1 AND organization = $2")
            .bind(id)
            .bind(org)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_table_data(
        &self,
        org: &str,
        information_schema_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM information_schema_tables
             WHERE information_schema_id = $1 AND organization = $2",
        )
        .bind(information_schema_id)
        .bind(org)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl OrganizationStore for PgDocumentStore {
    async fn get(&self, org: &str) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query("SELECT doc FROM organizations WHERE id = $1")
            .bind(org)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match row {
            Some(row) => {
                let doc: serde_json::Value = row
                    .try_get("doc")
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                Ok(Some(serde_json::from_value(doc)?))
            }
            None => Ok(None),
        }
    }
}
