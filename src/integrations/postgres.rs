//! SQL integration for Postgres-protocol warehouses (Postgres, Redshift).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Column, PgPool, Row, TypeInfo};
use url::Url;

use super::{
    candidate_from_columns, distribution_from_rows, IntegrationError, TestQueryRun,
    WarehouseIntegration,
};
use crate::models::datasource::{DataSourceType, ExposureQuery, PostgresParams};
use crate::models::dimension_slices::DimensionSliceDistribution;
use crate::models::fact_table::{AutoFactTableToCreate, ColumnInfo, FactTable};

/// Value cap per dimension in distribution results.
const MAX_SLICE_VALUES: usize = 50;

pub struct PostgresIntegration {
    datasource_type: DataSourceType,
    params: PostgresParams,
}

impl PostgresIntegration {
    pub fn new(datasource_type: DataSourceType, params: PostgresParams) -> Self {
        Self {
            datasource_type,
            params,
        }
    }

    fn connection_url(&self) -> Result<Url, IntegrationError> {
        let mut url = Url::parse("postgres://localhost")
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;
        url.set_host(Some(&self.params.host))
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;
        url.set_port(Some(self.params.port))
            .map_err(|_| IntegrationError::Connection("invalid port".to_string()))?;
        url.set_username(&self.params.user)
            .map_err(|_| IntegrationError::Connection("invalid username".to_string()))?;
        url.set_password(Some(&self.params.password))
            .map_err(|_| IntegrationError::Connection("invalid password".to_string()))?;
        url.set_path(&self.params.database);
        if self.params.ssl {
            url.set_query(Some("sslmode=require"));
        }
        Ok(url)
    }

    async fn pool(&self) -> Result<PgPool, IntegrationError> {
        let url = self.connection_url()?;
        PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(15))
            .connect(url.as_str())
            .await
            .map_err(|e| IntegrationError::Connection(e.to_string()))
    }

    async fn fetch_json_rows(&self, sql: &str) -> Result<Vec<Value>, IntegrationError> {
        let pool = self.pool().await?;
        let wrapped = format!("SELECT row_to_json(t) AS row FROM ({}) t", sql);
        let rows = sqlx::query(&wrapped)
            .fetch_all(&pool)
            .await
            .map_err(|e| IntegrationError::Query(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| row.try_get::<Value, _>("row").unwrap_or(Value::Null))
            .collect())
    }

    /// Distribution query for a single dimension column of an exposure query.
    fn slice_sql(exposure_query: &ExposureQuery, dimension: &str, lookback_days: u32) -> String {
        format!(
            "SELECT coalesce(\"{dim}\"::text, '') AS value, count(*) AS n \
             FROM ({query}) exposures \
             WHERE timestamp > now() - interval '{days} days' \
             GROUP BY 1 ORDER BY n DESC LIMIT {limit}",
            dim = dimension,
            query = exposure_query.query,
            days = lookback_days,
            limit = MAX_SLICE_VALUES,
        )
    }
}

#[async_trait]
impl WarehouseIntegration for PostgresIntegration {
    fn datasource_type(&self) -> DataSourceType {
        self.datasource_type
    }

    fn supports_schema_queries(&self) -> bool {
        true
    }

    fn supports_auto_fact_tables(&self) -> bool {
        true
    }

    async fn test_connection(&self) -> Result<(), IntegrationError> {
        let pool = self.pool().await?;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| IntegrationError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn run_test_query(&self, sql: &str) -> Result<TestQueryRun, IntegrationError> {
        let started = Instant::now();
        let results = self.fetch_json_rows(sql).await?;
        Ok(TestQueryRun {
            results,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn run_dimension_slices_query(
        &self,
        exposure_query: &ExposureQuery,
        lookback_days: u32,
    ) -> Result<Vec<DimensionSliceDistribution>, IntegrationError> {
        let mut distributions = Vec::with_capacity(exposure_query.dimensions.len());
        for dimension in &exposure_query.dimensions {
            let sql = Self::slice_sql(exposure_query, dimension, lookback_days);
            let rows = self.fetch_json_rows(&sql).await?;
            distributions.push(distribution_from_rows(dimension, &rows));
        }
        Ok(distributions)
    }

    async fn infer_columns(&self, sql: &str) -> Result<Vec<ColumnInfo>, IntegrationError> {
        let pool = self.pool().await?;
        let probe = format!("SELECT * FROM ({}) probe LIMIT 1", sql);
        let row = sqlx::query(&probe)
            .fetch_optional(&pool)
            .await
            .map_err(|e| IntegrationError::Query(e.to_string()))?;

        Ok(row
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| ColumnInfo {
                        column: col.name().to_string(),
                        datatype: col.type_info().name().to_lowercase(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn propose_auto_fact_tables(
        &self,
        schema: &str,
        existing: &[FactTable],
    ) -> Result<Vec<AutoFactTableToCreate>, IntegrationError> {
        let sql = format!(
            "SELECT table_name, column_name \
             FROM information_schema.columns \
             WHERE table_schema = '{}' \
             ORDER BY table_name, ordinal_position",
            schema.replace('\'', "''"),
        );
        let rows = self.fetch_json_rows(&sql).await?;

        let mut tables: Vec<(String, Vec<String>)> = Vec::new();
        for row in &rows {
            let table = row["table_name"].as_str().unwrap_or_default().to_string();
            let column = row["column_name"].as_str().unwrap_or_default().to_string();
            match tables.last_mut() {
                Some((name, columns)) if *name == table => columns.push(column),
                _ => tables.push((table, vec![column])),
            }
        }

        Ok(tables
            .into_iter()
            .filter_map(|(table, columns)| {
                let path = format!("{}.{}", schema, table);
                candidate_from_columns(&path, &table, &columns, existing)
            })
            .collect())
    }
}
