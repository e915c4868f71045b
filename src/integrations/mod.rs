//! Warehouse-integration abstraction: one polymorphic object per data-source
//! type. Optional behaviors (schema introspection, auto fact-table proposal)
//! are gated behind capability flags that callers check before invoking.

pub mod bigquery;
pub mod google_analytics;
pub mod mixpanel;
pub mod oauth;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::datasource::{ConnectionParams, DataSourceType, ExposureQuery};
use crate::models::dimension_slices::DimensionSliceDistribution;
use crate::models::fact_table::{AutoFactTableToCreate, ColumnInfo, FactTable};

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("{0}")]
    Unsupported(String),
    #[error("http error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        IntegrationError::Http(err.to_string())
    }
}

/// Result of one ad-hoc SQL run against a customer warehouse.
#[derive(Debug, Clone)]
pub struct TestQueryRun {
    pub results: Vec<Value>,
    pub duration_ms: u64,
}

#[async_trait]
pub trait WarehouseIntegration: Send + Sync {
    fn datasource_type(&self) -> DataSourceType;

    /// Whether ad-hoc SQL and schema queries can run against this source.
    fn supports_schema_queries(&self) -> bool {
        false
    }

    /// Whether fact tables can be proposed from a tracked-event schema.
    fn supports_auto_fact_tables(&self) -> bool {
        false
    }

    /// Attempt a live connection with the configured credentials.
    async fn test_connection(&self) -> Result<(), IntegrationError>;

    async fn run_test_query(&self, _sql: &str) -> Result<TestQueryRun, IntegrationError> {
        Err(IntegrationError::Unsupported(format!(
            "{} data sources do not support SQL queries",
            self.datasource_type()
        )))
    }

    /// Compute the dimension-value distribution for an exposure query over
    /// the lookback window. Long-running; callers own cancellation.
    async fn run_dimension_slices_query(
        &self,
        _exposure_query: &ExposureQuery,
        _lookback_days: u32,
    ) -> Result<Vec<DimensionSliceDistribution>, IntegrationError> {
        Err(IntegrationError::Unsupported(format!(
            "{} data sources do not support dimension analysis",
            self.datasource_type()
        )))
    }

    /// Infer result columns by probing the given SQL against the live
    /// warehouse. An empty result means inference failed.
    async fn infer_columns(&self, _sql: &str) -> Result<Vec<ColumnInfo>, IntegrationError> {
        Err(IntegrationError::Unsupported(format!(
            "{} data sources do not support column inference",
            self.datasource_type()
        )))
    }

    /// Propose fact-table candidates from a tracked-event schema, marking
    /// those that already exist for the data source.
    async fn propose_auto_fact_tables(
        &self,
        _schema: &str,
        _existing: &[FactTable],
    ) -> Result<Vec<AutoFactTableToCreate>, IntegrationError> {
        Err(IntegrationError::Unsupported(format!(
            "{} data sources do not support automatic fact table discovery",
            self.datasource_type()
        )))
    }
}

/// Build a distribution from `{value, n}` rows, ordered as returned by the
/// warehouse (descending count).
pub(crate) fn distribution_from_rows(
    dimension: &str,
    rows: &[Value],
) -> DimensionSliceDistribution {
    use crate::models::dimension_slices::DimensionValueShare;

    let mut values: Vec<DimensionValueShare> = rows
        .iter()
        .map(|row| DimensionValueShare {
            value: row["value"].as_str().unwrap_or_default().to_string(),
            count: row["n"]
                .as_i64()
                .or_else(|| row["n"].as_str().and_then(|s| s.parse().ok()))
                .unwrap_or(0),
            share: 0.0,
        })
        .collect();
    let total_rows: i64 = values.iter().map(|v| v.count).sum();
    if total_rows > 0 {
        for v in &mut values {
            v.share = v.count as f64 / total_rows as f64;
        }
    }
    DimensionSliceDistribution {
        dimension: dimension.to_string(),
        values,
        total_rows,
    }
}

/// A tracked-event table qualifies as a fact-table candidate when it carries
/// an event timestamp and at least one user identifier column. `table_path`
/// is the fully qualified FROM target for the generated SQL.
pub(crate) fn candidate_from_columns(
    table_path: &str,
    table: &str,
    columns: &[String],
    existing: &[FactTable],
) -> Option<AutoFactTableToCreate> {
    const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "received_at", "sent_at"];
    const USER_ID_COLUMNS: &[&str] = &["user_id", "anonymous_id"];

    let timestamp_col = TIMESTAMP_COLUMNS
        .iter()
        .find(|c| columns.iter().any(|col| col == *c))?;
    let user_id_types: Vec<String> = USER_ID_COLUMNS
        .iter()
        .filter(|c| columns.iter().any(|col| col == *c))
        .map(|c| c.to_string())
        .collect();
    if user_id_types.is_empty() {
        return None;
    }

    let mut selected = user_id_types.clone();
    selected.push(format!("{} AS timestamp", timestamp_col));
    let sql = format!("SELECT {} FROM {}", selected.join(", "), table_path);

    Some(AutoFactTableToCreate {
        name: table.to_string(),
        event_name: table.to_string(),
        sql,
        user_id_types,
        columns: vec![],
        column_error: None,
        already_exists: existing
            .iter()
            .any(|t| t.event_name == table || t.name == table),
    })
}

/// Builds the integration object for a (type, params) pair. A trait so tests
/// can substitute a stub warehouse.
pub trait IntegrationFactory: Send + Sync {
    fn build(
        &self,
        datasource_type: DataSourceType,
        params: &ConnectionParams,
    ) -> Result<Box<dyn WarehouseIntegration>, IntegrationError>;
}

pub struct DefaultIntegrationFactory;

impl IntegrationFactory for DefaultIntegrationFactory {
    fn build(
        &self,
        datasource_type: DataSourceType,
        params: &ConnectionParams,
    ) -> Result<Box<dyn WarehouseIntegration>, IntegrationError> {
        if params.datasource_type() != datasource_type {
            return Err(IntegrationError::Connection(format!(
                "connection parameters are for {} but the data source type is {}",
                params.datasource_type(),
                datasource_type
            )));
        }

        match params {
            ConnectionParams::Postgres(p) | ConnectionParams::Redshift(p) => Ok(Box::new(
                postgres::PostgresIntegration::new(datasource_type, p.clone()),
            )),
            ConnectionParams::BigQuery(p) => {
                Ok(Box::new(bigquery::BigQueryIntegration::new(p.clone())))
            }
            ConnectionParams::Mixpanel(p) => {
                Ok(Box::new(mixpanel::MixpanelIntegration::new(p.clone())))
            }
            ConnectionParams::GoogleAnalytics(p) => Ok(Box::new(
                google_analytics::GoogleAnalyticsIntegration::new(p.clone()),
            )),
        }
    }
}
