//! BigQuery integration over the REST API. Authenticates as a service
//! account: a signed RS256 assertion is traded for a short-lived access
//! token, which fronts the jobs and datasets endpoints.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{
    candidate_from_columns, distribution_from_rows, IntegrationError, TestQueryRun,
    WarehouseIntegration,
};
use crate::models::datasource::{BigQueryParams, DataSourceType, ExposureQuery};
use crate::models::dimension_slices::DimensionSliceDistribution;
use crate::models::fact_table::{AutoFactTableToCreate, ColumnInfo, FactTable};

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Value cap per dimension in distribution results.
const MAX_SLICE_VALUES: usize = 50;

/// Poll attempts before an incomplete job is treated as timed out.
const MAX_JOB_POLLS: u32 = 120;

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct BigQueryIntegration {
    params: BigQueryParams,
    http: reqwest::Client,
}

impl BigQueryIntegration {
    pub fn new(params: BigQueryParams) -> Self {
        Self {
            params,
            http: reqwest::Client::new(),
        }
    }

    async fn access_token(&self) -> Result<String, IntegrationError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.params.client_email,
            scope: BIGQUERY_SCOPE,
            aud: TOKEN_ENDPOINT,
            exp: now + 3600,
            iat: now,
        };
        let key = EncodingKey::from_rsa_pem(self.params.private_key.as_bytes())
            .map_err(|e| IntegrationError::Auth(format!("invalid private key: {}", e)))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| IntegrationError::Auth(e.to_string()))?;

        let body = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?
            .json::<TokenResponse>()
            .await?;

        body.access_token.ok_or_else(|| {
            IntegrationError::Auth(
                body.error_description
                    .unwrap_or_else(|| "service account token exchange failed".to_string()),
            )
        })
    }

    pub async fn list_datasets(&self) -> Result<Vec<String>, IntegrationError> {
        let token = self.access_token().await?;
        let url = format!("{}/projects/{}/datasets", API_BASE, self.params.project_id);
        let body: Value = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await?
            .json()
            .await?;

        if let Some(message) = body["error"]["message"].as_str() {
            return Err(IntegrationError::Connection(message.to_string()));
        }

        Ok(body["datasets"]
            .as_array()
            .map(|datasets| {
                datasets
                    .iter()
                    .filter_map(|d| d["datasetReference"]["datasetId"].as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Issue a query job and wait for its result pages.
    async fn run_query(&self, sql: &str) -> Result<QueryResult, IntegrationError> {
        let token = self.access_token().await?;
        let url = format!("{}/projects/{}/queries", API_BASE, self.params.project_id);
        let mut body: Value = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&json!({
                "query": sql,
                "useLegacySql": false,
                "timeoutMs": 60_000,
                "maxResults": 1000,
            }))
            .send()
            .await?
            .json()
            .await?;

        // Long queries come back incomplete; poll the job until done, with a
        // cap so a stuck job cannot spin forever
        let mut polls = 0u32;
        loop {
            match next_poll(&body, polls)? {
                PollStep::Done => break,
                PollStep::Retry(job_id) => {
                    polls += 1;
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    let url = format!(
                        "{}/projects/{}/queries/{}?timeoutMs=30000",
                        API_BASE, self.params.project_id, job_id
                    );
                    body = self
                        .http
                        .get(&url)
                        .bearer_auth(&token)
                        .send()
                        .await?
                        .json()
                        .await?;
                }
            }
        }

        Ok(parse_query_result(&body))
    }

    fn slice_sql(exposure_query: &ExposureQuery, dimension: &str, lookback_days: u32) -> String {
        format!(
            "SELECT coalesce(CAST(`{dim}` AS STRING), '') AS value, count(*) AS n \
             FROM ({query}) exposures \
             WHERE timestamp > TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {days} DAY) \
             GROUP BY 1 ORDER BY n DESC LIMIT {limit}",
            dim = dimension,
            query = exposure_query.query,
            days = lookback_days,
            limit = MAX_SLICE_VALUES,
        )
    }
}

struct QueryResult {
    columns: Vec<ColumnInfo>,
    rows: Vec<Value>,
}

#[derive(Debug)]
enum PollStep {
    Done,
    Retry(String),
}

/// Decide what to do with one query response: surface its error, accept a
/// complete job, give up past the poll budget, or poll the job again.
fn next_poll(body: &Value, polls: u32) -> Result<PollStep, IntegrationError> {
    if let Some(message) = body["error"]["message"].as_str() {
        return Err(IntegrationError::Query(message.to_string()));
    }
    if body["jobComplete"].as_bool().unwrap_or(true) {
        return Ok(PollStep::Done);
    }
    if polls >= MAX_JOB_POLLS {
        return Err(IntegrationError::Query(format!(
            "query job did not complete after {} polls",
            MAX_JOB_POLLS
        )));
    }
    let job_id = body["jobReference"]["jobId"]
        .as_str()
        .ok_or_else(|| IntegrationError::Query("job reference missing".to_string()))?;
    Ok(PollStep::Retry(job_id.to_string()))
}

/// Flatten the BigQuery wire format (schema.fields + rows[].f[].v) into
/// one JSON object per row. Cell values stay as the strings BigQuery sends.
fn parse_query_result(body: &Value) -> QueryResult {
    let columns: Vec<ColumnInfo> = body["schema"]["fields"]
        .as_array()
        .map(|fields| {
            fields
                .iter()
                .map(|f| ColumnInfo {
                    column: f["name"].as_str().unwrap_or_default().to_string(),
                    datatype: f["type"].as_str().unwrap_or_default().to_lowercase(),
                })
                .collect()
        })
        .unwrap_or_default();

    let rows = body["rows"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    let mut obj = Map::new();
                    if let Some(cells) = row["f"].as_array() {
                        for (col, cell) in columns.iter().zip(cells) {
                            obj.insert(col.column.clone(), cell["v"].clone());
                        }
                    }
                    Value::Object(obj)
                })
                .collect()
        })
        .unwrap_or_default();

    QueryResult { columns, rows }
}

#[async_trait]
impl WarehouseIntegration for BigQueryIntegration {
    fn datasource_type(&self) -> DataSourceType {
        DataSourceType::BigQuery
    }

    fn supports_schema_queries(&self) -> bool {
        true
    }

    fn supports_auto_fact_tables(&self) -> bool {
        true
    }

    async fn test_connection(&self) -> Result<(), IntegrationError> {
        self.list_datasets().await.map(|_| ())
    }

    async fn run_test_query(&self, sql: &str) -> Result<TestQueryRun, IntegrationError> {
        let started = Instant::now();
        let result = self.run_query(sql).await?;
        Ok(TestQueryRun {
            results: result.rows,
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
            let result = self.run_query(&sql).await?;
            distributions.push(distribution_from_rows(dimension, &result.rows));
        }
        Ok(distributions)
    }

    async fn infer_columns(&self, sql: &str) -> Result<Vec<ColumnInfo>, IntegrationError> {
        let probe = format!("SELECT * FROM ({}) probe LIMIT 1", sql);
        let result = self.run_query(&probe).await?;
        Ok(result.columns)
    }

    async fn propose_auto_fact_tables(
        &self,
        schema: &str,
        existing: &[FactTable],
    ) -> Result<Vec<AutoFactTableToCreate>, IntegrationError> {
        let sql = format!(
            "SELECT table_name, column_name \
             FROM `{}.{}`.INFORMATION_SCHEMA.COLUMNS \
             ORDER BY table_name, ordinal_position",
            self.params.project_id, schema,
        );
        let result = self.run_query(&sql).await?;

        let mut tables: Vec<(String, Vec<String>)> = Vec::new();
        for row in &result.rows {
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
                let path = format!("`{}.{}.{}`", self.params.project_id, schema, table);
                candidate_from_columns(&path, &table, &columns, existing)
            })
            .collect())
    }
}
