use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// One persisted warehouse query execution, retrievable through the
/// queries-by-id endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub id: String,
    pub organization: String,
    pub datasource: String,
    pub language: String,
    pub query: String,
    pub status: QueryStatus,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl Query {
    pub fn new(organization: String, datasource: String, language: String, sql: String) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("qry"),
            organization,
            datasource,
            language,
            query: sql,
            status: QueryStatus::Queued,
            result: None,
            error: None,
            date_created: now,
            date_updated: now,
        }
    }
}
