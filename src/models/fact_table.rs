use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;

/// One column of a fact table, with the warehouse-reported type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub column: String,
    pub datatype: String,
}

/// A persisted fact table: a user-defined abstraction over raw event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactTable {
    pub id: String,
    pub organization: String,
    pub datasource: String,
    pub name: String,
    #[serde(default)]
    pub event_name: String,
    pub sql: String,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub user_id_types: Vec<String>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    pub owner: String,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl FactTable {
    pub fn new(
        organization: String,
        datasource: String,
        name: String,
        event_name: String,
        sql: String,
        projects: Vec<String>,
        user_id_types: Vec<String>,
        columns: Vec<ColumnInfo>,
        owner: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("ft"),
            organization,
            datasource,
            name,
            event_name,
            sql,
            projects,
            user_id_types,
            columns,
            owner,
            date_created: now,
            date_updated: now,
        }
    }
}

/// A candidate fact table proposed by introspecting a tracked-event schema.
/// Returned by discovery; persisted only after explicit user confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoFactTableToCreate {
    pub name: String,
    pub event_name: String,
    pub sql: String,
    #[serde(default)]
    pub user_id_types: Vec<String>,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    /// Set when column inference failed for this candidate during discovery.
    #[serde(default)]
    pub column_error: Option<String>,
    /// A fact table with this event name already exists for the data source.
    #[serde(default)]
    pub already_exists: bool,
}
