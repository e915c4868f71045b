//! Thin records for entities that reference a data source. Their full
//! lifecycles live in other services; this layer only needs enough shape for
//! dependency checks on delete and for auto-metrics job payloads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: String,
    pub organization: String,
    pub datasource: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub organization: String,
    pub datasource: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub id: String,
    pub organization: String,
    pub datasource: String,
    pub name: String,
}

/// A metric definition submitted alongside a data-source update, persisted
/// later by the auto-metrics background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoMetricToCreate {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: String,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub event_name: Option<String>,
}
