use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;

/// Lifecycle states of one dimension-value-distribution analysis run.
/// Owned by the query runner; nothing else writes these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Error,
}

impl SliceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SliceStatus::Completed | SliceStatus::Cancelled | SliceStatus::Error
        )
    }
}

/// Share of exposures seen for one dimension value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionValueShare {
    pub value: String,
    pub count: i64,
    /// Fraction of total rows in [0, 1].
    pub share: f64,
}

/// Distribution of values for a single dimension over the lookback window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionSliceDistribution {
    pub dimension: String,
    pub values: Vec<DimensionValueShare>,
    pub total_rows: i64,
}

/// A persisted record of one dimension-slice analysis run. Created when the
/// analysis starts, superseded (never deleted) by newer runs for the same
/// (data source, exposure query) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionSlices {
    pub id: String,
    pub organization: String,
    pub datasource: String,
    pub exposure_query_id: String,
    pub lookback_days: u32,
    pub status: SliceStatus,
    /// Persisted warehouse query backing this run, once issued.
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub results: Vec<DimensionSliceDistribution>,
    #[serde(default)]
    pub error: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    #[serde(default)]
    pub run_started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_finished: Option<DateTime<Utc>>,
}

impl DimensionSlices {
    pub fn new(
        organization: String,
        datasource: String,
        exposure_query_id: String,
        lookback_days: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("dsl"),
            organization,
            datasource,
            exposure_query_id,
            lookback_days,
            status: SliceStatus::Pending,
            query_id: None,
            results: vec![],
            error: None,
            date_created: now,
            date_updated: now,
            run_started: None,
            run_finished: None,
        }
    }
}
