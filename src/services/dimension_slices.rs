//! Dimension-slice query runner: lifecycle of one asynchronous warehouse
//! analysis job with persisted state.
//!
//! States: pending → running → {completed, error, cancelled}. Each record is
//! mutated only by its own run, so no cross-record locking is needed. `start`
//! awaits the warehouse query inline; `cancel` reaches a concurrent run
//! through a per-record watch channel held in the in-process registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::integrations::{IntegrationError, IntegrationFactory};
use crate::models::datasource::{DataSource, ExposureQuery};
use crate::models::dimension_slices::{DimensionSliceDistribution, DimensionSlices, SliceStatus};
use crate::models::query::{Query, QueryStatus};
use crate::store::Stores;

/// Default lookback window in days when the request omits it.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Coerce the caller-supplied lookback value. Absent means the default;
/// anything present must be a positive integer.
pub fn parse_lookback_days(value: Option<&Value>) -> Result<u32, ApiError> {
    let Some(value) = value else {
        return Ok(DEFAULT_LOOKBACK_DAYS);
    };
    if value.is_null() {
        return Ok(DEFAULT_LOOKBACK_DAYS);
    }
    value
        .as_u64()
        .and_then(|days| u32::try_from(days).ok())
        .filter(|days| *days > 0)
        .ok_or_else(|| {
            ApiError::validation_error("lookbackDays must be a positive integer".to_string())
        })
}

pub struct DimensionSlicesRunner {
    stores: Stores,
    integrations: Arc<dyn IntegrationFactory>,
    /// Cancellation senders for runs in flight in this process.
    active: Mutex<HashMap<String, watch::Sender<bool>>>,
}

enum RunOutcome {
    Finished(Result<Vec<DimensionSliceDistribution>, IntegrationError>),
    Cancelled,
}

impl DimensionSlicesRunner {
    pub fn new(stores: Stores, integrations: Arc<dyn IntegrationFactory>) -> Self {
        Self {
            stores,
            integrations,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Run a new analysis for one exposure query of a data source. Persists
    /// a fresh record before the query is issued and again at every state
    /// transition; returns the final record.
    pub async fn start(
        &self,
        ctx: &ReqContext,
        ds: &DataSource,
        exposure_query_id: &str,
        lookback_days: u32,
    ) -> Result<DimensionSlices, ApiError> {
        let exposure_query = ds
            .settings
            .exposure_query(exposure_query_id)
            .ok_or_else(|| {
                ApiError::not_found(format!(
                    "Exposure query {} not found on data source {}",
                    exposure_query_id, ds.id
                ))
            })?
            .clone();

        let record = DimensionSlices::new(
            ctx.org.clone(),
            ds.id.clone(),
            exposure_query_id.to_string(),
            lookback_days,
        );
        let record_id = record.id.clone();

        // The sender is registered before the record is persisted, so a
        // cancel that can see the record always finds the sender too
        let (tx, rx) = watch::channel(false);
        self.register(&record_id, tx);
        let result = self
            .run_analysis(ctx, ds, &exposure_query, record, lookback_days, rx)
            .await;
        self.unregister(&record_id);
        result
    }

    async fn run_analysis(
        &self,
        ctx: &ReqContext,
        ds: &DataSource,
        exposure_query: &ExposureQuery,
        mut record: DimensionSlices,
        lookback_days: u32,
        mut rx: watch::Receiver<bool>,
    ) -> Result<DimensionSlices, ApiError> {
        self.stores.dimension_slices.insert(&record).await?;

        let mut query = Query::new(
            ctx.org.clone(),
            ds.id.clone(),
            "sql".to_string(),
            exposure_query.query.clone(),
        );
        query.status = QueryStatus::Running;
        self.stores.queries.insert(&query).await?;

        record.status = SliceStatus::Running;
        record.query_id = Some(query.id.clone());
        record.run_started = Some(Utc::now());
        record.date_updated = Utc::now();
        self.stores.dimension_slices.update(&record).await?;

        let outcome = match self.integrations.build(ds.datasource_type, &ds.params) {
            Ok(integration) => {
                tokio::select! {
                    result = integration
                        .run_dimension_slices_query(exposure_query, lookback_days) => {
                        RunOutcome::Finished(result)
                    }
                    _ = rx.changed() => RunOutcome::Cancelled,
                }
            }
            Err(e) => RunOutcome::Finished(Err(e)),
        };

        let now = Utc::now();
        record.run_finished = Some(now);
        record.date_updated = now;
        query.date_updated = now;
        match outcome {
            RunOutcome::Finished(Ok(results)) => {
                record.status = SliceStatus::Completed;
                record.results = results;
                query.status = QueryStatus::Succeeded;
                query.result = serde_json::to_value(&record.results).ok();
            }
            RunOutcome::Finished(Err(e)) => {
                tracing::warn!(record = %record.id, "dimension slices query failed: {}", e);
                record.status = SliceStatus::Error;
                record.error = Some(e.to_string());
                query.status = QueryStatus::Failed;
                query.error = Some(e.to_string());
            }
            RunOutcome::Cancelled => {
                record.status = SliceStatus::Cancelled;
                query.status = QueryStatus::Cancelled;
            }
        }
        self.stores.queries.update(&query).await?;

        // A cancel that found no sender settles the record itself; a settled
        // cancelled record is terminal and must not be overwritten
        if let Some(stored) = self
            .stores
            .dimension_slices
            .get(&record.organization, &record.id)
            .await?
        {
            if stored.status == SliceStatus::Cancelled {
                return Ok(stored);
            }
        }
        self.stores.dimension_slices.update(&record).await?;
        Ok(record)
    }

    /// Request cancellation of a run. A no-op (not an error) once the record
    /// has reached a terminal state; NotFound if the record does not exist.
    pub async fn cancel(&self, ctx: &ReqContext, id: &str) -> Result<DimensionSlices, ApiError> {
        let mut record = self
            .stores
            .dimension_slices
            .get(&ctx.org, id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("Dimension slices {} not found", id)))?;

        if record.status.is_terminal() {
            return Ok(record);
        }

        if let Some(tx) = self.take_sender(id) {
            // The in-flight start call observes the signal and persists the
            // cancelled state itself. The send can race a just-finished run;
            // losing that race leaves the completed record untouched.
            let _ = tx.send(true);
            return Ok(record);
        }

        // No run in flight here (stale pending/running record): settle it
        record.status = SliceStatus::Cancelled;
        record.run_finished = Some(Utc::now());
        record.date_updated = Utc::now();
        self.stores.dimension_slices.update(&record).await?;
        Ok(record)
    }

    pub async fn get(&self, ctx: &ReqContext, id: &str) -> Result<Option<DimensionSlices>, ApiError> {
        Ok(self.stores.dimension_slices.get(&ctx.org, id).await?)
    }

    pub async fn latest(
        &self,
        ctx: &ReqContext,
        datasource: &str,
        exposure_query_id: &str,
    ) -> Result<Option<DimensionSlices>, ApiError> {
        Ok(self
            .stores
            .dimension_slices
            .latest_for_query(&ctx.org, datasource, exposure_query_id)
            .await?)
    }

    fn register(&self, id: &str, tx: watch::Sender<bool>) {
        self.active
            .lock()
            .expect("cancellation registry poisoned")
            .insert(id.to_string(), tx);
    }

    fn unregister(&self, id: &str) {
        self.active
            .lock()
            .expect("cancellation registry poisoned")
            .remove(id);
    }

    fn take_sender(&self, id: &str) -> Option<watch::Sender<bool>> {
        self.active
            .lock()
            .expect("cancellation registry poisoned")
            .remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dimension_slices::DimensionValueShare;
    use crate::testing::{analyst_ctx, postgres_datasource, StubBehavior, TestHarness};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn lookback_defaults_and_validates() {
        assert_eq!(parse_lookback_days(None).unwrap(), 30);
        assert_eq!(parse_lookback_days(Some(&Value::Null)).unwrap(), 30);
        assert_eq!(parse_lookback_days(Some(&json!(14))).unwrap(), 14);
        assert!(parse_lookback_days(Some(&json!("14"))).is_err());
        assert!(parse_lookback_days(Some(&json!(0))).is_err());
        assert!(parse_lookback_days(Some(&json!(-3))).is_err());
        assert!(parse_lookback_days(Some(&json!(2.5))).is_err());
        // Values past u32::MAX must be rejected, not truncated to a short or
        // zero-day window
        assert!(parse_lookback_days(Some(&json!(4_294_967_296u64))).is_err());
        assert!(parse_lookback_days(Some(&json!(4_294_967_310u64))).is_err());
    }

    fn sample_distribution() -> Vec<DimensionSliceDistribution> {
        vec![DimensionSliceDistribution {
            dimension: "country".into(),
            values: vec![DimensionValueShare {
                value: "US".into(),
                count: 10,
                share: 1.0,
            }],
            total_rows: 10,
        }]
    }

    #[tokio::test]
    async fn start_persists_results_and_completes() {
        let harness = TestHarness::new().await;
        harness.stub.set_slices(sample_distribution());
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let record = harness
            .state
            .slice_runner
            .start(&ctx, &ds, "eq_main", 30)
            .await
            .unwrap();

        assert_eq!(record.status, SliceStatus::Completed);
        assert_eq!(record.results[0].dimension, "country");
        assert!(record.run_started.is_some() && record.run_finished.is_some());

        // The backing query record is persisted and terminal
        let query_id = record.query_id.clone().unwrap();
        let queries = harness
            .state
            .stores
            .queries
            .get_by_ids(&ctx.org, &[query_id])
            .await
            .unwrap();
        assert_eq!(queries[0].as_ref().unwrap().status, QueryStatus::Succeeded);
    }

    #[tokio::test]
    async fn start_records_integration_failures() {
        let harness = TestHarness::new().await;
        harness.stub.set_behavior(StubBehavior::FailQueries("relation missing".into()));
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let record = harness
            .state
            .slice_runner
            .start(&ctx, &ds, "eq_main", 30)
            .await
            .unwrap();

        assert_eq!(record.status, SliceStatus::Error);
        assert!(record.error.as_deref().unwrap().contains("relation missing"));
    }

    #[tokio::test]
    async fn start_rejects_unknown_exposure_query() {
        let harness = TestHarness::new().await;
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let err = harness
            .state
            .slice_runner
            .start(&ctx, &ds, "eq_missing", 30)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn cancel_interrupts_an_inflight_run() {
        let harness = TestHarness::new().await;
        harness.stub.set_behavior(StubBehavior::HangQueries);
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let runner = harness.state.slice_runner.clone();
        let start_ctx = ctx.clone();
        let start_ds = ds.clone();
        let handle = tokio::spawn(async move {
            runner.start(&start_ctx, &start_ds, "eq_main", 30).await
        });

        // Wait until the run registers itself, then cancel it
        let record_id = loop {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if let Some(record) = harness
                .state
                .stores
                .dimension_slices
                .latest_for_query(&ctx.org, &ds.id, "eq_main")
                .await
                .unwrap()
            {
                if record.status == SliceStatus::Running {
                    break record.id;
                }
            }
        };
        harness
            .state
            .slice_runner
            .cancel(&ctx, &record_id)
            .await
            .unwrap();

        let record = handle.await.unwrap().unwrap();
        assert_eq!(record.status, SliceStatus::Cancelled);

        // Second cancel after the terminal state is a harmless no-op
        let again = harness
            .state
            .slice_runner
            .cancel(&ctx, &record_id)
            .await
            .unwrap();
        assert_eq!(again.status, SliceStatus::Cancelled);
    }

    #[tokio::test]
    async fn settled_cancellation_survives_a_finishing_run() {
        let harness = TestHarness::new().await;
        let gate = Arc::new(tokio::sync::Notify::new());
        harness
            .stub
            .set_behavior(StubBehavior::GateQueries(gate.clone()));
        harness.stub.set_slices(sample_distribution());
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let runner = harness.state.slice_runner.clone();
        let start_ctx = ctx.clone();
        let start_ds = ds.clone();
        let handle = tokio::spawn(async move {
            runner.start(&start_ctx, &start_ds, "eq_main", 30).await
        });

        let mut record = loop {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if let Some(record) = harness
                .state
                .stores
                .dimension_slices
                .latest_for_query(&ctx.org, &ds.id, "eq_main")
                .await
                .unwrap()
            {
                if record.status == SliceStatus::Running {
                    break record;
                }
            }
        };

        // Settle the record behind the run's back, as a cancel that found no
        // sender does, then let the gated query finish successfully
        record.status = SliceStatus::Cancelled;
        record.run_finished = Some(Utc::now());
        record.date_updated = Utc::now();
        harness
            .state
            .stores
            .dimension_slices
            .update(&record)
            .await
            .unwrap();
        gate.notify_one();

        // Cancelled is terminal; the finishing run must not overwrite it
        let returned = handle.await.unwrap().unwrap();
        assert_eq!(returned.status, SliceStatus::Cancelled);
        assert!(returned.results.is_empty());

        let stored = harness
            .state
            .slice_runner
            .get(&ctx, &record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SliceStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_missing_record_is_not_found() {
        let harness = TestHarness::new().await;
        let ctx = analyst_ctx();
        let err = harness
            .state
            .slice_runner
            .cancel(&ctx, "dsl_missing")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn latest_returns_the_most_recent_run() {
        let harness = TestHarness::new().await;
        harness.stub.set_slices(sample_distribution());
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let first = harness
            .state
            .slice_runner
            .start(&ctx, &ds, "eq_main", 7)
            .await
            .unwrap();
        let second = harness
            .state
            .slice_runner
            .start(&ctx, &ds, "eq_main", 14)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);

        let latest = harness
            .state
            .slice_runner
            .latest(&ctx, &ds.id, "eq_main")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.lookback_days, 14);
    }
}
