//! Two-phase fact-table discovery: propose candidates from a tracked-event
//! schema, then commit user-confirmed candidates through the job queue.

use serde::Deserialize;

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::jobs::Job;
use crate::models::fact_table::AutoFactTableToCreate;
use crate::state::AppState;

/// Discovery outcome. Unsupported source types and internal failures are
/// expected, recoverable conditions: they surface as an empty candidate list
/// plus a message, never as an HTTP error.
#[derive(Debug)]
pub struct DiscoveryResult {
    pub candidates: Vec<AutoFactTableToCreate>,
    pub message: Option<String>,
}

impl DiscoveryResult {
    fn soft_failure(message: impl Into<String>) -> Self {
        Self {
            candidates: vec![],
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFactTableRequest {
    pub name: String,
    pub sql: String,
    #[serde(default)]
    pub user_id_types: Vec<String>,
    #[serde(default)]
    pub event_name: Option<String>,
}

/// Propose fact-table candidates from `schema`, annotating each with inferred
/// columns (or a per-candidate inference error) and an already-exists flag.
pub async fn discover(
    state: &AppState,
    ctx: &ReqContext,
    datasource_id: &str,
    schema: &str,
) -> Result<DiscoveryResult, ApiError> {
    let ds = state
        .stores
        .datasources
        .get(&ctx.org, datasource_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Data source {} not found", datasource_id)))?;

    ctx.check_create_fact_tables(&ds.projects)?;
    ctx.check_run_schema_queries(&ds)?;

    let integration = match state.integrations.build(ds.datasource_type, &ds.params) {
        Ok(integration) => integration,
        Err(e) => return Ok(DiscoveryResult::soft_failure(e.to_string())),
    };

    if !integration.supports_auto_fact_tables() {
        return Ok(DiscoveryResult::soft_failure(format!(
            "Automatic fact table discovery is not supported for {} data sources",
            ds.datasource_type
        )));
    }

    let existing = match state
        .stores
        .fact_tables
        .list_for_datasource(&ctx.org, &ds.id)
        .await
    {
        Ok(existing) => existing,
        Err(e) => {
            tracing::error!("failed to list fact tables during discovery: {}", e);
            return Ok(DiscoveryResult::soft_failure(
                "Could not load existing fact tables",
            ));
        }
    };

    let mut candidates = match integration.propose_auto_fact_tables(schema, &existing).await {
        Ok(candidates) => candidates,
        Err(e) => return Ok(DiscoveryResult::soft_failure(e.to_string())),
    };

    // Column inference failures are recorded per candidate; they do not fail
    // the discovery as a whole
    for candidate in candidates.iter_mut().filter(|c| !c.already_exists) {
        match integration.infer_columns(&candidate.sql).await {
            Ok(columns) if columns.is_empty() => {
                candidate.column_error = Some("no columns could be inferred".to_string());
            }
            Ok(columns) => candidate.columns = columns,
            Err(e) => candidate.column_error = Some(e.to_string()),
        }
    }

    Ok(DiscoveryResult {
        candidates,
        message: None,
    })
}

/// Persist confirmed candidates. Column inference runs against the live
/// warehouse per candidate; a zero-column result aborts the whole batch with
/// nothing persisted. On success exactly one background job is enqueued
/// under the acting user.
pub async fn commit(
    state: &AppState,
    ctx: &ReqContext,
    datasource_id: &str,
    fact_tables: Vec<CommitFactTableRequest>,
) -> Result<(), ApiError> {
    let ds = state
        .stores
        .datasources
        .get(&ctx.org, datasource_id)
        .await?
        .ok_or_else(|| {
            ApiError::forbidden(format!("Could not find data source {}", datasource_id))
        })?;

    ctx.check_create_fact_tables(&ds.projects)?;

    let integration = state
        .integrations
        .build(ds.datasource_type, &ds.params)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let mut to_create = Vec::with_capacity(fact_tables.len());
    for ft in fact_tables {
        let columns = integration
            .infer_columns(&ft.sql)
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        if columns.is_empty() {
            return Err(ApiError::bad_request(format!(
                "Could not infer columns for fact table \"{}\"; \
                 no fact tables were created",
                ft.name
            )));
        }
        to_create.push(AutoFactTableToCreate {
            event_name: ft.event_name.unwrap_or_else(|| ft.name.clone()),
            name: ft.name,
            sql: ft.sql,
            user_id_types: ft.user_id_types,
            columns,
            column_error: None,
            already_exists: false,
        });
    }

    state
        .queue
        .enqueue(Job::CreateAutoFactTables {
            organization: ctx.org.clone(),
            datasource_id: ds.id,
            fact_tables: to_create,
            owner: ctx.user_id.clone(),
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fact_table::ColumnInfo;
    use crate::testing::{analyst_ctx, mixpanel_datasource, postgres_datasource, TestHarness};

    fn candidate(name: &str) -> AutoFactTableToCreate {
        AutoFactTableToCreate {
            name: name.into(),
            event_name: name.into(),
            sql: format!("SELECT user_id, received_at AS timestamp FROM events.{}", name),
            user_id_types: vec!["user_id".into()],
            columns: vec![],
            column_error: None,
            already_exists: false,
        }
    }

    #[tokio::test]
    async fn discovery_returns_candidates_with_inferred_columns() {
        let harness = TestHarness::new().await;
        harness.stub.set_candidates(vec![candidate("page_view")]);
        harness.stub.set_columns(vec![ColumnInfo {
            column: "user_id".into(),
            datatype: "text".into(),
        }]);
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let result = discover(&harness.state, &ctx, &ds.id, "events").await.unwrap();
        assert!(result.message.is_none());
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].columns.len(), 1);
    }

    #[tokio::test]
    async fn discovery_soft_fails_for_unsupported_sources() {
        let harness = TestHarness::new().await;
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(mixpanel_datasource()).await;

        let result = discover(&harness.state, &ctx, &ds.id, "events").await.unwrap();
        assert!(result.candidates.is_empty());
        assert!(result
            .message
            .as_deref()
            .unwrap()
            .contains("not supported for mixpanel"));
    }

    #[tokio::test]
    async fn discovery_records_per_candidate_inference_errors() {
        let harness = TestHarness::new().await;
        harness.stub.set_candidates(vec![candidate("page_view")]);
        harness.stub.set_columns(vec![]);
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let result = discover(&harness.state, &ctx, &ds.id, "events").await.unwrap();
        assert!(result.message.is_none());
        assert!(result.candidates[0].column_error.is_some());
    }

    #[tokio::test]
    async fn commit_aborts_the_batch_on_zero_inferred_columns() {
        let harness = TestHarness::new().await;
        harness.stub.set_columns(vec![]);
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let err = commit(
            &harness.state,
            &ctx,
            &ds.id,
            vec![CommitFactTableRequest {
                name: "page_view".into(),
                sql: "SELECT 1".into(),
                user_id_types: vec!["user_id".into()],
                event_name: None,
            }],
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), 400);

        // Nothing was enqueued: zero fact tables get created
        assert!(harness.queue.enqueued().await.is_empty());
    }

    #[tokio::test]
    async fn commit_enqueues_exactly_one_job_for_the_batch() {
        let harness = TestHarness::new().await;
        harness.stub.set_columns(vec![ColumnInfo {
            column: "user_id".into(),
            datatype: "text".into(),
        }]);
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        commit(
            &harness.state,
            &ctx,
            &ds.id,
            vec![
                CommitFactTableRequest {
                    name: "page_view".into(),
                    sql: "SELECT 1".into(),
                    user_id_types: vec!["user_id".into()],
                    event_name: None,
                },
                CommitFactTableRequest {
                    name: "signup".into(),
                    sql: "SELECT 2".into(),
                    user_id_types: vec!["user_id".into()],
                    event_name: Some("signed_up".into()),
                },
            ],
        )
        .await
        .unwrap();

        let jobs = harness.queue.enqueued().await;
        assert_eq!(jobs.len(), 1);
        match &jobs[0] {
            crate::jobs::Job::CreateAutoFactTables {
                fact_tables, owner, ..
            } => {
                assert_eq!(fact_tables.len(), 2);
                assert_eq!(fact_tables[1].event_name, "signed_up");
                assert_eq!(owner, &ctx.user_id);
            }
            other => panic!("unexpected job: {:?}", other),
        }
    }

    #[tokio::test]
    async fn commit_missing_datasource_is_permission_style() {
        let harness = TestHarness::new().await;
        let ctx = analyst_ctx();
        let err = commit(&harness.state, &ctx, "ds_missing", vec![]).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
