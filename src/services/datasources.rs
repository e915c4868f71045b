//! Mutation orchestrator for the data-source lifecycle.
//!
//! Every mutating endpoint follows a fixed, ordered protocol: authorization,
//! then dependency/validation checks, then the mutation, then any cascading
//! cleanup. Each cascade step is its own function so the order reads as a
//! contract and a failure is attributable to one step.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::context::ReqContext;
use crate::error::ApiError;
use crate::integrations::oauth::GoogleOauthClient;
use crate::jobs::Job;
use crate::models::datasource::{
    ConnectionParams, DataSource, DataSourceSettings, DataSourceType, ExposureQueryUpdates,
};
use crate::models::metric::AutoMetricToCreate;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDataSourceRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub datasource_type: DataSourceType,
    pub params: ConnectionParams,
    #[serde(default)]
    pub settings: DataSourceSettings,
    #[serde(default)]
    pub projects: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDataSourceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub datasource_type: Option<DataSourceType>,
    /// Partial parameter object, merged field-by-field over stored params.
    pub params: Option<Map<String, Value>>,
    pub settings: Option<DataSourceSettings>,
    pub projects: Option<Vec<String>>,
    pub metrics_to_create: Option<Vec<AutoMetricToCreate>>,
}

/// Create: authorize → default settings under caller values → persist.
pub async fn create_datasource(
    state: &AppState,
    ctx: &ReqContext,
    req: CreateDataSourceRequest,
) -> Result<String, ApiError> {
    ctx.check_create_datasource(&req.projects)?;

    if req.params.datasource_type() != req.datasource_type {
        return Err(ApiError::validation_error(format!(
            "Connection parameters are for {} but the data source type is {}",
            req.params.datasource_type(),
            req.datasource_type
        )));
    }

    let ds = DataSource::new(
        ctx.org.clone(),
        req.name,
        req.description,
        req.datasource_type,
        req.params,
        req.settings,
        req.projects,
    );

    state
        .stores
        .datasources
        .insert(&ds)
        .await
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    Ok(ds.id)
}

/// Update: resolve → authorize (settings, then params, then new projects) →
/// immutability check → side jobs → merge-and-test params → persist.
pub async fn update_datasource(
    state: &AppState,
    ctx: &ReqContext,
    id: &str,
    req: UpdateDataSourceRequest,
) -> Result<(), ApiError> {
    let ds = state
        .stores
        .datasources
        .get(&ctx.org, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Data source {} not found", id)))?;

    ctx.check_update_datasource_settings(&ds)?;
    if req.params.is_some() {
        ctx.check_update_datasource_params(&ds)?;
    }
    if let Some(projects) = &req.projects {
        // Authorize against the new project set so a caller cannot move the
        // resource into projects they do not have access to
        let mut probe = ds.clone();
        probe.projects = projects.clone();
        ctx.check_update_datasource_settings(&probe)?;
    }

    if let Some(new_type) = req.datasource_type {
        if new_type != ds.datasource_type {
            return Err(ApiError::bad_request(
                "Cannot change the type of an existing data source. \
                 Create a new data source instead.",
            ));
        }
    }

    if let Some(metrics) = req.metrics_to_create {
        if !metrics.is_empty() {
            state
                .queue
                .enqueue(Job::CreateAutoMetrics {
                    organization: ctx.org.clone(),
                    datasource_id: ds.id.clone(),
                    metrics,
                    owner: ctx.user_id.clone(),
                })
                .await?;
        }
    }

    let mut updated = ds.clone();
    if let Some(name) = req.name {
        updated.name = name;
    }
    if let Some(description) = req.description {
        updated.description = description;
    }
    if let Some(settings) = req.settings {
        updated.settings = settings;
    }
    if let Some(projects) = req.projects {
        updated.projects = projects;
    }

    if let Some(patch) = req.params {
        updated.params = merge_and_test_params(state, &ds, patch).await?;
    }

    updated.date_updated = Utc::now();
    state.stores.datasources.update(&updated).await?;
    Ok(())
}

/// Merge a partial parameter object into the stored params and prove the
/// result with a live connection test. Any failure aborts the whole update
/// before anything is persisted.
async fn merge_and_test_params(
    state: &AppState,
    ds: &DataSource,
    mut patch: Map<String, Value>,
) -> Result<ConnectionParams, ApiError> {
    // Google Analytics connections arrive with a consent-flow code in the
    // refresh token slot; exchange it for a durable token before storing
    if ds.datasource_type == DataSourceType::GoogleAnalytics {
        if let Some(Value::String(code)) = patch.get("refreshToken") {
            let token = GoogleOauthClient::new()
                .exchange_for_refresh_token(code)
                .await
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            patch.insert("refreshToken".to_string(), Value::String(token));
        }
    }

    let merged = ds
        .params
        .merged_with(&patch)
        .map_err(ApiError::validation_error)?;

    let integration = state
        .integrations
        .build(ds.datasource_type, &merged)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    integration
        .test_connection()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    Ok(merged)
}

/// Delete: resolve → authorize → default-datasource guard → dependency
/// checks in fixed order (metrics, segments, dimensions) → delete →
/// best-effort information-schema cleanup.
pub async fn delete_datasource(
    state: &AppState,
    ctx: &ReqContext,
    id: &str,
) -> Result<(), ApiError> {
    let ds = state
        .stores
        .datasources
        .get(&ctx.org, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Data source {} not found", id)))?;

    ctx.check_delete_datasource(&ds)?;

    check_not_default_datasource(state, ctx, &ds).await?;
    check_no_metrics(state, ctx, &ds).await?;
    check_no_segments(state, ctx, &ds).await?;
    check_no_dimensions(state, ctx, &ds).await?;

    state.stores.datasources.delete(&ctx.org, id).await?;

    cleanup_information_schema(state, ctx, &ds).await;
    Ok(())
}

async fn check_not_default_datasource(
    state: &AppState,
    ctx: &ReqContext,
    ds: &DataSource,
) -> Result<(), ApiError> {
    let org = state.stores.organizations.get(&ctx.org).await?;
    if let Some(org) = org {
        if org.settings.default_data_source.as_deref() == Some(ds.id.as_str()) {
            return Err(ApiError::bad_request(
                "Cannot delete the organization's default data source. \
                 Change the default data source in your organization settings first.",
            ));
        }
    }
    Ok(())
}

async fn check_no_metrics(
    state: &AppState,
    ctx: &ReqContext,
    ds: &DataSource,
) -> Result<(), ApiError> {
    let count = state
        .stores
        .metrics
        .count_for_datasource(&ctx.org, &ds.id)
        .await?;
    if count > 0 {
        return Err(ApiError::bad_request(
            "Cannot delete a data source that metrics are using. \
             Delete or reassign those metrics first.",
        ));
    }
    Ok(())
}

async fn check_no_segments(
    state: &AppState,
    ctx: &ReqContext,
    ds: &DataSource,
) -> Result<(), ApiError> {
    let count = state
        .stores
        .segments
        .count_for_datasource(&ctx.org, &ds.id)
        .await?;
    if count > 0 {
        return Err(ApiError::bad_request(
            "Cannot delete a data source that segments are using. \
             Delete or reassign those segments first.",
        ));
    }
    Ok(())
}

async fn check_no_dimensions(
    state: &AppState,
    ctx: &ReqContext,
    ds: &DataSource,
) -> Result<(), ApiError> {
    let count = state
        .stores
        .dimensions
        .count_for_datasource(&ctx.org, &ds.id)
        .await?;
    if count > 0 {
        return Err(ApiError::bad_request(
            "Cannot delete a data source that dimensions are using. \
             Delete or reassign those dimensions first.",
        ));
    }
    Ok(())
}

/// Drop the cached information-schema snapshot and its table-metadata rows.
/// Best-effort: the data source is already gone, so failures are only logged.
async fn cleanup_information_schema(state: &AppState, ctx: &ReqContext, ds: &DataSource) {
    let Some(information_schema_id) = &ds.settings.information_schema_id else {
        return;
    };
    if let Err(e) = state
        .stores
        .information_schemas
        .delete_table_data(&ctx.org, information_schema_id)
        .await
    {
        tracing::warn!(
            datasource = %ds.id,
            "failed to delete information schema table data: {}",
            e
        );
    }
    if let Err(e) = state
        .stores
        .information_schemas
        .delete(&ctx.org, information_schema_id)
        .await
    {
        tracing::warn!(
            datasource = %ds.id,
            "failed to delete information schema: {}",
            e
        );
    }
}

/// Shallow-merge partial fields over one exposure query, leaving every other
/// entry and the list order untouched, then persist the whole settings.
pub async fn update_exposure_query(
    state: &AppState,
    ctx: &ReqContext,
    datasource_id: &str,
    exposure_query_id: &str,
    updates: ExposureQueryUpdates,
) -> Result<(), ApiError> {
    let mut ds = state
        .stores
        .datasources
        .get(&ctx.org, datasource_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Data source {} not found", datasource_id)))?;

    ctx.check_update_datasource_settings(&ds)?;

    let query = ds
        .settings
        .exposure_queries
        .iter_mut()
        .find(|q| q.id == exposure_query_id)
        .ok_or_else(|| {
            ApiError::not_found(format!("Exposure query {} not found", exposure_query_id))
        })?;
    query.apply(&updates);

    ds.date_updated = Utc::now();
    state.stores.datasources.update(&ds).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use crate::jobs::Job;
    use crate::models::metric::{Dimension, Metric, Segment};
    use crate::models::organization::{OrgSettings, Organization};
    use crate::testing::{
        analyst_ctx, ctx_with, postgres_datasource, StubBehavior, TestHarness,
    };
    use serde_json::json;

    fn admin_ctx() -> ReqContext {
        ctx_with(Role::Admin, &[])
    }

    #[tokio::test]
    async fn delete_is_blocked_by_dependents_in_fixed_order() {
        let harness = TestHarness::new().await;
        let ctx = admin_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        harness
            .store
            .seed_metric(Metric {
                id: "met_1".into(),
                organization: ctx.org.clone(),
                datasource: ds.id.clone(),
                name: "signups".into(),
            })
            .await;
        harness
            .store
            .seed_segment(Segment {
                id: "seg_1".into(),
                organization: ctx.org.clone(),
                datasource: ds.id.clone(),
                name: "mobile".into(),
            })
            .await;
        harness
            .store
            .seed_dimension(Dimension {
                id: "dim_1".into(),
                organization: ctx.org.clone(),
                datasource: ds.id.clone(),
                name: "country".into(),
            })
            .await;

        // All three dependents exist: the metrics check fires first
        let err = delete_datasource(&harness.state, &ctx, &ds.id).await.unwrap_err();
        assert!(err.message().contains("metrics"));

        // Record is intact after a blocked delete
        assert!(harness
            .state
            .stores
            .datasources
            .get(&ctx.org, &ds.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn delete_succeeds_once_dependents_are_gone() {
        let harness = TestHarness::new().await;
        let ctx = admin_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        delete_datasource(&harness.state, &ctx, &ds.id).await.unwrap();
        assert!(harness
            .state
            .stores
            .datasources
            .get(&ctx.org, &ds.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_rejects_the_default_datasource() {
        let harness = TestHarness::new().await;
        let ctx = admin_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;
        harness
            .store
            .seed_organization(Organization {
                id: ctx.org.clone(),
                name: "Acme".into(),
                settings: OrgSettings {
                    default_data_source: Some(ds.id.clone()),
                },
            })
            .await;

        let err = delete_datasource(&harness.state, &ctx, &ds.id).await.unwrap_err();
        assert!(err.message().contains("default data source"));
        assert!(harness
            .state
            .stores
            .datasources
            .get(&ctx.org, &ds.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn delete_cleans_up_information_schema_snapshot() {
        let harness = TestHarness::new().await;
        let ctx = admin_ctx();
        let mut ds = postgres_datasource();
        ds.settings.information_schema_id = Some("is_1".into());
        let ds = harness.seed_datasource(ds).await;
        harness.store.seed_information_schema("is_1").await;

        delete_datasource(&harness.state, &ctx, &ds.id).await.unwrap();
        assert!(!harness.store.information_schema_exists("is_1").await);
    }

    #[tokio::test]
    async fn update_rejects_type_changes() {
        let harness = TestHarness::new().await;
        let ctx = admin_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let req = UpdateDataSourceRequest {
            datasource_type: Some(DataSourceType::BigQuery),
            name: Some("renamed".into()),
            ..Default::default()
        };
        let err = update_datasource(&harness.state, &ctx, &ds.id, req).await.unwrap_err();
        assert!(err.message().contains("Cannot change the type"));

        // No side effects applied: the record still has its original name
        let stored = harness
            .state
            .stores
            .datasources
            .get(&ctx.org, &ds.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, ds.name);
    }

    #[tokio::test]
    async fn update_authorizes_against_the_new_project_set() {
        let harness = TestHarness::new().await;
        let scoped = ctx_with(Role::Admin, &["checkout"]);
        let mut ds = postgres_datasource();
        ds.projects = vec!["checkout".into()];
        let ds = harness.seed_datasource(ds).await;

        // Moving the data source into a project outside the caller's grants
        // fails even though the caller can access the original project
        let req = UpdateDataSourceRequest {
            projects: Some(vec!["growth".into()]),
            ..Default::default()
        };
        let err = update_datasource(&harness.state, &scoped, &ds.id, req).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        let req = UpdateDataSourceRequest {
            projects: Some(vec!["checkout".into()]),
            ..Default::default()
        };
        update_datasource(&harness.state, &scoped, &ds.id, req).await.unwrap();
    }

    #[tokio::test]
    async fn params_update_requires_the_higher_capability() {
        let harness = TestHarness::new().await;
        let analyst = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let req = UpdateDataSourceRequest {
            params: json!({ "host": "replica.internal" }).as_object().cloned(),
            ..Default::default()
        };
        let err = update_datasource(&harness.state, &analyst, &ds.id, req).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        // The same analyst can still update plain settings
        let req = UpdateDataSourceRequest {
            name: Some("events warehouse".into()),
            ..Default::default()
        };
        update_datasource(&harness.state, &analyst, &ds.id, req).await.unwrap();
    }

    #[tokio::test]
    async fn failed_connection_test_aborts_the_whole_update() {
        let harness = TestHarness::new().await;
        harness
            .stub
            .set_behavior(StubBehavior::FailConnection("bad credentials".into()));
        let ctx = admin_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let req = UpdateDataSourceRequest {
            name: Some("renamed".into()),
            params: json!({ "password": "wrong" }).as_object().cloned(),
            ..Default::default()
        };
        let err = update_datasource(&harness.state, &ctx, &ds.id, req).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.message().contains("bad credentials"));

        // All-or-nothing: the name change was not persisted either
        let stored = harness
            .state
            .stores
            .datasources
            .get(&ctx.org, &ds.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, ds.name);
    }

    #[tokio::test]
    async fn metrics_to_create_are_enqueued_as_one_job() {
        let harness = TestHarness::new().await;
        let ctx = admin_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let req = UpdateDataSourceRequest {
            metrics_to_create: Some(vec![AutoMetricToCreate {
                name: "Signups".into(),
                metric_type: "binomial".into(),
                sql: None,
                event_name: Some("signup".into()),
            }]),
            ..Default::default()
        };
        update_datasource(&harness.state, &ctx, &ds.id, req).await.unwrap();

        let jobs = harness.queue.enqueued().await;
        assert_eq!(jobs.len(), 1);
        match &jobs[0] {
            Job::CreateAutoMetrics { metrics, owner, .. } => {
                assert_eq!(metrics.len(), 1);
                assert_eq!(owner, &ctx.user_id);
            }
            other => panic!("unexpected job: {:?}", other),
        }
    }

    #[tokio::test]
    async fn exposure_query_update_is_a_partial_merge_preserving_order() {
        let harness = TestHarness::new().await;
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;
        let original = ds.settings.exposure_queries.clone();
        assert!(original.len() >= 2, "fixture needs two exposure queries");

        let updates = ExposureQueryUpdates {
            name: Some("renamed exposure".into()),
            ..Default::default()
        };
        update_exposure_query(&harness.state, &ctx, &ds.id, "eq_main", updates)
            .await
            .unwrap();

        let stored = harness
            .state
            .stores
            .datasources
            .get(&ctx.org, &ds.id)
            .await
            .unwrap()
            .unwrap();
        let queries = &stored.settings.exposure_queries;
        assert_eq!(queries.len(), original.len());
        // Order preserved, only the targeted entry's supplied field changed
        assert_eq!(queries[0].id, "eq_main");
        assert_eq!(queries[0].name, "renamed exposure");
        assert_eq!(queries[0].query, original[0].query);
        assert_eq!(queries[1].id, original[1].id);
        assert_eq!(queries[1].name, original[1].name);
    }

    #[tokio::test]
    async fn exposure_query_update_missing_query_is_not_found() {
        let harness = TestHarness::new().await;
        let ctx = analyst_ctx();
        let ds = harness.seed_datasource(postgres_datasource()).await;

        let err = update_exposure_query(
            &harness.state,
            &ctx,
            &ds.id,
            "eq_missing",
            ExposureQueryUpdates::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn create_rejects_params_for_a_different_type() {
        let harness = TestHarness::new().await;
        let ctx = admin_ctx();
        let base = postgres_datasource();

        let req = CreateDataSourceRequest {
            name: "mismatched".into(),
            description: String::new(),
            datasource_type: DataSourceType::Redshift,
            params: base.params,
            settings: DataSourceSettings::default(),
            projects: vec![],
        };
        let err = create_datasource(&harness.state, &ctx, req).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
