//! Test utilities: an in-memory application state, a controllable stub
//! warehouse integration, and request-context fixtures. Used by unit tests
//! and by the HTTP-level tests under `tests/`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::{generate_jwt, Claims};
use crate::context::{ReqContext, Role};
use crate::integrations::{
    IntegrationError, IntegrationFactory, TestQueryRun, WarehouseIntegration,
};
use crate::jobs::MemoryJobQueue;
use crate::models::datasource::{
    ConnectionParams, DataSource, DataSourceSettings, DataSourceType, ExposureQuery,
    MixpanelParams, PostgresParams,
};
use crate::models::dimension_slices::DimensionSliceDistribution;
use crate::models::fact_table::{AutoFactTableToCreate, ColumnInfo, FactTable};
use crate::state::AppState;
use crate::store::memory::MemoryStore;

pub const TEST_ORG: &str = "org_1";

#[derive(Debug, Clone)]
pub enum StubBehavior {
    Normal,
    FailConnection(String),
    FailQueries(String),
    /// Queries never resolve; used to exercise cancellation.
    HangQueries,
    /// Queries block until the gate is notified, then succeed. Lets a test
    /// interleave store writes with an in-flight query deterministically.
    GateQueries(Arc<tokio::sync::Notify>),
}

#[derive(Debug)]
struct StubState {
    behavior: StubBehavior,
    slices: Vec<DimensionSliceDistribution>,
    columns: Vec<ColumnInfo>,
    candidates: Vec<AutoFactTableToCreate>,
    test_rows: Vec<Value>,
}

/// Shared control handle for every integration the stub factory hands out.
pub struct StubWarehouse {
    state: Mutex<StubState>,
}

impl StubWarehouse {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StubState {
                behavior: StubBehavior::Normal,
                slices: vec![],
                columns: vec![],
                candidates: vec![],
                test_rows: vec![],
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().expect("stub state poisoned")
    }

    pub fn set_behavior(&self, behavior: StubBehavior) {
        self.lock().behavior = behavior;
    }

    pub fn set_slices(&self, slices: Vec<DimensionSliceDistribution>) {
        self.lock().slices = slices;
    }

    pub fn set_columns(&self, columns: Vec<ColumnInfo>) {
        self.lock().columns = columns;
    }

    pub fn set_candidates(&self, candidates: Vec<AutoFactTableToCreate>) {
        self.lock().candidates = candidates;
    }

    pub fn set_test_rows(&self, rows: Vec<Value>) {
        self.lock().test_rows = rows;
    }
}

pub struct StubIntegration {
    datasource_type: DataSourceType,
    warehouse: Arc<StubWarehouse>,
}

impl StubIntegration {
    fn behavior(&self) -> StubBehavior {
        self.warehouse.lock().behavior.clone()
    }

    async fn gate_queries(&self) -> Result<(), IntegrationError> {
        match self.behavior() {
            StubBehavior::FailQueries(msg) => Err(IntegrationError::Query(msg)),
            StubBehavior::HangQueries => {
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved")
            }
            StubBehavior::GateQueries(gate) => {
                gate.notified().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl WarehouseIntegration for StubIntegration {
    fn datasource_type(&self) -> DataSourceType {
        self.datasource_type
    }

    fn supports_schema_queries(&self) -> bool {
        !matches!(
            self.datasource_type,
            DataSourceType::Mixpanel | DataSourceType::GoogleAnalytics
        )
    }

    fn supports_auto_fact_tables(&self) -> bool {
        self.supports_schema_queries()
    }

    async fn test_connection(&self) -> Result<(), IntegrationError> {
        match self.behavior() {
            StubBehavior::FailConnection(msg) => Err(IntegrationError::Connection(msg)),
            _ => Ok(()),
        }
    }

    async fn run_test_query(&self, _sql: &str) -> Result<TestQueryRun, IntegrationError> {
        self.gate_queries().await?;
        Ok(TestQueryRun {
            results: self.warehouse.lock().test_rows.clone(),
            duration_ms: 5,
        })
    }

    async fn run_dimension_slices_query(
        &self,
        _exposure_query: &ExposureQuery,
        _lookback_days: u32,
    ) -> Result<Vec<DimensionSliceDistribution>, IntegrationError> {
        self.gate_queries().await?;
        Ok(self.warehouse.lock().slices.clone())
    }

    async fn infer_columns(&self, _sql: &str) -> Result<Vec<ColumnInfo>, IntegrationError> {
        self.gate_queries().await?;
        Ok(self.warehouse.lock().columns.clone())
    }

    async fn propose_auto_fact_tables(
        &self,
        _schema: &str,
        existing: &[FactTable],
    ) -> Result<Vec<AutoFactTableToCreate>, IntegrationError> {
        self.gate_queries().await?;
        let mut candidates = self.warehouse.lock().candidates.clone();
        for candidate in &mut candidates {
            candidate.already_exists = existing
                .iter()
                .any(|t| t.event_name == candidate.event_name || t.name == candidate.name);
        }
        Ok(candidates)
    }
}

pub struct StubIntegrationFactory {
    warehouse: Arc<StubWarehouse>,
}

impl IntegrationFactory for StubIntegrationFactory {
    fn build(
        &self,
        datasource_type: DataSourceType,
        _params: &ConnectionParams,
    ) -> Result<Box<dyn WarehouseIntegration>, IntegrationError> {
        Ok(Box::new(StubIntegration {
            datasource_type,
            warehouse: self.warehouse.clone(),
        }))
    }
}

/// In-memory application wired to the stub warehouse and a recording queue.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub stub: Arc<StubWarehouse>,
    pub state: AppState,
}

impl TestHarness {
    pub async fn new() -> Self {
        let store = MemoryStore::new();
        let queue = Arc::new(MemoryJobQueue::new());
        let stub = StubWarehouse::new();
        let factory = Arc::new(StubIntegrationFactory {
            warehouse: stub.clone(),
        });
        let state = AppState::new(store.stores(), queue.clone(), factory);
        Self {
            store,
            queue,
            stub,
            state,
        }
    }

    pub async fn seed_datasource(&self, ds: DataSource) -> DataSource {
        self.state
            .stores
            .datasources
            .insert(&ds)
            .await
            .expect("seeding data source");
        ds
    }

    /// The full HTTP router over this harness's state.
    pub fn app(&self) -> axum::Router {
        crate::handlers::router(self.state.clone())
    }
}

pub fn ctx_with(role: Role, projects: &[&str]) -> ReqContext {
    ReqContext {
        org: TEST_ORG.to_string(),
        user_id: "u_tester".to_string(),
        user_name: "tester".to_string(),
        role,
        projects: projects.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn analyst_ctx() -> ReqContext {
    ctx_with(Role::Analyst, &[])
}

/// Bearer token for a context, signed with the development secret.
pub fn bearer_token(ctx: &ReqContext) -> String {
    let claims = Claims::new(
        ctx.org.clone(),
        ctx.user_id.clone(),
        ctx.user_name.clone(),
        ctx.role,
        ctx.projects.clone(),
    );
    format!("Bearer {}", generate_jwt(claims).expect("test jwt"))
}

/// A Postgres data source with two exposure queries, mirroring a typical
/// event-warehouse setup.
pub fn postgres_datasource() -> DataSource {
    DataSource::new(
        TEST_ORG.to_string(),
        "Main warehouse".to_string(),
        "Production events".to_string(),
        DataSourceType::Postgres,
        ConnectionParams::Postgres(PostgresParams {
            host: "db.internal".to_string(),
            port: 5432,
            user: "app".to_string(),
            password: "hunter2".to_string(),
            database: "events".to_string(),
            ssl: false,
        }),
        DataSourceSettings {
            exposure_queries: vec![
                ExposureQuery {
                    id: "eq_main".to_string(),
                    name: "Logged-in users".to_string(),
                    description: String::new(),
                    query: "SELECT user_id, timestamp, experiment_id, variation_id, \
                            country, browser FROM experiment_viewed"
                        .to_string(),
                    user_id_type: "user_id".to_string(),
                    dimensions: vec!["country".to_string(), "browser".to_string()],
                },
                ExposureQuery {
                    id: "eq_anonymous".to_string(),
                    name: "Anonymous visitors".to_string(),
                    description: String::new(),
                    query: "SELECT anonymous_id, timestamp, experiment_id, variation_id \
                            FROM experiment_viewed"
                        .to_string(),
                    user_id_type: "anonymous_id".to_string(),
                    dimensions: vec![],
                },
            ],
            events: None,
            information_schema_id: None,
        },
        vec![],
    )
}

pub fn mixpanel_datasource() -> DataSource {
    DataSource::new(
        TEST_ORG.to_string(),
        "Product analytics".to_string(),
        String::new(),
        DataSourceType::Mixpanel,
        ConnectionParams::Mixpanel(MixpanelParams {
            api_secret: "mp-secret".to_string(),
            project_id: None,
        }),
        DataSourceSettings::default(),
        vec![],
    )
}
