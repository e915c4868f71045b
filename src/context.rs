//! Per-request identity and authorization gate.
//!
//! A `ReqContext` is built once by the auth middleware and passed into every
//! operation. Capability checks live here so that handlers and services call
//! a named check instead of comparing roles inline; every check returns
//! `Err(ApiError::Forbidden)` and callers run it before any mutation.

use serde::{Deserialize, Serialize};

use crate::auth::Claims;
use crate::error::ApiError;
use crate::models::datasource::DataSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    ReadOnly,
    Collaborator,
    Analyst,
    Admin,
}

/// Authenticated request context: acting identity plus project grants.
#[derive(Debug, Clone)]
pub struct ReqContext {
    pub org: String,
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
    /// Project grants for the acting user. Empty means access to every
    /// project in the organization.
    pub projects: Vec<String>,
}

impl From<Claims> for ReqContext {
    fn from(claims: Claims) -> Self {
        Self {
            org: claims.org,
            user_id: claims.user_id,
            user_name: claims.user_name,
            role: claims.role,
            projects: claims.projects,
        }
    }
}

impl ReqContext {
    fn require_role(&self, min: Role, action: &str) -> Result<(), ApiError> {
        if self.role >= min {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "You do not have permission to {}",
                action
            )))
        }
    }

    /// A target project set is covered when the caller has org-wide access or
    /// a grant for every requested project. An empty target set means the
    /// resource is visible org-wide and needs org-wide grants to manage.
    fn covers_projects(&self, target: &[String]) -> bool {
        if self.projects.is_empty() {
            return true;
        }
        if target.is_empty() {
            return false;
        }
        target.iter().all(|p| self.projects.contains(p))
    }

    fn require_projects(&self, target: &[String], action: &str) -> Result<(), ApiError> {
        if self.covers_projects(target) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "You do not have access to all projects required to {}",
                action
            )))
        }
    }

    /// Read filter: a data source with no projects is visible to everyone in
    /// the organization; otherwise the caller needs a grant for at least one
    /// of its projects.
    pub fn can_view_datasource(&self, ds: &DataSource) -> bool {
        if self.projects.is_empty() || ds.projects.is_empty() {
            return true;
        }
        ds.projects.iter().any(|p| self.projects.contains(p))
    }

    pub fn check_create_datasource(&self, projects: &[String]) -> Result<(), ApiError> {
        self.require_role(Role::Admin, "create data sources")?;
        self.require_projects(projects, "create this data source")
    }

    pub fn check_update_datasource_settings(&self, ds: &DataSource) -> Result<(), ApiError> {
        self.require_role(Role::Analyst, "update data source settings")?;
        self.require_projects(&ds.projects, "update this data source")
    }

    /// Connection-parameter changes are a strictly higher privilege than
    /// settings changes.
    pub fn check_update_datasource_params(&self, ds: &DataSource) -> Result<(), ApiError> {
        self.require_role(Role::Admin, "update data source connection settings")?;
        self.require_projects(&ds.projects, "update this data source's connection")
    }

    pub fn check_delete_datasource(&self, ds: &DataSource) -> Result<(), ApiError> {
        self.require_role(Role::Admin, "delete data sources")?;
        self.require_projects(&ds.projects, "delete this data source")
    }

    pub fn check_run_test_queries(&self, ds: &DataSource) -> Result<(), ApiError> {
        self.require_role(Role::Analyst, "run queries")?;
        self.require_projects(&ds.projects, "run queries against this data source")
    }

    pub fn check_run_schema_queries(&self, ds: &DataSource) -> Result<(), ApiError> {
        self.require_role(Role::Analyst, "run schema queries")?;
        self.require_projects(&ds.projects, "introspect this data source")
    }

    pub fn check_create_fact_tables(&self, projects: &[String]) -> Result<(), ApiError> {
        self.require_role(Role::Analyst, "create fact tables")?;
        self.require_projects(projects, "create fact tables in these projects")
    }

    pub fn check_run_dimension_analysis(&self, ds: &DataSource) -> Result<(), ApiError> {
        self.require_role(Role::Analyst, "run dimension analysis")?;
        self.require_projects(&ds.projects, "analyze this data source")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::datasource::{ConnectionParams, DataSource, DataSourceType, PostgresParams};

    fn ctx(role: Role, projects: &[&str]) -> ReqContext {
        ReqContext {
            org: "org_1".into(),
            user_id: "u_1".into(),
            user_name: "tester".into(),
            role,
            projects: projects.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn ds(projects: &[&str]) -> DataSource {
        DataSource::new(
            "org_1".into(),
            "warehouse".into(),
            String::new(),
            DataSourceType::Postgres,
            ConnectionParams::Postgres(PostgresParams {
                host: "localhost".into(),
                port: 5432,
                user: "app".into(),
                password: "secret".into(),
                database: "events".into(),
                ssl: false,
            }),
            Default::default(),
            projects.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn role_ordering_gates_capabilities() {
        let readonly = ctx(Role::ReadOnly, &[]);
        let analyst = ctx(Role::Analyst, &[]);
        let admin = ctx(Role::Admin, &[]);
        let target = ds(&[]);

        assert!(readonly.check_update_datasource_settings(&target).is_err());
        assert!(analyst.check_update_datasource_settings(&target).is_ok());
        assert!(analyst.check_update_datasource_params(&target).is_err());
        assert!(admin.check_update_datasource_params(&target).is_ok());
    }

    #[test]
    fn project_grants_must_cover_the_whole_target_set() {
        let scoped = ctx(Role::Admin, &["checkout"]);
        assert!(scoped.check_create_datasource(&["checkout".into()]).is_ok());
        assert!(scoped
            .check_create_datasource(&["checkout".into(), "growth".into()])
            .is_err());
        // An org-wide data source needs org-wide grants to manage
        assert!(scoped.check_create_datasource(&[]).is_err());
    }

    #[test]
    fn view_filter_is_any_overlap_not_full_coverage() {
        let scoped = ctx(Role::ReadOnly, &["checkout"]);
        assert!(scoped.can_view_datasource(&ds(&["checkout", "growth"])));
        assert!(!scoped.can_view_datasource(&ds(&["growth"])));
        assert!(scoped.can_view_datasource(&ds(&[])));
    }
}
