pub mod datasource;
pub mod dimension_slices;
pub mod fact_table;
pub mod metric;
pub mod organization;
pub mod query;

use uuid::Uuid;

/// Prefixed document id, e.g. `ds_4f9a…` for data sources.
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}
