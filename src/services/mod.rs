pub mod auto_fact_tables;
pub mod datasources;
pub mod dimension_slices;
