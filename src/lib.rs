pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod integrations;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
pub mod testing;
