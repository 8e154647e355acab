pub mod audit;
pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod messaging;
pub mod middleware;
pub mod policy;
pub mod routes;
pub mod state;
pub mod tenancy;
pub mod types;
pub mod workflows;

pub use routes::app;
pub use state::AppState;
