pub mod applier;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod models;
pub mod paperless;
pub mod pipeline;
pub mod repository;
pub mod routes;
pub mod schema;
pub mod state;
pub mod workers;

pub use workers::QueueManager;
