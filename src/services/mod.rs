// src/services/mod.rs
pub mod cache;
pub mod changelog;
pub mod health;
pub mod history;
pub mod metrics;
pub mod presence;
pub mod registry;
pub mod trend;
