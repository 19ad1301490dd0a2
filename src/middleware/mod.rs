// src/middleware/mod.rs
pub mod metrics;
pub mod rate_limit;
