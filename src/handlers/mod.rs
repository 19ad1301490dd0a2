// src/handlers/mod.rs
pub mod admin;
pub mod api;
