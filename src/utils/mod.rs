// src/utils/mod.rs
pub mod hash;
