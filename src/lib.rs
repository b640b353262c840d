// src/lib.rs

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod store;
