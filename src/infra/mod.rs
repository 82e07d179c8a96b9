//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod embeddings;
pub mod error;
pub mod http;
pub mod telemetry;
pub mod vectors;
