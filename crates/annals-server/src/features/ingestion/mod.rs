//! Ingestion job submission, status and cancellation

pub mod routes;

pub use routes::{ingestion_routes, SubmitJobRequest};
