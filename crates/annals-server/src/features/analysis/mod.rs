//! Temporal analysis queries

pub mod routes;

pub use routes::analysis_routes;
