//! Event CRUD and search

pub mod routes;


pub use routes::{events_routes, EventsState};
