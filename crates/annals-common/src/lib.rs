//! Annals Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Annals workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the shared `AnnalsError` and `Result` alias
//! - **Time**: timestamp parsing and normalization used by every ingestion format
//! - **Logging**: tracing subscriber setup driven by `LOG_*` environment variables
//!
//! # Example
//!
//! ```no_run
//! use annals_common::time::{minutes_between, parse_timestamp};
//!
//! fn main() -> annals_common::Result<()> {
//!     let start = parse_timestamp("2024-03-01T09:00:00Z")?;
//!     let end = parse_timestamp("2024-03-01T10:30:00+00:00")?;
//!     assert_eq!(minutes_between(start, end), 90.0);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod time;

// Re-export commonly used types
pub use error::{AnnalsError, Result};
