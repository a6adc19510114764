//! # courtstats common library
//!
//! Shared code for the boxscore aggregation service:
//! - Field catalog (canonical boxscore fields, header aliases, classifications)
//! - CSV row normalization
//! - Typed season/game/boxscore/aggregate documents
//! - Document store abstraction (in-memory and SQLite backends)
//! - Configuration loading

pub mod config;
pub mod error;
pub mod fields;
pub mod intervals;
pub mod models;
pub mod normalize;
pub mod paths;
pub mod store;

pub use error::{Error, Result};
pub use models::{FieldValue, NormalizedRow, StatLine};
pub use paths::DocPath;
