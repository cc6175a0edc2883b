//! # Landscape Harvester
//!
//! A catalog-driven harvester for landscape project documentation.
//!
//! ## Architecture
//!
//! - **models**: Taxonomy data structures and tag naming
//! - **catalog**: Taxonomy loading and work extraction
//! - **fetch**: HTTP client with rate limit handling
//! - **classify**: Language routing for harvested content
//! - **output**: File placement and HTML flattening
//! - **archive**: Per-category zip bundling
//! - **ledger**: Dedup and pagination state across runs
//! - **pool**: Bounded concurrent task execution
//! - **harvest**: Document, page, question, and explorer pipelines
//! - **config**: Configuration loading and validation

pub mod archive;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod fetch;
pub mod harvest;
pub mod ledger;
pub mod models;
pub mod output;
pub mod pool;

pub use models::*;
