//! Core data models for the harvester.

mod catalog;
mod tags;

pub use catalog::*;
pub use tags::*;
