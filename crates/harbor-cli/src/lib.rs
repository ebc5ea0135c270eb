//! Harbor route planning CLI helpers.

pub mod config;
pub mod harbor;
