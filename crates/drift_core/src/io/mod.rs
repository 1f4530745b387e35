//! Reading configuration documents and writing NDJSON output.

pub mod config;
pub mod frame;
