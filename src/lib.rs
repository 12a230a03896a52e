//! bdforge - Blu-ray main feature analysis and HDR-preserving encoding
//!
//! The binary's config loading and batch discovery, exposed for integration
//! testing. The analysis and execution stages live in the `bf-*` crates.

pub mod batch;
pub mod config;
pub mod observer;
