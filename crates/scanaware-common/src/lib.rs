//! # scanaware-common
//!
//! Shared types, error definitions, settings, and constants used across
//! the scanaware workspace.
//!
//! This crate is the leaf of the host-side dependency graph: it depends on
//! no other internal crate and provides the primitives the scanner
//! controller, the aggregation job, and the CLI build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
