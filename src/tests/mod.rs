//! Integration testing module
//!
//! End-to-end tests for the converter:
//! - Successful conversions and the properties of their output
//! - Failure paths and their status codes
//! - Resource accounting on every path

pub mod fixtures;
