//! Tests for the graph executor
//!
//! Organized by step type

mod control_tests;
mod helpers;
mod map_reduce_tests;
mod try_tests;
