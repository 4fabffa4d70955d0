#![doc = include_str!("../README.md")]

mod common;
pub use common::*;
// Public re-export so downstream crates can access `floe` via
// `floe_tonic_core::floe`
pub use floe;
