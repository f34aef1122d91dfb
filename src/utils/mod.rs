//! Utility functions and helpers

pub mod parallel;

pub use parallel::{try_for_each_mut, try_map};
