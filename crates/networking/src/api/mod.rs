//! High-level order placement wrappers
//!
//! This module provides convenient wrappers around the raw client, adding
//! validation and the protective-order fallback cascade.

mod orders;

pub use orders::*;
