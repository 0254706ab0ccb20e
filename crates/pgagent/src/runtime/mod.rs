//! Runtime module: agent lifecycle.

pub mod boot;
