//! Infrastructure layer
//!
//! Concrete stores behind the domain traits.

pub mod graph;
pub mod vector;
