//! Domain layer

pub mod graph;
