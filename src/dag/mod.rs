//! Dependency-graph construction and topological ordering.
//!
//! The graph is built once per feature from the planner's workstream
//! descriptors, validated for missing and circular dependencies up front,
//! and then consulted by the orchestrator for the execution order. No
//! execution begins until validation has passed.

pub mod builder;

pub use builder::{DependencyGraph, GraphNode};
