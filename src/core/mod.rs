//! Core domain models for the build graph.
//!
//! This module contains the task definitions and the registry that holds
//! them as a composition DAG.

pub mod dag;
pub mod task;

pub use dag::TaskRegistry;
pub use task::{Banner, BuildMode, Stage, Step, TaskBody, TaskDef, TaskOutcome};
