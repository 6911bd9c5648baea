//! skillgate-core — the multi-level assessment workflow engine.
//!
//! This crate defines the data model, error taxonomy and capability traits,
//! plus question generation, per-skill fan-out, the level state machine,
//! scoring and the resumable orchestrator built on a checkpoint store.

pub mod checkpoint;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod generation;
pub mod intake;
pub mod level;
pub mod model;
pub mod prompts;
pub mod report;
pub mod scoring;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;
