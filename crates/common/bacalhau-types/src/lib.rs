//! Shared models for the compute-over-data orchestrator.
//!
//! This crate defines the data exchanged between compute and requester nodes:
//! - Jobs and their immutable specifications
//! - Versioned job and execution states, and the lifecycle rules between them
//! - History entries recording every accepted transition
//! - Resource quantities used by admission decisions

pub mod execution;
pub mod history;
pub mod job;
pub mod policy;
pub mod resources;
pub mod state;

pub use execution::{
    ExecutionId, ExecutionState, ExecutionUpdate, RunCommandResult, VerificationResult,
};
pub use history::{HistoryEntry, HistoryEvent};
pub use job::{
    EngineSpec, ExecutionPlan, Job, JobMetadata, JobSpec, Network, NetworkConfig, StorageSpec,
};
pub use policy::{JobSelectionLocality, JobSelectionPolicy};
pub use resources::{ResourceConfig, ResourceParseError, ResourceUsage};
pub use state::{ExecutionStateType, JobState, JobStateType, UnknownStateError};

/// Returns an error message if `id` cannot be used as part of a storage key.
///
/// Identifiers are embedded in `/`-separated keys by the key-value store, so
/// they must be non-empty and free of `/`.
pub fn validate_id(kind: &str, id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} must not be empty", kind));
    }
    if id.contains('/') {
        return Err(format!("{} must not contain '/': {}", kind, id));
    }
    Ok(())
}
