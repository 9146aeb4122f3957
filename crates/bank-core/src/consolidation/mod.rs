//! Consolidation Engine
//!
//! Reconciles unconsolidated `experience`/`world` memories against
//! existing observations (create/update/merge/skip), then fans out
//! mental-model refreshes under a tag isolation invariant.

pub mod phases;
pub mod refresh;

pub use phases::{
    CandidateObservation, ConsolidationAction, ConsolidationActionProvider, ConsolidationEngine,
    ConsolidationReport, RuleBasedActionProvider, DEFAULT_BATCH_SIZE,
};
pub use refresh::{refresh_one, select_models_to_refresh, EchoReflectCollaborator, ReflectCollaborator};
