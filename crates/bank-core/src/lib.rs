//! # Bank Memory Engine
//!
//! A biomimetic agent memory store: bank-scoped facts and observations,
//! entity resolution over mentions, multi-strategy recall fusion
//! (semantic, full-text, graph, temporal), and a consolidation engine that
//! reconciles raw experience into durable observations.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chrono::Utc;
//! use bank_core::{Bank, BankConfig, Disposition, IdGenerator, Storage};
//! use bank_core::embeddings::{EmbeddingStore, HashEmbedder};
//! use bank_core::retain::{RetainInput, RetainOptions, RetainPipeline};
//! use bank_core::retain::extraction::RuleBasedExtractor;
//!
//! let storage = Arc::new(Storage::new(None)?);
//! let memory_index = Arc::new(EmbeddingStore::new(Arc::new(HashEmbedder::new())));
//! let entity_index = Arc::new(EmbeddingStore::new(Arc::new(HashEmbedder::new())));
//! let pipeline = RetainPipeline::new(
//!     storage.clone(),
//!     memory_index,
//!     entity_index,
//!     Arc::new(RuleBasedExtractor),
//! );
//!
//! let ids = IdGenerator::new();
//! let now = Utc::now();
//! let bank = Bank {
//!     id: ids.next_string(),
//!     name: "agent-1".into(),
//!     description: None,
//!     config: BankConfig::default(),
//!     disposition: Disposition::default(),
//!     mission: None,
//!     created_at: now,
//!     updated_at: now,
//! };
//! storage.create_bank(&bank)?;
//! let output = pipeline.retain(RetainInput {
//!     bank_id: bank.id.clone(),
//!     content: "Peter works at Acme.".into(),
//!     options: RetainOptions::default(),
//! }, &bank)?;
//! # Ok::<(), bank_core::error::BankError>(())
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod async_ops;
pub mod bank;
pub mod consolidation;
pub mod directive;
pub mod document;
pub mod embeddings;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod ids;
pub mod links;
pub mod memory;
pub mod mental_model;
pub mod recall;
pub mod retain;
pub mod sanitize;
pub mod search;
pub mod storage;
pub mod visual;
pub mod working_memory;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use async_ops::{AsyncOperation, AsyncOperationRegistry, CancelFlag, OperationStatus, OperationType, SubmitResult};
pub use bank::{Bank, BankConfig, CreateBankInput, Disposition, ExtractionMode, ReflectBudget};
pub use consolidation::{
    CandidateObservation, ConsolidationAction, ConsolidationActionProvider, ConsolidationEngine, ConsolidationReport,
    EchoReflectCollaborator, ReflectCollaborator, RuleBasedActionProvider,
};
pub use directive::Directive;
pub use document::{Chunk, Document};
pub use embeddings::{cosine_distance, cosine_similarity, EmbeddingProvider, EmbeddingStore, HashEmbedder, EMBEDDING_DIMENSIONS};
pub use entity::Entity;
pub use error::{BankError, Result};
pub use hooks::{ExtensionHooks, NoopHooks, Operation};
pub use ids::IdGenerator;
pub use links::{LinkType, MemoryLink};
pub use memory::{FactType, HistoryEntry, MemoryUnit, TagsMatch};
pub use mental_model::{MentalModel, MentalModelMatch, MentalModelService};
pub use recall::{RecallEngine, RecallHit, RecallMethod, RecallOptions};
pub use retain::{retain_batch, RetainInput, RetainOptions, RetainOutput, RetainPipeline};
pub use storage::{MemoryUnitFilter, Storage, StorageError};
pub use visual::{VisualMemory, VisualMemoryAccess, VisualMemoryHit, VisualMemoryService, VisualScope};
pub use working_memory::WorkingMemory;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        Bank, BankConfig, BankError, CreateBankInput, Disposition, Entity, FactType, MemoryLink, MemoryUnit,
        RecallEngine, RecallOptions, Result, RetainInput, RetainOptions, RetainPipeline, Storage, StorageError,
        TagsMatch,
    };
    pub use crate::consolidation::{ConsolidationEngine, ConsolidationReport};
    pub use crate::embeddings::{EmbeddingProvider, EmbeddingStore, HashEmbedder};
}
