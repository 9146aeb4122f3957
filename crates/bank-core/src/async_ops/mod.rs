//! Async Operation Registry
//!
//! Per-process map of `operation_id` to a background task, backed by the
//! `async_operations` table for durability across restarts: a small
//! `Mutex<HashMap<..>>` of cancellation flags sits alongside the durable
//! row, the same in-process-cache-beside-the-database shape `Storage`
//! uses for its reader/writer split. `submit` spawns the caller's task on
//! `tokio::spawn` and drives `pending -> processing -> (completed |
//! failed)` itself as the task resolves.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{truncate_error_message, BankError, Result};
use crate::ids::IdGenerator;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Retain,
    Consolidation,
    RefreshMentalModel,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Retain => "retain",
            OperationType::Consolidation => "consolidation",
            OperationType::RefreshMentalModel => "refresh_mental_model",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "retain" => Some(OperationType::Retain),
            "consolidation" => Some(OperationType::Consolidation),
            "refresh_mental_model" => Some(OperationType::RefreshMentalModel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Processing => "processing",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OperationStatus::Pending),
            "processing" => Some(OperationStatus::Processing),
            "completed" => Some(OperationStatus::Completed),
            "failed" => Some(OperationStatus::Failed),
            _ => None,
        }
    }

    /// The "pending" status filter matches both `pending` and
    /// `processing`.
    pub fn matches_filter(&self, filter: OperationStatus) -> bool {
        if filter == OperationStatus::Pending {
            matches!(self, OperationStatus::Pending | OperationStatus::Processing)
        } else {
            *self == filter
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncOperation {
    pub operation_id: String,
    pub bank_id: String,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub result_metadata: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a `submit` call.
#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub operation_id: String,
    pub deduplicated: bool,
}

/// Cooperative cancellation flag shared between the registry and a
/// running task.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// In-process registry of cancellation flags for operations currently
/// running, layered over the durable `async_operations` table.
pub struct AsyncOperationRegistry {
    storage: Arc<Storage>,
    ids: IdGenerator,
    flags: Arc<Mutex<HashMap<String, CancelFlag>>>,
}

impl AsyncOperationRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            ids: IdGenerator::new(),
            flags: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Submit a new operation and spawn `task` on the tokio runtime. When
    /// `dedupe_by_bank` is set and a `pending` operation of the same
    /// `(bank_id, operation_type)` already exists, returns that operation
    /// instead of creating a new one (and never runs `task`).
    ///
    /// The runner marks the row `processing` before polling `task`, then
    /// `completed` (with `task`'s `Ok` value as `result_metadata`) or
    /// `failed` (with the truncated error message) once it resolves. If
    /// `cancel` fired first, the row is deleted instead and the result is
    /// discarded — `task` is expected to check the passed [`CancelFlag`]
    /// at its own cooperative checkpoints and return `Err(BankError::Cancelled)`
    /// promptly once it observes cancellation.
    pub fn submit<F, Fut>(
        &self,
        bank_id: &str,
        operation_type: OperationType,
        dedupe_by_bank: bool,
        task: F,
    ) -> Result<(SubmitResult, CancelFlag)>
    where
        F: FnOnce(CancelFlag) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<Option<serde_json::Value>, BankError>> + Send + 'static,
    {
        if dedupe_by_bank {
            let existing = self.storage.list_async_operations_by_bank(bank_id)?;
            if let Some(op) = existing
                .into_iter()
                .find(|op| op.operation_type == operation_type && op.status == OperationStatus::Pending)
            {
                let flag = self
                    .flags
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&op.operation_id)
                    .cloned()
                    .unwrap_or_default();
                return Ok((
                    SubmitResult {
                        operation_id: op.operation_id,
                        deduplicated: true,
                    },
                    flag,
                ));
            }
        }

        let now = Utc::now();
        let operation_id = self.ids.next_string();
        let op = AsyncOperation {
            operation_id: operation_id.clone(),
            bank_id: bank_id.to_string(),
            operation_type,
            status: OperationStatus::Pending,
            result_metadata: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.storage.create_async_operation(&op)?;

        let flag = CancelFlag::default();
        self.flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operation_id.clone(), flag.clone());

        let storage = self.storage.clone();
        let flags = self.flags.clone();
        let run_id = operation_id.clone();
        let run_flag = flag.clone();
        tokio::spawn(async move {
            let _ = storage.update_async_operation_status(&run_id, OperationStatus::Processing, None, None, Utc::now());
            let outcome = task(run_flag.clone()).await;
            if run_flag.is_cancelled() {
                let _ = storage.delete_async_operation(&run_id);
            } else {
                match outcome {
                    Ok(metadata) => {
                        let _ = storage.update_async_operation_status(
                            &run_id,
                            OperationStatus::Completed,
                            metadata.as_ref(),
                            None,
                            Utc::now(),
                        );
                    }
                    Err(err) => {
                        let message = truncate_error_message(&err.to_string());
                        let _ = storage.update_async_operation_status(
                            &run_id,
                            OperationStatus::Failed,
                            None,
                            Some(&message),
                            Utc::now(),
                        );
                    }
                }
            }
            flags.lock().unwrap_or_else(|e| e.into_inner()).remove(&run_id);
        });

        Ok((
            SubmitResult {
                operation_id,
                deduplicated: false,
            },
            flag,
        ))
    }

    /// Delete the row and flag the id as cancelled. A running task that
    /// observes the flag at its next cooperative checkpoint must return
    /// without updating status.
    pub fn cancel(&self, operation_id: &str) -> Result<bool> {
        if let Some(flag) = self.flags.lock().unwrap_or_else(|e| e.into_inner()).remove(operation_id) {
            flag.cancel();
        }
        self.storage.delete_async_operation(operation_id).map_err(Into::into)
    }

    pub fn get_status(&self, operation_id: &str) -> Result<Option<AsyncOperation>> {
        self.storage.get_async_operation(operation_id).map_err(Into::into)
    }

    /// List operations for a bank, most recently created first, with an
    /// optional status filter ("pending" matches both pending and
    /// processing) and pagination.
    pub fn list(&self, bank_id: &str, status: Option<OperationStatus>, limit: Option<usize>, offset: usize) -> Result<Vec<AsyncOperation>> {
        let mut ops = self.storage.list_async_operations_by_bank(bank_id)?;
        if let Some(status) = status {
            ops.retain(|op| op.status.matches_filter(status));
        }
        let ops = ops.into_iter().skip(offset);
        Ok(match limit {
            Some(limit) => ops.take(limit).collect(),
            None => ops.collect(),
        })
    }
}
