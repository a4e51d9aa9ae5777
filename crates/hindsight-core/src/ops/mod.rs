//! Operation queue, tracing, and extension hooks.
//!
//! Async operations (`retain`, `consolidation`, `refresh_mental_model`) are
//! persisted rows moving pending -> processing -> completed | failed, with a
//! terminal cancelled state reachable from pending. Workers run on a bounded
//! pool and observe a cancellation flag at every suspension point; a
//! cancelled operation never commits its final write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::{HindsightError, Result};
use crate::storage::{GraphStore, OperationRecord};

// ============================================================================
// TRACING
// ============================================================================

/// Completion event emitted for every core operation
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    /// Operation name, e.g. "retain", "recall", "createBank"
    pub operation: String,
    /// Bank the operation ran against
    pub bank_id: String,
    /// Start time (epoch ms)
    pub started_at: i64,
    /// Wall time in milliseconds
    pub duration_ms: i64,
    /// Operation-specific details
    pub metadata: serde_json::Value,
}

/// Callback receiving trace events
pub type TraceCallback = Arc<dyn Fn(TraceEvent) + Send + Sync>;

// ============================================================================
// EXTENSION HOOKS
// ============================================================================

/// Context handed to extension hooks around each operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Operation name
    pub operation: String,
    /// Bank id
    pub bank_id: String,
    /// Tenant resolved by the `resolve_tenant_id` hook, when configured
    pub tenant_id: Option<String>,
}

/// Optional hooks invoked synchronously around each operation.
///
/// `authorize`/`validate` failures abort the operation with the returned
/// error; `on_complete` failures are logged and swallowed.
#[derive(Clone, Default)]
pub struct ExtensionHooks {
    /// Map a bank id to a tenant id
    pub resolve_tenant_id: Option<Arc<dyn Fn(&str) -> Option<String> + Send + Sync>>,
    /// Reject unauthorized operations
    pub authorize: Option<Arc<dyn Fn(&OperationContext) -> Result<()> + Send + Sync>>,
    /// Reject invalid operations
    pub validate: Option<Arc<dyn Fn(&OperationContext) -> Result<()> + Send + Sync>>,
    /// Observe results after completion
    pub on_complete:
        Option<Arc<dyn Fn(&OperationContext, &serde_json::Value) -> Result<()> + Send + Sync>>,
}

impl ExtensionHooks {
    /// Run the pre-operation hooks, producing the operation context
    pub fn begin(&self, operation: &str, bank_id: &str) -> Result<OperationContext> {
        let tenant_id = self
            .resolve_tenant_id
            .as_ref()
            .and_then(|resolve| resolve(bank_id));
        let ctx = OperationContext {
            operation: operation.to_string(),
            bank_id: bank_id.to_string(),
            tenant_id,
        };
        if let Some(authorize) = &self.authorize {
            authorize(&ctx)?;
        }
        if let Some(validate) = &self.validate {
            validate(&ctx)?;
        }
        Ok(ctx)
    }

    /// Run the post-operation hook; failures are logged, never surfaced
    pub fn complete(&self, ctx: &OperationContext, result: &serde_json::Value) {
        if let Some(on_complete) = &self.on_complete {
            if let Err(e) = on_complete(ctx, result) {
                tracing::warn!("onComplete hook failed for {}: {}", ctx.operation, e);
            }
        }
    }
}

// ============================================================================
// OPERATION QUEUE
// ============================================================================

/// Status of a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting for a worker
    Pending,
    /// A worker picked it up
    Processing,
    /// Finished successfully (terminal)
    Completed,
    /// Finished with an error (terminal)
    Failed,
    /// Cancelled before processing committed (terminal)
    Cancelled,
}

impl OperationStatus {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Processing => "processing",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s {
            "processing" => OperationStatus::Processing,
            "completed" => OperationStatus::Completed,
            "failed" => OperationStatus::Failed,
            "cancelled" => OperationStatus::Cancelled,
            _ => OperationStatus::Pending,
        }
    }
}

/// Handle returned by a submit call
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    /// Operation id (existing id when deduplicated)
    pub operation_id: String,
    /// True when an equivalent pending/processing item already existed
    pub deduplicated: bool,
}

/// Bounded worker-pool queue over the persisted operation table
pub struct OperationQueue {
    store: Arc<GraphStore>,
    limiter: Arc<Semaphore>,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl OperationQueue {
    /// Create a queue with `workers` concurrent slots
    pub fn new(store: Arc<GraphStore>, workers: usize) -> Self {
        Self {
            store,
            limiter: Arc::new(Semaphore::new(workers.max(1))),
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue a work item, deduplicating against live items with the same
    /// (bank, kind, payload) hash.
    pub fn submit(&self, bank_id: &str, kind: &str, payload: &str, now: i64) -> Result<SubmitReceipt> {
        let record = OperationRecord {
            id: Uuid::new_v4().to_string(),
            bank_id: bank_id.to_string(),
            kind: kind.to_string(),
            payload: payload.to_string(),
            dedup_hash: dedup_hash(bank_id, kind, payload),
            status: OperationStatus::Pending.as_str().to_string(),
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        let (operation_id, deduplicated) = self.store.enqueue_operation(&record)?;
        if !deduplicated {
            self.cancel_flag(&operation_id);
        }
        Ok(SubmitReceipt {
            operation_id,
            deduplicated,
        })
    }

    /// The cancellation flag for an operation, created on demand
    pub fn cancel_flag(&self, operation_id: &str) -> Arc<AtomicBool> {
        let mut flags = self.cancel_flags.lock().unwrap_or_else(|e| e.into_inner());
        flags
            .entry(operation_id.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    /// Cancel a pending operation. Processing operations keep running but
    /// observe the flag at their next suspension point and abort without
    /// committing.
    pub fn cancel(&self, operation_id: &str, now: i64) -> Result<bool> {
        self.cancel_flag(operation_id).store(true, Ordering::SeqCst);
        self.store.transition_operation(
            operation_id,
            &[OperationStatus::Pending.as_str()],
            OperationStatus::Cancelled.as_str(),
            None,
            now,
        )
    }

    /// Fetch an operation row
    pub fn get(&self, operation_id: &str) -> Result<Option<OperationRecord>> {
        self.store.get_operation(operation_id)
    }

    /// Pending rows, oldest first (restart resumption)
    pub fn pending(&self) -> Result<Vec<OperationRecord>> {
        self.store.pending_operations()
    }

    /// Claim a pending operation for processing. `false` means cancellation
    /// or another worker won.
    pub fn claim(&self, operation_id: &str, now: i64) -> Result<bool> {
        self.store.transition_operation(
            operation_id,
            &[OperationStatus::Pending.as_str()],
            OperationStatus::Processing.as_str(),
            None,
            now,
        )
    }

    /// Record a terminal state after processing
    pub fn finish(
        &self,
        operation_id: &str,
        status: OperationStatus,
        error: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        let moved = self.store.transition_operation(
            operation_id,
            &[OperationStatus::Processing.as_str()],
            status.as_str(),
            error,
            now,
        )?;
        let mut flags = self.cancel_flags.lock().unwrap_or_else(|e| e.into_inner());
        flags.remove(operation_id);
        Ok(moved)
    }

    /// Acquire a worker slot
    pub async fn acquire_worker(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        self.limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| HindsightError::Cancelled)
    }
}

/// Content hash for submit dedup and decision audit rows
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn dedup_hash(bank_id: &str, kind: &str, payload: &str) -> String {
    content_hash(&[bank_id, kind, payload])
}

// ============================================================================
// TESTS
// ============================================================================
