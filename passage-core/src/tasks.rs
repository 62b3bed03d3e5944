//! Claimable tasks.
//!
//! Each claim is one sponsored signature. A completion is written only after
//! the signature succeeds, and at most once per (identity, task).

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PassageError;
use crate::provider::{Signer, SigningPayload};
use crate::storage::LedgerStore;
use crate::types::{ClaimOutcome, Identity, TaskCompletion, TaskStatus};

/// A task users can claim once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Stable identifier
    pub id: String,
    /// Human label
    pub label: String,
    /// Message template; `{identity}`, `{task}` and `{label}` are substituted
    pub payload_template: String,
    /// Points credited on completion
    pub points: u64,
}

impl TaskDefinition {
    /// Render the message signed for `identity`.
    pub fn render_payload(&self, identity: &Identity) -> String {
        self.payload_template
            .replace("{identity}", identity.as_str())
            .replace("{task}", &self.id)
            .replace("{label}", &self.label)
    }
}

/// Ordered set of task definitions.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalog {
    tasks: Vec<TaskDefinition>,
}

impl TaskCatalog {
    /// Build a catalog; later duplicates of an id are dropped.
    pub fn new(tasks: impl IntoIterator<Item = TaskDefinition>) -> Self {
        let mut unique: Vec<TaskDefinition> = Vec::new();
        for task in tasks {
            if unique.iter().any(|t| t.id == task.id) {
                warn!(task_id = %task.id, "Duplicate task id in catalog, keeping the first");
                continue;
            }
            unique.push(task);
        }
        Self { tasks: unique }
    }

    pub fn get(&self, task_id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.iter()
    }

    /// Points for a task id; zero for ids no longer in the catalog.
    pub fn points_for(&self, task_id: &str) -> u64 {
        self.get(task_id).map(|t| t.points).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Removes the in-flight marker when a claim finishes or is dropped.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<(Identity, String), ()>,
    key: (Identity, String),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

/// Claims tasks through the sponsored signer.
pub struct TaskEngine {
    catalog: Arc<TaskCatalog>,
    store: Arc<dyn LedgerStore>,
    signer: Arc<dyn Signer>,
    /// Claims awaiting their signature
    in_flight: DashMap<(Identity, String), ()>,
}

impl TaskEngine {
    pub fn new(catalog: Arc<TaskCatalog>, store: Arc<dyn LedgerStore>, signer: Arc<dyn Signer>) -> Self {
        Self {
            catalog,
            store,
            signer,
            in_flight: DashMap::new(),
        }
    }

    /// Claim `task_id` for `identity`.
    ///
    /// Returns `AlreadyClaimed` without signing when a completion exists.
    /// Signing failures come back as [`PassageError::ClaimFailed`] and leave
    /// the task unclaimed.
    pub async fn claim(&self, identity: &Identity, task_id: &str) -> Result<ClaimOutcome, PassageError> {
        let task = self
            .catalog
            .get(task_id)
            .ok_or_else(|| PassageError::UnknownTask(task_id.to_string()))?;

        if self.store.completion(identity, task_id)?.is_some() {
            debug!(identity = %identity, task_id, "Task already claimed");
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        let key = (identity.clone(), task_id.to_string());
        if self.in_flight.insert(key.clone(), ()).is_some() {
            debug!(identity = %identity, task_id, "Claim already awaiting signature");
            return Ok(ClaimOutcome::InProgress);
        }
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            key,
        };

        let payload = SigningPayload::new(identity.clone(), task_id, task.render_payload(identity));
        let signature = match self.signer.sign(payload).await {
            Ok(signature) => signature,
            Err(e) => {
                warn!(identity = %identity, task_id, error = %e, "Task signature failed");
                return Err(PassageError::ClaimFailed(e));
            }
        };

        let completion = TaskCompletion {
            identity: identity.clone(),
            task_id: task_id.to_string(),
            signature: signature.signature,
            completed_at: Utc::now(),
        };

        // Re-checked by the store: another session may have recorded it meanwhile.
        if !self.store.insert_completion(&completion)? {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }

        info!(identity = %identity, task_id, points = task.points, "Task claimed");
        Ok(ClaimOutcome::Claimed { completion })
    }

    /// Claim status of every catalog task for `identity`.
    pub fn tasks_for(&self, identity: &Identity) -> Result<Vec<TaskStatus>, PassageError> {
        let completions = self.store.completions_for(identity)?;
        Ok(self
            .catalog
            .iter()
            .map(|task| TaskStatus {
                task_id: task.id.clone(),
                label: task.label.clone(),
                points: task.points,
                completed: completions.iter().any(|c| c.task_id == task.id),
            })
            .collect())
    }
}
