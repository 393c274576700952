//! Remote Task Queue
//! Mission: Drive signed one-shot tasks through a strict delivery lifecycle
//!
//! State machine:
//! pending → delivered → executing → completed | failed, with any
//! pre-terminal state expiring once `expires_at` elapses. Expiry is swept on
//! every poll and result submission, so no background timer is required.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Delivered,
    Executing,
    Completed,
    Failed,
    Expired,
}

impl TaskState {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Expired
        )
    }
}

/// A signed, expiring unit of remote work bound to one (tenant, asset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub tenant_id: String,
    pub asset_id: String,
    pub issued_by: String,
    pub policy_reference: String,
    pub execution_context: String,
    pub interpreter: String,
    pub command_payload: String,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
    pub created_at: DateTime<Utc>,
    pub state: TaskState,
    pub delivered_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Execution outcome reported by the agent, recorded at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub status: String,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub truncated: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    Exists,
    NotFound,
    AgentMismatch,
    AlreadyRecorded,
    Expired,
    InvalidTiming,
}

impl TaskError {
    pub fn code(self) -> &'static str {
        match self {
            TaskError::Exists => "task_exists",
            TaskError::NotFound => "task_not_found",
            TaskError::AgentMismatch => "task_agent_mismatch",
            TaskError::AlreadyRecorded => "task_already_recorded",
            TaskError::Expired => "task_expired",
            TaskError::InvalidTiming => "invalid_result_timing",
        }
    }
}

/// In-memory task queue with per-(tenant, asset) FIFO delivery.
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    results: RwLock<HashMap<String, TaskResult>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, task: Task) -> Result<Task, TaskError> {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.task_id) {
            return Err(TaskError::Exists);
        }
        info!(
            task_id = %task.task_id,
            asset_id = %task.asset_id,
            interpreter = %task.interpreter,
            "task created"
        );
        tasks.insert(task.task_id.clone(), task.clone());
        Ok(task)
    }

    /// Deliver pending tasks for exactly one (tenant, asset) pairing.
    ///
    /// Sweeps expirations first, then marks each returned task delivered so
    /// a task is handed out exactly once, FIFO by creation time.
    pub fn deliver_pending(&self, tenant_id: &str, asset_id: &str) -> Vec<Task> {
        let now = Utc::now();
        let mut tasks = self.tasks.write();
        Self::sweep(&mut tasks, now);

        let mut pending: Vec<&mut Task> = tasks
            .values_mut()
            .filter(|task| {
                task.state == TaskState::Pending
                    && task.tenant_id == tenant_id
                    && task.asset_id == asset_id
            })
            .collect();
        pending.sort_by_key(|task| task.created_at);

        let mut delivered = Vec::with_capacity(pending.len());
        for task in pending {
            task.state = TaskState::Delivered;
            task.delivered_at = Some(now);
            delivered.push(task.clone());
        }
        if !delivered.is_empty() {
            debug!(tenant_id, asset_id, count = delivered.len(), "tasks delivered");
        }
        delivered
    }

    /// Transition a delivered task to executing.
    pub fn mark_executing(
        &self,
        task_id: &str,
        tenant_id: &str,
        asset_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Task, TaskError> {
        let now = Utc::now();
        let mut tasks = self.tasks.write();
        Self::sweep(&mut tasks, now);

        let task = tasks.get_mut(task_id).ok_or(TaskError::NotFound)?;
        if task.tenant_id != tenant_id || task.asset_id != asset_id {
            return Err(TaskError::AgentMismatch);
        }
        match task.state {
            TaskState::Expired => return Err(TaskError::Expired),
            TaskState::Completed | TaskState::Failed => return Err(TaskError::AlreadyRecorded),
            TaskState::Pending | TaskState::Delivered | TaskState::Executing => {}
        }
        task.state = TaskState::Executing;
        task.started_at = Some(started_at);
        Ok(task.clone())
    }

    /// Record the execution outcome, at most once per task.
    pub fn record_result(
        &self,
        result: TaskResult,
        tenant_id: &str,
        asset_id: &str,
    ) -> Result<Task, TaskError> {
        let now = Utc::now();
        let mut tasks = self.tasks.write();
        Self::sweep(&mut tasks, now);

        let task = tasks.get_mut(&result.task_id).ok_or(TaskError::NotFound)?;
        if task.tenant_id != tenant_id || task.asset_id != asset_id {
            return Err(TaskError::AgentMismatch);
        }
        if matches!(task.state, TaskState::Completed | TaskState::Failed) {
            return Err(TaskError::AlreadyRecorded);
        }
        if task.state == TaskState::Expired {
            return Err(TaskError::Expired);
        }
        if result.started_at < task.created_at || result.started_at > task.expires_at {
            return Err(TaskError::InvalidTiming);
        }

        task.started_at = Some(result.started_at);
        task.finished_at = Some(result.finished_at);
        task.state = if result.status == "completed" {
            TaskState::Completed
        } else {
            TaskState::Failed
        };
        info!(task_id = %result.task_id, status = %result.status, "task result recorded");
        let updated = task.clone();
        self.results.write().insert(result.task_id.clone(), result);
        Ok(updated)
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().get(task_id).cloned()
    }

    pub fn get_result(&self, task_id: &str) -> Option<TaskResult> {
        self.results.read().get(task_id).cloned()
    }

    /// Expire overdue tasks. Idempotent; safe to call on every request.
    pub fn expire_overdue(&self) {
        let now = Utc::now();
        let mut tasks = self.tasks.write();
        Self::sweep(&mut tasks, now);
    }

    fn sweep(tasks: &mut HashMap<String, Task>, now: DateTime<Utc>) {
        for task in tasks.values_mut() {
            if !task.state.is_terminal() && task.expires_at <= now {
                task.state = TaskState::Expired;
                task.last_error = Some("expired".to_string());
            }
        }
    }
}
