use serde::Serialize;
use std::fmt;

/// Lifecycle of a workflow: `Created -> Running -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Created,
    Running,
    /// No new windows are opened; in-flight batches are finishing.
    Draining,
    Stopped,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Created => "created",
            WorkflowState::Running => "running",
            WorkflowState::Draining => "draining",
            WorkflowState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
