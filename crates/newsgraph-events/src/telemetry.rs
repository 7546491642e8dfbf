use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

const TELEMETRY_TARGET: &str = "newsgraph::events::telemetry";

/// Names of the analyst-facing graph commands.
pub const CMD_LOAD_GRAPH: &str = "LoadGraph";
pub const CMD_EXPAND: &str = "ExpandEgoNetwork";
pub const CMD_LOAD_MORE: &str = "LoadMoreNeighbors";
pub const CMD_LOOKUP_NAME: &str = "LookupByName";
pub const CMD_COLLAPSE: &str = "Collapse";
pub const CMD_MERGE: &str = "Merge";
pub const CMD_HIDE: &str = "HideSelected";
pub const CMD_EDIT: &str = "EditEntity";
pub const CMD_ANNOTATE: &str = "Annotate";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandLifecycle {
    Start,
    Success,
    Failure,
}

impl fmt::Display for CommandLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "command_start"),
            Self::Success => write!(f, "command_success"),
            Self::Failure => write!(f, "command_failure"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTelemetry {
    pub correlation_id: String,
    pub command: String,
    pub lifecycle: CommandLifecycle,
    pub error_reason: Option<String>,
    pub duration_ms: Option<u128>,
}

/// One in-progress command. Logs `command_start` on creation and exactly one
/// of `command_success` / `command_failure` when finished.
#[derive(Debug)]
pub struct CommandSpan {
    command: &'static str,
    correlation_id: String,
    started: Instant,
}

impl CommandSpan {
    pub fn start(command: &'static str) -> Self {
        let correlation_id = new_correlation_id();
        info!(
            target: TELEMETRY_TARGET,
            command = %command,
            correlation_id = %correlation_id,
            lifecycle = %CommandLifecycle::Start,
            "command_start"
        );
        Self {
            command,
            correlation_id,
            started: Instant::now(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn context(&self, context: &str) {
        debug!(
            target: TELEMETRY_TARGET,
            command = %self.command,
            correlation_id = %self.correlation_id,
            context = %context,
            "command_context"
        );
    }

    pub fn success(self) -> CommandTelemetry {
        let duration_ms = self.started.elapsed().as_millis();
        info!(
            target: TELEMETRY_TARGET,
            command = %self.command,
            correlation_id = %self.correlation_id,
            lifecycle = %CommandLifecycle::Success,
            duration_ms = duration_ms,
            "command_success"
        );
        CommandTelemetry {
            correlation_id: self.correlation_id,
            command: self.command.to_string(),
            lifecycle: CommandLifecycle::Success,
            error_reason: None,
            duration_ms: Some(duration_ms),
        }
    }

    pub fn failure(self, reason: impl fmt::Display) -> CommandTelemetry {
        let reason = reason.to_string();
        error!(
            target: TELEMETRY_TARGET,
            command = %self.command,
            correlation_id = %self.correlation_id,
            lifecycle = %CommandLifecycle::Failure,
            error = %reason,
            "command_failure"
        );
        CommandTelemetry {
            correlation_id: self.correlation_id,
            command: self.command.to_string(),
            lifecycle: CommandLifecycle::Failure,
            error_reason: Some(reason),
            duration_ms: None,
        }
    }

    /// Log the outcome of `result` and hand it back unchanged.
    pub fn finish<T, E: fmt::Display>(self, result: Result<T, E>) -> Result<T, E> {
        match &result {
            Ok(_) => {
                self.success();
            }
            Err(err) => {
                self.failure(err);
            }
        }
        result
    }
}

pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}
