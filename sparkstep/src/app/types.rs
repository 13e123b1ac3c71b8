// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use time::OffsetDateTime;

use crate::app::errors::AppError;

/// Runtimes a Spark step can be submitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRuntime {
    Scala,
    Java,
    Python,
}

impl JobRuntime {
    pub const ALL: [JobRuntime; 3] = [JobRuntime::Scala, JobRuntime::Java, JobRuntime::Python];

    pub fn as_str(self) -> &'static str {
        match self {
            JobRuntime::Scala => "scala",
            JobRuntime::Java => "java",
            JobRuntime::Python => "python",
        }
    }

    /// Interpreted runtimes ship their dependencies separately and need an
    /// install pass on every node.
    pub fn is_interpreted(self) -> bool {
        matches!(self, JobRuntime::Python)
    }

    fn allowed() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(|runtime| runtime.as_str()).collect();
        format!("[{}]", names.join(", "))
    }
}

impl FromStr for JobRuntime {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scala" => Ok(JobRuntime::Scala),
            "java" => Ok(JobRuntime::Java),
            "python" => Ok(JobRuntime::Python),
            _ => Err(AppError::validation(format!(
                "--job-runtime should be in {}, got '{s}'",
                Self::allowed()
            ))),
        }
    }
}

impl fmt::Display for JobRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    Batch,
    Streaming,
}

impl JobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JobMode::Batch => "batch",
            JobMode::Streaming => "streaming",
        }
    }
}

/// One job-lifecycle request, validated and owned by a single run.
///
/// `job_runtime` stays a raw string so that runtime validation happens inside
/// the orchestrator, before any remote call.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub env: String,
    pub profile: Option<String>,
    pub cluster_name: String,
    pub job_name: String,
    pub job_runtime: String,
    pub job_timeout: Option<u64>,
    pub job_mode: JobMode,
    pub artifact_path: Option<String>,
    pub poll_cluster: bool,
    pub terminate: bool,
    pub shutdown: bool,
    pub checkpoint_bucket: Option<String>,
    pub dryrun: bool,
    pub job_args: String,
    pub job_configs: String,
    pub main_class: Option<String>,
}

impl JobRequest {
    pub fn checkpoint_bucket(&self) -> String {
        match self.checkpoint_bucket.as_deref().map(str::trim) {
            Some(bucket) if !bucket.is_empty() => bucket.to_string(),
            _ => format!("{}-checkpoints", self.env),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterDescriptor {
    pub id: String,
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Master,
    Worker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInstance {
    pub private_address: String,
    pub role: NodeRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    CancelPending,
    Running,
    Completed,
    Cancelled,
    Failed,
    Interrupted,
}

impl StepState {
    pub const ACTIVE: [StepState; 2] = [StepState::Pending, StepState::Running];
    pub const ALL: [StepState; 7] = [
        StepState::Pending,
        StepState::CancelPending,
        StepState::Running,
        StepState::Completed,
        StepState::Cancelled,
        StepState::Failed,
        StepState::Interrupted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepState::Pending => "PENDING",
            StepState::CancelPending => "CANCEL_PENDING",
            StepState::Running => "RUNNING",
            StepState::Completed => "COMPLETED",
            StepState::Cancelled => "CANCELLED",
            StepState::Failed => "FAILED",
            StepState::Interrupted => "INTERRUPTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(value.trim()))
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepState::Completed
                | StepState::Failed
                | StepState::Cancelled
                | StepState::Interrupted
        )
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStep {
    pub id: String,
    pub name: String,
    pub state: StepState,
    pub created_at: OffsetDateTime,
}

/// Bucket and key of an object addressed as `scheme://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionResult {
    pub step_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadRequest {
    pub runtime: String,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeResponse {
    pub status: u16,
    pub message: Option<String>,
}
