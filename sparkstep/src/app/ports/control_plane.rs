// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{ClusterDescriptor, ClusterInstance, JobStep, SubmissionResult};

/// Cluster compute and blob storage control plane.
/// Every call is a remote round trip; nothing is cached between calls.
#[async_trait]
pub trait ControlPlanePort: Send + Sync {
    /// Clusters named `name` in STARTING, BOOTSTRAPPING, RUNNING or WAITING.
    async fn find_active_clusters(&self, name: &str) -> AppResult<Vec<ClusterDescriptor>>;

    /// Running instances of the cluster, master included.
    async fn list_instances(&self, cluster_id: &str) -> AppResult<Vec<ClusterInstance>>;

    /// Steps named `step_name`; PENDING and RUNNING only when `active_only`.
    async fn list_steps(
        &self,
        cluster_id: &str,
        step_name: &str,
        active_only: bool,
    ) -> AppResult<Vec<JobStep>>;

    /// `args` is the full command line the step runs, e.g. `spark-submit ...`.
    async fn submit_step(
        &self,
        cluster_id: &str,
        step_name: &str,
        args: &[String],
    ) -> AppResult<SubmissionResult>;

    /// Terminates every active cluster named `name` and returns their ids.
    async fn terminate_clusters(&self, name: &str) -> AppResult<Vec<String>>;

    async fn put_marker(&self, bucket: &str, key: &str) -> AppResult<()>;

    /// Deleting an absent marker is not an error.
    async fn delete_marker(&self, bucket: &str, key: &str) -> AppResult<()>;

    async fn marker_exists(&self, bucket: &str, key: &str) -> AppResult<bool>;
}
