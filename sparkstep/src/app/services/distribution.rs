// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Fan-out of artifact downloads (and dependency installs) to cluster nodes.

use futures::stream::{self, StreamExt};

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::NodeAgentPort;
use crate::app::types::{ArtifactLocation, DownloadRequest, JobRuntime, NodeResponse};

pub const DEFAULT_CONCURRENCY: usize = 7;
const MISSING_MESSAGE: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeAction {
    Download,
    Install,
}

impl NodeAction {
    fn as_str(self) -> &'static str {
        match self {
            NodeAction::Download => "download",
            NodeAction::Install => "install",
        }
    }
}

/// Asks every node to download the artifact and, for interpreted runtimes,
/// to install its declared requirements afterwards.
///
/// All downloads are awaited and validated before the installs start, and the
/// call only returns `Ok` once every node acknowledged every request it got.
pub async fn distribute_artifact(
    agent: &dyn NodeAgentPort,
    addresses: &[String],
    runtime: JobRuntime,
    location: &ArtifactLocation,
    concurrency: usize,
) -> AppResult<()> {
    let concurrency = concurrency.max(1);
    let payload = DownloadRequest {
        runtime: runtime.as_str().to_string(),
        bucket: location.bucket.clone(),
        key: location.key.clone(),
    };

    let downloads: Vec<(&String, AppResult<NodeResponse>)> = stream::iter(addresses)
        .map(|address| {
            let payload = &payload;
            async move { (address, agent.download(address, payload).await) }
        })
        .buffered(concurrency)
        .collect()
        .await;
    validate_responses(NodeAction::Download, location, downloads)?;

    if runtime.is_interpreted() {
        let installs: Vec<(&String, AppResult<NodeResponse>)> = stream::iter(addresses)
            .map(|address| async move { (address, agent.install_requirements(address).await) })
            .buffered(concurrency)
            .collect()
            .await;
        validate_responses(NodeAction::Install, location, installs)?;
    }
    Ok(())
}

fn validate_responses(
    action: NodeAction,
    location: &ArtifactLocation,
    responses: Vec<(&String, AppResult<NodeResponse>)>,
) -> AppResult<()> {
    for (address, result) in responses {
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(
                    action = action.as_str(),
                    bucket = %location.bucket,
                    key = %location.key,
                    ip = %address,
                    error = %err,
                    "node agent unreachable"
                );
                return Err(node_error(
                    format!("node agent request failed: {}", err.message()),
                    action,
                    location,
                    address,
                    "none",
                    MISSING_MESSAGE,
                ));
            }
        };
        let message = response.message.as_deref().unwrap_or(MISSING_MESSAGE);
        if response.status != 200 {
            tracing::error!(
                action = action.as_str(),
                bucket = %location.bucket,
                key = %location.key,
                ip = %address,
                status_code = response.status,
                response_message = message,
                "node agent rejected request"
            );
            return Err(node_error(
                format!(
                    "Expected 200 but found {} HTTP status code",
                    response.status
                ),
                action,
                location,
                address,
                &response.status.to_string(),
                message,
            ));
        }
        tracing::info!(
            action = action.as_str(),
            bucket = %location.bucket,
            key = %location.key,
            ip = %address,
            status_code = response.status,
            response_message = message,
            "node agent accepted request"
        );
    }
    Ok(())
}

fn node_error(
    message: String,
    action: NodeAction,
    location: &ArtifactLocation,
    address: &str,
    status: &str,
    body_message: &str,
) -> AppError {
    AppError::with_message(AppErrorKind::Integration, codes::NODE_AGENT_ERROR, message).with_context(
        format!(
            "action={} ip={address} bucket={} key={} status_code={status} message={body_message}",
            action.as_str(),
            location.bucket,
            location.key
        ),
    )
}
