// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! HTTP client for the bootstrap agent listening on every cluster node.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::NodeAgentPort;
use crate::app::types::{DownloadRequest, NodeResponse};

#[derive(Clone)]
pub struct HttpNodeAgent {
    port: u16,
    client: reqwest::Client,
}

impl HttpNodeAgent {
    pub fn new(port: u16, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build node agent HTTP client")?;
        Ok(Self { port, client })
    }

    fn url(&self, address: &str, path: &str) -> String {
        format!("http://{address}:{}/{path}", self.port)
    }

    async fn into_node_response(response: reqwest::Response) -> NodeResponse {
        let status = response.status().as_u16();
        // an unreadable body still carries a usable status
        let body = response.bytes().await.unwrap_or_default();
        NodeResponse {
            status,
            message: response_message(&body),
        }
    }
}

fn response_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
}

fn transport_error(action: &str, address: &str, err: reqwest::Error) -> AppError {
    AppError::with_message(
        AppErrorKind::Integration,
        codes::NODE_AGENT_ERROR,
        format!("{action} request to {address} failed"),
    )
    .with_context(err.to_string())
}

#[async_trait]
impl NodeAgentPort for HttpNodeAgent {
    async fn download(&self, address: &str, payload: &DownloadRequest) -> AppResult<NodeResponse> {
        let response = self
            .client
            .post(self.url(address, "download"))
            .json(payload)
            .send()
            .await
            .map_err(|e| transport_error("download", address, e))?;
        Ok(Self::into_node_response(response).await)
    }

    async fn install_requirements(&self, address: &str) -> AppResult<NodeResponse> {
        let response = self
            .client
            .get(self.url(address, "requirements"))
            .send()
            .await
            .map_err(|e| transport_error("requirements", address, e))?;
        Ok(Self::into_node_response(response).await)
    }
}
