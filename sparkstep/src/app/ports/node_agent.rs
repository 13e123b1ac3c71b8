// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{DownloadRequest, NodeResponse};

/// Bootstrap agent running on every cluster node.
///
/// A non-success HTTP status is returned as a [`NodeResponse`]; only transport
/// failures surface as errors.
#[async_trait]
pub trait NodeAgentPort: Send + Sync {
    async fn download(&self, address: &str, payload: &DownloadRequest) -> AppResult<NodeResponse>;

    async fn install_requirements(&self, address: &str) -> AppResult<NodeResponse>;
}
