// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::{AppError, AppResult};
use crate::app::types::ArtifactLocation;

/// Splits `scheme://bucket/key...` into bucket and key.
pub fn parse_artifact_location(path: &str) -> AppResult<ArtifactLocation> {
    let trimmed = path.trim();
    let Some((scheme, rest)) = trimmed.split_once("://") else {
        return Err(malformed(trimmed, "expected scheme://bucket/key"));
    };
    if scheme.is_empty() {
        return Err(malformed(trimmed, "missing scheme"));
    }
    let Some((bucket, key)) = rest.split_once('/') else {
        return Err(malformed(trimmed, "missing object key"));
    };
    if bucket.is_empty() {
        return Err(malformed(trimmed, "missing bucket"));
    }
    if key.is_empty() {
        return Err(malformed(trimmed, "missing object key"));
    }
    Ok(ArtifactLocation {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

fn malformed(path: &str, reason: &str) -> AppError {
    AppError::validation(format!("malformed artifact path '{path}': {reason}"))
}
