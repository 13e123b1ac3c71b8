// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

/// Time source boundary for UTC timestamps.
pub trait ClockPort: Send + Sync {
    fn now_utc(&self) -> OffsetDateTime;
}

/// Suspension boundary for the poll loop.
#[async_trait]
pub trait SleepPort: Send + Sync {
    async fn sleep(&self, duration: Duration);
}
