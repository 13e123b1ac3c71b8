// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use time::OffsetDateTime;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::types::{JobMode, JobStep, StepState};

/// How polling for one step name ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    /// Streaming job still alive when its monitoring window closed.
    WindowElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Wait,
    Done(PollOutcome),
}

/// The most recently created step; on equal creation times the later listed
/// step wins.
pub fn current_step(steps: &[JobStep]) -> Option<&JobStep> {
    steps.iter().max_by_key(|step| step.created_at)
}

/// Whole minutes since `created_at`, floored. Clock skew never yields a
/// negative value.
pub fn elapsed_minutes(created_at: OffsetDateTime, now: OffsetDateTime) -> i64 {
    (now - created_at).whole_minutes().max(0)
}

/// Decides what one observation of a step means for the poll loop.
pub fn classify(
    step: &JobStep,
    elapsed_minutes: i64,
    timeout_minutes: Option<u64>,
    mode: JobMode,
) -> AppResult<PollDecision> {
    if step.state == StepState::Completed {
        return Ok(PollDecision::Done(PollOutcome::Completed));
    }
    if step.state.is_terminal() {
        return Err(AppError::with_message(
            AppErrorKind::JobFailed,
            codes::STEP_FAILED,
            format!("Job in invalid state {}", step.state),
        )
        .with_context(format!("step={} name={}", step.id, step.name)));
    }

    let Some(timeout) = timeout_minutes else {
        return Ok(PollDecision::Wait);
    };
    if elapsed_minutes <= i64::try_from(timeout).unwrap_or(i64::MAX) {
        return Ok(PollDecision::Wait);
    }
    match mode {
        JobMode::Batch => Err(AppError::with_message(
            AppErrorKind::Timeout,
            codes::STEP_TIMEOUT,
            format!("Job exceeded timeout {timeout}"),
        )
        .with_context(format!(
            "step={} name={} minutes_elapsed={elapsed_minutes}",
            step.id, step.name
        ))),
        JobMode::Streaming => Ok(PollDecision::Done(PollOutcome::WindowElapsed)),
    }
}
