// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

pub mod codes {
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const UNEXPECTED_REMOTE_STATE: &str = "unexpected_remote_state";
    pub const REMOTE_ERROR: &str = "remote_error";
    pub const NODE_AGENT_ERROR: &str = "node_agent_error";
    pub const STEP_FAILED: &str = "step_failed";
    pub const STEP_TIMEOUT: &str = "step_timeout";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

pub const EXIT_CODE_USAGE: i32 = 2;
pub const EXIT_CODE_OTHER: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    /// Bad input, rejected before any remote call.
    Validation,
    /// The remote state is not what the workflow requires.
    Precondition,
    /// A remote call answered without the marker or status we rely on.
    Integration,
    /// A polled step reached an unsuccessful terminal state.
    JobFailed,
    /// A batch step ran past its timeout.
    Timeout,
    Internal,
}

impl AppErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AppErrorKind::Validation => "validation",
            AppErrorKind::Precondition => "precondition",
            AppErrorKind::Integration => "integration",
            AppErrorKind::JobFailed => "job_failed",
            AppErrorKind::Timeout => "timeout",
            AppErrorKind::Internal => "internal",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            AppErrorKind::Validation => EXIT_CODE_USAGE,
            _ => EXIT_CODE_OTHER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    context: Option<String>,
}

impl AppError {
    pub fn with_message(
        kind: AppErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Validation, codes::INVALID_ARGUMENT, message)
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::with_message(
            AppErrorKind::Precondition,
            codes::UNEXPECTED_REMOTE_STATE,
            message,
        )
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Integration, codes::REMOTE_ERROR, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::Internal, codes::INTERNAL_ERROR, message)
    }

    pub fn kind(&self) -> AppErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            write!(f, "{} ({})", self.message, ctx)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;
