// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod artifact;
pub mod commands;
pub mod distribution;
pub mod polling;
pub mod step_args;
