// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod clock;
pub mod control_plane;
pub mod node_agent;

pub use clock::{ClockPort, SleepPort};
pub use control_plane::ControlPlanePort;
pub use node_agent::NodeAgentPort;
