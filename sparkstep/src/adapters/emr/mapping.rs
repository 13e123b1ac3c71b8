// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashSet;

use aws_sdk_emr::primitives::DateTime;
use aws_sdk_emr::types::{
    ClusterState, ClusterSummary, Instance, StepState as EmrStepState, StepSummary,
};
use thiserror::Error as ThisError;
use time::OffsetDateTime;

use crate::app::types::{ClusterDescriptor, ClusterInstance, JobStep, NodeRole, StepState};

pub const ACTIVE_CLUSTER_STATES: [ClusterState; 4] = [
    ClusterState::Starting,
    ClusterState::Bootstrapping,
    ClusterState::Running,
    ClusterState::Waiting,
];

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum MappingError {
    #[error("step summary without {0}")]
    MissingField(&'static str),
    #[error("unknown step state '{0}'")]
    UnknownState(String),
    #[error("creation time out of range")]
    TimeOutOfRange,
}

pub fn active_step_states() -> Vec<EmrStepState> {
    StepState::ACTIVE
        .iter()
        .map(|state| EmrStepState::from(state.as_str()))
        .collect()
}

pub fn cluster_descriptor(summary: &ClusterSummary) -> Option<ClusterDescriptor> {
    let id = summary.id()?;
    Some(ClusterDescriptor {
        id: id.to_string(),
        name: summary.name().unwrap_or_default().to_string(),
        state: summary
            .status()
            .and_then(|status| status.state())
            .map(|state| state.as_str().to_string())
            .unwrap_or_default(),
    })
}

/// Maps a running instance to a node; `master_ids` holds the ids of the
/// master instance group or fleet. Instances without a private address are
/// unreachable for the node agent and are skipped.
pub fn cluster_instance(instance: &Instance, master_ids: &HashSet<String>) -> Option<ClusterInstance> {
    let address = instance.private_ip_address()?;
    let is_master = instance
        .instance_group_id()
        .or(instance.instance_fleet_id())
        .is_some_and(|id| master_ids.contains(id));
    Some(ClusterInstance {
        private_address: address.to_string(),
        role: if is_master {
            NodeRole::Master
        } else {
            NodeRole::Worker
        },
    })
}

pub fn offset_datetime(value: &DateTime) -> Result<OffsetDateTime, MappingError> {
    let nanos = i128::from(value.secs()) * 1_000_000_000 + i128::from(value.subsec_nanos());
    OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|_| MappingError::TimeOutOfRange)
}

pub fn job_step(summary: &StepSummary) -> Result<JobStep, MappingError> {
    let id = summary.id().ok_or(MappingError::MissingField("id"))?;
    let status = summary.status().ok_or(MappingError::MissingField("status"))?;
    let raw_state = status
        .state()
        .ok_or(MappingError::MissingField("state"))?
        .as_str();
    let state =
        StepState::parse(raw_state).ok_or_else(|| MappingError::UnknownState(raw_state.into()))?;
    let created = status
        .timeline()
        .and_then(|timeline| timeline.creation_date_time())
        .ok_or(MappingError::MissingField("creation time"))?;
    Ok(JobStep {
        id: id.to_string(),
        name: summary.name().unwrap_or_default().to_string(),
        state,
        created_at: offset_datetime(created)?,
    })
}
