// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Control plane backed by the EMR and S3 APIs.

mod mapping;

use std::collections::HashSet;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_emr::types::{
    ActionOnFailure, HadoopJarStepConfig, InstanceCollectionType, InstanceFleetType,
    InstanceGroupType, InstanceState, StepConfig,
};
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error as ThisError;

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::ControlPlanePort;
use crate::app::types::{ClusterDescriptor, ClusterInstance, JobStep, SubmissionResult};

use self::mapping::{
    ACTIVE_CLUSTER_STATES, MappingError, active_step_states, cluster_descriptor, cluster_instance,
    job_step,
};

const COMMAND_RUNNER_JAR: &str = "command-runner.jar";
const FALLBACK_REGION: &str = "us-east-1";

#[derive(Debug, ThisError)]
enum ControlPlaneError {
    #[error("EMR error: {0}")]
    Emr(#[from] aws_sdk_emr::Error),

    #[error("S3 error: {0}")]
    S3(#[from] aws_sdk_s3::Error),

    #[error("invalid step definition: {0}")]
    Build(#[from] aws_sdk_emr::error::BuildError),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

impl ControlPlaneError {
    fn into_app_error(self, operation: &str) -> AppError {
        AppError::remote(format!("{operation} failed")).with_context(self.to_string())
    }
}

pub struct EmrControlPlane {
    emr: aws_sdk_emr::Client,
    s3: aws_sdk_s3::Client,
}

impl EmrControlPlane {
    /// Loads credentials for `profile` (or the default chain) and resolves the
    /// region from `region`, then the environment, then `us-east-1`.
    pub async fn connect(profile: Option<&str>, region: Option<&str>) -> Self {
        let region_provider = RegionProviderChain::first_try(region.map(|r| Region::new(r.to_string())))
            .or_default_provider()
            .or_else(FALLBACK_REGION);
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;
        tracing::debug!(
            profile = profile.unwrap_or("default"),
            region = ?sdk_config.region(),
            "loaded cloud credentials"
        );
        Self {
            emr: aws_sdk_emr::Client::new(&sdk_config),
            s3: aws_sdk_s3::Client::new(&sdk_config),
        }
    }

    async fn active_clusters(&self, name: &str) -> Result<Vec<ClusterDescriptor>, ControlPlaneError> {
        let summaries = self
            .emr
            .list_clusters()
            .set_cluster_states(Some(ACTIVE_CLUSTER_STATES.to_vec()))
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(|e| ControlPlaneError::Emr(e.into()))?;
        Ok(summaries
            .iter()
            .filter(|summary| summary.name() == Some(name))
            .filter_map(cluster_descriptor)
            .collect())
    }

    /// Ids of the master instance group, or of the master fleet on
    /// fleet-based clusters.
    async fn master_ids(&self, cluster_id: &str) -> Result<HashSet<String>, ControlPlaneError> {
        let cluster = self
            .emr
            .describe_cluster()
            .cluster_id(cluster_id)
            .send()
            .await
            .map_err(|e| ControlPlaneError::Emr(e.into()))?;
        let uses_fleets = cluster
            .cluster()
            .and_then(|cluster| cluster.instance_collection_type())
            == Some(&InstanceCollectionType::InstanceFleet);

        if uses_fleets {
            let fleets = self
                .emr
                .list_instance_fleets()
                .cluster_id(cluster_id)
                .into_paginator()
                .items()
                .send()
                .try_collect()
                .await
                .map_err(|e| ControlPlaneError::Emr(e.into()))?;
            return Ok(fleets
                .iter()
                .filter(|fleet| fleet.instance_fleet_type() == Some(&InstanceFleetType::Master))
                .filter_map(|fleet| fleet.id().map(str::to_string))
                .collect());
        }

        let groups = self
            .emr
            .list_instance_groups()
            .cluster_id(cluster_id)
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(|e| ControlPlaneError::Emr(e.into()))?;
        Ok(groups
            .iter()
            .filter(|group| group.instance_group_type() == Some(&InstanceGroupType::Master))
            .filter_map(|group| group.id().map(str::to_string))
            .collect())
    }

    async fn running_instances(&self, cluster_id: &str) -> Result<Vec<ClusterInstance>, ControlPlaneError> {
        let master_ids = self.master_ids(cluster_id).await?;
        let instances = self
            .emr
            .list_instances()
            .cluster_id(cluster_id)
            .instance_states(InstanceState::Running)
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(|e| ControlPlaneError::Emr(e.into()))?;
        Ok(instances
            .iter()
            .filter_map(|instance| cluster_instance(instance, &master_ids))
            .collect())
    }

    async fn steps(
        &self,
        cluster_id: &str,
        step_name: &str,
        active_only: bool,
    ) -> Result<Vec<JobStep>, ControlPlaneError> {
        let mut request = self.emr.list_steps().cluster_id(cluster_id);
        if active_only {
            request = request.set_step_states(Some(active_step_states()));
        }
        let summaries = request
            .into_paginator()
            .items()
            .send()
            .try_collect()
            .await
            .map_err(|e| ControlPlaneError::Emr(e.into()))?;
        let mut steps = Vec::new();
        for summary in summaries.iter().filter(|s| s.name() == Some(step_name)) {
            steps.push(job_step(summary)?);
        }
        Ok(steps)
    }

    async fn add_step(
        &self,
        cluster_id: &str,
        step_name: &str,
        args: &[String],
    ) -> Result<SubmissionResult, ControlPlaneError> {
        let jar_step = HadoopJarStepConfig::builder()
            .jar(COMMAND_RUNNER_JAR)
            .set_args(Some(args.to_vec()))
            .build();
        let step = StepConfig::builder()
            .name(step_name)
            .action_on_failure(ActionOnFailure::Continue)
            .hadoop_jar_step(jar_step)
            .build();
        let output = self
            .emr
            .add_job_flow_steps()
            .job_flow_id(cluster_id)
            .steps(step)
            .send()
            .await
            .map_err(|e| ControlPlaneError::Emr(e.into()))?;
        Ok(SubmissionResult {
            step_ids: output.step_ids().to_vec(),
        })
    }

    async fn terminate(&self, name: &str) -> Result<Vec<String>, ControlPlaneError> {
        let ids: Vec<String> = self
            .active_clusters(name)
            .await?
            .into_iter()
            .map(|cluster| cluster.id)
            .collect();
        if ids.is_empty() {
            return Ok(ids);
        }
        self.emr
            .terminate_job_flows()
            .set_job_flow_ids(Some(ids.clone()))
            .send()
            .await
            .map_err(|e| ControlPlaneError::Emr(e.into()))?;
        Ok(ids)
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, ControlPlaneError> {
        match self.s3.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_not_found()) =>
            {
                Ok(false)
            }
            Err(err) => Err(ControlPlaneError::S3(err.into())),
        }
    }
}

#[async_trait]
impl ControlPlanePort for EmrControlPlane {
    async fn find_active_clusters(&self, name: &str) -> AppResult<Vec<ClusterDescriptor>> {
        self.active_clusters(name)
            .await
            .map_err(|e| e.into_app_error("list clusters"))
    }

    async fn list_instances(&self, cluster_id: &str) -> AppResult<Vec<ClusterInstance>> {
        self.running_instances(cluster_id)
            .await
            .map_err(|e| e.into_app_error(&format!("list instances of {cluster_id}")))
    }

    async fn list_steps(
        &self,
        cluster_id: &str,
        step_name: &str,
        active_only: bool,
    ) -> AppResult<Vec<JobStep>> {
        self.steps(cluster_id, step_name, active_only)
            .await
            .map_err(|e| e.into_app_error(&format!("list steps {step_name} on {cluster_id}")))
    }

    async fn submit_step(
        &self,
        cluster_id: &str,
        step_name: &str,
        args: &[String],
    ) -> AppResult<SubmissionResult> {
        self.add_step(cluster_id, step_name, args)
            .await
            .map_err(|e| e.into_app_error("add step"))
    }

    async fn terminate_clusters(&self, name: &str) -> AppResult<Vec<String>> {
        self.terminate(name)
            .await
            .map_err(|e| e.into_app_error("terminate clusters"))
    }

    async fn put_marker(&self, bucket: &str, key: &str) -> AppResult<()> {
        self.s3
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|e| ControlPlaneError::S3(e.into()).into_app_error("put marker"))?;
        Ok(())
    }

    async fn delete_marker(&self, bucket: &str, key: &str) -> AppResult<()> {
        self.s3
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ControlPlaneError::S3(e.into()).into_app_error("delete marker"))?;
        Ok(())
    }

    async fn marker_exists(&self, bucket: &str, key: &str) -> AppResult<bool> {
        self.object_exists(bucket, key)
            .await
            .map_err(|e| e.into_app_error("head marker"))
    }
}
