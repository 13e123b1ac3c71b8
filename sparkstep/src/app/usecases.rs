// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;
use std::time::Duration as StdDuration;

use time::format_description::well_known::Rfc3339;
use tracing::Instrument;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ClockPort, ControlPlanePort, NodeAgentPort, SleepPort};
use crate::app::services::artifact::parse_artifact_location;
use crate::app::services::commands::{render_add_step, render_terminate};
use crate::app::services::distribution::{self, distribute_artifact};
use crate::app::services::polling::{
    PollDecision, PollOutcome, classify, current_step, elapsed_minutes,
};
use crate::app::services::step_args::{
    StepArgsInput, build_step_args, checkpoint_copy_command, spark_submit_command, tokenize,
};
use crate::app::types::{
    ClusterDescriptor, JobRequest, JobRuntime, NodeRole, SubmissionResult,
};

/// Name of the step that copies streaming checkpoints to blob storage.
pub const CHECKPOINT_COPY_STEP: &str = "S3DistCp";
pub const DEFAULT_POLL_INTERVAL: StdDuration = StdDuration::from_secs(60);

pub fn shutdown_marker_key(job_name: &str) -> String {
    format!("{job_name}.shutdown.txt")
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub poll_interval: StdDuration,
    pub distribution_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            distribution_concurrency: distribution::DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Clone)]
pub struct UseCases {
    pub(crate) control_plane: Arc<dyn ControlPlanePort>,
    pub(crate) node_agent: Arc<dyn NodeAgentPort>,
    pub(crate) clock: Arc<dyn ClockPort>,
    pub(crate) sleeper: Arc<dyn SleepPort>,
    pub(crate) settings: Settings,
}

impl UseCases {
    pub fn new(
        control_plane: Arc<dyn ControlPlanePort>,
        node_agent: Arc<dyn NodeAgentPort>,
        clock: Arc<dyn ClockPort>,
        sleeper: Arc<dyn SleepPort>,
        settings: Settings,
    ) -> Self {
        Self {
            control_plane,
            node_agent,
            clock,
            sleeper,
            settings,
        }
    }

    /// Runs one job-lifecycle request end to end.
    ///
    /// Returns the rendered submission command when a step was (or, with
    /// `dryrun`, would have been) submitted. Nothing is retried and nothing
    /// already submitted is rolled back when a later stage fails.
    pub async fn handle_job_request(&self, request: &JobRequest) -> AppResult<Option<String>> {
        let span = tracing::info_span!(
            "job_request",
            environment = %request.env,
            cluster = %request.cluster_name,
            job = %request.job_name,
            mode = request.job_mode.as_str(),
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &JobRequest) -> AppResult<Option<String>> {
        let runtime = validate_request(request)?;
        let cluster = self.resolve_cluster(&request.cluster_name).await?;
        let cluster_id = cluster.id.as_str();
        let checkpoint_bucket = request.checkpoint_bucket();

        let mut poll_names = vec![request.job_name.clone()];
        let mut poll_cluster = request.poll_cluster;
        let mut timeout = request.job_timeout;
        if request.shutdown {
            poll_cluster = true;
            // a graceful drain takes as long as it takes
            timeout = None;
            poll_names = self
                .begin_shutdown(request, cluster_id, &checkpoint_bucket)
                .await?;
        }
        if request.dryrun && poll_cluster {
            // a dryrun submits nothing, so there is nothing of its own to poll
            tracing::info!(
                steps = ?poll_names,
                terminate = request.terminate,
                "dryrun: polling and cleanup skipped"
            );
            poll_cluster = false;
        }

        let mut command = None;
        if !request.shutdown {
            if let Some(artifact_path) = request.artifact_path.as_deref() {
                command = Some(
                    self.submit_job(request, runtime, cluster_id, artifact_path)
                        .await?,
                );
            }
        }

        if poll_cluster {
            for step_name in &poll_names {
                self.poll_step(request, cluster_id, step_name, timeout)
                    .await?;
            }
            self.cleanup(request, &checkpoint_bucket).await?;
        }
        Ok(command)
    }

    async fn resolve_cluster(&self, cluster_name: &str) -> AppResult<ClusterDescriptor> {
        let mut clusters = self.control_plane.find_active_clusters(cluster_name).await?;
        let cluster_list = serde_json::to_string(&clusters).unwrap_or_default();
        if clusters.len() != 1 {
            tracing::error!(
                action = "get-clusters",
                count = clusters.len(),
                cluster_list = %cluster_list,
            );
            return Err(AppError::precondition(format!(
                "Expected 1 but found {} running clusters with name {cluster_name}",
                clusters.len()
            )));
        }
        tracing::info!(action = "get-clusters", count = 1, cluster_list = %cluster_list);
        Ok(clusters.remove(0))
    }

    /// Signals a running streaming job to stop and queues the checkpoint copy.
    /// Returns the step names to poll, in order.
    async fn begin_shutdown(
        &self,
        request: &JobRequest,
        cluster_id: &str,
        checkpoint_bucket: &str,
    ) -> AppResult<Vec<String>> {
        let job_name = request.job_name.as_str();
        let active = self
            .control_plane
            .list_steps(cluster_id, job_name, true)
            .await?;
        let is_active = !active.is_empty();
        tracing::info!(action = "shutdown", is_currently_active = is_active);

        let mut poll_names = Vec::with_capacity(2);
        if is_active {
            let key = shutdown_marker_key(job_name);
            if request.dryrun {
                tracing::info!(bucket = checkpoint_bucket, key = %key, "dryrun: shutdown marker not written");
            } else {
                // overwrites a leftover marker; concurrent runs race on the same key
                self.control_plane.put_marker(checkpoint_bucket, &key).await?;
                tracing::info!(action = "put-shutdown-marker", bucket = checkpoint_bucket, key = %key);
            }
            poll_names.push(job_name.to_string());
        }

        let copy_command = checkpoint_copy_command(job_name, checkpoint_bucket);
        if request.dryrun {
            tracing::info!(
                step = CHECKPOINT_COPY_STEP,
                args = %copy_command.to_bracketed(),
                "dryrun: checkpoint copy step not submitted"
            );
        } else {
            let result = self
                .control_plane
                .submit_step(cluster_id, CHECKPOINT_COPY_STEP, copy_command.tokens())
                .await?;
            ensure_step_accepted(&result)?;
            tracing::info!(
                action = "add-copy-step",
                step = CHECKPOINT_COPY_STEP,
                step_ids = ?result.step_ids,
            );
        }
        poll_names.push(CHECKPOINT_COPY_STEP.to_string());
        Ok(poll_names)
    }

    async fn submit_job(
        &self,
        request: &JobRequest,
        runtime: JobRuntime,
        cluster_id: &str,
        artifact_path: &str,
    ) -> AppResult<String> {
        let location = parse_artifact_location(artifact_path)?;
        let instances = self.control_plane.list_instances(cluster_id).await?;
        let addresses: Vec<String> = instances
            .iter()
            .map(|instance| instance.private_address.clone())
            .collect();
        let num_executors = instances
            .iter()
            .filter(|instance| instance.role != NodeRole::Master)
            .count();
        if addresses.is_empty() {
            tracing::error!(action = "get-instances", count = 0, cluster_id);
            return Err(AppError::precondition(format!(
                "Expected 1+ but found 0 running instances on cluster {cluster_id}"
            )));
        }
        tracing::info!(
            action = "get-instances",
            count = addresses.len(),
            executors = num_executors,
            ips = ?addresses,
        );

        let step_args = build_step_args(&StepArgsInput {
            job_name: &request.job_name,
            runtime,
            env: &request.env,
            artifact_path,
            artifact: &location,
            main_class: request.main_class.as_deref(),
            job_args: &request.job_args,
            job_configs: &request.job_configs,
            num_executors,
        });

        tracing::debug!(
            job_args = %tokenize(&request.job_args),
            job_configs = %tokenize(&request.job_configs),
            "step arguments"
        );
        distribute_artifact(
            self.node_agent.as_ref(),
            &addresses,
            runtime,
            &location,
            self.settings.distribution_concurrency,
        )
        .await?;

        let command = render_add_step(
            request.profile.as_deref(),
            cluster_id,
            &request.job_name,
            &step_args,
        )?;
        tracing::info!(command = %command, "submission command");

        if !request.dryrun {
            let result = self
                .control_plane
                .submit_step(
                    cluster_id,
                    &request.job_name,
                    spark_submit_command(&step_args).tokens(),
                )
                .await?;
            ensure_step_accepted(&result)?;
            tracing::info!(action = "add-job-step", step_ids = ?result.step_ids);
        }
        Ok(command)
    }

    async fn poll_step(
        &self,
        request: &JobRequest,
        cluster_id: &str,
        step_name: &str,
        timeout: Option<u64>,
    ) -> AppResult<PollOutcome> {
        let mut first_observation = true;
        loop {
            let steps = self
                .control_plane
                .list_steps(cluster_id, step_name, false)
                .await?;
            if first_observation {
                tracing::info!(
                    action = "get-steps",
                    step = step_name,
                    cluster_id,
                    num_steps = steps.len(),
                );
                first_observation = false;
            }
            let Some(step) = current_step(&steps) else {
                return Err(AppError::precondition(format!(
                    "Expected 1+ but found {} jobs for name {step_name}",
                    steps.len()
                )));
            };

            let minutes = elapsed_minutes(step.created_at, self.clock.now_utc());
            tracing::info!(
                action = "poll-cluster",
                step = step_name,
                step_id = %step.id,
                state = %step.state,
                created_time = %step.created_at.format(&Rfc3339).unwrap_or_default(),
                minutes_elapsed = minutes,
            );

            match classify(step, minutes, timeout, request.job_mode) {
                Ok(PollDecision::Wait) => self.sleeper.sleep(self.settings.poll_interval).await,
                Ok(PollDecision::Done(PollOutcome::WindowElapsed)) => {
                    tracing::info!(
                        action = "exceeded-timeout",
                        step = step_name,
                        minutes = timeout.unwrap_or_default(),
                        "streaming monitoring window elapsed"
                    );
                    return Ok(PollOutcome::WindowElapsed);
                }
                Ok(PollDecision::Done(PollOutcome::Completed)) => return Ok(PollOutcome::Completed),
                Err(err) => {
                    let action = match err.kind() {
                        AppErrorKind::Timeout => "exceeded-timeout",
                        _ => "exit-failed-state",
                    };
                    tracing::error!(
                        action,
                        step = step_name,
                        step_id = %step.id,
                        state = %step.state,
                        error = %err,
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn cleanup(&self, request: &JobRequest, checkpoint_bucket: &str) -> AppResult<()> {
        if request.shutdown {
            let key = shutdown_marker_key(&request.job_name);
            if self
                .control_plane
                .marker_exists(checkpoint_bucket, &key)
                .await?
            {
                self.control_plane
                    .delete_marker(checkpoint_bucket, &key)
                    .await?;
                tracing::info!(action = "delete-shutdown-marker", bucket = checkpoint_bucket, key = %key);
            } else {
                tracing::debug!(bucket = checkpoint_bucket, key = %key, "no shutdown marker to delete");
            }
        }
        if request.terminate {
            let terminated = self
                .control_plane
                .terminate_clusters(&request.cluster_name)
                .await?;
            for cluster_id in terminated {
                let command = render_terminate(request.profile.as_deref(), &cluster_id)?;
                tracing::info!(action = "terminate-cluster", cluster_id = %cluster_id, command = %command);
            }
        }
        Ok(())
    }
}

/// Input checks that must pass before any remote call.
fn validate_request(request: &JobRequest) -> AppResult<JobRuntime> {
    let runtime: JobRuntime = request.job_runtime.parse().inspect_err(|err| {
        tracing::error!(action = "check-runtime", runtime = %request.job_runtime, error = %err);
    })?;
    tracing::info!(action = "check-runtime", runtime = %runtime);

    let submits = request.artifact_path.is_some() && !request.shutdown;
    let has_main_class = request
        .main_class
        .as_deref()
        .is_some_and(|class| !class.trim().is_empty());
    if submits && !runtime.is_interpreted() && !has_main_class {
        return Err(AppError::validation(format!(
            "--main-class is required for {runtime} jobs"
        )));
    }
    Ok(runtime)
}

fn ensure_step_accepted(result: &SubmissionResult) -> AppResult<()> {
    if result.step_ids.is_empty() {
        return Err(AppError::with_message(
            AppErrorKind::Integration,
            codes::REMOTE_ERROR,
            "StepIds not found in submission output",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::macros::datetime;
    use time::{Duration as TimeDuration, OffsetDateTime};

    use crate::app::types::{
        ClusterInstance, DownloadRequest, JobMode, JobStep, NodeResponse, StepState,
    };

    const T0: OffsetDateTime = datetime!(2026-03-01 10:00 UTC);

    #[derive(Default)]
    struct ScriptedControlPlane {
        clusters: Vec<ClusterDescriptor>,
        instances: Vec<ClusterInstance>,
        active_steps: HashMap<String, Vec<JobStep>>,
        observations: Mutex<HashMap<String, VecDeque<Vec<JobStep>>>>,
        submit_result: Option<SubmissionResult>,
        markers: Mutex<HashSet<(String, String)>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedControlPlane {
        fn with_cluster() -> Self {
            Self {
                clusters: vec![cluster("j-1")],
                submit_result: Some(SubmissionResult {
                    step_ids: vec!["s-new".into()],
                }),
                ..Self::default()
            }
        }

        /// Each `list_steps(.., false)` call pops one observation; the last one
        /// repeats.
        fn observe(self, step_name: &str, observations: Vec<Vec<JobStep>>) -> Self {
            self.observations
                .lock()
                .expect("observations lock")
                .insert(step_name.to_string(), observations.into());
            self
        }

        fn record(&self, call: String) {
            self.calls.lock().expect("calls lock").push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|call| call.starts_with(prefix))
                .collect()
        }
    }

    #[async_trait]
    impl ControlPlanePort for ScriptedControlPlane {
        async fn find_active_clusters(&self, name: &str) -> AppResult<Vec<ClusterDescriptor>> {
            self.record(format!("find_active_clusters:{name}"));
            Ok(self.clusters.clone())
        }

        async fn list_instances(&self, cluster_id: &str) -> AppResult<Vec<ClusterInstance>> {
            self.record(format!("list_instances:{cluster_id}"));
            Ok(self.instances.clone())
        }

        async fn list_steps(
            &self,
            _cluster_id: &str,
            step_name: &str,
            active_only: bool,
        ) -> AppResult<Vec<JobStep>> {
            self.record(format!("list_steps:{step_name}:{active_only}"));
            if active_only {
                return Ok(self.active_steps.get(step_name).cloned().unwrap_or_default());
            }
            let mut observations = self.observations.lock().expect("observations lock");
            let Some(queue) = observations.get_mut(step_name) else {
                return Ok(Vec::new());
            };
            if queue.len() > 1 {
                Ok(queue.pop_front().unwrap_or_default())
            } else {
                Ok(queue.front().cloned().unwrap_or_default())
            }
        }

        async fn submit_step(
            &self,
            _cluster_id: &str,
            step_name: &str,
            args: &[String],
        ) -> AppResult<SubmissionResult> {
            self.record(format!("submit_step:{step_name}:{}", args.join(" ")));
            Ok(self.submit_result.clone().unwrap_or_default())
        }

        async fn terminate_clusters(&self, name: &str) -> AppResult<Vec<String>> {
            self.record(format!("terminate_clusters:{name}"));
            Ok(self.clusters.iter().map(|c| c.id.clone()).collect())
        }

        async fn put_marker(&self, bucket: &str, key: &str) -> AppResult<()> {
            self.record(format!("put_marker:{bucket}/{key}"));
            self.markers
                .lock()
                .expect("markers lock")
                .insert((bucket.to_string(), key.to_string()));
            Ok(())
        }

        async fn delete_marker(&self, bucket: &str, key: &str) -> AppResult<()> {
            self.record(format!("delete_marker:{bucket}/{key}"));
            self.markers
                .lock()
                .expect("markers lock")
                .remove(&(bucket.to_string(), key.to_string()));
            Ok(())
        }

        async fn marker_exists(&self, bucket: &str, key: &str) -> AppResult<bool> {
            self.record(format!("marker_exists:{bucket}/{key}"));
            Ok(self
                .markers
                .lock()
                .expect("markers lock")
                .contains(&(bucket.to_string(), key.to_string())))
        }
    }

    #[derive(Default)]
    struct CountingAgent {
        downloads: AtomicUsize,
        installs: AtomicUsize,
    }

    #[async_trait]
    impl NodeAgentPort for CountingAgent {
        async fn download(
            &self,
            _address: &str,
            _payload: &DownloadRequest,
        ) -> AppResult<NodeResponse> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(NodeResponse {
                status: 200,
                message: None,
            })
        }

        async fn install_requirements(&self, _address: &str) -> AppResult<NodeResponse> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            Ok(NodeResponse {
                status: 200,
                message: None,
            })
        }
    }

    struct ManualClock {
        now: Mutex<OffsetDateTime>,
    }

    impl ClockPort for ManualClock {
        fn now_utc(&self) -> OffsetDateTime {
            *self.now.lock().expect("clock lock")
        }
    }

    /// Advances the manual clock instead of waiting.
    struct AdvancingSleeper {
        clock: Arc<ManualClock>,
        sleeps: AtomicUsize,
    }

    #[async_trait]
    impl SleepPort for AdvancingSleeper {
        async fn sleep(&self, duration: StdDuration) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
            let mut now = self.clock.now.lock().expect("clock lock");
            *now += duration;
        }
    }

    struct Harness {
        control_plane: Arc<ScriptedControlPlane>,
        agent: Arc<CountingAgent>,
        sleeper: Arc<AdvancingSleeper>,
        usecases: UseCases,
    }

    impl Harness {
        fn new(control_plane: ScriptedControlPlane, now: OffsetDateTime) -> Self {
            let control_plane = Arc::new(control_plane);
            let agent = Arc::new(CountingAgent::default());
            let clock = Arc::new(ManualClock {
                now: Mutex::new(now),
            });
            let sleeper = Arc::new(AdvancingSleeper {
                clock: clock.clone(),
                sleeps: AtomicUsize::new(0),
            });
            let usecases = UseCases::new(
                control_plane.clone(),
                agent.clone(),
                clock,
                sleeper.clone(),
                Settings::default(),
            );
            Self {
                control_plane,
                agent,
                sleeper,
                usecases,
            }
        }

        fn sleeps(&self) -> usize {
            self.sleeper.sleeps.load(Ordering::SeqCst)
        }
    }

    fn cluster(id: &str) -> ClusterDescriptor {
        ClusterDescriptor {
            id: id.to_string(),
            name: "DataPipeline".to_string(),
            state: "WAITING".to_string(),
        }
    }

    fn step(id: &str, name: &str, state: StepState, created_at: OffsetDateTime) -> JobStep {
        JobStep {
            id: id.to_string(),
            name: name.to_string(),
            state,
            created_at,
        }
    }

    fn instances(workers: usize) -> Vec<ClusterInstance> {
        let mut out = vec![ClusterInstance {
            private_address: "10.0.0.1".into(),
            role: NodeRole::Master,
        }];
        out.extend((0..workers).map(|i| ClusterInstance {
            private_address: format!("10.0.1.{i}"),
            role: NodeRole::Worker,
        }));
        out
    }

    fn request() -> JobRequest {
        JobRequest {
            env: "qa".into(),
            profile: Some("qa".into()),
            cluster_name: "DataPipeline".into(),
            job_name: "Ingest".into(),
            job_runtime: "scala".into(),
            job_timeout: Some(60),
            job_mode: JobMode::Batch,
            artifact_path: None,
            poll_cluster: false,
            terminate: false,
            shutdown: false,
            checkpoint_bucket: None,
            dryrun: false,
            job_args: String::new(),
            job_configs: String::new(),
            main_class: Some("com.example.Main".into()),
        }
    }

    #[tokio::test]
    async fn unsupported_runtime_fails_before_remote_calls() {
        let harness = Harness::new(ScriptedControlPlane::with_cluster(), T0);
        let mut req = request();
        req.job_runtime = "Ruby".into();
        let err = harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), AppErrorKind::Validation);
        assert!(err.message().contains("scala, java, python"));
        assert!(harness.control_plane.calls().is_empty());
    }

    #[tokio::test]
    async fn jvm_submission_without_main_class_fails_before_remote_calls() {
        let harness = Harness::new(ScriptedControlPlane::with_cluster(), T0);
        let mut req = request();
        req.artifact_path = Some("s3://artifacts/jobs/app.jar".into());
        req.main_class = None;
        let err = harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), AppErrorKind::Validation);
        assert!(harness.control_plane.calls().is_empty());
    }

    #[tokio::test]
    async fn wrong_cluster_count_stops_the_run() {
        for clusters in [vec![], vec![cluster("j-1"), cluster("j-2")]] {
            let count = clusters.len();
            let control_plane = ScriptedControlPlane {
                clusters,
                ..ScriptedControlPlane::default()
            };
            let harness = Harness::new(control_plane, T0);
            let mut req = request();
            req.artifact_path = Some("s3://artifacts/jobs/app.jar".into());
            req.poll_cluster = true;
            req.terminate = true;
            let err = harness
                .usecases
                .handle_job_request(&req)
                .await
                .expect_err("must fail");
            assert_eq!(err.kind(), AppErrorKind::Precondition);
            assert!(err.message().contains(&format!("found {count} running")));
            assert!(err.message().contains("DataPipeline"));
            assert_eq!(
                harness.control_plane.calls(),
                vec!["find_active_clusters:DataPipeline".to_string()]
            );
        }
    }

    #[tokio::test]
    async fn dryrun_submission_distributes_and_returns_command() {
        let control_plane = ScriptedControlPlane {
            instances: instances(3),
            ..ScriptedControlPlane::with_cluster()
        };
        let harness = Harness::new(control_plane, T0);
        let mut req = request();
        req.job_runtime = "python".into();
        req.main_class = None;
        req.dryrun = true;
        req.artifact_path = Some("s3://qa-data-hub/artifacts/btyd-1.0.0/".into());

        let command = harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect("dryrun")
            .expect("command");
        assert!(command.starts_with("aws emr --profile qa add-steps --cluster-id j-1 "));
        assert!(command.contains("s3://qa-data-hub/artifacts/btyd-1.0.0/main.py]"));
        assert_eq!(harness.agent.downloads.load(Ordering::SeqCst), 4);
        assert_eq!(harness.agent.installs.load(Ordering::SeqCst), 4);
        assert!(harness.control_plane.calls_starting_with("submit_step").is_empty());
    }

    #[tokio::test]
    async fn submission_runs_spark_submit_and_counts_executors() {
        let control_plane = ScriptedControlPlane {
            instances: instances(2),
            ..ScriptedControlPlane::with_cluster()
        };
        let harness = Harness::new(control_plane, T0);
        let mut req = request();
        req.artifact_path = Some("s3://artifacts/jobs/app.jar".into());
        req.job_configs = "--executor-memory 4g".into();

        let command = harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect("submit");
        assert!(command.is_some());
        assert_eq!(harness.agent.downloads.load(Ordering::SeqCst), 3);
        assert_eq!(harness.agent.installs.load(Ordering::SeqCst), 0);
        let submits = harness.control_plane.calls_starting_with("submit_step");
        assert_eq!(submits.len(), 1);
        assert!(submits[0].starts_with("submit_step:Ingest:spark-submit --deploy-mode cluster"));
        assert!(submits[0].contains("--num-executors 2"));
    }

    #[tokio::test]
    async fn submission_without_step_ids_is_an_integration_error() {
        let control_plane = ScriptedControlPlane {
            instances: instances(1),
            submit_result: Some(SubmissionResult::default()),
            ..ScriptedControlPlane::with_cluster()
        };
        let harness = Harness::new(control_plane, T0);
        let mut req = request();
        req.artifact_path = Some("s3://artifacts/jobs/app.jar".into());
        let err = harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), AppErrorKind::Integration);
        assert!(err.message().contains("StepIds"));
    }

    #[tokio::test]
    async fn polling_sleeps_between_observations_until_completed() {
        for mode in [JobMode::Batch, JobMode::Streaming] {
            let running = vec![step("s-1", "Ingest", StepState::Running, T0)];
            let done = vec![step("s-1", "Ingest", StepState::Completed, T0)];
            let control_plane = ScriptedControlPlane::with_cluster().observe(
                "Ingest",
                vec![running.clone(), running.clone(), running, done],
            );
            let harness = Harness::new(control_plane, T0);
            let mut req = request();
            req.job_mode = mode;
            req.poll_cluster = true;

            let result = harness.usecases.handle_job_request(&req).await.expect("poll");
            assert!(result.is_none());
            assert_eq!(harness.sleeps(), 3);
            assert_eq!(harness.control_plane.calls_starting_with("list_steps").len(), 4);
        }
    }

    #[tokio::test]
    async fn polling_follows_the_most_recent_step() {
        let old_failure = step("s-old", "Ingest", StepState::Failed, T0);
        let retry = step(
            "s-new",
            "Ingest",
            StepState::Completed,
            T0 + TimeDuration::minutes(5),
        );
        let control_plane = ScriptedControlPlane::with_cluster()
            .observe("Ingest", vec![vec![retry, old_failure]]);
        let harness = Harness::new(control_plane, T0 + TimeDuration::minutes(6));
        let mut req = request();
        req.poll_cluster = true;
        harness.usecases.handle_job_request(&req).await.expect("poll");
        assert_eq!(harness.sleeps(), 0);
    }

    #[tokio::test]
    async fn batch_timeout_is_fatal_and_streaming_timeout_is_not() {
        let started = T0 - TimeDuration::minutes(61);
        let running = vec![step("s-1", "Ingest", StepState::Running, started)];

        let harness = Harness::new(
            ScriptedControlPlane::with_cluster().observe("Ingest", vec![running.clone()]),
            T0,
        );
        let mut req = request();
        req.poll_cluster = true;
        req.terminate = true;
        let err = harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), AppErrorKind::Timeout);
        assert!(err.message().contains("60"));
        assert!(harness.control_plane.calls_starting_with("terminate").is_empty());

        let harness = Harness::new(
            ScriptedControlPlane::with_cluster().observe("Ingest", vec![running]),
            T0,
        );
        req.job_mode = JobMode::Streaming;
        harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect("streaming window elapsed");
        assert_eq!(harness.sleeps(), 0);
        assert_eq!(
            harness.control_plane.calls_starting_with("terminate"),
            vec!["terminate_clusters:DataPipeline".to_string()]
        );
    }

    #[tokio::test]
    async fn timeout_is_measured_from_step_creation() {
        let running = vec![step("s-1", "Ingest", StepState::Running, T0)];
        let harness = Harness::new(
            ScriptedControlPlane::with_cluster().observe("Ingest", vec![running]),
            T0,
        );
        let mut req = request();
        req.poll_cluster = true;
        req.job_timeout = Some(2);
        let err = harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect_err("must time out");
        assert_eq!(err.kind(), AppErrorKind::Timeout);
        // 0, 1 and 2 minutes are within budget; the fourth observation is at 3
        assert_eq!(harness.sleeps(), 3);
    }

    #[tokio::test]
    async fn failed_step_is_fatal_regardless_of_budget() {
        let failed = vec![step("s-9", "Ingest", StepState::Failed, T0)];
        let harness = Harness::new(
            ScriptedControlPlane::with_cluster().observe("Ingest", vec![failed]),
            T0,
        );
        let mut req = request();
        req.poll_cluster = true;
        req.job_timeout = Some(10_000);
        let err = harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), AppErrorKind::JobFailed);
        assert!(err.message().contains("FAILED"));
        assert!(err.to_string().contains("s-9"));
    }

    #[tokio::test]
    async fn polling_an_unknown_step_is_a_precondition_error() {
        let harness = Harness::new(ScriptedControlPlane::with_cluster(), T0);
        let mut req = request();
        req.poll_cluster = true;
        let err = harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), AppErrorKind::Precondition);
        assert!(err.message().contains("found 0 jobs for name Ingest"));
    }

    #[tokio::test]
    async fn shutdown_of_active_job_writes_marker_and_polls_both_steps() {
        let mut active_steps = HashMap::new();
        active_steps.insert(
            "Ingest".to_string(),
            vec![step("s-1", "Ingest", StepState::Running, T0)],
        );
        let control_plane = ScriptedControlPlane {
            active_steps,
            ..ScriptedControlPlane::with_cluster()
        }
        .observe(
            "Ingest",
            vec![vec![step("s-1", "Ingest", StepState::Completed, T0)]],
        )
        .observe(
            CHECKPOINT_COPY_STEP,
            vec![vec![step("s-2", CHECKPOINT_COPY_STEP, StepState::Completed, T0)]],
        );
        let harness = Harness::new(control_plane, T0);
        let mut req = request();
        req.job_mode = JobMode::Streaming;
        req.shutdown = true;
        req.artifact_path = Some("s3://artifacts/jobs/app.jar".into());

        let command = harness.usecases.handle_job_request(&req).await.expect("shutdown");
        assert!(command.is_none());
        assert_eq!(
            harness.control_plane.calls_starting_with("put_marker"),
            vec!["put_marker:qa-checkpoints/Ingest.shutdown.txt".to_string()]
        );
        let submits = harness.control_plane.calls_starting_with("submit_step");
        assert_eq!(submits.len(), 1);
        assert!(submits[0].starts_with("submit_step:S3DistCp:"));
        assert_eq!(
            harness.control_plane.calls_starting_with("list_steps"),
            vec![
                "list_steps:Ingest:true".to_string(),
                "list_steps:Ingest:false".to_string(),
                "list_steps:S3DistCp:false".to_string(),
            ]
        );
        assert_eq!(
            harness.control_plane.calls_starting_with("delete_marker"),
            vec!["delete_marker:qa-checkpoints/Ingest.shutdown.txt".to_string()]
        );
        assert_eq!(harness.agent.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_without_active_job_only_copies_checkpoints() {
        let control_plane = ScriptedControlPlane::with_cluster().observe(
            CHECKPOINT_COPY_STEP,
            vec![vec![step("s-2", CHECKPOINT_COPY_STEP, StepState::Completed, T0)]],
        );
        let harness = Harness::new(control_plane, T0);
        let mut req = request();
        req.job_mode = JobMode::Streaming;
        req.shutdown = true;
        req.checkpoint_bucket = Some("stream-state".into());

        harness.usecases.handle_job_request(&req).await.expect("shutdown");
        assert!(harness.control_plane.calls_starting_with("put_marker").is_empty());
        let submits = harness.control_plane.calls_starting_with("submit_step");
        assert_eq!(submits.len(), 1);
        assert!(submits[0].contains("s3://stream-state/Ingest"));
        assert_eq!(
            harness.control_plane.calls_starting_with("list_steps"),
            vec![
                "list_steps:Ingest:true".to_string(),
                "list_steps:S3DistCp:false".to_string(),
            ]
        );
        assert!(harness.control_plane.calls_starting_with("delete_marker").is_empty());
    }

    #[tokio::test]
    async fn shutdown_ignores_timeout_while_draining() {
        let started = T0 - TimeDuration::minutes(500);
        let control_plane = ScriptedControlPlane::with_cluster().observe(
            CHECKPOINT_COPY_STEP,
            vec![
                vec![step("s-2", CHECKPOINT_COPY_STEP, StepState::Running, started)],
                vec![step("s-2", CHECKPOINT_COPY_STEP, StepState::Completed, started)],
            ],
        );
        let harness = Harness::new(control_plane, T0);
        let mut req = request();
        req.shutdown = true;
        req.job_timeout = Some(1);
        harness.usecases.handle_job_request(&req).await.expect("shutdown");
        assert_eq!(harness.sleeps(), 1);
    }

    #[tokio::test]
    async fn shutdown_dryrun_neither_writes_nor_polls() {
        let mut active_steps = HashMap::new();
        active_steps.insert(
            "Ingest".to_string(),
            vec![step("s-1", "Ingest", StepState::Running, T0)],
        );
        let control_plane = ScriptedControlPlane {
            active_steps,
            ..ScriptedControlPlane::with_cluster()
        };
        let harness = Harness::new(control_plane, T0);
        let mut req = request();
        req.shutdown = true;
        req.dryrun = true;
        req.terminate = true;
        harness.usecases.handle_job_request(&req).await.expect("dryrun");
        assert_eq!(
            harness.control_plane.calls(),
            vec![
                "find_active_clusters:DataPipeline".to_string(),
                "list_steps:Ingest:true".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn dryrun_never_polls_or_terminates() {
        let stale = vec![step("s-old", "Ingest", StepState::Completed, T0)];
        let control_plane = ScriptedControlPlane {
            instances: instances(2),
            ..ScriptedControlPlane::with_cluster()
        }
        .observe("Ingest", vec![stale]);
        let harness = Harness::new(control_plane, T0);
        let mut req = request();
        req.artifact_path = Some("s3://artifacts/jobs/app.jar".into());
        req.poll_cluster = true;
        req.terminate = true;
        req.dryrun = true;

        let command = harness.usecases.handle_job_request(&req).await.expect("dryrun");
        assert!(command.is_some());
        assert_eq!(
            harness.control_plane.calls(),
            vec![
                "find_active_clusters:DataPipeline".to_string(),
                "list_instances:j-1".to_string(),
            ]
        );
        assert_eq!(harness.sleeps(), 0);
    }

    #[tokio::test]
    async fn submission_without_running_instances_is_a_precondition_error() {
        let harness = Harness::new(ScriptedControlPlane::with_cluster(), T0);
        let mut req = request();
        req.artifact_path = Some("s3://artifacts/jobs/app.jar".into());
        let err = harness
            .usecases
            .handle_job_request(&req)
            .await
            .expect_err("must fail");
        assert_eq!(err.kind(), AppErrorKind::Precondition);
        assert!(err.message().contains("found 0 running instances"));
        assert_eq!(harness.agent.downloads.load(Ordering::SeqCst), 0);
        assert!(harness.control_plane.calls_starting_with("submit_step").is_empty());
    }

    #[tokio::test]
    async fn shutdown_rewrites_a_leftover_marker() {
        let mut active_steps = HashMap::new();
        active_steps.insert(
            "Ingest".to_string(),
            vec![step("s-1", "Ingest", StepState::Running, T0)],
        );
        let control_plane = ScriptedControlPlane {
            active_steps,
            ..ScriptedControlPlane::with_cluster()
        }
        .observe(
            "Ingest",
            vec![vec![step("s-1", "Ingest", StepState::Completed, T0)]],
        )
        .observe(
            CHECKPOINT_COPY_STEP,
            vec![vec![step("s-2", CHECKPOINT_COPY_STEP, StepState::Completed, T0)]],
        );
        control_plane
            .markers
            .lock()
            .expect("markers lock")
            .insert(("qa-checkpoints".into(), "Ingest.shutdown.txt".into()));
        let harness = Harness::new(control_plane, T0);
        let mut req = request();
        req.job_mode = JobMode::Streaming;
        req.shutdown = true;

        harness.usecases.handle_job_request(&req).await.expect("shutdown");
        assert_eq!(
            harness.control_plane.calls_starting_with("put_marker"),
            vec!["put_marker:qa-checkpoints/Ingest.shutdown.txt".to_string()]
        );
        // only cleanup looks the marker up
        assert_eq!(harness.control_plane.calls_starting_with("marker_exists").len(), 1);
        assert_eq!(
            harness.control_plane.calls_starting_with("delete_marker"),
            vec!["delete_marker:qa-checkpoints/Ingest.shutdown.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn terminate_runs_after_polling_completes() {
        let control_plane = ScriptedControlPlane::with_cluster().observe(
            "Ingest",
            vec![vec![step("s-1", "Ingest", StepState::Completed, T0)]],
        );
        let harness = Harness::new(control_plane, T0);
        let mut req = request();
        req.poll_cluster = true;
        req.terminate = true;
        harness.usecases.handle_job_request(&req).await.expect("run");
        let calls = harness.control_plane.calls();
        assert_eq!(calls.last().map(String::as_str), Some("terminate_clusters:DataPipeline"));
    }

    #[test]
    fn marker_key_uses_job_name() {
        assert_eq!(shutdown_marker_key("Ingest"), "Ingest.shutdown.txt");
    }
}
