// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! spark-submit argument builders.
//!
//! Each runtime family contributes its own fragment; [`build_step_args`]
//! stitches the common prefix, the runtime fragment and the trailing job
//! arguments together. Everything here is pure.

use crate::app::types::{ArtifactLocation, JobRuntime};

const HADOOP_CLASSPATH: &str = "/etc/hadoop/conf:/etc/hive/conf:/usr/lib/hadoop-lzo/lib/*:\
/usr/share/aws/emr/emrfs/conf:/usr/share/aws/emr/emrfs/lib/*:/usr/share/aws/emr/emrfs/auxlib/*";
const NODE_ARTIFACT_DIR: &str = "/home/hadoop";

/// Inputs of the formatter, borrowed from the request and the values the
/// orchestrator computed so far.
#[derive(Debug, Clone)]
pub struct StepArgsInput<'a> {
    pub job_name: &'a str,
    pub runtime: JobRuntime,
    pub env: &'a str,
    pub artifact_path: &'a str,
    pub artifact: &'a ArtifactLocation,
    pub main_class: Option<&'a str>,
    pub job_args: &'a str,
    pub job_configs: &'a str,
    pub num_executors: usize,
}

/// Ordered spark-submit tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepArgs(Vec<String>);

impl StepArgs {
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    /// `[a,b,c]`, the form the provider CLI expects for `Args=`.
    pub fn to_bracketed(&self) -> String {
        bracketed(&self.0)
    }

    fn flag(&mut self, name: &str, value: impl Into<String>) {
        self.0.push(name.to_string());
        self.0.push(value.into());
    }

    fn conf(&mut self, key: &str, value: impl std::fmt::Display) {
        self.flag("--conf", format!("{key}={value}"));
    }

    fn extend_split(&mut self, raw: &str) {
        self.0.extend(split_tokens(raw));
    }
}

/// Whitespace split that never yields empty tokens.
pub fn split_tokens(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split_whitespace().map(str::to_string)
}

/// `"arg1 arg2 arg3"` becomes `"[arg1,arg2,arg3]"`; blank input becomes `"[]"`.
pub fn tokenize(arguments: &str) -> String {
    let tokens: Vec<String> = split_tokens(arguments).collect();
    bracketed(&tokens)
}

fn bracketed(tokens: &[String]) -> String {
    format!("[{}]", tokens.join(","))
}

pub fn build_step_args(input: &StepArgsInput<'_>) -> StepArgs {
    let mut args = StepArgs::default();
    common_prefix(&mut args, input);
    if input.runtime.is_interpreted() {
        python_submission(&mut args, input);
    } else {
        jvm_submission(&mut args, input);
    }
    args.extend_split(input.job_args);
    args
}

/// Full command-runner line for a Spark step.
pub fn spark_submit_command(args: &StepArgs) -> StepArgs {
    let mut command = StepArgs(Vec::with_capacity(args.0.len() + 1));
    command.0.push("spark-submit".to_string());
    command.0.extend(args.0.iter().cloned());
    command
}

/// Copies the job's HDFS checkpoints to `s3://<bucket>/<job_name>`.
pub fn checkpoint_copy_command(job_name: &str, bucket: &str) -> StepArgs {
    let mut command = StepArgs(vec!["s3-dist-cp".to_string()]);
    command.flag("--src", format!("hdfs:///checkpoints/{job_name}"));
    command.flag("--dest", format!("s3://{bucket}/{job_name}"));
    command
}

fn common_prefix(args: &mut StepArgs, input: &StepArgsInput<'_>) {
    args.flag("--deploy-mode", "cluster");
    args.flag("--master", "yarn");
    let explicit_configs = !input.job_configs.trim().is_empty();
    args.extend_split(input.job_configs);
    args.conf("spark.app.name", input.job_name);
    // explicit configs pin executor sizing, so dynamic allocation goes off
    args.conf("spark.shuffle.service.enabled", !explicit_configs);
    args.conf("spark.dynamicAllocation.enabled", !explicit_configs);
    if explicit_configs && input.num_executors > 0 {
        args.flag("--num-executors", input.num_executors.to_string());
    }
}

fn python_submission(args: &mut StepArgs, input: &StepArgsInput<'_>) {
    args.conf("spark.yarn.appMasterEnv.ENVIRONMENT", input.env);
    args.flag("--py-files", format!("{}application.zip", input.artifact_path));
    args.0.push(format!("{}main.py", input.artifact_path));
}

fn jvm_submission(args: &mut StepArgs, input: &StepArgsInput<'_>) {
    if let Some(main_class) = input.main_class {
        args.flag("--class", main_class);
    }
    args.conf(
        "spark.driver.extraClassPath",
        format!(
            "{NODE_ARTIFACT_DIR}/{}:{HADOOP_CLASSPATH}",
            input.artifact.key
        ),
    );
    args.conf(
        "spark.executor.extraClassPath",
        format!("{NODE_ARTIFACT_DIR}/*:{HADOOP_CLASSPATH}"),
    );
    let java_options = format!("-DenvironmentKey={}", input.env);
    args.conf("spark.driver.extraJavaOptions", &java_options);
    args.conf("spark.executor.extraJavaOptions", &java_options);
    args.0.push(input.artifact_path.to_string());
}
