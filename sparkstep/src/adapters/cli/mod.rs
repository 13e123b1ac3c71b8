// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser, ValueEnum};

use crate::app::types::{JobMode, JobRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobModeArg {
    Batch,
    Streaming,
}

impl From<JobModeArg> for JobMode {
    fn from(value: JobModeArg) -> Self {
        match value {
            JobModeArg::Batch => JobMode::Batch,
            JobModeArg::Streaming => JobMode::Streaming,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "sparkstep",
    version,
    about = "Submit, monitor and gracefully stop Spark steps on a running cluster",
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: default location < SPARKSTEP_CONFIG_PATH < --config.\n\
The credential profile is --profile if given, otherwise the [profiles] entry for --env.\n\
The rendered submission command is printed on stdout; logs go to stderr."
)]
pub struct Opts {
    #[arg(long, value_name = "ENV", help = "Deployment environment, e.g. qa or prod.")]
    pub env: String,
    #[arg(long, value_name = "NAME", help = "Step name; also used to find the step when polling.")]
    pub job_name: String,
    #[arg(long, value_enum, value_name = "MODE")]
    pub job_mode: JobModeArg,
    #[arg(
        long,
        value_name = "RUNTIME",
        default_value = "scala",
        help = "One of scala, java, python."
    )]
    pub job_runtime: String,
    #[arg(
        long,
        value_name = "MINUTES",
        default_value_t = 60,
        conflicts_with = "no_timeout",
        help = "Minutes after step creation before a batch step fails or a streaming step stops being watched."
    )]
    pub job_timeout: u64,
    #[arg(long, help = "Poll without a time limit.")]
    pub no_timeout: bool,
    #[arg(long, value_name = "NAME", default_value = "DataPipeline")]
    pub cluster_name: String,
    #[arg(
        long,
        value_name = "URL",
        help = "Artifact to submit, as s3://bucket/key. Python artifacts are a directory prefix ending in '/'."
    )]
    pub artifact_path: Option<String>,
    #[arg(long, help = "Wait for the step to finish.")]
    pub poll_cluster: bool,
    #[arg(long, help = "Terminate the cluster once polling has finished.")]
    pub auto_terminate: bool,
    #[arg(
        long,
        value_name = "BUCKET",
        help = "Bucket for checkpoints and shutdown markers. Defaults to <env>-checkpoints."
    )]
    pub checkpoint_bucket: Option<String>,
    #[arg(long, help = "Gracefully stop a streaming job and copy its checkpoints.")]
    pub shutdown: bool,
    #[arg(long, help = "Render and log everything but do not submit or write.")]
    pub dryrun: bool,
    #[arg(long, value_name = "ARGS", default_value = "", allow_hyphen_values = true)]
    pub job_args: String,
    #[arg(
        long,
        value_name = "CONFIGS",
        default_value = "",
        allow_hyphen_values = true,
        help = "Extra spark-submit options; disables dynamic allocation."
    )]
    pub job_configs: String,
    #[arg(long, value_name = "CLASS", help = "Main class, required for scala and java.")]
    pub main_class: Option<String>,
    #[arg(long, value_name = "PROFILE", help = "Credential profile. Overrides the [profiles] table.")]
    pub profile: Option<String>,
    #[arg(long, value_name = "REGION", help = "Overrides `region` from the config file.")]
    pub region: Option<String>,
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, SPARKSTEP_CONFIG_PATH or the default location is used."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short,
        long,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
}

impl Opts {
    pub fn job_timeout(&self) -> Option<u64> {
        (!self.no_timeout).then_some(self.job_timeout)
    }

    pub fn into_request(self, profile: Option<String>) -> JobRequest {
        let job_timeout = self.job_timeout();
        JobRequest {
            env: self.env,
            profile,
            cluster_name: self.cluster_name,
            job_name: self.job_name,
            job_runtime: self.job_runtime,
            job_timeout,
            job_mode: self.job_mode.into(),
            artifact_path: self.artifact_path.filter(|path| !path.trim().is_empty()),
            poll_cluster: self.poll_cluster,
            terminate: self.auto_terminate,
            shutdown: self.shutdown,
            checkpoint_bucket: self.checkpoint_bucket,
            dryrun: self.dryrun,
            job_args: self.job_args,
            job_configs: self.job_configs,
            main_class: self.main_class,
        }
    }
}

pub struct ParsedOpts {
    pub opts: Opts,
    pub verbose_override: Option<bool>,
}

const HELP_TEMPLATE: &str = r#"  ___ _ __   __ _ _ __| | __  ___| |_ ___ _ __
 / __| '_ \ / _` | '__| |/ / / __| __/ _ \ '_ \
 \__ \ |_) | (_| | |  |   <  \__ \ ||  __/ |_) |
 |___/ .__/ \__,_|_|  |_|\_\ |___/\__\___| .__/
     |_|                                 |_|

{before-help}{about-with-newline}{usage-heading} {usage}
{after-help}

{all-args}
"#;

pub fn cli_command() -> clap::Command {
    Opts::command().help_template(HELP_TEMPLATE)
}

pub fn parse_opts() -> ParsedOpts {
    let matches = cli_command().get_matches();
    let verbose_override = matches.get_flag("verbose").then_some(true);
    let opts = Opts::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    ParsedOpts {
        opts,
        verbose_override,
    }
}
