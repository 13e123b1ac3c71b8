// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Provider CLI command lines, rendered for logs and `--dryrun` output.

use tera::Context;

use crate::app::errors::{AppError, AppResult};
use crate::app::services::step_args::StepArgs;

const ADD_STEP_TEMPLATE: &str = "aws emr{% if profile %} --profile {{ profile }}{% endif %} \
add-steps --cluster-id {{ cluster_id }} \
--steps Type=Spark,Name={{ job_name }},ActionOnFailure=CONTINUE,Args={{ step_args }}";

const TERMINATE_TEMPLATE: &str = "aws emr{% if profile %} --profile {{ profile }}{% endif %} \
terminate-clusters --cluster-id {{ cluster_id }}";

pub fn render_add_step(
    profile: Option<&str>,
    cluster_id: &str,
    job_name: &str,
    step_args: &StepArgs,
) -> AppResult<String> {
    let mut context = Context::new();
    context.insert("profile", &profile.unwrap_or_default());
    context.insert("cluster_id", cluster_id);
    context.insert("job_name", job_name);
    context.insert("step_args", &step_args.to_bracketed());
    render(ADD_STEP_TEMPLATE, &context)
}

pub fn render_terminate(profile: Option<&str>, cluster_id: &str) -> AppResult<String> {
    let mut context = Context::new();
    context.insert("profile", &profile.unwrap_or_default());
    context.insert("cluster_id", cluster_id);
    render(TERMINATE_TEMPLATE, &context)
}

fn render(template: &str, context: &Context) -> AppResult<String> {
    tera::Tera::one_off(template, context, false)
        .map_err(|err| AppError::internal(format!("command render failed: {err}")))
}
