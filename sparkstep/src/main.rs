// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

mod adapters;
mod app;
mod config;
mod logging;

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), Some(source)) => {
            tracing::info!(
                path = %path.display(),
                source = source.as_str(),
                present = report.config_file_present,
                "config path"
            );
        }
        (Some(path), None) => {
            tracing::info!(
                path = %path.display(),
                present = report.config_file_present,
                "config path"
            );
        }
        (None, _) => tracing::info!("config path: (none)"),
    }
    tracing::info!(
        value = report.region.value.as_deref().unwrap_or("(provider default)"),
        source = report.region.source.as_str(),
        "config region"
    );
    tracing::info!(
        value = report.poll_interval_secs.value,
        source = report.poll_interval_secs.source.as_str(),
        "config poll_interval_secs"
    );
    tracing::info!(
        value = report.distribution_concurrency.value,
        source = report.distribution_concurrency.source.as_str(),
        "config distribution_concurrency"
    );
    tracing::info!(
        value = report.agent_port.value,
        source = report.agent_port.source.as_str(),
        "config agent_port"
    );
    tracing::info!(
        value = report.agent_timeout_secs.value,
        source = report.agent_timeout_secs.source.as_str(),
        "config agent_timeout_secs"
    );
    tracing::info!(
        value = report.verbose.value,
        source = report.verbose.source.as_str(),
        "config verbose"
    );
    tracing::debug!(count = report.profiles, "config profiles");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = adapters::cli::parse_opts();
    let opts = parsed.opts;
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config.clone(),
        config::Overrides {
            region: opts.region.clone(),
            verbose: parsed.verbose_override,
        },
    )?;
    logging::init(config.verbose);
    log_config_report(&report);

    let profile = config.profile_for(&opts.env, opts.profile.clone());
    let control_plane = Arc::new(
        adapters::emr::EmrControlPlane::connect(profile.as_deref(), config.region.as_deref())
            .await,
    );
    let node_agent = Arc::new(adapters::node_agent::HttpNodeAgent::new(
        config.agent_port,
        config.agent_timeout(),
    )?);
    let clock = Arc::new(adapters::time::SystemClock::new());
    let sleeper = Arc::new(adapters::time::TokioSleeper::new());

    let usecases = app::usecases::UseCases::new(
        control_plane,
        node_agent,
        clock,
        sleeper,
        app::usecases::Settings {
            poll_interval: config.poll_interval(),
            distribution_concurrency: config.distribution_concurrency,
        },
    );

    let request = opts.into_request(profile);
    match usecases.handle_job_request(&request).await {
        Ok(command) => {
            if let Some(command) = command {
                println!("{command}");
            }
            Ok(())
        }
        Err(err) => {
            tracing::error!(
                kind = err.kind().as_str(),
                code = err.code(),
                context = err.context().unwrap_or_default(),
                error = %err.message(),
                "job request failed"
            );
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}
