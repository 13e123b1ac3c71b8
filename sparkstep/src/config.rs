// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

const APP_DIR_NAME: &str = "sparkstep";
const CONFIG_FILE_NAME: &str = "sparkstep.toml";
const CONFIG_ENV_VAR: &str = "SPARKSTEP_CONFIG_PATH";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_DISTRIBUTION_CONCURRENCY: usize = 7;
const DEFAULT_AGENT_PORT: u16 = 8080;
const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    region: Option<String>,
    poll_interval_secs: Option<u64>,
    distribution_concurrency: Option<usize>,
    agent_port: Option<u16>,
    agent_timeout_secs: Option<u64>,
    verbose: Option<bool>,
    #[serde(default)]
    profiles: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct Config {
    pub region: Option<String>,
    pub poll_interval_secs: u64,
    pub distribution_concurrency: usize,
    pub agent_port: u16,
    pub agent_timeout_secs: u64,
    pub verbose: bool,
    /// Environment name to credential profile.
    pub profiles: BTreeMap<String, String>,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    /// An explicit profile wins; otherwise the `[profiles]` entry for `env`.
    pub fn profile_for(&self, env: &str, explicit: Option<String>) -> Option<String> {
        explicit
            .filter(|profile| !profile.trim().is_empty())
            .or_else(|| self.profiles.get(env).cloned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub region: ConfigValue<Option<String>>,
    pub poll_interval_secs: ConfigValue<u64>,
    pub distribution_concurrency: ConfigValue<usize>,
    pub agent_port: ConfigValue<u16>,
    pub agent_timeout_secs: ConfigValue<u64>,
    pub verbose: ConfigValue<bool>,
    pub profiles: usize,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub region: Option<String>,
    pub verbose: Option<bool>,
}

fn pick<T>(over: Option<T>, file: Option<T>, default: T) -> (T, ConfigSource) {
    match (over, file) {
        (Some(value), _) => (value, ConfigSource::Override),
        (None, Some(value)) => (value, ConfigSource::ConfigFile),
        (None, None) => (default, ConfigSource::Default),
    }
}

#[cfg(test)]
fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    Ok(load_with_report(config_path_override, overrides)?.config)
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path
        .as_deref()
        .map(|path| path.exists())
        .unwrap_or(false);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };

    let (region, region_source) = match (overrides.region, file_config.region) {
        (Some(region), _) => (Some(region), ConfigSource::Override),
        (None, Some(region)) => (Some(region), ConfigSource::ConfigFile),
        (None, None) => (None, ConfigSource::Default),
    };
    let (poll_interval_secs, poll_source) = pick(
        None,
        file_config.poll_interval_secs,
        DEFAULT_POLL_INTERVAL_SECS,
    );
    if poll_interval_secs == 0 {
        anyhow::bail!("poll_interval_secs must be at least 1");
    }
    let (distribution_concurrency, concurrency_source) = pick(
        None,
        file_config.distribution_concurrency,
        DEFAULT_DISTRIBUTION_CONCURRENCY,
    );
    if distribution_concurrency == 0 {
        anyhow::bail!("distribution_concurrency must be at least 1");
    }
    let (agent_port, agent_port_source) =
        pick(None, file_config.agent_port, DEFAULT_AGENT_PORT);
    if agent_port == 0 {
        anyhow::bail!("agent_port must be between 1 and 65535");
    }
    let (agent_timeout_secs, agent_timeout_source) = pick(
        None,
        file_config.agent_timeout_secs,
        DEFAULT_AGENT_TIMEOUT_SECS,
    );
    let (verbose, verbose_source) = pick(overrides.verbose, file_config.verbose, false);

    let config = Config {
        region,
        poll_interval_secs,
        distribution_concurrency,
        agent_port,
        agent_timeout_secs,
        verbose,
        profiles: file_config.profiles,
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        region: ConfigValue {
            value: config.region.clone(),
            source: region_source,
        },
        poll_interval_secs: ConfigValue {
            value: config.poll_interval_secs,
            source: poll_source,
        },
        distribution_concurrency: ConfigValue {
            value: config.distribution_concurrency,
            source: concurrency_source,
        },
        agent_port: ConfigValue {
            value: config.agent_port,
            source: agent_port_source,
        },
        agent_timeout_secs: ConfigValue {
            value: config.agent_timeout_secs,
            source: agent_timeout_source,
        },
        verbose: ConfigValue {
            value: config.verbose,
            source: verbose_source,
        },
        profiles: config.profiles.len(),
    };

    Ok(LoadResult { config, report })
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}
