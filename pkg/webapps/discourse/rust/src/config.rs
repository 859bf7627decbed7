// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mode::RuntimeMode;
use crate::procfs::comm_name;

pub const CONFIG_ENV_VAR: &str = "DISCOURSE_LAUNCHER_CONFIG";

pub const DEFAULT_WORKER: &str = "unicorn";
pub const DEFAULT_INTERPRETER: &str = "ruby";
pub const DEFAULT_ENTRY_COMMAND: &str = "rbenv exec ruby ./bin/unicorn -c config/unicorn.conf.rb -D";
pub const DEFAULT_SHELL: &str = "/bin/bash";
pub const DEFAULT_SIDEKIQ_COMMAND: &str =
    "bundle exec sidekiq -L log/sidekiq.log -P tmp/sidekiq.pid -q critical -q low -q default -d -c5";
const DEFAULT_PID_WAIT_MS: u64 = 2000;

fn default_worker() -> String {
    DEFAULT_WORKER.to_string()
}

fn default_interpreter() -> String {
    DEFAULT_INTERPRETER.to_string()
}

fn default_entry_command() -> String {
    DEFAULT_ENTRY_COMMAND.to_string()
}

fn default_sidekiq_command() -> String {
    DEFAULT_SIDEKIQ_COMMAND.to_string()
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

fn default_shell_args() -> Vec<String> {
    vec!["-ic".to_string()]
}

fn default_pid_wait_ms() -> u64 {
    DEFAULT_PID_WAIT_MS
}

/// Heap tuning and allocator preload applied to every worker.
pub fn default_env() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "LD_PRELOAD".to_string(),
            "/usr/lib64/libjemalloc.so.1".to_string(),
        ),
        (
            "RUBY_GLOBAL_METHOD_CACHE_SIZE".to_string(),
            "131072".to_string(),
        ),
        ("UNICORN_SIDEKIQS".to_string(), "1".to_string()),
    ])
}

/// Everything a `Launcher` needs to know about one application instance.
///
/// Concurrent management of the same `app_root` by more than one supervisor
/// is unsupported: the launcher and PID file are accessed without locking.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    pub app_root: PathBuf,
    /// Base name of the PID file under `tmp/pids/`.
    #[serde(default = "default_worker")]
    pub worker: String,
    /// Expected `comm` of a live worker.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default)]
    pub mode: RuntimeMode,
    #[serde(default = "default_env")]
    pub env: BTreeMap<String, String>,
    #[serde(default = "default_entry_command")]
    pub entry_command: String,
    /// Daemonizing background job worker. Must write `tmp/sidekiq.pid`.
    #[serde(default = "default_sidekiq_command")]
    pub sidekiq_command: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_shell_args")]
    pub shell_args: Vec<String>,
    #[serde(default = "default_pid_wait_ms")]
    pub pid_wait_ms: u64,
}

impl SupervisorConfig {
    pub fn new(app_root: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
            worker: default_worker(),
            interpreter: default_interpreter(),
            mode: RuntimeMode::default(),
            env: default_env(),
            entry_command: default_entry_command(),
            sidekiq_command: default_sidekiq_command(),
            shell: default_shell(),
            shell_args: default_shell_args(),
            pid_wait_ms: default_pid_wait_ms(),
        }
    }

    /// `interpreter` as it appears in `/proc/<pid>/comm`.
    pub fn expected_comm(&self) -> &str {
        comm_name(&self.interpreter)
    }

    pub fn pid_wait(&self) -> Duration {
        Duration::from_millis(self.pid_wait_ms)
    }
}

/// Config file path from the environment, if set.
pub fn config_path_from_env() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from)
}

pub fn load_config(path: &Path) -> Result<SupervisorConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: SupervisorConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}
