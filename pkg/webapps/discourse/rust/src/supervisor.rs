// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Lifecycle of the worker behind one application root.
//!
//! The supervisor keeps no state of its own. The launcher script, the PID
//! file written by the worker and the OS process table are the only sources
//! of truth, and every operation re-reads them. Neither file is locked: one
//! supervisor per application root is assumed.

use log::{debug, info, warn};
use std::fs::Permissions;
use std::ops::RangeInclusive;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{Duration, Instant, sleep};

use crate::config::SupervisorConfig;
use crate::errors::{Error, Result};
use crate::exec::{CommandRunner, ShellCommand, ShellRunner};
use crate::metadata::{LaunchMetadata, METADATA_NAME};
use crate::pidfile;
use crate::ports::{PortProbe, ProcNetProbe};
use crate::procfs::{ProcFs, ProcessTable, Signal};
use crate::proxy::{self, CronEntry};
use crate::script::{self, LAUNCHER_NAME, MODE_ENV_VAR, ScriptTemplate};
use crate::state::WorkerState;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const SIGKILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Written by Sidekiq itself (`-P`), relative to the application root.
pub const SIDEKIQ_PID_FILE: &str = "tmp/sidekiq.pid";

const CRONTAB: &str = "crontab";

pub struct Launcher {
    config: SupervisorConfig,
    runner: Arc<dyn CommandRunner>,
    processes: Arc<dyn ProcessTable>,
    ports: Arc<dyn PortProbe>,
}

impl Launcher {
    pub fn new(
        config: SupervisorConfig,
        runner: Arc<dyn CommandRunner>,
        processes: Arc<dyn ProcessTable>,
        ports: Arc<dyn PortProbe>,
    ) -> Self {
        Self {
            config,
            runner,
            processes,
            ports,
        }
    }

    /// Launcher backed by real child processes, `/proc` and the host socket
    /// tables.
    pub fn with_system(config: SupervisorConfig) -> Self {
        Self::new(
            config,
            Arc::new(ShellRunner),
            Arc::new(ProcFs::new()),
            Arc::new(ProcNetProbe::new()),
        )
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn app_root(&self) -> &Path {
        &self.config.app_root
    }

    pub fn launcher_path(&self) -> PathBuf {
        self.app_root().join(LAUNCHER_NAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.app_root().join(METADATA_NAME)
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.app_root()
            .join("tmp")
            .join("pids")
            .join(format!("{}.pid", self.config.worker))
    }

    /// Write an executable launcher bound to `port`, replacing any previous
    /// one. Nothing is written when the port is already in use.
    pub fn create(&self, port: u16) -> Result<()> {
        if !self.ports.is_free(port) {
            return Err(Error::PortInUse(port));
        }

        let template = ScriptTemplate::from_config(&self.config);
        let text = script::render(self.app_root(), port, self.config.mode, &template)?;

        // Written aside and renamed so an interrupted write never leaves a
        // truncated launcher behind.
        let path = self.launcher_path();
        let tmp_path = path.with_extension("sh.tmp");
        std::fs::write(&tmp_path, text)
            .map_err(|e| Error::io("failed to write launcher", &tmp_path, e))?;
        std::fs::set_permissions(&tmp_path, Permissions::from_mode(0o755))
            .map_err(|e| Error::io("failed to make launcher executable", &tmp_path, e))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| Error::io("failed to install launcher", &path, e))?;

        let metadata = LaunchMetadata::new(port, self.config.mode, self.config.worker.as_str());
        if let Err(e) = metadata.write(&self.metadata_path()) {
            warn!("[{}] {e}", self.app_root().display());
        }

        info!(
            "[{}] launcher created (port={port}, mode={})",
            self.app_root().display(),
            self.config.mode
        );
        Ok(())
    }

    /// Create the launcher on the first free port in `range`.
    pub fn create_first_free(&self, range: RangeInclusive<u16>) -> Result<u16> {
        let (start, end) = (*range.start(), *range.end());
        let port = self
            .ports
            .first_free(range)
            .ok_or(Error::NoFreePort { start, end })?;
        self.create(port)?;
        Ok(port)
    }

    pub fn exists(&self) -> bool {
        self.launcher_path().is_file()
    }

    /// Port the launcher binds, recovered from the script text.
    pub fn get_port(&self) -> Result<u16> {
        let path = self.launcher_path();
        if !self.exists() {
            return Err(Error::LauncherMissing(path));
        }

        let text = std::fs::read_to_string(&path)
            .map_err(|e| Error::io("failed to read launcher", &path, e))?;
        let port = script::parse_port(&text).ok_or_else(|| Error::PortNotFound(path.clone()))?;

        match LaunchMetadata::read(&self.metadata_path()) {
            Ok(Some(metadata)) if metadata.port != port => warn!(
                "[{}] launcher port {port} disagrees with {} port {}, was the script edited?",
                self.app_root().display(),
                METADATA_NAME,
                metadata.port
            ),
            Ok(_) => {}
            Err(e) => warn!("[{}] {e}", self.app_root().display()),
        }

        Ok(port)
    }

    /// Shell invocation of the launcher.
    pub fn command(&self) -> ShellCommand {
        let launcher = self.launcher_path();
        ShellCommand::new(self.config.shell.as_str())
            .args(self.config.shell_args.iter().cloned())
            .arg(script::shell_quote(&launcher.to_string_lossy()))
            .current_dir(self.app_root())
    }

    /// Run the launcher and return the PID the worker recorded. `Ok(None)`
    /// when the launcher failed or no PID file appeared in time.
    pub async fn start(&self) -> Result<Option<u32>> {
        if !self.exists() {
            return Err(Error::LauncherMissing(self.launcher_path()));
        }

        Ok(self
            .launch("launcher", &self.command(), &self.pid_file_path())
            .await)
    }

    /// Run `command` and wait for `pid_file` to name a new process.
    async fn launch(&self, what: &str, command: &ShellCommand, pid_file: &Path) -> Option<u32> {
        let previous = pidfile::read_pid(pid_file);

        let output = match self.runner.run(command).await {
            Ok(output) => output,
            Err(e) => {
                warn!("[{}] failed to run {command}: {e}", self.app_root().display());
                return None;
            }
        };
        if !output.success {
            warn!(
                "[{}] {what} exited with {}: {}",
                self.app_root().display(),
                output
                    .code
                    .map_or_else(|| "signal".to_string(), |c| format!("code {c}")),
                output.stderr.trim()
            );
            return None;
        }

        let pid = pidfile::wait_for_pid(pid_file, previous, self.config.pid_wait()).await;
        match pid {
            Some(pid) => info!("[{}] {what} started (pid={pid})", self.app_root().display()),
            None => warn!(
                "[{}] {what} succeeded but {} was not written",
                self.app_root().display(),
                pid_file.display()
            ),
        }
        pid
    }

    /// Whether the PID file names a live process running the interpreter.
    pub fn running(&self) -> bool {
        pidfile::read_pid(&self.pid_file_path()).is_some_and(|pid| {
            pidfile::pid_matches(self.processes.as_ref(), pid, &self.config.interpreter)
        })
    }

    pub fn state(&self) -> WorkerState {
        if !self.exists() {
            return WorkerState::Unconfigured;
        }
        self.observe()
    }

    fn observe(&self) -> WorkerState {
        let Some(pid) = pidfile::read_pid(&self.pid_file_path()) else {
            return WorkerState::Stopped;
        };
        match self.processes.comm(pid) {
            Ok(comm) if comm == self.config.expected_comm() => WorkerState::Running { pid },
            Ok(comm) => WorkerState::Stale { pid, comm },
            Err(_) => WorkerState::Stopped,
        }
    }

    /// Ask the worker to exit. Returns without waiting for it.
    pub fn stop(&self) -> bool {
        self.send(Signal::SIGTERM)
    }

    /// Force the worker down.
    pub fn kill(&self) -> bool {
        self.send(Signal::SIGKILL)
    }

    fn send(&self, sig: Signal) -> bool {
        let pid = match self.observe() {
            WorkerState::Running { pid } => pid,
            WorkerState::Stale { pid, comm } => {
                warn!(
                    "[{}] Discourse is not running: pid {pid} belongs to {comm}",
                    self.app_root().display()
                );
                return false;
            }
            _ => {
                warn!("[{}] Discourse is not running", self.app_root().display());
                return false;
            }
        };

        match self.processes.signal(pid, sig) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "[{}] failed to send {sig} to pid {pid}: {e}",
                    self.app_root().display()
                );
                false
            }
        }
    }

    /// Stop then start. The old worker may still be exiting when the new one
    /// launches.
    pub async fn restart(&self) -> Result<bool> {
        self.stop();
        Ok(self.start().await?.is_some())
    }

    /// SIGTERM, wait up to `stop_timeout` for the worker to go away, then
    /// SIGKILL. Returns whether the worker is gone.
    pub async fn shutdown(&self, stop_timeout: Duration) -> bool {
        if !self.stop() {
            return !self.running();
        }
        if self.wait_stopped(stop_timeout).await {
            return true;
        }

        warn!(
            "[{}] stop timeout ({}ms) reached, sending SIGKILL",
            self.app_root().display(),
            stop_timeout.as_millis()
        );
        self.kill();
        let gone = self.wait_stopped(SIGKILL_TIMEOUT).await;
        if !gone {
            warn!(
                "[{}] still running after SIGKILL, giving up",
                self.app_root().display()
            );
        }
        gone
    }

    pub fn sidekiq_pid_file_path(&self) -> PathBuf {
        self.app_root().join(SIDEKIQ_PID_FILE)
    }

    /// Shell invocation of Sidekiq in the application root.
    pub fn sidekiq_command(&self) -> ShellCommand {
        ShellCommand::new(self.config.shell.as_str())
            .args(self.config.shell_args.iter().cloned())
            .arg(self.config.sidekiq_command.as_str())
            .env(MODE_ENV_VAR, self.config.mode.as_str())
            .current_dir(self.app_root())
    }

    /// PID of a live Sidekiq, cross-checked against the interpreter.
    pub fn sidekiq_running(&self) -> Option<u32> {
        pidfile::read_pid(&self.sidekiq_pid_file_path()).filter(|pid| {
            pidfile::pid_matches(self.processes.as_ref(), *pid, &self.config.interpreter)
        })
    }

    /// Start Sidekiq unless it already runs, and make sure it comes back on
    /// boot. Returns its PID.
    pub async fn launch_sidekiq(&self) -> Option<u32> {
        if let Some(pid) = self.sidekiq_running() {
            debug!("[{}] Sidekiq already running (pid={pid})", self.app_root().display());
            return Some(pid);
        }

        if let Err(e) = self.install_boot_job(&self.sidekiq_boot_job()).await {
            warn!("[{}] {e}", self.app_root().display());
        }

        let pid = self
            .launch("Sidekiq", &self.sidekiq_command(), &self.sidekiq_pid_file_path())
            .await;
        if pid.is_none() {
            warn!(
                "[{}] failed to launch Sidekiq, check log/sidekiq.log",
                self.app_root().display()
            );
        }
        pid
    }

    /// SIGKILL Sidekiq. `false` when it is not running.
    pub fn kill_sidekiq(&self) -> bool {
        let Some(pid) = self.sidekiq_running() else {
            return false;
        };
        match self.processes.signal(pid, Signal::SIGKILL) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "[{}] failed to kill Sidekiq (pid={pid}): {e}",
                    self.app_root().display()
                );
                false
            }
        }
    }

    pub fn boot_job(&self) -> CronEntry {
        proxy::boot_job(self.command().to_string())
    }

    pub fn sidekiq_boot_job(&self) -> CronEntry {
        let line = format!(
            "cd {} && env {MODE_ENV_VAR}={} {}",
            script::shell_quote(&self.app_root().to_string_lossy()),
            self.config.mode,
            self.config.sidekiq_command
        );
        let command = ShellCommand::new(self.config.shell.as_str())
            .args(self.config.shell_args.iter().cloned())
            .arg(line);
        proxy::boot_job(command.to_string())
    }

    /// Add `job` to the user crontab unless it is already there. Returns
    /// whether the crontab changed.
    pub async fn install_boot_job(&self, job: &CronEntry) -> Result<bool> {
        let mut crontab = self.read_crontab().await?;
        if proxy::contains_job(&crontab, job) {
            return Ok(false);
        }
        if !crontab.is_empty() && !crontab.ends_with('\n') {
            crontab.push('\n');
        }
        crontab.push_str(&format!("{job}\n"));
        self.write_crontab(&crontab).await?;
        info!("[{}] scheduled `{job}'", self.app_root().display());
        Ok(true)
    }

    /// Kill both workers and drop every scheduled job mentioning the
    /// application root. Returns the removed jobs.
    pub async fn uninstall(&self) -> Result<Vec<CronEntry>> {
        if self.running() {
            self.kill();
        }
        self.kill_sidekiq();

        let crontab = self.read_crontab().await?;
        let (kept, removed) = proxy::remove_jobs_mentioning(&crontab, self.app_root());
        if !removed.is_empty() {
            self.write_crontab(&kept).await?;
        }
        for job in &removed {
            info!("[{}] removed `{job}'", self.app_root().display());
        }
        Ok(removed)
    }

    async fn read_crontab(&self) -> Result<String> {
        let command = ShellCommand::new(CRONTAB).arg("-l");
        let output = self.runner.run(&command).await.map_err(|e| Error::Crontab {
            action: "read",
            detail: e.to_string(),
        })?;
        if output.success {
            return Ok(output.stdout);
        }
        // `crontab -l` fails when the user has none yet.
        if output.stderr.contains("no crontab") {
            return Ok(String::new());
        }
        Err(Error::Crontab {
            action: "read",
            detail: output.stderr.trim().to_string(),
        })
    }

    async fn write_crontab(&self, contents: &str) -> Result<()> {
        let command = ShellCommand::new("/bin/sh").args([
            "-c",
            "printf '%s' \"$1\" | crontab -",
            CRONTAB,
            contents,
        ]);
        let output = self.runner.run(&command).await.map_err(|e| Error::Crontab {
            action: "write",
            detail: e.to_string(),
        })?;
        if output.success {
            Ok(())
        } else {
            Err(Error::Crontab {
                action: "write",
                detail: output.stderr.trim().to_string(),
            })
        }
    }

    async fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.running() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}
