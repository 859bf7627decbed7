// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use discourse_launcher::SupervisorConfig;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Stand-in for `bin/unicorn -D`: backgrounds a `sleep` and records its PID
/// the way Unicorn does.
const FAKE_UNICORN: &str = r#"#!/bin/sh
mkdir -p tmp/pids
echo "$@" > tmp/args
sleep 300 </dev/null >/dev/null 2>&1 &
echo $! > tmp/pids/unicorn.pid
"#;

/// Same, but the worker ignores SIGTERM.
const STUBBORN_UNICORN: &str = r#"#!/bin/sh
mkdir -p tmp/pids
sh -c "trap '' TERM; exec sleep 300" </dev/null >/dev/null 2>&1 &
echo $! > tmp/pids/unicorn.pid
"#;

/// Application root with a fake worker. Kills whatever the PID file names
/// on drop.
pub struct FakeApp {
    pub dir: TempDir,
}

impl FakeApp {
    pub fn new() -> Self {
        Self::with_worker(FAKE_UNICORN)
    }

    pub fn stubborn() -> Self {
        Self::with_worker(STUBBORN_UNICORN)
    }

    fn with_worker(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let worker = bin.join("fake-unicorn");
        std::fs::write(&worker, script).unwrap();
        std::fs::set_permissions(&worker, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Config that runs the fake worker through `/bin/sh -c` and expects a
    /// `sleep` process.
    pub fn config(&self) -> SupervisorConfig {
        let mut config = SupervisorConfig::new(self.root());
        config.interpreter = "sleep".to_string();
        config.entry_command = "./bin/fake-unicorn".to_string();
        config.env = BTreeMap::from([("FORUM_TEST".to_string(), "1".to_string())]);
        config.shell = "/bin/sh".to_string();
        config.shell_args = vec!["-c".to_string()];
        config
    }

    pub fn recorded_pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.root().join("tmp/pids/unicorn.pid"))
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    pub fn recorded_args(&self) -> Option<String> {
        std::fs::read_to_string(self.root().join("tmp/args")).ok()
    }
}

impl Drop for FakeApp {
    fn drop(&mut self) {
        if let Some(pid) = self.recorded_pid() {
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
    }
}

/// Check if a PID is still alive.
pub fn pid_is_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Poll `cond` every 50ms until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// A TCP port nothing listens on right now.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}
