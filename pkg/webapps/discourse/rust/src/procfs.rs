// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::{debug, info};
use nix::sys::signal;
use nix::unistd::Pid;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use nix::sys::signal::Signal;

static PROC_ROOT: OnceLock<PathBuf> = OnceLock::new();

pub fn root_path() -> &'static Path {
    PROC_ROOT.get_or_init(|| {
        if let Ok(v) = env::var("HOST_PROC") {
            return v.into();
        }
        "/proc".into()
    })
}

/// Longest command name the kernel keeps in `/proc/<pid>/comm`.
pub const COMM_MAX_LEN: usize = 15;

/// `name` as the kernel reports it in `comm`.
pub fn comm_name(name: &str) -> &str {
    let mut end = name.len().min(COMM_MAX_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.get(..end).unwrap_or(name)
}

/// Read-and-signal view of the OS process table.
pub trait ProcessTable: Send + Sync {
    /// Command name of a live process. Errors when the PID does not exist.
    fn comm(&self, pid: u32) -> io::Result<String>;

    fn signal(&self, pid: u32, signal: Signal) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_root(root_path())
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    fn is_zombie(&self, pid: u32) -> io::Result<bool> {
        let stat = fs::read_to_string(self.pid_dir(pid).join("stat"))?;
        // The state follows the parenthesised comm, which may itself contain ')'.
        let state = stat
            .rfind(')')
            .and_then(|idx| stat.get(idx + 1..))
            .and_then(|rest| rest.split_whitespace().next());
        Ok(matches!(state, Some("Z" | "X")))
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcFs {
    fn comm(&self, pid: u32) -> io::Result<String> {
        if pid == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "pid 0"));
        }
        let comm = fs::read_to_string(self.pid_dir(pid).join("comm"))?;
        if self.is_zombie(pid)? {
            debug!("pid {pid} is a zombie");
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("pid {pid} has exited"),
            ));
        }
        Ok(comm.trim_end_matches('\n').to_string())
    }

    fn signal(&self, pid: u32, sig: Signal) -> io::Result<()> {
        // kill(0) and kill(-1) address groups, never a single worker.
        let raw = i32::try_from(pid)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("pid {pid}")))?;
        signal::kill(Pid::from_raw(raw), sig)?;
        info!("sent {sig} to pid {pid}");
        Ok(())
    }
}
