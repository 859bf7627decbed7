// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! In-memory collaborators for unit tests
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;

use crate::exec::{CommandOutput, CommandRunner, ShellCommand};
use crate::ports::PortProbe;
use crate::procfs::{ProcessTable, Signal};

type RunFn = dyn Fn(&ShellCommand) -> io::Result<CommandOutput> + Send + Sync;

/// Records every command and answers with `on_run`.
pub struct FakeRunner {
    on_run: Box<RunFn>,
    calls: Mutex<Vec<ShellCommand>>,
}

impl FakeRunner {
    pub fn new(on_run: impl Fn(&ShellCommand) -> io::Result<CommandOutput> + Send + Sync + 'static) -> Self {
        Self {
            on_run: Box::new(on_run),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(|_| Ok(success()))
    }

    pub fn calls(&self) -> Vec<ShellCommand> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &ShellCommand) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        (self.on_run)(command)
    }
}

pub fn success() -> CommandOutput {
    CommandOutput {
        success: true,
        code: Some(0),
        ..Default::default()
    }
}

pub fn success_with(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        ..success()
    }
}

pub fn failure(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        code: Some(code),
        stderr: stderr.to_string(),
        ..Default::default()
    }
}

/// Process table keyed by PID. Signalled processes exit unless they were
/// registered as ignoring that signal.
#[derive(Default)]
pub struct FakeProcessTable {
    processes: Mutex<HashMap<u32, String>>,
    ignored: Mutex<HashSet<(u32, Signal)>>,
    signals: Mutex<Vec<(u32, Signal)>>,
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pid: u32, comm: &str) {
        self.processes.lock().unwrap().insert(pid, comm.to_string());
    }

    pub fn ignore(&self, pid: u32, signal: Signal) {
        self.ignored.lock().unwrap().insert((pid, signal));
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.processes.lock().unwrap().contains_key(&pid)
    }

    pub fn signals(&self) -> Vec<(u32, Signal)> {
        self.signals.lock().unwrap().clone()
    }
}

impl ProcessTable for FakeProcessTable {
    fn comm(&self, pid: u32) -> io::Result<String> {
        self.processes
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("pid {pid}")))
    }

    fn signal(&self, pid: u32, signal: Signal) -> io::Result<()> {
        if !self.is_alive(pid) {
            return Err(io::Error::from_raw_os_error(nix::libc::ESRCH));
        }
        self.signals.lock().unwrap().push((pid, signal));
        if !self.ignored.lock().unwrap().contains(&(pid, signal)) {
            self.processes.lock().unwrap().remove(&pid);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePortProbe {
    bound: Mutex<HashSet<u16>>,
}

impl FakePortProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, port: u16) {
        self.bound.lock().unwrap().insert(port);
    }
}

impl PortProbe for FakePortProbe {
    fn is_free(&self, port: u16) -> bool {
        !self.bound.lock().unwrap().contains(&port)
    }
}
