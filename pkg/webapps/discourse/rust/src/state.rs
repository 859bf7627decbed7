// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fmt;

/// Worker state as observed from the launcher, the PID file and the process
/// table. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    /// No launcher script.
    Unconfigured,
    /// Launcher present, no live worker behind the PID file.
    Stopped,
    /// PID file points at a live process running the expected interpreter.
    Running { pid: u32 },
    /// PID file points at a live process running something else.
    Stale { pid: u32, comm: String },
}

impl WorkerState {
    pub fn is_running(&self) -> bool {
        matches!(self, WorkerState::Running { .. })
    }

    pub fn pid(&self) -> Option<u32> {
        match self {
            WorkerState::Running { pid } => Some(*pid),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Unconfigured => write!(f, "unconfigured"),
            WorkerState::Stopped => write!(f, "stopped"),
            WorkerState::Running { pid } => write!(f, "running (pid={pid})"),
            WorkerState::Stale { pid, comm } => write!(f, "stale (pid={pid}, comm={comm})"),
        }
    }
}
