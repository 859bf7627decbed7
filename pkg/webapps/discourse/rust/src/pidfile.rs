// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Read-only access to the PID file the worker writes for itself.

use log::debug;
use std::path::Path;
use tokio::time::{Duration, Instant, sleep};

use crate::procfs::{ProcessTable, comm_name};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// PID recorded in `path`. Missing, unreadable, empty or non-positive
/// contents all read as `None`.
pub fn read_pid(path: &Path) -> Option<u32> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("no pid from {}: {e}", path.display());
            return None;
        }
    };
    contents.trim().parse::<u32>().ok().filter(|pid| *pid > 0)
}

/// Whether `pid` is alive and its command name is `expected`. A reused PID
/// belonging to an unrelated program does not match. `expected` is compared
/// as the kernel would truncate it.
pub fn pid_matches(table: &dyn ProcessTable, pid: u32, expected: &str) -> bool {
    matches!(table.comm(pid), Ok(comm) if comm == comm_name(expected))
}

/// Poll `path` until it holds a PID other than `previous`, up to `timeout`.
/// On timeout, whatever the file holds is returned.
pub async fn wait_for_pid(path: &Path, previous: Option<u32>, timeout: Duration) -> Option<u32> {
    let deadline = Instant::now() + timeout;
    loop {
        let current = read_pid(path);
        if current.is_some() && current != previous {
            return current;
        }
        if Instant::now() >= deadline {
            return current;
        }
        sleep(POLL_INTERVAL).await;
    }
}
