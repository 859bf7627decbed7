// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Web server and scheduler wiring for a launched worker.

use std::fmt;
use std::path::Path;

/// `.htaccess` body that proxies every request not matching a static file to
/// the worker on `localhost:<port>`.
pub fn rewrite_rules(port: u16, ssl: bool) -> String {
    let mut rules = String::from("# Enable caching\nUnsetEnv no-cache\n");
    // Without this Apache answers `/` with a missing index.html.
    rules.push_str("DirectoryIndex disabled\n");
    if ssl {
        rules.push_str("RequestHeader set X-Forwarded-Proto expr=%{REQUEST_SCHEME}\n");
    }
    rules.push_str("RewriteEngine On\n");
    rules.push_str("RewriteCond %{REQUEST_FILENAME} !-f\n");
    rules.push_str(&format!(
        "RewriteRule ^(.*)$ http://localhost:{port}/$1 [P,L,QSA]\n"
    ));
    rules
}

/// One crontab line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronEntry {
    pub schedule: String,
    pub command: String,
}

impl CronEntry {
    /// Parse a crontab line. Blank lines, comments and variable assignments
    /// are not jobs.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let fields = if line.starts_with('@') { 1 } else { 5 };
        let mut schedule = Vec::with_capacity(fields);
        let mut rest = line;
        for _ in 0..fields {
            let (field, tail) = rest.split_once(char::is_whitespace)?;
            if field.contains('=') {
                return None;
            }
            schedule.push(field);
            rest = tail.trim_start();
        }
        if rest.is_empty() {
            return None;
        }

        Some(Self {
            schedule: schedule.join(" "),
            command: rest.trim_end().to_string(),
        })
    }

    /// Whether the command refers to `app_root` or a path below it. A sibling
    /// such as `/srv/forum2` does not count for `/srv/forum`.
    pub fn mentions(&self, app_root: &Path) -> bool {
        let root = app_root.to_string_lossy();
        let root = root.trim_end_matches('/');
        if root.is_empty() {
            return false;
        }
        self.command.match_indices(root).any(|(idx, _)| {
            self.command
                .get(idx + root.len()..)
                .and_then(|rest| rest.chars().next())
                .is_none_or(|c| !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.')))
        })
    }
}

impl fmt::Display for CronEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.schedule, self.command)
    }
}

/// Job that relaunches a worker when the host boots.
pub fn boot_job(command: impl Into<String>) -> CronEntry {
    CronEntry {
        schedule: "@reboot".to_string(),
        command: command.into(),
    }
}

/// Split `crontab` into the text to keep and the jobs mentioning `app_root`.
/// Kept lines are preserved verbatim.
pub fn remove_jobs_mentioning(crontab: &str, app_root: &Path) -> (String, Vec<CronEntry>) {
    let mut kept = String::with_capacity(crontab.len());
    let mut removed = Vec::new();
    for line in crontab.lines() {
        match CronEntry::parse(line) {
            Some(job) if job.mentions(app_root) => removed.push(job),
            _ => {
                kept.push_str(line);
                kept.push('\n');
            }
        }
    }
    (kept, removed)
}

/// Whether `crontab` already schedules `job`.
pub fn contains_job(crontab: &str, job: &CronEntry) -> bool {
    crontab
        .lines()
        .filter_map(CronEntry::parse)
        .any(|entry| entry == *job)
}
