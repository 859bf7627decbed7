// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Whether the caller must abort the surrounding workflow or may continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programmer or configuration error; the workflow should abort.
    Configuration,
    /// Environmental failure; the workflow may retry or warn.
    Operational,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("launcher not configured in `{}'", .0.display())]
    LauncherMissing(PathBuf),

    #[error("unable to detect port in `{}'", .0.display())]
    PortNotFound(PathBuf),

    #[error("port {0}/TCP is in use")]
    PortInUse(u16),

    #[error("no free TCP port in range {start}-{end}")]
    NoFreePort { start: u16, end: u16 },

    #[error("invalid port {0}: must be within 1-65535")]
    InvalidPort(u16),

    #[error("application root must not be empty")]
    EmptyAppRoot,

    #[error("invalid environment variable name `{0}'")]
    InvalidEnvName(String),

    #[error("{context} `{}': {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to {action} crontab: {detail}")]
    Crontab { action: &'static str, detail: String },

    #[error("malformed launch metadata `{}': {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::LauncherMissing(_)
            | Error::PortNotFound(_)
            | Error::PortInUse(_)
            | Error::NoFreePort { .. }
            | Error::InvalidPort(_)
            | Error::EmptyAppRoot
            | Error::InvalidEnvName(_) => ErrorKind::Configuration,
            Error::Io { .. } | Error::Crontab { .. } | Error::Metadata { .. } => {
                ErrorKind::Operational
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub(crate) fn io(context: &'static str, path: &Path, source: io::Error) -> Self {
        Error::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
