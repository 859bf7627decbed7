// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Launcher sidecar metadata.
//!
//! `launch.json` sits next to `launch.sh` and records what the script was
//! rendered with, so the port can be cross-checked without trusting the
//! shell text alone. The script stays authoritative.

use log::warn;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::errors::{Error, Result};
use crate::mode::RuntimeMode;

pub const METADATA_NAME: &str = "launch.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchMetadata {
    pub version: u8,
    pub port: u16,
    pub mode: RuntimeMode,
    pub worker: String,
}

impl LaunchMetadata {
    pub const VERSION: u8 = 1;

    pub fn new(port: u16, mode: RuntimeMode, worker: impl Into<String>) -> Self {
        Self {
            version: Self::VERSION,
            port,
            mode,
            worker: worker.into(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| Error::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(&tmp_path, bytes)
            .map_err(|e| Error::io("failed to write launch metadata", &tmp_path, e))?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| Error::io("failed to write launch metadata", path, e))?;
        Ok(())
    }

    /// `Ok(None)` when there is no sidecar or it was written by a newer
    /// version.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io("failed to read launch metadata", path, e)),
        };
        let metadata: Self = serde_json::from_slice(&bytes).map_err(|source| Error::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
        if metadata.version > Self::VERSION {
            warn!(
                "ignoring {} with unsupported version {} (max {})",
                path.display(),
                metadata.version,
                Self::VERSION
            );
            return Ok(None);
        }
        Ok(Some(metadata))
    }
}
