// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
// Panicking code
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod config;
pub mod errors;
pub mod exec;
pub mod metadata;
pub mod mode;
pub mod pidfile;
pub mod ports;
pub mod procfs;
pub mod proxy;
pub mod script;
pub mod state;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{SupervisorConfig, load_config};
pub use errors::{Error, ErrorKind, Result};
pub use mode::RuntimeMode;
pub use state::WorkerState;
pub use supervisor::Launcher;
