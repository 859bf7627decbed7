// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use discourse_launcher::config::{self, SupervisorConfig};
use discourse_launcher::proxy;
use discourse_launcher::{Error, Launcher, RuntimeMode};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

const EXIT_NEGATIVE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "discourse-launcher", version, about = "Manage the Discourse Unicorn worker of an application root")]
struct Cli {
    /// YAML supervisor config (defaults to $DISCOURSE_LAUNCHER_CONFIG)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Application root, overrides `app_root` from the config
    #[arg(long)]
    app_root: Option<PathBuf>,

    /// Runtime mode, overrides `mode` from the config
    #[arg(long)]
    mode: Option<RuntimeMode>,

    #[arg(long, default_value = "info")]
    log_level: log::Level,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Write the launcher script bound to a port
    Create {
        #[arg(long, short, conflicts_with = "first_free", required_unless_present = "first_free")]
        port: Option<u16>,
        /// Pick the first free port in START-END
        #[arg(long, value_parser = parse_range)]
        first_free: Option<(u16, u16)>,
    },
    /// Exit 0 if the launcher exists
    Exists,
    /// Print the port recorded in the launcher
    Port,
    /// Run the launcher and print the worker PID
    Start,
    /// Send SIGTERM to the worker
    Stop,
    /// Send SIGKILL to the worker
    Kill,
    /// Stop then start the worker
    Restart,
    /// Print the worker state
    Status,
    /// SIGTERM, wait, then SIGKILL
    Shutdown {
        /// Seconds to wait before SIGKILL
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Print the web server proxy rules and the boot jobs
    Rules {
        #[arg(long)]
        ssl: bool,
    },
    /// Schedule the worker and Sidekiq to start on boot
    BootJobs,
    /// Manage the Sidekiq background worker
    Sidekiq {
        #[command(subcommand)]
        action: SidekiqCmd,
    },
    /// Kill both workers and remove every scheduled job for the app root
    Uninstall,
}

#[derive(Debug, Subcommand)]
enum SidekiqCmd {
    /// Launch Sidekiq unless it runs, and print its PID
    Start,
    /// Send SIGKILL to Sidekiq
    Kill,
    /// Print the Sidekiq PID
    Status,
}

fn parse_range(s: &str) -> Result<(u16, u16), String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got {s}"))?;
    let start: u16 = start.trim().parse().map_err(|e| format!("{start}: {e}"))?;
    let end: u16 = end.trim().parse().map_err(|e| format!("{end}: {e}"))?;
    if start == 0 || start > end {
        return Err(format!("invalid port range {s}"));
    }
    Ok((start, end))
}

fn build_config(cli: &Cli) -> Result<SupervisorConfig> {
    let mut cfg = match cli.config.clone().or_else(config::config_path_from_env) {
        Some(path) => config::load_config(&path)?,
        None => match cli.app_root {
            Some(ref root) => SupervisorConfig::new(root),
            None => bail!(
                "no application root: pass --app-root or --config, or set {}",
                config::CONFIG_ENV_VAR
            ),
        },
    };
    if let Some(ref root) = cli.app_root {
        cfg.app_root = root.clone();
    }
    if let Some(mode) = cli.mode {
        cfg.mode = mode;
    }
    Ok(cfg)
}

/// Ok(true) and Ok(false) map to exit 0 and 2. Errors exit 1.
async fn run(cli: Cli) -> Result<bool> {
    let launcher = Launcher::with_system(build_config(&cli)?);
    let root = launcher.app_root().display().to_string();

    match cli.command {
        Cmd::Create { port, first_free } => {
            let port = match (port, first_free) {
                (Some(port), _) => {
                    launcher.create(port)?;
                    port
                }
                (None, Some((start, end))) => launcher.create_first_free(start..=end)?,
                (None, None) => bail!("either --port or --first-free is required"),
            };
            println!("{port}");
            Ok(true)
        }
        Cmd::Exists => Ok(launcher.exists()),
        Cmd::Port => {
            println!("{}", launcher.get_port()?);
            Ok(true)
        }
        Cmd::Start => match launcher.start().await? {
            Some(pid) => {
                println!("{pid}");
                Ok(true)
            }
            None => Ok(false),
        },
        Cmd::Stop => Ok(launcher.stop()),
        Cmd::Kill => Ok(launcher.kill()),
        Cmd::Restart => {
            let restarted = launcher.restart().await?;
            if restarted {
                info!("[{root}] restart may take up to 2 minutes to complete");
            }
            Ok(restarted)
        }
        Cmd::Status => {
            let state = launcher.state();
            println!("{state}");
            Ok(state.is_running())
        }
        Cmd::Shutdown { timeout } => Ok(launcher.shutdown(Duration::from_secs(timeout)).await),
        Cmd::Rules { ssl } => {
            let port = launcher
                .get_port()
                .with_context(|| format!("cannot build proxy rules for {root}"))?;
            print!("{}", proxy::rewrite_rules(port, ssl));
            println!("{}", launcher.boot_job());
            println!("{}", launcher.sidekiq_boot_job());
            Ok(true)
        }
        Cmd::BootJobs => {
            for job in [launcher.boot_job(), launcher.sidekiq_boot_job()] {
                launcher.install_boot_job(&job).await?;
                println!("{job}");
            }
            Ok(true)
        }
        Cmd::Sidekiq { action } => {
            let pid = match action {
                SidekiqCmd::Start => launcher.launch_sidekiq().await,
                SidekiqCmd::Kill => return Ok(launcher.kill_sidekiq()),
                SidekiqCmd::Status => launcher.sidekiq_running(),
            };
            match pid {
                Some(pid) => {
                    println!("{pid}");
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Cmd::Uninstall => {
            for job in launcher.uninstall().await? {
                println!("{job}");
            }
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = simple_logger::init_with_level(cli.log_level) {
        eprintln!("failed to initialise logging: {e}");
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_NEGATIVE),
        Err(e) => {
            let kind = e
                .downcast_ref::<Error>()
                .map_or("error", |err| if err.is_fatal() { "configuration error" } else { "error" });
            error!("{kind}: {e:#}");
            ExitCode::FAILURE
        }
    }
}
