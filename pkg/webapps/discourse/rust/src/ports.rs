// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::debug;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::procfs;

pub type Port = u16;

const TCP_LISTEN: u8 = 0x0A;

pub trait PortProbe: Send + Sync {
    /// Whether nothing is listening on `port`/TCP.
    fn is_free(&self, port: Port) -> bool;

    fn first_free(&self, range: RangeInclusive<Port>) -> Option<Port> {
        range.into_iter().filter(|p| *p != 0).find(|p| self.is_free(*p))
    }
}

/// Reads listening sockets from the `tcp` and `tcp6` tables of the current
/// network namespace. Falls back to a bind attempt when the tables are not
/// readable.
#[derive(Debug, Clone)]
pub struct ProcNetProbe {
    net_dir: PathBuf,
}

impl ProcNetProbe {
    pub fn new() -> Self {
        Self::with_net_dir(procfs::root_path().join("net"))
    }

    pub fn with_net_dir(net_dir: impl Into<PathBuf>) -> Self {
        Self {
            net_dir: net_dir.into(),
        }
    }

    pub fn listening_ports(&self) -> io::Result<BTreeSet<Port>> {
        let mut ports = BTreeSet::new();
        let mut readable = false;
        for table in ["tcp", "tcp6"] {
            match parse_socket_table(&self.net_dir.join(table), &mut ports) {
                Ok(()) => readable = true,
                Err(e) => debug!("skipping {table} socket table: {e}"),
            }
        }
        if readable {
            Ok(ports)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no socket tables under {}", self.net_dir.display()),
            ))
        }
    }
}

impl Default for ProcNetProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl PortProbe for ProcNetProbe {
    fn is_free(&self, port: Port) -> bool {
        match self.listening_ports() {
            Ok(ports) => !ports.contains(&port),
            Err(e) => {
                debug!("falling back to bind probe for port {port}: {e}");
                TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
            }
        }
    }
}

fn parse_socket_table(path: &std::path::Path, result: &mut BTreeSet<Port>) -> io::Result<()> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    let mut line = String::with_capacity(256);

    // Header
    reader.read_line(&mut line)?;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        if let Some(port) = parse_listen_line(&line) {
            result.insert(port);
        }
    }
    Ok(())
}

/// Local port of a listening socket line, `None` for any other state or a
/// malformed line.
fn parse_listen_line(line: &str) -> Option<Port> {
    let mut fields = line.split_whitespace();
    let local_address = fields.nth(1)?;
    let state = fields.nth(1)?;

    if u8::from_str_radix(state, 16).ok()? != TCP_LISTEN {
        return None;
    }

    let (_, port) = local_address.rsplit_once(':')?;
    u16::from_str_radix(port, 16).ok()
}
