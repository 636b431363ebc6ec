//! Host network preparation.
//!
//! Sending from arbitrary addresses in the egress prefix needs three kernel
//! settings, each optional:
//!
//! - `sysctl -w net.ipv6.conf.all.forwarding=1`
//! - `ip route add <cidr> dev <device>`
//! - `sysctl -w net.ipv6.ip_nonlocal_bind=1`
//!
//! The commands need root (or `CAP_NET_ADMIN`). Failures are logged as
//! warnings and startup continues, since the host may already be set up.

use crate::config::ProxyConfiguration;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from running a preparation command.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The command could not be started.
    #[error("Failed to run '{cmd}': {source}")]
    CommandFailed {
        /// Command line.
        cmd: String,
        /// Spawn error.
        source: std::io::Error,
    },

    /// The command exited unsuccessfully.
    #[error("'{cmd}' failed: {stderr}")]
    CommandError {
        /// Command line.
        cmd: String,
        /// Captured stderr.
        stderr: String,
    },
}

/// One preparation step: program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupCommand {
    /// Program to run.
    pub program: &'static str,
    /// Arguments.
    pub args: Vec<String>,
}

impl SetupCommand {
    fn new(program: &'static str, args: &[&str]) -> Self {
        Self {
            program,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Human-readable command line.
    pub fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// The commands `prepare` would run for `cfg`, in order.
pub fn planned_commands(cfg: &ProxyConfiguration) -> Vec<SetupCommand> {
    let mut commands = Vec::new();

    if cfg.network.auto_forwarding {
        commands.push(SetupCommand::new(
            "sysctl",
            &["-w", "net.ipv6.conf.all.forwarding=1"],
        ));
    }

    if cfg.network.auto_route {
        commands.push(SetupCommand::new(
            "ip",
            &["route", "add", &cfg.cidr, "dev", &cfg.network.route_device],
        ));
    }

    if cfg.network.auto_ip_nonlocal_bind {
        commands.push(SetupCommand::new(
            "sysctl",
            &["-w", "net.ipv6.ip_nonlocal_bind=1"],
        ));
    }

    commands
}

/// Run every enabled preparation step. Never fails; problems are logged.
pub fn prepare(cfg: &ProxyConfiguration) {
    for command in planned_commands(cfg) {
        match run_command(&command) {
            Ok(()) => info!("Ran '{}'", command.display()),
            Err(e) => warn!("{}", e),
        }
    }
}

/// Run one command, capturing its output.
pub fn run_command(command: &SetupCommand) -> Result<(), SetupError> {
    let cmd_str = command.display();
    debug!("Running: {}", cmd_str);

    let output = Command::new(command.program)
        .args(&command.args)
        .output()
        .map_err(|e| SetupError::CommandFailed {
            cmd: cmd_str.clone(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(SetupError::CommandError {
            cmd: cmd_str,
            stderr,
        });
    }

    Ok(())
}
