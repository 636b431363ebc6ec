//! ipv6proxy: forward proxy with per-request random IPv6 egress.
//!
//! Startup order: parse flags, load and validate configuration, set up
//! logging, prepare the host network, then run one proxy listener per
//! configured port until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use ipv6_egress_proxy::{
    cli::Cli,
    config::{ConfigLoader, ProxyConfiguration},
    dns::{DnsResolver, Resolver},
    netsetup,
    proxy::ProxyServerBuilder,
    telemetry::AuditLogger,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load(&cli)
        .context("Failed to load configuration")?;
    let cfg = ProxyConfiguration::from_config(config).context("Invalid configuration")?;

    let verbosity = if cfg.verbose { cli.verbose.max(1) } else { cli.verbose };
    init_tracing(verbosity)?;

    debug!("Loaded configuration: {:?}", cfg);

    netsetup::prepare(&cfg);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start Tokio runtime")?;

    runtime.block_on(run(cfg))
}

/// Start every listener and wait for Ctrl-C or a listener failure.
async fn run(cfg: ProxyConfiguration) -> Result<()> {
    let resolver =
        Arc::new(DnsResolver::from_settings(&cfg.dns).context("Failed to initialize resolver")?);
    info!("Resolving destinations with {}", resolver.name());

    let audit = Arc::new(
        AuditLogger::from_config(cfg.syslog).context("Failed to initialize audit logging")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut listeners = JoinSet::new();

    for listener in &cfg.listeners {
        let server = ProxyServerBuilder::new()
            .listen_addr(listener.addr)
            .egress(listener.egress)
            .resolver(resolver.clone())
            .credentials(cfg.credentials.clone())
            .ipv4_clients_only(cfg.ipv4_clients_only)
            .audit(audit.clone())
            .build(shutdown_rx.clone())
            .await
            .with_context(|| format!("Failed to start listener on {}", listener.addr))?;

        info!("Starting proxy on {} ({})", server.local_addr(), listener.egress);
        listeners.spawn(server.run());
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Received Ctrl-C, shutting down");
        }
        Some(result) = listeners.join_next() => {
            let _ = shutdown_tx.send(true);
            result
                .context("Listener task panicked")?
                .context("Listener stopped unexpectedly")?;
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(result) = listeners.join_next().await {
        result
            .context("Listener task panicked")?
            .context("Listener failed during shutdown")?;
    }

    Ok(())
}

/// Initialize the tracing subscriber for operational logging on stderr.
///
/// This is separate from the audit telemetry which goes to syslog.
///
/// # Verbosity Levels
/// - 0 (default): `RUST_LOG`, or warnings and errors
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
