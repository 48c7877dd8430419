// RangeLink Linux daemon: LAN discovery and encrypted transport driving the
// ranging core; phase and measurement changes go to the log.

mod capability;
mod config;
mod discovery;
mod secure;
mod transport;
mod wire;

use std::collections::HashMap;
use std::sync::Arc;

use rangelink_core::{Event, PeerIdentity, RangeLink};
use tokio::sync::{mpsc, Mutex};
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("rangelink-linux {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load();
    let identity = PeerIdentity::generate(&cfg.model);
    info!(name = %identity.display_name, version = VERSION, "starting");

    let keypair = Arc::new(secure::Keypair::generate());
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let book = Arc::new(Mutex::new(HashMap::new()));

        let driver = transport::LanDriver::new(
            keypair,
            identity.clone(),
            cfg.discovery_port,
            cfg.transport_port,
            book,
            event_tx,
        );
        tokio::spawn(driver.run(command_rx));

        let mut link = RangeLink::new(
            identity,
            transport::LanTransport::new(command_tx),
            capability::SoftwareCapability::new(),
        );
        link.start();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                maybe_event = event_rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    let phase_before = link.phase();
                    let measurement_before = link.measurement();
                    link.handle_event(event);
                    if link.phase() != phase_before {
                        info!(phase = ?link.phase(), "phase changed");
                    }
                    let measurement = link.measurement();
                    if measurement != measurement_before {
                        info!(
                            distance = ?measurement.distance,
                            bearing = ?measurement.bearing,
                            "measurement updated"
                        );
                    }
                }
                result = &mut shutdown => {
                    result?;
                    break;
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
