//! bmc-netd - BMC network configuration daemon.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use bmcnet::netlink::{self, Connection, EventSource};
use bmcnet::registry::{Manager, ignored_interfaces_from_env};
use bmcnet::supervisor::{self, Networkd, watcher};

/// Bus name requested once startup is complete.
const BUSNAME: &str = "xyz.openbmc_project.Network";

/// Default configuration directory consumed by the link supervisor.
const DEFAULT_CONF_DIR: &str = "/etc/systemd/network";

/// Where the lldpd configuration is emitted.
const LLDP_CONF_PATH: &str = "/etc/lldpd.conf";

fn conf_dir() -> PathBuf {
    std::env::var_os("NETWORK_CONF_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONF_DIR))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let conf_dir = conf_dir();
    std::fs::create_dir_all(&conf_dir)
        .with_context(|| format!("creating configuration directory {}", conf_dir.display()))?;

    let mut manager = Manager::new(&conf_dir, ignored_interfaces_from_env());

    let bus = zbus::Connection::system()
        .await
        .context("connecting to the system bus")?;
    let networkd = Networkd::new(bus.clone());

    // Administrative-state updates: seed from the supervisor's current
    // links (non-fatal when it is down), then follow its signals.
    let (admin_tx, mut admin_rx) = mpsc::unbounded_channel();
    watcher::seed(&networkd, &admin_tx).await;
    {
        let bus = bus.clone();
        tokio::spawn(async move {
            if let Err(err) = watcher::watch(bus, admin_tx).await {
                error!(%err, "supervisor state watcher exited");
            }
        });
    }

    // Kernel events: multicast subscription first, then the initial dumps
    // through the same pipeline.
    let mut events = EventSource::new().context("opening netlink event socket")?;
    let dump_conn = Connection::new().context("opening netlink request socket")?;
    for event in netlink::dump_all(&dump_conn)
        .await
        .context("dumping initial kernel state")?
    {
        manager.dispatch(event);
    }

    bus.request_name(BUSNAME)
        .await
        .with_context(|| format!("requesting bus name {BUSNAME}"))?;

    // Re-emit lldpd configuration recovered from persisted settings.
    if manager.interfaces().any(|intf| intf.emit_lldp()) {
        match manager.write_lldpd_config(Path::new(LLDP_CONF_PATH)) {
            Ok(()) => {
                if let Err(err) = supervisor::restart_lldp_service(&bus).await {
                    error!(%err, "failed to restart lldpd");
                }
            }
            Err(err) => error!(%err, "failed to write lldpd configuration"),
        }
    }

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    info!(conf_dir = %conf_dir.display(), "bmc-netd started");

    loop {
        let reload_deadline = manager.reload.deadline();

        tokio::select! {
            biased;

            _ = sigterm.recv() => {
                info!("received request to terminate, exiting");
                break;
            }

            _ = async { tokio::time::sleep_until(reload_deadline.unwrap()).await },
                if reload_deadline.is_some() =>
            {
                manager.run_reload(&networkd).await;
            }

            update = admin_rx.recv() => {
                if let Some((ifidx, state)) = update {
                    manager.handle_admin_state(&state, ifidx);
                }
            }

            burst = events.next_burst() => {
                match burst {
                    Ok(batch) => {
                        // The whole burst is applied before polling again.
                        for event in batch {
                            manager.dispatch(event);
                        }
                    }
                    Err(netlink::Error::Overrun) => {
                        warn!("netlink receive queue overrun, re-dumping kernel state");
                        match netlink::dump_all(&dump_conn).await {
                            Ok(batch) => {
                                for event in batch {
                                    manager.dispatch(event);
                                }
                            }
                            Err(err) => error!(%err, "failed to re-dump kernel state"),
                        }
                    }
                    Err(err) => {
                        error!(%err, "netlink event socket failed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
