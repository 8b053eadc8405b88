//! Start command - runs the preview server in the foreground.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::config::Settings;
use crate::hub::{FileRegistry, RegistryOptions};
use crate::lockfile::{LockFile, LockInfo};
use crate::render::HtmlRenderer;
use crate::server::Server;
use crate::watcher::NotifySource;

/// Run the start command. Returns once the server has shut down.
pub async fn run(port: Option<u16>, settings: Settings, lock: LockFile) -> Result<()> {
    if let Some(info) = lock.read()? {
        bail!(
            "livemd is already running on port {} (lock file {}). Run `livemd stop` first",
            info.port,
            lock.path().display()
        );
    }

    crate::logging::init_with_config(&settings.logging);

    let registry = FileRegistry::new(
        RegistryOptions::from(&settings),
        Arc::new(HtmlRenderer::new()),
        Arc::new(NotifySource::new(settings.watch.event_buffer)),
    )?;

    let wanted = port.unwrap_or(settings.server.port);
    let server = Server::bind(&settings.server, wanted, registry)
        .await
        .with_context(|| format!("cannot bind {}:{wanted}", settings.server.host))?;
    let actual = server.local_addr()?.port();
    if actual != wanted {
        println!("Port {wanted} is in use, using {actual} instead");
    }

    lock.write(LockInfo::current(actual))?;
    println!("livemd running at http://localhost:{actual}");
    if binds_all_interfaces(&settings.server.host) {
        for ip in lan_addresses() {
            println!("                  http://{ip}:{actual}");
        }
    }
    println!("Press Ctrl-C to stop");

    let token = server.shutdown_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            crate::log_event!("server", "interrupted");
            token.cancel();
        }
    });

    let result = server.run().await;
    ctrl_c.abort();

    if let Err(e) = lock.remove() {
        tracing::warn!("[server] could not remove lock file: {e}");
    }
    println!("livemd stopped");
    result.context("server failed")
}

fn binds_all_interfaces(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_unspecified())
}

/// IPv4 addresses other devices on the network can reach us at.
fn lan_addresses() -> Vec<Ipv4Addr> {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => lan_ipv4(interfaces.iter().map(|iface| iface.ip())),
        Err(e) => {
            crate::debug_event!("server", "no interface list", "{e}");
            Vec::new()
        }
    }
}

/// Non-loopback IPv4 addresses, deduplicated, in input order.
fn lan_ipv4(addresses: impl IntoIterator<Item = IpAddr>) -> Vec<Ipv4Addr> {
    let mut found = Vec::new();
    for address in addresses {
        match address {
            IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() && !found.contains(&ip) => {
                found.push(ip)
            }
            _ => {}
        }
    }
    found
}
