//! WireGuard interface configuration

use crate::config::{Configuration, HostLayout, Secret, WireGuardSettings};
use crate::error::Result;

use super::{Artifact, DesiredResource, MANAGED_BANNER, ResourceKind};

/// The wg-quick service that brings the interface up
pub fn service_name(interface: &str) -> String {
    format!("wg-quick@{}.service", interface)
}

/// Render `<iface>.conf`
pub fn render_wireguard(wg: &WireGuardSettings, private_key: &Secret) -> String {
    format!(
        "{banner}\n\
         [Interface]\n\
         PrivateKey = {private_key}\n\
         Address = {address}\n\
         ListenPort = {port}\n\
         \n\
         [Peer]\n\
         PublicKey = {peer}\n\
         AllowedIPs = {allowed}\n\
         PersistentKeepalive = {keepalive}\n",
        banner = MANAGED_BANNER,
        private_key = private_key.expose(),
        address = wg.address(),
        port = wg.listen_port,
        peer = wg.peer_public_key,
        allowed = wg.allowed_ips.join(", "),
        keepalive = wg.keepalive_secs,
    )
}

pub(crate) fn wireguard_resource(
    config: &Configuration,
    layout: &HostLayout,
) -> Result<DesiredResource> {
    let wg = &config.wireguard;
    let path = layout.wireguard_dir.join(format!("{}.conf", wg.interface));

    Ok(DesiredResource::new(
        ResourceKind::WireGuard,
        Artifact::File { path, mode: 0o600 },
        render_wireguard(wg, config.private_key()?),
    ))
}
