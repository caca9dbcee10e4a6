//! Kernel forwarding and the container bridge network

use crate::config::{HostLayout, StackSettings};

use super::{Artifact, DesiredResource, MANAGED_BANNER, ResourceKind};

/// sysctl drop-in enabling IPv4 forwarding
pub const FORWARDING_FILE: &str = "99-bastion-forwarding.conf";

pub fn render_forwarding() -> String {
    format!("{}\nnet.ipv4.ip_forward = 1\n", MANAGED_BANNER)
}

/// Canonical description of a container network
///
/// Backends render what they observe with the same function, so equal
/// networks compare equal byte for byte.
pub fn render_network(name: &str, subnet: &str, bridge: &str) -> String {
    format!("network {} subnet {} bridge {}\n", name, subnet, bridge)
}

pub(crate) fn forwarding_resource(layout: &HostLayout) -> DesiredResource {
    DesiredResource::new(
        ResourceKind::Forwarding,
        Artifact::File {
            path: layout.sysctl_dir.join(FORWARDING_FILE),
            mode: 0o644,
        },
        render_forwarding(),
    )
}

pub(crate) fn container_network_resource(stack: &StackSettings) -> DesiredResource {
    DesiredResource::new(
        ResourceKind::ContainerNetwork,
        Artifact::Network {
            name: stack.network.clone(),
            subnet: stack.subnet.clone(),
            bridge: stack.bridge.clone(),
        },
        render_network(&stack.network, &stack.subnet, &stack.bridge),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn forwarding_lives_in_sysctl_dir() {
        let resource = forwarding_resource(&HostLayout::under("/stage"));
        assert_eq!(
            resource.artifact(),
            &Artifact::File {
                path: PathBuf::from("/stage/etc/sysctl.d/99-bastion-forwarding.conf"),
                mode: 0o644,
            }
        );
        assert!(resource.content().ends_with("net.ipv4.ip_forward = 1\n"));
    }

    #[test]
    fn network_rendering_is_canonical() {
        assert_eq!(
            render_network("bastion_net", "172.28.0.0/24", "bastion0"),
            "network bastion_net subnet 172.28.0.0/24 bridge bastion0\n"
        );
    }
}
