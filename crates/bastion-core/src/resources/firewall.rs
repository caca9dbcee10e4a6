//! Firewall chains for tunnel traffic
//!
//! Rules live in dedicated chains hooked into the built-in ones with a single
//! jump each. Re-applying flushes and refills the dedicated chains, so the
//! rule set never accumulates duplicates.

use crate::config::Configuration;

use super::{Artifact, DesiredResource, ResourceKind};

pub const INPUT_CHAIN: &str = "BASTION-INPUT";
pub const FORWARD_CHAIN: &str = "BASTION-FORWARD";
pub const POSTROUTING_CHAIN: &str = "BASTION-POSTROUTING";

/// A dedicated chain and the built-in chain that jumps into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallChain {
    pub table: &'static str,
    pub name: &'static str,
    pub parent: &'static str,
}

impl FirewallChain {
    /// Arguments of the jump rule (without the `-A`/`-I`/`-C` verb)
    pub fn jump_args(&self) -> Vec<String> {
        vec![
            "-t".to_string(),
            self.table.to_string(),
            self.parent.to_string(),
            "-j".to_string(),
            self.name.to_string(),
        ]
    }
}

/// One rule inside a dedicated chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRule {
    pub table: &'static str,
    pub chain: &'static str,
    pub spec: Vec<String>,
}

impl FirewallRule {
    fn new(table: &'static str, chain: &'static str, spec: &[&str]) -> Self {
        Self {
            table,
            chain,
            spec: spec.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// iptables arguments appending this rule
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-t".to_string(),
            self.table.to_string(),
            "-A".to_string(),
            self.chain.to_string(),
        ];
        args.extend(self.spec.iter().cloned());
        args
    }

    pub fn render(&self) -> String {
        self.args().join(" ")
    }
}

pub fn chains() -> Vec<FirewallChain> {
    vec![
        FirewallChain {
            table: "filter",
            name: INPUT_CHAIN,
            parent: "INPUT",
        },
        FirewallChain {
            table: "filter",
            name: FORWARD_CHAIN,
            parent: "FORWARD",
        },
        FirewallChain {
            table: "nat",
            name: POSTROUTING_CHAIN,
            parent: "POSTROUTING",
        },
    ]
}

pub fn rules(config: &Configuration) -> Vec<FirewallRule> {
    let wg = config.wireguard.interface.as_str();
    let bridge = config.stack.bridge.as_str();
    let port = config.wireguard.listen_port.to_string();

    vec![
        FirewallRule::new(
            "filter",
            INPUT_CHAIN,
            &["-p", "udp", "--dport", &port, "-j", "ACCEPT"],
        ),
        FirewallRule::new(
            "filter",
            FORWARD_CHAIN,
            &["-i", wg, "-o", bridge, "-j", "ACCEPT"],
        ),
        FirewallRule::new(
            "filter",
            FORWARD_CHAIN,
            &["-i", bridge, "-o", wg, "-j", "ACCEPT"],
        ),
        FirewallRule::new(
            "nat",
            POSTROUTING_CHAIN,
            &["-s", &config.stack.subnet, "-o", wg, "-j", "MASQUERADE"],
        ),
    ]
}

/// Render the full rule set, jumps first
pub fn render_firewall(chains: &[FirewallChain], rules: &[FirewallRule]) -> String {
    let mut out = String::new();
    for chain in chains {
        out.push_str(&format!(
            "-t {} -N {}\n-t {} -A {} -j {}\n",
            chain.table, chain.name, chain.table, chain.parent, chain.name
        ));
    }
    for rule in rules {
        out.push_str(&rule.render());
        out.push('\n');
    }
    out
}

pub(crate) fn firewall_resource(config: &Configuration) -> DesiredResource {
    let chains = chains();
    let rules = rules(config);
    let content = render_firewall(&chains, &rules);

    DesiredResource::new(
        ResourceKind::Firewall,
        Artifact::Firewall { chains, rules },
        content,
    )
}
