//! iptables backend for the dedicated bastion chains
//!
//! `iptables -S` normalizes rule specs (it adds implicit matches such as
//! `-m udp`), so the live rule set cannot be rendered back byte for byte.
//! Observation therefore checks structure only: every chain exists, every
//! jump is in place, and every chain holds the expected number of rules.
//! Anything finer is left to the fingerprint ledger.

use std::sync::Arc;

use async_trait::async_trait;
use bastion_core::resources::{Artifact, FirewallChain, FirewallRule};
use bastion_core::traits::Observation;
use bastion_core::{Action, DesiredResource, Error, ResourceBackend, Result};

use crate::runner::CommandRunner;

/// Manages the BASTION-* chains, their jumps and their rules
pub struct IptablesBackend {
    runner: Arc<dyn CommandRunner>,
}

impl IptablesBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn firewall(desired: &DesiredResource) -> Result<(&[FirewallChain], &[FirewallRule])> {
        match desired.artifact() {
            Artifact::Firewall { chains, rules } => Ok((chains.as_slice(), rules.as_slice())),
            other => Err(Error::resource_apply(
                desired.kind().name(),
                format!("expected a firewall artifact, got {:?}", other),
            )),
        }
    }

    async fn iptables(&self, args: &[String]) -> Result<String> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.run("iptables", &args).await
    }

    async fn iptables_ok(&self, args: &[String]) -> bool {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.succeeds("iptables", &args).await
    }

    /// `iptables -t T -S CHAIN`, `None` when the chain does not exist
    async fn list_chain(&self, chain: &FirewallChain) -> Option<String> {
        self.iptables(&chain_args(chain, "-S")).await.ok()
    }

    async fn has_jump(&self, chain: &FirewallChain) -> bool {
        self.iptables_ok(&jump_args(chain, "-C")).await
    }
}

fn chain_args(chain: &FirewallChain, verb: &str) -> Vec<String> {
    vec![
        "-t".to_string(),
        chain.table.to_string(),
        verb.to_string(),
        chain.name.to_string(),
    ]
}

/// Jump rule arguments with `verb` placed after the table selector
fn jump_args(chain: &FirewallChain, verb: &str) -> Vec<String> {
    let mut args = chain.jump_args();
    args.insert(2, verb.to_string());
    args
}

#[async_trait]
impl ResourceBackend for IptablesBackend {
    fn required_tools(&self) -> &'static [&'static str] {
        &["iptables"]
    }

    async fn observe(&self, desired: &DesiredResource) -> Result<Observation> {
        let (chains, rules) = Self::firewall(desired)?;

        let mut listing = String::new();
        let mut complete = true;
        for chain in chains {
            let Some(chain_listing) = self.list_chain(chain).await else {
                tracing::debug!("Chain {} missing", chain.name);
                return Ok(Observation::absent());
            };
            if !self.has_jump(chain).await {
                tracing::debug!("Jump {} -> {} missing", chain.parent, chain.name);
                return Ok(Observation::absent());
            }

            let live = chain_listing
                .lines()
                .filter(|line| line.starts_with("-A "))
                .count();
            let expected = rules
                .iter()
                .filter(|rule| rule.table == chain.table && rule.chain == chain.name)
                .count();
            if live != expected {
                tracing::debug!(
                    "Chain {} holds {} rule(s), expected {}",
                    chain.name,
                    live,
                    expected
                );
                complete = false;
            }
            listing.push_str(&chain_listing);
        }

        if complete {
            Ok(Observation::opaque())
        } else {
            Ok(Observation {
                exists: true,
                content: Some(listing),
                service_active: None,
            })
        }
    }

    async fn apply(&self, desired: &DesiredResource, _action: Action) -> Result<()> {
        let (chains, rules) = Self::firewall(desired)?;

        for chain in chains {
            if self.list_chain(chain).await.is_none() {
                self.iptables(&chain_args(chain, "-N")).await?;
            }
            self.iptables(&chain_args(chain, "-F")).await?;
            if !self.has_jump(chain).await {
                self.iptables(&jump_args(chain, "-I")).await?;
            }
        }

        for rule in rules {
            self.iptables(&rule.args()).await?;
        }

        tracing::debug!(
            "Loaded {} rule(s) into {} chain(s)",
            rules.len(),
            chains.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use bastion_core::ResourceKind;
    use bastion_core::resources::firewall::{FORWARD_CHAIN, render_firewall};

    fn forward_only() -> DesiredResource {
        let chains = vec![FirewallChain {
            table: "filter",
            name: FORWARD_CHAIN,
            parent: "FORWARD",
        }];
        let rules = vec![
            FirewallRule {
                table: "filter",
                chain: FORWARD_CHAIN,
                spec: ["-i", "wg0", "-o", "bastion0", "-j", "ACCEPT"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            FirewallRule {
                table: "filter",
                chain: FORWARD_CHAIN,
                spec: ["-i", "bastion0", "-o", "wg0", "-j", "ACCEPT"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
        ];
        let content = render_firewall(&chains, &rules);
        DesiredResource::new(
            ResourceKind::Firewall,
            Artifact::Firewall { chains, rules },
            content,
        )
    }

    const FULL_LISTING: &str = "-N BASTION-FORWARD\n\
        -A BASTION-FORWARD -i wg0 -o bastion0 -j ACCEPT\n\
        -A BASTION-FORWARD -i bastion0 -o wg0 -j ACCEPT\n";

    #[tokio::test]
    async fn missing_chain_is_absent() {
        let runner = Arc::new(
            RecordingRunner::new().fail("iptables -t filter -S", "No chain/target/match by that name."),
        );
        let backend = IptablesBackend::new(runner);

        assert_eq!(
            backend.observe(&forward_only()).await.unwrap(),
            Observation::absent()
        );
    }

    #[tokio::test]
    async fn missing_jump_is_absent() {
        let runner = Arc::new(
            RecordingRunner::new()
                .respond("iptables -t filter -S", FULL_LISTING)
                .fail("iptables -t filter -C FORWARD", "Bad rule"),
        );
        let backend = IptablesBackend::new(runner);

        assert!(!backend.observe(&forward_only()).await.unwrap().exists);
    }

    #[tokio::test]
    async fn complete_rule_set_is_opaque() {
        let runner = Arc::new(RecordingRunner::new().respond("iptables -t filter -S", FULL_LISTING));
        let backend = IptablesBackend::new(runner);

        assert_eq!(
            backend.observe(&forward_only()).await.unwrap(),
            Observation::opaque()
        );
    }

    #[tokio::test]
    async fn flushed_chain_reads_as_drifted() {
        let runner = Arc::new(
            RecordingRunner::new().respond("iptables -t filter -S", "-N BASTION-FORWARD\n"),
        );
        let backend = IptablesBackend::new(runner);
        let desired = forward_only();

        let observation = backend.observe(&desired).await.unwrap();
        assert!(observation.exists);
        assert_eq!(observation.content.as_deref(), Some("-N BASTION-FORWARD\n"));
        assert_ne!(observation.content.as_deref(), Some(desired.content()));
    }

    #[tokio::test]
    async fn apply_creates_chain_hooks_jump_and_refills() {
        let runner = Arc::new(
            RecordingRunner::new()
                .fail("iptables -t filter -S", "No chain/target/match by that name.")
                .fail("iptables -t filter -C", "Bad rule"),
        );
        let backend = IptablesBackend::new(runner.clone());

        backend.apply(&forward_only(), Action::Create).await.unwrap();

        assert_eq!(
            runner.commands(),
            vec![
                "iptables -t filter -S BASTION-FORWARD",
                "iptables -t filter -N BASTION-FORWARD",
                "iptables -t filter -F BASTION-FORWARD",
                "iptables -t filter -C FORWARD -j BASTION-FORWARD",
                "iptables -t filter -I FORWARD -j BASTION-FORWARD",
                "iptables -t filter -A BASTION-FORWARD -i wg0 -o bastion0 -j ACCEPT",
                "iptables -t filter -A BASTION-FORWARD -i bastion0 -o wg0 -j ACCEPT",
            ]
        );
    }

    #[tokio::test]
    async fn reapply_flushes_without_duplicating_jump() {
        let runner = Arc::new(RecordingRunner::new().respond("iptables -t filter -S", FULL_LISTING));
        let backend = IptablesBackend::new(runner.clone());

        backend.apply(&forward_only(), Action::Update).await.unwrap();

        let commands = runner.commands();
        assert!(commands.contains(&"iptables -t filter -F BASTION-FORWARD".to_string()));
        assert!(!commands.iter().any(|c| c.contains(" -N ") || c.contains(" -I ")));
        assert_eq!(commands.iter().filter(|c| c.contains(" -A ")).count(), 2);
    }
}
