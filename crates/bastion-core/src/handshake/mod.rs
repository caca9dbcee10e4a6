//! Bootstrap handshake agent
//!
//! Once the proxy stack is running, the agent waits for its admin API to
//! answer and then replaces the factory-default admin credentials, exactly
//! once.
//!
//! ## State Machine
//!
//! ```text
//! Polling ──(probe ok)──► Ready ──► Mutating ──┬──► Succeeded
//!    │                                         └──► MutationFailed
//!    └──(max_attempts probes failed)──► Exhausted
//! ```
//!
//! ## Lifecycle
//!
//! The agent runs as its own task ([`HandshakeAgent::spawn`]). The caller
//! holds the [`HandshakeHandle`] and either joins it or abandons it
//! explicitly; nothing is left running untracked.
//!
//! All log lines are emitted under this module's target, which the binary
//! routes to the dedicated handshake log.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HandshakeSettings;
use crate::error::{Error, Result};
use crate::traits::{AdminApi, CredentialUpdate};

/// Capacity of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Result of the polling phase so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Pending,
    Ready,
    Exhausted,
}

/// Progress of the readiness polling
///
/// Advances monotonically and is terminal once ready or exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeAttempt {
    /// Probes issued so far
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub outcome: ProbeOutcome,
}

impl HandshakeAttempt {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            attempt_number: 0,
            max_attempts: max_attempts.max(1),
            delay,
            outcome: ProbeOutcome::Pending,
        }
    }

    /// Start the next probe, returning its number
    ///
    /// `None` once the attempt is terminal.
    pub fn begin_next(&mut self) -> Option<u32> {
        if self.is_terminal() {
            return None;
        }
        self.attempt_number += 1;
        Some(self.attempt_number)
    }

    /// Record the result of the probe started last
    pub fn record_probe(&mut self, ready: bool) {
        if self.is_terminal() {
            return;
        }
        if ready {
            self.outcome = ProbeOutcome::Ready;
        } else if self.attempt_number >= self.max_attempts {
            self.outcome = ProbeOutcome::Exhausted;
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome != ProbeOutcome::Pending
    }
}

/// States published by the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Polling { attempt: u32 },
    Ready { attempt: u32 },
    Mutating,
    Succeeded { user_id: String },
    MutationFailed { reason: String },
    Exhausted { attempts: u32 },
}

/// A timestamped state transition
#[derive(Debug, Clone)]
pub struct HandshakeEvent {
    pub state: HandshakeState,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// Terminal result of a handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Succeeded { user_id: String },
    MutationFailed { reason: String },
    Exhausted { attempts: u32 },
}

impl HandshakeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HandshakeOutcome::Succeeded { .. })
    }

    /// Convert into the matching error for callers that need one
    pub fn into_result(self) -> Result<String> {
        match self {
            HandshakeOutcome::Succeeded { user_id } => Ok(user_id),
            HandshakeOutcome::MutationFailed { reason } => Err(Error::mutation(reason)),
            HandshakeOutcome::Exhausted { attempts } => Err(Error::ProbeTimeout { attempts }),
        }
    }
}

/// Bootstrap handshake agent
pub struct HandshakeAgent {
    api: Arc<dyn AdminApi>,
    update: CredentialUpdate,
    max_attempts: u32,
    delay: Duration,
    event_tx: mpsc::Sender<HandshakeEvent>,
}

impl HandshakeAgent {
    /// Create an agent
    ///
    /// Returns the agent and a receiver for its state transitions. The
    /// receiver may be dropped; events are then discarded.
    pub fn new(
        api: Arc<dyn AdminApi>,
        update: CredentialUpdate,
        settings: &HandshakeSettings,
    ) -> (Self, mpsc::Receiver<HandshakeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let agent = Self {
            api,
            update,
            max_attempts: settings.max_attempts,
            delay: settings.delay(),
            event_tx,
        };

        (agent, event_rx)
    }

    /// Run the handshake to completion on a background task
    pub fn spawn(self) -> HandshakeHandle {
        HandshakeHandle {
            task: tokio::spawn(self.run()),
        }
    }

    /// Run the handshake to completion
    pub async fn run(self) -> HandshakeOutcome {
        let mut attempt = HandshakeAttempt::new(self.max_attempts, self.delay);
        info!(
            "Waiting for the admin API (up to {} probe(s), {:?} apart)",
            attempt.max_attempts, attempt.delay
        );

        while let Some(number) = attempt.begin_next() {
            if number > 1 {
                tokio::time::sleep(attempt.delay).await;
            }

            self.emit(HandshakeState::Polling { attempt: number });
            let ready = match self.api.probe().await {
                Ok(()) => true,
                Err(e) => {
                    debug!("Probe {}/{} not ready: {}", number, attempt.max_attempts, e);
                    false
                }
            };
            attempt.record_probe(ready);
        }

        match attempt.outcome {
            ProbeOutcome::Ready => {
                info!("Admin API ready after {} probe(s)", attempt.attempt_number);
                self.emit(HandshakeState::Ready {
                    attempt: attempt.attempt_number,
                });
                self.mutate().await
            }
            ProbeOutcome::Exhausted | ProbeOutcome::Pending => {
                let attempts = attempt.attempt_number;
                warn!("{}", Error::ProbeTimeout { attempts });
                self.emit(HandshakeState::Exhausted { attempts });
                HandshakeOutcome::Exhausted { attempts }
            }
        }
    }

    /// Issue the single credential replacement
    async fn mutate(&self) -> HandshakeOutcome {
        self.emit(HandshakeState::Mutating);
        info!("Replacing default admin credentials with {}", self.update.email);

        let outcome = match self.api.replace_credentials(&self.update).await {
            Ok(body) => match user_id(&body) {
                Some(user_id) => HandshakeOutcome::Succeeded { user_id },
                None => HandshakeOutcome::MutationFailed {
                    reason: "response carried no user identifier".to_string(),
                },
            },
            Err(e) => HandshakeOutcome::MutationFailed {
                reason: e.to_string(),
            },
        };

        match &outcome {
            HandshakeOutcome::Succeeded { user_id } => {
                info!("Admin credentials replaced (user {})", user_id);
                self.emit(HandshakeState::Succeeded {
                    user_id: user_id.clone(),
                });
            }
            HandshakeOutcome::MutationFailed { reason } => {
                warn!("{}", Error::mutation(reason.as_str()));
                self.emit(HandshakeState::MutationFailed {
                    reason: reason.clone(),
                });
            }
            HandshakeOutcome::Exhausted { .. } => {}
        }

        outcome
    }

    fn emit(&self, state: HandshakeState) {
        let event = HandshakeEvent {
            state,
            at: chrono::Utc::now(),
        };

        if let Err(mpsc::error::TrySendError::Full(event)) = self.event_tx.try_send(event) {
            warn!("Handshake event channel full, dropping {:?}", event.state);
        }
    }
}

/// Identifier of the updated user, if the response carries one
fn user_id(body: &serde_json::Value) -> Option<String> {
    match body.get("id")? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Handle to a running handshake
#[derive(Debug)]
pub struct HandshakeHandle {
    task: JoinHandle<HandshakeOutcome>,
}

impl HandshakeHandle {
    /// Wait for the handshake to finish
    pub async fn join(self) -> Result<HandshakeOutcome> {
        self.task
            .await
            .map_err(|e| Error::Other(format!("Handshake task failed: {}", e)))
    }

    /// Stop waiting and cancel the handshake
    pub fn abandon(self) {
        if !self.task.is_finished() {
            warn!("Abandoning credential bootstrap; re-run it with `bastion-provision handshake`");
        }
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
