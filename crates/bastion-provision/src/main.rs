// # bastion-provision
//
// Thin entry point over `bastion_core::Provisioner`. Parses the command
// line, installs logging, wires the host backends, the fingerprint ledger
// and the admin API client together, and maps the result to an exit code.
//
// No provisioning logic lives here.
//
// ## Usage
//
// ```bash
// # converge the host (default subcommand)
// bastion-provision --env-file /etc/bastion/bastion.env
//
// # re-run only the admin credential bootstrap
// bastion-provision handshake
// ```
//
// Every flag can also be set through its `BASTION_*` environment variable.

mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use bastion_admin_http::HttpAdminApi;
use bastion_core::traits::{AdminApi, CredentialUpdate};
use bastion_core::{
    BackendRegistry, Configuration, EnvFile, FileLedger, HandshakeAgent, HandshakeHandle,
    HandshakeOutcome, HostLayout, Planner, Preflight, ProvisionSummary, Provisioner,
};
use bastion_host::{CommandRunner, TokioRunner, WgKeyGenerator};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn};

/// Exit codes
///
/// - 0: Every resource converged
/// - 1: A precondition failed before anything was mutated
/// - 2: A resource failed to apply, or an unexpected runtime failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProvisionExitCode {
    Success = 0,
    PreconditionFailed = 1,
    RuntimeError = 2,
}

impl From<ProvisionExitCode> for ExitCode {
    fn from(code: ProvisionExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

impl ProvisionExitCode {
    fn for_error(error: &bastion_core::Error) -> Self {
        if error.is_precondition() {
            Self::PreconditionFailed
        } else {
            Self::RuntimeError
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "bastion-provision", version, about = "Provision a WireGuard bastion host")]
struct Cli {
    /// Configuration store (KEY=value file)
    #[arg(
        long,
        env = "BASTION_ENV_FILE",
        default_value = "/etc/bastion/bastion.env",
        global = true
    )]
    env_file: PathBuf,

    /// Fingerprint ledger
    #[arg(
        long,
        env = "BASTION_STATE_FILE",
        default_value = "/var/lib/bastion/state.json",
        global = true
    )]
    state_file: PathBuf,

    /// Prefix for every managed path
    #[arg(long, env = "BASTION_ROOT", default_value = "/", global = true)]
    root: PathBuf,

    /// Log file for the credential bootstrap
    #[arg(
        long,
        env = "BASTION_HANDSHAKE_LOG",
        default_value = "/var/log/bastion-handshake.log",
        global = true
    )]
    handshake_log: PathBuf,

    /// trace, debug, info, warn or error
    #[arg(long, env = "BASTION_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Do not wait for the credential bootstrap to finish
    #[arg(long, global = true)]
    no_wait: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Converge the host to the configured state
    Apply,
    /// Run only the admin credential bootstrap, in the foreground
    Handshake,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match logging::parse_level(&cli.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ProvisionExitCode::PreconditionFailed.into();
        }
    };

    if let Err(e) = logging::init(level, &cli.handshake_log) {
        eprintln!("{:#}", e);
        return ProvisionExitCode::PreconditionFailed.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ProvisionExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match cli.command.unwrap_or(Command::Apply) {
            Command::Apply => run_apply(&cli).await,
            Command::Handshake => run_handshake(&cli).await,
        }
    });

    code.into()
}

/// Full provisioning run, then the credential bootstrap if the stack is new
async fn run_apply(cli: &Cli) -> ProvisionExitCode {
    info!("Starting bastion provisioning");

    let mut store = match EnvFile::load(&cli.env_file).await {
        Ok(store) => store,
        Err(e) => {
            error!("{}", e);
            return ProvisionExitCode::for_error(&e);
        }
    };

    let summary = match provision(cli, &mut store).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("{}", e);
            return ProvisionExitCode::for_error(&e);
        }
    };

    let code = if summary.is_success() {
        info!("Provisioning succeeded: {}", summary.report.summary());
        ProvisionExitCode::Success
    } else {
        error!("Provisioning failed: {}", summary.report.summary());
        ProvisionExitCode::RuntimeError
    };

    if summary.should_bootstrap_credentials() {
        match start_handshake(&summary.config) {
            Ok(handle) => finish_handshake(handle, cli.no_wait).await,
            Err(e) => warn!(
                "Credential bootstrap not started: {:#}; re-run it with `bastion-provision handshake`",
                e
            ),
        }
    } else {
        debug!("Stack already existed; credential bootstrap not needed");
    }

    code
}

async fn provision(cli: &Cli, store: &mut EnvFile) -> bastion_core::Result<ProvisionSummary> {
    let runner: Arc<dyn CommandRunner> = Arc::new(TokioRunner::new());

    let registry = Arc::new(BackendRegistry::new());
    bastion_host::register(&registry, runner.clone());

    let ledger = FileLedger::open(&cli.state_file).await?;
    let planner = Planner::new(registry, Box::new(ledger));

    let provisioner = Provisioner::new(
        planner,
        Arc::new(WgKeyGenerator::new(runner)),
        HostLayout::under(&cli.root),
        Preflight::host(),
    );
    provisioner.run(store).await
}

fn start_handshake(config: &Configuration) -> anyhow::Result<HandshakeHandle> {
    let api: Arc<dyn AdminApi> = Arc::new(
        HttpAdminApi::from_settings(&config.admin).context("Failed to create admin API client")?,
    );
    let (agent, _events) = HandshakeAgent::new(
        api,
        CredentialUpdate::from_settings(&config.admin),
        &config.handshake,
    );

    info!("Starting admin credential bootstrap");
    Ok(agent.spawn())
}

/// Join or abandon the background handshake
///
/// Its outcome is reported on the handshake stream only.
async fn finish_handshake(handle: HandshakeHandle, no_wait: bool) {
    if no_wait {
        warn!("Not waiting for the credential bootstrap; re-run it with `bastion-provision handshake`");
        handle.abandon();
        return;
    }

    match handle.join().await.and_then(HandshakeOutcome::into_result) {
        Ok(user_id) => debug!("Credential bootstrap finished for user {}", user_id),
        Err(e) => warn!("Credential bootstrap did not succeed: {}", e),
    }
}

/// Foreground credential bootstrap
async fn run_handshake(cli: &Cli) -> ProvisionExitCode {
    let config = match EnvFile::load(&cli.env_file)
        .await
        .and_then(|store| Configuration::from_store(&store))
    {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ProvisionExitCode::for_error(&e);
        }
    };

    let handle = match start_handshake(&config) {
        Ok(handle) => handle,
        Err(e) => {
            error!("{:#}", e);
            return ProvisionExitCode::PreconditionFailed;
        }
    };

    handshake_exit_code(handle.join().await, &cli.handshake_log)
}

fn handshake_exit_code(
    joined: bastion_core::Result<HandshakeOutcome>,
    handshake_log: &Path,
) -> ProvisionExitCode {
    match joined.and_then(HandshakeOutcome::into_result) {
        Ok(user_id) => {
            info!("Credential bootstrap succeeded for user {}", user_id);
            ProvisionExitCode::Success
        }
        Err(e) => {
            error!(
                "Credential bootstrap did not succeed: {}; see {}",
                e,
                handshake_log.display()
            );
            ProvisionExitCode::RuntimeError
        }
    }
}
