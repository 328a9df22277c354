//! `inboxhook` - IMAP notification watcher
//!
//! Watches a mailbox with IDLE and a fallback poll, and hands the action link
//! of each matching notification to a page-automation collaborator.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod automation;
mod cli;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use inboxhook_core::{
    Config, Connector, ImapConnector, MailSession, RunOutcome, Supervisor, Watcher,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use automation::Automation;
use cli::Cli;

/// Reconnect attempts exhausted (`EX_UNAVAILABLE`).
const EXIT_RECONNECT_EXHAUSTED: u8 = 69;
/// Configuration error (`EX_CONFIG`).
const EXIT_CONFIG: u8 = 78;

// One cooperative event loop; the check gate relies on it.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting inboxhook");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if cli.check_config {
        println!("{config}");
        return ExitCode::SUCCESS;
    }

    match run(&cli, &config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format_args!("{e:#}"), "inboxhook failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose {
        "inboxhook=debug,inboxhook_core=debug,inboxhook_imap=debug"
    } else {
        "inboxhook=info,inboxhook_core=info,inboxhook_imap=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    let automation = Automation::from_config(config)?;
    let mut watcher = Watcher::new(
        config.targets.clone(),
        config.action_marker.clone(),
        automation,
    )
    .with_seen_policy(config.seen_policy);
    let connector = config.imap.connector();

    info!(
        host = %config.imap.host,
        mailbox = %config.imap.mailbox,
        senders = config.targets.addresses().len(),
        subjects = config.targets.subjects().len(),
        automation = %config.automation,
        "configuration loaded"
    );

    if cli.once {
        return run_once(&connector, &mut watcher).await;
    }

    let mut supervisor = Supervisor::new(config.reconnect);
    let outcome = supervisor
        .run(&connector, &mut watcher, config.watch_timing(), shutdown_signal())
        .await;

    Ok(match outcome {
        RunOutcome::Shutdown => {
            info!("stopped");
            ExitCode::SUCCESS
        }
        RunOutcome::Exhausted { attempts } => {
            error!(attempts, "giving up; restart required");
            ExitCode::from(EXIT_RECONNECT_EXHAUSTED)
        }
    })
}

async fn run_once(
    connector: &ImapConnector,
    watcher: &mut Watcher<Automation>,
) -> anyhow::Result<ExitCode> {
    let mut session = connector
        .connect()
        .await
        .context("failed to open mailbox")?;
    let report = watcher
        .run_check_cycle(&mut session)
        .await
        .context("check cycle failed")?;
    info!(
        candidates = report.candidates,
        matched = report.matched,
        dispatched = report.dispatched,
        failed = report.failed,
        "check complete"
    );
    if let Err(e) = session.logout().await {
        warn!(error = %e, "logout failed");
    }
    Ok(ExitCode::SUCCESS)
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Ctrl-C received"),
        () = terminate => info!("SIGTERM received"),
    }
}
