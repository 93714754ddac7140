//! RAS Error Daemon (rasd)
//!
//! Decodes kernel RAS tracepoints (MCA/MCE, CPER, PCIe AER, ARM processor
//! errors, CXL events, EDAC, devlink health reports, memory-failure and
//! disk-error events) into structured records, persists them, applies the
//! configured page/row/CPU remediation policy, and optionally broadcasts
//! each record to local subscribers over an abstract Unix socket.
//!
//! Runs as a single long-lived process until SIGINT/SIGTERM/SIGHUP/SIGQUIT.

use std::process::ExitCode;
use std::sync::Arc;

use rasd::config::Config;
use rasd::core::Core;
use rasd::error::CoreError;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,rasd=debug")))
        .init();

    info!("starting rasd v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();

    let core = match Core::bootstrap(config) {
        Ok(core) => Arc::new(core),
        Err(e) => {
            error!("bootstrap failed: {e}");
            return exit_code_for(&e);
        }
    };

    match core.run().await {
        Ok(()) => {
            info!("rasd shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("rasd exited with error: {e}");
            exit_code_for(&e)
        }
    }
}

/// Maps the two startup-fatal error kinds to distinct exit
/// codes so supervisors (systemd, etc.) can tell configuration/environment
/// failures apart from a genuinely unsupported kernel/arch combination.
fn exit_code_for(err: &CoreError) -> ExitCode {
    match err {
        CoreError::TracingUnavailable(_) => ExitCode::from(2),
        CoreError::NoEventsAvailable => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    }
}
