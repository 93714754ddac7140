//! Trigger dispatch, ported from `original_source/ras-mc-
//! handler.c`'s `MC_CE_TRIGGER`/`MC_UE_TRIGGER` handling and the analogous
//! hook in `ras-memory-failure-handler.c`.
//!
//! Validated once at startup ([`validate`], called from
//! [`crate::trace::registration::register_event`]'s one-shot per-event
//! setup); fired per matching event from [`crate::core::Core`]. Each fire
//! spawns the configured executable with a structured environment and lets
//! it run detached — reaping happens on a background task, never blocking
//! the event-handler path.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::records::{MemoryControllerError, MemoryFailure, Severity};

/// Checks the configured trigger path is an accessible regular file.
/// Best-effort: doesn't check the executable bit, since
/// that requires a platform-specific syscall the original does via
/// `access(path, X_OK)`; here we additionally probe via `std::fs::metadata`
/// and fall back to `false` on any I/O error.
pub fn validate(path: &str) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Builds the `TIMESTAMP`/`COUNT`/.../`DRIVER_DETAIL` environment
/// for an `mc_event`.
fn mc_event_env(record: &MemoryControllerError) -> HashMap<&'static str, String> {
    let mut env = HashMap::new();
    env.insert("TIMESTAMP", record.timestamp.clone());
    env.insert("COUNT", record.error_count.to_string());
    env.insert("TYPE", format!("{:?}", record.severity));
    env.insert("MESSAGE", record.message.clone());
    env.insert("LABEL", record.label.clone());
    env.insert("MC_INDEX", record.mc_index.to_string());
    env.insert("TOP_LAYER", record.top_layer.to_string());
    env.insert("MIDDLE_LAYER", record.middle_layer.to_string());
    env.insert("LOWER_LAYER", record.lower_layer.to_string());
    env.insert("ADDRESS", format!("{:#x}", record.address));
    env.insert("GRAIN", record.grain.to_string());
    env.insert("SYNDROME", format!("{:#x}", record.syndrome));
    env.insert("DRIVER_DETAIL", record.driver_detail.clone());
    env
}

/// Same env shape as [`mc_event_env`], for `memory_failure_event`. The
/// original reuses the same trigger-firing routine for both event kinds;
/// fields that don't apply to a page-frame failure (label, layers, grain,
/// syndrome, driver detail) are left empty rather than omitted, so a
/// trigger script can source a consistent set of variable names regardless
/// of which event fired it.
fn memory_failure_env(record: &MemoryFailure) -> HashMap<&'static str, String> {
    let mut env = HashMap::new();
    env.insert("TIMESTAMP", record.timestamp.clone());
    env.insert("COUNT", "1".to_string());
    env.insert("TYPE", record.page_type.clone());
    env.insert("MESSAGE", record.action_result.clone());
    env.insert("LABEL", String::new());
    env.insert("MC_INDEX", String::new());
    env.insert("TOP_LAYER", String::new());
    env.insert("MIDDLE_LAYER", String::new());
    env.insert("LOWER_LAYER", String::new());
    env.insert("ADDRESS", format!("{:#x}", record.pfn << 12));
    env.insert("GRAIN", String::new());
    env.insert("SYNDROME", String::new());
    env.insert("DRIVER_DETAIL", String::new());
    env
}

/// Spawns `trigger` with `env` set, stdio inherited from the daemon per
/// trigger configuration. Reaping is asynchronous: the wait happens on a detached task so a slow
/// or hung trigger never blocks the event-handler path.
fn fire(trigger: &str, env: HashMap<&'static str, String>) {
    let mut cmd = Command::new(trigger);
    cmd.envs(env).stdin(Stdio::null()).stdout(Stdio::inherit()).stderr(Stdio::inherit());

    match cmd.spawn() {
        Ok(mut child) => {
            let trigger = trigger.to_string();
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => info!("trigger {trigger} exited with {status}"),
                    Err(e) => warn!("failed to wait on trigger {trigger}: {e}"),
                }
            });
        }
        Err(e) => warn!("failed to spawn trigger {trigger}: {e}"),
    }
}

/// Fires `MC_CE_TRIGGER` or `MC_UE_TRIGGER` depending on `record`'s
/// severity, if configured. Deferred/Fatal/Info severities have no
/// configured trigger and are silently skipped, matching the original
/// (only corrected and uncorrected have a trigger variable at all).
pub fn dispatch_mc_event(ce_trigger: Option<&str>, ue_trigger: Option<&str>, record: &MemoryControllerError) {
    let trigger = match record.severity {
        Severity::Corrected => ce_trigger,
        Severity::Uncorrected | Severity::Fatal => ue_trigger,
        Severity::Deferred | Severity::Info => None,
    };
    if let Some(trigger) = trigger {
        fire(trigger, mc_event_env(record));
    }
}

/// Fires `MEMORY_FAILURE_TRIGGER` if configured.
pub fn dispatch_memory_failure(trigger: Option<&str>, record: &MemoryFailure) {
    if let Some(trigger) = trigger {
        fire(trigger, memory_failure_env(record));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_path() {
        assert!(!validate("/nonexistent/path/to/trigger"));
    }

    #[test]
    fn validate_accepts_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trigger.sh");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        assert!(validate(path.to_str().unwrap()));
    }

    #[test]
    fn mc_event_env_renders_hex_address() {
        let record = MemoryControllerError {
            timestamp: "now".to_string(),
            error_count: 2,
            severity: Severity::Corrected,
            message: "DRAM ECC error".to_string(),
            label: "DIMM_A1".to_string(),
            mc_index: 0,
            top_layer: 0,
            middle_layer: -1,
            lower_layer: -1,
            address: 0x1000,
            grain: 6,
            syndrome: 0,
            driver_detail: String::new(),
        };
        let env = mc_event_env(&record);
        assert_eq!(env["ADDRESS"], "0x1000");
        assert_eq!(env["COUNT"], "2");
        assert_eq!(env["LABEL"], "DIMM_A1");
    }

    #[test]
    fn deferred_severity_has_no_trigger() {
        let record = MemoryControllerError {
            timestamp: "now".to_string(),
            error_count: 1,
            severity: Severity::Deferred,
            message: String::new(),
            label: String::new(),
            mc_index: 0,
            top_layer: -1,
            middle_layer: -1,
            lower_layer: -1,
            address: 0,
            grain: 0,
            syndrome: 0,
            driver_detail: String::new(),
        };
        // Neither trigger configured: dispatch_mc_event must not panic and
        // must not attempt to spawn anything (severity has no mapping).
        dispatch_mc_event(Some("/bin/true"), Some("/bin/true"), &record);
    }
}
