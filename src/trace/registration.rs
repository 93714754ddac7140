//! Event registration, ported from `__toggle_ras_mc_event()`
//! and the per-event filter/trigger setup in `original_source/ras-events.c`.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use super::format::{self, EventFormat};
use crate::error::{CoreError, Result};

/// A compiled-in tracepoint the core knows how to decode.
#[derive(Debug, Clone, Copy)]
pub struct EventDescriptor {
    pub group: &'static str,
    pub name: &'static str,
    /// Present for `mc_event` and `memory_failure_event`.
    pub trigger_env: Option<&'static str>,
}

/// All tracepoints this build knows how to decode and enable, minus
/// `block_rq_error`/`block_rq_complete` whose choice depends on the
/// running kernel — see [`super::discovery`]'s caller.
pub const KNOWN_EVENTS: &[EventDescriptor] = &[
    EventDescriptor { group: "ras", name: "mc_event", trigger_env: Some("MC_CE_TRIGGER") },
    EventDescriptor { group: "ras", name: "aer_event", trigger_env: None },
    EventDescriptor { group: "mce", name: "mce_record", trigger_env: None },
    EventDescriptor { group: "ras", name: "extlog_mem_event", trigger_env: None },
    EventDescriptor { group: "ras", name: "non_standard_event", trigger_env: None },
    EventDescriptor { group: "ras", name: "arm_event", trigger_env: None },
    EventDescriptor { group: "devlink", name: "devlink_health_report", trigger_env: None },
    EventDescriptor { group: "ras", name: "memory_failure_event", trigger_env: Some("MEMORY_FAILURE_TRIGGER") },
    EventDescriptor { group: "cxl", name: "cxl_poison", trigger_env: None },
    EventDescriptor { group: "cxl", name: "cxl_aer_uncorrectable_error", trigger_env: None },
    EventDescriptor { group: "cxl", name: "cxl_aer_correctable_error", trigger_env: None },
    EventDescriptor { group: "cxl", name: "cxl_overflow", trigger_env: None },
    EventDescriptor { group: "cxl", name: "cxl_generic_event", trigger_env: None },
    EventDescriptor { group: "cxl", name: "cxl_general_media", trigger_env: None },
    EventDescriptor { group: "cxl", name: "cxl_dram", trigger_env: None },
    EventDescriptor { group: "cxl", name: "cxl_memory_module", trigger_env: None },
];

pub struct RegisteredEvent {
    pub descriptor: EventDescriptor,
    pub format: EventFormat,
}

fn is_disabled(disabled_list: &[String], group: &str, name: &str) -> bool {
    let full = format!("{group}:{name}");
    disabled_list.iter().any(|d| d == &full)
}

/// Appends `<group>:<name>\n` to `set_event` to enable it, or prefixes `!`
/// to disable. Failure is logged and non-fatal per
/// event, matching the original's `__toggle_ras_mc_event`.
fn toggle_event(tracing_dir: &Path, group: &str, name: &str, enable: bool) {
    let set_event = tracing_dir.join("set_event");
    let line = format!("{}{group}:{name}\n", if enable { "" } else { "!" });
    if let Err(e) = fs::OpenOptions::new().append(true).open(&set_event).and_then(|mut f| {
        use std::io::Write;
        f.write_all(line.as_bytes())
    }) {
        warn!("can't write to set_event for {group}:{name}: {e}");
    }
}

/// Registers one event: reads its format, checks the disabled list, enables
/// it, and runs trigger setup if applicable. Returns `EventDisabled`
/// when the event is on `disabled_list`; returns `EventFormatMissing` when
/// the kernel doesn't expose this tracepoint at all (module not loaded,
/// unsupported arch, etc — not fatal for the daemon as a whole, the caller
/// just skips it).
pub fn register_event(
    tracing_dir: &Path,
    descriptor: EventDescriptor,
    disabled_list: &[String],
) -> Result<RegisteredEvent> {
    let format_path = tracing_dir.join(format!("events/{}/{}/format", descriptor.group, descriptor.name));
    let contents = fs::read_to_string(&format_path).map_err(|_| CoreError::EventFormatMissing {
        group: descriptor.group.to_string(),
        name: descriptor.name.to_string(),
    })?;
    let format = format::parse_format(&contents).map_err(|_| CoreError::EventFormatMissing {
        group: descriptor.group.to_string(),
        name: descriptor.name.to_string(),
    })?;

    if is_disabled(disabled_list, descriptor.group, descriptor.name) {
        return Err(CoreError::EventDisabled { group: descriptor.group.to_string(), name: descriptor.name.to_string() });
    }

    toggle_event(tracing_dir, descriptor.group, descriptor.name, true);
    info!("{}:{} event enabled", descriptor.group, descriptor.name);

    if let Some(var) = descriptor.trigger_env {
        run_trigger_setup(var);
    }

    Ok(RegisteredEvent { descriptor, format })
}

/// One-shot per-event trigger setup: validates the
/// configured trigger executable is accessible. Only logs —
/// `crate::trigger` owns the actual trigger invocation at event time.
fn run_trigger_setup(var: &str) {
    match std::env::var(var) {
        Ok(path) if !path.is_empty() => {
            if std::fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false) {
                info!("trigger {var}={path} is accessible");
            } else {
                warn!("trigger {var}={path} is not accessible");
            }
        }
        _ => {}
    }
}

/// Disables every known event on shutdown, best-effort (mirrors
/// `toggle_ras_mc_event(0)` being callable independently of startup).
pub fn disable_all(tracing_dir: &Path) {
    for event in KNOWN_EVENTS {
        toggle_event(tracing_dir, event.group, event.name, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_list_match_is_group_colon_name() {
        let disabled = vec!["ras:mc_event".to_string()];
        assert!(is_disabled(&disabled, "ras", "mc_event"));
        assert!(!is_disabled(&disabled, "ras", "aer_event"));
    }

    #[test]
    fn register_missing_format_file_is_event_format_missing() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = EventDescriptor { group: "ras", name: "mc_event", trigger_env: None };
        let result = register_event(dir.path(), descriptor, &[]);
        assert!(matches!(result, Err(CoreError::EventFormatMissing { .. })));
    }

    #[test]
    fn register_respects_disabled_list() {
        let dir = tempfile::tempdir().unwrap();
        let format_dir = dir.path().join("events/ras/mc_event");
        fs::create_dir_all(&format_dir).unwrap();
        fs::write(format_dir.join("format"), "name: mc_event\nID: 1\nformat:\n\tfield:int error_count;\toffset:0;\tsize:4;\tsigned:1;\n").unwrap();
        fs::write(dir.path().join("set_event"), "").unwrap();

        let descriptor = EventDescriptor { group: "ras", name: "mc_event", trigger_env: None };
        let result = register_event(dir.path(), descriptor, &["ras:mc_event".to_string()]);
        assert!(matches!(result, Err(CoreError::EventDisabled { .. })));
    }

    #[test]
    fn register_succeeds_and_writes_set_event() {
        let dir = tempfile::tempdir().unwrap();
        let format_dir = dir.path().join("events/ras/mc_event");
        fs::create_dir_all(&format_dir).unwrap();
        fs::write(format_dir.join("format"), "name: mc_event\nID: 1\nformat:\n\tfield:int error_count;\toffset:0;\tsize:4;\tsigned:1;\n").unwrap();
        fs::write(dir.path().join("set_event"), "").unwrap();

        let descriptor = EventDescriptor { group: "ras", name: "mc_event", trigger_env: None };
        let registered = register_event(dir.path(), descriptor, &[]).unwrap();
        assert_eq!(registered.format.name, "mc_event");
        let set_event = fs::read_to_string(dir.path().join("set_event")).unwrap();
        assert_eq!(set_event, "ras:mc_event\n");
    }
}
