//! CPU isolation engine.
//!
//! There is no dedicated original rasdaemon source file for this engine —
//! `original_source/ras-arm-handler.c` classifies core failures and counts
//! recoverable errors (see [`crate::decoders::arm::count_errors`]) but stops
//! short of an offlining policy. This engine follows the page engine's shape
//! (`ras-page-isolation.c`, [`super::page`]) instead: same decaying-window
//! accumulation, same [`Action`] ladder, applied per logical CPU rather than
//! per page address (see DESIGN.md).

use std::collections::HashMap;

use tracing::{error, info};

use crate::config::Action;
use crate::decoders::arm::{count_errors, GhesSeverity};
use crate::records::ArmProcessorErrorInfo;

struct CpuRecord {
    start: u64,
    count: u64,
    isolated: bool,
}

pub struct CpuEngine {
    action: Action,
    threshold: u64,
    cycle_secs: u64,
    cpus: HashMap<u32, CpuRecord>,
}

impl CpuEngine {
    pub fn new(action: Action, threshold: u64, cycle_secs: u64) -> Self {
        CpuEngine { action, threshold, cycle_secs, cpus: HashMap::new() }
    }

    /// Accumulates an error sample for `cpu`'s
    /// [`crate::decoders::arm::count_errors`]-derived count (caller passes
    /// the event's real `GhesSeverity` — Corrected events count every PEI
    /// entry, Recoverable events only core failures) and, crossing
    /// threshold, isolates the CPU.
    pub fn record_cpu_error(&mut self, cpu: u32, pei_list: &[ArmProcessorErrorInfo], sev: GhesSeverity, now: u64) {
        if self.action == Action::Off {
            return;
        }
        let count = count_errors(pei_list, sev);
        if count == 0 {
            return;
        }

        let threshold = self.threshold;
        let cycle_secs = self.cycle_secs;
        let action = self.action;
        let record = self.cpus.entry(cpu).or_insert_with(|| CpuRecord { start: now, count: 0, isolated: false });

        let period = now.saturating_sub(record.start);
        if period >= cycle_secs && cycle_secs > 0 {
            let tolerate = ((period as f64) / (cycle_secs as f64) * (threshold as f64)) as u64;
            record.count = record.count.saturating_sub(tolerate.min(record.count));
            record.start = now;
        }

        record.count += count as u64;
        if record.count >= threshold {
            info!("recoverable core errors on cpu{cpu} exceeded CPU threshold, count={}", record.count);
            record.count = 0;
            isolate_cpu(cpu, record, action);
        }
    }

    pub fn is_isolated(&self, cpu: u32) -> bool {
        self.cpus.get(&cpu).map(|r| r.isolated).unwrap_or(false)
    }
}

/// Takes the configured action against `cpu`: `Account` only logs, anything
/// past it writes `0` to the CPU's sysfs `online` attribute.
/// `SoftThenHard` has no distinct meaning for CPU offlining (there is only
/// one kernel mechanism); it behaves like `Hard`.
fn isolate_cpu(cpu: u32, record: &mut CpuRecord, action: Action) {
    if matches!(action, Action::Off | Action::Account) {
        info!("cpu action {action:?}, not isolating cpu{cpu}");
        return;
    }
    if record.isolated {
        return;
    }

    let path = format!("/sys/devices/system/cpu/cpu{cpu}/online");
    match std::fs::write(&path, b"0") {
        Ok(()) => {
            record.isolated = true;
            info!("cpu{cpu} isolated via {path}");
        }
        Err(e) => error!("failed to isolate cpu{cpu} via {path}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pei(flags: u8, multiple_error: u16) -> ArmProcessorErrorInfo {
        ArmProcessorErrorInfo {
            version: 0,
            length: 0,
            validation_bits: 0x2 | 0x4,
            kind: 0,
            multiple_error,
            flags,
            error_info: 0,
            virt_fault_addr: 0,
            physical_fault_addr: 0,
        }
    }

    #[test]
    fn off_action_never_accumulates() {
        let mut engine = CpuEngine::new(Action::Off, 5, 3600);
        engine.record_cpu_error(0, &[pei(0x1, 0)], GhesSeverity::Recoverable, 1);
        assert!(engine.cpus.is_empty());
    }

    #[test]
    fn threshold_crossing_isolates_with_hard_action() {
        let mut engine = CpuEngine::new(Action::Account, 2, 3600);
        engine.record_cpu_error(3, &[pei(0x1, 1)], GhesSeverity::Recoverable, 1);
        assert!(!engine.is_isolated(3));
        engine.record_cpu_error(3, &[pei(0x1, 1)], GhesSeverity::Recoverable, 2);
        // account action: isolated flag stays false even past threshold
        assert!(!engine.is_isolated(3));
    }

    #[test]
    fn cpus_tracked_independently() {
        let mut engine = CpuEngine::new(Action::Account, 100, 3600);
        engine.record_cpu_error(0, &[pei(0x1, 0)], GhesSeverity::Recoverable, 1);
        engine.record_cpu_error(1, &[pei(0x1, 0)], GhesSeverity::Recoverable, 1);
        assert_eq!(engine.cpus.len(), 2);
    }

    #[test]
    fn corrected_severity_counts_non_core_entries_recoverable_does_not() {
        // bit2 set alongside bit0 clear -> not a core failure.
        let non_core = pei(0x04, 0);

        let mut recoverable = CpuEngine::new(Action::Account, 100, 3600);
        recoverable.record_cpu_error(5, &[non_core.clone()], GhesSeverity::Recoverable, 1);
        assert!(!recoverable.cpus.contains_key(&5), "recoverable, non-core PEI must not accumulate");

        let mut corrected = CpuEngine::new(Action::Account, 100, 3600);
        corrected.record_cpu_error(5, &[non_core], GhesSeverity::Corrected, 1);
        assert_eq!(corrected.cpus.get(&5).unwrap().count, 1, "corrected severity counts every PEI entry");
    }
}
