//! Resolved configuration for the remediation engines.
//!
//! Mirrors `DaemonConfig` (`apps/daemon/src/config.rs`):
//! a `Default` impl carrying the documented defaults, and a separate
//! `from_env()` that overrides individual fields when the corresponding
//! variable parses. The core never reads the process environment anywhere
//! else — every engine is handed a fully-resolved `Config`.

use std::time::Duration;

/// Escalation action for a remediation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Off,
    Account,
    Soft,
    Hard,
    SoftThenHard,
}

impl Action {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Action::Off),
            "account" => Some(Action::Account),
            "soft" => Some(Action::Soft),
            "hard" => Some(Action::Hard),
            "soft_then_hard" | "soft-then-hard" => Some(Action::SoftThenHard),
            _ => None,
        }
    }
}

/// A parsed `(count, unit)` threshold or cycle value, together with whether
/// the raw environment string overflowed `u64` once the unit was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedLimit {
    pub value: u64,
    pub overflowed: bool,
}

impl ParsedLimit {
    fn clamped(value: u64) -> Self {
        ParsedLimit { value, overflowed: false }
    }
}

/// Threshold unit suffixes: `k` → ×1,000, `m` → ×1,000,000, no suffix → ×1.
const THRESHOLD_UNITS: &[(&str, u64)] = &[("k", 1_000), ("m", 1_000_000), ("", 1)];

/// Cycle unit suffixes: `s` → ×1, `m` → ×60, `h` → ×3600, `d` → ×86400.
const CYCLE_UNITS: &[(&str, u64)] = &[("s", 1), ("m", 60), ("h", 3_600), ("d", 86_400)];

/// Parses `raw` as `<digits><unit>` against `units`, multiplying the digit
/// run by the matched unit's factor. On overflow, wraps around (matching
/// `parse_isolation_env`'s raw `value *= units->val` unsigned multiply,
/// `original_source/ras-page-isolation.c`) and sets `overflowed` — the
/// wrapped value, not `u64::MAX`, is what the caller thresholds against;
/// the original's base-unit re-render is cosmetic, for its log line only.
/// Falls back to `default` on any parse failure (non-digit prefix, unknown
/// unit, zero value), logging nothing here — the caller logs with its own
/// field name.
fn parse_limit(raw: Option<&str>, units: &[(&str, u64)], default: u64) -> ParsedLimit {
    let raw = match raw {
        Some(r) if !r.is_empty() => r,
        _ => return ParsedLimit::clamped(default),
    };

    let (digits, unit) = split_unit(raw, units);
    let digits = match digits {
        Some(d) if !d.is_empty() => d,
        _ => return ParsedLimit::clamped(default),
    };
    let value: u64 = match digits.parse() {
        Ok(0) | Err(_) => return ParsedLimit::clamped(default),
        Ok(v) => v,
    };
    let factor = units.iter().find(|(name, _)| *name == unit).map(|(_, f)| *f).unwrap_or(1);

    ParsedLimit { value: value.wrapping_mul(factor), overflowed: value.checked_mul(factor).is_none() }
}

/// Splits `raw` into a leading digit run and a trailing unit suffix that
/// must match one of `units`' (non-empty) names, case-insensitively. If the
/// whole string is digits, the unit is `""`.
fn split_unit<'a>(raw: &'a str, units: &[(&str, u64)]) -> (Option<&'a str>, &'a str) {
    if raw.chars().all(|c| c.is_ascii_digit()) {
        return (Some(raw), "");
    }
    let mut chars = raw.char_indices();
    if let Some((idx, _)) = chars.next_back() {
        let (digits, suffix) = raw.split_at(idx);
        if digits.chars().all(|c| c.is_ascii_digit())
            && units.iter().any(|(name, _)| !name.is_empty() && name.eq_ignore_ascii_case(suffix))
        {
            let matched = units.iter().find(|(name, _)| name.eq_ignore_ascii_case(suffix)).unwrap().0;
            return (Some(digits), matched);
        }
    }
    (None, "")
}

/// Fully-resolved remediation configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub page_action: Action,
    pub page_threshold: u64,
    pub page_cycle: Duration,

    pub row_action: Action,
    pub row_threshold: u64,
    pub row_cycle: Duration,

    pub cpu_action: Action,
    pub cpu_threshold: u64,
    pub cpu_cycle: Duration,

    /// Trigger executable for corrected `mc_event`s (`MC_CE_TRIGGER`).
    pub mc_ce_trigger: Option<String>,
    /// Trigger executable for uncorrected `mc_event`s (`MC_UE_TRIGGER`).
    pub mc_ue_trigger: Option<String>,
    /// Trigger executable for `memory_failure_event`s.
    pub memory_failure_trigger: Option<String>,

    /// Newline- or comma-separated `group:event` names to keep disabled.
    pub disabled_events: Vec<String>,

    /// Path of the per-tool tracing instance (defaults to the daemon name).
    pub tool_name: String,

    /// Abstract-namespace socket name for the broadcast server, if enabled.
    pub broadcast_socket: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            page_action: Action::Soft,
            page_threshold: 50,
            page_cycle: Duration::from_secs(24 * 3_600),

            row_action: Action::Off,
            row_threshold: 50,
            row_cycle: Duration::from_secs(24 * 3_600),

            cpu_action: Action::Off,
            cpu_threshold: 50,
            cpu_cycle: Duration::from_secs(24 * 3_600),

            mc_ce_trigger: None,
            mc_ue_trigger: None,
            memory_failure_trigger: None,

            disabled_events: Vec::new(),

            tool_name: "rasd".to_string(),
            broadcast_socket: None,
        }
    }
}

impl Config {
    /// Builds a [`Config`] from the documented environment variables,
    /// falling back to [`Default::default`] for anything unset
    /// or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("PAGE_CE_ACTION") {
            if let Some(a) = Action::parse(&v) {
                config.page_action = a;
            }
        }
        config.page_threshold =
            parse_limit(std::env::var("PAGE_CE_THRESHOLD").ok().as_deref(), THRESHOLD_UNITS, config.page_threshold)
                .value;
        config.page_cycle = Duration::from_secs(
            parse_limit(std::env::var("PAGE_CE_REFRESH_CYCLE").ok().as_deref(), CYCLE_UNITS, config.page_cycle.as_secs())
                .value,
        );

        if let Ok(v) = std::env::var("ROW_CE_ACTION") {
            if let Some(a) = Action::parse(&v) {
                config.row_action = a;
            }
        }
        config.row_threshold =
            parse_limit(std::env::var("ROW_CE_THRESHOLD").ok().as_deref(), THRESHOLD_UNITS, config.row_threshold)
                .value;
        config.row_cycle = Duration::from_secs(
            parse_limit(std::env::var("ROW_CE_REFRESH_CYCLE").ok().as_deref(), CYCLE_UNITS, config.row_cycle.as_secs())
                .value,
        );

        // Row-level escalation takes precedence over
        // page-level; forcing page_action off here keeps every downstream
        // consumer of `Config` from having to re-derive the rule.
        if config.row_action != Action::Off {
            config.page_action = Action::Off;
        }

        if let Ok(v) = std::env::var("CPU_CE_ACTION") {
            if let Some(a) = Action::parse(&v) {
                config.cpu_action = a;
            }
        }
        config.cpu_threshold =
            parse_limit(std::env::var("CPU_CE_THRESHOLD").ok().as_deref(), THRESHOLD_UNITS, config.cpu_threshold)
                .value;
        config.cpu_cycle = Duration::from_secs(
            parse_limit(std::env::var("CPU_CE_REFRESH_CYCLE").ok().as_deref(), CYCLE_UNITS, config.cpu_cycle.as_secs())
                .value,
        );

        config.mc_ce_trigger = std::env::var("MC_CE_TRIGGER").ok();
        config.mc_ue_trigger = std::env::var("MC_UE_TRIGGER").ok();
        config.memory_failure_trigger = std::env::var("MEMORY_FAILURE_TRIGGER").ok();

        if let Ok(v) = std::env::var("RASD_DISABLED_EVENTS") {
            config.disabled_events =
                v.split(|c| c == ',' || c == '\n').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }

        if let Ok(v) = std::env::var("RASD_TOOL_NAME") {
            config.tool_name = v;
        }

        config.broadcast_socket = std::env::var("RASD_BROADCAST_SOCKET").ok();

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_limit_plain_digits() {
        let p = parse_limit(Some("50"), THRESHOLD_UNITS, 1);
        assert_eq!(p.value, 50);
        assert!(!p.overflowed);
    }

    #[test]
    fn parse_limit_applies_k_and_m_suffix() {
        assert_eq!(parse_limit(Some("5k"), THRESHOLD_UNITS, 1).value, 5_000);
        assert_eq!(parse_limit(Some("2m"), THRESHOLD_UNITS, 1).value, 2_000_000);
    }

    #[test]
    fn parse_limit_applies_cycle_suffix() {
        assert_eq!(parse_limit(Some("24h"), CYCLE_UNITS, 1).value, 86_400);
        assert_eq!(parse_limit(Some("1d"), CYCLE_UNITS, 1).value, 86_400);
    }

    #[test]
    fn parse_limit_falls_back_to_default_on_garbage() {
        assert_eq!(parse_limit(Some("banana"), THRESHOLD_UNITS, 7).value, 7);
        assert_eq!(parse_limit(Some("0"), THRESHOLD_UNITS, 7).value, 7);
        assert_eq!(parse_limit(None, THRESHOLD_UNITS, 7).value, 7);
    }

    #[test]
    fn parse_limit_wraps_on_overflow() {
        let huge = format!("{}", u64::MAX);
        let p = parse_limit(Some(&huge), THRESHOLD_UNITS, 1);
        // no unit: value itself doesn't overflow the multiply by 1.
        assert!(!p.overflowed);

        let near_max = u64::MAX / 1_000 + 1;
        let p3 = parse_limit(Some(&format!("{near_max}k")), THRESHOLD_UNITS, 1);
        assert!(p3.overflowed);
        assert_eq!(p3.value, near_max.wrapping_mul(1_000));
        assert_ne!(p3.value, u64::MAX);
    }

    #[test]
    fn row_action_forces_page_action_off() {
        std::env::set_var("ROW_CE_ACTION", "soft");
        let config = Config::from_env();
        assert_eq!(config.row_action, Action::Soft);
        assert_eq!(config.page_action, Action::Off);
        std::env::remove_var("ROW_CE_ACTION");
    }
}
