//! Trace-facility discovery, ported from
//! `original_source/ras-events.c`'s `get_debugfs_dir`/`get_tracing_dir`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::error::{CoreError, Result};

/// Resolved tracing directory plus the clock offset needed to translate
/// ring-buffer timestamps (kernel monotonic `uptime`) into wall time.
pub struct TraceFacility {
    pub tracing_dir: PathBuf,
    /// `now - uptime` at discovery time, in seconds, when `trace_clock` is
    /// `uptime`. `None` when the kernel's default clock
    /// (already wall-clock-relative) is in use.
    pub uptime_diff: Option<f64>,
    /// Raw contents of `events/header_page`, used by [`super::ingestion`] to
    /// derive the per-CPU subbuffer header layout.
    pub header_page: Vec<u8>,
}

/// `get_debugfs_dir()`: scans `/proc/mounts` for a `debugfs`-typed entry.
pub fn find_debugfs(mounts_path: &Path) -> Result<PathBuf> {
    let contents = fs::read_to_string(mounts_path)
        .map_err(|e| CoreError::TracingUnavailable(format!("cannot read {}: {e}", mounts_path.display())))?;
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let _device = fields.next();
        let Some(mount_point) = fields.next() else { continue };
        let Some(fstype) = fields.next() else { continue };
        if fstype == "debugfs" {
            return Ok(PathBuf::from(mount_point));
        }
    }
    Err(CoreError::TracingUnavailable(format!("no debugfs mount found in {}", mounts_path.display())))
}

/// `get_tracing_dir()`: prefers `<debugfs>/tracing/instances/<tool>` when
/// the kernel supports instances, creating it with mode `0700`; otherwise
/// falls back to `<debugfs>/tracing` directly.
pub fn resolve_tracing_dir(debugfs: &Path, tool_name: &str) -> Result<PathBuf> {
    let tracing = debugfs.join("tracing");
    let instances = tracing.join("instances");
    if instances.is_dir() {
        let instance_dir = instances.join(tool_name);
        create_instance_dir(&instance_dir)?;
        return Ok(instance_dir);
    }
    Ok(tracing)
}

#[cfg(unix)]
fn create_instance_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    match fs::DirBuilder::new().mode(0o700).create(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(CoreError::TracingUnavailable(format!("cannot create instance dir {}: {e}", path.display()))),
    }
}

#[cfg(not(unix))]
fn create_instance_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| CoreError::TracingUnavailable(format!("cannot create instance dir {}: {e}", path.display())))
}

/// Reads `trace_clock`; if `uptime` is an offered option, selects it by
/// writing `uptime` back, then computes `uptime_diff` from `/proc/uptime`
/// Any I/O failure here is non-fatal: the caller keeps
/// using the kernel's default clock.
fn select_clock(tracing_dir: &Path) -> Option<f64> {
    let clock_path = tracing_dir.join("trace_clock");
    let current = fs::read_to_string(&clock_path).ok()?;
    if !current.contains("uptime") {
        return None;
    }
    if fs::write(&clock_path, b"uptime").is_err() {
        warn!("could not select uptime trace_clock, falling back to kernel default");
        return None;
    }

    let uptime_text = fs::read_to_string("/proc/uptime").ok()?;
    let uptime_secs: f64 = uptime_text.split_whitespace().next()?.parse().ok()?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs_f64();
    Some(now - uptime_secs)
}

/// Runs the full discovery sequence.
pub fn discover(mounts_path: &Path, tool_name: &str) -> Result<TraceFacility> {
    let debugfs = find_debugfs(mounts_path)?;
    let tracing_dir = resolve_tracing_dir(&debugfs, tool_name)?;
    info!("using tracing directory {}", tracing_dir.display());

    let uptime_diff = select_clock(&tracing_dir);
    let header_page = fs::read(tracing_dir.join("events/header_page")).unwrap_or_default();

    Ok(TraceFacility { tracing_dir, uptime_diff, header_page })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn finds_debugfs_mount_line() {
        let dir = tempfile::tempdir().unwrap();
        let mounts = dir.path().join("mounts");
        let mut f = fs::File::create(&mounts).unwrap();
        writeln!(f, "none /sys/kernel/debug debugfs rw,relatime 0 0").unwrap();
        writeln!(f, "tmpfs /tmp tmpfs rw 0 0").unwrap();
        let found = find_debugfs(&mounts).unwrap();
        assert_eq!(found, PathBuf::from("/sys/kernel/debug"));
    }

    #[test]
    fn missing_debugfs_line_is_tracing_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mounts = dir.path().join("mounts");
        let mut f = fs::File::create(&mounts).unwrap();
        writeln!(f, "tmpfs /tmp tmpfs rw 0 0").unwrap();
        assert!(matches!(find_debugfs(&mounts), Err(CoreError::TracingUnavailable(_))));
    }

    #[test]
    fn resolves_instance_dir_when_instances_present() {
        let dir = tempfile::tempdir().unwrap();
        let tracing = dir.path().join("tracing");
        fs::create_dir_all(tracing.join("instances")).unwrap();
        let resolved = resolve_tracing_dir(dir.path(), "rasd").unwrap();
        assert_eq!(resolved, tracing.join("instances/rasd"));
        assert!(resolved.is_dir());
    }

    #[test]
    fn falls_back_to_tracing_dir_without_instances() {
        let dir = tempfile::tempdir().unwrap();
        let tracing = dir.path().join("tracing");
        fs::create_dir_all(&tracing).unwrap();
        let resolved = resolve_tracing_dir(dir.path(), "rasd").unwrap();
        assert_eq!(resolved, tracing);
    }
}
