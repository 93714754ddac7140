//! Per-CPU ingestion: the hard part. Drives every per-CPU raw
//! trace pipe, in one of two modes depending on what the running kernel's
//! `poll()` actually does on `trace_pipe_raw`:
//!
//! - **Preferred**: each per-CPU pipe is wrapped in a
//!   [`tokio::io::unix::AsyncFd`] and a dedicated task awaits readability
//!   before reading — this is this crate's readiness multiplexer, standing
//!   in for the original's single-threaded `poll(2)` loop over every fd at
//!   once. Tokio tasks are the idiomatic Rust rendering of "N things
//!   driven by one epoll set".
//! - **Fallback**: on kernels where `poll()` doesn't gate on data being
//!   present, the same per-CPU task instead blocks on a plain read and
//!   sleeps [`POLLING_TIME`] between zero-byte reads.
//!
//! Both modes funnel parsed page bytes through one `mpsc` channel into a
//! single serializer loop: persistence and remediation only ever
//! see events on that one task, so no cross-thread synchronization is
//! needed for record state even though ingestion itself is N-way
//! concurrent.

use std::io;
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use tokio::io::unix::AsyncFd;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::format::HeaderPageLayout;
use super::signals::TerminationSignals;
use crate::error::{CoreError, Result};

/// Legacy-kernel fallback polling interval.
pub const POLLING_TIME: Duration = Duration::from_secs(3);

/// Assumed kernel page size; every mainline kernel's per-CPU subbuffer is
/// one `PAGE_SIZE` regardless of architecture page size quirks this crate
/// doesn't need to special-case. One page-sized subbuffer is read at a time.
const TRACE_PAGE_SIZE: usize = 4096;

/// How many consecutive zero-byte wakeups on every CPU, in the preferred
/// mode, before we conclude `poll()` isn't gating on data and switch to
/// the fallback loop, i.e. all CPU descriptors returned zero bytes on the
/// same wakeup.
const FALLBACK_DETECTION_STREAK: usize = 3;

/// One decoded ring-buffer record, handed to the serializer task.
#[derive(Debug, Clone)]
pub struct RawTraceEvent {
    pub cpu: u32,
    /// The kernel's per-tracepoint numeric ID (`common_type`), used to
    /// look up the registered [`super::format::EventFormat`] during event
    /// parsing.
    pub event_id: u16,
    /// Ring-buffer-relative timestamp; see [`super::discovery::TraceFacility::uptime_diff`]
    /// for translating to wall time.
    pub timestamp: u64,
    /// Raw record bytes, including the `common_*` header fields, so
    /// `EventFormat`'s absolute byte offsets remain valid.
    pub payload: Vec<u8>,
}

/// Ring-buffer (`kbuffer`) page parsing, grounded on the kernel's
/// `ring_buffer_event` encoding (`include/linux/ring_buffer.h`). Pure and
/// unit-testable independent of any actual kernel.
mod kbuffer {
    use super::HeaderPageLayout;

    const TYPE_PADDING: u32 = 29;
    const TYPE_TIME_EXTEND: u32 = 30;
    const TYPE_TIME_STAMP: u32 = 31;

    /// One ring-buffer record as found on the page: its cumulative
    /// timestamp (running sum of `time_delta`s from the start of the
    /// page) and its data bytes (header excluded).
    pub struct Event<'a> {
        pub timestamp: u64,
        pub data: &'a [u8],
    }

    /// Walks one subbuffer's committed region, yielding every data event.
    /// A negative (corrupt) commit length ends iteration immediately.
    pub fn parse_page<'a>(layout: &HeaderPageLayout, page: &'a [u8]) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        if page.len() < layout.data_offset || layout.commit_offset + layout.commit_size > page.len() {
            return events;
        }

        let commit = read_signed(&page[layout.commit_offset..layout.commit_offset + layout.commit_size]);
        if commit < 0 {
            return events;
        }
        let commit = commit as usize;
        let data = &page[layout.data_offset..];
        let commit = commit.min(data.len());

        let mut cursor = 0usize;
        let mut time: u64 = 0;
        while cursor + 4 <= commit {
            let header = u32::from_le_bytes(data[cursor..cursor + 4].try_into().unwrap());
            let type_len = header & 0x1f;
            let time_delta = (header >> 5) as u64;
            time += time_delta;
            cursor += 4;

            match type_len {
                TYPE_PADDING => {
                    if time_delta == 0 {
                        break;
                    }
                    let Some(len) = read_u32(data, cursor) else { break };
                    cursor += 4 + len as usize;
                }
                TYPE_TIME_EXTEND => {
                    cursor += 4;
                }
                TYPE_TIME_STAMP => {
                    cursor += 12;
                }
                0 => {
                    let Some(len) = read_u32(data, cursor) else { break };
                    cursor += 4;
                    let len = len as usize;
                    if cursor + len > commit {
                        break;
                    }
                    events.push(Event { timestamp: time, data: &data[cursor..cursor + len] });
                    cursor += len;
                }
                n => {
                    let len = (n as usize) * 4;
                    if len < 4 || cursor + (len - 4) > commit {
                        break;
                    }
                    events.push(Event { timestamp: time, data: &data[cursor..cursor + (len - 4)] });
                    cursor += len - 4;
                }
            }
        }
        events
    }

    fn read_u32(data: &[u8], at: usize) -> Option<u32> {
        data.get(at..at + 4).map(|b| u32::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_signed(bytes: &[u8]) -> i64 {
        match bytes.len() {
            4 => i32::from_le_bytes(bytes.try_into().unwrap()) as i64,
            8 => i64::from_le_bytes(bytes.try_into().unwrap()),
            _ => 0,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::trace::format::STANDARD_HEADER_PAGE;

        /// Builds a synthetic subbuffer containing one data event of
        /// `payload` bytes at `time_delta`, for round-trip testing against
        /// this module's own encoding.
        fn build_page(time_delta: u32, payload: &[u8]) -> Vec<u8> {
            let mut page = vec![0u8; TRACE_PAGE_SIZE_FOR_TEST];
            // timestamp field (unused by parse_page) left zeroed.
            let words = (payload.len() + 4 + 3) / 4; // round up to 4-byte words, header included
            let type_len = words as u32;
            let header = (type_len & 0x1f) | (time_delta << 5);
            let mut cursor = STANDARD_HEADER_PAGE.data_offset;
            page[cursor..cursor + 4].copy_from_slice(&header.to_le_bytes());
            cursor += 4;
            page[cursor..cursor + payload.len()].copy_from_slice(payload);
            cursor += payload.len();
            let commit = (cursor - STANDARD_HEADER_PAGE.data_offset) as i64;
            page[STANDARD_HEADER_PAGE.commit_offset..STANDARD_HEADER_PAGE.commit_offset + 8]
                .copy_from_slice(&commit.to_le_bytes());
            page
        }

        const TRACE_PAGE_SIZE_FOR_TEST: usize = 256;

        #[test]
        fn round_trips_one_event() {
            let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
            let page = build_page(7, &payload);
            let events = parse_page(&STANDARD_HEADER_PAGE, &page);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].timestamp, 7);
            assert_eq!(&events[0].data[..payload.len()], &payload[..]);
        }

        #[test]
        fn negative_commit_yields_no_events() {
            let mut page = vec![0u8; TRACE_PAGE_SIZE_FOR_TEST];
            page[STANDARD_HEADER_PAGE.commit_offset..STANDARD_HEADER_PAGE.commit_offset + 8]
                .copy_from_slice(&(-1i64).to_le_bytes());
            assert!(parse_page(&STANDARD_HEADER_PAGE, &page).is_empty());
        }

        #[test]
        fn padding_with_zero_delta_ends_page() {
            let mut page = vec![0u8; TRACE_PAGE_SIZE_FOR_TEST];
            let cursor = STANDARD_HEADER_PAGE.data_offset;
            // type_len = PADDING (29), time_delta = 0.
            page[cursor..cursor + 4].copy_from_slice(&29u32.to_le_bytes());
            let commit = 4i64;
            page[STANDARD_HEADER_PAGE.commit_offset..STANDARD_HEADER_PAGE.commit_offset + 8]
                .copy_from_slice(&commit.to_le_bytes());
            assert!(parse_page(&STANDARD_HEADER_PAGE, &page).is_empty());
        }
    }
}

/// An opened, non-blocking per-CPU raw trace pipe.
struct PerCpuPipe {
    cpu: u32,
    fd: RawFd,
}

fn open_percpu_pipe(tracing_dir: &Path, cpu: u32) -> Result<PerCpuPipe> {
    let path = tracing_dir.join(format!("per_cpu/cpu{cpu}/trace_pipe_raw"));
    let fd = open(&path, OFlag::O_RDONLY | OFlag::O_NONBLOCK, Mode::empty())
        .map_err(|e| CoreError::TracingUnavailable(format!("cannot open {}: {e}", path.display())))?;
    Ok(PerCpuPipe { cpu, fd })
}

/// Writes `0` to `buffer_percent`; unsupported on some older
/// kernels, so failure is non-fatal.
fn zero_buffer_percent(tracing_dir: &Path) {
    let path = tracing_dir.join("buffer_percent");
    if let Err(e) = std::fs::write(&path, b"0") {
        info!("buffer_percent not supported ({e}), continuing with kernel default");
    }
}

/// Drives every CPU's pipe and feeds [`RawTraceEvent`]s to `handler` until
/// a termination signal arrives. Returns once teardown (closing every
/// descriptor) is complete.
pub async fn run(
    tracing_dir: &Path,
    header_layout: HeaderPageLayout,
    cpu_count: u32,
    mut signals: TerminationSignals,
    mut handler: impl FnMut(RawTraceEvent) + Send + 'static,
) -> Result<()> {
    zero_buffer_percent(tracing_dir);

    let mut pipes = Vec::with_capacity(cpu_count as usize);
    for cpu in 0..cpu_count {
        match open_percpu_pipe(tracing_dir, cpu) {
            Ok(pipe) => pipes.push(pipe),
            Err(e) => warn!("cpu{cpu}: {e}, skipping"),
        }
    }
    if pipes.is_empty() {
        return Err(CoreError::TracingUnavailable("no per-CPU trace pipes could be opened".to_string()));
    }

    let (tx, mut rx) = mpsc::channel::<(u32, Vec<u8>)>(256);
    let (mode_tx, mode_rx) = watch::channel(IngestionMode::Multiplexed);
    let zero_streak = Arc::new(AtomicUsize::new(0));
    let cpu_total = pipes.len();

    let mut tasks = JoinSet::new();
    for pipe in pipes {
        let tx = tx.clone();
        let mode_rx = mode_rx.clone();
        let zero_streak = Arc::clone(&zero_streak);
        tasks.spawn(per_cpu_task(pipe, tx, mode_rx, mode_tx.clone(), zero_streak, cpu_total));
    }
    drop(tx);
    drop(mode_tx);

    loop {
        tokio::select! {
            _ = signals.recv() => {
                info!("termination signal received, shutting down ingestion");
                break;
            }
            Some((cpu, page)) = rx.recv() => {
                for event in kbuffer::parse_page(&header_layout, &page) {
                    if event.data.len() < 2 {
                        continue;
                    }
                    let event_id = u16::from_le_bytes([event.data[0], event.data[1]]);
                    handler(RawTraceEvent { cpu, event_id, timestamp: event.timestamp, payload: event.data.to_vec() });
                }
            }
            else => break,
        }
    }

    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestionMode {
    Multiplexed,
    Fallback,
}

async fn per_cpu_task(
    pipe: PerCpuPipe,
    tx: mpsc::Sender<(u32, Vec<u8>)>,
    mut mode_rx: watch::Receiver<IngestionMode>,
    mode_tx: watch::Sender<IngestionMode>,
    zero_streak: Arc<AtomicUsize>,
    cpu_total: usize,
) {
    let cpu = pipe.cpu;
    // SAFETY: `pipe.fd` was just opened by this process and is not shared.
    let file = unsafe { std::fs::File::from_raw_fd(pipe.fd) };
    let async_fd = match AsyncFd::new(file) {
        Ok(f) => f,
        Err(e) => {
            warn!("cpu{cpu}: failed to register with reactor: {e}, using fallback polling");
            let _ = mode_tx.send(IngestionMode::Fallback);
            return;
        }
    };

    loop {
        if *mode_rx.borrow() == IngestionMode::Fallback {
            match fallback_read(async_fd.get_ref()) {
                Ok(Some(page)) => {
                    if tx.send((cpu, page)).await.is_err() {
                        return;
                    }
                }
                Ok(None) => tokio::time::sleep(POLLING_TIME).await,
                Err(e) => {
                    warn!("cpu{cpu}: read error: {e}");
                    return;
                }
            }
            continue;
        }

        let mut guard = match async_fd.readable().await {
            Ok(g) => g,
            Err(e) => {
                warn!("cpu{cpu}: reactor error: {e}");
                return;
            }
        };

        let result = guard.try_io(|inner| read_one_page(inner.get_ref()));
        match result {
            Ok(Ok(Some(page))) => {
                zero_streak.store(0, Ordering::Relaxed);
                if tx.send((cpu, page)).await.is_err() {
                    return;
                }
            }
            Ok(Ok(None)) => {
                let streak = zero_streak.fetch_add(1, Ordering::Relaxed) + 1;
                if streak >= FALLBACK_DETECTION_STREAK * cpu_total {
                    warn!("poll() does not appear to gate on data; switching to fallback per-CPU polling");
                    let _ = mode_tx.send(IngestionMode::Fallback);
                }
            }
            Ok(Err(e)) => {
                warn!("cpu{cpu}: read error: {e}");
                return;
            }
            Err(_would_block) => {}
        }

        if mode_rx.has_changed().unwrap_or(false) {
            let _ = mode_rx.borrow_and_update();
        }
    }
}

fn read_one_page(file: &std::fs::File) -> io::Result<Option<Vec<u8>>> {
    use std::io::Read;
    let mut buf = vec![0u8; TRACE_PAGE_SIZE];
    match (&mut &*file).read(&mut buf) {
        Ok(0) => Ok(None),
        Ok(n) => {
            buf.truncate(n);
            Ok(Some(buf))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

fn fallback_read(file: &std::fs::File) -> io::Result<Option<Vec<u8>>> {
    read_one_page(file)
}
