//! Top-level wiring: bootstraps tracing discovery, event registration,
//! persistence, and the remediation engines, then drives the ingestion
//! loop and dispatches each decoded event to persistence, remediation,
//! triggers, and the broadcast server.
//!
//! One long-lived struct owns every subsystem, built
//! once at startup and driven by a single `run` loop until a termination
//! signal arrives.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast as broadcast_chan;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broadcast::BroadcastServer;
use crate::config::Config;
use crate::decoders::cpu_id::{self, CpuInfo, CpuType};
use crate::decoders::{aer, arm, cxl, devlink, extlog, mc, mce, memory_failure, nonstandard};
use crate::error::{CoreError, Result};
use crate::persistence::Persistence;
use crate::records::{ArmProcessorErrorInfo, CxlHeader, Record, Severity};
use crate::remediation::cpu::CpuEngine;
use crate::remediation::page::PageEngine;
use crate::remediation::row::RowEngine;
use crate::trace::discovery::{self, TraceFacility};
use crate::trace::format::{self, EventFormat};
use crate::trace::ingestion::{self, RawTraceEvent};
use crate::trace::registration::{self, EventDescriptor, RegisteredEvent, KNOWN_EVENTS};
use crate::trace::signals::TerminationSignals;
use crate::trigger;

/// Tracepoints whose exact name depends on the running kernel: older
/// kernels only expose `block_rq_complete`'s error field, newer ones
/// a dedicated `block_rq_error`. Tried in order; the first that resolves
/// a format file wins.
const DISK_ERROR_CANDIDATES: &[EventDescriptor] = &[
    EventDescriptor { group: "block", name: "block_rq_error", trigger_env: None },
    EventDescriptor { group: "block", name: "block_rq_complete", trigger_env: None },
];

/// Everything the event-dispatch path needs that doesn't change after
/// startup: the per-event format table and the host's CPU classification.
struct DecodeContext {
    formats: HashMap<u16, (&'static str, &'static str, EventFormat)>,
    cpu_type: CpuType,
    cpu_info: CpuInfo,
}

pub struct Core {
    config: Config,
    persistence: Arc<Persistence>,
    page_engine: Mutex<PageEngine>,
    row_engine: Mutex<RowEngine>,
    cpu_engine: Mutex<CpuEngine>,
    broadcast_tx: Option<broadcast_chan::Sender<Arc<Record>>>,
    broadcast_server: Mutex<Option<BroadcastServer>>,
    decode_ctx: DecodeContext,
    tracing: TraceFacility,
}

impl Core {
    /// Bootstrap sequence: discover the tracing
    /// filesystem, read and classify the host CPU, register every known
    /// event (best-effort — a missing tracepoint just means this build
    /// doesn't see that error class on this kernel/arch), and open the
    /// persistence store.
    pub fn bootstrap(config: Config) -> Result<Self> {
        let tracing = discovery::discover(Path::new("/proc/mounts"), &config.tool_name)?;
        info!("tracing facility mounted at {}", tracing.tracing_dir.display());

        let cpu_info = cpu_id::read_cpuinfo("/proc/cpuinfo")?;
        let cpu_type = cpu_id::classify(&cpu_info).unwrap_or_else(|e| {
            warn!("{e}, falling back to architectural-only MCE decoding");
            CpuType::Unknown
        });
        info!("host CPU classified as {:?} ({} family {:#x} model {:#x})", cpu_type, cpu_info.vendor_id, cpu_info.family, cpu_info.model);

        let mut formats = HashMap::new();
        for descriptor in KNOWN_EVENTS {
            match registration::register_event(&tracing.tracing_dir, *descriptor, &config.disabled_events) {
                Ok(RegisteredEvent { descriptor, format }) => {
                    formats.insert(format.id as u16, (descriptor.group, descriptor.name, format));
                }
                Err(CoreError::EventDisabled { group, name }) => {
                    info!("{group}:{name} disabled by configuration");
                }
                Err(e) => {
                    warn!("skipping event {}: {e}", descriptor.name);
                }
            }
        }
        for descriptor in DISK_ERROR_CANDIDATES {
            match registration::register_event(&tracing.tracing_dir, *descriptor, &config.disabled_events) {
                Ok(RegisteredEvent { descriptor, format }) => {
                    formats.insert(format.id as u16, (descriptor.group, descriptor.name, format));
                    break;
                }
                Err(_) => continue,
            }
        }
        if formats.is_empty() {
            return Err(CoreError::NoEventsAvailable);
        }

        let db_path = Path::new("/var/lib").join(&config.tool_name).join("ras.db");
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let persistence = Arc::new(Persistence::new(&db_path));
        persistence
            .open()
            .map_err(|e| CoreError::PersistFailed { table: "(open)", source: anyhow::Error::from(e) })?;

        let (broadcast_tx, broadcast_server) = match config.broadcast_socket.clone() {
            Some(name) => {
                let server = BroadcastServer::new(name);
                let tx = server.sender();
                (Some(tx), Some(server))
            }
            None => (None, None),
        };

        Ok(Core {
            page_engine: Mutex::new(PageEngine::new(config.page_action, config.page_threshold, config.page_cycle.as_secs())),
            row_engine: Mutex::new(RowEngine::new(config.row_action, config.row_threshold, config.row_cycle.as_secs())),
            cpu_engine: Mutex::new(CpuEngine::new(config.cpu_action, config.cpu_threshold, config.cpu_cycle.as_secs())),
            decode_ctx: DecodeContext { formats, cpu_type, cpu_info },
            broadcast_tx,
            broadcast_server: Mutex::new(broadcast_server),
            persistence,
            tracing,
            config,
        })
    }

    /// Runs the daemon until a termination signal arrives,
    /// then tears down cleanly: disables every event, stops the broadcast
    /// server, and releases the persistence store.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let cancel = CancellationToken::new();

        if let Some(server) = self.broadcast_server.lock().unwrap().take() {
            let server_cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run(server_cancel).await {
                    warn!("broadcast server exited: {e}");
                }
            });
        }

        let signals = TerminationSignals::install()?;
        let header_layout = format::parse_header_page(&String::from_utf8_lossy(&self.tracing.header_page));
        let cpu_count = num_cpus();
        let tracing_dir = self.tracing.tracing_dir.clone();

        let this = Arc::clone(&self);
        let result = ingestion::run(&tracing_dir, header_layout, cpu_count, signals, move |event| {
            this.handle_event(event);
        })
        .await;

        registration::disable_all(&self.tracing.tracing_dir);
        cancel.cancel();
        self.persistence.close();

        result
    }

    /// Per-event dispatch: decode,
    /// persist, feed the remediation engines, fire triggers, and publish
    /// to the broadcast server. A decode failure is logged and the event
    /// dropped — one malformed record must never take the daemon down.
    fn handle_event(&self, event: RawTraceEvent) {
        let Some((group, name, format)) = self.decode_ctx.formats.get(&event.event_id) else {
            return;
        };
        let timestamp = render_timestamp(&self.tracing, event.timestamp);
        let now = wall_clock_secs();

        let decoded = match decode_event(group, name, format, &event.payload, timestamp, self.decode_ctx.cpu_type, &self.decode_ctx.cpu_info.vendor_id) {
            Some(d) => d,
            None => return,
        };

        self.persistence.insert(&decoded.record);

        match &decoded.record {
            Record::MemoryControllerError(r) => {
                self.page_engine.lock().unwrap().record_page_error(r.address, r.error_count, now);
                self.row_engine.lock().unwrap().record_row_error(&r.driver_detail, r.error_count, r.address, now);
                trigger::dispatch_mc_event(self.config.mc_ce_trigger.as_deref(), self.config.mc_ue_trigger.as_deref(), r);
            }
            Record::ArmProcessorError(r) => {
                let sev = crate::decoders::arm::GhesSeverity::from_raw(r.sev);
                if matches!(sev, crate::decoders::arm::GhesSeverity::Corrected | crate::decoders::arm::GhesSeverity::Recoverable) {
                    self.cpu_engine.lock().unwrap().record_cpu_error(event.cpu, &r.processor_error_info, sev, now);
                }
            }
            Record::CxlDram(r) if r.is_firmware_threshold_breach() => {
                self.page_engine.lock().unwrap().ras_hw_threshold_pageoffline(r.dpa, now);
            }
            Record::MemoryFailure(r) => {
                trigger::dispatch_memory_failure(self.config.memory_failure_trigger.as_deref(), r);
            }
            _ => {}
        }

        if let Some(tx) = &self.broadcast_tx {
            let _ = tx.send(Arc::new(decoded.record));
        }
    }
}

fn num_cpus() -> u32 {
    std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1)
}

fn wall_clock_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Translates a ring-buffer-relative timestamp (nanoseconds) to a
/// human-readable wall-clock string: when the
/// kernel's `trace_clock` is `uptime`, add the `now - uptime` offset
/// measured at discovery time before rendering; otherwise the raw value
/// is already wall-clock-relative.
fn render_timestamp(facility: &TraceFacility, raw_ns: u64) -> String {
    let secs = raw_ns as f64 / 1_000_000_000.0;
    let epoch_secs = match facility.uptime_diff {
        Some(diff) => secs + diff,
        None => secs,
    };
    chrono::DateTime::from_timestamp(epoch_secs as i64, 0)
        .unwrap_or(chrono::DateTime::UNIX_EPOCH)
        .to_rfc3339()
}

struct Decoded {
    record: Record,
}

/// One dispatch table over every tracepoint this build can decode. Raw
/// byte extraction uses the kernel's own `format` file offsets (already
/// parsed into `format`), so field order/size drift across kernel
/// versions is absorbed without recompiling.
fn decode_event(
    group: &str,
    name: &str,
    format: &EventFormat,
    payload: &[u8],
    timestamp: String,
    cpu_type: CpuType,
    cpuvendor: &str,
) -> Option<Decoded> {
    let record = match (group, name) {
        ("ras", "mc_event") => decode_mc_event(format, payload, timestamp),
        ("ras", "aer_event") => decode_aer_event(format, payload, timestamp),
        ("mce", "mce_record") => decode_mce_record(format, payload, timestamp, cpu_type, cpuvendor),
        ("ras", "extlog_mem_event") => decode_extlog_event(format, payload, timestamp),
        ("ras", "non_standard_event") => decode_non_standard_event(format, payload, timestamp),
        ("ras", "arm_event") => decode_arm_event(format, payload, timestamp),
        ("devlink", "devlink_health_report") => decode_devlink_event(format, payload, timestamp),
        ("ras", "memory_failure_event") => decode_memory_failure_event(format, payload, timestamp),
        ("cxl", "cxl_poison") => decode_cxl_poison(format, payload, timestamp),
        ("cxl", "cxl_aer_uncorrectable_error") => decode_cxl_aer_ue(format, payload, timestamp),
        ("cxl", "cxl_aer_correctable_error") => decode_cxl_aer_ce(format, payload, timestamp),
        ("cxl", "cxl_overflow") => decode_cxl_overflow(format, payload, timestamp),
        ("cxl", "cxl_generic_event") => decode_cxl_generic(format, payload, timestamp),
        ("cxl", "cxl_general_media") => decode_cxl_general_media(format, payload, timestamp),
        ("cxl", "cxl_dram") => decode_cxl_dram(format, payload, timestamp),
        ("cxl", "cxl_memory_module") => decode_cxl_memory_module(format, payload, timestamp),
        ("block", "block_rq_error") | ("block", "block_rq_complete") => decode_disk_event(format, payload, timestamp),
        _ => None,
    }?;
    Some(Decoded { record })
}

// ---- generic field extraction -------------------------------------------------

fn field_bytes<'a>(payload: &'a [u8], format: &EventFormat, name: &str) -> &'a [u8] {
    match format.field(name) {
        Some(f) => payload.get(f.offset..f.offset + f.size).unwrap_or(&[]),
        None => &[],
    }
}

fn read_u(payload: &[u8], format: &EventFormat, name: &str) -> u64 {
    let bytes = field_bytes(payload, format, name);
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

fn read_i(payload: &[u8], format: &EventFormat, name: &str) -> i64 {
    let bytes = field_bytes(payload, format, name);
    match bytes.len() {
        1 => bytes[0] as i8 as i64,
        2 => i16::from_le_bytes(bytes.try_into().unwrap()) as i64,
        4 => i32::from_le_bytes(bytes.try_into().unwrap()) as i64,
        8 => i64::from_le_bytes(bytes.try_into().unwrap()),
        _ => 0,
    }
}

/// Reads a text field: `__data_loc`/`char *` fields encode a 16-bit byte
/// offset and 16-bit length packed into a `u32` pointing elsewhere in the
/// record (ftrace's dynamic-string convention); fixed `char[N]` fields are
/// read in place and trimmed at the first NUL.
fn read_str(payload: &[u8], format: &EventFormat, name: &str) -> String {
    let Some(f) = format.field(name) else { return String::new() };
    if f.is_array && f.size == 4 {
        let raw = read_u(payload, format, name) as u32;
        let off = (raw & 0xffff) as usize;
        let len = ((raw >> 16) & 0xffff) as usize;
        let bytes = payload.get(off..off + len).unwrap_or(&[]);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).to_string()
    } else {
        let bytes = field_bytes(payload, format, name);
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).to_string()
    }
}

fn read_bytes(payload: &[u8], format: &EventFormat, name: &str) -> Vec<u8> {
    let Some(f) = format.field(name) else { return Vec::new() };
    if f.is_array && f.size == 4 {
        let raw = read_u(payload, format, name) as u32;
        let off = (raw & 0xffff) as usize;
        let len = ((raw >> 16) & 0xffff) as usize;
        payload.get(off..off + len).unwrap_or(&[]).to_vec()
    } else {
        field_bytes(payload, format, name).to_vec()
    }
}

fn read_fixed16(payload: &[u8], format: &EventFormat, name: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let bytes = field_bytes(payload, format, name);
    let n = bytes.len().min(16);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

// ---- per-event decode -----------------------------------------------------

fn decode_mc_event(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let error_type = match read_u(payload, format, "error_type") {
        0 => mc::RawMcErrorType::Corrected,
        1 => mc::RawMcErrorType::Uncorrected,
        2 => mc::RawMcErrorType::Deferred,
        3 => mc::RawMcErrorType::Fatal,
        _ => mc::RawMcErrorType::Info,
    };
    let event = mc::RawMcEvent {
        error_type,
        error_count: read_u(payload, format, "error_count") as u32,
        msg: read_str(payload, format, "msg"),
        label: read_str(payload, format, "label"),
        mc_index: read_u(payload, format, "mc_index") as u32,
        top_layer: read_i(payload, format, "top_layer") as i32,
        middle_layer: read_i(payload, format, "middle_layer") as i32,
        lower_layer: read_i(payload, format, "lower_layer") as i32,
        address: read_u(payload, format, "address"),
        grain_bits: read_u(payload, format, "grain_bits"),
        syndrome: read_u(payload, format, "syndrome"),
        driver_detail: read_str(payload, format, "driver_detail"),
    };
    let (record, _msg) = mc::decode(event, timestamp);
    Some(Record::MemoryControllerError(record))
}

fn decode_aer_event(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let severity = match read_u(payload, format, "severity") {
        0 => aer::AerSeverity::Corrected,
        2 => aer::AerSeverity::UncorrectedFatal,
        _ => aer::AerSeverity::UncorrectedNonFatal,
    };
    let tlp_header = format.field("tlp_header").map(|f| {
        let bytes = payload.get(f.offset..f.offset + 16.min(f.size.max(16))).unwrap_or(&[]);
        let mut words = [0u32; 4];
        for (i, w) in words.iter_mut().enumerate() {
            let start = i * 4;
            if start + 4 <= bytes.len() {
                *w = u32::from_le_bytes(bytes[start..start + 4].try_into().unwrap());
            }
        }
        words
    });
    let event = aer::AerEvent { dev_name: read_str(payload, format, "dev_name"), severity, status: read_u(payload, format, "status") as u32, tlp_header };
    let (record, _msg) = aer::decode(event, timestamp);
    Some(Record::PciAer(record))
}

fn decode_mce_record(format: &EventFormat, payload: &[u8], timestamp: String, cpu_type: CpuType, cpuvendor: &str) -> Option<Record> {
    let event = mce::MceEvent {
        mcgcap: read_u(payload, format, "mcgcap"),
        mcgstatus: read_u(payload, format, "mcgstatus"),
        status: read_u(payload, format, "status"),
        addr: read_u(payload, format, "addr"),
        misc: read_u(payload, format, "misc"),
        ip: read_u(payload, format, "ip"),
        tsc: read_u(payload, format, "tsc"),
        walltime: if format.field("walltime").is_some() { read_u(payload, format, "walltime") } else { read_u(payload, format, "time") },
        cpu: read_u(payload, format, "cpu") as u32,
        cpuid: read_u(payload, format, "cpuid") as u32,
        apicid: read_u(payload, format, "apicid") as u32,
        socketid: read_u(payload, format, "socketid") as u32,
        bank: read_u(payload, format, "bank") as u32,
        microcode: read_u(payload, format, "microcode") as u32,
    };
    let mut record = crate::records::MachineCheck {
        timestamp,
        mcgcap: event.mcgcap,
        mcgstatus: event.mcgstatus,
        status: event.status,
        addr: event.addr,
        misc: event.misc,
        ip: event.ip,
        tsc: event.tsc,
        walltime: event.walltime,
        cpu: event.cpu,
        cpuid: event.cpuid,
        apicid: event.apicid,
        socketid: event.socketid,
        bank: event.bank,
        cpuvendor: cpuvendor.to_string(),
        microcode: event.microcode,
        bank_name: String::new(),
        error_msg: String::new(),
        mcgstatus_msg: String::new(),
        mcistatus_msg: String::new(),
        mcastatus_msg: String::new(),
        location_msg: String::new(),
        user_action: String::new(),
    };
    mce::decode(cpu_type, &event, cpuvendor, &mut record);
    Some(Record::MachineCheck(record))
}

fn decode_extlog_event(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let event = extlog::RawExtlogEvent {
        etype: read_u(payload, format, "etype") as u32,
        error_seq: read_u(payload, format, "error_seq"),
        severity: read_u(payload, format, "severity") as u32,
        address: read_u(payload, format, "address"),
        pa_mask_lsb: read_u(payload, format, "pa_mask_lsb") as u8,
        cper_data: read_bytes(payload, format, "cper_data"),
        cper_detail: extlog::CperMemErrCompact::default(),
        fru_text: read_str(payload, format, "fru_text"),
        fru_id: read_fixed16(payload, format, "fru_id"),
    };
    let (record, _msg) = extlog::decode(event, timestamp);
    Some(Record::ExtLogMemory(record))
}

fn decode_non_standard_event(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let sec_type = read_str(payload, format, "sec_type");
    let severity = match read_u(payload, format, "severity") {
        0 => Severity::Corrected,
        1 => Severity::Uncorrected,
        2 => Severity::Deferred,
        3 => Severity::Fatal,
        _ => Severity::Info,
    };
    let event = nonstandard::RawNonStandardEvent {
        sec_type,
        fru_id: read_str(payload, format, "fru_id"),
        fru_text: read_str(payload, format, "fru_text"),
        severity,
        raw: read_bytes(payload, format, "error"),
    };
    let (record, _msg) = nonstandard::decode(event, timestamp);
    Some(Record::NonStandardCper(record))
}

/// Size in bytes of one wire-encoded `ArmProcessorErrorInfo` entry (spec
/// §4.B ARM decoder): `version`, `length`, `validation_bits`(2),
/// `kind`, `multiple_error`(2), `flags`, then three 8-byte-aligned u64s.
const ARM_PEI_ENTRY_SIZE: usize = 32;

fn parse_pei_list(bytes: &[u8]) -> Vec<ArmProcessorErrorInfo> {
    bytes
        .chunks_exact(ARM_PEI_ENTRY_SIZE)
        .map(|c| ArmProcessorErrorInfo {
            version: c[0],
            length: c[1],
            validation_bits: u16::from_le_bytes([c[2], c[3]]),
            kind: c[4],
            multiple_error: u16::from_le_bytes([c[5], c[6]]),
            flags: c[7],
            error_info: u64::from_le_bytes(c[8..16].try_into().unwrap()),
            virt_fault_addr: u64::from_le_bytes(c[16..24].try_into().unwrap()),
            physical_fault_addr: u64::from_le_bytes(c[24..32].try_into().unwrap()),
        })
        .collect()
}

fn decode_arm_event(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let pei_bytes = read_bytes(payload, format, "pei");
    let mut record = crate::records::ArmProcessorError {
        timestamp,
        error_count: 1,
        sev: read_u(payload, format, "sev") as u32,
        affinity: read_u(payload, format, "affinity") as u8,
        mpidr: read_u(payload, format, "mpidr"),
        midr: read_u(payload, format, "midr"),
        running_state: read_u(payload, format, "running_state") as u32,
        psci_state: read_u(payload, format, "psci_state") as u32,
        processor_error_info: parse_pei_list(&pei_bytes),
        context_info: read_bytes(payload, format, "context_info"),
        vendor_info: read_bytes(payload, format, "vendor_info"),
        error_types: String::new(),
        error_flags: String::new(),
        error_info_text: String::new(),
        virt_fault_addr_text: String::new(),
        physical_fault_addr_text: String::new(),
    };
    arm::decode(&mut record);
    Some(Record::ArmProcessorError(record))
}

fn decode_devlink_event(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let event = devlink::RawDevlinkEvent {
        bus_name: read_str(payload, format, "bus_name"),
        dev_name: read_str(payload, format, "dev_name"),
        driver_name: read_str(payload, format, "driver_name"),
        reporter_name: read_str(payload, format, "reporter_name"),
        message: read_str(payload, format, "msg"),
    };
    Some(Record::DevlinkHealthReport(devlink::decode(event, timestamp)))
}

fn decode_memory_failure_event(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let event = memory_failure::RawMemoryFailureEvent {
        pfn: read_u(payload, format, "pfn"),
        page_type: read_u(payload, format, "type") as u32,
        result: read_u(payload, format, "result") as u32,
    };
    Some(Record::MemoryFailure(memory_failure::decode(event, timestamp)))
}

fn decode_disk_event(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    use crate::decoders::disk;
    let error = read_i(payload, format, "error") as i32;
    if error == 0 {
        return None;
    }
    let event = disk::RawDiskErrorEvent {
        dev: read_u(payload, format, "dev") as u32,
        sector: read_u(payload, format, "sector"),
        nr_sector: read_u(payload, format, "nr_sector") as u32,
        error,
        rwbs: read_str(payload, format, "rwbs"),
        command: read_str(payload, format, "comm"),
    };
    Some(Record::DiskError(disk::decode(event, timestamp)))
}

fn decode_cxl_header(format: &EventFormat, payload: &[u8]) -> CxlHeader {
    let raw = cxl::RawHeader {
        memdev: read_str(payload, format, "memdev"),
        host: read_str(payload, format, "host"),
        serial: read_u(payload, format, "serial"),
        log_type: read_u(payload, format, "log_type") as u32,
        hdr_uuid: read_fixed16(payload, format, "hdr_uuid"),
        hdr_flags: read_u(payload, format, "hdr_flags") as u32,
        hdr_handle: read_u(payload, format, "hdr_handle") as u32,
        hdr_related_handle: read_u(payload, format, "hdr_related_handle") as u32,
        hdr_timestamp_ns: read_u(payload, format, "hdr_timestamp"),
        hdr_length: read_u(payload, format, "hdr_length") as u16,
        hdr_maint_op_class: read_u(payload, format, "hdr_maint_op_class") as u8,
    };
    cxl::decode_common_header(&raw)
}

fn decode_cxl_poison(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let trace_type = match read_u(payload, format, "trace_type") {
        1 => cxl::PoisonTraceType::Inject,
        2 => cxl::PoisonTraceType::Clear,
        _ => cxl::PoisonTraceType::List,
    };
    let raw = cxl::RawPoisonEvent {
        memdev: read_str(payload, format, "memdev"),
        host: read_str(payload, format, "host"),
        serial: read_u(payload, format, "serial"),
        trace_type,
        region: read_str(payload, format, "region"),
        region_uuid: read_str(payload, format, "uuid"),
        hpa: read_u(payload, format, "hpa"),
        dpa: read_u(payload, format, "dpa"),
        dpa_length: read_u(payload, format, "dpa_length") as u32,
        source: read_u(payload, format, "source") as u8,
        flags: read_u(payload, format, "flags") as u8,
        overflow_ts_ns: read_u(payload, format, "overflow_ts"),
    };
    Some(Record::CxlPoison(cxl::decode_poison(raw, timestamp)))
}

fn decode_cxl_aer_ue(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let header_log: Vec<u32> = read_bytes(payload, format, "header_log")
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect();
    let (record, _msg) = cxl::decode_aer_ue(
        read_str(payload, format, "memdev"),
        read_str(payload, format, "host"),
        read_u(payload, format, "serial"),
        read_u(payload, format, "error_status") as u32,
        read_u(payload, format, "first_error") as u32,
        header_log,
        timestamp,
    );
    Some(Record::CxlAerUe(record))
}

fn decode_cxl_aer_ce(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let (record, _msg) = cxl::decode_aer_ce(
        read_str(payload, format, "memdev"),
        read_str(payload, format, "host"),
        read_u(payload, format, "serial"),
        read_u(payload, format, "error_status") as u32,
        timestamp,
    );
    Some(Record::CxlAerCe(record))
}

fn decode_cxl_overflow(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let record = cxl::decode_overflow(
        read_str(payload, format, "memdev"),
        read_str(payload, format, "host"),
        read_u(payload, format, "serial"),
        read_u(payload, format, "log_type") as u32,
        read_u(payload, format, "count") as u16,
        read_u(payload, format, "first_ts"),
        read_u(payload, format, "last_ts"),
        timestamp,
    );
    Some(Record::CxlOverflow(record))
}

fn decode_cxl_generic(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let header = decode_cxl_header(format, payload);
    let record = cxl::decode_generic(header, read_str(payload, format, "uuid"), read_bytes(payload, format, "data"), timestamp);
    Some(Record::CxlGeneric(record))
}

fn decode_cxl_general_media(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let header = decode_cxl_header(format, payload);
    let (record, _msg) = cxl::decode_general_media(
        header,
        read_u(payload, format, "dpa"),
        read_u(payload, format, "dpa_flags") as u8,
        read_u(payload, format, "descriptor") as u8,
        read_u(payload, format, "type") as u8,
        read_u(payload, format, "transaction_type") as u8,
        read_u(payload, format, "validity_flags") as u16,
        read_u(payload, format, "channel") as u8,
        read_u(payload, format, "rank") as u8,
        read_u(payload, format, "device") as u32,
        read_bytes(payload, format, "comp_id"),
        timestamp,
    );
    Some(Record::CxlGeneralMedia(record))
}

fn decode_cxl_dram(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let header = decode_cxl_header(format, payload);
    let (record, _msg) = cxl::decode_dram(
        header,
        read_u(payload, format, "dpa"),
        read_u(payload, format, "hpa"),
        read_u(payload, format, "descriptor") as u8,
        read_u(payload, format, "type") as u8,
        read_u(payload, format, "transaction_type") as u8,
        read_u(payload, format, "validity_flags") as u16,
        read_u(payload, format, "channel") as u16,
        read_u(payload, format, "rank") as u8,
        read_u(payload, format, "nibble_mask") as u32,
        read_u(payload, format, "bank_group") as u8,
        read_u(payload, format, "bank") as u8,
        read_u(payload, format, "row") as u32,
        read_u(payload, format, "column") as u16,
        timestamp,
    );
    Some(Record::CxlDram(record))
}

fn decode_cxl_memory_module(format: &EventFormat, payload: &[u8], timestamp: String) -> Option<Record> {
    let header = decode_cxl_header(format, payload);
    let (record, _msg) = cxl::decode_memory_module(
        header,
        read_u(payload, format, "event_type") as u8,
        read_u(payload, format, "health_status") as u8,
        read_u(payload, format, "media_status") as u8,
        read_u(payload, format, "life_used") as u8,
        read_i(payload, format, "temperature") as i16,
        read_u(payload, format, "dirty_shutdown_count") as u32,
        read_u(payload, format, "corrected_volatile_error_count") as u32,
        read_u(payload, format, "corrected_persistent_error_count") as u32,
        timestamp,
    );
    Some(Record::CxlMemoryModule(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A format with only a subset of fields must not panic; missing
    /// fields read as zero/empty rather than failing the whole event.
    #[test]
    fn decode_mc_event_tolerates_missing_fields() {
        let format = crate::trace::format::parse_format(
            "name: mc_event\nID: 1\nformat:\n\tfield:int error_count;\toffset:0;\tsize:4;\tsigned:1;\n",
        )
        .unwrap();
        let payload = vec![0u8; 16];
        let record = decode_mc_event(&format, &payload, "now".to_string()).unwrap();
        assert!(matches!(record, Record::MemoryControllerError(_)));
    }

    #[test]
    fn parse_pei_list_rejects_partial_trailing_entry() {
        let bytes = vec![0u8; ARM_PEI_ENTRY_SIZE + 5];
        assert_eq!(parse_pei_list(&bytes).len(), 1);
    }
}
