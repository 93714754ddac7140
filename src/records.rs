//! Event record kinds.
//!
//! A record is produced exactly once by its decoder from one kernel trace
//! event and is immutable thereafter; these are plain data, never mutated
//! after construction. `serde::Serialize` backs both the persistence façade
//! and the broadcast server's textual rendering.

use serde::Serialize;

/// Severity classes shared by MCA and CPER-derived records (GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Corrected,
    Uncorrected,
    Deferred,
    Fatal,
    Info,
}

/// A four-word PCIe TLP header, when the AER event carried a valid one.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TlpHeader(pub [u32; 4]);

#[derive(Debug, Clone, Serialize)]
pub struct MemoryControllerError {
    pub timestamp: String,
    pub error_count: u32,
    pub severity: Severity,
    pub message: String,
    pub label: String,
    pub mc_index: u32,
    pub top_layer: i32,
    pub middle_layer: i32,
    pub lower_layer: i32,
    pub address: u64,
    pub grain: u64,
    pub syndrome: u64,
    pub driver_detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PciAer {
    pub timestamp: String,
    /// `"segment:bus:device.function"`.
    pub dev_name: String,
    pub severity: Severity,
    pub status: u32,
    pub tlp_header: Option<TlpHeader>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineCheck {
    pub timestamp: String,
    pub mcgcap: u64,
    pub mcgstatus: u64,
    pub status: u64,
    pub addr: u64,
    pub misc: u64,
    pub ip: u64,
    pub tsc: u64,
    pub walltime: u64,
    pub cpu: u32,
    pub cpuid: u32,
    pub apicid: u32,
    pub socketid: u32,
    pub bank: u32,
    pub cpuvendor: String,
    pub microcode: u32,

    pub bank_name: String,
    pub error_msg: String,
    pub mcgstatus_msg: String,
    pub mcistatus_msg: String,
    pub mcastatus_msg: String,
    pub location_msg: String,
    pub user_action: String,
}

/// One Processor Error Information entry, decoded by the ARM decoder.
#[derive(Debug, Clone, Serialize)]
pub struct ArmProcessorErrorInfo {
    pub version: u8,
    pub length: u8,
    pub validation_bits: u16,
    pub kind: u8,
    pub multiple_error: u16,
    pub flags: u8,
    pub error_info: u64,
    pub virt_fault_addr: u64,
    pub physical_fault_addr: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArmProcessorError {
    pub timestamp: String,
    pub error_count: u32,
    /// Raw `GHES_SEV_*` value from the tracepoint's `sev` field (0=no
    /// error, 1=corrected, 2=recoverable, 3=panic); see
    /// [`crate::decoders::arm::GhesSeverity`].
    pub sev: u32,
    pub affinity: u8,
    pub mpidr: u64,
    pub midr: u64,
    pub running_state: u32,
    pub psci_state: u32,

    pub processor_error_info: Vec<ArmProcessorErrorInfo>,
    pub context_info: Vec<u8>,
    pub vendor_info: Vec<u8>,

    pub error_types: String,
    pub error_flags: String,
    pub error_info_text: String,
    pub virt_fault_addr_text: String,
    pub physical_fault_addr_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtLogMemory {
    pub timestamp: String,
    pub error_seq: u64,
    pub etype: u32,
    pub severity: Severity,
    pub address: u64,
    pub address_mask_lsb: u8,
    pub cper_data: Vec<u8>,
    pub fru_id: String,
    pub fru_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NonStandardCper {
    pub timestamp: String,
    pub sec_type: String,
    pub fru_id: String,
    pub fru_text: String,
    pub severity: Severity,
    pub error: Vec<u8>,
}

/// Fields common to all eight CXL event kinds.
#[derive(Debug, Clone, Serialize)]
pub struct CxlHeader {
    pub memdev: String,
    pub host: String,
    pub serial: u64,
    pub log_type: String,
    pub record_uuid: String,
    pub hdr_flags: u32,
    pub handle: u32,
    pub related_handle: u32,
    /// Nanoseconds since Unix epoch, rendered separately from the
    /// ingestion timestamp.
    pub hdr_timestamp_ns: u64,
    pub length: u16,
    pub maint_op_class: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct CxlPoison {
    pub timestamp: String,
    pub header: CxlHeader,
    pub dpa: u64,
    pub dpa_length: u32,
    pub source: String,
    pub trans_type: u8,
    pub channel: u8,
    pub rank: u8,
    pub device: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CxlAerUe {
    pub timestamp: String,
    pub header: CxlHeader,
    pub error_status: u32,
    pub first_error: u32,
    pub header_log: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CxlAerCe {
    pub timestamp: String,
    pub header: CxlHeader,
    pub error_status: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CxlOverflow {
    pub timestamp: String,
    pub header: CxlHeader,
    pub first_overflow_ts_ns: u64,
    pub last_overflow_ts_ns: u64,
    pub overflow_count: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct CxlGeneric {
    pub timestamp: String,
    pub header: CxlHeader,
    pub event_uuid: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CxlGeneralMedia {
    pub timestamp: String,
    pub header: CxlHeader,
    pub dpa: u64,
    pub descriptor: u8,
    pub error_type: u8,
    pub transaction_type: u8,
    pub channel: u8,
    pub rank: u8,
    pub device: u32,
    pub component_id: Vec<u8>,
    pub validity_flags: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct CxlDram {
    pub timestamp: String,
    pub header: CxlHeader,
    pub dpa: u64,
    pub hpa: u64,
    pub descriptor: u8,
    pub error_type: u8,
    pub transaction_type: u8,
    pub channel: u16,
    pub rank: u8,
    pub nibble_mask: u32,
    pub bank_group: u8,
    pub bank: u8,
    pub row: u32,
    pub column: u16,
    pub validity_flags: u16,
}

impl CxlDram {
    /// `THRESHOLD_EVENT` bit set and `UNCORRECTABLE_EVENT` bit clear in
    /// `descriptor` — the trigger for
    /// [`crate::remediation::page::PageEngine::ras_hw_threshold_pageoffline`].
    pub const THRESHOLD_EVENT: u8 = 0x02;
    pub const UNCORRECTABLE_EVENT: u8 = 0x01;

    pub fn is_firmware_threshold_breach(&self) -> bool {
        self.descriptor & Self::THRESHOLD_EVENT != 0 && self.descriptor & Self::UNCORRECTABLE_EVENT == 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CxlMemoryModule {
    pub timestamp: String,
    pub header: CxlHeader,
    pub device_event_type: u8,
    pub health_status: u8,
    pub media_status: u8,
    pub additional_status: u8,
    pub life_used: u8,
    pub temperature: i16,
    pub dirty_shutdown_count: u32,
    pub corrected_volatile_error_count: u32,
    pub corrected_persistent_error_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskError {
    pub timestamp: String,
    /// `"major:minor"`.
    pub dev: String,
    pub sector: u64,
    pub nr_sector: u32,
    pub error: String,
    pub rwbs: String,
    pub command: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryFailure {
    pub timestamp: String,
    pub pfn: u64,
    pub page_type: String,
    pub action_result: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DevlinkHealthReport {
    pub timestamp: String,
    pub bus_name: String,
    pub dev_name: String,
    pub driver_name: String,
    pub reporter_name: String,
    pub message: String,
}

/// Every record kind the core can produce, for code paths (persistence,
/// broadcast, triggers) that dispatch generically over "the next decoded
/// event" rather than over a specific decoder's output type.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    MemoryControllerError(MemoryControllerError),
    PciAer(PciAer),
    MachineCheck(MachineCheck),
    ArmProcessorError(ArmProcessorError),
    ExtLogMemory(ExtLogMemory),
    NonStandardCper(NonStandardCper),
    CxlPoison(CxlPoison),
    CxlAerUe(CxlAerUe),
    CxlAerCe(CxlAerCe),
    CxlOverflow(CxlOverflow),
    CxlGeneric(CxlGeneric),
    CxlGeneralMedia(CxlGeneralMedia),
    CxlDram(CxlDram),
    CxlMemoryModule(CxlMemoryModule),
    DiskError(DiskError),
    MemoryFailure(MemoryFailure),
    DevlinkHealthReport(DevlinkHealthReport),
}

impl Record {
    /// Stable table name used by the persistence façade.
    pub fn table_name(&self) -> &'static str {
        match self {
            Record::MemoryControllerError(_) => "mc_event",
            Record::PciAer(_) => "aer_event",
            Record::MachineCheck(_) => "mce_record",
            Record::ArmProcessorError(_) => "arm_event",
            Record::ExtLogMemory(_) => "extlog_event",
            Record::NonStandardCper(_) => "non_standard_event",
            Record::CxlPoison(_) => "cxl_poison_event",
            Record::CxlAerUe(_) => "cxl_aer_ue_event",
            Record::CxlAerCe(_) => "cxl_aer_ce_event",
            Record::CxlOverflow(_) => "cxl_overflow_event",
            Record::CxlGeneric(_) => "cxl_generic_event",
            Record::CxlGeneralMedia(_) => "cxl_general_media_event",
            Record::CxlDram(_) => "cxl_dram_event",
            Record::CxlMemoryModule(_) => "cxl_memory_module_event",
            Record::DiskError(_) => "disk_errors",
            Record::MemoryFailure(_) => "memory_failure_event",
            Record::DevlinkHealthReport(_) => "devlink_event",
        }
    }
}
