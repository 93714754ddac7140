//! CXL event decoders, ported from `original_source/ras-cxl-handler.c`.
//!
//! CXL rev 3.0 section 8.2.9 defines eight trace-visible record kinds; all
//! but the poison-list and AER events share the Common Event Record header
//! decoded once by [`decode_common_header`].

use crate::records::{
    CxlAerCe, CxlAerUe, CxlDram, CxlGeneralMedia, CxlGeneric, CxlHeader, CxlMemoryModule,
    CxlOverflow, CxlPoison,
};

const HDR_FLAG_PERMANENT: u32 = 1 << 2;
const HDR_FLAG_MAINT_NEEDED: u32 = 1 << 3;
const HDR_FLAG_PERF_DEGRADED: u32 = 1 << 4;
const HDR_FLAG_HW_REPLACE: u32 = 1 << 5;

const HDR_FLAGS: &[(u32, &str)] = &[
    (HDR_FLAG_PERMANENT, "PERMANENT_CONDITION"),
    (HDR_FLAG_MAINT_NEEDED, "MAINTENANCE_NEEDED"),
    (HDR_FLAG_PERF_DEGRADED, "PERFORMANCE_DEGRADED"),
    (HDR_FLAG_HW_REPLACE, "HARDWARE_REPLACEMENT_NEEDED"),
];

fn decode_flags(flags: u32, table: &[(u32, &str)]) -> String {
    table.iter().filter(|(bit, _)| flags & bit != 0).map(|(_, name)| format!("'{name}' ")).collect()
}

/// CXL rev 3.0 section 8.2.9.2.2, Table 8-49.
pub fn log_type_str(log_type: u32) -> &'static str {
    match log_type {
        0x00 => "Informational",
        0x01 => "Warning",
        0x02 => "Failure",
        0x03 => "Fatal",
        _ => "Unknown",
    }
}

/// Raw fields of the Common Event Record header as surfaced by the kernel
/// tracepoints, before the `hdr_uuid` bytes are rendered as text.
pub struct RawHeader {
    pub memdev: String,
    pub host: String,
    pub serial: u64,
    pub log_type: u32,
    pub hdr_uuid: [u8; 16],
    pub hdr_flags: u32,
    pub hdr_handle: u32,
    pub hdr_related_handle: u32,
    pub hdr_timestamp_ns: u64,
    pub hdr_length: u16,
    pub hdr_maint_op_class: u8,
}

fn uuid_be(bytes: &[u8; 16]) -> String {
    let order = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];
    let mut s = String::with_capacity(36);
    for (i, &idx) in order.iter().enumerate() {
        s.push_str(&format!("{:02x}", bytes[idx]));
        if matches!(i, 3 | 5 | 7 | 9) {
            s.push('-');
        }
    }
    s
}

pub fn decode_common_header(raw: &RawHeader) -> CxlHeader {
    CxlHeader {
        memdev: raw.memdev.clone(),
        host: raw.host.clone(),
        serial: raw.serial,
        log_type: log_type_str(raw.log_type).to_string(),
        record_uuid: uuid_be(&raw.hdr_uuid),
        hdr_flags: raw.hdr_flags,
        handle: raw.hdr_handle,
        related_handle: raw.hdr_related_handle,
        hdr_timestamp_ns: raw.hdr_timestamp_ns,
        length: raw.hdr_length,
        maint_op_class: raw.hdr_maint_op_class,
    }
}

const POISON_FLAG_OVERFLOW: u8 = 1 << 1;

#[derive(Debug, Clone, Copy)]
pub enum PoisonTraceType {
    List,
    Inject,
    Clear,
}

pub struct RawPoisonEvent {
    pub memdev: String,
    pub host: String,
    pub serial: u64,
    pub trace_type: PoisonTraceType,
    pub region: String,
    pub region_uuid: String,
    pub hpa: u64,
    pub dpa: u64,
    pub dpa_length: u32,
    pub source: u8,
    pub flags: u8,
    pub overflow_ts_ns: u64,
}

fn poison_source_str(source: u8) -> &'static str {
    match source {
        0 => "Unknown",
        1 => "External",
        2 => "Internal",
        3 => "Injected",
        7 => "Vendor",
        _ => "Invalid",
    }
}

pub fn decode_poison(raw: RawPoisonEvent, timestamp: String) -> CxlPoison {
    let trans_type = match raw.trace_type {
        PoisonTraceType::List => 0,
        PoisonTraceType::Inject => 1,
        PoisonTraceType::Clear => 2,
    };
    CxlPoison {
        timestamp,
        header: CxlHeader {
            memdev: raw.memdev,
            host: raw.host,
            serial: raw.serial,
            log_type: String::new(),
            record_uuid: String::new(),
            hdr_flags: 0,
            handle: 0,
            related_handle: 0,
            hdr_timestamp_ns: if raw.flags & POISON_FLAG_OVERFLOW != 0 { raw.overflow_ts_ns } else { 0 },
            length: 0,
            maint_op_class: 0,
        },
        dpa: raw.dpa,
        dpa_length: raw.dpa_length,
        source: poison_source_str(raw.source).to_string(),
        trans_type,
        channel: 0,
        rank: 0,
        device: 0,
    }
}

const AER_UE_BITS: &[(u32, &str)] = &[
    (1 << 0, "Cache Data Parity Error"),
    (1 << 1, "Cache Address Parity Error"),
    (1 << 2, "Cache Byte Enable Parity Error"),
    (1 << 3, "Cache Data ECC Error"),
    (1 << 4, "Memory Data Parity Error"),
    (1 << 5, "Memory Address Parity Error"),
    (1 << 6, "Memory Byte Enable Parity Error"),
    (1 << 7, "Memory Data ECC Error"),
    (1 << 8, "REINIT Threshold Hit"),
    (1 << 9, "Received Unrecognized Encoding"),
    (1 << 10, "Received Poison From Peer"),
    (1 << 11, "Receiver Overflow"),
    (1 << 14, "Component Specific Error"),
    (1 << 15, "IDE Tx Error"),
    (1 << 16, "IDE Rx Error"),
];

const AER_CE_BITS: &[(u32, &str)] = &[
    (1 << 0, "Cache Data ECC Error"),
    (1 << 1, "Memory Data ECC Error"),
    (1 << 2, "CRC Threshold Hit"),
    (1 << 3, "Retry Threshold"),
    (1 << 4, "Received Cache Poison From Peer"),
    (1 << 5, "Received Memory Poison From Peer"),
    (1 << 6, "Received Error From Physical Layer"),
];

fn decode_error_status(status: u32, table: &[(u32, &str)]) -> String {
    table.iter().filter(|(bit, _)| status & bit != 0).map(|(_, name)| format!("'{name}' ")).collect()
}

pub fn decode_aer_ue(
    memdev: String,
    host: String,
    serial: u64,
    error_status: u32,
    first_error: u32,
    header_log: Vec<u32>,
    timestamp: String,
) -> (CxlAerUe, String) {
    let msg = format!(
        "error status:{}first error:{}",
        decode_error_status(error_status, AER_UE_BITS),
        decode_error_status(first_error, AER_UE_BITS),
    );
    let header_log_be: Vec<u8> = header_log.iter().flat_map(|w| w.to_be_bytes()).collect();
    let record = CxlAerUe {
        timestamp,
        header: CxlHeader {
            memdev,
            host,
            serial,
            log_type: String::new(),
            record_uuid: String::new(),
            hdr_flags: 0,
            handle: 0,
            related_handle: 0,
            hdr_timestamp_ns: 0,
            length: 0,
            maint_op_class: 0,
        },
        error_status,
        first_error,
        header_log: header_log_be,
    };
    (record, msg)
}

pub fn decode_aer_ce(memdev: String, host: String, serial: u64, error_status: u32, timestamp: String) -> (CxlAerCe, String) {
    let msg = format!("error status:{}", decode_error_status(error_status, AER_CE_BITS));
    let record = CxlAerCe {
        timestamp,
        header: CxlHeader {
            memdev,
            host,
            serial,
            log_type: String::new(),
            record_uuid: String::new(),
            hdr_flags: 0,
            handle: 0,
            related_handle: 0,
            hdr_timestamp_ns: 0,
            length: 0,
            maint_op_class: 0,
        },
        error_status,
    };
    (record, msg)
}

pub fn decode_overflow(
    memdev: String,
    host: String,
    serial: u64,
    log_type: u32,
    count: u16,
    first_ts_ns: u64,
    last_ts_ns: u64,
    timestamp: String,
) -> CxlOverflow {
    CxlOverflow {
        timestamp,
        header: CxlHeader {
            memdev,
            host,
            serial,
            log_type: log_type_str(log_type).to_string(),
            record_uuid: String::new(),
            hdr_flags: 0,
            handle: 0,
            related_handle: 0,
            hdr_timestamp_ns: 0,
            length: 0,
            maint_op_class: 0,
        },
        first_overflow_ts_ns: first_ts_ns,
        last_overflow_ts_ns: last_ts_ns,
        overflow_count: count,
    }
}

pub fn decode_generic(header: CxlHeader, event_uuid: String, payload: Vec<u8>, timestamp: String) -> CxlGeneric {
    CxlGeneric { timestamp, header, event_uuid, payload }
}

const DPA_FLAG_VOLATILE: u8 = 1 << 0;
const DPA_FLAG_NOT_REPAIRABLE: u8 = 1 << 1;
const DPA_FLAGS: &[(u8, &str)] = &[(DPA_FLAG_VOLATILE, "VOLATILE"), (DPA_FLAG_NOT_REPAIRABLE, "NOT_REPAIRABLE")];

const GMER_EVENT_DESC_BITS: &[(u8, &str)] = &[
    (1 << 0, "UNCORRECTABLE EVENT"),
    (1 << 1, "THRESHOLD EVENT"),
    (1 << 2, "POISON LIST OVERFLOW"),
];

const GMER_MEM_EVENT_TYPE: &[&str] = &["ECC Error", "Invalid Address", "Data Path Error"];
const GMER_TRANS_TYPE: &[&str] = &[
    "Unknown", "Host Read", "Host Write", "Host Scan Media", "Host Inject Poison", "Internal Media Scrub",
    "Internal Media Management",
];

const GMER_VALID_CHANNEL: u16 = 1 << 0;
const GMER_VALID_RANK: u16 = 1 << 1;
const GMER_VALID_DEVICE: u16 = 1 << 2;
const GMER_VALID_COMPONENT: u16 = 1 << 3;

fn type_str(table: &[&str], value: u8) -> &'static str {
    table.get(value as usize).copied().unwrap_or("Unknown")
}

pub fn decode_general_media(
    header: CxlHeader,
    dpa: u64,
    dpa_flags: u8,
    descriptor: u8,
    error_type: u8,
    transaction_type: u8,
    validity_flags: u16,
    channel: u8,
    rank: u8,
    device: u32,
    component_id: Vec<u8>,
    timestamp: String,
) -> (CxlGeneralMedia, String) {
    let msg = format!(
        "dpa:{dpa:#x} dpa_flags:{}descriptor:{}type:{} transaction_type:{}",
        decode_flags(dpa_flags as u32, &DPA_FLAGS.iter().map(|(b, n)| (*b as u32, *n)).collect::<Vec<_>>()),
        decode_flags(descriptor as u32, &GMER_EVENT_DESC_BITS.iter().map(|(b, n)| (*b as u32, *n)).collect::<Vec<_>>()),
        type_str(GMER_MEM_EVENT_TYPE, error_type),
        type_str(GMER_TRANS_TYPE, transaction_type),
    );
    let record = CxlGeneralMedia {
        timestamp,
        header,
        dpa,
        descriptor,
        error_type,
        transaction_type,
        channel: if validity_flags & GMER_VALID_CHANNEL != 0 { channel } else { 0 },
        rank: if validity_flags & GMER_VALID_RANK != 0 { rank } else { 0 },
        device: if validity_flags & GMER_VALID_DEVICE != 0 { device } else { 0 },
        component_id: if validity_flags & GMER_VALID_COMPONENT != 0 { component_id } else { Vec::new() },
        validity_flags,
    };
    (record, msg)
}

const DER_VALID_CHANNEL: u16 = 1 << 0;
const DER_VALID_RANK: u16 = 1 << 1;
const DER_VALID_NIBBLE: u16 = 1 << 2;
const DER_VALID_BANK_GROUP: u16 = 1 << 3;
const DER_VALID_BANK: u16 = 1 << 4;
const DER_VALID_ROW: u16 = 1 << 5;
const DER_VALID_COLUMN: u16 = 1 << 6;

#[allow(clippy::too_many_arguments)]
pub fn decode_dram(
    header: CxlHeader,
    dpa: u64,
    hpa: u64,
    descriptor: u8,
    error_type: u8,
    transaction_type: u8,
    validity_flags: u16,
    channel: u16,
    rank: u8,
    nibble_mask: u32,
    bank_group: u8,
    bank: u8,
    row: u32,
    column: u16,
    timestamp: String,
) -> (CxlDram, String) {
    let msg = format!(
        "dpa:{dpa:#x} descriptor:{}type:{} transaction_type:{}",
        decode_flags(descriptor as u32, &GMER_EVENT_DESC_BITS.iter().map(|(b, n)| (*b as u32, *n)).collect::<Vec<_>>()),
        type_str(GMER_MEM_EVENT_TYPE, error_type),
        type_str(GMER_TRANS_TYPE, transaction_type),
    );
    let record = CxlDram {
        timestamp,
        header,
        dpa,
        hpa,
        descriptor,
        error_type,
        transaction_type,
        channel: if validity_flags & DER_VALID_CHANNEL != 0 { channel } else { 0 },
        rank: if validity_flags & DER_VALID_RANK != 0 { rank } else { 0 },
        nibble_mask: if validity_flags & DER_VALID_NIBBLE != 0 { nibble_mask } else { 0 },
        bank_group: if validity_flags & DER_VALID_BANK_GROUP != 0 { bank_group } else { 0 },
        bank: if validity_flags & DER_VALID_BANK != 0 { bank } else { 0 },
        row: if validity_flags & DER_VALID_ROW != 0 { row } else { 0 },
        column: if validity_flags & DER_VALID_COLUMN != 0 { column } else { 0 },
        validity_flags,
    };
    (record, msg)
}

const DEV_EVT_TYPE: &[&str] =
    &["Health Status Change", "Media Status Change", "Life Used Change", "Temperature Change", "Data Path Error", "LSA Error"];

const HEALTH_STATUS_BITS: &[(u8, &str)] = &[
    (1 << 0, "MAINTENANCE_NEEDED"),
    (1 << 1, "PERFORMANCE_DEGRADED"),
    (1 << 2, "REPLACEMENT_NEEDED"),
];

#[allow(clippy::too_many_arguments)]
pub fn decode_memory_module(
    header: CxlHeader,
    event_type: u8,
    health_status: u8,
    media_status: u8,
    life_used: u8,
    temperature: i16,
    dirty_shutdown_count: u32,
    corrected_volatile_error_count: u32,
    corrected_persistent_error_count: u32,
    timestamp: String,
) -> (CxlMemoryModule, String) {
    let msg = format!(
        "event_type:{} health_status:{}media_status:{}",
        type_str(DEV_EVT_TYPE, event_type),
        decode_flags(health_status as u32, &HEALTH_STATUS_BITS.iter().map(|(b, n)| (*b as u32, *n)).collect::<Vec<_>>()),
        media_status,
    );
    let record = CxlMemoryModule {
        timestamp,
        header,
        device_event_type: event_type,
        health_status,
        media_status,
        additional_status: 0,
        life_used,
        temperature,
        dirty_shutdown_count,
        corrected_volatile_error_count,
        corrected_persistent_error_count,
    };
    (record, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_header() -> CxlHeader {
        CxlHeader {
            memdev: "mem0".to_string(),
            host: "0000:64:00.0".to_string(),
            serial: 1,
            log_type: "Informational".to_string(),
            record_uuid: String::new(),
            hdr_flags: 0,
            handle: 0,
            related_handle: 0,
            hdr_timestamp_ns: 0,
            length: 0,
            maint_op_class: 0,
        }
    }

    #[test]
    fn dram_threshold_without_uncorrectable_is_firmware_breach() {
        let (record, _) = decode_dram(
            blank_header(), 0x1000, 0x2000, 0x02, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, "now".to_string(),
        );
        assert!(record.is_firmware_threshold_breach());
    }

    #[test]
    fn dram_uncorrectable_is_not_firmware_breach() {
        let (record, _) = decode_dram(
            blank_header(), 0x1000, 0x2000, 0x03, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, "now".to_string(),
        );
        assert!(!record.is_firmware_threshold_breach());
    }

    #[test]
    fn aer_ue_decodes_multiple_bits() {
        let (_, msg) = decode_aer_ue(
            "mem0".to_string(), "host".to_string(), 1, (1 << 0) | (1 << 10), 0, vec![0; 16], "now".to_string(),
        );
        assert!(msg.contains("Cache Data Parity Error"));
        assert!(msg.contains("Received Poison From Peer"));
    }

    #[test]
    fn general_media_honors_validity_flags() {
        let (record, _) = decode_general_media(
            blank_header(), 0x4000, 0, 0, 0, 1, GMER_VALID_CHANNEL, 3, 9, 0, Vec::new(), "now".to_string(),
        );
        assert_eq!(record.channel, 3);
        assert_eq!(record.rank, 0);
    }

    #[test]
    fn log_type_unknown_falls_back() {
        assert_eq!(log_type_str(0xff), "Unknown");
        assert_eq!(log_type_str(0x03), "Fatal");
    }
}
