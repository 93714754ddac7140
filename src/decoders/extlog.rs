//! eMCA/extlog memory-error decoder, ported from
//! `original_source/ras-extlog-handler.c`.

use crate::records::{ExtLogMemory, Severity};

const ERR_TYPE_STRS: &[&str] = &[
    "unknown", "no error", "single-bit ECC", "multi-bit ECC", "single-symbol chipkill ECC",
    "multi-symbol chipkill ECC", "master abort", "target abort", "parity error", "watchdog timeout",
    "invalid address", "mirror Broken", "memory sparing", "scrub corrected error", "scrub uncorrected error",
    "physical memory map-out event",
];

pub fn err_type_str(etype: u32) -> &'static str {
    ERR_TYPE_STRS.get(etype as usize).copied().unwrap_or("unknown-type")
}

/// Kernel `sev` field; distinct numbering from the GHES/CPER severity used
/// elsewhere, ported verbatim (`err_severity`).
pub fn err_severity(severity: u32) -> Severity {
    match severity {
        0 => Severity::Deferred,
        1 => Severity::Fatal,
        2 => Severity::Corrected,
        _ => Severity::Info,
    }
}

/// `~((1 << lsb) - 1)`, with `lsb == 0xff` meaning "all bits significant".
pub fn address_mask(lsb: u8) -> u64 {
    if lsb == 0xff {
        return !0u64;
    }
    !((1u64 << lsb) - 1)
}

const VALID_NODE: u64 = 0x0008;
const VALID_CARD: u64 = 0x0010;
const VALID_MODULE: u64 = 0x0020;
const VALID_BANK: u64 = 0x0040;
const VALID_DEVICE: u64 = 0x0080;
const VALID_ROW: u64 = 0x0100;
const VALID_COLUMN: u64 = 0x0200;
const VALID_BIT_POSITION: u64 = 0x0400;
const VALID_REQUESTOR_ID: u64 = 0x0800;
const VALID_RESPONDER_ID: u64 = 0x1000;
const VALID_TARGET_ID: u64 = 0x2000;
const VALID_RANK_NUMBER: u64 = 0x8000;
const VALID_CARD_HANDLE: u64 = 0x10000;
const VALID_MODULE_HANDLE: u64 = 0x20000;

/// Compact CPER memory-error detail, matching `cper_mem_err_compact`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CperMemErrCompact {
    pub validation_bits: u64,
    pub node: u16,
    pub card: u16,
    pub module: u16,
    pub bank: u16,
    pub device: u16,
    pub row: u16,
    pub column: u16,
    pub bit_pos: u16,
    pub requestor_id: u64,
    pub responder_id: u64,
    pub target_id: u64,
    pub rank: u16,
    pub mem_array_handle: u16,
    pub mem_dev_handle: u16,
}

/// `err_cper_data`: builds the `" (field: value ...)"` suffix from whichever
/// validity bits are set, empty string when none are (`validation_bits == 0`).
pub fn err_cper_data(cpd: &CperMemErrCompact) -> String {
    if cpd.validation_bits == 0 {
        return String::new();
    }
    let mut parts = Vec::new();
    if cpd.validation_bits & VALID_NODE != 0 {
        parts.push(format!("node: {} ", cpd.node));
    }
    if cpd.validation_bits & VALID_CARD != 0 {
        parts.push(format!("card: {} ", cpd.card));
    }
    if cpd.validation_bits & VALID_MODULE != 0 {
        parts.push(format!("module: {} ", cpd.module));
    }
    if cpd.validation_bits & VALID_BANK != 0 {
        parts.push(format!("bank: {} ", cpd.bank));
    }
    if cpd.validation_bits & VALID_DEVICE != 0 {
        parts.push(format!("device: {} ", cpd.device));
    }
    if cpd.validation_bits & VALID_ROW != 0 {
        parts.push(format!("row: {} ", cpd.row));
    }
    if cpd.validation_bits & VALID_COLUMN != 0 {
        parts.push(format!("column: {} ", cpd.column));
    }
    if cpd.validation_bits & VALID_BIT_POSITION != 0 {
        parts.push(format!("bit_pos: {} ", cpd.bit_pos));
    }
    if cpd.validation_bits & VALID_REQUESTOR_ID != 0 {
        parts.push(format!("req_id: {:#x} ", cpd.requestor_id));
    }
    if cpd.validation_bits & VALID_RESPONDER_ID != 0 {
        parts.push(format!("resp_id: {:#x} ", cpd.responder_id));
    }
    if cpd.validation_bits & VALID_TARGET_ID != 0 {
        parts.push(format!("tgt_id: {:#x} ", cpd.target_id));
    }
    if cpd.validation_bits & VALID_RANK_NUMBER != 0 {
        parts.push(format!("rank: {} ", cpd.rank));
    }
    if cpd.validation_bits & VALID_CARD_HANDLE != 0 {
        parts.push(format!("card_handle: {} ", cpd.mem_array_handle));
    }
    if cpd.validation_bits & VALID_MODULE_HANDLE != 0 {
        parts.push(format!("module_handle: {} ", cpd.mem_dev_handle));
    }
    let mut joined = parts.concat();
    joined.pop(); // original trims the trailing space before the closing paren
    format!(" ({joined})")
}

/// Little-endian-ordered RFC 4122 text rendering (`uuid_le`), used for
/// FRU ids which CPER stores byte-swapped relative to the big-endian
/// rendering ARM/CXL UUIDs use.
pub fn uuid_le(bytes: &[u8; 16]) -> String {
    let order = [3, 2, 1, 0, 5, 4, 7, 6, 8, 9, 10, 11, 12, 13, 14, 15];
    let mut s = String::with_capacity(36);
    for (i, &idx) in order.iter().enumerate() {
        s.push_str(&format!("{:02x}", bytes[idx]));
        if matches!(i, 3 | 5 | 7 | 9) {
            s.push('-');
        }
    }
    s
}

pub struct RawExtlogEvent {
    pub etype: u32,
    pub error_seq: u64,
    pub severity: u32,
    pub address: u64,
    pub pa_mask_lsb: u8,
    pub cper_data: Vec<u8>,
    pub cper_detail: CperMemErrCompact,
    pub fru_text: String,
    pub fru_id: [u8; 16],
}

pub fn decode(event: RawExtlogEvent, timestamp: String) -> (ExtLogMemory, String) {
    let msg = format!(
        "{} {:?} error: {} physical addr: {:#x} mask: {:#x}{} {} {}",
        event.error_seq,
        err_severity(event.severity),
        err_type_str(event.etype),
        event.address,
        address_mask(event.pa_mask_lsb),
        err_cper_data(&event.cper_detail),
        event.fru_text,
        uuid_le(&event.fru_id),
    );

    let record = ExtLogMemory {
        timestamp,
        error_seq: event.error_seq,
        etype: event.etype,
        severity: err_severity(event.severity),
        address: event.address,
        address_mask_lsb: event.pa_mask_lsb,
        cper_data: event.cper_data,
        fru_id: uuid_le(&event.fru_id),
        fru_text: event.fru_text,
    };
    (record, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_mask_all_significant() {
        assert_eq!(address_mask(0xff), u64::MAX);
        assert_eq!(address_mask(6), !0x3fu64);
    }

    #[test]
    fn err_cper_data_empty_when_no_validity_bits() {
        assert_eq!(err_cper_data(&CperMemErrCompact::default()), "");
    }

    #[test]
    fn err_cper_data_joins_set_fields() {
        let cpd = CperMemErrCompact { validation_bits: VALID_BANK | VALID_ROW, bank: 2, row: 17, ..Default::default() };
        assert_eq!(err_cper_data(&cpd), " (bank: 2 row: 17)");
    }

    #[test]
    fn single_bit_ecc_decodes() {
        let event = RawExtlogEvent {
            etype: 2,
            error_seq: 1,
            severity: 2,
            address: 0x1000,
            pa_mask_lsb: 6,
            cper_data: vec![],
            cper_detail: CperMemErrCompact::default(),
            fru_text: String::new(),
            fru_id: [0; 16],
        };
        let (record, msg) = decode(event, "now".to_string());
        assert_eq!(record.severity, Severity::Corrected);
        assert!(msg.contains("single-bit ECC"));
    }
}
