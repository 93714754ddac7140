//! Memory-controller (EDAC `mc_event`) decoder, ported from
//! `original_source/ras-mc-handler.c`.
//!
//! Unlike the MCA/CPER decoders, the kernel's `mc_event` tracepoint already
//! carries human text (`msg`, `label`) composed by the EDAC core; this
//! decoder's job is mostly severity classification and location-string
//! composition, not bitfield decoding.

use crate::records::{MemoryControllerError, Severity};

/// `error_type` values carried by the `mc_event` tracepoint
/// (`enum hw_event_mc_err_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawMcErrorType {
    Corrected,
    Uncorrected,
    Deferred,
    Fatal,
    Info,
}

pub fn severity(kind: RawMcErrorType) -> Severity {
    match kind {
        RawMcErrorType::Corrected => Severity::Corrected,
        RawMcErrorType::Uncorrected => Severity::Uncorrected,
        RawMcErrorType::Deferred => Severity::Deferred,
        RawMcErrorType::Fatal => Severity::Fatal,
        RawMcErrorType::Info => Severity::Info,
    }
}

pub struct RawMcEvent {
    pub error_type: RawMcErrorType,
    pub error_count: u32,
    pub msg: String,
    pub label: String,
    pub mc_index: u32,
    pub top_layer: i32,
    pub middle_layer: i32,
    pub lower_layer: i32,
    pub address: u64,
    pub grain_bits: u64,
    pub syndrome: u64,
    pub driver_detail: String,
}

/// `location: %d:%d:%d` / `%d:%d` / `%d`, built from whichever of the three
/// layers are populated (negative == "not present").
fn location_string(top: i32, middle: i32, lower: i32) -> String {
    if top < 0 && middle < 0 && lower < 0 {
        return String::new();
    }
    if lower >= 0 {
        format!("{top}:{middle}:{lower}")
    } else if middle >= 0 {
        format!("{top}:{middle}")
    } else {
        format!("{top}")
    }
}

pub fn decode(event: RawMcEvent, timestamp: String) -> (MemoryControllerError, String) {
    let mut msg = String::new();
    msg.push_str(if event.error_count > 1 { "errors:" } else { "error:" });
    if !event.msg.is_empty() {
        msg.push(' ');
        msg.push_str(&event.msg);
    }
    if !event.label.is_empty() {
        msg.push_str(" on ");
        msg.push_str(&event.label);
    }
    msg.push_str(&format!(" (mc: {}", event.mc_index));
    let loc = location_string(event.top_layer, event.middle_layer, event.lower_layer);
    if !loc.is_empty() {
        msg.push_str(&format!(" location: {loc}"));
    }
    if event.address != 0 {
        msg.push_str(&format!(" address: {:#010x}", event.address));
    }
    msg.push_str(&format!(" grain: {}", event.grain_bits));
    if event.syndrome != 0 {
        msg.push_str(&format!(" syndrome: {:#x}", event.syndrome));
    }
    msg.push(')');

    let record = MemoryControllerError {
        timestamp,
        error_count: event.error_count,
        severity: severity(event.error_type),
        message: event.msg,
        label: event.label,
        mc_index: event.mc_index,
        top_layer: event.top_layer,
        middle_layer: event.middle_layer,
        lower_layer: event.lower_layer,
        address: event.address,
        grain: event.grain_bits,
        syndrome: event.syndrome,
        driver_detail: event.driver_detail,
    };
    (record, msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_string_picks_deepest_populated_layer() {
        assert_eq!(location_string(0, 1, 2), "0:1:2");
        assert_eq!(location_string(0, 1, -1), "0:1");
        assert_eq!(location_string(0, -1, -1), "0");
        assert_eq!(location_string(-1, -1, -1), "");
    }

    #[test]
    fn decode_composes_message_and_keeps_severity() {
        let event = RawMcEvent {
            error_type: RawMcErrorType::Corrected,
            error_count: 1,
            msg: "DRAM ECC error".to_string(),
            label: "DIMM_A1".to_string(),
            mc_index: 0,
            top_layer: 0,
            middle_layer: 1,
            lower_layer: -1,
            address: 0x1000,
            grain_bits: 6,
            syndrome: 0,
            driver_detail: "APEI location: node:0 card:0 module:0 rank:0 device:0 bank:0 row:5".to_string(),
        };
        let (record, msg) = decode(event, "now".to_string());
        assert_eq!(record.severity, Severity::Corrected);
        assert!(msg.contains("on DIMM_A1"));
        assert!(msg.contains("location: 0:1"));
        assert!(msg.contains("address: 0x00001000"));
    }
}
