//! Vendor-specific (non-standard) CPER section decoder, ported from
//! `original_source/ras-non-standard-handler.h` and the per-vendor
//! `non-standard-*.c` files. The original dispatches on a CPER section-type
//! UUID string registered per vendor (`register_ns_ev_decoder`); here the
//! dispatch key is the already-resolved vendor tag carried by the trace
//! event.
//!
//! Only the UUIDs with a registered decoder get a rendered `message`; all
//! others still produce a [`NonStandardCper`] record carrying the raw
//! section bytes, matching the original's behavior of reporting/storing
//! events from section types it doesn't know how to decode in detail.

pub mod ampereone;
pub mod hisi_common;
pub mod jaguarmicro;
pub mod yitian;

use crate::records::{NonStandardCper, Severity};

/// Vendor decoders this module knows how to render in detail, keyed by the
/// CPER section-type UUID string the trace event carries. Every variant
/// here corresponds to a `register_ns_ev_decoder` call in the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorDecoder {
    HisiliconHip07Sas,
    HisiliconOem,
    Ampere,
    AmpereOne,
    JaguarMicro,
    Yitian710Ddr,
    Unknown,
}

pub fn resolve_vendor(sec_type: &str) -> VendorDecoder {
    match sec_type {
        "hisi_hip07_sas" => VendorDecoder::HisiliconHip07Sas,
        "hisi_hip08_oem_type1" | "hisi_hip08_oem_type2" | "hisi_hip08_pcie_local" | "hisi_common" => {
            VendorDecoder::HisiliconOem
        }
        "ampere" => VendorDecoder::Ampere,
        "ampereone" => VendorDecoder::AmpereOne,
        "jaguarmicro" => VendorDecoder::JaguarMicro,
        "yitian710_ddr" => VendorDecoder::Yitian710Ddr,
        _ => VendorDecoder::Unknown,
    }
}

const HISI_SAS_VALID_PA: u64 = 1 << 0;
const HISI_SAS_VALID_MB_ERR: u64 = 1 << 1;
const HISI_SAS_VALID_ERR_TYPE: u64 = 1 << 2;
const HISI_SAS_VALID_AXI_ERR_INFO: u64 = 1 << 3;

fn err_bit_type(etype: u32) -> &'static str {
    match etype {
        0x0 => "single-bit ecc",
        0x1 => "multi-bit ecc",
        _ => "unknown error",
    }
}

fn sas_err_type(etype: u32) -> &'static str {
    match etype {
        0x0001 => "hgc_dqe ecc",
        0x0002 => "hgc_iost ecc",
        0x0004 => "hgc_itct ecc",
        0x0008 => "hgc_iostl ecc",
        0x0010 => "hgc_itctl ecc",
        0x0020 => "hgc_cqe ecc",
        0x0040 => "rxm_mem0 ecc",
        0x0080 => "rxm_mem1 ecc",
        0x0100 => "rxm_mem2 ecc",
        0x0200 => "rxm_mem3 ecc",
        0x0400 => "wp_depth",
        0x0800 => "iptt_slot_no_match",
        0x1000 => "rp_depth",
        0x2000 => "axi err",
        0x4000 => "fifo err",
        0x8000 => "lm_add_fetch_list",
        0x10000 => "hgc_abt_fetch_lm",
        _ => "unknown error",
    }
}

fn sas_axi_err_type(etype: u32) -> &'static str {
    match etype {
        0x0001 => "IOST_AXI_W_ERR",
        0x0002 => "IOST_AXI_R_ERR",
        0x0004 => "ITCT_AXI_W_ERR",
        0x0008 => "ITCT_AXI_R_ERR",
        0x0010 => "SATA_AXI_W_ERR",
        0x0020 => "SATA_AXI_R_ERR",
        0x0040 => "DQE_AXI_R_ERR",
        0x0080 => "CQE_AXI_W_ERR",
        0x0100 => "CQE_WINFO_FIFO",
        0x0200 => "CQE_MSG_FIFIO",
        0x0400 => "GETDQE_FIFO",
        0x0800 => "CMDP_FIFO",
        0x1000 => "AWTCTRL_FIFO",
        _ => "unknown error",
    }
}

pub struct HisiSasErrSec {
    pub val_bits: u64,
    pub physical_addr: u64,
    pub mb: u32,
    pub kind: u32,
    pub axi_err_info: u32,
}

/// `decode_hip07_sas_error`: `None` when no validity bit is set ("no valid
/// error data"), matching the original's early return.
fn decode_hip07_sas(err: &HisiSasErrSec) -> Option<String> {
    if err.val_bits == 0 {
        return None;
    }
    let mut s = String::from("[");
    if err.val_bits & HISI_SAS_VALID_PA != 0 {
        s.push_str(&format!("phy addr = {:#x}: ", err.physical_addr));
    }
    if err.val_bits & HISI_SAS_VALID_MB_ERR != 0 {
        s.push_str(&format!("{}: ", err_bit_type(err.mb)));
    }
    if err.val_bits & HISI_SAS_VALID_ERR_TYPE != 0 {
        s.push_str(&format!("error type = {}: ", sas_err_type(err.kind)));
    }
    if err.val_bits & HISI_SAS_VALID_AXI_ERR_INFO != 0 {
        s.push_str(&format!("axi error type = {}", sas_axi_err_type(err.axi_err_info)));
    }
    s.push(']');
    Some(s)
}

/// Ampere "Armv8 RAS compliant Error Record", Payload Type 0 register names
/// (`disp_payload0_err_reg_name`), walked positionally over the ten
/// `u64` registers the section carries.
const AMPERE_PAYLOAD0_REGS: &[&str] = &[
    "Error Type:", "Error SubType:", "Error Instance:", "Processor Socket:", "Status:", "Address:",
    "MISC0:", "MISC1:", "MISC2:", "MISC3:",
];

fn decode_ampere_payload0(regs: &[u64; 10]) -> String {
    AMPERE_PAYLOAD0_REGS
        .iter()
        .zip(regs.iter())
        .map(|(name, val)| format!("{name} {val:#x} "))
        .collect::<String>()
        .trim_end()
        .to_string()
}

pub struct RawNonStandardEvent {
    pub sec_type: String,
    pub fru_id: String,
    pub fru_text: String,
    pub severity: Severity,
    pub raw: Vec<u8>,
}

// ---- little-endian field extraction over the raw CPER section bytes ------

fn u32_at(b: &[u8], off: usize) -> u32 {
    b.get(off..off + 4).and_then(|s| s.try_into().ok()).map(u32::from_le_bytes).unwrap_or(0)
}

fn u64_at(b: &[u8], off: usize) -> u64 {
    b.get(off..off + 8).and_then(|s| s.try_into().ok()).map(u64::from_le_bytes).unwrap_or(0)
}

fn u16_at(b: &[u8], off: usize) -> u16 {
    b.get(off..off + 2).and_then(|s| s.try_into().ok()).map(u16::from_le_bytes).unwrap_or(0)
}

fn u8_at(b: &[u8], off: usize) -> u8 {
    b.get(off).copied().unwrap_or(0)
}

fn decode_hip07_sas_bytes(b: &[u8]) -> Option<String> {
    decode_hip07_sas(&HisiSasErrSec {
        val_bits: u64_at(b, 0),
        physical_addr: u64_at(b, 8),
        mb: u32_at(b, 16),
        kind: u32_at(b, 20),
        axi_err_info: u32_at(b, 24),
    })
}

/// `hisi_common`/HIP08 OEM sections carry a 1-byte discriminant ahead of
/// the section proper, since the original registers type1, type2 and
/// pcie-local as three distinct UUIDs; this decoder multiplexes them
/// behind one tag byte for simplicity.
fn decode_hisi_oem_bytes(b: &[u8]) -> Option<String> {
    if b.is_empty() {
        return None;
    }
    let kind = b[0];
    let body = &b[1..];
    let head = hisi_common::OemSecHead {
        val_bits: u32_at(body, 0),
        version: u8_at(body, 4),
        soc_id: u8_at(body, 5),
        socket_id: u8_at(body, 6),
        nimbus_id: u8_at(body, 7),
        module_id: u8_at(body, 8),
        sub_module_id: u8_at(body, 9),
        err_severity: u8_at(body, 10),
    };
    match kind {
        1 => Some(hisi_common::decode_oem_type1(&hisi_common::OemType1Sec {
            head,
            err_misc: [u32_at(body, 12), u32_at(body, 16), u32_at(body, 20), u32_at(body, 24), u32_at(body, 28)],
            err_addr: u64_at(body, 32),
        })),
        2 => Some(hisi_common::decode_oem_type2(&hisi_common::OemType2Sec {
            head,
            err_fr: u64_at(body, 12),
            err_ctrl: u64_at(body, 20),
            err_status: u64_at(body, 28),
            err_addr: u64_at(body, 36),
            err_misc0: u64_at(body, 44),
            err_misc1: u64_at(body, 52),
        })),
        _ => {
            let reg_count = (u64_at(body, 0) & 0xff) as usize;
            let misc: Vec<u32> = (0..reg_count.min(33)).map(|i| u32_at(body, 9 + i * 4)).collect();
            Some(hisi_common::decode_pcie_local(&hisi_common::PcieLocalSec {
                val_bits: u64_at(body, 0),
                version: u8_at(body, 8),
                socket_id: u8_at(body, 9),
                core_id: u8_at(body, 10),
                port_id: u8_at(body, 11),
                err_severity: u8_at(body, 12),
                err_type: u16_at(body, 13),
                err_misc: misc,
            }))
        }
    }
}

fn decode_ampereone_bytes(b: &[u8]) -> Option<String> {
    if b.len() < 8 {
        return None;
    }
    let h = ampereone::parse_header(u16_at(b, 0), u16_at(b, 2), u32_at(b, 4));
    let body = &b[8..];
    Some(match h.payload_type {
        0 => ampereone::decode_payload0(
            &h,
            u64_at(body, 0),
            u64_at(body, 8),
            u64_at(body, 16),
            u64_at(body, 24),
            [u64_at(body, 32), u64_at(body, 40), u64_at(body, 48), u64_at(body, 56)],
        ),
        1 => ampereone::decode_payload1(&h, u32_at(body, 0), u32_at(body, 4), u64_at(body, 8), u64_at(body, 16), u64_at(body, 24)),
        2 => ampereone::decode_payload2(&h, u32_at(body, 0), u32_at(body, 4), u32_at(body, 8), u32_at(body, 12), u32_at(body, 16), u32_at(body, 20)),
        3 => ampereone::decode_payload3(
            &h,
            u64_at(body, 0),
            u64_at(body, 8),
            u32_at(body, 16),
            u32_at(body, 20),
            u32_at(body, 24),
            u32_at(body, 28),
            u32_at(body, 32),
            u32_at(body, 36),
        ),
        4 => ampereone::decode_payload4(&h, u64_at(body, 0), u32_at(body, 8), u32_at(body, 12), u32_at(body, 16), u32_at(body, 20)),
        5 => ampereone::decode_payload5(&h),
        _ => {
            let msg_len = u8_at(body, 5) as usize;
            let msg = String::from_utf8_lossy(body.get(6..6 + msg_len).unwrap_or(&[])).to_string();
            ampereone::decode_payload6(&h, u8_at(body, 0), u32_at(body, 1), &msg)
        }
    })
}

fn decode_jaguarmicro_bytes(b: &[u8]) -> Option<String> {
    if b.len() < 16 {
        return None;
    }
    let head = jaguarmicro::CommonHead {
        val_bits: u32_at(b, 0),
        version: u8_at(b, 4),
        soc_id: u8_at(b, 5),
        subsystem_id: u8_at(b, 6),
        module_id: u8_at(b, 7),
        submodule_id: u8_at(b, 8),
        dev_id: u8_at(b, 9),
        err_type: u16_at(b, 10),
        err_severity: u8_at(b, 12),
    };
    let body = &b[16..];
    let reg_array = |tail_off: usize| -> Vec<u32> {
        let count = u32_at(body, tail_off) as usize;
        (0..count.min(64)).map(|i| u32_at(body, tail_off + 4 + i * 4)).collect()
    };
    Some(match head.module_id {
        0 => jaguarmicro::decode_payload0(&head, u32_at(body, 0), u32_at(body, 4), u32_at(body, 8), &reg_array(36)),
        1 => jaguarmicro::decode_payload1(&head, u32_at(body, 0), u32_at(body, 4), u32_at(body, 8), &reg_array(12)),
        2 => jaguarmicro::decode_payload2(&head, u32_at(body, 0), u32_at(body, 4), u32_at(body, 8), u32_at(body, 12), &reg_array(16)),
        5 => jaguarmicro::decode_payload5(&head, u64_at(body, 32), u64_at(body, 72), u64_at(body, 80), u64_at(body, 88), &reg_array(104)),
        6 => jaguarmicro::decode_payload6(&head, u64_at(body, 0), u64_at(body, 8), u64_at(body, 24), u64_at(body, 32), &reg_array(56)),
        _ => return None,
    })
}

fn decode_yitian_bytes(b: &[u8]) -> Option<String> {
    if b.len() < 4 {
        return None;
    }
    let body = &b[4..];
    Some(yitian::decode(&yitian::DdrPayload {
        ecccfg0: u32_at(body, 0),
        ecccfg1: u32_at(body, 4),
        eccstat: u32_at(body, 8),
        eccerrcnt: u32_at(body, 12),
        ecccaddr0: u32_at(body, 16),
        ecccaddr1: u32_at(body, 20),
        ecccsyn0: u32_at(body, 24),
        ecccsyn1: u32_at(body, 28),
        ecccsyn2: u32_at(body, 32),
        eccuaddr0: u32_at(body, 36),
        eccuaddr1: u32_at(body, 40),
        eccusyn0: u32_at(body, 44),
        eccusyn1: u32_at(body, 48),
        eccusyn2: u32_at(body, 52),
        eccbitmask0: u32_at(body, 56),
        eccbitmask1: u32_at(body, 60),
        eccbitmask2: u32_at(body, 64),
    }))
}

pub fn decode(event: RawNonStandardEvent, timestamp: String) -> (NonStandardCper, Option<String>) {
    let message = match resolve_vendor(&event.sec_type) {
        VendorDecoder::HisiliconHip07Sas => decode_hip07_sas_bytes(&event.raw),
        VendorDecoder::HisiliconOem => decode_hisi_oem_bytes(&event.raw),
        VendorDecoder::Ampere => {
            if event.raw.len() >= 80 {
                let regs = std::array::from_fn(|i| u64_at(&event.raw, i * 8));
                Some(decode_ampere_payload0(&regs))
            } else {
                None
            }
        }
        VendorDecoder::AmpereOne => decode_ampereone_bytes(&event.raw),
        VendorDecoder::JaguarMicro => decode_jaguarmicro_bytes(&event.raw),
        VendorDecoder::Yitian710Ddr => decode_yitian_bytes(&event.raw),
        VendorDecoder::Unknown => None,
    };

    let record = NonStandardCper {
        timestamp,
        sec_type: event.sec_type,
        fru_id: event.fru_id,
        fru_text: event.fru_text,
        severity: event.severity,
        error: event.raw,
    };
    (record, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hip07_sas_no_validity_bits_is_none() {
        let sec = HisiSasErrSec { val_bits: 0, physical_addr: 0, mb: 0, kind: 0, axi_err_info: 0 };
        assert_eq!(decode_hip07_sas(&sec), None);
    }

    #[test]
    fn hip07_sas_decodes_error_type() {
        let sec = HisiSasErrSec {
            val_bits: HISI_SAS_VALID_ERR_TYPE | HISI_SAS_VALID_PA,
            physical_addr: 0x1000,
            mb: 0,
            kind: 0x0020,
            axi_err_info: 0,
        };
        let msg = decode_hip07_sas(&sec).unwrap();
        assert!(msg.contains("phy addr = 0x1000"));
        assert!(msg.contains("hgc_cqe ecc"));
    }

    #[test]
    fn ampere_payload0_walks_all_ten_registers() {
        let regs = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let msg = decode_ampere_payload0(&regs);
        assert!(msg.starts_with("Error Type: 0x1 "));
        assert!(msg.ends_with("MISC3: 0xa"));
    }

    #[test]
    fn unknown_vendor_falls_back_to_raw_record() {
        let event = RawNonStandardEvent {
            sec_type: "some_future_vendor".to_string(),
            fru_id: String::new(),
            fru_text: String::new(),
            severity: Severity::Uncorrected,
            raw: vec![1, 2, 3],
        };
        let (record, message) = decode(event, "now".to_string());
        assert!(message.is_none());
        assert_eq!(record.error, vec![1, 2, 3]);
    }

    #[test]
    fn jaguarmicro_short_payload_is_none() {
        let event = RawNonStandardEvent {
            sec_type: "jaguarmicro".to_string(),
            fru_id: String::new(),
            fru_text: String::new(),
            severity: Severity::Corrected,
            raw: vec![0u8; 4],
        };
        let (record, message) = decode(event, "now".to_string());
        assert!(message.is_none());
        assert_eq!(record.sec_type, "jaguarmicro");
    }

    #[test]
    fn yitian_ddr_decodes_error_count() {
        let mut raw = vec![0u8; 68];
        raw[0] = 0x50; // type tag, unused by the decoder itself
        raw[4 + 12..4 + 16].copy_from_slice(&7u32.to_le_bytes()); // eccerrcnt
        let event = RawNonStandardEvent {
            sec_type: "yitian710_ddr".to_string(),
            fru_id: String::new(),
            fru_text: String::new(),
            severity: Severity::Corrected,
            raw,
        };
        let (_, message) = decode(event, "now".to_string());
        assert!(message.unwrap().contains("eccerrcnt=7"));
    }
}
