//! AmpereOne non-standard CPER section decoder, ported from
//! `original_source/non-standard-ampereone.c`/`.h`. Every payload shares a
//! common 8-byte header (`severity`/`socket`/`payload_type`/`type`/
//! `instance` packed into `type`+`subtype`+`instance` words); the payload
//! body is interpreted per `AMPEREONE_PAYLOAD_TYPE`.

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub payload_type: u8,
    pub err_type: u16,
    pub instance: u16,
}

pub fn parse_header(type_word: u16, subtype: u16, instance: u32) -> Header {
    Header { payload_type: ((type_word >> 12) & 0xf) as u8, err_type: type_word & 0x7ff, instance: (instance & 0x7fff) as u16 }
}

fn header_prefix(h: &Header) -> String {
    format!("type={} instance={}", h.err_type, h.instance)
}

/// Payload Type 0: ARMv8 RAS-compliant error record (ERR<n>FR/CTLR/STATUS/
/// ADDR/MISC0-3), identical register shape to the legacy Ampere decoder.
pub fn decode_payload0(h: &Header, fr: u64, ctlr: u64, status: u64, addr: u64, misc: [u64; 4]) -> String {
    format!(
        "{} err_fr={:#x} err_ctlr={:#x} err_status={:#x} err_addr={:#x} err_misc_0={:#x} err_misc_1={:#x} err_misc_2={:#x} err_misc_3={:#x}",
        header_prefix(h),
        fr,
        ctlr,
        status,
        addr,
        misc[0],
        misc[1],
        misc[2],
        misc[3]
    )
}

/// Payload Type 1: PCIe AER. Only the AER status words and the core
/// signal-integrity error counters are rendered; the per-lane debug status
/// dump (16 `dbg_l1_status_lane*` words) is carried in `error_bytes`
/// without a textual breakdown, matching how most consumers of this
/// section only act on the AER bits.
pub fn decode_payload1(h: &Header, aer_ue: u32, aer_ce: u32, ebuf_overflow: u64, ebuf_underrun: u64, decode_error: u64) -> String {
    format!(
        "{} aer_ue_err_status={:#x} aer_ce_err_status={:#x} ebuf_overflow={:#x} ebuf_underrun={:#x} decode_error={:#x}",
        header_prefix(h),
        aer_ue,
        aer_ce,
        ebuf_overflow,
        ebuf_underrun,
        decode_error
    )
}

/// Payload Type 2: PCIe RAS Data Path (RASDP).
pub fn decode_payload2(
    h: &Header,
    corr_count: u32,
    corr_loc: u32,
    ram_addr_corr: u32,
    uncorr_count: u32,
    uncorr_loc: u32,
    ram_addr_uncorr: u32,
) -> String {
    format!(
        "{} corr_count={corr_count} corr_error_location={corr_loc:#x} ram_addr_corr={ram_addr_corr:#x} uncorr_count={uncorr_count} uncorr_error_location={uncorr_loc:#x} ram_addr_uncorr={ram_addr_uncorr:#x}",
        header_prefix(h)
    )
}

/// Payload Type 3: MCU ECC.
pub fn decode_payload3(h: &Header, addr: u64, data: u64, id: u32, synd: u32, mce_cnt: u32, ctlr: u32, err_sts: u32, err_cnt: u32) -> String {
    format!(
        "{} ecc_addr={addr:#x} ecc_data={data:#x} ecc_id={id} ecc_synd={synd:#x} ecc_mce_cnt={mce_cnt} ecc_ctlr={ctlr:#x} ecc_err_sts={err_sts:#x} ecc_err_cnt={err_cnt}",
        header_prefix(h)
    )
}

/// Payload Type 4: MCU CHI transaction snapshot.
pub fn decode_payload4(h: &Header, address: u64, srcid: u32, txnid: u32, kind: u32, opcode: u32) -> String {
    format!("{} address={address:#x} srcid={srcid:#x} txnid={txnid:#x} type={kind:#x} opcode={opcode:#x}", header_prefix(h))
}

/// Payload Type 5: BERT (boot error record). The section carries only the
/// common header — its presence alone is the signal.
pub fn decode_payload5(h: &Header) -> String {
    format!("{} BERT boot error record", header_prefix(h))
}

/// Payload Type 6: firmware-reported error, with a driver id, an error
/// code, and an embedded UTF-8 message.
pub fn decode_payload6(h: &Header, driver: u8, error_code: u32, error_msg: &str) -> String {
    format!("{} driver={driver} error_code={error_code:#x} msg=\"{error_msg}\"", header_prefix(h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_extracts_payload_type_and_instance() {
        let h = parse_header(0x5123, 0, 42);
        assert_eq!(h.payload_type, 5);
        assert_eq!(h.instance, 42);
    }

    #[test]
    fn payload0_renders_all_eight_registers() {
        let h = Header { payload_type: 0, err_type: 0, instance: 0 };
        let msg = decode_payload0(&h, 1, 2, 3, 4, [5, 6, 7, 8]);
        assert!(msg.contains("err_misc_3=0x8"));
    }
}
