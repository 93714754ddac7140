//! JaguarMicro non-standard CPER section decoder, ported from
//! `original_source/non-standard-jaguarmicro.c`/`.h`. Every payload shares
//! a `jm_common_sec_head` (validity bitmask + soc/subsystem/module/
//! sub-module/device ids) and a trailing `jm_common_sec_tail` (a raw
//! register-array dump); only payload types 0, 1, 2, 5 and 6 have a
//! registered decoder upstream (CSR PoR, SMMU, HAC SRAM, CMN, GIC).

const VALID_SOC_ID: u32 = 1 << 1;
const VALID_SUBSYSTEM_ID: u32 = 1 << 2;
const VALID_MODULE_ID: u32 = 1 << 3;
const VALID_SUBMODULE_ID: u32 = 1 << 4;
const VALID_DEV_ID: u32 = 1 << 5;
const VALID_ERR_TYPE: u32 = 1 << 6;
const VALID_ERR_SEVERITY: u32 = 1 << 7;

pub struct CommonHead {
    pub val_bits: u32,
    pub version: u8,
    pub soc_id: u8,
    pub subsystem_id: u8,
    pub module_id: u8,
    pub submodule_id: u8,
    pub dev_id: u8,
    pub err_type: u16,
    pub err_severity: u8,
}

fn module_name(module_id: u8) -> &'static str {
    match module_id {
        0 => "CSR_POR",
        1 => "SMMU",
        2 => "HAC_SRAM",
        5 => "CMN",
        6 => "GIC",
        _ => "UNKNOWN",
    }
}

fn decode_head(h: &CommonHead) -> String {
    let mut s = format!("version={}", h.version);
    if h.val_bits & VALID_SOC_ID != 0 {
        s.push_str(&format!(" soc_id={}", h.soc_id));
    }
    if h.val_bits & VALID_SUBSYSTEM_ID != 0 {
        s.push_str(&format!(" subsystem_id={}", h.subsystem_id));
    }
    if h.val_bits & VALID_MODULE_ID != 0 {
        s.push_str(&format!(" module={}", module_name(h.module_id)));
    }
    if h.val_bits & VALID_SUBMODULE_ID != 0 {
        s.push_str(&format!(" submodule_id={}", h.submodule_id));
    }
    if h.val_bits & VALID_DEV_ID != 0 {
        s.push_str(&format!(" dev_id={}", h.dev_id));
    }
    if h.val_bits & VALID_ERR_TYPE != 0 {
        s.push_str(&format!(" err_type={:#x}", h.err_type));
    }
    if h.val_bits & VALID_ERR_SEVERITY != 0 {
        s.push_str(&format!(" severity={}", h.err_severity));
    }
    s
}

fn decode_reg_array(reg_array: &[u32]) -> String {
    if reg_array.is_empty() {
        return String::new();
    }
    let regs = reg_array.iter().map(|r| format!("{r:#x}")).collect::<Vec<_>>().join(",");
    format!(" reg_array=[{regs}]")
}

/// Payload Type 0: `ras_csr_por` — lock control/function plus a RAM ECC
/// register bank.
pub fn decode_payload0(h: &CommonHead, lock_control: u32, lock_function: u32, cfg_ram_id: u32, reg_array: &[u32]) -> String {
    format!("{} lock_control={lock_control:#x} lock_function={lock_function:#x} cfg_ram_id={cfg_ram_id:#x}{}", decode_head(h), decode_reg_array(reg_array))
}

/// Payload Type 1: SMMU IP error/fault registers.
pub fn decode_payload1(h: &CommonHead, smmu_csr: u32, errfr: u32, errctlr: u32, reg_array: &[u32]) -> String {
    format!("{} smmu_csr={smmu_csr:#x} errfr={errfr:#x} errctlr={errctlr:#x}{}", decode_head(h), decode_reg_array(reg_array))
}

/// Payload Type 2: HAC SRAM 1-bit/2-bit ECC interrupt counters.
pub fn decode_payload2(h: &CommonHead, ecc_1bit_low: u32, ecc_1bit_high: u32, ecc_2bit_low: u32, ecc_2bit_high: u32, reg_array: &[u32]) -> String {
    format!(
        "{} ecc_1bit_int={ecc_1bit_low:#x}:{ecc_1bit_high:#x} ecc_2bit_int={ecc_2bit_low:#x}:{ecc_2bit_high:#x}{}",
        decode_head(h),
        decode_reg_array(reg_array)
    )
}

/// Payload Type 5: CMN (Coherent Mesh Network) IP error snapshot.
pub fn decode_payload5(h: &CommonHead, errfr: u64, errctlr: u64, errstatus: u64, erraddr: u64, reg_array: &[u32]) -> String {
    format!("{} errfr={errfr:#x} errctlr={errctlr:#x} errstatus={errstatus:#x} erraddr={erraddr:#x}{}", decode_head(h), decode_reg_array(reg_array))
}

/// Payload Type 6: GIC (Generic Interrupt Controller) error record.
pub fn decode_payload6(h: &CommonHead, record_id: u64, err_fr: u64, err_status: u64, err_addr: u64, reg_array: &[u32]) -> String {
    format!(
        "{} record_id={record_id:#x} gict_err_fr={err_fr:#x} gict_err_status={err_status:#x} gict_err_addr={err_addr:#x}{}",
        decode_head(h),
        decode_reg_array(reg_array)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_module_id_emits_unknown_name() {
        let h = CommonHead {
            val_bits: VALID_MODULE_ID,
            version: 0,
            soc_id: 0,
            subsystem_id: 0,
            module_id: 9,
            submodule_id: 0,
            dev_id: 0,
            err_type: 0,
            err_severity: 0,
        };
        assert!(decode_head(&h).contains("module=UNKNOWN"));
    }

    #[test]
    fn reg_array_renders_hex_csv() {
        assert_eq!(decode_reg_array(&[1, 2, 3]), " reg_array=[0x1,0x2,0x3]");
        assert_eq!(decode_reg_array(&[]), "");
    }
}
