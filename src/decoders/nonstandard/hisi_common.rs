//! HiSilicon OEM type1/type2/PCIe-local sections, ported from
//! `original_source/non-standard-hisi_hip08.c`. HIP08 registers this
//! decoder directly; HIP07 and the plain "hisilicon" common decoder reuse
//! the same three section layouts (the module/sub-module name tables are
//! what differs between chip generations, not the wire format).

const VALID_SOC_ID: u32 = 1 << 0;
const VALID_SOCKET_ID: u32 = 1 << 1;
const VALID_NIMBUS_ID: u32 = 1 << 2;
const VALID_MODULE_ID: u32 = 1 << 3;
const VALID_SUB_MODULE_ID: u32 = 1 << 4;
const VALID_ERR_SEVERITY: u32 = 1 << 5;

const MODULE_ID_PLL: u8 = 1;
const MODULE_ID_SLLC: u8 = 2;
const MODULE_ID_SIOE: u8 = 4;
const MODULE_ID_POE: u8 = 5;
const MODULE_ID_DISP: u8 = 8;
const MODULE_ID_SAS: u8 = 15;

const PLL_SUBMODULE: &[&str] = &[
    "TB_PLL0", "TB_PLL1", "TB_PLL2", "TB_PLL3", "TA_PLL0", "TA_PLL1", "TA_PLL2", "TA_PLL3",
    "NIMBUS_PLL0", "NIMBUS_PLL1", "NIMBUS_PLL2", "NIMBUS_PLL3", "NIMBUS_PLL4",
];
const SLLC_SUBMODULE: &[&str] =
    &["TB_SLLC0", "TB_SLLC1", "TB_SLLC2", "TA_SLLC0", "TA_SLLC1", "TA_SLLC2", "NIMBUS_SLLC0", "NIMBUS_SLLC1"];
const SIOE_SUBMODULE: &[&str] = &[
    "TB_SIOE0", "TB_SIOE1", "TB_SIOE2", "TB_SIOE3", "TA_SIOE0", "TA_SIOE1", "TA_SIOE2", "TA_SIOE3", "NIMBUS_SIOE0",
    "NIMBUS_SIOE1",
];
const POE_SUBMODULE: &[&str] = &["TB_POE", "TA_POE"];
const DISP_SUBMODULE: &[&str] = &[
    "TB_PERI_DISP", "TB_POE_DISP", "TB_GIC_DISP", "TA_PERI_DISP", "TA_POE_DISP", "TA_GIC_DISP", "HAC_DISP",
    "PCIE_DISP", "IO_MGMT_DISP", "NETWORK_DISP",
];
const SAS_SUBMODULE: &[&str] = &["SAS0", "SAS1"];

fn module_name(module_id: u8) -> &'static str {
    match module_id {
        MODULE_ID_PLL => "PLL",
        MODULE_ID_SLLC => "SLLC",
        MODULE_ID_SIOE => "SIOE",
        MODULE_ID_POE => "POE",
        MODULE_ID_DISP => "DISP",
        MODULE_ID_SAS => "SAS",
        _ => "UNKNOWN",
    }
}

fn submodule_name(module_id: u8, sub_id: u8) -> String {
    let table: &[&str] = match module_id {
        MODULE_ID_PLL => PLL_SUBMODULE,
        MODULE_ID_SLLC => SLLC_SUBMODULE,
        MODULE_ID_SIOE => SIOE_SUBMODULE,
        MODULE_ID_POE => POE_SUBMODULE,
        MODULE_ID_DISP => DISP_SUBMODULE,
        MODULE_ID_SAS => SAS_SUBMODULE,
        _ => &[],
    };
    table.get(sub_id as usize).map(|s| s.to_string()).unwrap_or_else(|| format!("SUB{sub_id}"))
}

/// Common header shared by the type1 and type2 OEM sections.
pub struct OemSecHead {
    pub val_bits: u32,
    pub version: u8,
    pub soc_id: u8,
    pub socket_id: u8,
    pub nimbus_id: u8,
    pub module_id: u8,
    pub sub_module_id: u8,
    pub err_severity: u8,
}

fn decode_head(head: &OemSecHead) -> String {
    let mut s = String::new();
    if head.val_bits & VALID_SOC_ID != 0 {
        s.push_str(&format!("soc_id={} ", head.soc_id));
    }
    if head.val_bits & VALID_SOCKET_ID != 0 {
        s.push_str(&format!("socket_id={} ", head.socket_id));
    }
    if head.val_bits & VALID_NIMBUS_ID != 0 {
        s.push_str(&format!("nimbus_id={} ", head.nimbus_id));
    }
    if head.val_bits & VALID_MODULE_ID != 0 {
        s.push_str(&format!("module={} ", module_name(head.module_id)));
    }
    if head.val_bits & VALID_SUB_MODULE_ID != 0 {
        s.push_str(&format!("sub_module={} ", submodule_name(head.module_id, head.sub_module_id)));
    }
    if head.val_bits & VALID_ERR_SEVERITY != 0 {
        s.push_str(&format!("severity={} ", head.err_severity));
    }
    s.push_str(&format!("version={}", head.version));
    s
}

/// HISI OEM format1 (module/PLL/SLLC/... IP blocks): up to 5 32-bit misc
/// registers plus a 64-bit error address, each emitted only when present
/// in `val_bits`.
pub struct OemType1Sec {
    pub head: OemSecHead,
    pub err_misc: [u32; 5],
    pub err_addr: u64,
}

const TYPE1_VALID_MISC_BASE: u32 = 1 << 6;
const TYPE1_VALID_ADDR: u32 = 1 << 11;

pub fn decode_oem_type1(sec: &OemType1Sec) -> String {
    let mut s = decode_head(&sec.head);
    for (i, misc) in sec.err_misc.iter().enumerate() {
        if sec.head.val_bits & (TYPE1_VALID_MISC_BASE << i) != 0 {
            s.push_str(&format!(" err_misc_{i}={misc:#x}"));
        }
    }
    if sec.head.val_bits & TYPE1_VALID_ADDR != 0 {
        s.push_str(&format!(" err_addr={:#x}", sec.err_addr));
    }
    s
}

/// HISI OEM format2 (SMMU/HHA/PA/HLLC/DDRC/L3T/L3D IP blocks): paired
/// 32-bit-lo/hi registers for FR, CTRL, STATUS, ADDR and two MISC banks.
pub struct OemType2Sec {
    pub head: OemSecHead,
    pub err_fr: u64,
    pub err_ctrl: u64,
    pub err_status: u64,
    pub err_addr: u64,
    pub err_misc0: u64,
    pub err_misc1: u64,
}

const TYPE2_VALID_FR: u32 = 1 << 6;
const TYPE2_VALID_CTRL: u32 = 1 << 7;
const TYPE2_VALID_STATUS: u32 = 1 << 8;
const TYPE2_VALID_ADDR: u32 = 1 << 9;
const TYPE2_VALID_MISC0: u32 = 1 << 10;
const TYPE2_VALID_MISC1: u32 = 1 << 11;

pub fn decode_oem_type2(sec: &OemType2Sec) -> String {
    let mut s = decode_head(&sec.head);
    if sec.head.val_bits & TYPE2_VALID_FR != 0 {
        s.push_str(&format!(" err_fr={:#x}", sec.err_fr));
    }
    if sec.head.val_bits & TYPE2_VALID_CTRL != 0 {
        s.push_str(&format!(" err_ctrl={:#x}", sec.err_ctrl));
    }
    if sec.head.val_bits & TYPE2_VALID_STATUS != 0 {
        s.push_str(&format!(" err_status={:#x}", sec.err_status));
    }
    if sec.head.val_bits & TYPE2_VALID_ADDR != 0 {
        s.push_str(&format!(" err_addr={:#x}", sec.err_addr));
    }
    if sec.head.val_bits & TYPE2_VALID_MISC0 != 0 {
        s.push_str(&format!(" err_misc_0={:#x}", sec.err_misc0));
    }
    if sec.head.val_bits & TYPE2_VALID_MISC1 != 0 {
        s.push_str(&format!(" err_misc_1={:#x}", sec.err_misc1));
    }
    s
}

/// HISI PCIe Local error section: a fixed header plus up to 33 misc
/// registers (`HISI_PCIE_LOCAL_ERR_MISC_MAX`), each gated by its own
/// validity bit starting at bit 9.
pub struct PcieLocalSec {
    pub val_bits: u64,
    pub version: u8,
    pub socket_id: u8,
    pub core_id: u8,
    pub port_id: u8,
    pub err_severity: u8,
    pub err_type: u16,
    pub err_misc: Vec<u32>,
}

const PCIE_LOCAL_VALID_CORE_ID: u64 = 1 << 5;
const PCIE_LOCAL_VALID_PORT_ID: u64 = 1 << 6;
const PCIE_LOCAL_VALID_ERR_TYPE: u64 = 1 << 7;
const PCIE_LOCAL_VALID_ERR_SEVERITY: u64 = 1 << 8;
const PCIE_LOCAL_VALID_MISC_BASE: u64 = 1 << 9;

pub fn decode_pcie_local(sec: &PcieLocalSec) -> String {
    let mut s = format!("version={} socket_id={}", sec.version, sec.socket_id);
    if sec.val_bits & PCIE_LOCAL_VALID_CORE_ID != 0 {
        s.push_str(&format!(" core_id={}", sec.core_id));
    }
    if sec.val_bits & PCIE_LOCAL_VALID_PORT_ID != 0 {
        s.push_str(&format!(" port_id={}", sec.port_id));
    }
    if sec.val_bits & PCIE_LOCAL_VALID_ERR_TYPE != 0 {
        s.push_str(&format!(" err_type={:#x}", sec.err_type));
    }
    if sec.val_bits & PCIE_LOCAL_VALID_ERR_SEVERITY != 0 {
        s.push_str(&format!(" severity={}", sec.err_severity));
    }
    for (i, misc) in sec.err_misc.iter().enumerate() {
        if sec.val_bits & (PCIE_LOCAL_VALID_MISC_BASE << i) != 0 {
            s.push_str(&format!(" misc[{i}]={misc:#x}"));
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oem_type1_emits_only_valid_fields() {
        let sec = OemType1Sec {
            head: OemSecHead {
                val_bits: VALID_MODULE_ID | VALID_SUB_MODULE_ID,
                version: 1,
                soc_id: 0,
                socket_id: 0,
                nimbus_id: 0,
                module_id: MODULE_ID_SAS,
                sub_module_id: 1,
                err_severity: 0,
            },
            err_misc: [0; 5],
            err_addr: 0,
        };
        let msg = decode_oem_type1(&sec);
        assert!(msg.contains("module=SAS"));
        assert!(msg.contains("sub_module=SAS1"));
        assert!(!msg.contains("err_addr"));
    }

    #[test]
    fn unknown_module_id_falls_back_to_generic_name() {
        assert_eq!(module_name(99), "UNKNOWN");
        assert_eq!(submodule_name(99, 3), "SUB3");
    }
}
