//! Intel Skylake-X / Sapphire Rapids uncore bank decoder, ported from
//! `original_source/mce-intel-skylake-xeon.c` (IA32 SDM Vol3B Table 16-27).

use super::MceEvent;
use crate::bitfield::extract_unchecked as extract;
use crate::records::MachineCheck;

/// PCU (bank 4) error codes at `status[31:24]`, IA32 SDM Vol3B Table 16-27.
const PCU_1: &[(u8, &str)] = &[
    (0x00, "No Error"),
    (0x0d, "MCA_DMI_TRAINING_TIMEOUT"),
    (0x0f, "MCA_DMI_CPU_RESET_ACK_TIMEOUT"),
    (0x10, "MCA_MORE_THAN_ONE_LT_AGENT"),
    (0x1e, "MCA_BIOS_RST_CPL_INVALID_SEQ"),
    (0x1f, "MCA_BIOS_INVALID_PKG_STATE_CONFIG"),
    (0x25, "MCA_MESSAGE_CHANNEL_TIMEOUT"),
    (0x27, "MCA_MSGCH_PMREQ_CMP_TIMEOUT"),
    (0x30, "MCA_PKGC_DIRECT_WAKE_RING_TIMEOUT"),
    (0x31, "MCA_PKGC_INVALID_RSP_PCH"),
    (0x33, "MCA_PKGC_WATCHDOG_HANG_CBZ_DOWN"),
    (0x34, "MCA_PKGC_WATCHDOG_HANG_CBZ_UP"),
    (0x38, "MCA_PKGC_WATCHDOG_HANG_C3_UP_SF"),
    (0x40, "MCA_SVID_VCCIN_VR_ICC_MAX_FAILURE"),
    (0x41, "MCA_SVID_COMMAND_TIMEOUT"),
    (0x42, "MCA_SVID_VCCIN_VR_VOUT_FAILURE"),
    (0x43, "MCA_SVID_CPU_VR_CAPABILITY_ERROR"),
    (0x44, "MCA_SVID_CRITICAL_VR_FAILED"),
    (0x45, "MCA_SVID_SA_ITD_ERROR"),
    (0x46, "MCA_SVID_READ_REG_FAILED"),
    (0x47, "MCA_SVID_WRITE_REG_FAILED"),
    (0x48, "MCA_SVID_PKGC_INIT_FAILED"),
    (0x49, "MCA_SVID_PKGC_CONFIG_FAILED"),
    (0x4a, "MCA_SVID_PKGC_REQUEST_FAILED"),
    (0x4b, "MCA_SVID_IMON_REQUEST_FAILED"),
    (0x4c, "MCA_SVID_ALERT_REQUEST_FAILED"),
    (0x4d, "MCA_SVID_MCP_VR_ABSENT_OR_RAMP_ERROR"),
    (0x4e, "MCA_SVID_UNEXPECTED_MCP_VR_DETECTED"),
    (0x51, "MCA_FIVR_CATAS_OVERVOL_FAULT"),
    (0x52, "MCA_FIVR_CATAS_OVERCUR_FAULT"),
    (0x58, "MCA_WATCHDOG_TIMEOUT_PKGC_SLAVE"),
    (0x59, "MCA_WATCHDOG_TIMEOUT_PKGC_MASTER"),
    (0x5a, "MCA_WATCHDOG_TIMEOUT_PKGS_MASTER"),
    (0x61, "MCA_PKGS_CPD_UNCPD_TIMEOUT"),
    (0x63, "MCA_PKGS_INVALID_REQ_PCH"),
    (0x64, "MCA_PKGS_INVALID_REQ_INTERNAL"),
    (0x65, "MCA_PKGS_INVALID_RSP_INTERNAL"),
    (0x6b, "MCA_PKGS_SMBUS_VPP_PAUSE_TIMEOUT"),
    (0x81, "MCA_RECOVERABLE_DIE_THERMAL_TOO_HOT"),
];

fn pcu_1_lookup(code: u64) -> Option<&'static str> {
    PCU_1.iter().find(|(k, _)| *k as u64 == code).map(|(_, v)| *v)
}

pub fn decode(event: &MceEvent, rec: &mut MachineCheck) {
    let status = event.status;

    match event.bank {
        4 => {
            let mca = extract(status, 0, 15) & !(1 << 12);
            match mca {
                0x402 | 0x403 => rec.mcastatus_msg.push_str("Internal errors "),
                0x406 => rec.mcastatus_msg.push_str("Intel TXT errors "),
                0x407 => rec.mcastatus_msg.push_str("Other UBOX Internal errors "),
                _ => {}
            }
            if extract(status, 16, 19) != 0 {
                rec.mcastatus_msg.push_str("PCU internal error ");
            }
            let code = extract(status, 24, 31);
            if let Some(label) = pcu_1_lookup(code) {
                rec.mcastatus_msg.push_str(label);
            }
        }
        5 | 12 | 19 => {
            rec.mcastatus_msg.push_str("UPI: ");
        }
        7 | 8 => {
            rec.mcastatus_msg.push_str("M2M: ");
        }
        13..=18 => {
            rec.mcastatus_msg.push_str("MemCtrl: ");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_event() -> MceEvent {
        MceEvent { mcgcap: 0, mcgstatus: 0, status: 0, addr: 0, misc: 0, ip: 0, tsc: 0, walltime: 0, cpu: 0, cpuid: 0, apicid: 0, socketid: 0, bank: 4, microcode: 0 }
    }

    fn blank_record() -> MachineCheck {
        MachineCheck {
            timestamp: String::new(), mcgcap: 0, mcgstatus: 0, status: 0, addr: 0, misc: 0, ip: 0, tsc: 0,
            walltime: 0, cpu: 0, cpuid: 0, apicid: 0, socketid: 0, bank: 0, cpuvendor: String::new(),
            microcode: 0, bank_name: String::new(), error_msg: String::new(), mcgstatus_msg: String::new(),
            mcistatus_msg: String::new(), mcastatus_msg: String::new(), location_msg: String::new(),
            user_action: String::new(),
        }
    }

    /// Scenario S2: bank 4, `status = 0x88000000_4100_0402`.
    #[test]
    fn s2_skylake_x_pcu_internal_error() {
        let status = 0x8800_0000_4100_0402u64;
        let event = MceEvent { status, bank: 4, ..blank_event() };
        let mut rec = blank_record();
        decode(&event, &mut rec);
        assert!(rec.mcastatus_msg.contains("Internal errors"));
        assert!(rec.mcastatus_msg.contains("MCA_SVID_COMMAND_TIMEOUT"));
    }
}
