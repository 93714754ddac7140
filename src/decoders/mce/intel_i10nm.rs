//! Intel i10nm / Granite Rapids integrated memory controller decoder,
//! decoding `misc` into column/row/bank/bankgroup/rank fields.

use crate::bitfield::extract_unchecked as extract;
use crate::records::MachineCheck;

use super::MceEvent;

/// ECC mode encoding carried in `misc[61:60]` on i10nm-family IMCs.
const ECC_MODE: &[&str] = &["no ecc", "SECDED", "ADDDC", "reserved"];

pub fn decode(event: &MceEvent, rec: &mut MachineCheck) {
    // Only the integrated-memory-controller banks (13-18) carry this
    // layout; other banks on these CPU types are handled by
    // `intel_skylake_x` for the uncore-shared bank numbering.
    if !(13..=18).contains(&event.bank) {
        return;
    }

    let misc = event.misc;
    let transient = extract(misc, 56, 56) != 0;
    let column = extract(misc, 0, 9);
    let row = extract(misc, 10, 26);
    let bank = extract(misc, 27, 30);
    let bank_group = extract(misc, 31, 32);
    let subrank = extract(misc, 33, 35);
    let rank = extract(misc, 36, 38);
    let ecc_mode = ECC_MODE[extract(misc, 60, 61) as usize];

    let mut loc = format!(
        "column={column},row={row},bank={bank},bank_group={bank_group},subrank={subrank},rank={rank},ecc_mode={ecc_mode}"
    );
    if !transient {
        let failed_device = extract(misc, 39, 42);
        loc.push_str(&format!(",failed_device={failed_device}"));
    } else {
        loc.push_str(",transient=1");
    }

    if rec.location_msg.is_empty() {
        rec.location_msg = loc;
    } else {
        rec.location_msg.push(' ');
        rec.location_msg.push_str(&loc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_event() -> MceEvent {
        MceEvent { mcgcap: 0, mcgstatus: 0, status: 0, addr: 0, misc: 0, ip: 0, tsc: 0, walltime: 0, cpu: 0, cpuid: 0, apicid: 0, socketid: 0, bank: 13, microcode: 0 }
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

    #[test]
    fn non_imc_bank_is_untouched() {
        let event = MceEvent { bank: 4, ..blank_event() };
        let mut rec = blank_record();
        decode(&event, &mut rec);
        assert!(rec.location_msg.is_empty());
    }

    #[test]
    fn transient_flag_suppresses_failed_device() {
        let event = MceEvent { bank: 13, misc: 1 << 56, ..blank_event() };
        let mut rec = blank_record();
        decode(&event, &mut rec);
        assert!(rec.location_msg.contains("transient=1"));
        assert!(!rec.location_msg.contains("failed_device"));
    }
}
