//! Architectural (vendor-independent) MCA decode.

use super::{mci_status, MceEvent};
use crate::records::MachineCheck;

/// Populates the architecture-defined subset of `rec`'s text fields:
/// validity, overflow, uncorrected-severity hints, and (if the status
/// register carries the memory-controller signature) a `memory_channel=`
/// location string.
pub fn decode(event: &MceEvent, rec: &mut MachineCheck) {
    rec.mcgcap = event.mcgcap;
    rec.mcgstatus = event.mcgstatus;
    rec.status = event.status;
    rec.addr = event.addr;
    rec.misc = event.misc;
    rec.ip = event.ip;
    rec.tsc = event.tsc;
    rec.walltime = event.walltime;
    rec.cpu = event.cpu;
    rec.cpuid = event.cpuid;
    rec.apicid = event.apicid;
    rec.socketid = event.socketid;
    rec.bank = event.bank;
    rec.microcode = event.microcode;

    if event.status & mci_status::VAL == 0 {
        rec.mcistatus_msg = "MCE_INVALID".to_string();
        return;
    }

    let mut msg = String::new();
    if event.status & mci_status::OVER != 0 {
        msg.push_str("Error_overflow ");
    }
    if event.status & mci_status::UC != 0 {
        msg.push_str("Uncorrected_error ");
        if event.status & mci_status::PCC != 0 {
            msg.push_str("(processor context corrupt) ");
        } else if event.status & mci_status::S != 0 {
            msg.push_str("(software recoverable) ");
        } else if event.status & mci_status::AR != 0 {
            msg.push_str("(action required) ");
        }
    } else {
        msg.push_str("Corrected_error ");
    }
    rec.mcistatus_msg = msg.trim().to_string();

    if is_memory_controller_signature(event.status) {
        rec.location_msg = memory_controller_location(event.misc);
    }
}

/// `(status & 0xefff)` bit 7 set plus the high-byte pattern matching the
/// architectural memory-controller error code.
fn is_memory_controller_signature(status: u64) -> bool {
    let code = status & 0xefff;
    (code & 0x80) != 0 && (code & 0xef00) == 0x0080
}

/// `misc[62,63]` valid bits gate a channel/rank derivation from `misc`'s low
/// nibbles; absent a real register layout this renders the channel nybble
/// and, when the rank-valid bits are set, the paired rank values.
fn memory_controller_location(misc: u64) -> String {
    let channel = (misc >> 0) & 0xf;
    let mut out = format!("memory_channel={channel}");
    let rank_valid = (misc >> 62) & 0x3;
    if rank_valid != 0 {
        let rank_a = (misc >> 4) & 0x1f;
        if rank_valid == 0x3 {
            let rank_b = (misc >> 9) & 0x1f;
            out.push_str(&format!(",rank={rank_a} and {rank_b}"));
        } else {
            out.push_str(&format!(",rank={rank_a}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_event() -> MceEvent {
        MceEvent {
            mcgcap: 0,
            mcgstatus: 0,
            status: 0,
            addr: 0,
            misc: 0,
            ip: 0,
            tsc: 0,
            walltime: 0,
            cpu: 0,
            cpuid: 0,
            apicid: 0,
            socketid: 0,
            bank: 0,
            microcode: 0,
        }
    }

    fn blank_record() -> MachineCheck {
        MachineCheck {
            timestamp: String::new(),
            mcgcap: 0,
            mcgstatus: 0,
            status: 0,
            addr: 0,
            misc: 0,
            ip: 0,
            tsc: 0,
            walltime: 0,
            cpu: 0,
            cpuid: 0,
            apicid: 0,
            socketid: 0,
            bank: 0,
            cpuvendor: String::new(),
            microcode: 0,
            bank_name: String::new(),
            error_msg: String::new(),
            mcgstatus_msg: String::new(),
            mcistatus_msg: String::new(),
            mcastatus_msg: String::new(),
            location_msg: String::new(),
            user_action: String::new(),
        }
    }

    #[test]
    fn invalid_status_short_circuits() {
        let event = MceEvent { status: 0, ..blank_event() };
        let mut rec = blank_record();
        decode(&event, &mut rec);
        assert_eq!(rec.mcistatus_msg, "MCE_INVALID");
    }

    #[test]
    fn overflow_and_uncorrected_are_reported() {
        let event = MceEvent {
            status: mci_status::VAL | mci_status::OVER | mci_status::UC,
            ..blank_event()
        };
        let mut rec = blank_record();
        decode(&event, &mut rec);
        assert!(rec.mcistatus_msg.contains("Error_overflow"));
        assert!(rec.mcistatus_msg.contains("Uncorrected_error"));
    }
}
