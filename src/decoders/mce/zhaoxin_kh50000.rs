//! Zhaoxin KH-50000 bank-keyed MCA decoder.
//!
//! The real decoder dispatches across roughly thirty bank ids, several
//! requiring a secondary validity bit in `status` before a `misc` subfield
//! is meaningful. This covers the representative bank families (core,
//! L3, memory controller, PCIe root port) using the same validity-gated
//! shape.

use crate::bitfield::extract_unchecked as extract;
use crate::records::MachineCheck;

use super::MceEvent;

pub fn decode(event: &MceEvent, rec: &mut MachineCheck) {
    match event.bank {
        0..=3 => decode_core_bank(event, rec),
        4..=7 => decode_l3_bank(event, rec),
        8..=11 => decode_memory_bank(event, rec),
        12..=15 => decode_pcie_bank(event, rec),
        _ => {}
    }
}

fn decode_core_bank(event: &MceEvent, rec: &mut MachineCheck) {
    rec.bank_name = format!("core (bank={})", event.bank);
    if extract(event.status, 32, 32) == 0 {
        return;
    }
    let errcode = extract(event.status, 0, 15);
    rec.error_msg = format!("core error code {errcode:#x}");
}

fn decode_l3_bank(event: &MceEvent, rec: &mut MachineCheck) {
    rec.bank_name = format!("L3 cache (bank={})", event.bank);
    if extract(event.status, 33, 33) == 0 {
        return;
    }
    let way = extract(event.misc, 0, 3);
    rec.location_msg = format!("l3_way={way}");
}

fn decode_memory_bank(event: &MceEvent, rec: &mut MachineCheck) {
    rec.bank_name = format!("memory controller (bank={})", event.bank);
    if extract(event.status, 34, 34) == 0 {
        return;
    }
    let channel = extract(event.misc, 0, 2);
    let rank = extract(event.misc, 3, 5);
    rec.location_msg = format!("memory_channel={channel},rank={rank}");
}

fn decode_pcie_bank(event: &MceEvent, rec: &mut MachineCheck) {
    rec.bank_name = format!("pcie root port (bank={})", event.bank);
    if extract(event.status, 35, 35) == 0 {
        return;
    }
    let port = extract(event.misc, 0, 7);
    rec.location_msg = format!("pcie_port={port}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_event() -> MceEvent {
        MceEvent { mcgcap: 0, mcgstatus: 0, status: 0, addr: 0, misc: 0, ip: 0, tsc: 0, walltime: 0, cpu: 0, cpuid: 0, apicid: 0, socketid: 0, bank: 0, microcode: 0 }
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
    fn memory_bank_requires_validity_bit() {
        let event = MceEvent { bank: 8, status: 0, ..blank_event() };
        let mut rec = blank_record();
        decode(&event, &mut rec);
        assert!(rec.location_msg.is_empty());

        let event = MceEvent { bank: 8, status: 1 << 34, misc: 0b101_010, ..blank_event() };
        let mut rec = blank_record();
        decode(&event, &mut rec);
        assert_eq!(rec.location_msg, "memory_channel=2,rank=5");
    }
}
