//! Machine-check decoder dispatch.
//!
//! Each sub-decoder receives a fully-populated [`MceEvent`] and a resolved
//! [`CpuType`], and writes into a [`MachineCheck`] record's text fields. The
//! registry here is a read-only, build-time dispatch table — built once at
//! startup from the CPU type detected for this host, never mutated
//! afterwards.

pub mod amd_k8;
pub mod amd_smca;
pub mod generic;
pub mod intel_i10nm;
pub mod intel_skylake_x;
pub mod zhaoxin_kh50000;

use crate::decoders::cpu_id::CpuType;
use crate::records::MachineCheck;

/// Raw fields of one machine-check trace event.
#[derive(Debug, Clone, Copy)]
pub struct MceEvent {
    pub mcgcap: u64,
    pub mcgstatus: u64,
    pub status: u64,
    pub addr: u64,
    pub misc: u64,
    pub ip: u64,
    pub tsc: u64,
    pub walltime: u64,
    pub cpu: u32,
    pub cpuid: u32,
    pub apicid: u32,
    pub socketid: u32,
    pub bank: u32,
    pub microcode: u32,
}

/// MCI_STATUS bit layout shared by every vendor (architecture-defined).
pub mod mci_status {
    pub const VAL: u64 = 1 << 63;
    pub const OVER: u64 = 1 << 62;
    pub const UC: u64 = 1 << 61;
    pub const EN: u64 = 1 << 60;
    pub const MISCV: u64 = 1 << 59;
    pub const ADDRV: u64 = 1 << 58;
    pub const PCC: u64 = 1 << 57;
    pub const S: u64 = 1 << 56;
    pub const AR: u64 = 1 << 55;
}

/// Decodes `event` for `bank` on `cpu_type` into `rec`'s text fields.
/// Falls back to [`generic::decode`] for CPU types without a dedicated
/// sub-decoder (Unknown, or vendor families this build doesn't special-case
/// beyond the architectural baseline).
pub fn decode(cpu_type: CpuType, event: &MceEvent, cpuvendor: &str, rec: &mut MachineCheck) {
    generic::decode(event, rec);

    match cpu_type {
        CpuType::AmdK8 => amd_k8::decode(event, rec),
        CpuType::AmdScalableMca => amd_smca::decode(event, rec),
        CpuType::SkylakeX | CpuType::SapphireRapids => intel_skylake_x::decode(event, rec),
        CpuType::IcelakeX | CpuType::IcelakeDe | CpuType::TremontD | CpuType::GraniteRapids => {
            intel_skylake_x::decode(event, rec);
            intel_i10nm::decode(event, rec);
        }
        CpuType::ZhaoxinKh50000 => zhaoxin_kh50000::decode(event, rec),
        _ => {}
    }

    rec.cpuvendor = cpuvendor.to_string();
}
