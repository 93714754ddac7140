//! ARM processor-error decoder, ported from
//! `original_source/ras-arm-handler.c`.

use crate::records::{ArmProcessorError, ArmProcessorErrorInfo};

const VALID_ERROR_COUNT: u16 = 1 << 0;
const VALID_FLAGS: u16 = 1 << 1;
const VALID_ERR_INFO: u16 = 1 << 2;
const VALID_VIRT_ADDR: u16 = 1 << 3;
const VALID_PHYSICAL_ADDR: u16 = 1 << 4;

const CACHE_ERROR: u8 = 1 << 1;
const TLB_ERROR: u8 = 1 << 2;
const BUS_ERROR: u8 = 1 << 3;
const VENDOR_ERROR: u8 = 1 << 4;

const ERR_VALID_TRANSACTION_TYPE: u64 = 1 << 0;
const ERR_VALID_OPERATION_TYPE: u64 = 1 << 1;
const ERR_VALID_LEVEL: u64 = 1 << 2;
const ERR_VALID_PROC_CONTEXT_CORRUPT: u64 = 1 << 3;
const ERR_VALID_CORRECTED: u64 = 1 << 4;
const ERR_VALID_PRECISE_PC: u64 = 1 << 5;
const ERR_VALID_RESTARTABLE_PC: u64 = 1 << 6;
const ERR_VALID_PARTICIPATION_TYPE: u64 = 1 << 7;
const ERR_VALID_TIME_OUT: u64 = 1 << 8;
const ERR_VALID_ADDRESS_SPACE: u64 = 1 << 9;
const ERR_VALID_MEM_ATTRIBUTES: u64 = 1 << 10;
const ERR_VALID_ACCESS_MODE: u64 = 1 << 11;

const PROC_ERROR_TYPE_STRS: &[&str] = &["", "cache error", "TLB error", "bus error", "micro-architectural error"];
const PROC_ERROR_FLAGS_STRS: &[&str] = &["first error ", "last error", "propagated error", "overflow"];
const ERR_TRANS_TYPE_STRS: &[&str] = &["Instruction", "Data Access", "Generic"];
const BUS_ERR_OP_STRS: &[&str] = &[
    "Generic error (type cannot be determined)",
    "Generic read (type of instruction or data request cannot be determined)",
    "Generic write (type of instruction of data request cannot be determined)",
    "Data read",
    "Data write",
    "Instruction fetch",
    "Prefetch",
];
const CACHE_ERR_OP_STRS: &[&str] = &[
    "Generic error (type cannot be determined)",
    "Generic read (type of instruction or data request cannot be determined)",
    "Generic write (type of instruction of data request cannot be determined)",
    "Data read",
    "Data write",
    "Instruction fetch",
    "Prefetch",
    "Eviction",
    "Snooping (processor initiated a cache snoop that resulted in an error)",
    "Snooped (processor raised a cache error caused by another processor or device snooping its cache)",
    "Management",
];
const TLB_ERR_OP_STRS: &[&str] = &[
    "Generic error (type cannot be determined)",
    "Generic read (type of instruction or data request cannot be determined)",
    "Generic write (type of instruction of data request cannot be determined)",
    "Data read",
    "Data write",
    "Instruction fetch",
    "Prefetch",
    "Local management operation (processor initiated a TLB management operation that resulted in an error)",
    "External management operation (processor raised a TLB error caused by another processor or device broadcasting TLB operations)",
];
const BUS_ERR_PART_TYPE_STRS: &[&str] =
    &["Local processor originated request", "Local processor responded to request", "Local processor observed", "Generic"];
const BUS_ERR_ADDR_SPACE_STRS: &[&str] =
    &["External Memory Access", "Internal Memory Access", "Unknown", "Device Memory Access"];

/// Appends `" {label}"` for each set bit in `data`, walking `table` by bit
/// index (`decode_err_data_bits`).
fn decode_err_data_bits(out: &mut String, data: u64, table: &[&str]) {
    for (bit, label) in table.iter().enumerate() {
        if data & (1 << bit) != 0 {
            out.push(' ');
            out.push_str(label);
        }
    }
}

/// `is_core_failure`: at least one of bits {0,1,3} set in `flags`, with
/// bit 2 clear.
pub fn is_core_failure(pei: &ArmProcessorErrorInfo) -> bool {
    if pei.validation_bits & VALID_FLAGS == 0 {
        return false;
    }
    (pei.flags & 0xf != 0) && (pei.flags & (1 << 2) == 0)
}

/// GHES severity classes from the kernel's `sev` field (UEFI N2.2 Table N-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhesSeverity {
    No,
    Corrected,
    Recoverable,
    Panic,
}

impl GhesSeverity {
    /// `GHES_SEV_*` from `include/acpi/ghes.h`: 0 = no error, 1 = corrected,
    /// 2 = recoverable, 3 = panic. Anything else folds into `Panic` — the
    /// kernel never emits other values for this field.
    pub fn from_raw(v: u32) -> Self {
        match v {
            0 => GhesSeverity::No,
            1 => GhesSeverity::Corrected,
            2 => GhesSeverity::Recoverable,
            _ => GhesSeverity::Panic,
        }
    }
}

/// `count_errors`: sums each PEI's error count. For `GHES_SEV_CORRECTED`
/// every entry counts unconditionally; for `GHES_SEV_RECOVERABLE` an entry
/// that isn't a core failure contributes zero instead — it still produces
/// a normal record, only the CPU-isolation engine's accounting is
/// suppressed. Callers only invoke this for Corrected/Recoverable events;
/// `No`/`Panic` never reach the CPU engine at all (see `core.rs`).
pub fn count_errors(pei_list: &[ArmProcessorErrorInfo], sev: GhesSeverity) -> u32 {
    let mut total = 0u32;
    for pei in pei_list {
        let mut count = if pei.validation_bits & VALID_ERROR_COUNT != 0 {
            pei.multiple_error as u32 + 1
        } else {
            1
        };
        if sev == GhesSeverity::Recoverable && !is_core_failure(pei) {
            count = 0;
        }
        total += count;
    }
    total
}

fn parse_err_info(out: &mut String, kind: u8, error_info: u64) {
    if kind & VENDOR_ERROR != 0 {
        return;
    }

    if error_info & ERR_VALID_TRANSACTION_TYPE != 0 {
        let trans = ((error_info >> 16) & 0x3) as usize;
        if let Some(label) = ERR_TRANS_TYPE_STRS.get(trans) {
            out.push_str(&format!(" transaction type:{label}"));
        }
    }

    if error_info & ERR_VALID_OPERATION_TYPE != 0 {
        let op = ((error_info >> 18) & 0xf) as usize;
        if kind & CACHE_ERROR != 0 {
            if let Some(label) = CACHE_ERR_OP_STRS.get(op) {
                out.push_str(&format!(" cache error, operation type:{label}"));
            }
        }
        if kind & TLB_ERROR != 0 {
            if let Some(label) = TLB_ERR_OP_STRS.get(op) {
                out.push_str(&format!(" TLB error, operation type: {label}"));
            }
        }
        if kind & BUS_ERROR != 0 {
            if let Some(label) = BUS_ERR_OP_STRS.get(op) {
                out.push_str(&format!(" bus error, operation type: {label}"));
            }
        }
    }

    if error_info & ERR_VALID_LEVEL != 0 {
        let level = (error_info >> 22) & 0x7;
        if kind & CACHE_ERROR != 0 {
            out.push_str(&format!(" cache level: {level}"));
        }
        if kind & TLB_ERROR != 0 {
            out.push_str(&format!(" TLB level: {level}"));
        }
        if kind & BUS_ERROR != 0 {
            out.push_str(&format!(" affinity level at which the bus error occurred: {level}"));
        }
    }

    if error_info & ERR_VALID_PROC_CONTEXT_CORRUPT != 0 {
        let v = (error_info >> 25) & 1;
        out.push_str(if v != 0 { " processor context corrupted" } else { " processor context not corrupted" });
    }

    if error_info & ERR_VALID_CORRECTED != 0 {
        let v = (error_info >> 26) & 1;
        out.push_str(if v != 0 { " the error has been corrected" } else { " the error has not been corrected" });
    }

    if error_info & ERR_VALID_PRECISE_PC != 0 {
        let v = (error_info >> 27) & 1;
        out.push_str(if v != 0 { " PC is precise" } else { " PC is imprecise" });
    }

    if error_info & ERR_VALID_RESTARTABLE_PC != 0 {
        let v = (error_info >> 28) & 1;
        if v != 0 {
            out.push_str(" Program execution can be restartable reliably at the PC");
        }
    }

    if kind != BUS_ERROR {
        return;
    }

    if error_info & ERR_VALID_PARTICIPATION_TYPE != 0 {
        let participation = ((error_info >> 29) & 0x3) as usize;
        if let Some(label) = BUS_ERR_PART_TYPE_STRS.get(participation) {
            out.push_str(&format!(" participation type: {label}"));
        }
    }
    if error_info & ERR_VALID_TIME_OUT != 0 {
        let v = (error_info >> 31) & 1;
        if v != 0 {
            out.push_str(" request timed out");
        }
    }
    if error_info & ERR_VALID_ADDRESS_SPACE != 0 {
        let space = ((error_info >> 32) & 0x3) as usize;
        if let Some(label) = BUS_ERR_ADDR_SPACE_STRS.get(space) {
            out.push_str(&format!(" address space: {label}"));
        }
    }
    if error_info & ERR_VALID_MEM_ATTRIBUTES != 0 {
        let attrs = (error_info >> 34) & 0x1ff;
        out.push_str(&format!(" memory access attributes:{attrs:#x}"));
    }
    if error_info & ERR_VALID_ACCESS_MODE != 0 {
        let v = (error_info >> 43) & 1;
        out.push_str(if v != 0 { " access mode: normal" } else { " access mode: secure" });
    }
}

/// Fills in `rec`'s decoded text fields from its already-populated
/// `processor_error_info` entries (`parse_arm_processor_err_info`).
/// `DecodeError` is the caller's responsibility: this function assumes the
/// PEI byte length was already validated to be a multiple of the PEI
/// struct size before the entries were parsed into `rec.processor_error_info`.
pub fn decode(rec: &mut ArmProcessorError) {
    for pei in &rec.processor_error_info {
        decode_err_data_bits(&mut rec.error_types, pei.kind as u64, PROC_ERROR_TYPE_STRS);

        if pei.validation_bits & VALID_ERROR_COUNT != 0 {
            rec.error_count = pei.multiple_error as u32 + 1;
        }
        if pei.validation_bits & VALID_FLAGS != 0 {
            decode_err_data_bits(&mut rec.error_flags, pei.flags as u64, PROC_ERROR_FLAGS_STRS);
        }
        if pei.validation_bits & VALID_ERR_INFO != 0 {
            rec.error_info_text.push_str(&format!(" error_info: {:#018x}", pei.error_info));
            parse_err_info(&mut rec.error_info_text, pei.kind, pei.error_info);
        }
        if pei.validation_bits & VALID_VIRT_ADDR != 0 {
            rec.virt_fault_addr_text = format!("{:#018x}", pei.virt_fault_addr);
        }
        if pei.validation_bits & VALID_PHYSICAL_ADDR != 0 {
            rec.physical_fault_addr_text = format!("{:#018x}", pei.physical_fault_addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_record() -> ArmProcessorError {
        ArmProcessorError {
            timestamp: String::new(),
            error_count: 0,
            sev: 0,
            affinity: 0,
            mpidr: 0,
            midr: 0,
            running_state: 0,
            psci_state: 0,
            processor_error_info: Vec::new(),
            context_info: Vec::new(),
            vendor_info: Vec::new(),
            error_types: String::new(),
            error_flags: String::new(),
            error_info_text: String::new(),
            virt_fault_addr_text: String::new(),
            physical_fault_addr_text: String::new(),
        }
    }

    /// Scenario S4: one PEI entry, type = cache (0x02), flags = first-error
    /// (0x01), multiple_error = 0 (-> error_count = 1), with transaction
    /// type = Data Access and operation type = Prefetch encoded in
    /// `error_info`. Not counted as a core failure (bit 2 set alongside
    /// bits 0/1/3 clear keeps `is_core_failure` false).
    #[test]
    fn s4_arm_pei_cache_ce() {
        let error_info: u64 = ERR_VALID_TRANSACTION_TYPE
            | ERR_VALID_OPERATION_TYPE
            | (1u64 << 16) // transaction type = Data Access
            | (6u64 << 18); // operation type = Prefetch
        let pei = ArmProcessorErrorInfo {
            version: 0,
            length: 0,
            validation_bits: VALID_ERROR_COUNT | VALID_FLAGS | VALID_ERR_INFO,
            kind: CACHE_ERROR,
            multiple_error: 0,
            flags: 0x01,
            error_info,
            virt_fault_addr: 0,
            physical_fault_addr: 0,
        };
        let mut rec = blank_record();
        rec.processor_error_info.push(pei.clone());
        decode(&mut rec);

        assert_eq!(rec.error_types, " cache error");
        assert_eq!(rec.error_flags, " first error ");
        assert_eq!(rec.error_count, 1);
        assert!(rec.error_info_text.contains("transaction type:Data Access"));
        assert!(rec.error_info_text.contains("cache error, operation type:Prefetch"));
        assert!(!is_core_failure(&pei));
    }

    #[test]
    fn count_errors_suppresses_non_core_recoverable() {
        let pei = ArmProcessorErrorInfo {
            version: 0,
            length: 0,
            validation_bits: VALID_ERROR_COUNT | VALID_FLAGS,
            kind: CACHE_ERROR,
            multiple_error: 3,
            flags: 0x01, // bit0 set, bit2 clear -> core failure
            error_info: 0,
            virt_fault_addr: 0,
            physical_fault_addr: 0,
        };
        assert!(is_core_failure(&pei));
        assert_eq!(count_errors(&[pei.clone()], GhesSeverity::Recoverable), 4);

        let non_core = ArmProcessorErrorInfo { flags: 0x04, ..pei };
        assert!(!is_core_failure(&non_core));
        assert_eq!(count_errors(&[non_core], GhesSeverity::Recoverable), 0);
    }
}
