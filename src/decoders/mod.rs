//! Decoder library: one module per (vendor, family, bank) or
//! non-MCA event kind. Every decoder is a pure function from a raw,
//! already-field-extracted event to a [`crate::records::Record`] plus
//! (where the original emits one) a textual rendering; none of them touch
//! persistence, remediation, or the kernel.

pub mod aer;
pub mod arm;
pub mod cpu_id;
pub mod cxl;
pub mod devlink;
pub mod disk;
pub mod extlog;
pub mod mc;
pub mod mce;
pub mod memory_failure;
pub mod nonstandard;
