//! Block-layer disk error decoder, ported from
//! `original_source/ras-diskerror-handler.c`.

use crate::records::DiskError;

const MINORBITS: u32 = 20;
const MINORMASK: u32 = (1 << MINORBITS) - 1;

/// `MAJOR(dev)` / `MINOR(dev)`, the kernel's post-2.6 `dev_t` encoding.
pub fn major(dev: u32) -> u32 {
    dev >> MINORBITS
}

pub fn minor(dev: u32) -> u32 {
    dev & MINORMASK
}

/// `blk_errors[]`: negative `errno` values mapped to their block-layer
/// description (`get_blk_error`).
const BLK_ERRORS: &[(i32, &str)] = &[
    (-libc_errno::EOPNOTSUPP, "operation not supported error"),
    (-libc_errno::ETIMEDOUT, "timeout error"),
    (-libc_errno::ENOSPC, "critical space allocation error"),
    (-libc_errno::ENOLINK, "recoverable transport error"),
    (-libc_errno::EREMOTEIO, "critical target error"),
    (-libc_errno::EBADE, "critical nexus error"),
    (-libc_errno::ENODATA, "critical medium error"),
    (-libc_errno::EILSEQ, "protection error"),
    (-libc_errno::ENOMEM, "kernel resource error"),
    (-libc_errno::EBUSY, "device resource error"),
    (-libc_errno::EAGAIN, "nonblocking retry error"),
    (-libc_errno::EREMCHG, "dm internal retry error"),
    (-libc_errno::EIO, "I/O error"),
];

/// The subset of `<errno.h>` values `blk_errors[]` references, inlined so
/// this module doesn't need a libc binding just for a dozen constants.
mod libc_errno {
    pub const EIO: i32 = 5;
    pub const EAGAIN: i32 = 11;
    pub const EBUSY: i32 = 16;
    pub const ENODATA: i32 = 61;
    pub const ENOSPC: i32 = 28;
    pub const ENOMEM: i32 = 12;
    pub const EREMOTEIO: i32 = 121;
    pub const EILSEQ: i32 = 84;
    pub const ENOLINK: i32 = 67;
    pub const EBADE: i32 = 52;
    pub const ETIMEDOUT: i32 = 110;
    pub const EOPNOTSUPP: i32 = 95;
    pub const EREMCHG: i32 = 78;
}

pub fn get_blk_error(err: i32) -> &'static str {
    BLK_ERRORS.iter().find(|(code, _)| *code == err).map(|(_, name)| *name).unwrap_or("unknown block error")
}

pub struct RawDiskErrorEvent {
    pub dev: u32,
    pub sector: u64,
    pub nr_sector: u32,
    pub error: i32,
    pub rwbs: String,
    pub command: String,
}

pub fn decode(event: RawDiskErrorEvent, timestamp: String) -> DiskError {
    DiskError {
        timestamp,
        dev: format!("{}:{}", major(event.dev), minor(event.dev)),
        sector: event.sector,
        nr_sector: event.nr_sector,
        error: get_blk_error(event.error).to_string(),
        rwbs: event.rwbs,
        command: event.command,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mkdev(maj: u32, min: u32) -> u32 {
        (maj << MINORBITS) | min
    }

    /// Scenario S6: `dev = MKDEV(8,16)`, `sector = 100`, `nr_sector = 8`,
    /// `error = -ENOSPC` → `dev = "8:16"`, `error = "critical space
    /// allocation error"`.
    #[test]
    fn s6_disk_error_enospc() {
        let event = RawDiskErrorEvent {
            dev: mkdev(8, 16),
            sector: 100,
            nr_sector: 8,
            error: -libc_errno::ENOSPC,
            rwbs: "W".to_string(),
            command: "fio".to_string(),
        };
        let record = decode(event, "now".to_string());
        assert_eq!(record.dev, "8:16");
        assert_eq!(record.error, "critical space allocation error");
    }

    #[test]
    fn unknown_error_code_falls_back() {
        assert_eq!(get_blk_error(-9999), "unknown block error");
    }
}
