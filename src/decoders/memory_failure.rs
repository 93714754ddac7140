//! Memory-failure (`mm/memory-failure.c`) decoder, ported from
//! `original_source/ras-memory-failure-handler.c`.

use crate::records::MemoryFailure;

/// `mf_page_type[]`, keyed by the kernel's `enum mf_action_page_type`.
const PAGE_TYPES: &[&str] = &[
    "reserved kernel page",
    "high-order kernel page",
    "kernel slab page",
    "different compound page after locking",
    "huge page already hardware poisoned",
    "huge page",
    "free huge page",
    "non-pmd-sized huge page",
    "unmapping failed page",
    "dirty swapcache page",
    "clean swapcache page",
    "dirty mlocked LRU page",
    "clean mlocked LRU page",
    "dirty unevictable LRU page",
    "clean unevictable LRU page",
    "dirty LRU page",
    "clean LRU page",
    "already truncated LRU page",
    "free buddy page",
    "free buddy page (2nd try)",
    "dax page",
    "unsplit thp",
    "unknown page",
];

pub fn get_page_type(page_type: u32) -> &'static str {
    PAGE_TYPES.get(page_type as usize).copied().unwrap_or("unknown page")
}

/// `mf_action_result[]`, keyed by `enum mf_action_result`.
const ACTION_RESULTS: &[&str] = &["Ignored", "Failed", "Delayed", "Recovered"];

pub fn get_action_result(result: u32) -> &'static str {
    ACTION_RESULTS.get(result as usize).copied().unwrap_or("unknown")
}

pub struct RawMemoryFailureEvent {
    pub pfn: u64,
    pub page_type: u32,
    pub result: u32,
}

pub fn decode(event: RawMemoryFailureEvent, timestamp: String) -> MemoryFailure {
    MemoryFailure {
        timestamp,
        pfn: event.pfn,
        page_type: get_page_type(event.page_type).to_string(),
        action_result: get_action_result(event.result).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovered_huge_page() {
        let event = RawMemoryFailureEvent { pfn: 0x1234, page_type: 5, result: 3 };
        let record = decode(event, "now".to_string());
        assert_eq!(record.page_type, "huge page");
        assert_eq!(record.action_result, "Recovered");
    }

    #[test]
    fn out_of_range_falls_back_to_unknown() {
        assert_eq!(get_page_type(999), "unknown page");
        assert_eq!(get_action_result(999), "unknown");
    }
}
