//! Row-offline remediation engine, ported from
//! `original_source/ras-page-isolation.c`'s "memory row CE threshold
//! policy". Unlike the page engine, a row's identity and its accumulated
//! count both come from parsing `driver_detail` (the `mc_event` tracepoint's
//! free-text field) rather than from a flat address.

use tracing::{error, info};

use crate::config::Action;

const SAME_PAGE_IN_ROW: usize = 200;

/// Which location-field schema `driver_detail` used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    /// `"APEI location: node:.. card:.. module:.. rank:.. device:.. bank:.. row:.."`.
    Ghes,
    /// `"ProcessorSocketId:.. MemoryControllerId:.. ChannelId:.. DimmSlotId:.. PhysicalRankId:.. ChipId:.. BankGroup:.. Bank:.. Row:.."`.
    Dsm,
}

const APEI_FIELDS: &[&str] = &["node:", "card:", "module:", "rank:", "device:", "bank:", "row:"];
const DSM_FIELDS: &[&str] = &[
    "ProcessorSocketId:",
    "MemoryControllerId:",
    "ChannelId:",
    "DimmSlotId:",
    "PhysicalRankId:",
    "ChipId:",
    "BankGroup:",
    "Bank:",
    "Row:",
];

/// A row's identity: its schema plus the decimal (GHES) or hex (DSM) value
/// of every field in that schema, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowId {
    pub kind: LocationKind,
    pub fields: Vec<i64>,
}

/// `parse_row_info()`. Returns `None` if `detail` matches neither schema or
/// is missing a field the matched schema requires.
pub fn parse_row_info(detail: &str) -> Option<RowId> {
    let (kind, anchors, base): (_, _, u32) = if detail.contains("APEI location") {
        (LocationKind::Ghes, APEI_FIELDS, 10)
    } else if detail.contains("ProcessorSocketId:") {
        (LocationKind::Dsm, DSM_FIELDS, 16)
    } else {
        return None;
    };

    let mut fields = Vec::with_capacity(anchors.len());
    for anchor in anchors {
        let pos = detail.find(anchor)?;
        let rest = &detail[pos + anchor.len()..];
        let digits_end = rest
            .find(|c: char| !(c.is_ascii_hexdigit() || c == '-'))
            .unwrap_or(rest.len());
        let token = rest[..digits_end].trim();
        let value = i64::from_str_radix(token, base).ok()?;
        fields.push(value);
    }
    Some(RowId { kind, fields })
}

struct PageAddr {
    addr: u64,
    start: u64,
    count: u64,
    offlined: bool,
}

struct RowRecord {
    id: RowId,
    start: u64,
    count: u64,
    pages: Vec<PageAddr>,
}

pub struct RowEngine {
    action: Action,
    threshold: u64,
    cycle_secs: u64,
    rows: Vec<RowRecord>,
}

impl RowEngine {
    pub fn new(action: Action, threshold: u64, cycle_secs: u64) -> Self {
        RowEngine { action, threshold, cycle_secs, rows: Vec::new() }
    }

    /// `ras_record_row_error()`.
    pub fn record_row_error(&mut self, detail: &str, count: u32, addr: u64, now: u64) {
        if self.action == Action::Off {
            return;
        }
        let Some(id) = parse_row_info(detail) else {
            info!("cannot parse memory row info from CE detail: {detail}");
            return;
        };

        let idx = match self.rows.iter().position(|r| r.id == id) {
            Some(idx) => idx,
            None => {
                self.rows.push(RowRecord { id, start: now, count: 0, pages: Vec::new() });
                self.rows.len() - 1
            }
        };
        let page_addr = addr & !(4096u64 - 1);
        {
            let row = &mut self.rows[idx];
            row.pages.push(PageAddr { addr: page_addr, start: now, count: count as u64, offlined: false });
            row.count += count as u64;
        }

        self.evaluate(idx, now);
    }

    /// `row_record()`: trims the page list from the head on cycle rollover,
    /// then offlines the row's pages if the (possibly trimmed) count meets
    /// threshold.
    fn evaluate(&mut self, idx: usize, now: u64) {
        let row = &mut self.rows[idx];
        if now.saturating_sub(row.start) > self.cycle_secs {
            while let Some(first) = row.pages.first() {
                if now.saturating_sub(first.start) <= self.cycle_secs {
                    break;
                }
                row.count = row.count.saturating_sub(row.pages.remove(0).count);
            }
            row.start = row.pages.first().map(|p| p.start).unwrap_or(now);
        }

        if row.count >= self.threshold {
            info!("corrected errors of row {:?} exceeded row CE threshold, count={}", row.id, row.count);
            row_offline(row, self.action);
        }
    }
}

/// `row_offline()`: dedups addresses already offlined earlier in this pass
/// (bounded to [`SAME_PAGE_IN_ROW`] entries, matching the original's fixed
/// stack buffer) before writing to sysfs for the rest.
fn row_offline(row: &mut RowRecord, action: Action) {
    if matches!(action, Action::Off | Action::Account) {
        info!("row action {action:?}, not offlining row {:?}", row.id);
        return;
    }

    let mut seen: Vec<u64> = Vec::with_capacity(SAME_PAGE_IN_ROW);
    for page in &mut row.pages {
        if page.offlined {
            if seen.len() < SAME_PAGE_IN_ROW {
                seen.push(page.addr);
            }
            continue;
        }
        if seen.contains(&page.addr) {
            page.offlined = true;
            continue;
        }

        let ok = super::page::write_offline_for_action(page.addr, action);
        page.offlined = ok;
        if !ok {
            error!("offlining page {:#x} of row {:?} failed", page.addr, row.id);
        }
        if ok && seen.len() < SAME_PAGE_IN_ROW {
            seen.push(page.addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ghes_location() {
        let id = parse_row_info("APEI location: node:0 card:1 module:2 rank:3 device:4 bank:5 row:6").unwrap();
        assert_eq!(id.kind, LocationKind::Ghes);
        assert_eq!(id.fields, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn parses_dsm_location_as_hex() {
        let detail = "ProcessorSocketId:1 MemoryControllerId:0 ChannelId:a DimmSlotId:0 PhysicalRankId:0 ChipId:0 BankGroup:0 Bank:0 Row:ff";
        let id = parse_row_info(detail).unwrap();
        assert_eq!(id.kind, LocationKind::Dsm);
        assert_eq!(id.fields[2], 0xa);
        assert_eq!(*id.fields.last().unwrap(), 0xff);
    }

    #[test]
    fn unrecognized_detail_returns_none() {
        assert!(parse_row_info("nothing useful here").is_none());
    }

    /// Repeated corrected errors in the same row (distinct
    /// addresses) accumulate and cross the row threshold.
    #[test]
    fn same_row_different_pages_accumulate() {
        let mut engine = RowEngine::new(Action::Account, 3, 3600);
        let detail = "APEI location: node:0 card:0 module:0 rank:0 device:0 bank:0 row:0";
        engine.record_row_error(detail, 1, 0x1000, 1);
        engine.record_row_error(detail, 1, 0x2000, 2);
        assert_eq!(engine.rows[0].count, 2);
        engine.record_row_error(detail, 1, 0x3000, 3);
        assert_eq!(engine.rows.len(), 1);
        assert_eq!(engine.rows[0].count, 3);
    }

    #[test]
    fn different_rows_tracked_independently() {
        let mut engine = RowEngine::new(Action::Account, 100, 3600);
        let a = "APEI location: node:0 card:0 module:0 rank:0 device:0 bank:0 row:0";
        let b = "APEI location: node:0 card:0 module:0 rank:0 device:0 bank:0 row:1";
        engine.record_row_error(a, 1, 0x1000, 1);
        engine.record_row_error(b, 1, 0x2000, 1);
        assert_eq!(engine.rows.len(), 2);
    }
}
