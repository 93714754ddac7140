//! Persistence façade, ported from
//! `original_source/ras-record.c`. Backed by `rusqlite`: its bundled SQLite
//! plus `prepare_cached` gives a prepared statement per (event-kind,
//! schema-version) almost for free.
//!
//! `open`/`close` are reference-counted so the fallback per-CPU ingestion
//! mode can call `open` once per task without tearing the store
//! down until the last task releases it. All access — including
//! individual `insert_*` calls that may run unsynchronized against
//! a "serialized" store — goes through one [`std::sync::Mutex`], because a
//! single `rusqlite::Connection` is not `Sync`; SQLite's own serialized
//! threading mode and this mutex are complementary, not redundant.

mod schema;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use tracing::{error, info, warn};

use crate::records::Record;
use schema::{ColumnType, TableSchema, BUILTIN_TABLES};

struct Inner {
    conn: Option<Connection>,
    refcount: usize,
    vendor_tables: Vec<String>,
}

/// The core's persistence façade. One instance is owned by [`crate::core::Core`]
/// and shared (via `Arc`) with every ingestion task.
pub struct Persistence {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl Persistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Persistence {
            path: path.as_ref().to_path_buf(),
            inner: Mutex::new(Inner { conn: None, refcount: 0, vendor_tables: Vec::new() }),
        }
    }

    /// Idempotent per process; reference-counted. The first
    /// call opens the database and creates every built-in table; later
    /// calls (from the fallback ingestion mode's N tasks) just bump the
    /// refcount.
    pub fn open(&self) -> rusqlite::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.conn.is_none() {
            let conn = Connection::open(&self.path)?;
            for table in BUILTIN_TABLES {
                if let Err(e) = ensure_table(&conn, table) {
                    error!("failed to create table {}: {e}", table.name);
                }
            }
            inner.conn = Some(conn);
            info!("opened persistence store at {}", self.path.display());
        }
        inner.refcount += 1;
        Ok(())
    }

    /// On last release, finalizes all prepared statements and closes the
    /// underlying store.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.refcount == 0 {
            return;
        }
        inner.refcount -= 1;
        if inner.refcount == 0 {
            if let Some(conn) = inner.conn.take() {
                conn.flush_prepared_statement_cache();
                if let Err((_, e)) = conn.close() {
                    error!("error closing persistence store: {e}");
                }
            }
            inner.vendor_tables.clear();
        }
    }

    /// Creates `descriptor`'s table if missing, then `ALTER`s it to add any
    /// columns declared in `descriptor` but absent from the existing table.
    /// Vendor tables are registered lazily on first event of that
    /// nonstandard CPER section-type.
    pub fn register_vendor_table(&self, descriptor: &TableSchema) -> rusqlite::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let Some(conn) = inner.conn.as_ref() else {
            return Ok(());
        };
        ensure_table(conn, descriptor)?;
        if !inner.vendor_tables.iter().any(|t| t == descriptor.name) {
            inner.vendor_tables.push(descriptor.name.to_string());
        }
        Ok(())
    }

    /// Binds `record`'s fields and executes the prepared insert for its
    /// table. Logs but never aborts on a per-row failure.
    pub fn insert(&self, record: &Record) {
        let inner = self.inner.lock().unwrap();
        let Some(conn) = inner.conn.as_ref() else {
            return;
        };
        if let Err(e) = insert_record(conn, record) {
            warn!("persistence failed for {}: {e}", record.table_name());
        }
    }
}

/// `CREATE TABLE IF NOT EXISTS`, then `PRAGMA table_info` to diff against
/// `schema.columns` and `ALTER TABLE ADD COLUMN` anything missing. No
/// column is ever removed or retyped.
fn ensure_table(conn: &Connection, schema: &TableSchema) -> rusqlite::Result<()> {
    let mut create = format!("CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, timestamp TEXT", schema.name);
    for (name, ty) in schema.columns {
        create.push_str(&format!(", {name} {}", ty.sql()));
    }
    create.push(')');
    conn.execute(&create, [])?;

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", schema.name))?;
    let existing: Vec<String> = stmt.query_map([], |row| row.get::<_, String>(1))?.collect::<Result<_, _>>()?;

    for (name, ty) in schema.columns {
        if !existing.iter().any(|c| c == name) {
            info!("schema evolution: adding column {}.{} {}", schema.name, name, ty.sql());
            conn.execute(&format!("ALTER TABLE {} ADD COLUMN {} {}", schema.name, name, ty.sql()), [])?;
        }
    }
    Ok(())
}

fn insert_generic(conn: &Connection, table: &'static str, columns: &[&str], values: Vec<SqlValue>) -> rusqlite::Result<()> {
    let placeholders: Vec<String> = (0..values.len()).map(|i| format!("?{}", i + 2)).collect();
    let sql = format!(
        "INSERT INTO {table} (timestamp, {}) VALUES (?1, {})",
        columns.join(", "),
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let timestamp: SqlValue = SqlValue::Text(String::new());
    let mut all = Vec::with_capacity(values.len() + 1);
    all.push(timestamp);
    all.extend(values);
    stmt.execute(params_from_iter(all.iter()))?;
    Ok(())
}

fn blob(bytes: &[u8]) -> SqlValue {
    SqlValue::Blob(bytes.to_vec())
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

fn int(v: impl Into<i64>) -> SqlValue {
    SqlValue::Integer(v.into())
}

fn header_values(h: &crate::records::CxlHeader) -> Vec<SqlValue> {
    vec![
        text(&h.memdev),
        text(&h.host),
        SqlValue::Integer(h.serial as i64),
        text(&h.log_type),
        text(&h.record_uuid),
        int(h.hdr_flags as i32),
        int(h.handle as i32),
        int(h.related_handle as i32),
        SqlValue::Integer(h.hdr_timestamp_ns as i64),
        int(h.length as i32),
        int(h.maint_op_class as i32),
    ]
}

/// Dispatches `record` to its table's insert, binding fields in the same
/// order as [`schema`]'s column list.
fn insert_record(conn: &Connection, record: &Record) -> rusqlite::Result<()> {
    use Record::*;
    match record {
        MemoryControllerError(r) => insert_generic(
            conn,
            "mc_event",
            &["error_count", "error_type", "msg", "label", "mc_index", "top_layer", "middle_layer", "lower_layer", "address", "grain", "syndrome", "driver_detail"],
            vec![
                int(r.error_count as i32), text(&format!("{:?}", r.severity)), text(&r.message), text(&r.label),
                int(r.mc_index as i32), int(r.top_layer), int(r.middle_layer), int(r.lower_layer),
                SqlValue::Integer(r.address as i64), SqlValue::Integer(r.grain as i64), SqlValue::Integer(r.syndrome as i64),
                text(&r.driver_detail),
            ],
        ),
        PciAer(r) => insert_generic(
            conn,
            "aer_event",
            &["dev_name", "error_type", "status", "tlp_header"],
            vec![
                text(&r.dev_name), text(&format!("{:?}", r.severity)), int(r.status as i32),
                r.tlp_header.map(|t| blob(bytemuck_u32s(&t.0))).unwrap_or(SqlValue::Null),
            ],
        ),
        MachineCheck(r) => insert_generic(
            conn,
            "mce_record",
            &["mcgcap", "mcgstatus", "status", "addr", "misc", "ip", "tsc", "walltime", "cpu", "cpuid", "apicid", "socketid", "bank", "cpuvendor", "microcode", "bank_name", "error_msg", "mcgstatus_msg", "mcistatus_msg", "mcastatus_msg", "location_msg", "user_action"],
            vec![
                SqlValue::Integer(r.mcgcap as i64), SqlValue::Integer(r.mcgstatus as i64), SqlValue::Integer(r.status as i64),
                SqlValue::Integer(r.addr as i64), SqlValue::Integer(r.misc as i64), SqlValue::Integer(r.ip as i64),
                SqlValue::Integer(r.tsc as i64), SqlValue::Integer(r.walltime as i64), int(r.cpu as i32), int(r.cpuid as i32),
                int(r.apicid as i32), int(r.socketid as i32), int(r.bank as i32), text(&r.cpuvendor), int(r.microcode as i32),
                text(&r.bank_name), text(&r.error_msg), text(&r.mcgstatus_msg), text(&r.mcistatus_msg), text(&r.mcastatus_msg),
                text(&r.location_msg), text(&r.user_action),
            ],
        ),
        ArmProcessorError(r) => insert_generic(
            conn,
            "arm_event",
            &["error_count", "affinity", "mpidr", "midr", "running_state", "psci_state", "processor_error_info", "context_info", "vendor_info", "error_types", "error_flags", "error_info", "virt_fault_addr", "physical_fault_addr"],
            vec![
                int(r.error_count as i32), int(r.affinity as i32), SqlValue::Integer(r.mpidr as i64), SqlValue::Integer(r.midr as i64),
                int(r.running_state as i32), int(r.psci_state as i32),
                blob(&serde_json::to_vec(&r.processor_error_info).unwrap_or_default()),
                blob(&r.context_info), blob(&r.vendor_info),
                text(&r.error_types), text(&r.error_flags), text(&r.error_info_text),
                text(&r.virt_fault_addr_text), text(&r.physical_fault_addr_text),
            ],
        ),
        ExtLogMemory(r) => insert_generic(
            conn,
            "extlog_event",
            &["error_seq", "etype", "severity", "address", "address_mask_lsb", "cper_data", "fru_id", "fru_text"],
            vec![
                SqlValue::Integer(r.error_seq as i64), int(r.etype as i32), text(&format!("{:?}", r.severity)),
                SqlValue::Integer(r.address as i64), int(r.address_mask_lsb as i32), blob(&r.cper_data),
                text(&r.fru_id), text(&r.fru_text),
            ],
        ),
        NonStandardCper(r) => insert_generic(
            conn,
            "non_standard_event",
            &["sec_type", "fru_id", "fru_text", "severity", "error"],
            vec![text(&r.sec_type), text(&r.fru_id), text(&r.fru_text), text(&format!("{:?}", r.severity)), blob(&r.error)],
        ),
        CxlPoison(r) => {
            let mut v = header_values(&r.header);
            v.extend([
                SqlValue::Integer(r.dpa as i64), int(r.dpa_length as i32), text(&r.source),
                int(r.trans_type as i32), int(r.channel as i32), int(r.rank as i32), int(r.device as i32),
            ]);
            insert_generic(conn, "cxl_poison_event", &["memdev", "host", "serial", "log_type", "hdr_uuid", "hdr_flags", "hdr_handle", "hdr_related_handle", "hdr_timestamp_ns", "hdr_length", "hdr_maint_op_class", "dpa", "dpa_length", "source", "trans_type", "channel", "rank", "device"], v)
        }
        CxlAerUe(r) => {
            let mut v = header_values(&r.header);
            v.extend([int(r.error_status as i32), int(r.first_error as i32), blob(&r.header_log)]);
            insert_generic(conn, "cxl_aer_ue_event", &["memdev", "host", "serial", "log_type", "hdr_uuid", "hdr_flags", "hdr_handle", "hdr_related_handle", "hdr_timestamp_ns", "hdr_length", "hdr_maint_op_class", "error_status", "first_error", "header_log"], v)
        }
        CxlAerCe(r) => {
            let mut v = header_values(&r.header);
            v.push(int(r.error_status as i32));
            insert_generic(conn, "cxl_aer_ce_event", &["memdev", "host", "serial", "log_type", "hdr_uuid", "hdr_flags", "hdr_handle", "hdr_related_handle", "hdr_timestamp_ns", "hdr_length", "hdr_maint_op_class", "error_status"], v)
        }
        CxlOverflow(r) => {
            let mut v = header_values(&r.header);
            v.extend([
                SqlValue::Integer(r.first_overflow_ts_ns as i64),
                SqlValue::Integer(r.last_overflow_ts_ns as i64),
                int(r.overflow_count as i32),
            ]);
            insert_generic(conn, "cxl_overflow_event", &["memdev", "host", "serial", "log_type", "hdr_uuid", "hdr_flags", "hdr_handle", "hdr_related_handle", "hdr_timestamp_ns", "hdr_length", "hdr_maint_op_class", "first_overflow_ts_ns", "last_overflow_ts_ns", "overflow_count"], v)
        }
        CxlGeneric(r) => {
            let mut v = header_values(&r.header);
            v.extend([text(&r.event_uuid), blob(&r.payload)]);
            insert_generic(conn, "cxl_generic_event", &["memdev", "host", "serial", "log_type", "hdr_uuid", "hdr_flags", "hdr_handle", "hdr_related_handle", "hdr_timestamp_ns", "hdr_length", "hdr_maint_op_class", "event_uuid", "payload"], v)
        }
        CxlGeneralMedia(r) => {
            let mut v = header_values(&r.header);
            v.extend([
                SqlValue::Integer(r.dpa as i64), int(r.descriptor as i32), int(r.error_type as i32),
                int(r.transaction_type as i32), int(r.channel as i32), int(r.rank as i32), int(r.device as i32),
                blob(&r.component_id), int(r.validity_flags as i32),
            ]);
            insert_generic(conn, "cxl_general_media_event", &["memdev", "host", "serial", "log_type", "hdr_uuid", "hdr_flags", "hdr_handle", "hdr_related_handle", "hdr_timestamp_ns", "hdr_length", "hdr_maint_op_class", "dpa", "descriptor", "error_type", "transaction_type", "channel", "rank", "device", "component_id", "validity_flags"], v)
        }
        CxlDram(r) => {
            let mut v = header_values(&r.header);
            v.extend([
                SqlValue::Integer(r.dpa as i64), SqlValue::Integer(r.hpa as i64), int(r.descriptor as i32),
                int(r.error_type as i32), int(r.transaction_type as i32), int(r.channel as i32), int(r.rank as i32),
                SqlValue::Integer(r.nibble_mask as i64), int(r.bank_group as i32), int(r.bank as i32),
                SqlValue::Integer(r.row as i64), int(r.column as i32), int(r.validity_flags as i32),
            ]);
            insert_generic(conn, "cxl_dram_event", &["memdev", "host", "serial", "log_type", "hdr_uuid", "hdr_flags", "hdr_handle", "hdr_related_handle", "hdr_timestamp_ns", "hdr_length", "hdr_maint_op_class", "dpa", "hpa", "descriptor", "error_type", "transaction_type", "channel", "rank", "nibble_mask", "bank_group", "bank", "row", "column", "validity_flags"], v)
        }
        CxlMemoryModule(r) => {
            let mut v = header_values(&r.header);
            v.extend([
                int(r.device_event_type as i32), int(r.health_status as i32), int(r.media_status as i32),
                int(r.additional_status as i32), int(r.life_used as i32), int(r.temperature as i32),
                SqlValue::Integer(r.dirty_shutdown_count as i64), SqlValue::Integer(r.corrected_volatile_error_count as i64),
                SqlValue::Integer(r.corrected_persistent_error_count as i64),
            ]);
            insert_generic(conn, "cxl_memory_module_event", &["memdev", "host", "serial", "log_type", "hdr_uuid", "hdr_flags", "hdr_handle", "hdr_related_handle", "hdr_timestamp_ns", "hdr_length", "hdr_maint_op_class", "device_event_type", "health_status", "media_status", "additional_status", "life_used", "temperature", "dirty_shutdown_count", "corrected_volatile_error_count", "corrected_persistent_error_count"], v)
        }
        DiskError(r) => insert_generic(
            conn,
            "disk_errors",
            &["dev", "sector", "nr_sector", "error", "rwbs", "command"],
            vec![text(&r.dev), SqlValue::Integer(r.sector as i64), int(r.nr_sector as i32), text(&r.error), text(&r.rwbs), text(&r.command)],
        ),
        MemoryFailure(r) => insert_generic(
            conn,
            "memory_failure_event",
            &["pfn", "page_type", "action_result"],
            vec![SqlValue::Integer(r.pfn as i64), text(&r.page_type), text(&r.action_result)],
        ),
        DevlinkHealthReport(r) => insert_generic(
            conn,
            "devlink_event",
            &["bus_name", "dev_name", "driver_name", "reporter_name", "message"],
            vec![text(&r.bus_name), text(&r.dev_name), text(&r.driver_name), text(&r.reporter_name), text(&r.message)],
        ),
    }
}

/// `[u32; 4]` as a little-endian byte blob for the `tlp_header` column.
fn bytemuck_u32s(words: &[u32; 4]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ArmProcessorError, Severity};

    fn sample_arm() -> Record {
        Record::ArmProcessorError(ArmProcessorError {
            timestamp: "now".to_string(),
            error_count: 1,
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
        })
    }

    #[test]
    fn open_is_idempotent_and_refcounted() {
        let dir = tempfile::tempdir().unwrap();
        let db = Persistence::new(dir.path().join("ras.db"));
        db.open().unwrap();
        db.open().unwrap();
        assert_eq!(db.inner.lock().unwrap().refcount, 2);
        db.close();
        assert!(db.inner.lock().unwrap().conn.is_some());
        db.close();
        assert!(db.inner.lock().unwrap().conn.is_none());
    }

    #[test]
    fn insert_does_not_panic_on_open_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = Persistence::new(dir.path().join("ras.db"));
        db.open().unwrap();
        db.insert(&sample_arm());
        db.close();
    }

    /// Scenario 5: a database whose `arm_event` lacks a later-added column
    /// gets it via `ALTER TABLE ADD COLUMN` on open, and a subsequent
    /// insert against the evolved schema succeeds.
    #[test]
    fn schema_evolution_adds_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ras.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute("CREATE TABLE arm_event (id INTEGER PRIMARY KEY, timestamp TEXT, error_count INTEGER)", []).unwrap();
        }
        let db = Persistence::new(&path);
        db.open().unwrap();
        db.insert(&sample_arm());

        let inner = db.inner.lock().unwrap();
        let conn = inner.conn.as_ref().unwrap();
        let mut stmt = conn.prepare("PRAGMA table_info(arm_event)").unwrap();
        let cols: Vec<String> = stmt.query_map([], |r| r.get(1)).unwrap().collect::<Result<_, _>>().unwrap();
        assert!(cols.contains(&"error_info".to_string()));
    }
}
