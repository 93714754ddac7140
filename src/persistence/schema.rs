//! Fixed-and-vendor table schemas for the persistence façade.
//!
//! Every table carries an implicit `id INTEGER PRIMARY KEY` and `timestamp
//! TEXT` column; [`TableSchema::columns`] lists only the event-specific
//! columns that follow. Column types are restricted to the three SQLite
//! storage classes: `INTEGER`, `TEXT`, `BLOB`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    Blob,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [(&'static str, ColumnType)],
}

use ColumnType::{Blob, Integer, Text};

pub const MC_EVENT: TableSchema = TableSchema {
    name: "mc_event",
    columns: &[
        ("error_count", Integer),
        ("error_type", Text),
        ("msg", Text),
        ("label", Text),
        ("mc_index", Integer),
        ("top_layer", Integer),
        ("middle_layer", Integer),
        ("lower_layer", Integer),
        ("address", Integer),
        ("grain", Integer),
        ("syndrome", Integer),
        ("driver_detail", Text),
    ],
};

pub const AER_EVENT: TableSchema = TableSchema {
    name: "aer_event",
    columns: &[
        ("dev_name", Text),
        ("error_type", Text),
        ("status", Integer),
        ("tlp_header", Blob),
    ],
};

pub const MCE_RECORD: TableSchema = TableSchema {
    name: "mce_record",
    columns: &[
        ("mcgcap", Integer),
        ("mcgstatus", Integer),
        ("status", Integer),
        ("addr", Integer),
        ("misc", Integer),
        ("ip", Integer),
        ("tsc", Integer),
        ("walltime", Integer),
        ("cpu", Integer),
        ("cpuid", Integer),
        ("apicid", Integer),
        ("socketid", Integer),
        ("bank", Integer),
        ("cpuvendor", Text),
        ("microcode", Integer),
        ("bank_name", Text),
        ("error_msg", Text),
        ("mcgstatus_msg", Text),
        ("mcistatus_msg", Text),
        ("mcastatus_msg", Text),
        ("location_msg", Text),
        ("user_action", Text),
    ],
};

pub const ARM_EVENT: TableSchema = TableSchema {
    name: "arm_event",
    columns: &[
        ("error_count", Integer),
        ("affinity", Integer),
        ("mpidr", Integer),
        ("midr", Integer),
        ("running_state", Integer),
        ("psci_state", Integer),
        ("processor_error_info", Blob),
        ("context_info", Blob),
        ("vendor_info", Blob),
        ("error_types", Text),
        ("error_flags", Text),
        ("error_info", Text),
        ("virt_fault_addr", Text),
        ("physical_fault_addr", Text),
    ],
};

pub const EXTLOG_EVENT: TableSchema = TableSchema {
    name: "extlog_event",
    columns: &[
        ("error_seq", Integer),
        ("etype", Integer),
        ("severity", Text),
        ("address", Integer),
        ("address_mask_lsb", Integer),
        ("cper_data", Blob),
        ("fru_id", Text),
        ("fru_text", Text),
    ],
};

pub const NON_STANDARD_EVENT: TableSchema = TableSchema {
    name: "non_standard_event",
    columns: &[
        ("sec_type", Text),
        ("fru_id", Text),
        ("fru_text", Text),
        ("severity", Text),
        ("error", Blob),
    ],
};

/// Columns shared by every CXL event table, prefixed `hdr_` to avoid
/// clashing with event-specific fields of the same name (e.g. `dpa`).
const CXL_HEADER_COLUMNS: &[(&str, ColumnType)] = &[
    ("memdev", Text),
    ("host", Text),
    ("serial", Integer),
    ("log_type", Text),
    ("hdr_uuid", Text),
    ("hdr_flags", Integer),
    ("hdr_handle", Integer),
    ("hdr_related_handle", Integer),
    ("hdr_timestamp_ns", Integer),
    ("hdr_length", Integer),
    ("hdr_maint_op_class", Integer),
];

// Each CXL table repeats `CXL_HEADER_COLUMNS` inline rather than
// concatenating at const-eval time (array concatenation of `const` slices
// of different lengths has no ergonomic `const fn` path without unsafe);
// `CXL_HEADER_COLUMNS` above remains the single source of truth for the
// header column *names and types* that these must stay in sync with.

pub const CXL_POISON_EVENT: TableSchema = TableSchema {
    name: "cxl_poison_event",
    columns: &[
        ("memdev", Text), ("host", Text), ("serial", Integer), ("log_type", Text),
        ("hdr_uuid", Text), ("hdr_flags", Integer), ("hdr_handle", Integer),
        ("hdr_related_handle", Integer), ("hdr_timestamp_ns", Integer), ("hdr_length", Integer),
        ("hdr_maint_op_class", Integer),
        ("dpa", Integer), ("dpa_length", Integer), ("source", Text),
        ("trans_type", Integer), ("channel", Integer), ("rank", Integer), ("device", Integer),
    ],
};

pub const CXL_AER_UE_EVENT: TableSchema = TableSchema {
    name: "cxl_aer_ue_event",
    columns: &[
        ("memdev", Text), ("host", Text), ("serial", Integer), ("log_type", Text),
        ("hdr_uuid", Text), ("hdr_flags", Integer), ("hdr_handle", Integer),
        ("hdr_related_handle", Integer), ("hdr_timestamp_ns", Integer), ("hdr_length", Integer),
        ("hdr_maint_op_class", Integer),
        ("error_status", Integer), ("first_error", Integer), ("header_log", Blob),
    ],
};

pub const CXL_AER_CE_EVENT: TableSchema = TableSchema {
    name: "cxl_aer_ce_event",
    columns: &[
        ("memdev", Text), ("host", Text), ("serial", Integer), ("log_type", Text),
        ("hdr_uuid", Text), ("hdr_flags", Integer), ("hdr_handle", Integer),
        ("hdr_related_handle", Integer), ("hdr_timestamp_ns", Integer), ("hdr_length", Integer),
        ("hdr_maint_op_class", Integer),
        ("error_status", Integer),
    ],
};

pub const CXL_OVERFLOW_EVENT: TableSchema = TableSchema {
    name: "cxl_overflow_event",
    columns: &[
        ("memdev", Text), ("host", Text), ("serial", Integer), ("log_type", Text),
        ("hdr_uuid", Text), ("hdr_flags", Integer), ("hdr_handle", Integer),
        ("hdr_related_handle", Integer), ("hdr_timestamp_ns", Integer), ("hdr_length", Integer),
        ("hdr_maint_op_class", Integer),
        ("first_overflow_ts_ns", Integer), ("last_overflow_ts_ns", Integer), ("overflow_count", Integer),
    ],
};

pub const CXL_GENERIC_EVENT: TableSchema = TableSchema {
    name: "cxl_generic_event",
    columns: &[
        ("memdev", Text), ("host", Text), ("serial", Integer), ("log_type", Text),
        ("hdr_uuid", Text), ("hdr_flags", Integer), ("hdr_handle", Integer),
        ("hdr_related_handle", Integer), ("hdr_timestamp_ns", Integer), ("hdr_length", Integer),
        ("hdr_maint_op_class", Integer),
        ("event_uuid", Text), ("payload", Blob),
    ],
};

pub const CXL_GENERAL_MEDIA_EVENT: TableSchema = TableSchema {
    name: "cxl_general_media_event",
    columns: &[
        ("memdev", Text), ("host", Text), ("serial", Integer), ("log_type", Text),
        ("hdr_uuid", Text), ("hdr_flags", Integer), ("hdr_handle", Integer),
        ("hdr_related_handle", Integer), ("hdr_timestamp_ns", Integer), ("hdr_length", Integer),
        ("hdr_maint_op_class", Integer),
        ("dpa", Integer), ("descriptor", Integer), ("error_type", Integer),
        ("transaction_type", Integer), ("channel", Integer), ("rank", Integer), ("device", Integer),
        ("component_id", Blob), ("validity_flags", Integer),
    ],
};

pub const CXL_DRAM_EVENT: TableSchema = TableSchema {
    name: "cxl_dram_event",
    columns: &[
        ("memdev", Text), ("host", Text), ("serial", Integer), ("log_type", Text),
        ("hdr_uuid", Text), ("hdr_flags", Integer), ("hdr_handle", Integer),
        ("hdr_related_handle", Integer), ("hdr_timestamp_ns", Integer), ("hdr_length", Integer),
        ("hdr_maint_op_class", Integer),
        ("dpa", Integer), ("hpa", Integer), ("descriptor", Integer), ("error_type", Integer),
        ("transaction_type", Integer), ("channel", Integer), ("rank", Integer),
        ("nibble_mask", Integer), ("bank_group", Integer), ("bank", Integer),
        ("row", Integer), ("column", Integer), ("validity_flags", Integer),
    ],
};

pub const CXL_MEMORY_MODULE_EVENT: TableSchema = TableSchema {
    name: "cxl_memory_module_event",
    columns: &[
        ("memdev", Text), ("host", Text), ("serial", Integer), ("log_type", Text),
        ("hdr_uuid", Text), ("hdr_flags", Integer), ("hdr_handle", Integer),
        ("hdr_related_handle", Integer), ("hdr_timestamp_ns", Integer), ("hdr_length", Integer),
        ("hdr_maint_op_class", Integer),
        ("device_event_type", Integer), ("health_status", Integer), ("media_status", Integer),
        ("additional_status", Integer), ("life_used", Integer), ("temperature", Integer),
        ("dirty_shutdown_count", Integer), ("corrected_volatile_error_count", Integer),
        ("corrected_persistent_error_count", Integer),
    ],
};

pub const DISK_ERRORS: TableSchema = TableSchema {
    name: "disk_errors",
    columns: &[
        ("dev", Text),
        ("sector", Integer),
        ("nr_sector", Integer),
        ("error", Text),
        ("rwbs", Text),
        ("command", Text),
    ],
};

pub const MEMORY_FAILURE_EVENT: TableSchema = TableSchema {
    name: "memory_failure_event",
    columns: &[("pfn", Integer), ("page_type", Text), ("action_result", Text)],
};

pub const DEVLINK_EVENT: TableSchema = TableSchema {
    name: "devlink_event",
    columns: &[
        ("bus_name", Text),
        ("dev_name", Text),
        ("driver_name", Text),
        ("reporter_name", Text),
        ("message", Text),
    ],
};

/// All fixed (non-vendor) tables, created eagerly on [`super::Persistence::open`].
pub const BUILTIN_TABLES: &[TableSchema] = &[
    MC_EVENT,
    AER_EVENT,
    MCE_RECORD,
    ARM_EVENT,
    EXTLOG_EVENT,
    NON_STANDARD_EVENT,
    CXL_POISON_EVENT,
    CXL_AER_UE_EVENT,
    CXL_AER_CE_EVENT,
    CXL_OVERFLOW_EVENT,
    CXL_GENERIC_EVENT,
    CXL_GENERAL_MEDIA_EVENT,
    CXL_DRAM_EVENT,
    CXL_MEMORY_MODULE_EVENT,
    DISK_ERRORS,
    MEMORY_FAILURE_EVENT,
    DEVLINK_EVENT,
];
