//! Parses a tracefs `events/<group>/<name>/format` file into an in-memory
//! schema, the Rust analogue of `libtraceevent`'s
//! `tep_parse_format`. We only need enough of the format grammar to locate
//! named fields inside the binary record: declared C type, byte offset,
//! byte size, and signedness.

use std::collections::HashMap;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFormat {
    pub name: String,
    pub offset: usize,
    pub size: usize,
    pub signed: bool,
    /// True for `char foo[n]`/`__data_loc` fields: read as a byte slice
    /// rather than converted to an integer.
    pub is_array: bool,
}

#[derive(Debug, Clone)]
pub struct EventFormat {
    pub name: String,
    pub id: u32,
    pub fields: Vec<FieldFormat>,
    by_name: HashMap<String, usize>,
}

impl EventFormat {
    pub fn field(&self, name: &str) -> Option<&FieldFormat> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }
}

/// One `field:...;	offset:N;	size:N;	signed:0|1;` line.
fn parse_field_line(line: &str) -> Option<FieldFormat> {
    let line = line.trim();
    if !line.starts_with("field:") {
        return None;
    }
    let mut offset = None;
    let mut size = None;
    let mut signed = false;
    let mut decl = String::new();

    for part in line.split(';') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix("field:") {
            decl = rest.trim().to_string();
        } else if let Some(rest) = part.strip_prefix("offset:") {
            offset = rest.trim().parse::<usize>().ok();
        } else if let Some(rest) = part.strip_prefix("size:") {
            size = rest.trim().parse::<usize>().ok();
        } else if let Some(rest) = part.strip_prefix("signed:") {
            signed = rest.trim() == "1";
        }
    }

    let offset = offset?;
    let size = size?;
    // The declared name is the last identifier before an optional `[..]`
    // array suffix or the end of the declaration.
    let decl_no_array = decl.split('[').next().unwrap_or(&decl);
    let name = decl_no_array.split_whitespace().last()?.trim_start_matches('*').to_string();
    let is_array = decl.contains('[') || decl.contains("__data_loc") || decl.contains("char *");

    Some(FieldFormat { name, offset, size, signed, is_array })
}

/// Byte layout of the per-CPU subbuffer header, derived from
/// `events/header_page`. Every mainline kernel uses the same layout (8-byte
/// timestamp, 8-byte signed commit count, data immediately after) but we
/// still parse the file rather than hardcoding it, falling back to that
/// standard layout if parsing fails (pre-4.x kernels with a narrower
/// `commit` field, or a malformed/missing file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPageLayout {
    pub commit_offset: usize,
    pub commit_size: usize,
    pub data_offset: usize,
}

/// The layout every kernel since the ring-buffer rewrite (~2.6.31) has
/// used: `u64 timestamp` at 0, `local_t commit` (8 bytes) at 8, page data
/// starting at 16.
pub const STANDARD_HEADER_PAGE: HeaderPageLayout = HeaderPageLayout { commit_offset: 8, commit_size: 8, data_offset: 16 };

/// Parses `events/header_page`'s contents (same `field:` grammar as a
/// tracepoint format, but with no `name:`/`ID:` lines) for the `commit`
/// and `data` field offsets/sizes.
pub fn parse_header_page(contents: &str) -> HeaderPageLayout {
    let mut commit_offset = None;
    let mut commit_size = None;
    let mut data_offset = None;

    for line in contents.lines() {
        if let Some(field) = parse_field_line(line) {
            match field.name.as_str() {
                "commit" => {
                    commit_offset = Some(field.offset);
                    commit_size = Some(field.size);
                }
                "data" => data_offset = Some(field.offset),
                _ => {}
            }
        }
    }

    match (commit_offset, commit_size, data_offset) {
        (Some(co), Some(cs), Some(d)) => HeaderPageLayout { commit_offset: co, commit_size: cs, data_offset: d },
        _ => STANDARD_HEADER_PAGE,
    }
}

/// Parses the full contents of a `format` file.
pub fn parse_format(contents: &str) -> Result<EventFormat> {
    let mut name = String::new();
    let mut id = 0u32;
    let mut fields = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("name:") {
            name = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("ID:") {
            id = rest.trim().parse().unwrap_or(0);
        } else if let Some(field) = parse_field_line(line) {
            // Skip the `common_*` header fields every tracepoint carries;
            // callers only care about event-specific fields.
            if !field.name.starts_with("common_") {
                fields.push(field);
            }
        }
    }

    if name.is_empty() {
        return Err(CoreError::EventFormatMissing { group: String::new(), name: String::new() });
    }

    let by_name = fields.iter().enumerate().map(|(i, f)| (f.name.clone(), i)).collect();
    Ok(EventFormat { name, id, fields, by_name })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "name: mc_event\nID: 322\nformat:\n\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;\n\tfield:unsigned char common_flags;\toffset:2;\tsize:1;\tsigned:0;\n\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;\n\n\tfield:int error_count;\toffset:8;\tsize:4;\tsigned:1;\n\tfield:const char * msg;\toffset:12;\tsize:4;\tsigned:0;\n\tfield:unsigned long long address;\toffset:16;\tsize:8;\tsigned:0;\n";

    #[test]
    fn parses_name_and_id() {
        let fmt = parse_format(SAMPLE).unwrap();
        assert_eq!(fmt.name, "mc_event");
        assert_eq!(fmt.id, 322);
    }

    #[test]
    fn skips_common_fields_and_keeps_event_fields() {
        let fmt = parse_format(SAMPLE).unwrap();
        assert!(fmt.field("common_pid").is_none());
        let error_count = fmt.field("error_count").unwrap();
        assert_eq!(error_count.offset, 8);
        assert_eq!(error_count.size, 4);
        assert!(error_count.signed);
    }

    #[test]
    fn dynamic_string_field_is_array() {
        let fmt = parse_format(SAMPLE).unwrap();
        let msg = fmt.field("msg").unwrap();
        assert!(msg.is_array);
    }

    #[test]
    fn missing_name_is_an_error() {
        assert!(parse_format("format:\n\tfield:int x;\toffset:0;\tsize:4;\tsigned:1;\n").is_err());
    }

    const HEADER_PAGE: &str = "\tfield: u64 timestamp;\toffset:0;\tsize:8;\tsigned:0;\n\tfield: local_t commit;\toffset:8;\tsize:8;\tsigned:1;\n\tfield: int overwrite;\toffset:8;\tsize:1;\tsigned:1;\n\tfield: char data;\toffset:16;\tsize:4080;\tsigned:1;\n";

    #[test]
    fn header_page_parses_commit_and_data_offsets() {
        let layout = parse_header_page(HEADER_PAGE);
        assert_eq!(layout.commit_offset, 8);
        assert_eq!(layout.commit_size, 8);
        assert_eq!(layout.data_offset, 16);
    }

    #[test]
    fn header_page_falls_back_to_standard_layout_on_garbage() {
        assert_eq!(parse_header_page("nonsense"), STANDARD_HEADER_PAGE);
    }
}
