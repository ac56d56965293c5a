//! Application ID lookup used to name exported files.
//!
//! Order: the report's header block, then the legacy `Application ID:` label
//! scan (case-sensitive, up to the next `</p>`), then a fixed sentinel.
//! Never fails.

use crate::models::report::{strip_tags, ReportHeader};

pub const APPLICATION_ID_NOT_FOUND: &str = "application_id_not_found";

const LEGACY_MARKER: &str = "Application ID:";
const LEGACY_END: &str = "</p>";
const MAX_ID_LEN: usize = 64;

pub fn extract_application_id(report: &str) -> String {
    ReportHeader::parse(report)
        .and_then(|h| h.application_id)
        .and_then(|id| sanitize(&id))
        .or_else(|| legacy_scan(report).and_then(|id| sanitize(&id)))
        .unwrap_or_else(|| APPLICATION_ID_NOT_FOUND.to_string())
}

fn legacy_scan(report: &str) -> Option<String> {
    let start = report.find(LEGACY_MARKER)? + LEGACY_MARKER.len();
    let rest = &report[start..];
    let end = rest.find(LEGACY_END).unwrap_or_else(|| rest.find('\n').unwrap_or(rest.len()));
    Some(strip_tags(&rest[..end]).trim().to_string())
}

/// Keeps ASCII alphanumerics, `-` and `_`; anything else becomes `_`.
fn sanitize(id: &str) -> Option<String> {
    let id: String = id
        .trim()
        .chars()
        .take(MAX_ID_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = id.trim_matches('_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
