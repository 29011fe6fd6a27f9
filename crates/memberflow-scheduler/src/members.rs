//! Member list parsing: one identifier per line.
//!
//! Accepted: all-digit numeric ids, `@handle`, or a bare handle matching
//! `^[a-zA-Z][a-zA-Z0-9_]{4,31}$`. Everything else is dropped.

use std::sync::LazyLock;

static HANDLE_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{4,31}$").expect("HANDLE_REGEX is a valid regex pattern")
});

/// Is `line` (already trimmed) an acceptable identifier?
pub fn is_valid_identifier(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    if line.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if let Some(handle) = line.strip_prefix('@') {
        return !handle.is_empty();
    }
    HANDLE_REGEX.is_match(line)
}

/// Parse uploaded text into the ordered member list.
pub fn parse_member_list(text: &str) -> Vec<String> {
    let members: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| is_valid_identifier(line))
        .map(str::to_string)
        .collect();
    tracing::debug!("📄 Parsed {} member identifiers", members.len());
    members
}
