//! Drive `files.list` query expressions.
//!
//! Every value interpolated into a query goes through [`escape_literal`] so a
//! folder name can never terminate its string literal early.

/// MIME type Drive assigns to folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Escape a value for use inside a single-quoted query literal.
///
/// Backslashes are escaped before quotes so the quote escapes are not
/// themselves doubled.
pub fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Query for a non-trashed folder named exactly `name` directly under `parent_id`.
pub fn child_folder_named(parent_id: &str, name: &str) -> String {
    format!(
        "name = '{}' and '{}' in parents and mimeType = '{}' and trashed = false",
        escape_literal(name),
        escape_literal(parent_id),
        FOLDER_MIME_TYPE
    )
}

/// Query for every non-trashed folder directly under `parent_id`.
pub fn child_folders(parent_id: &str) -> String {
    format!(
        "'{}' in parents and mimeType = '{}' and trashed = false",
        escape_literal(parent_id),
        FOLDER_MIME_TYPE
    )
}
