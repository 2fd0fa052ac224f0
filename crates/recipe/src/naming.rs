use std::path::Path;

/// Splits a source path into the recipe's `(filename, format)` pair.
///
/// Backslashes are treated as separators regardless of platform, the last
/// component is the base name and `format` is whatever follows its final
/// dot. A base name without a dot yields an empty `format`.
pub fn split_file_name(path: &Path) -> (String, String) {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or_default();

    match base.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), ext.to_string()),
        None => (base.to_string(), String::new()),
    }
}
