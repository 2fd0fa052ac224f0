use std::path::{Component, Path};

use crate::TransferError;

/// Validates that a name taken from a recipe is a bare file name.
///
/// Recipes travel between machines, so the rebuilt file must land inside the
/// output directory. Rejects:
/// - Empty names and `.` / `..`
/// - Any path separator (`/` or `\`, on every platform)
/// - Absolute paths and Windows prefix components (`C:`, `\\server`)
pub fn validate_output_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(TransferError::InvalidName(format!(
            "path separators not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) | (Some(Component::CurDir), _) => Err(
            TransferError::InvalidName(format!("relative directory not allowed: {name}")),
        ),
        _ => Err(TransferError::InvalidName(format!(
            "not a plain file name: {name}"
        ))),
    }
}
