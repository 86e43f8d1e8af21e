//! Import and export through the kernel's virtual filesystem.
//!
//! The kernel only reads and writes exchange files by name, so bytes are
//! staged under a fresh per-call name and unlinked before returning, on
//! success and failure alike.

use lifecycle::{with_scope, Handle, ReleaseError, Scope};
use native_kernel::{FileFormat, SharedKernel};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::StagingError;

fn staging_name(format: FileFormat) -> String {
    format!("staging-{}.{}", Uuid::new_v4(), format.extension())
}

/// Unlink `name` when `scope` closes.
fn unlink_on_close(scope: &Scope, kernel: &SharedKernel, name: &str) {
    let kernel = kernel.clone();
    let staged = name.to_string();
    scope.defer(name, move || {
        kernel
            .with(|k| k.vfs_unlink(&staged))
            .map_err(|e| ReleaseError::Cleanup {
                label: staged.clone(),
                reason: e.to_string(),
            })
    });
}

/// Guess the exchange format from a file name's extension.
pub fn detect_format(file_name: &str) -> Option<FileFormat> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "step" | "stp" => Some(FileFormat::Step),
        "iges" | "igs" => Some(FileFormat::Iges),
        "stl" => Some(FileFormat::Stl),
        _ => None,
    }
}

/// Read a shape from `bytes`. The returned handle is owned by the caller.
#[instrument(skip(kernel, bytes), fields(len = bytes.len()))]
pub fn import_shape(kernel: &SharedKernel, bytes: &[u8], format: FileFormat) -> Result<Handle, StagingError> {
    if bytes.is_empty() {
        return Err(StagingError::EmptyInput);
    }
    let name = staging_name(format);
    let scope = Scope::new();

    let staged = (|| -> Result<Handle, StagingError> {
        kernel.with(|k| k.vfs_write(&name, bytes))?;
        unlink_on_close(&scope, kernel, &name);
        let raw = kernel.with(|k| k.read_file(&name, format))?;
        Ok(scope.adopt(kernel, raw))
    })();

    // On error the scope is dropped here, releasing everything it holds.
    let handle = staged?;
    scope.forget(&handle);
    if let Err(close) = scope.close() {
        if let Err(error) = handle.release() {
            warn!(%error, "failed to release import after cleanup failure");
        }
        return Err(close.into());
    }
    info!(?format, raw = ?handle.native_id(), "imported shape");
    Ok(handle)
}

/// Import, taking the format from `file_name`'s extension.
pub fn import_named(kernel: &SharedKernel, file_name: &str, bytes: &[u8]) -> Result<Handle, StagingError> {
    let format = detect_format(file_name).ok_or_else(|| StagingError::UnknownFormat(file_name.to_string()))?;
    import_shape(kernel, bytes, format)
}

/// Write `shape` in `format` and return the file contents.
#[instrument(skip(shape), fields(shape = ?shape.native_id()))]
pub fn export_shape(shape: &Handle, format: FileFormat) -> Result<Vec<u8>, StagingError> {
    let raw = shape.raw()?;
    let kernel = shape.kernel();
    let name = staging_name(format);

    let bytes = with_scope(|scope| -> Result<Vec<u8>, StagingError> {
        kernel.with(|k| k.write_file(raw, &name, format))?;
        unlink_on_close(scope, kernel, &name);
        let bytes = kernel.with(|k| k.vfs_read(&name))?;
        if bytes.is_empty() {
            return Err(StagingError::EmptyOutput { format });
        }
        Ok(bytes)
    })?;
    debug!(len = bytes.len(), "exported shape");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format_from_extension() {
        assert_eq!(detect_format("part.STEP"), Some(FileFormat::Step));
        assert_eq!(detect_format("part.stp"), Some(FileFormat::Step));
        assert_eq!(detect_format("a.b.igs"), Some(FileFormat::Iges));
        assert_eq!(detect_format("mesh.stl"), Some(FileFormat::Stl));
        assert_eq!(detect_format("notes.txt"), None);
        assert_eq!(detect_format("no_extension"), None);
    }

    #[test]
    fn test_staging_names_are_unique() {
        let a = staging_name(FileFormat::Step);
        let b = staging_name(FileFormat::Step);
        assert_ne!(a, b);
        assert!(a.ends_with(".step"));
    }
}
