use std::io::{Cursor, Read};
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("corrupt archive: {0}")]
    Archive(#[from] ZipError),
    #[error("failed to read entry: {0}")]
    Read(#[from] std::io::Error),
}

/// Returns the decompressed bytes of the entry named exactly `entry_name`.
///
/// `Ok(None)` means the archive is well formed but holds no such entry.
pub fn extract_entry(archive: &[u8], entry_name: &str) -> Result<Option<Vec<u8>>, ExtractError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;

    let mut entry = match zip.by_name(entry_name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    // the declared size comes from the archive itself and is not trusted
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents)?;
    Ok(Some(contents))
}
