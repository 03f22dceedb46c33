//! "Download source" archive.
//!
//! Packages a fixed set of placeholder text files into a ZIP. This is not an
//! export of the real source tree.

use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;
use thiserror::Error;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Root folder inside the archive
const ARCHIVE_ROOT: &str = "ielts-prep-source";

const PLACEHOLDER_FILES: [(&str, &str); 5] = [
    (
        "README.txt",
        "IELTS Prep\n\nThis archive contains placeholder files only.\nClone the repository for the full source.\n",
    ),
    (
        "src/README.txt",
        "Application source lives here: pages, components and the progress store.\n",
    ),
    (
        "src/data/README.txt",
        "Study session, event and registration data is kept in browser storage.\n",
    ),
    (
        "backend/README.txt",
        "The REST backend (login, register, user profile) is mocked in this build.\n",
    ),
    (
        "LICENSE.txt",
        "Placeholder license text. See the repository for the actual license.\n",
    ),
];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to build archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to write archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Names of the files the archive will contain
pub fn archive_entries() -> Vec<String> {
    PLACEHOLDER_FILES
        .iter()
        .map(|(name, _)| format!("{ARCHIVE_ROOT}/{name}"))
        .collect()
}

/// Write the archive into `writer` and hand the writer back
pub fn write_source_archive<W: Write + Seek>(writer: W) -> Result<W, ExportError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);
    for (name, content) in PLACEHOLDER_FILES {
        zip.start_file(format!("{ARCHIVE_ROOT}/{name}"), options)?;
        zip.write_all(content.as_bytes())?;
    }
    Ok(zip.finish()?)
}

pub fn write_source_archive_to(path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let file = write_source_archive(file)?;
    file.sync_all()?;
    info!("Wrote source archive to {}", path.display());
    Ok(())
}
