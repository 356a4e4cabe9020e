// src/process/extract.rs
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use zip::ZipArchive;

use crate::error::{Error, Result};

/// `<dir>/ESS1e06_6.stata.zip` → `<dir>/ESS1e06_6.stata`
pub fn working_dir_for(zip_path: &Path) -> PathBuf {
    let name = zip_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = match name.len().checked_sub(4) {
        Some(cut) if name.get(cut..).is_some_and(|ext| ext.eq_ignore_ascii_case(".zip")) => {
            &name[..cut]
        }
        _ => name.as_str(),
    };
    zip_path.with_file_name(stem)
}

/// Unpack every entry of `zip_path` below `dest_dir`, returning the files written.
#[instrument(level = "info", skip(zip_path, dest_dir), fields(zip = %zip_path.display()))]
pub fn extract_archive(zip_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let archive_err = |source| Error::Archive {
        path: zip_path.to_path_buf(),
        source,
    };

    let file = File::open(zip_path).map_err(|e| Error::io(zip_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(archive_err)?;
    fs::create_dir_all(dest_dir).map_err(|e| Error::io(dest_dir, e))?;

    let mut written = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(archive_err)?;
        let Some(rel) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let out_path = dest_dir.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| Error::io(&out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| Error::io(&out_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| Error::io(&out_path, e))?;
        written.push(out_path);
    }

    info!(files = written.len(), dir = %dest_dir.display(), "extracted archive");
    Ok(written)
}
