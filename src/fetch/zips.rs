// src/fetch/zips.rs

use reqwest::header::CONTENT_TYPE;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

use super::session::Session;
use super::urls::RoundUrl;
use crate::error::{Error, Result};

/// Download one round's archive into `dest_dir`, named after the requested file.
/// Returns the full path of the saved file.
#[instrument(level = "info", skip(session, target, dest_dir), fields(round = target.round, url = %target.url))]
pub fn download_round(session: &Session, target: &RoundUrl, dest_dir: &Path) -> Result<PathBuf> {
    let file_name = target.file_name();
    let dest_path = dest_dir.join(&file_name);

    let mut resp = session.get(&target.url)?;

    // the portal answers with its login page when the session was not accepted
    let is_html = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false);
    if is_html {
        return Err(Error::CredentialRejected {
            email: session.email().to_string(),
            reason: format!("the portal served a web page instead of {file_name}"),
        });
    }

    fs::create_dir_all(dest_dir).map_err(|e| Error::io(dest_dir, e))?;
    let mut file = File::create(&dest_path).map_err(|e| Error::io(&dest_path, e))?;
    let bytes = match resp.copy_to(&mut file) {
        Ok(n) => n,
        Err(e) => {
            drop(file);
            let _ = fs::remove_file(&dest_path);
            return Err(Error::network(&target.url, e));
        }
    };

    info!(bytes, path = %dest_path.display(), "downloaded");
    Ok(dest_path)
}

/// Download every target in order; the first failure aborts the batch.
pub fn download_all(session: &Session, targets: &[RoundUrl], dest_dir: &Path) -> Result<Vec<PathBuf>> {
    targets
        .iter()
        .map(|target| download_round(session, target, dest_dir))
        .collect()
}
