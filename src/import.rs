// src/import.rs

//! Entry points: import rounds into tables, or download their archives as-is.

use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tracing::{info, instrument, warn};

use crate::catalog::{self, Format};
use crate::config::PortalConfig;
use crate::error::{Error, Result};
use crate::fetch::countries;
use crate::fetch::session::validate_email;
use crate::fetch::urls::{check_format, resolve_round_urls, validate_rounds, Purpose, RoundUrl};
use crate::fetch::{download_all, Session};
use crate::process::{extract_archive, read_latest, working_dir_for};
use crate::table::Table;

/// Result of an import: a lone table when one round was asked for.
#[derive(Debug, Clone)]
pub enum Imported {
    Single(Table),
    Many(Vec<Table>),
}

impl Imported {
    fn from_tables(mut tables: Vec<Table>) -> Self {
        if tables.len() == 1 {
            if let Some(table) = tables.pop() {
                return Imported::Single(table);
            }
        }
        Imported::Many(tables)
    }

    pub fn tables(&self) -> &[Table] {
        match self {
            Imported::Single(table) => std::slice::from_ref(table),
            Imported::Many(tables) => tables,
        }
    }

    pub fn into_tables(self) -> Vec<Table> {
        match self {
            Imported::Single(table) => vec![table],
            Imported::Many(tables) => tables,
        }
    }

    pub fn len(&self) -> usize {
        self.tables().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables().is_empty()
    }
}

/// Handle on the data portal. Holds configuration only; every call logs in
/// afresh and drops its session when done.
#[derive(Debug, Clone, Default)]
pub struct Portal {
    config: PortalConfig,
}

impl Portal {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Result<Self> {
        PortalConfig::from_env().map(Self::new)
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Download, unpack and read `rounds`. Without a format the Stata archive
    /// is fetched and every reader is tried on its data file.
    #[instrument(level = "info", skip(self, email))]
    pub fn import_rounds(
        &self,
        rounds: &[u32],
        email: Option<&str>,
        format: Option<Format>,
    ) -> Result<Imported> {
        let base = self.config.base_url()?;
        let targets = resolve_round_urls(rounds, format.unwrap_or_default(), Purpose::Import, &base)?;
        let email = self.credential(email)?;
        self.import_targets(&targets, &email, format)
    }

    /// Every round the catalog marks as available.
    pub fn import_all_rounds(&self, email: Option<&str>, format: Option<Format>) -> Result<Imported> {
        self.import_rounds(&catalog::show_rounds(), email, format)
    }

    /// Save the archives of `rounds` into `output_dir` (current directory by
    /// default) without unpacking them. Returns the saved paths.
    #[instrument(level = "info", skip(self, email))]
    pub fn download_rounds(
        &self,
        rounds: &[u32],
        email: Option<&str>,
        output_dir: Option<&Path>,
        format: Option<Format>,
    ) -> Result<Vec<PathBuf>> {
        let base = self.config.base_url()?;
        let targets =
            resolve_round_urls(rounds, format.unwrap_or_default(), Purpose::Download, &base)?;
        let email = self.credential(email)?;
        let out = existing_dir(output_dir)?;
        self.download_targets(&targets, &email, &out)
    }

    pub fn show_countries(&self) -> Result<Vec<String>> {
        countries::show_countries(&self.config)
    }

    pub fn show_country_rounds(&self, country: &str) -> Result<Vec<u32>> {
        countries::show_country_rounds(&self.config, country)
    }

    /// Like [`Portal::import_rounds`] for the country-specific files of `country`.
    #[instrument(level = "info", skip(self, email))]
    pub fn import_country(
        &self,
        country: &str,
        rounds: &[u32],
        email: Option<&str>,
        format: Option<Format>,
    ) -> Result<Imported> {
        let download_format = format.unwrap_or_default();
        check_format(download_format, Purpose::Import)?;
        let rounds = unique_valid_rounds(rounds)?;
        let email = self.credential(email)?;
        let targets =
            countries::country_round_urls(&self.config, country, &rounds, download_format)?;
        self.import_targets(&targets, &email, format)
    }

    /// Like [`Portal::download_rounds`] for the country-specific files of `country`.
    #[instrument(level = "info", skip(self, email))]
    pub fn download_country(
        &self,
        country: &str,
        rounds: &[u32],
        email: Option<&str>,
        output_dir: Option<&Path>,
        format: Option<Format>,
    ) -> Result<Vec<PathBuf>> {
        let rounds = unique_valid_rounds(rounds)?;
        let email = self.credential(email)?;
        let out = existing_dir(output_dir)?;
        let targets = countries::country_round_urls(
            &self.config,
            country,
            &rounds,
            format.unwrap_or_default(),
        )?;
        self.download_targets(&targets, &email, &out)
    }

    fn credential(&self, explicit: Option<&str>) -> Result<String> {
        let email = self.config.resolve_email(explicit)?;
        validate_email(&email)?;
        Ok(email)
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        match &self.config.scratch_dir {
            Some(dir) => Builder::new()
                .prefix("essurvey-")
                .tempdir_in(dir)
                .map_err(|e| Error::io(dir, e)),
            None => Builder::new()
                .prefix("essurvey-")
                .tempdir()
                .map_err(|e| Error::io(std::env::temp_dir(), e)),
        }
    }

    fn download_targets(&self, targets: &[RoundUrl], email: &str, out: &Path) -> Result<Vec<PathBuf>> {
        let session = Session::login(&self.config, email)?;
        let paths = download_all(&session, targets, out)?;
        info!(files = paths.len(), dir = %out.display(), "download complete");
        Ok(paths)
    }

    fn import_targets(
        &self,
        targets: &[RoundUrl],
        email: &str,
        format: Option<Format>,
    ) -> Result<Imported> {
        let session = Session::login(&self.config, email)?;
        let scratch = self.scratch_dir()?;
        let tables = read_targets(&session, targets, scratch.path(), format);

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(dir = %scratch_path.display(), error = %e, "failed to remove scratch directory");
        }

        let tables = tables?;
        info!(tables = tables.len(), "import complete");
        Ok(Imported::from_tables(tables))
    }
}

fn read_targets(
    session: &Session,
    targets: &[RoundUrl],
    scratch: &Path,
    format: Option<Format>,
) -> Result<Vec<Table>> {
    let archives = download_all(session, targets, scratch)?;
    targets
        .iter()
        .zip(archives)
        .map(|(target, archive)| {
            let work_dir = working_dir_for(&archive);
            extract_archive(&archive, &work_dir)?;
            let parsed = read_latest(&work_dir, format)?;
            Ok(Table::from_parsed(target.round, parsed))
        })
        .collect()
}

fn unique_valid_rounds(rounds: &[u32]) -> Result<Vec<u32>> {
    Ok(validate_rounds(rounds)?.into_iter().map(|info| info.round).collect())
}

fn existing_dir(dir: Option<&Path>) -> Result<PathBuf> {
    let dir = dir.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    if !dir.is_dir() {
        return Err(Error::MissingOutputDir(dir));
    }
    Ok(dir)
}
