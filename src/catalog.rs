// src/catalog.rs

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::Error;

/// File encoding a round can be downloaded in.
///
/// `Stata` and `Spss` can be read back into tables; `Sas` ships as a SAS
/// transport file and is only offered for plain downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Stata,
    Spss,
    Sas,
}

impl Format {
    /// Order in which readers are tried when the caller did not pick a format.
    pub const PROBE_ORDER: [Format; 3] = [Format::Stata, Format::Spss, Format::Sas];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Stata => "stata",
            Format::Spss => "spss",
            Format::Sas => "sas",
        }
    }

    /// Extensions of the data files found inside this format's archives.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Format::Stata => &["dta"],
            Format::Spss => &["sav"],
            Format::Sas => &["xpt"],
        }
    }

    pub fn supports_import(&self) -> bool {
        !matches!(self, Format::Sas)
    }

    pub fn from_extension(ext: &str) -> Option<Format> {
        Format::PROBE_ORDER
            .into_iter()
            .find(|f| f.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stata" | "dta" => Ok(Format::Stata),
            "spss" | "sav" => Ok(Format::Spss),
            "sas" | "xpt" => Ok(Format::Sas),
            other => Err(Error::UnknownFormat(other.to_string())),
        }
    }
}

/// Path (relative to the portal base) that serves data archives.
pub const DOWNLOAD_PATH: &str = "file/download";

/// One published round of the survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundInfo {
    pub round: u32,
    /// Fieldwork year, sent as the `y` query parameter.
    pub year: u16,
    /// Edition tag of the integrated file, e.g. `06_6`.
    pub edition: &'static str,
    pub available: bool,
}

impl RoundInfo {
    /// `ESS1e06_6`
    pub fn file_stem(&self) -> String {
        format!("ESS{}e{}", self.round, self.edition)
    }

    /// `ESS1e06_6.stata.zip`
    pub fn archive_name(&self, format: Format) -> String {
        format!("{}.{}.zip", self.file_stem(), format.as_str())
    }
}

static ROUNDS: &[RoundInfo] = &[
    RoundInfo { round: 1, year: 2002, edition: "06_6", available: true },
    RoundInfo { round: 2, year: 2004, edition: "03_6", available: true },
    RoundInfo { round: 3, year: 2006, edition: "03_7", available: true },
    RoundInfo { round: 4, year: 2008, edition: "04_5", available: true },
    RoundInfo { round: 5, year: 2010, edition: "03_4", available: true },
    RoundInfo { round: 6, year: 2012, edition: "02_4", available: true },
    RoundInfo { round: 7, year: 2014, edition: "02_2", available: true },
    RoundInfo { round: 8, year: 2016, edition: "02_2", available: true },
    RoundInfo { round: 9, year: 2018, edition: "03_1", available: true },
    RoundInfo { round: 10, year: 2020, edition: "03_2", available: true },
    RoundInfo { round: 11, year: 2023, edition: "02_0", available: true },
    RoundInfo { round: 12, year: 2025, edition: "01_0", available: false },
];

/// Every round the catalog knows about, released or not.
pub fn rounds() -> &'static [RoundInfo] {
    ROUNDS
}

pub fn lookup(round: u32) -> Option<&'static RoundInfo> {
    ROUNDS.iter().find(|r| r.round == round)
}

/// Round numbers that can currently be downloaded.
pub fn show_rounds() -> Vec<u32> {
    ROUNDS
        .iter()
        .filter(|r| r.available)
        .map(|r| r.round)
        .collect()
}
