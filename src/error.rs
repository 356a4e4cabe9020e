// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::Format;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad class of a failure, matching the stage of the pipeline it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Network,
    Archive,
    Parse,
    Io,
    Config,
}

/// One reader that was tried on a file and why it gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAttempt {
    pub format: Format,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("no rounds requested; pass at least one round number")]
    NoRounds,

    #[error("'{0}' is not a valid round number")]
    NonNumericRound(String),

    #[error("round {round} is not a valid ESS round; valid rounds are {available}")]
    UnknownRound { round: u32, available: String },

    #[error("round {0} is not yet available for download")]
    UnavailableRound(u32),

    #[error("format '{format}' is not supported for {operation}; use stata or spss")]
    UnsupportedFormat {
        format: Format,
        operation: &'static str,
    },

    #[error("unknown format '{0}'; expected one of stata, spss, sas")]
    UnknownFormat(String),

    #[error("output directory {} does not exist", .0.display())]
    MissingOutputDir(PathBuf),

    #[error("country '{country}' is not listed on the portal; listed countries are {available}")]
    UnknownCountry { country: String, available: String },

    #[error("round {round} is not available for {country}; available rounds are {available}")]
    CountryRound {
        country: String,
        round: u32,
        available: String,
    },

    #[error(
        "no email supplied and none registered; pass the email you registered with the portal \
         or set ESS_EMAIL"
    )]
    MissingCredential,

    #[error("'{0}' is not a valid email address")]
    InvalidCredential(String),

    #[error(
        "the portal rejected {email}: {reason}; register the address at \
         https://www.europeansocialsurvey.org/user/new"
    )]
    CredentialRejected { email: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to read archive {}: {}", .path.display(), .source)]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("no {expected} data file found in {}", .dir.display())]
    NoDataFile { dir: PathBuf, expected: String },

    #[error("could not parse {}: {}", .path.display(), describe_attempts(.attempts))]
    Parse {
        path: PathBuf,
        attempts: Vec<ParseAttempt>,
    },

    #[error("I/O error on {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to write {}: {}", .path.display(), .source)]
    Parquet {
        path: PathBuf,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoRounds
            | Error::NonNumericRound(_)
            | Error::UnknownRound { .. }
            | Error::UnavailableRound(_)
            | Error::UnsupportedFormat { .. }
            | Error::UnknownFormat(_)
            | Error::MissingOutputDir(_)
            | Error::UnknownCountry { .. }
            | Error::CountryRound { .. } => ErrorKind::Validation,
            Error::MissingCredential
            | Error::InvalidCredential(_)
            | Error::CredentialRejected { .. } => ErrorKind::Authentication,
            Error::Network { .. } | Error::HttpStatus { .. } => ErrorKind::Network,
            Error::Archive { .. } => ErrorKind::Archive,
            Error::NoDataFile { .. } | Error::Parse { .. } | Error::Arrow(_) => ErrorKind::Parse,
            Error::Io { .. } | Error::Parquet { .. } => ErrorKind::Io,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn network(url: impl ToString, source: reqwest::Error) -> Self {
        Error::Network {
            url: url.to_string(),
            source,
        }
    }
}

fn describe_attempts(attempts: &[ParseAttempt]) -> String {
    if attempts.is_empty() {
        return "no reader was tried".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{} reader: {}", a.format, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
