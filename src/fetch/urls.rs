// src/fetch/urls.rs

use std::path::Path;
use url::Url;

use crate::catalog::{self, Format, RoundInfo, DOWNLOAD_PATH};
use crate::error::{Error, Result};

/// What the caller intends to do with the resolved files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Import,
    Download,
}

impl Purpose {
    fn describe(&self) -> &'static str {
        match self {
            Purpose::Import => "importing rounds into tables",
            Purpose::Download => "downloading rounds",
        }
    }
}

/// A download location for one round in one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundUrl {
    pub round: u32,
    pub format: Format,
    pub url: Url,
}

impl RoundUrl {
    /// Name to save the archive under: the `f` query parameter, else the
    /// last path segment. Only the final path component is kept.
    pub fn file_name(&self) -> String {
        let from_query = self
            .url
            .query_pairs()
            .find(|(k, _)| k == "f")
            .map(|(_, v)| v.into_owned());
        let from_path = || {
            self.url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        };
        from_query
            .or_else(from_path)
            .and_then(|name| {
                Path::new(&name)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| format!("ESS{}.{}.zip", self.round, self.format))
    }
}

/// Keep the first occurrence of every round, in request order.
pub fn unique_rounds(rounds: &[u32]) -> Vec<u32> {
    let mut seen = Vec::with_capacity(rounds.len());
    for &r in rounds {
        if !seen.contains(&r) {
            seen.push(r);
        }
    }
    seen
}

/// Parse a comma or whitespace separated list such as `"1, 2 3"`.
pub fn parse_rounds(raw: &str) -> Result<Vec<u32>> {
    let rounds = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| Error::NonNumericRound(s.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    if rounds.is_empty() {
        return Err(Error::NoRounds);
    }
    Ok(rounds)
}

pub fn check_format(format: Format, purpose: Purpose) -> Result<()> {
    if purpose == Purpose::Import && !format.supports_import() {
        return Err(Error::UnsupportedFormat {
            format,
            operation: purpose.describe(),
        });
    }
    Ok(())
}

/// Deduplicate and look up every requested round in the catalog.
pub fn validate_rounds(rounds: &[u32]) -> Result<Vec<&'static RoundInfo>> {
    if rounds.is_empty() {
        return Err(Error::NoRounds);
    }
    unique_rounds(rounds)
        .into_iter()
        .map(|round| match catalog::lookup(round) {
            None => Err(Error::UnknownRound {
                round,
                available: join_rounds(&catalog::show_rounds()),
            }),
            Some(info) if !info.available => Err(Error::UnavailableRound(round)),
            Some(info) => Ok(info),
        })
        .collect()
}

/// `{base}/file/download?f=ESS1e06_6.stata.zip&c=&y=2002`
pub fn round_url(info: &RoundInfo, format: Format, base: &Url) -> Result<RoundUrl> {
    let mut url = base
        .join(DOWNLOAD_PATH)
        .map_err(|e| Error::Config(format!("joining {DOWNLOAD_PATH} onto {base}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("f", &info.archive_name(format))
        .append_pair("c", "")
        .append_pair("y", &info.year.to_string());
    Ok(RoundUrl {
        round: info.round,
        format,
        url,
    })
}

/// Validate everything locally, then build one URL per unique round.
pub fn resolve_round_urls(
    rounds: &[u32],
    format: Format,
    purpose: Purpose,
    base: &Url,
) -> Result<Vec<RoundUrl>> {
    check_format(format, purpose)?;
    validate_rounds(rounds)?
        .into_iter()
        .map(|info| round_url(info, format, base))
        .collect()
}

pub(crate) fn join_rounds(rounds: &[u32]) -> String {
    rounds
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
