// src/fetch/countries.rs

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};
use url::Url;

use super::session::build_client;
use super::urls::{join_rounds, RoundUrl};
use crate::catalog::Format;
use crate::config::PortalConfig;
use crate::error::{Error, Result};
use crate::process::version::version_from_filename;

pub const COUNTRY_INDEX_PATH: &str = "data/country_index.html";
pub const COUNTRY_PATH: &str = "data/country.html";

static COUNTRY_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^ESS(\d+).*\.(stata|spss|sas)\.zip$")
        .expect("country file regex should compile")
});

/// A country as listed on the portal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Country {
    pub name: String,
    /// Value of the `c` parameter on the portal's country pages.
    pub slug: String,
}

fn get_text(client: &Client, url: &Url) -> Result<String> {
    debug!(%url, "fetching page");
    let resp = client
        .get(url.clone())
        .send()
        .map_err(|e| Error::network(url, e))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            url: url.to_string(),
            status,
        });
    }
    resp.text().map_err(|e| Error::network(url, e))
}

/// Every `a[href*="country.html?c="]` on the index page, sorted by name.
pub fn parse_country_index(html: &str, base: &Url) -> Vec<Country> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(r#"a[href*="country.html?c="]"#)
        .expect("CSS selector for country links should be valid");

    let mut countries: Vec<Country> = doc
        .select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let link = base.join(href).ok()?;
            let slug = link
                .query_pairs()
                .find(|(k, _)| k == "c")
                .map(|(_, v)| v.into_owned())
                .filter(|s| !s.is_empty())?;
            let name = el.text().collect::<String>().trim().to_string();
            if name.is_empty() {
                return None;
            }
            Some(Country { name, slug })
        })
        .collect();
    countries.sort();
    countries.dedup_by(|a, b| a.name.eq_ignore_ascii_case(&b.name));
    countries
}

/// Download links on a country page, one per (round, format), latest edition kept.
pub fn parse_country_downloads(html: &str, base: &Url) -> Vec<RoundUrl> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(r#"a[href*="download?f="]"#)
        .expect("CSS selector for download links should be valid");

    let mut latest: BTreeMap<(u32, Format), (String, RoundUrl)> = BTreeMap::new();
    for el in doc.select(&sel) {
        let Some(url) = el.value().attr("href").and_then(|h| base.join(h).ok()) else {
            continue;
        };
        let Some(file) = url
            .query_pairs()
            .find(|(k, _)| k == "f")
            .map(|(_, v)| v.into_owned())
        else {
            continue;
        };
        let Some(caps) = COUNTRY_FILE_RE.captures(&file) else {
            continue;
        };
        let Ok(round) = caps[1].parse::<u32>() else {
            continue;
        };
        let Ok(format) = caps[2].parse::<Format>() else {
            continue;
        };

        let candidate = RoundUrl { round, format, url };
        let keep_existing = latest
            .get(&(round, format))
            .map_or(false, |(kept, _)| newer_or_equal(kept, &file));
        if !keep_existing {
            latest.insert((round, format), (file, candidate));
        }
    }
    latest.into_values().map(|(_, target)| target).collect()
}

fn newer_or_equal(kept: &str, other: &str) -> bool {
    (version_from_filename(kept), kept) >= (version_from_filename(other), other)
}

#[instrument(level = "info", skip(config))]
pub fn show_countries(config: &PortalConfig) -> Result<Vec<String>> {
    Ok(list_countries(config)?
        .into_iter()
        .map(|c| c.name)
        .collect())
}

pub fn list_countries(config: &PortalConfig) -> Result<Vec<Country>> {
    let base = config.base_url()?;
    let client = build_client(config)?;
    let index = base
        .join(COUNTRY_INDEX_PATH)
        .map_err(|e| Error::Config(format!("joining {COUNTRY_INDEX_PATH} onto {base}: {e}")))?;
    let countries = parse_country_index(&get_text(&client, &index)?, &base);
    info!(count = countries.len(), "listed countries");
    Ok(countries)
}

fn find_country(config: &PortalConfig, country: &str) -> Result<Country> {
    let countries = list_countries(config)?;
    let wanted = country.trim();
    countries
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(wanted) || c.slug.eq_ignore_ascii_case(wanted))
        .cloned()
        .ok_or_else(|| Error::UnknownCountry {
            country: wanted.to_string(),
            available: countries
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

fn country_downloads(config: &PortalConfig, country: &Country) -> Result<Vec<RoundUrl>> {
    let base = config.base_url()?;
    let client = build_client(config)?;
    let mut page = base
        .join(COUNTRY_PATH)
        .map_err(|e| Error::Config(format!("joining {COUNTRY_PATH} onto {base}: {e}")))?;
    page.query_pairs_mut().append_pair("c", &country.slug);
    Ok(parse_country_downloads(&get_text(&client, &page)?, &base))
}

/// Rounds the country took part in, as listed on its page.
#[instrument(level = "info", skip(config))]
pub fn show_country_rounds(config: &PortalConfig, country: &str) -> Result<Vec<u32>> {
    let country = find_country(config, country)?;
    let mut rounds: Vec<u32> = country_downloads(config, &country)?
        .into_iter()
        .map(|t| t.round)
        .collect();
    rounds.sort_unstable();
    rounds.dedup();
    Ok(rounds)
}

/// Download locations for `rounds` (already validated) of one country.
pub fn country_round_urls(
    config: &PortalConfig,
    country: &str,
    rounds: &[u32],
    format: Format,
) -> Result<Vec<RoundUrl>> {
    let country = find_country(config, country)?;
    let downloads = country_downloads(config, &country)?;
    let mut offered: Vec<u32> = downloads.iter().map(|t| t.round).collect();
    offered.sort_unstable();
    offered.dedup();

    rounds
        .iter()
        .map(|&round| {
            downloads
                .iter()
                .find(|t| t.round == round && t.format == format)
                .cloned()
                .ok_or_else(|| Error::CountryRound {
                    country: country.name.clone(),
                    round,
                    available: join_rounds(&offered),
                })
        })
        .collect()
}
