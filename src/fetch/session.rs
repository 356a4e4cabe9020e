// src/fetch/session.rs

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::PortalConfig;
use crate::error::{Error, Result};

pub const LOGIN_PATH: &str = "user/login";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex should compile"));

/// Phrases the portal uses when it refuses an address.
const REJECTION_PHRASES: &[&str] = &[
    "not associated with any registered user",
    "not registered",
    "validate your email",
    "invalid email",
    "unknown user",
];

/// HTTP client for the portal without any login.
pub fn build_client(config: &PortalConfig) -> Result<Client> {
    Client::builder()
        .cookie_store(true)
        .user_agent(config.user_agent.clone())
        .timeout(config.timeout_secs.map(Duration::from_secs))
        .build()
        .map_err(|e| Error::Config(format!("building HTTP client: {e}")))
}

pub fn validate_email(email: &str) -> Result<()> {
    if EMAIL_RE.is_match(email.trim()) {
        Ok(())
    } else {
        Err(Error::InvalidCredential(email.to_string()))
    }
}

/// A logged-in connection to the portal. Cookies set by the login response
/// ride along on every later request made through it.
pub struct Session {
    client: Client,
    base_url: Url,
    email: String,
}

impl Session {
    #[instrument(level = "info", skip(config, email))]
    pub fn login(config: &PortalConfig, email: &str) -> Result<Self> {
        let email = email.trim();
        validate_email(email)?;
        let base_url = config.base_url()?;
        let client = build_client(config)?;

        let login_url = base_url
            .join(LOGIN_PATH)
            .map_err(|e| Error::Config(format!("joining {LOGIN_PATH} onto {base_url}: {e}")))?;
        debug!(url = %login_url, "submitting login form");
        let resp = client
            .post(login_url.clone())
            .form(&[("u", email), ("B1", "Login")])
            .send()
            .map_err(|e| Error::network(&login_url, e))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::CredentialRejected {
                email: email.to_string(),
                reason: format!("login answered with HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: login_url.to_string(),
                status,
            });
        }
        let body = resp.text().map_err(|e| Error::network(&login_url, e))?;
        if let Some(reason) = rejection_reason(&body) {
            return Err(Error::CredentialRejected {
                email: email.to_string(),
                reason,
            });
        }

        info!("authenticated with portal");
        Ok(Self {
            client,
            base_url,
            email: email.to_string(),
        })
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET through the session; non-success statuses become errors.
    pub fn get(&self, url: &Url) -> Result<Response> {
        let resp = self
            .client
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
        Ok(resp)
    }
}

/// Why the login page refused us, if it did.
pub fn rejection_reason(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(".error, .alert-danger, #login-error")
        .expect("CSS selector for login errors should be valid");
    let flagged = doc
        .select(&sel)
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|t| !t.is_empty());
    if flagged.is_some() {
        return flagged;
    }

    let lower = html.to_lowercase();
    REJECTION_PHRASES
        .iter()
        .find(|phrase| lower.contains(*phrase))
        .map(|phrase| format!("login page says '{phrase}'"))
}
