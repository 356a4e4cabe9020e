// src/fetch/mod.rs

//! Everything that talks to the portal: URL building, login, archive
//! downloads and the public country listings.

pub mod countries;
pub mod session;
pub mod urls;
pub mod zips;

pub use session::Session;
pub use urls::{resolve_round_urls, Purpose, RoundUrl};
pub use zips::{download_all, download_round};
