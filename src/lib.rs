// src/lib.rs

//! Client for the European Social Survey data portal: resolve rounds, log in
//! with a registered email, download the round archives and read them into
//! labelled Arrow tables.

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod import;
pub mod process;
pub mod schema;
pub mod table;

#[cfg(test)]
pub(crate) mod fixtures;

pub use catalog::{lookup, rounds, show_rounds, Format, RoundInfo};
pub use config::PortalConfig;
pub use error::{Error, ErrorKind, Result};
pub use fetch::urls::parse_rounds;
pub use import::{Imported, Portal};
pub use table::Table;
