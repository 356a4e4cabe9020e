// src/process/mod.rs

//! Turning downloaded archives into tables: extraction, version selection and
//! the binary readers for each file format.

pub mod extract;
pub mod reader;
pub mod spss;
pub mod stata;
pub mod utils;
pub mod version;
pub mod xport;

pub use extract::{extract_archive, working_dir_for};
pub use reader::{find_data_files, read_data_file, read_latest, reader_for, ParsedFile};
pub use utils::ReadError;
pub use version::{select_latest, version_from_filename, Version};
