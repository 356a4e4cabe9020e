// src/table.rs
use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{fs::File, path::Path};
use tracing::info;

use crate::catalog::Format;
use crate::error::{Error, Result};
use crate::process::{ParsedFile, Version};
use crate::schema::arrow::{DATASET_LABEL_KEY, LABEL_KEY, VALUE_LABELS_KEY};
use crate::schema::ValueLabel;

/// One round read into memory.
#[derive(Debug, Clone)]
pub struct Table {
    pub round: u32,
    /// Edition of the data file, when its name carries one.
    pub version: Option<Version>,
    /// Reader that parsed the file.
    pub format: Format,
    pub source_file: String,
    pub batch: RecordBatch,
}

impl Table {
    pub(crate) fn from_parsed(round: u32, parsed: ParsedFile) -> Self {
        let source_file = parsed
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            round,
            version: parsed.version,
            format: parsed.format,
            source_file,
            batch: parsed.batch,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Question text attached to a variable.
    pub fn variable_label(&self, name: &str) -> Option<String> {
        let schema = self.batch.schema();
        let field = schema.field_with_name(name).ok()?;
        field.metadata().get(LABEL_KEY).cloned()
    }

    /// Coded answers of a variable; empty when it has none or does not exist.
    pub fn value_labels(&self, name: &str) -> Vec<ValueLabel> {
        let schema = self.batch.schema();
        schema
            .field_with_name(name)
            .ok()
            .and_then(|f| f.metadata().get(VALUE_LABELS_KEY).cloned())
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default()
    }

    pub fn dataset_label(&self) -> Option<String> {
        self.batch.schema().metadata().get(DATASET_LABEL_KEY).cloned()
    }

    /// Persist the table, labels included in the Arrow schema, as Snappy Parquet.
    pub fn write_parquet(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let parquet_err = |source| Error::Parquet {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer =
            ArrowWriter::try_new(file, self.batch.schema(), Some(props)).map_err(parquet_err)?;
        writer.write(&self.batch).map_err(parquet_err)?;
        writer.close().map_err(parquet_err)?;

        info!(round = self.round, rows = self.num_rows(), path = %path.display(), "wrote parquet");
        Ok(())
    }
}
