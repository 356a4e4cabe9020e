// src/schema/arrow.rs

use arrow::array::{
    ArrayRef, Float32Builder, Float64Builder, Int16Builder, Int32Builder, Int8Builder,
    StringBuilder,
};
use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::{collections::HashMap, sync::Arc};

use super::types::{Column, ColumnType};

/// Field metadata key holding the variable label.
pub const LABEL_KEY: &str = "label";
/// Field metadata key holding the display format.
pub const FORMAT_KEY: &str = "format";
/// Field metadata key holding the value labels as a JSON array.
pub const VALUE_LABELS_KEY: &str = "value_labels";
/// Schema metadata key holding the dataset label.
pub const DATASET_LABEL_KEY: &str = "dataset_label";
/// Schema metadata key naming the reader that produced the batch.
pub const SOURCE_FORMAT_KEY: &str = "source_format";

pub fn map_to_arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Int8 => DataType::Int8,
        ColumnType::Int16 => DataType::Int16,
        ColumnType::Int32 => DataType::Int32,
        ColumnType::Float32 => DataType::Float32,
        ColumnType::Float64 => DataType::Float64,
        ColumnType::Utf8 => DataType::Utf8,
    }
}

fn field_metadata(col: &Column) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    if let Some(label) = &col.label {
        meta.insert(LABEL_KEY.to_string(), label.clone());
    }
    if let Some(format) = &col.format {
        meta.insert(FORMAT_KEY.to_string(), format.clone());
    }
    if !col.value_labels.is_empty() {
        if let Ok(json) = serde_json::to_string(&col.value_labels) {
            meta.insert(VALUE_LABELS_KEY.to_string(), json);
        }
    }
    meta
}

/// Build an ArrowSchema from column definitions, labels carried as field metadata.
pub fn build_arrow_schema(cols: &[Column], metadata: HashMap<String, String>) -> ArrowSchema {
    let fields: Vec<ArrowField> = cols
        .iter()
        .map(|col| {
            ArrowField::new(&col.name, map_to_arrow_type(col.ty), /* nullable = */ true)
                .with_metadata(field_metadata(col))
        })
        .collect();
    ArrowSchema::new_with_metadata(fields, metadata)
}

/// Typed Arrow builder for one column.
pub enum ColumnBuilder {
    Int8(Int8Builder),
    Int16(Int16Builder),
    Int32(Int32Builder),
    Float32(Float32Builder),
    Float64(Float64Builder),
    Utf8(StringBuilder),
}

impl ColumnBuilder {
    pub fn new(ty: ColumnType, capacity: usize) -> Self {
        match ty {
            ColumnType::Int8 => Self::Int8(Int8Builder::with_capacity(capacity)),
            ColumnType::Int16 => Self::Int16(Int16Builder::with_capacity(capacity)),
            ColumnType::Int32 => Self::Int32(Int32Builder::with_capacity(capacity)),
            ColumnType::Float32 => Self::Float32(Float32Builder::with_capacity(capacity)),
            ColumnType::Float64 => Self::Float64(Float64Builder::with_capacity(capacity)),
            ColumnType::Utf8 => Self::Utf8(StringBuilder::with_capacity(capacity, capacity * 8)),
        }
    }

    /// Append a number; integer columns receive it already range-checked by the reader.
    pub fn append_number(&mut self, v: Option<f64>) {
        match self {
            Self::Int8(b) => b.append_option(v.map(|x| x as i8)),
            Self::Int16(b) => b.append_option(v.map(|x| x as i16)),
            Self::Int32(b) => b.append_option(v.map(|x| x as i32)),
            Self::Float32(b) => b.append_option(v.map(|x| x as f32)),
            Self::Float64(b) => b.append_option(v),
            Self::Utf8(b) => b.append_option(v.map(|x| x.to_string())),
        }
    }

    pub fn append_text(&mut self, v: Option<&str>) {
        match self {
            Self::Utf8(b) => b.append_option(v),
            other => other.append_number(v.and_then(|s| s.trim().parse().ok())),
        }
    }

    pub fn finish(self) -> ArrayRef {
        match self {
            Self::Int8(mut b) => Arc::new(b.finish()),
            Self::Int16(mut b) => Arc::new(b.finish()),
            Self::Int32(mut b) => Arc::new(b.finish()),
            Self::Float32(mut b) => Arc::new(b.finish()),
            Self::Float64(mut b) => Arc::new(b.finish()),
            Self::Utf8(mut b) => Arc::new(b.finish()),
        }
    }
}

/// One builder per column, sized for `rows`.
pub fn builders_for(cols: &[Column], rows: usize) -> Vec<ColumnBuilder> {
    cols.iter().map(|c| ColumnBuilder::new(c.ty, rows)).collect()
}

/// Finish the builders into a batch; `rows` keeps zero-column files valid.
pub fn build_record_batch(
    cols: &[Column],
    builders: Vec<ColumnBuilder>,
    rows: usize,
    metadata: HashMap<String, String>,
) -> Result<RecordBatch, ArrowError> {
    let schema = Arc::new(build_arrow_schema(cols, metadata));
    let arrays: Vec<ArrayRef> = builders.into_iter().map(ColumnBuilder::finish).collect();
    RecordBatch::try_new_with_options(
        schema,
        arrays,
        &RecordBatchOptions::new().with_row_count(Some(rows)),
    )
}
