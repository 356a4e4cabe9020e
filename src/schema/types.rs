// src/schema/types.rs

use serde::{Deserialize, Serialize};

/// Storage type a column is materialised as.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
    Utf8,
}

/// One coded value and the text it stands for.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct ValueLabel {
    pub value: String,
    pub label: String,
}

/// A single variable definition as read from a data file's dictionary.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub label: Option<String>,
    /// Display format as written by the source program (`%9.0g`, `F8.2`).
    pub format: Option<String>,
    pub value_labels: Vec<ValueLabel>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            label: None,
            format: None,
            value_labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.label = (!label.is_empty()).then_some(label);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        let format = format.into();
        self.format = (!format.is_empty()).then_some(format);
        self
    }
}
