pub mod arrow;
pub mod types;

pub use self::arrow::{
    build_arrow_schema, build_record_batch, builders_for, map_to_arrow_type, ColumnBuilder,
};
pub use types::{Column, ColumnType, ValueLabel};
