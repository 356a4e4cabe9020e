// src/process/xport.rs

//! Reader for SAS transport (XPORT version 5) files, as shipped for the
//! early rounds.

use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use tracing::trace;

use super::utils::{space_padded, uint_from_bytes, ByteReader, Endian, ReadError, TextEncoding};
use crate::schema::arrow::{DATASET_LABEL_KEY, SOURCE_FORMAT_KEY};
use crate::schema::{build_record_batch, builders_for, Column, ColumnType};

const RECORD: usize = 80;
const LIBRARY_HEADER: &[u8] = b"HEADER RECORD*******LIBRARY HEADER RECORD!!!!!!!";
const LIBRARY_V8_HEADER: &[u8] = b"HEADER RECORD*******LIBV8   HEADER RECORD!!!!!!!";
const MEMBER_HEADER: &[u8] = b"HEADER RECORD*******MEMBER  HEADER RECORD!!!!!!!";
const DESCRIPTOR_HEADER: &[u8] = b"HEADER RECORD*******DSCRPTR HEADER RECORD!!!!!!!";
const NAMESTR_HEADER: &[u8] = b"HEADER RECORD*******NAMESTR HEADER RECORD!!!!!!!";
const OBS_HEADER: &[u8] = b"HEADER RECORD*******OBS     HEADER RECORD!!!!!!!";

/// Meaningful prefix of a namestr; the remainder is reserved.
const NAMESTR_USED: usize = 88;

#[derive(Debug)]
struct Namestr {
    numeric: bool,
    length: usize,
    name: String,
    label: String,
    format: Option<String>,
    position: usize,
}

fn header_record<'a>(r: &mut ByteReader<'a>, prefix: &[u8]) -> Result<&'a [u8], ReadError> {
    let record = r.take(RECORD)?;
    if !record.starts_with(prefix) {
        return Err(ReadError::Tag {
            expected: String::from_utf8_lossy(prefix).into_owned(),
            at: r.position() - RECORD,
        });
    }
    Ok(record)
}

/// Four-digit ASCII number embedded in a header record.
fn ascii_number(field: &[u8]) -> Result<usize, ReadError> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| {
            ReadError::Invalid(format!(
                "expected a number, found '{}'",
                String::from_utf8_lossy(field)
            ))
        })
}

fn sas_format(name: &str, width: u64, decimals: u64) -> Option<String> {
    if name.is_empty() && width == 0 {
        return None;
    }
    let width = if width > 0 { width.to_string() } else { String::new() };
    let decimals = if decimals > 0 {
        decimals.to_string()
    } else {
        String::new()
    };
    Some(format!("{name}{width}.{decimals}"))
}

fn parse_namestr(raw: &[u8]) -> Result<Namestr, ReadError> {
    let mut r = ByteReader::new(raw, Endian::Big);
    let ntype = r.i16()?;
    r.skip(2)?; // nhfun
    let length = usize::from(r.u16()?);
    r.skip(2)?; // varnum
    let name = space_padded(r.take(8)?, TextEncoding::Latin1);
    let label = space_padded(r.take(40)?, TextEncoding::Latin1);
    let format_name = space_padded(r.take(8)?, TextEncoding::Latin1);
    let format_width = u64::from(r.u16()?);
    let format_decimals = u64::from(r.u16()?);
    r.skip(2 + 2)?; // justification, fill
    r.skip(8 + 2 + 2)?; // informat
    let position = r.count32()?;
    if length == 0 || (ntype == 1 && length > 8) {
        return Err(ReadError::Invalid(format!(
            "variable {name} has invalid length {length}"
        )));
    }
    Ok(Namestr {
        numeric: ntype == 1,
        length,
        name,
        label,
        format: sas_format(&format_name, format_width, format_decimals),
        position,
    })
}

/// IBM System/370 hex float, `length` bytes, zero-extended to eight.
/// Missing values are `.`, `._` or `.A`-`.Z` in the first byte with a zero mantissa.
pub fn ibm_to_f64(bytes: &[u8]) -> Option<f64> {
    let mut raw = [0u8; 8];
    raw[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
    let first = raw[0];
    let missing_code = first == b'.' || first == b'_' || first.is_ascii_uppercase();
    if missing_code && raw[1..].iter().all(|&b| b == 0) {
        return None;
    }
    let sign = if first & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from(first & 0x7f) - 64;
    let mantissa = uint_from_bytes(&raw[1..], Endian::Big) as f64 / 2f64.powi(56);
    Some(sign * mantissa * 16f64.powi(exponent))
}

/// Parse the first member of a transport library held in memory.
pub fn read_xpt(buf: &[u8]) -> Result<RecordBatch, ReadError> {
    if buf.starts_with(LIBRARY_V8_HEADER) {
        return Err(ReadError::Unsupported("SAS transport version 8".into()));
    }
    let mut r = ByteReader::new(buf, Endian::Big);
    header_record(&mut r, LIBRARY_HEADER)?;
    r.skip(2 * RECORD)?; // library created / modified

    let member = header_record(&mut r, MEMBER_HEADER)?;
    let namestr_len = ascii_number(&member[74..78])?;
    if namestr_len < NAMESTR_USED {
        return Err(ReadError::Invalid(format!("namestr length {namestr_len}")));
    }
    header_record(&mut r, DESCRIPTOR_HEADER)?;
    let member_first = r.take(RECORD)?;
    let member_second = r.take(RECORD)?;
    let dataset_name = space_padded(&member_first[8..16], TextEncoding::Latin1);
    let dataset_label = space_padded(&member_second[32..72], TextEncoding::Latin1);

    let namestr_header = header_record(&mut r, NAMESTR_HEADER)?;
    let nvars = ascii_number(&namestr_header[54..58])?;
    let vars = (0..nvars)
        .map(|_| r.take(namestr_len).and_then(|raw| parse_namestr(&raw[..NAMESTR_USED])))
        .collect::<Result<Vec<_>, _>>()?;
    let namestr_bytes = nvars * namestr_len;
    r.skip((RECORD - namestr_bytes % RECORD) % RECORD)?;
    header_record(&mut r, OBS_HEADER)?;

    // observations run to the next member or the end of the file
    let rest = r.rest();
    let obs_end = (0..rest.len())
        .step_by(RECORD)
        .find(|&at| rest[at..].starts_with(MEMBER_HEADER))
        .unwrap_or(rest.len());
    let obs = &rest[..obs_end];

    let row_len: usize = vars.iter().map(|v| v.length).sum();
    for v in &vars {
        if v.position + v.length > row_len {
            return Err(ReadError::Invalid(format!("variable {} overruns the row", v.name)));
        }
    }
    let mut rows: Vec<&[u8]> = if row_len == 0 {
        Vec::new()
    } else {
        obs.chunks_exact(row_len).collect()
    };
    // the last record is blank padded to 80 bytes
    while rows
        .last()
        .is_some_and(|row| row.iter().all(|&b| b == b' '))
    {
        rows.pop();
    }
    trace!(dataset = %dataset_name, nvars, rows = rows.len(), "parsed xport member");

    let cols: Vec<Column> = vars
        .iter()
        .map(|v| {
            let ty = if v.numeric {
                ColumnType::Float64
            } else {
                ColumnType::Utf8
            };
            let mut col = Column::new(v.name.clone(), ty).with_label(v.label.clone());
            col.format = v.format.clone();
            col
        })
        .collect();
    let mut builders = builders_for(&cols, rows.len());
    for row in &rows {
        for (v, builder) in vars.iter().zip(builders.iter_mut()) {
            let cell = &row[v.position..v.position + v.length];
            if v.numeric {
                builder.append_number(ibm_to_f64(cell));
            } else {
                builder.append_text(Some(&space_padded(cell, TextEncoding::Latin1)));
            }
        }
    }

    let mut metadata = HashMap::from([(SOURCE_FORMAT_KEY.to_string(), "sas".to_string())]);
    let label = if dataset_label.is_empty() {
        dataset_name
    } else {
        dataset_label
    };
    if !label.is_empty() {
        metadata.insert(DATASET_LABEL_KEY.to_string(), label);
    }
    Ok(build_record_batch(&cols, builders, rows.len(), metadata)?)
}
