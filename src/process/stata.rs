// src/process/stata.rs

//! Reader for Stata `.dta` files: the tagged layout of releases 117-119 and
//! the older binary layout of releases 114/115.

use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use tracing::trace;

use super::utils::{
    decode_text, nul_terminated, uint_from_bytes, ByteReader, Endian, ReadError, TextEncoding,
};
use crate::schema::arrow::{DATASET_LABEL_KEY, SOURCE_FORMAT_KEY};
use crate::schema::{build_record_batch, builders_for, Column, ColumnType, ValueLabel};

const TAGGED_MAGIC: &[u8] = b"<stata_dta>";

// largest non-missing value per storage type; anything above is `.`, `.a` .. `.z`
const BYTE_MAX: i8 = 100;
const INT_MAX: i16 = 32_740;
const LONG_MAX: i32 = 2_147_483_620;
const FLOAT_MAX_BITS: u32 = 0x7eff_ffff;
const DOUBLE_MAX_BITS: u64 = 0x7fdf_ffff_ffff_ffff;

const GSO_ASCII: u8 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarType {
    Str(usize),
    StrL,
    Double,
    Float,
    Long,
    Int,
    Byte,
}

impl VarType {
    fn from_tagged_code(code: u16) -> Result<Self, ReadError> {
        match code {
            1..=2045 => Ok(VarType::Str(code as usize)),
            32768 => Ok(VarType::StrL),
            65526 => Ok(VarType::Double),
            65527 => Ok(VarType::Float),
            65528 => Ok(VarType::Long),
            65529 => Ok(VarType::Int),
            65530 => Ok(VarType::Byte),
            other => Err(ReadError::Invalid(format!("unknown variable type code {other}"))),
        }
    }

    fn from_legacy_code(code: u8) -> Result<Self, ReadError> {
        match code {
            1..=244 => Ok(VarType::Str(code as usize)),
            251 => Ok(VarType::Byte),
            252 => Ok(VarType::Int),
            253 => Ok(VarType::Long),
            254 => Ok(VarType::Float),
            255 => Ok(VarType::Double),
            other => Err(ReadError::Invalid(format!("unknown variable type code {other}"))),
        }
    }

    fn width(&self) -> usize {
        match self {
            VarType::Str(w) => *w,
            VarType::StrL | VarType::Double => 8,
            VarType::Float | VarType::Long => 4,
            VarType::Int => 2,
            VarType::Byte => 1,
        }
    }

    fn column_type(&self) -> ColumnType {
        match self {
            VarType::Str(_) | VarType::StrL => ColumnType::Utf8,
            VarType::Double => ColumnType::Float64,
            VarType::Float => ColumnType::Float32,
            VarType::Long => ColumnType::Int32,
            VarType::Int => ColumnType::Int16,
            VarType::Byte => ColumnType::Int8,
        }
    }
}

/// Variable dictionary; the same shape for both layouts.
struct Dictionary {
    release: u16,
    endian: Endian,
    encoding: TextEncoding,
    nobs: usize,
    dataset_label: String,
    types: Vec<VarType>,
    names: Vec<String>,
    formats: Vec<String>,
    label_names: Vec<String>,
    var_labels: Vec<String>,
}

impl Dictionary {
    fn record_len(&self) -> usize {
        self.types.iter().map(VarType::width).sum()
    }
}

type LabelTables = HashMap<String, Vec<(i32, String)>>;
type Strls = HashMap<(u64, u64), String>;

/// Parse a whole `.dta` file held in memory.
pub fn read_dta(buf: &[u8]) -> Result<RecordBatch, ReadError> {
    if buf.starts_with(TAGGED_MAGIC) {
        read_tagged(buf)
    } else {
        read_legacy(buf)
    }
}

fn read_fixed_strings(
    r: &mut ByteReader<'_>,
    count: usize,
    width: usize,
    encoding: TextEncoding,
) -> Result<Vec<String>, ReadError> {
    (0..count)
        .map(|_| r.take(width).map(|b| nul_terminated(b, encoding)))
        .collect()
}

fn data_len(record_len: usize, nobs: usize) -> Result<usize, ReadError> {
    record_len
        .checked_mul(nobs)
        .ok_or_else(|| ReadError::Invalid(format!("{nobs} observations overflow the data size")))
}

fn read_tagged(buf: &[u8]) -> Result<RecordBatch, ReadError> {
    let mut r = ByteReader::new(buf, Endian::Little);
    r.expect(b"<stata_dta><header><release>")?;
    let release = std::str::from_utf8(r.take(3)?)
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ReadError::Invalid("unreadable release number".into()))?;
    if !(117..=119).contains(&release) {
        return Err(ReadError::Unsupported(format!("Stata release {release}")));
    }
    r.expect(b"</release><byteorder>")?;
    let endian = match r.take(3)? {
        b"LSF" => Endian::Little,
        b"MSF" => Endian::Big,
        other => {
            return Err(ReadError::Invalid(format!(
                "byte order '{}'",
                String::from_utf8_lossy(other)
            )))
        }
    };
    r.set_endian(endian);

    r.expect(b"</byteorder><K>")?;
    let nvar = if release == 119 {
        r.u32()? as usize
    } else {
        r.u16()? as usize
    };
    r.expect(b"</K><N>")?;
    let nobs = if release == 117 {
        u64::from(r.u32()?)
    } else {
        r.u64()?
    };
    let nobs = usize::try_from(nobs)
        .map_err(|_| ReadError::Invalid(format!("{nobs} observations do not fit in memory")))?;

    let encoding = if release >= 118 {
        TextEncoding::Utf8
    } else {
        TextEncoding::Latin1
    };
    r.expect(b"</N><label>")?;
    let label_len = if release == 117 {
        r.u8()? as usize
    } else {
        r.u16()? as usize
    };
    let dataset_label = decode_text(r.take(label_len)?, encoding);
    r.expect(b"</label><timestamp>")?;
    let ts_len = r.u8()? as usize;
    r.skip(ts_len)?;
    r.expect(b"</timestamp></header><map>")?;
    r.skip(14 * 8)?;

    r.expect(b"</map><variable_types>")?;
    let types = (0..nvar)
        .map(|_| r.u16().and_then(VarType::from_tagged_code))
        .collect::<Result<Vec<_>, _>>()?;

    let (name_len, format_len, var_label_len) = if release == 117 {
        (33, 49, 81)
    } else {
        (129, 57, 321)
    };
    r.expect(b"</variable_types><varnames>")?;
    let names = read_fixed_strings(&mut r, nvar, name_len, encoding)?;
    r.expect(b"</varnames><sortlist>")?;
    r.skip((nvar + 1) * if release == 119 { 4 } else { 2 })?;
    r.expect(b"</sortlist><formats>")?;
    let formats = read_fixed_strings(&mut r, nvar, format_len, encoding)?;
    r.expect(b"</formats><value_label_names>")?;
    let label_names = read_fixed_strings(&mut r, nvar, name_len, encoding)?;
    r.expect(b"</value_label_names><variable_labels>")?;
    let var_labels = read_fixed_strings(&mut r, nvar, var_label_len, encoding)?;

    r.expect(b"</variable_labels><characteristics>")?;
    while r.peek(4) == Some(b"<ch>".as_slice()) {
        r.skip(4)?;
        let len = r.u32()? as usize;
        r.skip(len)?;
        r.expect(b"</ch>")?;
    }
    r.expect(b"</characteristics><data>")?;

    let dict = Dictionary {
        release,
        endian,
        encoding,
        nobs,
        dataset_label,
        types,
        names,
        formats,
        label_names,
        var_labels,
    };
    let data = r.take(data_len(dict.record_len(), nobs)?)?;
    r.expect(b"</data><strls>")?;

    let mut strls = Strls::new();
    while r.peek(3) == Some(b"GSO".as_slice()) {
        r.skip(3)?;
        let v = u64::from(r.u32()?);
        let o = if release == 117 {
            u64::from(r.u32()?)
        } else {
            r.u64()?
        };
        let kind = r.u8()?;
        let len = r.u32()? as usize;
        let contents = r.take(len)?;
        let text = if kind == GSO_ASCII {
            nul_terminated(contents, encoding)
        } else {
            decode_text(contents, encoding)
        };
        strls.insert((v, o), text);
    }
    r.expect(b"</strls><value_labels>")?;

    let mut tables = LabelTables::new();
    while r.peek(5) == Some(b"<lbl>".as_slice()) {
        r.skip(5)?;
        let len = r.u32()? as usize;
        let name = nul_terminated(r.take(name_len)?, encoding);
        r.skip(3)?;
        let table = r.take(len)?;
        tables.insert(name, parse_label_table(table, endian, encoding)?);
        r.expect(b"</lbl>")?;
    }
    r.expect(b"</value_labels></stata_dta>")?;

    trace!(release, nvar, nobs, "parsed tagged dta dictionary");
    build_batch(&dict, data, &strls, &tables)
}

fn read_legacy(buf: &[u8]) -> Result<RecordBatch, ReadError> {
    let mut r = ByteReader::new(buf, Endian::Little);
    let release = u16::from(r.u8()?);
    if release != 114 && release != 115 {
        return Err(ReadError::Invalid(format!(
            "not a Stata file (leading byte {release:#04x})"
        )));
    }
    let endian = match r.u8()? {
        1 => Endian::Big,
        2 => Endian::Little,
        other => return Err(ReadError::Invalid(format!("byte order flag {other}"))),
    };
    r.set_endian(endian);
    r.skip(2)?; // filetype, unused
    let nvar = r.u16()? as usize;
    let nobs = r.u32()? as usize;
    let encoding = TextEncoding::Latin1;
    let dataset_label = nul_terminated(r.take(81)?, encoding);
    r.skip(18)?; // timestamp

    let types = (0..nvar)
        .map(|_| r.u8().and_then(VarType::from_legacy_code))
        .collect::<Result<Vec<_>, _>>()?;
    let names = read_fixed_strings(&mut r, nvar, 33, encoding)?;
    r.skip(2 * (nvar + 1))?;
    let formats = read_fixed_strings(&mut r, nvar, 49, encoding)?;
    let label_names = read_fixed_strings(&mut r, nvar, 33, encoding)?;
    let var_labels = read_fixed_strings(&mut r, nvar, 81, encoding)?;

    // expansion fields, terminated by a zero type with zero length
    loop {
        let kind = r.u8()?;
        let len = r.u32()? as usize;
        if kind == 0 && len == 0 {
            break;
        }
        r.skip(len)?;
    }

    let dict = Dictionary {
        release,
        endian,
        encoding,
        nobs,
        dataset_label,
        types,
        names,
        formats,
        label_names,
        var_labels,
    };
    let data = r.take(data_len(dict.record_len(), nobs)?)?;

    let mut tables = LabelTables::new();
    while r.remaining() >= 4 {
        let len = r.u32()? as usize;
        let name = nul_terminated(r.take(33)?, encoding);
        r.skip(3)?;
        let table = r.take(len)?;
        tables.insert(name, parse_label_table(table, endian, encoding)?);
    }

    trace!(release, nvar, nobs, "parsed legacy dta dictionary");
    build_batch(&dict, data, &Strls::new(), &tables)
}

/// `n`, `txtlen`, `off[n]`, `val[n]`, `txt[txtlen]`
fn parse_label_table(
    table: &[u8],
    endian: Endian,
    encoding: TextEncoding,
) -> Result<Vec<(i32, String)>, ReadError> {
    let mut r = ByteReader::new(table, endian);
    let n = r.u32()? as usize;
    let txt_len = r.u32()? as usize;
    let offsets = (0..n)
        .map(|_| r.u32().map(|o| o as usize))
        .collect::<Result<Vec<_>, _>>()?;
    let values = (0..n).map(|_| r.i32()).collect::<Result<Vec<_>, _>>()?;
    let txt = r.take(txt_len)?;
    offsets
        .into_iter()
        .zip(values)
        .map(|(off, value)| {
            let text = txt
                .get(off..)
                .ok_or_else(|| ReadError::Invalid(format!("value label offset {off} out of range")))?;
            Ok((value, nul_terminated(text, encoding)))
        })
        .collect()
}

fn numeric_value(ty: VarType, cell: &[u8], endian: Endian) -> Option<f64> {
    let raw = uint_from_bytes(cell, endian);
    match ty {
        VarType::Byte => {
            let v = raw as u8 as i8;
            (v <= BYTE_MAX).then_some(f64::from(v))
        }
        VarType::Int => {
            let v = raw as u16 as i16;
            (v <= INT_MAX).then_some(f64::from(v))
        }
        VarType::Long => {
            let v = raw as u32 as i32;
            (v <= LONG_MAX).then_some(f64::from(v))
        }
        VarType::Float => {
            let v = f32::from_bits(raw as u32);
            (!v.is_nan() && v <= f32::from_bits(FLOAT_MAX_BITS)).then_some(f64::from(v))
        }
        VarType::Double => {
            let v = f64::from_bits(raw);
            (!v.is_nan() && v <= f64::from_bits(DOUBLE_MAX_BITS)).then_some(v)
        }
        VarType::Str(_) | VarType::StrL => None,
    }
}

/// `(v, o)` key of a strL cell; the split of its 8 bytes depends on the release.
fn strl_key(cell: &[u8], release: u16, endian: Endian) -> (u64, u64) {
    let v_len = match release {
        117 => 4,
        118 => 2,
        _ => 3,
    };
    (
        uint_from_bytes(&cell[..v_len], endian),
        uint_from_bytes(&cell[v_len..], endian),
    )
}

fn columns(dict: &Dictionary, tables: &LabelTables) -> Vec<Column> {
    dict.types
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            let mut col = Column::new(dict.names[i].clone(), ty.column_type())
                .with_label(dict.var_labels[i].clone())
                .with_format(dict.formats[i].clone());
            if let Some(table) = tables.get(&dict.label_names[i]) {
                col.value_labels = table
                    .iter()
                    .map(|(value, label)| ValueLabel {
                        value: value.to_string(),
                        label: label.clone(),
                    })
                    .collect();
            }
            col
        })
        .collect()
}

fn build_batch(
    dict: &Dictionary,
    data: &[u8],
    strls: &Strls,
    tables: &LabelTables,
) -> Result<RecordBatch, ReadError> {
    let cols = columns(dict, tables);
    let mut builders = builders_for(&cols, dict.nobs);
    let record_len = dict.record_len();

    if record_len > 0 {
        for row in data.chunks_exact(record_len) {
            let mut offset = 0;
            for (ty, builder) in dict.types.iter().zip(builders.iter_mut()) {
                let cell = &row[offset..offset + ty.width()];
                offset += ty.width();
                match ty {
                    VarType::Str(_) => {
                        builder.append_text(Some(&nul_terminated(cell, dict.encoding)))
                    }
                    VarType::StrL => match strl_key(cell, dict.release, dict.endian) {
                        (0, 0) => builder.append_text(Some("")),
                        key => builder.append_text(strls.get(&key).map(String::as_str)),
                    },
                    numeric => builder.append_number(numeric_value(*numeric, cell, dict.endian)),
                }
            }
        }
    }

    let mut metadata = HashMap::from([(SOURCE_FORMAT_KEY.to_string(), "stata".to_string())]);
    if !dict.dataset_label.is_empty() {
        metadata.insert(DATASET_LABEL_KEY.to_string(), dict.dataset_label.clone());
    }
    Ok(build_record_batch(&cols, builders, dict.nobs, metadata)?)
}
