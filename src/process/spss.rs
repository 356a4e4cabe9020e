// src/process/spss.rs

//! Reader for SPSS system files (`.sav`), uncompressed or bytecode compressed.

use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use tracing::trace;

use super::utils::{
    decode_text, f64_from_bytes, f64_to_bytes, space_padded, uint_from_bytes, ByteReader, Endian,
    ReadError, TextEncoding,
};
use crate::schema::arrow::{DATASET_LABEL_KEY, SOURCE_FORMAT_KEY};
use crate::schema::{build_record_batch, builders_for, Column, ColumnType, ValueLabel};

const SYSMIS: f64 = -f64::MAX;
const HEADER_LEN: usize = 176;

const REC_VARIABLE: i32 = 2;
const REC_VALUE_LABELS: i32 = 3;
const REC_LABEL_VARS: i32 = 4;
const REC_DOCUMENT: i32 = 6;
const REC_EXTENSION: i32 = 7;
const REC_END: i32 = 999;

const EXT_MACHINE_INTEGER: i32 = 3;
const EXT_LONG_NAMES: i32 = 13;
const EXT_VERY_LONG_STRINGS: i32 = 14;
const EXT_ENCODING: i32 = 20;

type Slot = [u8; 8];

/// Bytes of text carried by every segment of a very long string but the last.
const SEGMENT_USED: usize = 252;

#[derive(Debug, Clone, PartialEq)]
enum Missing {
    None,
    Discrete(Vec<Slot>),
    Range {
        low: f64,
        high: f64,
        extra: Option<f64>,
    },
}

#[derive(Debug)]
struct Variable {
    short_name: String,
    /// 0 for numeric variables
    width: usize,
    slots: usize,
    label: Option<Vec<u8>>,
    print_format: u32,
    missing: Missing,
    value_labels: Vec<(Slot, Vec<u8>)>,
}

impl Variable {
    fn is_numeric(&self) -> bool {
        self.width == 0
    }

    fn is_missing_number(&self, v: f64, endian: Endian) -> bool {
        match &self.missing {
            Missing::None => false,
            Missing::Discrete(values) => values.iter().any(|s| f64_from_bytes(*s, endian) == v),
            Missing::Range { low, high, extra } => {
                (*low..=*high).contains(&v) || *extra == Some(v)
            }
        }
    }

    fn is_missing_text(&self, v: &str, encoding: TextEncoding) -> bool {
        match &self.missing {
            Missing::Discrete(values) => values
                .iter()
                .any(|s| space_padded(s, encoding) == v.trim_end()),
            _ => false,
        }
    }
}

/// Everything before the case data.
struct Dictionary {
    endian: Endian,
    compression: i32,
    ncases: Option<usize>,
    bias: f64,
    file_label: Vec<u8>,
    variables: Vec<Variable>,
    long_names: HashMap<String, String>,
    /// short name → full width of strings wider than 255 bytes
    very_long: HashMap<String, usize>,
    encoding: TextEncoding,
}

/// Dictionary variables that make up one column: a single variable, or the
/// consecutive segments of a very long string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Group {
    first: usize,
    segments: usize,
    width: usize,
}

fn groups(dict: &Dictionary) -> Vec<Group> {
    let vars = &dict.variables;
    let mut out = Vec::with_capacity(vars.len());
    let mut i = 0;
    while i < vars.len() {
        let var = &vars[i];
        let group = match dict.very_long.get(&var.short_name) {
            Some(&width) if !var.is_numeric() && width > 255 => Group {
                first: i,
                segments: width.div_ceil(SEGMENT_USED).min(vars.len() - i),
                width,
            },
            _ => Group {
                first: i,
                segments: 1,
                width: var.width,
            },
        };
        i += group.segments;
        out.push(group);
    }
    out
}

/// Source of the 8-byte slots that make up each case.
trait SlotSource {
    /// `None` once the data is exhausted.
    fn next_slot(&mut self) -> Result<Option<Slot>, ReadError>;
}

fn read_slot(r: &mut ByteReader<'_>) -> Result<Slot, ReadError> {
    let mut slot = [0u8; 8];
    slot.copy_from_slice(r.take(8)?);
    Ok(slot)
}

struct RawSlots<'a> {
    r: ByteReader<'a>,
}

impl SlotSource for RawSlots<'_> {
    fn next_slot(&mut self) -> Result<Option<Slot>, ReadError> {
        if self.r.remaining() < 8 {
            return Ok(None);
        }
        read_slot(&mut self.r).map(Some)
    }
}

/// Blocks of eight command bytes, each followed by the raw slots it refers to.
struct BytecodeSlots<'a> {
    r: ByteReader<'a>,
    bias: f64,
    codes: [u8; 8],
    next: usize,
    done: bool,
}

impl<'a> BytecodeSlots<'a> {
    fn new(r: ByteReader<'a>, bias: f64) -> Self {
        Self {
            r,
            bias,
            codes: [0; 8],
            next: 8,
            done: false,
        }
    }
}

impl SlotSource for BytecodeSlots<'_> {
    fn next_slot(&mut self) -> Result<Option<Slot>, ReadError> {
        let endian = self.r.endian();
        loop {
            if self.done {
                return Ok(None);
            }
            if self.next == self.codes.len() {
                if self.r.remaining() < 8 {
                    self.done = true;
                    return Ok(None);
                }
                self.codes.copy_from_slice(self.r.take(8)?);
                self.next = 0;
            }
            let code = self.codes[self.next];
            self.next += 1;
            match code {
                0 => continue,
                252 => self.done = true,
                253 => return read_slot(&mut self.r).map(Some),
                254 => return Ok(Some([b' '; 8])),
                255 => return Ok(Some(f64_to_bytes(SYSMIS, endian))),
                n => return Ok(Some(f64_to_bytes(f64::from(n) - self.bias, endian))),
            }
        }
    }
}

/// Parse a whole `.sav` file held in memory.
pub fn read_sav(buf: &[u8]) -> Result<RecordBatch, ReadError> {
    let (dict, data) = read_dictionary(buf)?;
    trace!(
        variables = dict.variables.len(),
        compression = dict.compression,
        "parsed sav dictionary"
    );
    let r = ByteReader::new(data, dict.endian);
    let case_bytes = dict.variables.iter().map(|v| v.slots * 8).sum::<usize>().max(1);
    // a header count is only a hint; never reserve for more cases than the data can hold
    let room = match dict.compression {
        0 => data.len() / case_bytes,
        _ => data.len().saturating_mul(8) / case_bytes,
    };
    let capacity = dict.ncases.unwrap_or(0).min(room);
    match dict.compression {
        0 => read_cases(&dict, RawSlots { r }, capacity),
        1 => read_cases(&dict, BytecodeSlots::new(r, dict.bias), capacity),
        2 => Err(ReadError::Unsupported("zlib compressed .zsav".into())),
        other => Err(ReadError::Invalid(format!("compression code {other}"))),
    }
}

fn detect_endian(layout: &[u8]) -> Result<Endian, ReadError> {
    for endian in [Endian::Little, Endian::Big] {
        if matches!(uint_from_bytes(layout, endian), 2 | 3) {
            return Ok(endian);
        }
    }
    Err(ReadError::Invalid("unrecognised layout code".into()))
}

fn read_dictionary(buf: &[u8]) -> Result<(Dictionary, &[u8]), ReadError> {
    match buf.get(..4) {
        Some(b"$FL2") => {}
        Some(b"$FL3") => return Err(ReadError::Unsupported("zlib compressed .zsav".into())),
        _ => return Err(ReadError::Invalid("not an SPSS system file".into())),
    }
    if buf.len() < HEADER_LEN {
        return Err(ReadError::Eof(buf.len()));
    }
    let endian = detect_endian(&buf[64..68])?;

    let mut r = ByteReader::new(buf, endian);
    r.skip(68)?;
    let _nominal_case_size = r.i32()?;
    let compression = r.i32()?;
    let _weight_index = r.i32()?;
    let ncases = usize::try_from(r.i32()?).ok();
    let bias = r.f64()?;
    r.skip(9 + 8)?; // creation date and time
    let file_label = r.take(64)?.to_vec();
    r.skip(3)?;

    let mut dict = Dictionary {
        endian,
        compression,
        ncases,
        bias,
        file_label,
        variables: Vec::new(),
        long_names: HashMap::new(),
        very_long: HashMap::new(),
        encoding: TextEncoding::Latin1,
    };
    // dictionary slot index (1-based, continuations included) → variable
    let mut slot_owner: HashMap<usize, usize> = HashMap::new();
    let mut nslots = 0usize;

    loop {
        match r.i32()? {
            REC_VARIABLE => {
                let ty = r.i32()?;
                let has_label = r.i32()?;
                let n_missing = r.i32()?;
                let print_format = r.u32()?;
                let _write_format = r.u32()?;
                let name = r.take(8)?;
                let label = if has_label != 0 {
                    let len = r.count32()?;
                    let label = r.take(len)?.to_vec();
                    r.skip((4 - len % 4) % 4)?;
                    Some(label)
                } else {
                    None
                };
                let missing = read_missing(&mut r, n_missing)?;
                nslots += 1;

                if ty == -1 {
                    let last = dict.variables.last_mut().ok_or_else(|| {
                        ReadError::Invalid("continuation record before any variable".into())
                    })?;
                    last.slots += 1;
                    slot_owner.insert(nslots, dict.variables.len() - 1);
                    continue;
                }
                let width = usize::try_from(ty)
                    .map_err(|_| ReadError::Invalid(format!("variable type {ty}")))?;
                slot_owner.insert(nslots, dict.variables.len());
                dict.variables.push(Variable {
                    short_name: space_padded(name, TextEncoding::Latin1),
                    width,
                    slots: 1,
                    label,
                    print_format,
                    missing,
                    value_labels: Vec::new(),
                });
            }
            REC_VALUE_LABELS => {
                let count = r.count32()?;
                let mut labels = Vec::with_capacity(count);
                for _ in 0..count {
                    let value = read_slot(&mut r)?;
                    let len = r.u8()? as usize;
                    let text = r.take(len)?.to_vec();
                    r.skip((8 - (len + 1) % 8) % 8)?;
                    labels.push((value, text));
                }
                if r.i32()? != REC_LABEL_VARS {
                    return Err(ReadError::Invalid(
                        "value labels not followed by their variable list".into(),
                    ));
                }
                let nvars = r.count32()?;
                for _ in 0..nvars {
                    let slot = r.count32()?;
                    let owner = slot_owner.get(&slot).copied().ok_or_else(|| {
                        ReadError::Invalid(format!("value labels for unknown slot {slot}"))
                    })?;
                    dict.variables[owner].value_labels.extend(labels.iter().cloned());
                }
            }
            REC_DOCUMENT => {
                let lines = r.count32()?;
                r.skip(lines * 80)?;
            }
            REC_EXTENSION => {
                let subtype = r.i32()?;
                let size = r.count32()?;
                let count = r.count32()?;
                let len = size
                    .checked_mul(count)
                    .ok_or_else(|| ReadError::Invalid("extension record too large".into()))?;
                let body = r.take(len)?;
                match subtype {
                    EXT_MACHINE_INTEGER if body.len() >= 32 => {
                        if uint_from_bytes(&body[28..32], endian) == 65001 {
                            dict.encoding = TextEncoding::Utf8;
                        }
                    }
                    EXT_LONG_NAMES => {
                        dict.long_names = parse_long_names(body);
                    }
                    EXT_VERY_LONG_STRINGS => {
                        dict.very_long = parse_very_long_strings(body);
                    }
                    EXT_ENCODING => {
                        let name = String::from_utf8_lossy(body).to_ascii_uppercase();
                        dict.encoding = if name.contains("UTF") {
                            TextEncoding::Utf8
                        } else {
                            TextEncoding::Latin1
                        };
                    }
                    _ => {}
                }
            }
            REC_END => {
                r.skip(4)?;
                break;
            }
            other => return Err(ReadError::Invalid(format!("record type {other}"))),
        }
    }
    Ok((dict, r.rest()))
}

fn read_missing(r: &mut ByteReader<'_>, n_missing: i32) -> Result<Missing, ReadError> {
    match n_missing {
        0 => Ok(Missing::None),
        1..=3 => Ok(Missing::Discrete(
            (0..n_missing)
                .map(|_| read_slot(r))
                .collect::<Result<_, _>>()?,
        )),
        -2 | -3 => {
            let low = r.f64()?;
            let high = r.f64()?;
            let extra = if n_missing == -3 { Some(r.f64()?) } else { None };
            Ok(Missing::Range { low, high, extra })
        }
        other => Err(ReadError::Invalid(format!("missing value count {other}"))),
    }
}

/// `SHORT=LongName` pairs separated by tabs.
fn parse_long_names(body: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(body)
        .split('\t')
        .filter_map(|pair| {
            let (short, long) = pair.split_once('=')?;
            Some((short.trim().to_string(), long.trim().to_string()))
        })
        .collect()
}

/// `SHORT=00600` pairs, each terminated by a NUL and a tab.
fn parse_very_long_strings(body: &[u8]) -> HashMap<String, usize> {
    String::from_utf8_lossy(body)
        .split('\t')
        .filter_map(|pair| {
            let (short, width) = pair.trim_matches('\0').split_once('=')?;
            let width = width.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            Some((short.trim().to_string(), width.parse().ok()?))
        })
        .collect()
}

/// Print format spec `type << 16 | width << 8 | decimals` as written in syntax.
fn print_format(spec: u32) -> String {
    let (ty, width, decimals) = ((spec >> 16) & 0xff, (spec >> 8) & 0xff, spec & 0xff);
    let name = match ty {
        1 => "A",
        2 => "AHEX",
        3 => "COMMA",
        4 => "DOLLAR",
        5 => "F",
        6 => "IB",
        7 => "PIBHEX",
        8 => "P",
        9 => "PIB",
        10 => "PK",
        11 => "RB",
        12 => "RBHEX",
        15 => "Z",
        16 => "N",
        17 => "E",
        20 => "DATE",
        21 => "TIME",
        22 => "DATETIME",
        23 => "ADATE",
        24 => "JDATE",
        25 => "DTIME",
        26 => "WKDAY",
        27 => "MONTH",
        28 => "MOYR",
        29 => "QYR",
        30 => "WKYR",
        31 => "PCT",
        32 => "DOT",
        33 => "CCA",
        34 => "CCB",
        35 => "CCC",
        36 => "CCD",
        37 => "CCE",
        38 => "EDATE",
        39 => "SDATE",
        _ => return String::new(),
    };
    if decimals > 0 {
        format!("{name}{width}.{decimals}")
    } else {
        format!("{name}{width}")
    }
}

fn label_value(var: &Variable, value: &Slot, dict: &Dictionary) -> String {
    if var.is_numeric() {
        let v = f64_from_bytes(*value, dict.endian);
        if v.fract() == 0.0 && v.abs() < 1e15 {
            format!("{}", v as i64)
        } else {
            v.to_string()
        }
    } else {
        space_padded(value, dict.encoding)
    }
}

fn columns(dict: &Dictionary, groups: &[Group]) -> Vec<Column> {
    groups
        .iter()
        .map(|group| {
            let var = &dict.variables[group.first];
            let name = dict
                .long_names
                .get(&var.short_name)
                .cloned()
                .unwrap_or_else(|| var.short_name.clone());
            let ty = if var.is_numeric() {
                ColumnType::Float64
            } else {
                ColumnType::Utf8
            };
            let format = if group.segments > 1 {
                format!("A{}", group.width)
            } else {
                print_format(var.print_format)
            };
            let mut col = Column::new(name, ty).with_format(format);
            if let Some(label) = &var.label {
                col = col.with_label(decode_text(label, dict.encoding));
            }
            col.value_labels = var
                .value_labels
                .iter()
                .map(|(value, text)| ValueLabel {
                    value: label_value(var, value, dict),
                    label: decode_text(text, dict.encoding),
                })
                .collect();
            col
        })
        .collect()
}

fn read_cases(
    dict: &Dictionary,
    mut source: impl SlotSource,
    capacity: usize,
) -> Result<RecordBatch, ReadError> {
    let groups = groups(dict);
    let cols = columns(dict, &groups);
    let mut builders = builders_for(&cols, capacity);
    let slots_per_case: usize = dict.variables.iter().map(|v| v.slots).sum();
    let offsets: Vec<usize> = dict
        .variables
        .iter()
        .scan(0, |at, v| {
            let start = *at;
            *at += v.slots * 8;
            Some(start)
        })
        .collect();
    let mut long_text = Vec::new();
    let mut case = Vec::with_capacity(slots_per_case * 8);
    let mut rows = 0usize;

    while slots_per_case > 0 && dict.ncases.map_or(true, |n| rows < n) {
        case.clear();
        for i in 0..slots_per_case {
            match source.next_slot()? {
                Some(slot) => case.extend_from_slice(&slot),
                None if i == 0 => break,
                None => return Err(ReadError::Invalid(format!("case {} is truncated", rows + 1))),
            }
        }
        if case.is_empty() {
            break;
        }

        for (group, builder) in groups.iter().zip(builders.iter_mut()) {
            if group.segments > 1 {
                long_text.clear();
                for s in 0..group.segments {
                    let var = &dict.variables[group.first + s];
                    let start = offsets[group.first + s];
                    let used = if s + 1 < group.segments {
                        SEGMENT_USED
                    } else {
                        var.width
                    };
                    long_text.extend_from_slice(&case[start..start + used.min(var.slots * 8)]);
                }
                let text = decode_text(&long_text, dict.encoding);
                builder.append_text(Some(text.trim_end()));
                continue;
            }
            let var = &dict.variables[group.first];
            let start = offsets[group.first];
            let cell = &case[start..start + var.slots * 8];
            if var.is_numeric() {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(cell);
                let v = f64_from_bytes(raw, dict.endian);
                let keep = v != SYSMIS && !var.is_missing_number(v, dict.endian);
                builder.append_number(keep.then_some(v));
            } else {
                let text = decode_text(&cell[..var.width.min(cell.len())], dict.encoding);
                let text = text.trim_end();
                if var.is_missing_text(text, dict.encoding) {
                    builder.append_text(None);
                } else {
                    builder.append_text(Some(text));
                }
            }
        }
        rows += 1;
    }

    let mut metadata = HashMap::from([(SOURCE_FORMAT_KEY.to_string(), "spss".to_string())]);
    let label = space_padded(&dict.file_label, dict.encoding);
    if !label.is_empty() {
        metadata.insert(DATASET_LABEL_KEY.to_string(), label);
    }
    Ok(build_record_batch(&cols, builders, rows, metadata)?)
}
