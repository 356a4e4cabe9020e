// src/fixtures.rs

//! Byte-level writers for small data files and archives used across the tests.

use std::io::{Cursor, Write};

use crate::process::utils::{f64_to_bytes, Endian};
use tracing_subscriber::EnvFilter;
use zip::{write::SimpleFileOptions, ZipWriter};

/// Stata's `.` for doubles.
pub(crate) const STATA_DOUBLE_MISSING: f64 = 8.98846567431158e307;
const SPSS_SYSMIS: f64 = -f64::MAX;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .with_test_writer()
        .try_init();
}

fn zero_padded(s: &str, width: usize) -> Vec<u8> {
    let mut out = s.as_bytes()[..s.len().min(width)].to_vec();
    out.resize(width, 0);
    out
}

fn space_padded(s: &str, width: usize) -> Vec<u8> {
    let mut out = s.as_bytes()[..s.len().min(width)].to_vec();
    out.resize(width, b' ');
    out
}

pub(crate) fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Byte sink that writes numbers in a chosen byte order.
struct Out {
    buf: Vec<u8>,
    endian: Endian,
}

impl Out {
    fn new(endian: Endian) -> Self {
        Self {
            buf: Vec::new(),
            endian,
        }
    }

    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    /// Low `width` bytes of `v`.
    fn uint(&mut self, v: u64, width: usize) {
        let be = v.to_be_bytes();
        let low = &be[8 - width..];
        match self.endian {
            Endian::Big => self.buf.extend_from_slice(low),
            Endian::Little => self.buf.extend(low.iter().rev()),
        }
    }

    fn u16(&mut self, v: u16) {
        self.uint(u64::from(v), 2);
    }

    fn u32(&mut self, v: u32) {
        self.uint(u64::from(v), 4);
    }

    fn i32(&mut self, v: i32) {
        self.uint(u64::from(v as u32), 4);
    }

    fn f64(&mut self, v: f64) {
        self.bytes(&f64_to_bytes(v, self.endian));
    }
}

// ---------------------------------------------------------------- Stata

#[derive(Debug, Clone)]
pub(crate) enum StataVar {
    Long {
        name: &'static str,
        label: &'static str,
        values: Vec<i32>,
    },
    Byte {
        name: &'static str,
        label: &'static str,
        values: Vec<i8>,
        labels: Vec<(i32, &'static str)>,
    },
    Double {
        name: &'static str,
        label: &'static str,
        values: Vec<f64>,
    },
    Str {
        name: &'static str,
        label: &'static str,
        width: usize,
        values: Vec<&'static str>,
    },
    StrL {
        name: &'static str,
        label: &'static str,
        values: Vec<&'static str>,
    },
}

impl StataVar {
    fn name(&self) -> &'static str {
        match self {
            StataVar::Long { name, .. }
            | StataVar::Byte { name, .. }
            | StataVar::Double { name, .. }
            | StataVar::Str { name, .. }
            | StataVar::StrL { name, .. } => *name,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            StataVar::Long { label, .. }
            | StataVar::Byte { label, .. }
            | StataVar::Double { label, .. }
            | StataVar::Str { label, .. }
            | StataVar::StrL { label, .. } => *label,
        }
    }

    fn len(&self) -> usize {
        match self {
            StataVar::Long { values, .. } => values.len(),
            StataVar::Byte { values, .. } => values.len(),
            StataVar::Double { values, .. } => values.len(),
            StataVar::Str { values, .. } | StataVar::StrL { values, .. } => values.len(),
        }
    }

    fn value_labels(&self) -> &[(i32, &'static str)] {
        match self {
            StataVar::Byte { labels, .. } => labels,
            _ => &[],
        }
    }

    fn tagged_code(&self) -> u16 {
        match self {
            StataVar::Long { .. } => 65528,
            StataVar::Byte { .. } => 65530,
            StataVar::Double { .. } => 65526,
            StataVar::Str { width, .. } => *width as u16,
            StataVar::StrL { .. } => 32768,
        }
    }

    fn legacy_code(&self) -> u8 {
        match self {
            StataVar::Long { .. } => 253,
            StataVar::Byte { .. } => 251,
            StataVar::Double { .. } => 255,
            StataVar::Str { width, .. } => *width as u8,
            StataVar::StrL { .. } => panic!("strL needs release 117 or later"),
        }
    }

    fn format(&self) -> String {
        match self {
            StataVar::Long { .. } => "%12.0g".into(),
            StataVar::Byte { .. } => "%8.0g".into(),
            StataVar::Double { .. } => "%10.0g".into(),
            StataVar::Str { width, .. } => format!("%{width}s"),
            StataVar::StrL { .. } => "%9s".into(),
        }
    }

    /// One cell; strL contents go to `gso` keyed by (variable, observation).
    fn write_cell(&self, row: usize, var: usize, release: u16, out: &mut Out, gso: &mut Out) {
        match self {
            StataVar::Long { values, .. } => out.i32(values[row]),
            StataVar::Byte { values, .. } => out.bytes(&[values[row] as u8]),
            StataVar::Double { values, .. } => out.f64(values[row]),
            StataVar::Str { width, values, .. } => out.bytes(&zero_padded(values[row], *width)),
            StataVar::StrL { values, .. } => {
                let text = values[row];
                if text.is_empty() {
                    out.bytes(&[0u8; 8]);
                    return;
                }
                let (v, o) = (var as u64 + 1, row as u64 + 1);
                let v_len = match release {
                    117 => 4,
                    118 => 2,
                    _ => 3,
                };
                out.uint(v, v_len);
                out.uint(o, 8 - v_len);
                gso.bytes(b"GSO");
                gso.u32(v as u32);
                if release == 117 {
                    gso.u32(o as u32);
                } else {
                    gso.uint(o, 8);
                }
                gso.bytes(&[130]);
                gso.u32(text.len() as u32 + 1);
                gso.bytes(text.as_bytes());
                gso.bytes(&[0]);
            }
        }
    }
}

fn stata_label_table(labels: &[(i32, &str)], endian: Endian) -> Vec<u8> {
    let mut offsets = Vec::new();
    let mut txt = Vec::new();
    for (_, label) in labels {
        offsets.push(txt.len() as u32);
        txt.extend(label.as_bytes());
        txt.push(0);
    }
    let mut out = Out::new(endian);
    out.u32(labels.len() as u32);
    out.u32(txt.len() as u32);
    for off in offsets {
        out.u32(off);
    }
    for (value, _) in labels {
        out.i32(*value);
    }
    out.bytes(&txt);
    out.buf
}

/// idno, cntry, happy (labelled, one missing), weight (one missing), comment (strL)
pub(crate) fn sample_stata_vars() -> Vec<StataVar> {
    vec![
        StataVar::Long {
            name: "idno",
            label: "Respondent's identification number",
            values: vec![101, 102, 103],
        },
        StataVar::Str {
            name: "cntry",
            label: "Country",
            width: 2,
            values: vec!["BE", "FR", "DE"],
        },
        StataVar::Byte {
            name: "happy",
            label: "How happy are you",
            values: vec![7, 101, 10],
            labels: vec![(0, "Extremely unhappy"), (10, "Extremely happy")],
        },
        StataVar::Double {
            name: "pspwght",
            label: "Post-stratification weight",
            values: vec![0.5, 1.25, STATA_DOUBLE_MISSING],
        },
        StataVar::StrL {
            name: "comment",
            label: "",
            values: vec!["long free text answer", "", "short"],
        },
    ]
}

/// Release 118, little endian.
pub(crate) fn stata_118(vars: &[StataVar], dataset_label: &str) -> Vec<u8> {
    stata_tagged(vars, dataset_label, 118, Endian::Little)
}

/// Tagged layout of release 117, 118 or 119 in either byte order.
pub(crate) fn stata_tagged(
    vars: &[StataVar],
    dataset_label: &str,
    release: u16,
    endian: Endian,
) -> Vec<u8> {
    assert!((117..=119).contains(&release), "release {release}");
    let (name_len, format_len, var_label_len) = if release == 117 {
        (33, 49, 81)
    } else {
        (129, 57, 321)
    };
    let nobs = vars.first().map_or(0, StataVar::len);
    let order: &[u8] = match endian {
        Endian::Little => b"LSF",
        Endian::Big => b"MSF",
    };

    let mut out = Out::new(endian);
    out.bytes(format!("<stata_dta><header><release>{release}</release><byteorder>").as_bytes());
    out.bytes(order);
    out.bytes(b"</byteorder><K>");
    if release == 119 {
        out.u32(vars.len() as u32);
    } else {
        out.u16(vars.len() as u16);
    }
    out.bytes(b"</K><N>");
    if release == 117 {
        out.u32(nobs as u32);
    } else {
        out.uint(nobs as u64, 8);
    }
    out.bytes(b"</N><label>");
    if release == 117 {
        out.bytes(&[dataset_label.len() as u8]);
    } else {
        out.u16(dataset_label.len() as u16);
    }
    out.bytes(dataset_label.as_bytes());
    out.bytes(b"</label><timestamp>");
    out.bytes(&[17]);
    out.bytes(b"01 Jan 2024 10:00");
    out.bytes(b"</timestamp></header><map>");
    out.bytes(&[0u8; 14 * 8]);
    out.bytes(b"</map><variable_types>");
    for v in vars {
        out.u16(v.tagged_code());
    }
    out.bytes(b"</variable_types><varnames>");
    for v in vars {
        out.bytes(&zero_padded(v.name(), name_len));
    }
    out.bytes(b"</varnames><sortlist>");
    let sort_width = if release == 119 { 4 } else { 2 };
    out.bytes(&vec![0u8; (vars.len() + 1) * sort_width]);
    out.bytes(b"</sortlist><formats>");
    for v in vars {
        out.bytes(&zero_padded(&v.format(), format_len));
    }
    out.bytes(b"</formats><value_label_names>");
    for v in vars {
        let name = if v.value_labels().is_empty() { "" } else { v.name() };
        out.bytes(&zero_padded(name, name_len));
    }
    out.bytes(b"</value_label_names><variable_labels>");
    for v in vars {
        out.bytes(&zero_padded(v.label(), var_label_len));
    }
    out.bytes(b"</variable_labels><characteristics><ch>");
    out.u32(4);
    out.bytes(b"note</ch></characteristics><data>");
    let mut gso = Out::new(endian);
    for row in 0..nobs {
        for (i, v) in vars.iter().enumerate() {
            v.write_cell(row, i, release, &mut out, &mut gso);
        }
    }
    out.bytes(b"</data><strls>");
    out.bytes(&gso.buf);
    out.bytes(b"</strls><value_labels>");
    for v in vars.iter().filter(|v| !v.value_labels().is_empty()) {
        let table = stata_label_table(v.value_labels(), endian);
        out.bytes(b"<lbl>");
        out.u32(table.len() as u32);
        out.bytes(&zero_padded(v.name(), name_len));
        out.bytes(&[0u8; 3]);
        out.bytes(&table);
        out.bytes(b"</lbl>");
    }
    out.bytes(b"</value_labels></stata_dta>");
    out.buf
}

/// Release 114, little endian. strL variables are not representable.
pub(crate) fn stata_114(vars: &[StataVar], dataset_label: &str) -> Vec<u8> {
    stata_legacy(vars, dataset_label, Endian::Little)
}

/// Release 114 in either byte order.
pub(crate) fn stata_legacy(vars: &[StataVar], dataset_label: &str, endian: Endian) -> Vec<u8> {
    let nobs = vars.first().map_or(0, StataVar::len);
    let flag = match endian {
        Endian::Big => 1,
        Endian::Little => 2,
    };
    let mut out = Out::new(endian);
    out.bytes(&[114u8, flag, 1, 0]);
    out.u16(vars.len() as u16);
    out.u32(nobs as u32);
    out.bytes(&zero_padded(dataset_label, 81));
    out.bytes(&zero_padded("01 Jan 2024 10:00", 18));
    for v in vars {
        out.bytes(&[v.legacy_code()]);
    }
    for v in vars {
        out.bytes(&zero_padded(v.name(), 33));
    }
    out.bytes(&vec![0u8; (vars.len() + 1) * 2]);
    for v in vars {
        out.bytes(&zero_padded(&v.format(), 49));
    }
    for v in vars {
        let name = if v.value_labels().is_empty() { "" } else { v.name() };
        out.bytes(&zero_padded(name, 33));
    }
    for v in vars {
        out.bytes(&zero_padded(v.label(), 81));
    }
    out.bytes(&[0]);
    out.u32(0);
    let mut unused = Out::new(endian);
    for row in 0..nobs {
        for (i, v) in vars.iter().enumerate() {
            v.write_cell(row, i, 114, &mut out, &mut unused);
        }
    }
    for v in vars.iter().filter(|v| !v.value_labels().is_empty()) {
        let table = stata_label_table(v.value_labels(), endian);
        out.u32(table.len() as u32);
        out.bytes(&zero_padded(v.name(), 33));
        out.bytes(&[0u8; 3]);
        out.bytes(&table);
    }
    out.buf
}

// ---------------------------------------------------------------- SPSS

#[derive(Debug, Clone)]
pub(crate) enum SavVar {
    Num {
        name: &'static str,
        label: &'static str,
        values: Vec<Option<f64>>,
        missing: Vec<f64>,
        labels: Vec<(f64, &'static str)>,
    },
    /// Wider than 255 bytes is written as segments with a very-long-string record.
    Text {
        name: &'static str,
        width: usize,
        values: Vec<&'static str>,
    },
}

/// One dictionary variable as written: a whole variable or one segment.
struct SavEntry {
    short_name: String,
    /// 0 for numbers
    width: usize,
    /// bytes of the value carried by this entry
    used: usize,
}

impl SavEntry {
    fn slots(&self) -> usize {
        if self.width == 0 {
            1
        } else {
            self.width.div_ceil(8)
        }
    }
}

impl SavVar {
    fn name(&self) -> &'static str {
        match self {
            SavVar::Num { name, .. } | SavVar::Text { name, .. } => *name,
        }
    }

    fn short_name(&self) -> String {
        self.name().chars().take(8).collect::<String>().to_uppercase()
    }

    fn entries(&self) -> Vec<SavEntry> {
        let short = self.short_name();
        match self {
            SavVar::Num { .. } => vec![SavEntry {
                short_name: short,
                width: 0,
                used: 8,
            }],
            SavVar::Text { width, .. } if *width <= 255 => vec![SavEntry {
                short_name: short,
                width: *width,
                used: *width,
            }],
            SavVar::Text { width, .. } => {
                let segments = width.div_ceil(252);
                let stem: String = short.chars().take(5).collect();
                (0..segments)
                    .map(|k| {
                        let last = k + 1 == segments;
                        let seg_width = if last { width - 252 * k } else { 255 };
                        SavEntry {
                            short_name: if k == 0 {
                                short.clone()
                            } else {
                                format!("{stem}{k}")
                            },
                            width: seg_width,
                            used: if last { seg_width } else { 252 },
                        }
                    })
                    .collect()
            }
        }
    }

    fn rows(&self) -> usize {
        match self {
            SavVar::Num { values, .. } => values.len(),
            SavVar::Text { values, .. } => values.len(),
        }
    }

    fn print_format(&self, entry: &SavEntry) -> u32 {
        match self {
            SavVar::Num { values, .. } => {
                let width = values
                    .iter()
                    .flatten()
                    .map(|v| format!("{}", *v as i64).len())
                    .max()
                    .unwrap_or(1);
                5 << 16 | (width as u32) << 8
            }
            SavVar::Text { .. } => 1 << 16 | (entry.width as u32) << 8,
        }
    }
}

/// idno, happy (labelled, 88 user missing), cntry, and a 40-wide string with a long name
pub(crate) fn sample_sav_vars() -> Vec<SavVar> {
    vec![
        SavVar::Num {
            name: "idno",
            label: "Respondent's identification number",
            values: vec![Some(1001.0), Some(1002.0), Some(1003.0)],
            missing: Vec::new(),
            labels: Vec::new(),
        },
        SavVar::Num {
            name: "happy",
            label: "How happy are you",
            values: vec![Some(7.0), None, Some(88.0)],
            missing: vec![88.0],
            labels: vec![(0.0, "Extremely unhappy"), (88.0, "Don't know")],
        },
        SavVar::Text {
            name: "cntry",
            width: 2,
            values: vec!["BE", "FR", "DE"],
        },
        SavVar::Text {
            name: "prtvtbe_long",
            width: 40,
            values: vec!["Groen (Green party of Flanders)", "", "N-VA"],
        },
    ]
}

/// Little-endian system file, optionally bytecode compressed with bias 100.
pub(crate) fn spss_sav(vars: &[SavVar], file_label: &str, compressed: bool) -> Vec<u8> {
    spss_sav_in(vars, file_label, compressed, Endian::Little)
}

/// System file in the given byte order.
pub(crate) fn spss_sav_in(
    vars: &[SavVar],
    file_label: &str,
    compressed: bool,
    endian: Endian,
) -> Vec<u8> {
    let nrows = vars.first().map_or(0, SavVar::rows);
    let entries: Vec<Vec<SavEntry>> = vars.iter().map(SavVar::entries).collect();
    let nslots: usize = entries.iter().flatten().map(SavEntry::slots).sum();

    let mut out = Out::new(endian);
    out.bytes(b"$FL2");
    out.bytes(&space_padded("@(#) SPSS DATA FILE essurvey fixture", 60));
    out.i32(2);
    out.i32(nslots as i32);
    out.i32(i32::from(compressed));
    out.i32(0);
    out.i32(nrows as i32);
    out.f64(100.0);
    out.bytes(b"01 Jan 24");
    out.bytes(b"10:00:00");
    out.bytes(&space_padded(file_label, 64));
    out.bytes(&[0u8; 3]);

    let mut first_slot = Vec::with_capacity(vars.len());
    let mut next_slot = 1;
    for (var, var_entries) in vars.iter().zip(&entries) {
        first_slot.push(next_slot);
        for (k, entry) in var_entries.iter().enumerate() {
            next_slot += entry.slots();
            let (label, missing): (&str, &[f64]) = match var {
                SavVar::Num { label, missing, .. } => (*label, missing.as_slice()),
                SavVar::Text { .. } => ("", &[][..]),
            };
            let label = if k == 0 { label } else { "" };
            let format = var.print_format(entry);
            out.i32(2);
            out.i32(entry.width as i32);
            out.i32(i32::from(!label.is_empty()));
            out.i32(missing.len() as i32);
            out.u32(format);
            out.u32(format);
            out.bytes(&space_padded(&entry.short_name, 8));
            if !label.is_empty() {
                out.i32(label.len() as i32);
                out.bytes(label.as_bytes());
                out.bytes(&vec![0u8; (4 - label.len() % 4) % 4]);
            }
            for m in missing {
                out.f64(*m);
            }
            for _ in 1..entry.slots() {
                out.i32(2);
                out.i32(-1);
                out.bytes(&[0u8; 16]);
                out.bytes(&[b' '; 8]);
            }
        }
    }

    for (var, slot) in vars.iter().zip(&first_slot) {
        let SavVar::Num { labels, .. } = var else {
            continue;
        };
        if labels.is_empty() {
            continue;
        }
        out.i32(3);
        out.i32(labels.len() as i32);
        for (value, label) in labels {
            out.f64(*value);
            out.bytes(&[label.len() as u8]);
            out.bytes(label.as_bytes());
            out.bytes(&vec![b' '; (8 - (label.len() + 1) % 8) % 8]);
        }
        out.i32(4);
        out.i32(1);
        out.i32(*slot as i32);
    }

    let long_names = vars
        .iter()
        .map(|v| format!("{}={}", v.short_name(), v.name()))
        .collect::<Vec<_>>()
        .join("\t");
    let very_long: String = vars
        .iter()
        .filter_map(|v| match v {
            SavVar::Text { width, .. } if *width > 255 => {
                Some(format!("{}={width:05}\0\t", v.short_name()))
            }
            _ => None,
        })
        .collect();
    let mut extensions = vec![(20i32, "UTF-8".to_string()), (13, long_names)];
    if !very_long.is_empty() {
        extensions.push((14, very_long));
    }
    for (subtype, body) in extensions {
        out.i32(7);
        out.i32(subtype);
        out.i32(1);
        out.i32(body.len() as i32);
        out.bytes(body.as_bytes());
    }
    out.i32(999);
    out.i32(0);

    // (bytecode, raw slot following the code block)
    let mut items: Vec<(u8, Option<[u8; 8]>)> = Vec::new();
    for row in 0..nrows {
        for (var, var_entries) in vars.iter().zip(&entries) {
            match var {
                SavVar::Num { values, .. } => {
                    let raw = f64_to_bytes(values[row].unwrap_or(SPSS_SYSMIS), endian);
                    let item = match values[row] {
                        None => (255, None),
                        Some(v) if v.fract() == 0.0 && (-99.0..=151.0).contains(&v) => {
                            ((v + 100.0) as u8, None)
                        }
                        Some(_) => (253, Some(raw)),
                    };
                    if compressed {
                        items.push(item);
                    } else {
                        out.bytes(&raw);
                    }
                }
                SavVar::Text { values, .. } => {
                    let mut rest = values[row].as_bytes();
                    for entry in var_entries {
                        let take = rest.len().min(entry.used);
                        let mut cell = rest[..take].to_vec();
                        rest = &rest[take..];
                        cell.resize(entry.slots() * 8, b' ');
                        for chunk in cell.chunks(8) {
                            let mut raw = [0u8; 8];
                            raw.copy_from_slice(chunk);
                            if !compressed {
                                out.bytes(&raw);
                            } else if raw == [b' '; 8] {
                                items.push((254, None));
                            } else {
                                items.push((253, Some(raw)));
                            }
                        }
                    }
                }
            }
        }
    }
    if compressed {
        items.push((252, None));
        for block in items.chunks(8) {
            let mut codes = [0u8; 8];
            for (code, item) in codes.iter_mut().zip(block) {
                *code = item.0;
            }
            out.bytes(&codes);
            for raw in block.iter().filter_map(|item| item.1) {
                out.bytes(&raw);
            }
        }
    }
    out.buf
}

// ---------------------------------------------------------------- SAS transport

#[derive(Debug, Clone)]
pub(crate) enum XptVar {
    Num {
        name: &'static str,
        label: &'static str,
        values: Vec<Option<f64>>,
    },
    Char {
        name: &'static str,
        width: usize,
        values: Vec<&'static str>,
    },
}

/// IEEE double to IBM System/370 hex float.
pub(crate) fn ibm_bytes(v: f64) -> [u8; 8] {
    if v == 0.0 {
        return [0; 8];
    }
    let sign = if v < 0.0 { 0x80u8 } else { 0 };
    let mut m = v.abs();
    let mut exp = 64i32;
    while m >= 1.0 {
        m /= 16.0;
        exp += 1;
    }
    while m < 1.0 / 16.0 {
        m *= 16.0;
        exp -= 1;
    }
    let mantissa = (m * 2f64.powi(56)) as u64;
    let mut out = [0u8; 8];
    out[0] = sign | exp as u8;
    out[1..].copy_from_slice(&mantissa.to_be_bytes()[1..]);
    out
}

fn record(text: &str) -> Vec<u8> {
    space_padded(text, 80)
}

/// Single-member transport library.
pub(crate) fn sas_xpt(vars: &[XptVar], dataset: &str, dataset_label: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(record(
        "HEADER RECORD*******LIBRARY HEADER RECORD!!!!!!!000000000000000000000000000000",
    ));
    out.extend(record(&format!(
        "SAS     SAS     SASLIB  9.4     X64_10PR{:24}01JAN24:10:00:00",
        ""
    )));
    out.extend(record("01JAN24:10:00:00"));
    out.extend(record(
        "HEADER RECORD*******MEMBER  HEADER RECORD!!!!!!!000000000000000001600000000140",
    ));
    out.extend(record(
        "HEADER RECORD*******DSCRPTR HEADER RECORD!!!!!!!000000000000000000000000000000",
    ));
    out.extend(record(&format!(
        "SAS     {dataset:<8}SASDATA 9.4     X64_10PR{:24}01JAN24:10:00:00",
        ""
    )));
    out.extend(record(&format!(
        "01JAN24:10:00:00{:16}{dataset_label:<40}{:8}",
        "", ""
    )));
    out.extend(record(&format!(
        "HEADER RECORD*******NAMESTR HEADER RECORD!!!!!!!000000{:04}00000000000000000000",
        vars.len()
    )));

    let mut position = 0usize;
    let mut namestrs = Vec::new();
    for (i, var) in vars.iter().enumerate() {
        let (ntype, length, name, label, format, format_width): (i16, usize, &str, &str, &str, u16) =
            match var {
                XptVar::Num { name, label, .. } => (1, 8, *name, *label, "BEST", 12),
                XptVar::Char { name, width, .. } => (2, *width, *name, "", "", 0),
            };
        namestrs.extend(ntype.to_be_bytes());
        namestrs.extend(0i16.to_be_bytes());
        namestrs.extend((length as u16).to_be_bytes());
        namestrs.extend((i as i16 + 1).to_be_bytes());
        namestrs.extend(space_padded(name, 8));
        namestrs.extend(space_padded(label, 40));
        namestrs.extend(space_padded(format, 8));
        namestrs.extend(format_width.to_be_bytes());
        namestrs.extend(0u16.to_be_bytes());
        namestrs.extend(0u16.to_be_bytes());
        namestrs.extend([0u8; 2]);
        namestrs.extend([b' '; 8]);
        namestrs.extend(0u16.to_be_bytes());
        namestrs.extend(0u16.to_be_bytes());
        namestrs.extend((position as i32).to_be_bytes());
        namestrs.extend([0u8; 52]);
        position += length;
    }
    namestrs.resize(namestrs.len().div_ceil(80) * 80, b' ');
    out.extend(namestrs);
    out.extend(record(
        "HEADER RECORD*******OBS     HEADER RECORD!!!!!!!000000000000000000000000000000",
    ));

    let nrows = match vars.first() {
        Some(XptVar::Num { values, .. }) => values.len(),
        Some(XptVar::Char { values, .. }) => values.len(),
        None => 0,
    };
    let mut obs = Vec::new();
    for row in 0..nrows {
        for var in vars {
            match var {
                XptVar::Num { values, .. } => match values[row] {
                    Some(v) => obs.extend(ibm_bytes(v)),
                    None => obs.extend([b'.', 0, 0, 0, 0, 0, 0, 0]),
                },
                XptVar::Char { width, values, .. } => obs.extend(space_padded(values[row], *width)),
            }
        }
    }
    obs.resize(obs.len().div_ceil(80) * 80, b' ');
    out.extend(obs);
    out
}
