// src/process/utils.rs

use thiserror::Error;

/// Why a reader gave up on a file.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("unexpected end of file at byte {0}")]
    Eof(usize),
    #[error("expected {expected} at byte {at}")]
    Tag { expected: String, at: usize },
    #[error("{0}")]
    Invalid(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("building table: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

/// Cursor over an in-memory file with a switchable byte order.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

macro_rules! read_number {
    ($name:ident, $ty:ty, $n:expr) => {
        pub fn $name(&mut self) -> Result<$ty, ReadError> {
            let raw = self.take($n)?;
            let mut bytes = [0u8; $n];
            bytes.copy_from_slice(raw);
            Ok(match self.endian {
                Endian::Little => <$ty>::from_le_bytes(bytes),
                Endian::Big => <$ty>::from_be_bytes(bytes),
            })
        }
    };
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        if n > self.remaining() {
            return Err(ReadError::Eof(self.buf.len()));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ReadError> {
        self.take(n).map(|_| ())
    }

    pub fn peek(&self, n: usize) -> Option<&'a [u8]> {
        self.buf.get(self.pos..self.pos + n)
    }

    /// Consume `tag` or fail without moving.
    pub fn expect(&mut self, tag: &[u8]) -> Result<(), ReadError> {
        if self.peek(tag.len()) == Some(tag) {
            self.pos += tag.len();
            Ok(())
        } else {
            Err(ReadError::Tag {
                expected: String::from_utf8_lossy(tag).into_owned(),
                at: self.pos,
            })
        }
    }

    read_number!(u16, u16, 2);
    read_number!(u32, u32, 4);
    read_number!(u64, u64, 8);
    read_number!(i16, i16, 2);
    read_number!(i32, i32, 4);
    read_number!(f64, f64, 8);

    pub fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take(1)?[0])
    }

    /// Length prefix or count that must fit in memory.
    pub fn count32(&mut self) -> Result<usize, ReadError> {
        let n = self.i32()?;
        usize::try_from(n).map_err(|_| ReadError::Invalid(format!("negative count {n}")))
    }
}

/// Unsigned integer of 1..=8 bytes in the given byte order.
pub fn uint_from_bytes(bytes: &[u8], endian: Endian) -> u64 {
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    match endian {
        Endian::Big => bytes.iter().fold(0, fold),
        Endian::Little => bytes.iter().rev().fold(0, fold),
    }
}

pub fn f64_from_bytes(bytes: [u8; 8], endian: Endian) -> f64 {
    match endian {
        Endian::Little => f64::from_le_bytes(bytes),
        Endian::Big => f64::from_be_bytes(bytes),
    }
}

pub fn f64_to_bytes(v: f64, endian: Endian) -> [u8; 8] {
    match endian {
        Endian::Little => v.to_le_bytes(),
        Endian::Big => v.to_be_bytes(),
    }
}

pub fn decode_text(bytes: &[u8], encoding: TextEncoding) -> String {
    match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        TextEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Fixed-width C string: everything up to the first NUL.
pub fn nul_terminated(bytes: &[u8], encoding: TextEncoding) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    decode_text(&bytes[..end], encoding)
}

/// Fixed-width blank-padded field.
pub fn space_padded(bytes: &[u8], encoding: TextEncoding) -> String {
    let end = bytes
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |i| i + 1);
    decode_text(&bytes[..end], encoding)
}
