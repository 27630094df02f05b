//! Read/write ABI shared by every backend.
//!
//! Generated protocol code only talks to [`ReadBuffer`] and [`WriteBuffer`]; whether the
//! bits end up in a byte stream, a JSON or XML document, or an ASCII-box dump is decided
//! by the caller when it constructs the buffer.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use num_bigint::BigUint;
use std::fmt;
use std::str::FromStr;

/// Byte order for multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("End of buffer: requested {requested} bits, {remaining} remaining")]
    EndOfBuffer { requested: usize, remaining: usize },
    #[error("Structural mismatch: expected {expected}, found {actual}")]
    StructuralMismatch { expected: String, actual: String },
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Unmapped type: no {family} variant for discriminator {discriminator}")]
    UnmappedType {
        family: &'static str,
        discriminator: String,
    },
    #[error("Validation: {0}")]
    Validation(String),
    #[error("Value out of range: {0}")]
    ValueOutOfRange(String),
    #[error("Array overrun: element ended at byte {pos}, array ends at byte {end}")]
    ArrayOverrun { end: usize, pos: usize },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XML: {0}")]
    Xml(String),
}

impl CodecError {
    pub(crate) fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        CodecError::StructuralMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl From<quick_xml::Error> for CodecError {
    fn from(e: quick_xml::Error) -> Self {
        CodecError::Xml(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Whether a context is rendered as a single element or as a list of elements.
///
/// Tree backends must see the same kind on the write and read side, otherwise the
/// document does not round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextKind {
    #[default]
    Element,
    List,
}

/// Bit layout of a floating point field.
///
/// `(true, 8, 23)` and `(true, 11, 52)` are IEEE-754 binary32/binary64. Anything narrower
/// than 32 bits is the compact layout used by building-automation protocols:
/// `(sign ? -1 : 1) * 0.01 * mantissa * 2^exponent` with a signed exponent field and an
/// unsigned mantissa field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatLayout {
    pub signed: bool,
    pub exponent_bits: u8,
    pub mantissa_bits: u8,
}

impl FloatLayout {
    pub const IEEE_SINGLE: FloatLayout = FloatLayout::new(true, 8, 23);
    pub const IEEE_DOUBLE: FloatLayout = FloatLayout::new(true, 11, 52);

    pub const fn new(signed: bool, exponent_bits: u8, mantissa_bits: u8) -> Self {
        FloatLayout {
            signed,
            exponent_bits,
            mantissa_bits,
        }
    }

    pub fn bit_length(&self) -> usize {
        self.signed as usize + self.exponent_bits as usize + self.mantissa_bits as usize
    }

    pub fn is_ieee(&self) -> bool {
        *self == Self::IEEE_SINGLE || *self == Self::IEEE_DOUBLE
    }

    /// The field's bit pattern for `value`: IEEE bits, or sign, exponent and mantissa packed
    /// MSB-first.
    pub fn raw_bits(&self, value: f64) -> Result<u64> {
        if *self == Self::IEEE_SINGLE {
            return Ok((value as f32).to_bits() as u64);
        }
        if *self == Self::IEEE_DOUBLE {
            return Ok(value.to_bits());
        }
        let (negative, exponent, mantissa) = self.encode_compact(value)?;
        let exponent_mask = (1u64 << self.exponent_bits) - 1;
        let mut raw = exponent as u64 & exponent_mask;
        if self.signed {
            raw |= (negative as u64) << self.exponent_bits;
        }
        Ok((raw << self.mantissa_bits) | mantissa)
    }

    /// Compact layouts need a non-empty exponent and mantissa and must stay below 32 bits.
    pub(crate) fn check_compact(&self) -> Result<()> {
        if self.exponent_bits == 0 || self.mantissa_bits == 0 || self.bit_length() >= 32 {
            return Err(CodecError::UnsupportedFormat(format!(
                "float layout sign={} exponent={} mantissa={} ({} bits)",
                self.signed,
                self.exponent_bits,
                self.mantissa_bits,
                self.bit_length()
            )));
        }
        Ok(())
    }

    pub(crate) fn decode_compact(negative: bool, exponent: i64, mantissa: u64) -> f64 {
        let sign = if negative { -1.0 } else { 1.0 };
        sign * 0.01 * mantissa as f64 * 2f64.powi(exponent as i32)
    }

    /// Split `value` into (negative, exponent, mantissa) using the smallest exponent whose
    /// rounded mantissa still fits.
    pub(crate) fn encode_compact(&self, value: f64) -> Result<(bool, i64, u64)> {
        self.check_compact()?;
        if !value.is_finite() {
            return Err(CodecError::ValueOutOfRange(format!("{} is not finite", value)));
        }
        let negative = value < 0.0;
        if negative && !self.signed {
            return Err(CodecError::ValueOutOfRange(format!(
                "{} needs a sign bit",
                value
            )));
        }
        let scaled = value.abs() * 100.0;
        if scaled == 0.0 {
            return Ok((false, 0, 0));
        }
        let max_mantissa = (1u64 << self.mantissa_bits) - 1;
        let min_exponent = -(1i64 << (self.exponent_bits - 1));
        let max_exponent = (1i64 << (self.exponent_bits - 1)) - 1;
        let mut exponent = ((scaled / max_mantissa as f64).log2().ceil() as i64).max(min_exponent);
        loop {
            if exponent > max_exponent {
                return Err(CodecError::ValueOutOfRange(format!(
                    "{} does not fit {} exponent bits",
                    value, self.exponent_bits
                )));
            }
            let mantissa = (scaled / 2f64.powi(exponent as i32)).round();
            if mantissa <= max_mantissa as f64 {
                return Ok((negative, exponent, mantissa as u64));
            }
            exponent += 1;
        }
    }
}

/// Text encoding of string fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringEncoding {
    #[default]
    Utf8,
    Ascii,
    Utf16Be,
    Utf16Le,
}

impl StringEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            StringEncoding::Utf8 => "UTF-8",
            StringEncoding::Ascii => "ASCII",
            StringEncoding::Utf16Be => "UTF-16BE",
            StringEncoding::Utf16Le => "UTF-16LE",
        }
    }

    /// Size in bytes of one code unit (NUL padding is stripped per code unit).
    pub fn unit_len(&self) -> usize {
        match self {
            StringEncoding::Utf8 | StringEncoding::Ascii => 1,
            StringEncoding::Utf16Be | StringEncoding::Utf16Le => 2,
        }
    }

    pub fn encode(&self, value: &str) -> Result<Vec<u8>> {
        match self {
            StringEncoding::Utf8 => Ok(value.as_bytes().to_vec()),
            StringEncoding::Ascii => {
                if !value.is_ascii() {
                    return Err(CodecError::ValueOutOfRange(format!(
                        "{:?} is not ASCII",
                        value
                    )));
                }
                Ok(value.as_bytes().to_vec())
            }
            StringEncoding::Utf16Be | StringEncoding::Utf16Le => {
                let units: Vec<u16> = value.encode_utf16().collect();
                let mut out = vec![0u8; units.len() * 2];
                if *self == StringEncoding::Utf16Be {
                    BigEndian::write_u16_into(&units, &mut out);
                } else {
                    LittleEndian::write_u16_into(&units, &mut out);
                }
                Ok(out)
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            StringEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| CodecError::Validation(format!("invalid UTF-8: {}", e))),
            StringEncoding::Ascii => {
                if !bytes.is_ascii() {
                    return Err(CodecError::Validation("invalid ASCII".to_string()));
                }
                Ok(bytes.iter().map(|&b| b as char).collect())
            }
            StringEncoding::Utf16Be | StringEncoding::Utf16Le => {
                if bytes.len() % 2 != 0 {
                    return Err(CodecError::Validation(format!(
                        "UTF-16 needs an even byte count, got {}",
                        bytes.len()
                    )));
                }
                let mut units = vec![0u16; bytes.len() / 2];
                if *self == StringEncoding::Utf16Be {
                    BigEndian::read_u16_into(bytes, &mut units);
                } else {
                    LittleEndian::read_u16_into(bytes, &mut units);
                }
                String::from_utf16(&units)
                    .map_err(|e| CodecError::Validation(format!("invalid UTF-16: {}", e)))
            }
        }
    }

    /// Drop trailing NUL code units (the padding added by fixed-width string fields).
    pub(crate) fn trim_padding<'a>(&self, mut bytes: &'a [u8]) -> &'a [u8] {
        let unit = self.unit_len();
        while bytes.len() >= unit && bytes[bytes.len() - unit..].iter().all(|&b| b == 0) {
            bytes = &bytes[..bytes.len() - unit];
        }
        bytes
    }
}

impl FromStr for StringEncoding {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "UTF-8" | "UTF8" => Ok(StringEncoding::Utf8),
            "ASCII" | "US-ASCII" => Ok(StringEncoding::Ascii),
            "UTF-16" | "UTF16" | "UTF-16BE" => Ok(StringEncoding::Utf16Be),
            "UTF-16LE" => Ok(StringEncoding::Utf16Le),
            other => Err(CodecError::UnsupportedFormat(format!("string encoding {}", other))),
        }
    }
}

impl fmt::Display for StringEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Explicit stack of open contexts. Pops must match the most recent push by name and kind.
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<(String, ContextKind)>,
}

impl ContextStack {
    pub fn push(&mut self, name: &str, kind: ContextKind) {
        self.frames.push((name.to_string(), kind));
    }

    pub fn pop(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        match self.frames.last() {
            None => Err(CodecError::mismatch(
                format!("open context {}", name),
                "no open context",
            )),
            Some((top, top_kind)) => {
                check_context(name, kind, top, *top_kind)?;
                self.frames.pop();
                Ok(())
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> Option<&str> {
        self.frames.last().map(|(name, _)| name.as_str())
    }
}

/// Compare the context a caller wants to leave with the one actually on top.
pub(crate) fn check_context(
    name: &str,
    kind: ContextKind,
    open_name: &str,
    open_kind: ContextKind,
) -> Result<()> {
    if name != open_name || kind != open_kind {
        return Err(CodecError::mismatch(
            format!("context {} ({:?})", name, kind),
            format!("context {} ({:?})", open_name, open_kind),
        ));
    }
    Ok(())
}

fn check_width(bits: u8, max: u8) -> Result<()> {
    if bits == 0 || bits > max {
        return Err(CodecError::UnsupportedFormat(format!(
            "{} bit integer (expected 1..={})",
            bits, max
        )));
    }
    Ok(())
}

/// Reading half of the ABI. Every primitive takes the field's logical name, which tree
/// backends use for navigation and the byte backend ignores.
pub trait ReadBuffer {
    /// Current byte offset.
    fn pos(&self) -> usize {
        self.bit_pos() / 8
    }
    fn bit_pos(&self) -> usize;
    fn has_more(&self, bits: usize) -> bool;
    fn context_depth(&self) -> usize;

    fn pull_context(&mut self, name: &str, kind: ContextKind) -> Result<()>;
    fn close_context(&mut self, name: &str, kind: ContextKind) -> Result<()>;

    fn read_bit(&mut self, name: &str) -> Result<bool>;
    fn read_byte(&mut self, name: &str) -> Result<u8>;
    fn read_byte_array(&mut self, name: &str, len: usize) -> Result<Vec<u8>>;
    /// Read `bits` (1..=64) bits as an unsigned value.
    fn read_unsigned(&mut self, name: &str, bits: u8) -> Result<u64>;
    /// Read `bits` (1..=64) bits and sign-extend.
    fn read_signed(&mut self, name: &str, bits: u8) -> Result<i64>;
    fn read_float(&mut self, name: &str, layout: FloatLayout) -> Result<f64>;
    fn read_wide_int(&mut self, name: &str, bits: usize) -> Result<BigUint>;
    fn read_string(&mut self, name: &str, bits: usize, encoding: StringEncoding) -> Result<String>;

    /// Fails if a context is still open; call once the top-level message is parsed.
    fn ensure_balanced(&self) -> Result<()> {
        match self.context_depth() {
            0 => Ok(()),
            n => Err(CodecError::mismatch("no open context", format!("{} open", n))),
        }
    }

    fn read_u8(&mut self, name: &str, bits: u8) -> Result<u8> {
        check_width(bits, 8)?;
        Ok(self.read_unsigned(name, bits)? as u8)
    }
    fn read_u16(&mut self, name: &str, bits: u8) -> Result<u16> {
        check_width(bits, 16)?;
        Ok(self.read_unsigned(name, bits)? as u16)
    }
    fn read_u32(&mut self, name: &str, bits: u8) -> Result<u32> {
        check_width(bits, 32)?;
        Ok(self.read_unsigned(name, bits)? as u32)
    }
    fn read_u64(&mut self, name: &str, bits: u8) -> Result<u64> {
        self.read_unsigned(name, bits)
    }
    fn read_i8(&mut self, name: &str, bits: u8) -> Result<i8> {
        check_width(bits, 8)?;
        Ok(self.read_signed(name, bits)? as i8)
    }
    fn read_i16(&mut self, name: &str, bits: u8) -> Result<i16> {
        check_width(bits, 16)?;
        Ok(self.read_signed(name, bits)? as i16)
    }
    fn read_i32(&mut self, name: &str, bits: u8) -> Result<i32> {
        check_width(bits, 32)?;
        Ok(self.read_signed(name, bits)? as i32)
    }
    fn read_i64(&mut self, name: &str, bits: u8) -> Result<i64> {
        self.read_signed(name, bits)
    }
}

/// Writing half of the ABI.
pub trait WriteBuffer {
    fn pos(&self) -> usize {
        self.bit_pos() / 8
    }
    fn bit_pos(&self) -> usize;
    fn context_depth(&self) -> usize;

    fn push_context(&mut self, name: &str, kind: ContextKind) -> Result<()>;
    fn pop_context(&mut self, name: &str, kind: ContextKind) -> Result<()>;

    fn write_bit(&mut self, name: &str, value: bool) -> Result<()>;
    fn write_byte(&mut self, name: &str, value: u8) -> Result<()>;
    fn write_byte_array(&mut self, name: &str, data: &[u8]) -> Result<()>;
    /// Write the low `bits` (1..=64) bits of `value`.
    fn write_unsigned(&mut self, name: &str, bits: u8, value: u64) -> Result<()>;
    fn write_signed(&mut self, name: &str, bits: u8, value: i64) -> Result<()>;
    fn write_float(&mut self, name: &str, layout: FloatLayout, value: f64) -> Result<()>;
    fn write_wide_int(&mut self, name: &str, bits: usize, value: &BigUint) -> Result<()>;
    fn write_string(
        &mut self,
        name: &str,
        bits: usize,
        encoding: StringEncoding,
        value: &str,
    ) -> Result<()>;

    /// A derived value that occupies no bits. Only the debug backend renders it.
    fn write_virtual(&mut self, _name: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    fn ensure_balanced(&self) -> Result<()> {
        match self.context_depth() {
            0 => Ok(()),
            n => Err(CodecError::mismatch("no open context", format!("{} open", n))),
        }
    }

    fn write_u8(&mut self, name: &str, bits: u8, value: u8) -> Result<()> {
        check_width(bits, 8)?;
        self.write_unsigned(name, bits, value as u64)
    }
    fn write_u16(&mut self, name: &str, bits: u8, value: u16) -> Result<()> {
        check_width(bits, 16)?;
        self.write_unsigned(name, bits, value as u64)
    }
    fn write_u32(&mut self, name: &str, bits: u8, value: u32) -> Result<()> {
        check_width(bits, 32)?;
        self.write_unsigned(name, bits, value as u64)
    }
    fn write_u64(&mut self, name: &str, bits: u8, value: u64) -> Result<()> {
        self.write_unsigned(name, bits, value)
    }
    fn write_i8(&mut self, name: &str, bits: u8, value: i8) -> Result<()> {
        check_width(bits, 8)?;
        self.write_signed(name, bits, value as i64)
    }
    fn write_i16(&mut self, name: &str, bits: u8, value: i16) -> Result<()> {
        check_width(bits, 16)?;
        self.write_signed(name, bits, value as i64)
    }
    fn write_i32(&mut self, name: &str, bits: u8, value: i32) -> Result<()> {
        check_width(bits, 32)?;
        self.write_signed(name, bits, value as i64)
    }
    fn write_i64(&mut self, name: &str, bits: u8, value: i64) -> Result<()> {
        self.write_signed(name, bits, value)
    }
}

/// Companion `dataType` tags written next to every value by the tree backends.
pub(crate) mod data_type {
    pub const BIT: &str = "bit";
    pub const BYTE: &str = "byte";
    pub const UINT: &str = "uint";
    pub const INT: &str = "int";
    pub const FLOAT: &str = "float";
    pub const STRING: &str = "string";
}

pub(crate) fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

pub(crate) fn from_hex(name: &str, text: &str) -> Result<Vec<u8>> {
    let digits = text.strip_prefix("0x").ok_or_else(|| {
        CodecError::Validation(format!("{}: hex value should start with 0x, got {:?}", name, text))
    })?;
    hex::decode(digits).map_err(|e| CodecError::Validation(format!("{}: {}", name, e)))
}

/// Bit length of a `len` byte field.
pub(crate) fn byte_bits(name: &str, len: usize) -> Result<usize> {
    len.checked_mul(8).ok_or_else(|| {
        CodecError::ValueOutOfRange(format!("{}: {} bytes exceed the bit range", name, len))
    })
}

pub(crate) fn check_bits(bits: u8) -> Result<()> {
    check_width(bits, 64)
}
