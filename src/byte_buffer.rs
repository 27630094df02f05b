//! Bit-accurate reader/writer over a byte buffer.
//!
//! Bits move MSB-first. Fields whose width is a whole number of bytes (and wider than one
//! byte) have their byte order reversed under [`Endianness::Little`]; every other width is
//! bit-sequential in both orders.

use crate::codec::{
    check_bits, CodecError, ContextKind, ContextStack, Endianness, FloatLayout, ReadBuffer,
    Result, StringEncoding, WriteBuffer,
};
use num_bigint::BigUint;

fn swaps(endianness: Endianness, bits: usize) -> bool {
    endianness == Endianness::Little && bits > 8 && bits % 8 == 0
}

/// Reverse the byte order of the low `bits` bits of `value` (`bits` a multiple of 8).
fn swap_low(value: u64, bits: u8) -> u64 {
    value.swap_bytes() >> (64 - bits as u32)
}

fn low_mask(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn sign_extend(raw: u64, bits: u8) -> i64 {
    let shift = 64 - bits as u32;
    ((raw << shift) as i64) >> shift
}

/// Big-endian bytes of `value`, left-padded with zeros to `len` bytes.
fn padded_be(value: &BigUint, len: usize) -> Vec<u8> {
    let raw = value.to_bytes_be();
    let raw = &raw[raw.len().saturating_sub(len)..];
    let mut out = vec![0u8; len - raw.len()];
    out.extend_from_slice(raw);
    out
}

fn reverse_bytes(value: &BigUint, len: usize) -> BigUint {
    let mut bytes = padded_be(value, len);
    bytes.reverse();
    BigUint::from_bytes_be(&bytes)
}

fn extract_bits(data: &[u8], start: usize, n: usize) -> u64 {
    let mut value = 0u64;
    for i in start..start + n {
        let bit = (data[i / 8] >> (7 - i % 8)) & 1;
        value = (value << 1) | bit as u64;
    }
    value
}

/// Reader over a borrowed byte slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
    endianness: Endianness,
    contexts: ContextStack,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], endianness: Endianness) -> Self {
        ByteReader {
            data,
            bit_pos: 0,
            endianness,
            contexts: ContextStack::default(),
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Switch byte order for the following fields.
    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    pub fn total_bytes(&self) -> usize {
        self.data.len()
    }

    /// Bits left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.bit_pos
    }

    /// Move the cursor to byte offset `pos`.
    pub fn reset(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(CodecError::EndOfBuffer {
                requested: pos.saturating_mul(8),
                remaining: self.data.len() * 8,
            });
        }
        self.bit_pos = pos * 8;
        Ok(())
    }

    /// Look at the byte `offset` bytes ahead of the cursor without consuming it.
    pub fn peek_byte(&self, offset: usize) -> Result<u8> {
        let start = offset
            .checked_mul(8)
            .and_then(|bits| bits.checked_add(self.bit_pos))
            .filter(|start| start.saturating_add(8) <= self.data.len() * 8)
            .ok_or_else(|| CodecError::EndOfBuffer {
                requested: offset.saturating_mul(8).saturating_add(8),
                remaining: self.remaining(),
            })?;
        Ok(extract_bits(self.data, start, 8) as u8)
    }

    fn take_bits(&mut self, n: usize) -> Result<u64> {
        debug_assert!(n <= 64);
        if n > self.remaining() {
            return Err(CodecError::EndOfBuffer {
                requested: n,
                remaining: self.remaining(),
            });
        }
        let value = extract_bits(self.data, self.bit_pos, n);
        self.bit_pos += n;
        Ok(value)
    }

    /// Read `bits` bits in stream order, 64 at a time.
    fn take_wide(&mut self, bits: usize) -> Result<BigUint> {
        if bits > self.remaining() {
            return Err(CodecError::EndOfBuffer {
                requested: bits,
                remaining: self.remaining(),
            });
        }
        let mut value = BigUint::default();
        let mut left = bits;
        while left > 0 {
            let chunk = left.min(64);
            value = (value << chunk) | BigUint::from(self.take_bits(chunk)?);
            left -= chunk;
        }
        Ok(value)
    }
}

impl ReadBuffer for ByteReader<'_> {
    fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    fn has_more(&self, bits: usize) -> bool {
        bits <= self.remaining()
    }

    fn context_depth(&self) -> usize {
        self.contexts.depth()
    }

    fn pull_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "pull context");
        self.contexts.push(name, kind);
        Ok(())
    }

    fn close_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "close context");
        self.contexts.pop(name, kind)
    }

    fn read_bit(&mut self, _name: &str) -> Result<bool> {
        Ok(self.take_bits(1)? == 1)
    }

    fn read_byte(&mut self, _name: &str) -> Result<u8> {
        Ok(self.take_bits(8)? as u8)
    }

    fn read_byte_array(&mut self, _name: &str, len: usize) -> Result<Vec<u8>> {
        let bits = len.saturating_mul(8);
        if bits > self.remaining() {
            return Err(CodecError::EndOfBuffer {
                requested: bits,
                remaining: self.remaining(),
            });
        }
        (0..len).map(|_| Ok(self.take_bits(8)? as u8)).collect()
    }

    fn read_unsigned(&mut self, _name: &str, bits: u8) -> Result<u64> {
        check_bits(bits)?;
        let raw = self.take_bits(bits as usize)?;
        if swaps(self.endianness, bits as usize) {
            Ok(swap_low(raw, bits))
        } else {
            Ok(raw)
        }
    }

    fn read_signed(&mut self, name: &str, bits: u8) -> Result<i64> {
        let raw = self.read_unsigned(name, bits)?;
        Ok(sign_extend(raw, bits))
    }

    fn read_float(&mut self, name: &str, layout: FloatLayout) -> Result<f64> {
        if layout == FloatLayout::IEEE_SINGLE {
            return Ok(f32::from_bits(self.read_unsigned(name, 32)? as u32) as f64);
        }
        if layout == FloatLayout::IEEE_DOUBLE {
            return Ok(f64::from_bits(self.read_unsigned(name, 64)?));
        }
        layout.check_compact()?;
        // Compact parts are bit-sequential.
        let negative = layout.signed && self.take_bits(1)? == 1;
        let exponent = sign_extend(
            self.take_bits(layout.exponent_bits as usize)?,
            layout.exponent_bits,
        );
        let mantissa = self.take_bits(layout.mantissa_bits as usize)?;
        Ok(FloatLayout::decode_compact(negative, exponent, mantissa))
    }

    fn read_wide_int(&mut self, _name: &str, bits: usize) -> Result<BigUint> {
        if bits == 0 {
            return Err(CodecError::UnsupportedFormat("0 bit integer".to_string()));
        }
        let value = self.take_wide(bits)?;
        if swaps(self.endianness, bits) {
            Ok(reverse_bytes(&value, bits / 8))
        } else {
            Ok(value)
        }
    }

    fn read_string(&mut self, _name: &str, bits: usize, encoding: StringEncoding) -> Result<String> {
        if bits % 8 != 0 {
            return Err(CodecError::UnsupportedFormat(format!(
                "{} bit string (not a whole number of bytes)",
                bits
            )));
        }
        let value = self.take_wide(bits)?;
        let bytes = padded_be(&value, bits / 8);
        encoding.decode(encoding.trim_padding(&bytes))
    }
}

/// Writer producing a growable byte sequence.
#[derive(Debug)]
pub struct ByteWriter {
    data: Vec<u8>,
    bit_pos: usize,
    endianness: Endianness,
    contexts: ContextStack,
}

impl ByteWriter {
    pub fn new(endianness: Endianness) -> Self {
        ByteWriter {
            data: Vec::new(),
            bit_pos: 0,
            endianness,
            contexts: ContextStack::default(),
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    /// Bytes written so far, counting a trailing partial byte.
    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    /// The finished buffer. A trailing partial byte is zero-padded.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn put_bits(&mut self, n: usize, value: u64) {
        for i in (0..n).rev() {
            if self.bit_pos % 8 == 0 {
                self.data.push(0);
            }
            if (value >> i) & 1 == 1 {
                self.data[self.bit_pos / 8] |= 1 << (7 - self.bit_pos % 8);
            }
            self.bit_pos += 1;
        }
    }

    fn put_wide(&mut self, bits: usize, value: &BigUint) {
        let mut left = bits;
        while left > 0 {
            let chunk = left.min(64);
            let part: BigUint = (value >> (left - chunk)) & BigUint::from(low_mask(chunk as u8));
            let part = part.to_u64_digits().first().copied().unwrap_or(0);
            self.put_bits(chunk, part);
            left -= chunk;
        }
    }
}

impl WriteBuffer for ByteWriter {
    fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    fn context_depth(&self) -> usize {
        self.contexts.depth()
    }

    fn push_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "push context");
        self.contexts.push(name, kind);
        Ok(())
    }

    fn pop_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "pop context");
        self.contexts.pop(name, kind)
    }

    fn write_bit(&mut self, _name: &str, value: bool) -> Result<()> {
        self.put_bits(1, value as u64);
        Ok(())
    }

    fn write_byte(&mut self, _name: &str, value: u8) -> Result<()> {
        self.put_bits(8, value as u64);
        Ok(())
    }

    fn write_byte_array(&mut self, _name: &str, data: &[u8]) -> Result<()> {
        for &b in data {
            self.put_bits(8, b as u64);
        }
        Ok(())
    }

    fn write_unsigned(&mut self, _name: &str, bits: u8, value: u64) -> Result<()> {
        check_bits(bits)?;
        let mut value = value & low_mask(bits);
        if swaps(self.endianness, bits as usize) {
            value = swap_low(value, bits);
        }
        self.put_bits(bits as usize, value);
        Ok(())
    }

    fn write_signed(&mut self, name: &str, bits: u8, value: i64) -> Result<()> {
        self.write_unsigned(name, bits, value as u64)
    }

    fn write_float(&mut self, name: &str, layout: FloatLayout, value: f64) -> Result<()> {
        let raw = layout.raw_bits(value)?;
        if layout.is_ieee() {
            return self.write_unsigned(name, layout.bit_length() as u8, raw);
        }
        // Compact parts are bit-sequential.
        self.put_bits(layout.bit_length(), raw);
        Ok(())
    }

    fn write_wide_int(&mut self, _name: &str, bits: usize, value: &BigUint) -> Result<()> {
        if bits == 0 {
            return Err(CodecError::UnsupportedFormat("0 bit integer".to_string()));
        }
        if value.bits() > bits as u64 {
            return Err(CodecError::ValueOutOfRange(format!(
                "{} needs {} bits, field has {}",
                value,
                value.bits(),
                bits
            )));
        }
        if swaps(self.endianness, bits) {
            let swapped = reverse_bytes(value, bits / 8);
            self.put_wide(bits, &swapped);
        } else {
            self.put_wide(bits, value);
        }
        Ok(())
    }

    fn write_string(
        &mut self,
        _name: &str,
        bits: usize,
        encoding: StringEncoding,
        value: &str,
    ) -> Result<()> {
        if bits % 8 != 0 {
            return Err(CodecError::UnsupportedFormat(format!(
                "{} bit string (not a whole number of bytes)",
                bits
            )));
        }
        let mut bytes = encoding.encode(value)?;
        if bytes.len() * 8 > bits {
            return Err(CodecError::ValueOutOfRange(format!(
                "{:?} encodes to {} bytes, field holds {}",
                value,
                bytes.len(),
                bits / 8
            )));
        }
        bytes.resize(bits / 8, 0);
        self.put_wide(bits, &BigUint::from_bytes_be(&bytes));
        Ok(())
    }
}
