//! Field-level helpers used by message parsers: const and reserved fields, optional fields,
//! context scopes and arrays.
//!
//! Arrays are wrapped in a list context named after the field, so tree backends render them
//! as lists.

use crate::codec::{byte_bits, CodecError, ContextKind, ReadBuffer, Result, WriteBuffer};

/// Read a field that must hold `expected`.
pub fn read_const<R: ReadBuffer + ?Sized>(
    reader: &mut R,
    name: &str,
    bits: u8,
    expected: u64,
) -> Result<u64> {
    let value = reader.read_unsigned(name, bits)?;
    if value != expected {
        return Err(CodecError::Validation(format!(
            "{}: expected constant {:#x}, found {:#x}",
            name, expected, value
        )));
    }
    Ok(value)
}

/// Read a reserved field. A value other than `expected` is logged and returned, so it can be
/// written back unchanged.
pub fn read_reserved<R: ReadBuffer + ?Sized>(
    reader: &mut R,
    name: &str,
    bits: u8,
    expected: u64,
) -> Result<u64> {
    let value = reader.read_unsigned(name, bits)?;
    if value != expected {
        tracing::warn!(
            field = name,
            expected,
            actual = value,
            "reserved field holds unexpected value"
        );
    }
    Ok(value)
}

pub fn write_reserved<W: WriteBuffer + ?Sized>(
    writer: &mut W,
    name: &str,
    bits: u8,
    value: u64,
) -> Result<()> {
    writer.write_unsigned(name, bits, value)
}

/// Run `f` inside a pulled context.
pub fn read_context<R, T, F>(reader: &mut R, name: &str, kind: ContextKind, f: F) -> Result<T>
where
    R: ReadBuffer + ?Sized,
    F: FnOnce(&mut R) -> Result<T>,
{
    reader.pull_context(name, kind)?;
    let value = f(reader)?;
    reader.close_context(name, kind)?;
    Ok(value)
}

pub fn write_context<W, F>(writer: &mut W, name: &str, kind: ContextKind, f: F) -> Result<()>
where
    W: WriteBuffer + ?Sized,
    F: FnOnce(&mut W) -> Result<()>,
{
    writer.push_context(name, kind)?;
    f(writer)?;
    writer.pop_context(name, kind)
}

/// Parse the field only when `present` (computed from fields already read).
pub fn read_optional<R, T, F>(reader: &mut R, present: bool, parse: F) -> Result<Option<T>>
where
    R: ReadBuffer + ?Sized,
    F: FnOnce(&mut R) -> Result<T>,
{
    if present {
        parse(reader).map(Some)
    } else {
        Ok(None)
    }
}

pub fn write_optional<W, T, F>(writer: &mut W, value: Option<&T>, write: F) -> Result<()>
where
    W: WriteBuffer + ?Sized,
    F: FnOnce(&mut W, &T) -> Result<()>,
{
    match value {
        Some(value) => write(writer, value),
        None => Ok(()),
    }
}

/// True when fewer than `threshold` bytes of a `declared_len` byte message are left after
/// `consumed` bytes. Used for trailing optional fields.
pub fn remaining_below(declared_len: usize, consumed: usize, threshold: usize) -> bool {
    declared_len.saturating_sub(consumed) < threshold
}

pub fn read_count_array<R, T, F>(
    reader: &mut R,
    name: &str,
    count: usize,
    mut parse: F,
) -> Result<Vec<T>>
where
    R: ReadBuffer + ?Sized,
    F: FnMut(&mut R) -> Result<T>,
{
    read_context(reader, name, ContextKind::List, |reader| {
        (0..count).map(|_| parse(reader)).collect()
    })
}

/// Read elements until exactly `byte_len` bytes have been consumed.
///
/// An element that ends past the array boundary fails with [`CodecError::ArrayOverrun`].
pub fn read_length_array<R, T, F>(
    reader: &mut R,
    name: &str,
    byte_len: usize,
    mut parse: F,
) -> Result<Vec<T>>
where
    R: ReadBuffer + ?Sized,
    F: FnMut(&mut R) -> Result<T>,
{
    read_context(reader, name, ContextKind::List, |reader| {
        let end = byte_bits(name, byte_len)?
            .checked_add(reader.bit_pos())
            .ok_or_else(|| {
                CodecError::ValueOutOfRange(format!("{}: array end past the bit range", name))
            })?;
        let mut items = Vec::new();
        while reader.bit_pos() < end {
            let before = reader.bit_pos();
            items.push(parse(reader)?);
            let after = reader.bit_pos();
            if after > end {
                return Err(CodecError::ArrayOverrun {
                    end: end / 8,
                    pos: (after + 7) / 8,
                });
            }
            if after == before {
                return Err(stalled(name));
            }
        }
        Ok(items)
    })
}

/// Read elements until `terminated` reports true; it is checked before every element.
pub fn read_terminated_array<R, T, P, F>(
    reader: &mut R,
    name: &str,
    mut terminated: P,
    mut parse: F,
) -> Result<Vec<T>>
where
    R: ReadBuffer + ?Sized,
    P: FnMut(&R) -> Result<bool>,
    F: FnMut(&mut R) -> Result<T>,
{
    read_context(reader, name, ContextKind::List, |reader| {
        let mut items = Vec::new();
        while !terminated(reader)? {
            let before = reader.bit_pos();
            items.push(parse(reader)?);
            if reader.bit_pos() == before {
                return Err(stalled(name));
            }
        }
        Ok(items)
    })
}

pub fn write_array<W, T, F>(writer: &mut W, name: &str, items: &[T], mut write: F) -> Result<()>
where
    W: WriteBuffer + ?Sized,
    F: FnMut(&mut W, &T) -> Result<()>,
{
    write_context(writer, name, ContextKind::List, |writer| {
        items.iter().try_for_each(|item| write(writer, item))
    })
}

fn stalled(name: &str) -> CodecError {
    CodecError::mismatch(
        format!("{} element consuming input", name),
        "element of zero length",
    )
}
