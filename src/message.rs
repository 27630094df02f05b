//! Discriminated message families.
//!
//! A family is an enum of variants behind a parent that owns the shared header. Parsers
//! dispatch with one `match` on the discriminator and fall through to [`unmapped`]; writers
//! go through [`MessageParent::serialize_parent`] so the header is written once, inside the
//! parent's context, before the variant's own fields.

use crate::ascii_box::AsciiBox;
use crate::boxed::{BoxWriter, BoxWriterConfig};
use crate::byte_buffer::{ByteReader, ByteWriter};
use crate::codec::{CodecError, ContextKind, Endianness, ReadBuffer, Result, WriteBuffer};
use crate::json::JsonWriter;
use crate::xml::XmlWriter;
use std::fmt::Display;

/// Anything that can be written through the [`WriteBuffer`] ABI.
pub trait Message {
    fn serialize(&self, writer: &mut dyn WriteBuffer) -> Result<()>;

    fn length_in_bits(&self) -> usize;

    fn length_in_bytes(&self) -> usize {
        (self.length_in_bits() + 7) / 8
    }

    fn to_bytes(&self, endianness: Endianness) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new(endianness);
        self.serialize(&mut writer)?;
        writer.ensure_balanced()?;
        Ok(writer.into_bytes())
    }

    fn to_box(&self, config: BoxWriterConfig) -> Result<AsciiBox> {
        let mut writer = BoxWriter::new(config);
        self.serialize(&mut writer)?;
        writer.into_box()
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        let mut writer = JsonWriter::new();
        self.serialize(&mut writer)?;
        writer.into_document()
    }

    fn to_xml(&self) -> Result<String> {
        let mut writer = XmlWriter::new();
        self.serialize(&mut writer)?;
        writer.into_string()
    }
}

/// Parent of a message family: owns the context and the header fields shared by all
/// variants.
pub trait MessageParent {
    fn context_name(&self) -> &str;

    fn write_header(&self, writer: &mut dyn WriteBuffer) -> Result<()>;

    /// Push the parent context, write the header, let the variant write its fields, pop.
    fn serialize_parent<F>(&self, writer: &mut dyn WriteBuffer, write_child: F) -> Result<()>
    where
        Self: Sized,
        F: FnOnce(&mut dyn WriteBuffer) -> Result<()>,
    {
        let name = self.context_name();
        writer.push_context(name, ContextKind::Element)?;
        self.write_header(writer)?;
        write_child(writer)?;
        writer.pop_context(name, ContextKind::Element)
    }
}

/// Error for a discriminator no variant of `family` is registered for.
pub fn unmapped(family: &'static str, discriminator: impl Display) -> CodecError {
    CodecError::UnmappedType {
        family,
        discriminator: discriminator.to_string(),
    }
}

/// Parse one top-level message from `bytes` and check that every context was closed.
pub fn parse_from_bytes<T, F>(bytes: &[u8], endianness: Endianness, parse: F) -> Result<T>
where
    F: FnOnce(&mut dyn ReadBuffer) -> Result<T>,
{
    let mut reader = ByteReader::new(bytes, endianness);
    let message = parse(&mut reader)?;
    reader.ensure_balanced()?;
    Ok(message)
}
