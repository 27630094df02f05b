//! # bitcodec — bit-precision codec framework
//!
//! One read/write ABI ([`ReadBuffer`] / [`WriteBuffer`]) that generated protocol parsers
//! and serializers call into, with four interchangeable backends:
//!
//! - **Byte stream**: [`ByteReader`] / [`ByteWriter`], exact bit-level I/O in either byte
//!   order
//! - **JSON**: [`JsonReader`] / [`JsonWriter`], fields as object keys with `dataType` and
//!   `bitLength` companions
//! - **XML**: [`XmlReader`] / [`XmlWriter`], one element per field
//! - **Debug boxes**: [`BoxWriter`], write-only nested ASCII boxes for humans
//!
//! ## Field types
//!
//! - bits, bytes and byte arrays
//! - unsigned/signed integers of 1..=64 bits, arbitrary-width integers as [`BigUint`]
//! - IEEE-754 binary32/binary64 and compact `0.01 * mantissa * 2^exponent` floats
//!   ([`FloatLayout`])
//! - fixed-width strings in UTF-8, ASCII or UTF-16 ([`StringEncoding`])
//!
//! ## Message families
//!
//! Discriminated hierarchies are enums; see [`message`] for the parent/child convention
//! and [`fields`] for optional fields and count-, length- and terminator-governed arrays.
//!
//! ## Usage
//!
//! ```
//! use bitcodec::{ByteReader, ByteWriter, Endianness, ReadBuffer, WriteBuffer};
//!
//! let mut w = ByteWriter::new(Endianness::Little);
//! w.write_unsigned("flags", 3, 0b101).unwrap();
//! w.write_unsigned("length", 16, 0x1234).unwrap();
//! let bytes = w.into_bytes();
//!
//! let mut r = ByteReader::new(&bytes, Endianness::Little);
//! assert_eq!(r.read_unsigned("flags", 3).unwrap(), 0b101);
//! assert_eq!(r.read_unsigned("length", 16).unwrap(), 0x1234);
//! ```

pub mod ascii_box;
pub mod boxed;
pub mod byte_buffer;
pub mod codec;
pub mod dump;
pub mod fields;
pub mod json;
pub mod message;
pub mod xml;

pub use ascii_box::{
    merge_horizontal, merge_vertical, AsciiBox, AsciiBoxWriter, BoxOptions, BoxSet,
};
pub use boxed::{BoxWriter, BoxWriterConfig};
pub use byte_buffer::{ByteReader, ByteWriter};
pub use codec::{
    CodecError, ContextKind, ContextStack, Endianness, FloatLayout, ReadBuffer, Result,
    StringEncoding, WriteBuffer,
};
pub use json::{JsonReader, JsonWriter};
pub use message::{parse_from_bytes, unmapped, Message, MessageParent};
pub use num_bigint::BigUint;
pub use xml::{XmlReader, XmlWriter};
