//! XML tree backend.
//!
//! Contexts become elements (`isList="true"` for lists) and every field becomes one
//! `<name dataType=".." bitLength="..">text</name>` element.

use crate::codec::{
    byte_bits, check_bits, data_type, from_hex, to_hex, CodecError, ContextKind, ContextStack,
    FloatLayout, ReadBuffer, Result, StringEncoding, WriteBuffer,
};
use num_bigint::BigUint;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::VecDeque;
use std::str::FromStr;

const IS_LIST: &str = "isList";
const DATA_TYPE: &str = "dataType";
const BIT_LENGTH: &str = "bitLength";

/// Writes indented XML.
pub struct XmlWriter {
    writer: Writer<Vec<u8>>,
    contexts: ContextStack,
    bit_pos: usize,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    pub fn new() -> Self {
        XmlWriter {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
            contexts: ContextStack::default(),
            bit_pos: 0,
        }
    }

    pub fn into_string(self) -> Result<String> {
        self.ensure_balanced()?;
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| CodecError::Xml(e.to_string()))
    }

    fn leaf(&mut self, name: &str, tag: &str, bits: usize, text: &str) -> Result<()> {
        let bit_length = bits.to_string();
        let mut start = BytesStart::new(name);
        start.push_attribute((DATA_TYPE, tag));
        start.push_attribute((BIT_LENGTH, bit_length.as_str()));
        self.writer.write_event(Event::Start(start))?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        self.bit_pos += bits;
        Ok(())
    }
}

impl WriteBuffer for XmlWriter {
    fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    fn context_depth(&self) -> usize {
        self.contexts.depth()
    }

    fn push_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "push context");
        let mut start = BytesStart::new(name);
        if kind == ContextKind::List {
            start.push_attribute((IS_LIST, "true"));
        }
        self.writer.write_event(Event::Start(start))?;
        self.contexts.push(name, kind);
        Ok(())
    }

    fn pop_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "pop context");
        self.contexts.pop(name, kind)?;
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn write_bit(&mut self, name: &str, value: bool) -> Result<()> {
        self.leaf(name, data_type::BIT, 1, if value { "true" } else { "false" })
    }

    fn write_byte(&mut self, name: &str, value: u8) -> Result<()> {
        self.leaf(name, data_type::BYTE, 8, &to_hex(&[value]))
    }

    fn write_byte_array(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.leaf(name, data_type::BYTE, data.len() * 8, &to_hex(data))
    }

    fn write_unsigned(&mut self, name: &str, bits: u8, value: u64) -> Result<()> {
        check_bits(bits)?;
        self.leaf(name, data_type::UINT, bits as usize, &value.to_string())
    }

    fn write_signed(&mut self, name: &str, bits: u8, value: i64) -> Result<()> {
        check_bits(bits)?;
        self.leaf(name, data_type::INT, bits as usize, &value.to_string())
    }

    fn write_float(&mut self, name: &str, layout: FloatLayout, value: f64) -> Result<()> {
        self.leaf(name, data_type::FLOAT, layout.bit_length(), &value.to_string())
    }

    fn write_wide_int(&mut self, name: &str, bits: usize, value: &BigUint) -> Result<()> {
        self.leaf(name, data_type::UINT, bits, &value.to_string())
    }

    fn write_string(
        &mut self,
        name: &str,
        bits: usize,
        _encoding: StringEncoding,
        value: &str,
    ) -> Result<()> {
        self.leaf(name, data_type::STRING, bits, value)
    }
}

#[derive(Debug)]
enum XmlEvent {
    Start {
        name: String,
        attributes: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Text(String),
}

impl XmlEvent {
    fn describe(&self) -> String {
        match self {
            XmlEvent::Start { name, .. } => format!("<{}>", name),
            XmlEvent::End { name } => format!("</{}>", name),
            XmlEvent::Text(text) => format!("text {:?}", text),
        }
    }
}

fn attribute<'a>(attributes: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Text directly inside a leaf element is kept verbatim. Whitespace between elements is
/// indentation and dropped.
fn parse_events(text: &str) -> Result<VecDeque<XmlEvent>> {
    let mut reader = Reader::from_str(text);
    reader.expand_empty_elements(true);
    let mut events = VecDeque::new();
    let mut pending: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                flush_text(&mut events, pending.take(), false);
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut attributes = Vec::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| CodecError::Xml(e.to_string()))?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    attributes.push((key, attr.unescape_value()?.into_owned()));
                }
                events.push_back(XmlEvent::Start { name, attributes });
            }
            Event::End(e) => {
                let in_leaf = matches!(events.back(), Some(XmlEvent::Start { .. }));
                flush_text(&mut events, pending.take(), in_leaf);
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                events.push_back(XmlEvent::End { name });
            }
            Event::Text(e) => pending
                .get_or_insert_with(String::new)
                .push_str(&e.unescape()?),
            Event::CData(e) => pending
                .get_or_insert_with(String::new)
                .push_str(&String::from_utf8_lossy(&e.into_inner())),
            Event::Eof => break,
            _ => {}
        }
    }
    flush_text(&mut events, pending, false);
    Ok(events)
}

fn flush_text(events: &mut VecDeque<XmlEvent>, text: Option<String>, in_leaf: bool) {
    if let Some(text) = text.filter(|t| in_leaf || !t.trim().is_empty()) {
        events.push_back(XmlEvent::Text(text));
    }
}

/// Reads fields from an XML document, checking its element structure as it goes.
pub struct XmlReader {
    events: VecDeque<XmlEvent>,
    contexts: ContextStack,
    validate: bool,
    bit_pos: usize,
}

impl XmlReader {
    pub fn from_str(text: &str, validate: bool) -> Result<Self> {
        Ok(XmlReader {
            events: parse_events(text)?,
            contexts: ContextStack::default(),
            validate,
            bit_pos: 0,
        })
    }

    fn next_event(&mut self, expected: &str) -> Result<XmlEvent> {
        self.events
            .pop_front()
            .ok_or_else(|| CodecError::mismatch(expected, "end of document"))
    }

    fn expect_start(&mut self, name: &str) -> Result<Vec<(String, String)>> {
        let expected = format!("<{}>", name);
        match self.next_event(&expected)? {
            XmlEvent::Start {
                name: found,
                attributes,
            } if found == name => Ok(attributes),
            other => Err(CodecError::mismatch(expected, other.describe())),
        }
    }

    fn expect_end(&mut self, name: &str) -> Result<()> {
        let expected = format!("</{}>", name);
        match self.next_event(&expected)? {
            XmlEvent::End { name: found } if found == name => Ok(()),
            other => Err(CodecError::mismatch(expected, other.describe())),
        }
    }

    /// Consume one field element and return its text.
    fn leaf(&mut self, name: &str, tag: &str, bits: usize) -> Result<String> {
        let attributes = self.expect_start(name)?;
        if self.validate {
            let found_tag = attribute(&attributes, DATA_TYPE);
            if found_tag != Some(tag) {
                return Err(CodecError::Validation(format!(
                    "{}: expected dataType {}, found {:?}",
                    name, tag, found_tag
                )));
            }
            let found_bits = attribute(&attributes, BIT_LENGTH);
            if found_bits.and_then(|b| b.parse::<usize>().ok()) != Some(bits) {
                return Err(CodecError::Validation(format!(
                    "{}: expected bitLength {}, found {:?}",
                    name, bits, found_bits
                )));
            }
        }
        let text = match self.events.pop_front() {
            Some(XmlEvent::Text(text)) => text,
            Some(other) => {
                self.events.push_front(other);
                String::new()
            }
            None => String::new(),
        };
        self.expect_end(name)?;
        self.bit_pos += bits;
        Ok(text)
    }

    fn parsed<T>(&mut self, name: &str, tag: &str, bits: usize) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let text = self.leaf(name, tag, bits)?;
        text.parse::<T>()
            .map_err(|e| CodecError::Validation(format!("{}: {:?}: {}", name, text, e)))
    }
}

impl ReadBuffer for XmlReader {
    fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    fn has_more(&self, _bits: usize) -> bool {
        true
    }

    fn context_depth(&self) -> usize {
        self.contexts.depth()
    }

    fn pull_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "pull context");
        let attributes = self.expect_start(name)?;
        let is_list = attribute(&attributes, IS_LIST) == Some("true");
        if is_list != (kind == ContextKind::List) {
            return Err(CodecError::mismatch(
                format!("{} ({:?})", name, kind),
                format!("{} with isList={}", name, is_list),
            ));
        }
        self.contexts.push(name, kind);
        Ok(())
    }

    fn close_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "close context");
        self.contexts.pop(name, kind)?;
        self.expect_end(name)
    }

    fn read_bit(&mut self, name: &str) -> Result<bool> {
        self.parsed(name, data_type::BIT, 1)
    }

    fn read_byte(&mut self, name: &str) -> Result<u8> {
        let text = self.leaf(name, data_type::BYTE, 8)?;
        match from_hex(name, &text)?.as_slice() {
            [b] => Ok(*b),
            _ => Err(CodecError::Validation(format!("{}: {} is not one byte", name, text))),
        }
    }

    fn read_byte_array(&mut self, name: &str, len: usize) -> Result<Vec<u8>> {
        let text = self.leaf(name, data_type::BYTE, byte_bits(name, len)?)?;
        let bytes = from_hex(name, &text)?;
        if bytes.len() != len {
            return Err(CodecError::Validation(format!(
                "{}: expected {} bytes, found {}",
                name,
                len,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    fn read_unsigned(&mut self, name: &str, bits: u8) -> Result<u64> {
        check_bits(bits)?;
        self.parsed(name, data_type::UINT, bits as usize)
    }

    fn read_signed(&mut self, name: &str, bits: u8) -> Result<i64> {
        check_bits(bits)?;
        self.parsed(name, data_type::INT, bits as usize)
    }

    fn read_float(&mut self, name: &str, layout: FloatLayout) -> Result<f64> {
        self.parsed(name, data_type::FLOAT, layout.bit_length())
    }

    fn read_wide_int(&mut self, name: &str, bits: usize) -> Result<BigUint> {
        self.parsed(name, data_type::UINT, bits)
    }

    fn read_string(&mut self, name: &str, bits: usize, _encoding: StringEncoding) -> Result<String> {
        self.leaf(name, data_type::STRING, bits)
    }
}
