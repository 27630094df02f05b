//! JSON tree backend.
//!
//! Every field becomes a key of the enclosing object; with attributes enabled two companion
//! keys record its type tag and declared bit length, so a reader can check that the document
//! was produced for the same message layout.

use crate::codec::{
    byte_bits, check_bits, check_context, data_type, from_hex, to_hex, CodecError, ContextKind,
    FloatLayout, ReadBuffer, Result, StringEncoding, WriteBuffer,
};
use num_bigint::BigUint;
use serde_json::{Map, Value};
use std::collections::VecDeque;

const DATA_TYPE_SUFFIX: &str = "__plc4x_dataType";
const BIT_LENGTH_SUFFIX: &str = "__plc4x_bitLength";

fn data_type_key(name: &str) -> String {
    format!("{}{}", name, DATA_TYPE_SUFFIX)
}

fn bit_length_key(name: &str) -> String {
    format!("{}{}", name, BIT_LENGTH_SUFFIX)
}

enum WriteFrame {
    Element { name: String, map: Map<String, Value> },
    List { name: String, items: Vec<Value> },
}

/// Builds a JSON document from write calls.
pub struct JsonWriter {
    root: Map<String, Value>,
    stack: Vec<WriteFrame>,
    attributes: bool,
    bit_pos: usize,
}

impl Default for JsonWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonWriter {
    pub fn new() -> Self {
        JsonWriter {
            root: Map::new(),
            stack: Vec::new(),
            attributes: true,
            bit_pos: 0,
        }
    }

    /// Emit (default) or omit the `dataType`/`bitLength` companion keys.
    pub fn with_attributes(mut self, attributes: bool) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn into_document(self) -> Result<Value> {
        self.ensure_balanced()?;
        Ok(Value::Object(self.root))
    }

    pub fn to_json_string(self) -> Result<String> {
        let doc = self.into_document()?;
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Attach `value` under `name` in the innermost open frame.
    fn attach(&mut self, name: &str, value: Value, attrs: Option<(&str, usize)>) -> Result<()> {
        let mut entry = Map::new();
        entry.insert(name.to_string(), value);
        if let (true, Some((tag, bits))) = (self.attributes, attrs) {
            entry.insert(data_type_key(name), Value::from(tag));
            entry.insert(bit_length_key(name), Value::from(bits));
        }
        let target = match self.stack.last_mut() {
            Some(WriteFrame::List { items, .. }) => {
                items.push(Value::Object(entry));
                return Ok(());
            }
            Some(WriteFrame::Element { map, .. }) => map,
            None => &mut self.root,
        };
        if target.contains_key(name) {
            return Err(CodecError::mismatch(
                format!("new field {}", name),
                format!("duplicate field {}", name),
            ));
        }
        target.extend(entry);
        Ok(())
    }

    fn leaf(&mut self, name: &str, value: Value, tag: &str, bits: usize) -> Result<()> {
        self.attach(name, value, Some((tag, bits)))?;
        self.bit_pos += bits;
        Ok(())
    }
}

impl WriteBuffer for JsonWriter {
    fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    fn context_depth(&self) -> usize {
        self.stack.len()
    }

    fn push_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "push context");
        let name = name.to_string();
        self.stack.push(match kind {
            ContextKind::Element => WriteFrame::Element {
                name,
                map: Map::new(),
            },
            ContextKind::List => WriteFrame::List {
                name,
                items: Vec::new(),
            },
        });
        Ok(())
    }

    fn pop_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "pop context");
        match self.stack.last() {
            None => {
                return Err(CodecError::mismatch(
                    format!("open context {}", name),
                    "no open context",
                ))
            }
            Some(WriteFrame::Element { name: open, .. }) => {
                check_context(name, kind, open, ContextKind::Element)?
            }
            Some(WriteFrame::List { name: open, .. }) => {
                check_context(name, kind, open, ContextKind::List)?
            }
        }
        let value = match self.stack.pop() {
            Some(WriteFrame::Element { map, .. }) => Value::Object(map),
            Some(WriteFrame::List { items, .. }) => Value::Array(items),
            None => Value::Null,
        };
        self.attach(name, value, None)
    }

    fn write_bit(&mut self, name: &str, value: bool) -> Result<()> {
        self.leaf(name, Value::Bool(value), data_type::BIT, 1)
    }

    fn write_byte(&mut self, name: &str, value: u8) -> Result<()> {
        self.leaf(name, Value::from(to_hex(&[value])), data_type::BYTE, 8)
    }

    fn write_byte_array(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.leaf(name, Value::from(to_hex(data)), data_type::BYTE, data.len() * 8)
    }

    fn write_unsigned(&mut self, name: &str, bits: u8, value: u64) -> Result<()> {
        check_bits(bits)?;
        self.leaf(name, Value::from(value), data_type::UINT, bits as usize)
    }

    fn write_signed(&mut self, name: &str, bits: u8, value: i64) -> Result<()> {
        check_bits(bits)?;
        self.leaf(name, Value::from(value), data_type::INT, bits as usize)
    }

    fn write_float(&mut self, name: &str, layout: FloatLayout, value: f64) -> Result<()> {
        let number = serde_json::Number::from_f64(value).ok_or_else(|| {
            CodecError::ValueOutOfRange(format!("{}: {} has no JSON form", name, value))
        })?;
        self.leaf(name, Value::Number(number), data_type::FLOAT, layout.bit_length())
    }

    fn write_wide_int(&mut self, name: &str, bits: usize, value: &BigUint) -> Result<()> {
        self.leaf(name, Value::from(value.to_string()), data_type::UINT, bits)
    }

    fn write_string(
        &mut self,
        name: &str,
        bits: usize,
        _encoding: StringEncoding,
        value: &str,
    ) -> Result<()> {
        self.leaf(name, Value::from(value), data_type::STRING, bits)
    }
}

enum ReadFrame {
    Element { name: String, map: Map<String, Value> },
    List { name: String, items: VecDeque<Value> },
}

/// Reads fields back out of a JSON document, consuming it as it goes.
pub struct JsonReader {
    root: Map<String, Value>,
    stack: Vec<ReadFrame>,
    validate: bool,
    bit_pos: usize,
}

impl JsonReader {
    /// `validate` makes every read check the companion attributes.
    pub fn new(document: Value, validate: bool) -> Result<Self> {
        match document {
            Value::Object(root) => Ok(JsonReader {
                root,
                stack: Vec::new(),
                validate,
                bit_pos: 0,
            }),
            other => Err(CodecError::mismatch(
                "JSON object at the document root",
                json_kind(&other),
            )),
        }
    }

    pub fn from_str(text: &str, validate: bool) -> Result<Self> {
        Self::new(serde_json::from_str(text)?, validate)
    }

    /// Remove the next entry named `name` from the innermost frame, together with its
    /// companion attributes.
    fn take(&mut self, name: &str) -> Result<(Value, Option<Value>, Option<Value>)> {
        let mut popped;
        let map = match self.stack.last_mut() {
            Some(ReadFrame::List { name: list, items }) => {
                let item = items.pop_front().ok_or_else(|| CodecError::EndOfBuffer {
                    requested: 1,
                    remaining: 0,
                })?;
                popped = match item {
                    Value::Object(map) => map,
                    other => {
                        return Err(CodecError::mismatch(
                            format!("object in list {}", list),
                            json_kind(&other),
                        ))
                    }
                };
                &mut popped
            }
            Some(ReadFrame::Element { map, .. }) => map,
            None => &mut self.root,
        };
        let value = map.remove(name).ok_or_else(|| {
            CodecError::mismatch(format!("field {}", name), "missing field")
        })?;
        let tag = map.remove(&data_type_key(name));
        let bits = map.remove(&bit_length_key(name));
        Ok((value, tag, bits))
    }

    fn leaf(&mut self, name: &str, tag: &str, bits: usize) -> Result<Value> {
        let (value, found_tag, found_bits) = self.take(name)?;
        if self.validate {
            if found_tag.as_ref().and_then(Value::as_str) != Some(tag) {
                return Err(CodecError::Validation(format!(
                    "{}: expected dataType {}, found {}",
                    name,
                    tag,
                    describe(found_tag.as_ref())
                )));
            }
            if found_bits.as_ref().and_then(Value::as_u64) != Some(bits as u64) {
                return Err(CodecError::Validation(format!(
                    "{}: expected bitLength {}, found {}",
                    name,
                    bits,
                    describe(found_bits.as_ref())
                )));
            }
        }
        self.bit_pos += bits;
        Ok(value)
    }

    fn leaf_str(&mut self, name: &str, tag: &str, bits: usize) -> Result<String> {
        match self.leaf(name, tag, bits)? {
            Value::String(s) => Ok(s),
            other => Err(wrong_value(name, "string", &other)),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "nothing".to_string(), Value::to_string)
}

fn wrong_value(name: &str, expected: &str, found: &Value) -> CodecError {
    CodecError::Validation(format!("{}: expected {}, found {}", name, expected, found))
}

impl ReadBuffer for JsonReader {
    fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    fn has_more(&self, _bits: usize) -> bool {
        true
    }

    fn context_depth(&self) -> usize {
        self.stack.len()
    }

    fn pull_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "pull context");
        let (child, _, _) = self.take(name)?;
        let frame = match (kind, child) {
            (ContextKind::Element, Value::Object(map)) => ReadFrame::Element {
                name: name.to_string(),
                map,
            },
            (ContextKind::List, Value::Array(items)) => ReadFrame::List {
                name: name.to_string(),
                items: items.into(),
            },
            (kind, other) => {
                return Err(CodecError::mismatch(
                    format!("{} ({:?})", name, kind),
                    format!("{} {}", name, json_kind(&other)),
                ))
            }
        };
        self.stack.push(frame);
        Ok(())
    }

    fn close_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "close context");
        match self.stack.last() {
            None => {
                return Err(CodecError::mismatch(
                    format!("open context {}", name),
                    "no open context",
                ))
            }
            Some(ReadFrame::Element { name: open, .. }) => {
                check_context(name, kind, open, ContextKind::Element)?
            }
            Some(ReadFrame::List { name: open, .. }) => {
                check_context(name, kind, open, ContextKind::List)?
            }
        }
        self.stack.pop();
        Ok(())
    }

    fn read_bit(&mut self, name: &str) -> Result<bool> {
        match self.leaf(name, data_type::BIT, 1)? {
            Value::Bool(b) => Ok(b),
            other => Err(wrong_value(name, "boolean", &other)),
        }
    }

    fn read_byte(&mut self, name: &str) -> Result<u8> {
        let text = self.leaf_str(name, data_type::BYTE, 8)?;
        match from_hex(name, &text)?.as_slice() {
            [b] => Ok(*b),
            _ => Err(CodecError::Validation(format!("{}: {} is not one byte", name, text))),
        }
    }

    fn read_byte_array(&mut self, name: &str, len: usize) -> Result<Vec<u8>> {
        let text = self.leaf_str(name, data_type::BYTE, byte_bits(name, len)?)?;
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
        let value = self.leaf(name, data_type::UINT, bits as usize)?;
        let n = value
            .as_u64()
            .ok_or_else(|| wrong_value(name, "unsigned integer", &value))?;
        if bits < 64 && n >> bits != 0 {
            return Err(CodecError::ValueOutOfRange(format!(
                "{}: {} does not fit {} bits",
                name, n, bits
            )));
        }
        Ok(n)
    }

    fn read_signed(&mut self, name: &str, bits: u8) -> Result<i64> {
        check_bits(bits)?;
        let value = self.leaf(name, data_type::INT, bits as usize)?;
        let n = value
            .as_i64()
            .ok_or_else(|| wrong_value(name, "signed integer", &value))?;
        if bits < 64 {
            let min = -(1i64 << (bits - 1));
            if n < min || n > -(min + 1) {
                return Err(CodecError::ValueOutOfRange(format!(
                    "{}: {} does not fit {} signed bits",
                    name, n, bits
                )));
            }
        }
        Ok(n)
    }

    fn read_float(&mut self, name: &str, layout: FloatLayout) -> Result<f64> {
        let value = self.leaf(name, data_type::FLOAT, layout.bit_length())?;
        value.as_f64().ok_or_else(|| wrong_value(name, "number", &value))
    }

    fn read_wide_int(&mut self, name: &str, bits: usize) -> Result<BigUint> {
        match self.leaf(name, data_type::UINT, bits)? {
            Value::String(s) => s
                .parse::<BigUint>()
                .map_err(|e| CodecError::Validation(format!("{}: {}", name, e))),
            Value::Number(n) => n
                .as_u64()
                .map(BigUint::from)
                .ok_or_else(|| CodecError::Validation(format!("{}: {} is not unsigned", name, n))),
            other => Err(wrong_value(name, "decimal string", &other)),
        }
    }

    fn read_string(&mut self, name: &str, bits: usize, _encoding: StringEncoding) -> Result<String> {
        self.leaf_str(name, data_type::STRING, bits)
    }
}
