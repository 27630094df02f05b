//! Write-only backend that renders a message as nested ASCII boxes.

use crate::ascii_box::{layout, AsciiBox, AsciiBoxWriter, BoxOptions};
use crate::codec::{
    check_bits, check_context, CodecError, ContextKind, FloatLayout, Result, StringEncoding,
    WriteBuffer,
};
use crate::dump;
use num_bigint::BigUint;

/// Columns lost per nesting level (one border char on each side).
const BOX_LINE_OVERHEAD: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxWriterConfig {
    /// Target width of the outermost box.
    pub width: usize,
    /// A context holding a single box is collapsed into it, renamed `parent/child`.
    pub merge_single_boxes: bool,
    pub omit_empty_boxes: bool,
    /// Add `pos/len` footers (byte.bit) to every box.
    pub print_pos_length_footer: bool,
}

impl Default for BoxWriterConfig {
    fn default() -> Self {
        BoxWriterConfig {
            width: 120,
            merge_single_boxes: false,
            omit_empty_boxes: false,
            print_pos_length_footer: false,
        }
    }
}

impl BoxWriterConfig {
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_merge_single_boxes(mut self, merge: bool) -> Self {
        self.merge_single_boxes = merge;
        self
    }

    pub fn with_omit_empty_boxes(mut self, omit: bool) -> Self {
        self.omit_empty_boxes = omit;
        self
    }

    pub fn with_pos_length_footer(mut self, print: bool) -> Self {
        self.print_pos_length_footer = print;
        self
    }
}

#[derive(Debug)]
struct Level {
    name: String,
    kind: ContextKind,
    boxes: Vec<AsciiBox>,
    start_bit: usize,
}

#[derive(Debug)]
pub struct BoxWriter {
    config: BoxWriterConfig,
    current_width: usize,
    root: Vec<AsciiBox>,
    levels: Vec<Level>,
    bit_pos: usize,
    heavy: AsciiBoxWriter,
    light: AsciiBoxWriter,
}

impl Default for BoxWriter {
    fn default() -> Self {
        BoxWriter::new(BoxWriterConfig::default())
    }
}

impl BoxWriter {
    pub fn new(config: BoxWriterConfig) -> Self {
        BoxWriter {
            current_width: config.width.saturating_sub(BOX_LINE_OVERHEAD),
            config,
            root: Vec::new(),
            levels: Vec::new(),
            bit_pos: 0,
            heavy: AsciiBoxWriter::default(),
            light: AsciiBoxWriter::light(),
        }
    }

    /// The rendered message; a `<nil>` box when nothing was written.
    pub fn into_box(mut self) -> Result<AsciiBox> {
        self.ensure_balanced()?;
        Ok(match self.root.len() {
            0 => AsciiBox::new("<nil>"),
            1 => self.root.remove(0),
            _ => layout(&self.root, self.config.width),
        })
    }

    fn footer(&self, start_bit: usize, bits: usize) -> String {
        if self.config.print_pos_length_footer {
            dump::pos_length_footer(start_bit, bits)
        } else {
            String::new()
        }
    }

    fn push_box(&mut self, b: AsciiBox) {
        match self.levels.last_mut() {
            Some(level) => level.boxes.push(b),
            None => self.root.push(b),
        }
    }

    fn leaf(&mut self, name: &str, text: &str, bits: usize) -> Result<()> {
        let options = BoxOptions::named(name).with_footer(self.footer(self.bit_pos, bits));
        let b = self.heavy.box_string(text, &options);
        self.push_box(b);
        self.bit_pos += bits;
        Ok(())
    }
}

impl WriteBuffer for BoxWriter {
    fn bit_pos(&self) -> usize {
        self.bit_pos
    }

    fn context_depth(&self) -> usize {
        self.levels.len()
    }

    fn push_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "push context");
        self.current_width = self.current_width.saturating_sub(BOX_LINE_OVERHEAD);
        self.levels.push(Level {
            name: name.to_string(),
            kind,
            boxes: Vec::new(),
            start_bit: self.bit_pos,
        });
        Ok(())
    }

    fn pop_context(&mut self, name: &str, kind: ContextKind) -> Result<()> {
        tracing::trace!(context = name, bit_pos = self.bit_pos, "pop context");
        match self.levels.last() {
            None => {
                return Err(CodecError::mismatch(
                    format!("open context {}", name),
                    "no open context",
                ))
            }
            Some(level) => check_context(name, kind, &level.name, level.kind)?,
        }
        let Some(level) = self.levels.pop() else {
            return Ok(());
        };
        self.current_width += BOX_LINE_OVERHEAD;

        let mut boxes = level.boxes;
        if self.config.omit_empty_boxes {
            boxes.retain(|b| !b.is_empty());
        }
        let footer = self.footer(level.start_bit, self.bit_pos - level.start_bit);
        let mut result = if self.config.merge_single_boxes && boxes.len() == 1 {
            let only = &boxes[0];
            only.change_box_name(&format!("{}/{}", name, only.box_name()))
        } else {
            let content = layout(&boxes, self.current_width);
            self.heavy.box_box(&content, &BoxOptions::named(name))
        };
        if !footer.is_empty() {
            result = result.change_box_footer(&footer);
        }
        if self.config.omit_empty_boxes && result.is_empty() {
            return Ok(());
        }
        self.push_box(result);
        Ok(())
    }

    fn write_bit(&mut self, name: &str, value: bool) -> Result<()> {
        self.leaf(name, &dump::format_bit(value), 1)
    }

    fn write_byte(&mut self, name: &str, value: u8) -> Result<()> {
        self.leaf(name, &dump::format_byte(value), 8)
    }

    fn write_byte_array(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.leaf(name, &dump::hex_dump(data), data.len() * 8)
    }

    fn write_unsigned(&mut self, name: &str, bits: u8, value: u64) -> Result<()> {
        check_bits(bits)?;
        self.leaf(name, &dump::format_unsigned(value, bits), bits as usize)
    }

    fn write_signed(&mut self, name: &str, bits: u8, value: i64) -> Result<()> {
        check_bits(bits)?;
        self.leaf(name, &dump::format_signed(value, bits), bits as usize)
    }

    fn write_float(&mut self, name: &str, float: FloatLayout, value: f64) -> Result<()> {
        let bits = float.bit_length();
        self.leaf(name, &dump::format_float(float.raw_bits(value)?, bits, value), bits)
    }

    fn write_wide_int(&mut self, name: &str, bits: usize, value: &BigUint) -> Result<()> {
        self.leaf(name, &dump::format_wide(value, bits), bits)
    }

    fn write_string(
        &mut self,
        name: &str,
        bits: usize,
        _encoding: StringEncoding,
        value: &str,
    ) -> Result<()> {
        self.leaf(name, value, bits)
    }

    fn write_virtual(&mut self, name: &str, value: &str) -> Result<()> {
        let b = self.light.box_string(value, &BoxOptions::named(name));
        self.push_box(b);
        Ok(())
    }
}
