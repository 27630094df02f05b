//! Bordered text boxes used by the debug-box backend.
//!
//! An [`AsciiBox`] is an immutable block of lines. Boxes are built by an [`AsciiBoxWriter`]
//! (which owns the border characters) and combined with [`merge_horizontal`],
//! [`merge_vertical`] and [`layout`].

use std::fmt;

/// Border characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxSet {
    pub upper_left: char,
    pub upper_right: char,
    pub horizontal: char,
    pub vertical: char,
    pub lower_left: char,
    pub lower_right: char,
}

impl BoxSet {
    pub const HEAVY: BoxSet = BoxSet {
        upper_left: '╔',
        upper_right: '╗',
        horizontal: '═',
        vertical: '║',
        lower_left: '╚',
        lower_right: '╝',
    };

    /// Used for virtual fields.
    pub const LIGHT: BoxSet = BoxSet {
        upper_left: '╭',
        upper_right: '╮',
        horizontal: '┄',
        vertical: '┆',
        lower_left: '╰',
        lower_right: '╯',
    };

    fn chars(&self) -> [char; 6] {
        [
            self.upper_left,
            self.upper_right,
            self.horizontal,
            self.vertical,
            self.lower_left,
            self.lower_right,
        ]
    }
}

fn is_border_char(c: char) -> bool {
    BoxSet::HEAVY.chars().contains(&c) || BoxSet::LIGHT.chars().contains(&c)
}

fn count_chars(s: &str) -> usize {
    s.chars().count()
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsciiBox {
    data: String,
    /// Border of the outermost frame, if this box is a single framed box.
    border: Option<BoxSet>,
}

impl AsciiBox {
    /// Unframed box from raw text.
    pub fn new(data: impl Into<String>) -> Self {
        AsciiBox {
            data: data.into(),
            border: None,
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.data.split('\n')
    }

    /// Longest line, in chars.
    pub fn width(&self) -> usize {
        self.lines().map(count_chars).max().unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.lines().count()
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    pub fn has_borders(&self) -> bool {
        match self.border {
            Some(set) => self.data.starts_with(set.upper_left),
            None => false,
        }
    }

    /// A framed box with no content, or an empty unframed box.
    pub fn is_empty(&self) -> bool {
        if self.has_borders() {
            self.unwrap().data.is_empty()
        } else {
            self.data.is_empty()
        }
    }

    /// Content of a framed box with the frame removed. Lines that hold no nested box are
    /// trimmed.
    pub fn unwrap(&self) -> AsciiBox {
        if !self.has_borders() {
            return self.clone();
        }
        let lines: Vec<&str> = self.lines().collect();
        let inner: Vec<String> = lines[1..lines.len().saturating_sub(1).max(1)]
            .iter()
            .map(|line| {
                let chars: Vec<char> = line.chars().collect();
                let inner: String = chars[1..chars.len().saturating_sub(1).max(1)]
                    .iter()
                    .collect();
                if inner.chars().any(is_border_char) {
                    inner
                } else {
                    inner.trim_matches(' ').to_string()
                }
            })
            .collect();
        AsciiBox::new(inner.join("\n"))
    }

    pub fn box_name(&self) -> String {
        self.header_parts().0
    }

    pub fn box_header(&self) -> String {
        self.header_parts().1
    }

    pub fn box_footer(&self) -> String {
        let set = match (self.has_borders(), self.border) {
            (true, Some(set)) => set,
            _ => return String::new(),
        };
        let last = self.lines().last().unwrap_or_default();
        last.chars()
            .skip(1)
            .skip_while(|&c| c == set.horizontal)
            .take_while(|&c| c != set.horizontal && c != set.lower_right)
            .collect()
    }

    /// Name and header from the top border `╔═name═══header═╗`.
    fn header_parts(&self) -> (String, String) {
        let set = match (self.has_borders(), self.border) {
            (true, Some(set)) => set,
            _ => return (String::new(), String::new()),
        };
        let first = self.lines().next().unwrap_or_default();
        let mut chars = first.chars().skip(2).peekable();
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == set.horizontal || c == set.upper_right {
                break;
            }
            name.push(c);
            chars.next();
        }
        let header: String = chars
            .skip_while(|&c| c == set.horizontal)
            .take_while(|&c| c != set.horizontal && c != set.upper_right)
            .collect();
        (name, header)
    }

    pub fn change_box_name(&self, name: &str) -> AsciiBox {
        self.change_attributes(Some(name), None)
    }

    pub fn change_box_footer(&self, footer: &str) -> AsciiBox {
        self.change_attributes(None, Some(footer))
    }

    fn change_attributes(&self, name: Option<&str>, footer: Option<&str>) -> AsciiBox {
        let header = self.box_header();
        let options = BoxOptions::default()
            .with_name(name.map_or_else(|| self.box_name(), str::to_string))
            .with_header(header.clone())
            .with_footer(footer.map_or_else(|| self.box_footer(), str::to_string));
        let (writer, content) = match self.border {
            Some(set) if self.has_borders() => (AsciiBoxWriter::new(set), self.unwrap()),
            _ => return AsciiBoxWriter::default().box_string(&self.data, &options),
        };
        let mut minimum = count_chars(&options.name) + 3;
        if !header.is_empty() {
            minimum += 1 + count_chars(&header);
        }
        minimum = minimum
            .max(content.width() + 2)
            .max(count_chars(&options.footer) + 2);
        writer.box_string(&content.data, &options.with_char_width(minimum))
    }
}

impl fmt::Display for AsciiBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)
    }
}

/// Name, header, footer and minimum width for [`AsciiBoxWriter::box_string`].
#[derive(Debug, Clone, Default)]
pub struct BoxOptions {
    pub name: String,
    pub header: String,
    pub footer: String,
    pub char_width: usize,
}

impl BoxOptions {
    pub fn named(name: impl Into<String>) -> Self {
        BoxOptions::default().with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = footer.into();
        self
    }

    pub fn with_char_width(mut self, char_width: usize) -> Self {
        self.char_width = char_width;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AsciiBoxWriter {
    set: BoxSet,
}

impl Default for AsciiBoxWriter {
    fn default() -> Self {
        AsciiBoxWriter::new(BoxSet::HEAVY)
    }
}

impl AsciiBoxWriter {
    pub fn new(set: BoxSet) -> Self {
        AsciiBoxWriter { set }
    }

    pub fn light() -> Self {
        AsciiBoxWriter::new(BoxSet::LIGHT)
    }

    /// Frame `data` with a border. The box grows to fit its widest line, its name and
    /// header, and its footer; lines are centred.
    pub fn box_string(&self, data: &str, options: &BoxOptions) -> AsciiBox {
        let set = self.set;
        let h = set.horizontal.to_string();
        let name = options.name.as_str();
        let name_len = count_chars(name);
        let header = if !name.is_empty() && !options.header.is_empty() {
            format!("{}{}{}{}", h, h, options.header, h)
        } else {
            options.header.clone()
        };
        let header_len = count_chars(&header);
        let footer = if options.footer.is_empty() {
            String::new()
        } else {
            format!("{}{}", options.footer, h)
        };
        let footer_len = count_chars(&footer);

        let data = data.replace("\r\n", "\n").replace('\t', "  ");
        let raw = AsciiBox::new(data);
        let footer_add_on = if footer.is_empty() { 0 } else { footer_len + 2 };
        let longest = raw.width().max(footer_add_on);
        let mut char_width = options.char_width;
        if char_width < longest + 2 {
            if options.char_width > 0 {
                tracing::debug!(
                    overflow = longest + 2 - char_width,
                    "box content overflows requested width"
                );
            }
            char_width = longest + 2;
        }

        // border + name indent + name + padding + header + border
        let name_padding = char_width.saturating_sub(name_len + 3 + header_len);
        let mut out = String::new();
        out.push(set.upper_left);
        out.push(set.horizontal);
        out.push_str(name);
        out.push_str(&h.repeat(name_padding));
        out.push_str(&header);
        out.push(set.upper_right);
        out.push('\n');
        let char_width = 3 + name_len + name_padding + header_len;
        for line in raw.lines() {
            let padding = char_width.saturating_sub(2 + count_chars(line));
            let front = padding / 2;
            out.push(set.vertical);
            out.push_str(&" ".repeat(front));
            out.push_str(line);
            out.push_str(&" ".repeat(padding - front));
            out.push(set.vertical);
            out.push('\n');
        }
        let bottom_padding = (name_padding + name_len + 1 + header_len).saturating_sub(footer_len);
        out.push(set.lower_left);
        out.push_str(&h.repeat(bottom_padding));
        out.push_str(&footer);
        out.push(set.lower_right);
        AsciiBox {
            data: out,
            border: Some(set),
        }
    }

    /// Frame an existing box.
    pub fn box_box(&self, inner: &AsciiBox, options: &BoxOptions) -> AsciiBox {
        self.box_string(&inner.data, options)
    }
}

/// Place `b` to the right of `a`. The shorter box is padded with blank rows of its own
/// width.
pub fn merge_horizontal(a: &AsciiBox, b: &AsciiBox) -> AsciiBox {
    let (a_width, b_width) = (a.width(), b.width());
    let a_lines: Vec<&str> = a.lines().collect();
    let b_lines: Vec<&str> = b.lines().collect();
    let rows = a_lines.len().max(b_lines.len());
    let pad = |line: Option<&&str>, width: usize| -> String {
        let line = line.copied().unwrap_or("");
        format!("{}{}", line, " ".repeat(width - count_chars(line)))
    };
    let merged: Vec<String> = (0..rows)
        .map(|row| {
            format!(
                "{}{}",
                pad(a_lines.get(row), a_width),
                pad(b_lines.get(row), b_width)
            )
        })
        .collect();
    AsciiBox::new(merged.join("\n"))
}

/// Place `b` below `a`, padding the narrower one to the wider width.
pub fn merge_vertical(a: &AsciiBox, b: &AsciiBox) -> AsciiBox {
    let width = a.width().max(b.width());
    let a = expand_box(a, width);
    let b = expand_box(b, width);
    AsciiBox::new(format!("{}\n{}", a.data, b.data))
}

/// Pad every line of `b` with blanks to `width`.
pub fn expand_box(b: &AsciiBox, width: usize) -> AsciiBox {
    if b.width() >= width {
        return b.clone();
    }
    let lines: Vec<String> = b
        .lines()
        .map(|line| format!("{}{}", line, " ".repeat(width - count_chars(line))))
        .collect();
    AsciiBox::new(lines.join("\n"))
}

/// Arrange boxes left to right, wrapping to a new row once `width` would be exceeded.
/// The result is at least as wide as the widest box.
pub fn layout(boxes: &[AsciiBox], width: usize) -> AsciiBox {
    let widest = boxes.iter().map(AsciiBox::width).max().unwrap_or(0);
    if widest > width {
        tracing::debug!(overflow = widest - width, "box wider than layout width");
    }
    let width = width.max(widest);
    let merge_row = |row: &[AsciiBox]| -> Option<AsciiBox> {
        let (first, rest) = row.split_first()?;
        Some(rest.iter().fold(first.clone(), |acc, b| merge_horizontal(&acc, b)))
    };
    let mut result: Option<AsciiBox> = None;
    let mut start = 0;
    let mut row_width = 0;
    for (i, b) in boxes.iter().enumerate() {
        row_width += b.width();
        if row_width > width && i > start {
            if let Some(row) = merge_row(&boxes[start..i]) {
                result = Some(match result {
                    Some(above) => merge_vertical(&above, &row),
                    None => row,
                });
            }
            start = i;
            row_width = b.width();
        }
    }
    if let Some(row) = merge_row(&boxes[start..]) {
        result = Some(match result {
            Some(above) => merge_vertical(&above, &row),
            None => row,
        });
    }
    result.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_string_has_uniform_width() {
        let b = AsciiBoxWriter::default().box_string(
            "a\nlonger line",
            &BoxOptions::named("name").with_footer("0/2"),
        );
        let widths: Vec<usize> = b.lines().map(count_chars).collect();
        assert!(widths.iter().all(|&w| w == widths[0]), "{}", b);
        assert_eq!(b.box_name(), "name");
        assert_eq!(b.box_footer(), "0/2");
    }

    #[test]
    fn rename_keeps_content() {
        let b = AsciiBoxWriter::default().box_string("0x01 1", &BoxOptions::named("child"));
        let renamed = b.change_box_name("parent/child");
        assert_eq!(renamed.box_name(), "parent/child");
        assert_eq!(renamed.unwrap().as_str(), "0x01 1");
    }

    #[test]
    fn empty_box_is_empty() {
        let b = AsciiBoxWriter::default().box_string("", &BoxOptions::named("x"));
        assert!(b.is_empty());
        assert!(AsciiBox::default().is_empty());
    }
}
