//! Text rendering of field values for the debug-box backend.

use num_bigint::BigUint;

const BYTES_PER_ROW: usize = 10;

fn hex_digits(bits: usize) -> usize {
    (bits / 4).max(1)
}

fn printable(b: u8) -> char {
    if (32..=126).contains(&b) {
        b as char
    } else {
        '.'
    }
}

pub fn format_bit(value: bool) -> String {
    format!("b{} {}", value as u8, value)
}

/// `0x41 'A'`; non-printable bytes show as `.`.
pub fn format_byte(value: u8) -> String {
    format!("0x{:02x} '{}'", value, printable(value))
}

/// Zero-padded hex (one digit per four bits of the field) followed by the decimal value.
pub fn format_unsigned(value: u64, bits: u8) -> String {
    format!("0x{:0w$x} {}", value, value, w = hex_digits(bits as usize))
}

/// Negative values show their two's complement within the field width.
pub fn format_signed(value: i64, bits: u8) -> String {
    let mask = if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    };
    format!(
        "0x{:0w$x} {}",
        value as u64 & mask,
        value,
        w = hex_digits(bits as usize)
    )
}

pub fn format_wide(value: &BigUint, bits: usize) -> String {
    format!("0x{:0w$x} {}", value, value, w = hex_digits(bits))
}

/// The field's raw bit pattern in hex, then the value with six decimals.
pub fn format_float(raw: u64, bits: usize, value: f64) -> String {
    format!("0x{:0w$x} {:.6}", raw, value, w = hex_digits(bits))
}

/// Offset/length footer in `byte.bit` form, e.g. `2.4/1.4`. The bit part is left out when zero.
pub fn pos_length_footer(pos_bits: usize, len_bits: usize) -> String {
    fn byte_bit(bits: usize) -> String {
        match bits % 8 {
            0 => (bits / 8).to_string(),
            rem => format!("{}.{}", bits / 8, rem),
        }
    }
    format!("{}/{}", byte_bit(pos_bits), byte_bit(len_bits))
}

/// Hex dump, ten bytes per row: `offset|hex bytes 'ascii'`.
///
/// ```text
/// 00|03 00 00 1e 05 f0 0d c0 01 0c '..........'
/// 10|32 03                         '2.        '
/// ```
pub fn hex_dump(data: &[u8]) -> String {
    let width = data.len().to_string().len();
    data.chunks(BYTES_PER_ROW)
        .enumerate()
        .map(|(row, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            let ascii: String = chunk.iter().map(|&b| printable(b)).collect();
            format!(
                "{:0w$}|{:<29} '{:<10}'",
                row * BYTES_PER_ROW,
                hex.join(" "),
                ascii,
                w = width
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
