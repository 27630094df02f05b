//! Byte reader fuzz target: the first bytes choose a field schedule, the rest is read with it.
//! Reads must never panic; they return values or a CodecError.
//! Build with: cargo fuzz run byte_reader_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use bitcodec::{ByteReader, Endianness, FloatLayout, ReadBuffer, StringEncoding};
#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let (schedule, payload) = data.split_at(data.len().min(8));
    let endianness = if schedule[0] & 1 == 0 {
        Endianness::Big
    } else {
        Endianness::Little
    };
    let mut r = ByteReader::new(payload, endianness);
    for (i, op) in schedule.iter().cycle().take(64).enumerate() {
        let bits = (op % 64) + 1;
        let result = match op >> 6 {
            0 => r.read_unsigned("u", bits).map(drop),
            1 => r.read_signed("i", bits).map(drop),
            2 => r
                .read_float("f", FloatLayout::new(i % 2 == 0, 1 + op % 7, 1 + op % 20))
                .map(drop),
            _ => r
                .read_string("s", (bits as usize / 8 + 1) * 8, StringEncoding::Utf16Le)
                .map(drop),
        };
        if result.is_err() {
            break;
        }
    }
    let _ = r.read_wide_int("w", 200);

    // Lengths taken from the input, as a length field would supply them.
    let declared = schedule
        .iter()
        .fold(0usize, |acc, &b| acc.rotate_left(8) | b as usize);
    let _ = r.peek_byte(declared);
    let _ = r.read_byte_array("raw", declared);
    let _ = r.reset(declared);
    let _ = bitcodec::fields::read_length_array(&mut r, "items", declared, |r| r.read_u8("b", 8));

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = bitcodec::JsonReader::from_str(text, true);
        let _ = bitcodec::XmlReader::from_str(text, true);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run byte_reader_fuzz");
}
