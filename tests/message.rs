//! Discriminated message family built on the field helpers: dispatch, length-governed
//! arrays, optional trailers, and rendering through every backend.

use bitcodec::fields::{
    read_const, read_context, read_count_array, read_length_array, read_optional,
    read_reserved, read_terminated_array, remaining_below, write_array, write_context,
    write_optional, write_reserved,
};
use bitcodec::{
    parse_from_bytes, unmapped, BoxWriterConfig, ByteReader, ByteWriter, CodecError,
    ContextKind, Endianness, JsonReader, Message, MessageParent, ReadBuffer, Result,
    WriteBuffer, XmlReader,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
struct Item {
    tag: u8,
    value: u16,
}

impl Item {
    fn parse<R: ReadBuffer + ?Sized>(r: &mut R) -> Result<Item> {
        read_context(r, "Item", ContextKind::Element, |r| {
            Ok(Item {
                tag: r.read_u8("tag", 8)?,
                value: r.read_u16("value", 16)?,
            })
        })
    }

    fn serialize<W: WriteBuffer + ?Sized>(&self, w: &mut W) -> Result<()> {
        write_context(w, "Item", ContextKind::Element, |w| {
            w.write_u8("tag", 8, self.tag)?;
            w.write_u16("value", 16, self.value)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Body {
    Read { address: u16, count: u8 },
    Write { items: Vec<Item>, checksum: Option<u8> },
}

impl Body {
    fn discriminator(&self) -> u8 {
        match self {
            Body::Read { .. } => 0x01,
            Body::Write { .. } => 0x02,
        }
    }
}

/// Header: `msgType:u8 length:u16`, where length counts the whole frame in bytes.
#[derive(Debug, Clone, PartialEq)]
struct Frame {
    length: u16,
    body: Body,
}

impl Frame {
    fn new(body: Body) -> Frame {
        let mut frame = Frame { length: 0, body };
        frame.length = frame.length_in_bytes() as u16;
        frame
    }

    fn parse(r: &mut dyn ReadBuffer) -> Result<Frame> {
        read_context(r, "Frame", ContextKind::Element, |r| {
            let msg_type = r.read_u8("msgType", 8)?;
            let length = r.read_u16("length", 16)?;
            let body = match msg_type {
                0x01 => read_context(r, "ReadRequest", ContextKind::Element, |r| {
                    Ok(Body::Read {
                        address: r.read_u16("address", 16)?,
                        count: r.read_u8("count", 8)?,
                    })
                })?,
                0x02 => read_context(r, "WriteRequest", ContextKind::Element, |r| {
                    let items_len = r.read_u8("itemsLength", 8)?;
                    let items = read_length_array(r, "items", items_len as usize, Item::parse)?;
                    let present = !remaining_below(length as usize, r.pos(), 1);
                    let checksum = read_optional(r, present, |r| r.read_u8("checksum", 8))?;
                    Ok(Body::Write { items, checksum })
                })?,
                other => return Err(unmapped("Frame", other)),
            };
            Ok(Frame { length, body })
        })
    }

    fn as_read(&self) -> Option<(u16, u8)> {
        match self.body {
            Body::Read { address, count } => Some((address, count)),
            _ => None,
        }
    }

    fn as_write(&self) -> Option<&[Item]> {
        match &self.body {
            Body::Write { items, .. } => Some(items),
            _ => None,
        }
    }
}

impl MessageParent for Frame {
    fn context_name(&self) -> &str {
        "Frame"
    }

    fn write_header(&self, w: &mut dyn WriteBuffer) -> Result<()> {
        w.write_u8("msgType", 8, self.body.discriminator())?;
        w.write_u16("length", 16, self.length)
    }
}

impl Message for Frame {
    fn serialize(&self, writer: &mut dyn WriteBuffer) -> Result<()> {
        self.serialize_parent(writer, |w| match &self.body {
            Body::Read { address, count } => {
                write_context(w, "ReadRequest", ContextKind::Element, |w| {
                    w.write_u16("address", 16, *address)?;
                    w.write_u8("count", 8, *count)
                })
            }
            Body::Write { items, checksum } => {
                write_context(w, "WriteRequest", ContextKind::Element, |w| {
                    w.write_u8("itemsLength", 8, (items.len() * 3) as u8)?;
                    write_array(w, "items", items, |w, item| item.serialize(w))?;
                    write_optional(w, checksum.as_ref(), |w, c| w.write_u8("checksum", 8, *c))
                })
            }
        })
    }

    fn length_in_bits(&self) -> usize {
        let body = match &self.body {
            Body::Read { .. } => 24,
            Body::Write { items, checksum } => {
                8 + 24 * items.len() + checksum.map_or(0, |_| 8)
            }
        };
        24 + body
    }
}

fn write_request() -> Frame {
    Frame::new(Body::Write {
        items: vec![
            Item {
                tag: 0xA1,
                value: 0x0102,
            },
            Item {
                tag: 0xB2,
                value: 0x0304,
            },
        ],
        checksum: Some(0x5A),
    })
}

#[test]
fn test_read_request_bytes() {
    let frame = Frame::new(Body::Read {
        address: 0x1234,
        count: 8,
    });
    let bytes = frame.to_bytes(Endianness::Big).expect("serialize");
    assert_eq!(bytes, vec![0x01, 0x00, 0x06, 0x12, 0x34, 0x08]);
    assert_eq!(frame.length_in_bytes(), bytes.len());

    let parsed = parse_from_bytes(&bytes, Endianness::Big, Frame::parse).expect("parse");
    assert_eq!(parsed.as_read(), Some((0x1234, 8)));
    assert!(parsed.as_write().is_none());
}

#[test]
fn test_length_array_stops_at_declared_length() {
    let bytes = [
        0x02, 0x00, 0x0A, // header, 10 bytes in total
        0x06, // items length
        0xA1, 0x01, 0x02, //
        0xB2, 0x03, 0x04,
    ];
    let frame = parse_from_bytes(&bytes, Endianness::Big, Frame::parse).expect("parse");
    let items = frame.as_write().expect("write request");
    assert_eq!(items.len(), 2);
    assert_eq!(items[1], Item { tag: 0xB2, value: 0x0304 });
    assert_eq!(
        frame.body,
        Body::Write {
            items: items.to_vec(),
            checksum: None
        }
    );
}

#[test]
fn test_optional_trailer_when_length_allows() {
    let frame = write_request();
    assert_eq!(frame.length, 11);
    let bytes = frame.to_bytes(Endianness::Big).expect("serialize");
    assert_eq!(bytes.len(), 11);
    assert_eq!(bytes[10], 0x5A);
    let parsed = parse_from_bytes(&bytes, Endianness::Big, Frame::parse).expect("parse");
    assert_eq!(parsed, frame);
}

#[test]
fn test_length_array_overrun() {
    let bytes = [
        0x02, 0x00, 0x0A, //
        0x05, // two 3-byte items do not fit in 5 bytes
        0xA1, 0x01, 0x02, //
        0xB2, 0x03, 0x04,
    ];
    match parse_from_bytes(&bytes, Endianness::Big, Frame::parse) {
        Err(CodecError::ArrayOverrun { end, pos }) => {
            assert_eq!(end, 9);
            assert_eq!(pos, 10);
        }
        other => panic!("expected ArrayOverrun, got {:?}", other),
    }
}

#[test]
fn test_unknown_discriminator() {
    let bytes = [0x7F, 0x00, 0x03];
    match parse_from_bytes(&bytes, Endianness::Big, Frame::parse) {
        Err(CodecError::UnmappedType {
            family,
            discriminator,
        }) => {
            assert_eq!(family, "Frame");
            assert_eq!(discriminator, "127");
        }
        other => panic!("expected UnmappedType, got {:?}", other),
    }
}

#[test]
fn test_truncated_frame() {
    let bytes = [0x01, 0x00, 0x06, 0x12];
    assert!(matches!(
        parse_from_bytes(&bytes, Endianness::Big, Frame::parse),
        Err(CodecError::EndOfBuffer { .. })
    ));
}

#[test]
fn test_unclosed_context_is_reported() {
    let bytes = [0x01];
    let result = parse_from_bytes(&bytes, Endianness::Big, |r| {
        r.pull_context("Frame", ContextKind::Element)?;
        r.read_u8("msgType", 8)
    });
    assert!(matches!(result, Err(CodecError::StructuralMismatch { .. })));
}

#[test]
fn test_frame_through_tree_backends() -> anyhow::Result<()> {
    let frame = write_request();

    let doc = frame.to_json()?;
    assert_eq!(doc["Frame"]["msgType"], 2);
    assert_eq!(doc["Frame"]["WriteRequest"]["items"][0]["Item"]["tag"], 0xA1);
    let mut r = JsonReader::new(doc, true)?;
    assert_eq!(Frame::parse(&mut r)?, frame);

    let xml = frame.to_xml()?;
    assert!(xml.contains(r#"<items isList="true">"#));
    let mut r = XmlReader::from_str(&xml, true)?;
    assert_eq!(Frame::parse(&mut r)?, frame);
    Ok(())
}

#[test]
fn test_frame_box_rendering() -> anyhow::Result<()> {
    let frame = write_request();
    let b = frame.to_box(BoxWriterConfig::default().with_width(80))?;
    let text = b.to_string();
    assert_eq!(b.box_name(), "Frame");
    assert!(text.contains("WriteRequest"), "{}", text);
    assert!(text.contains("0x5a 90"), "{}", text);
    assert!(b.width() <= 80, "{}", text);
    Ok(())
}

#[test]
fn test_const_and_reserved_fields() {
    init_logging();
    let bytes = [0x55, 0x03, 0x00];

    let mut r = ByteReader::new(&bytes, Endianness::Big);
    assert_eq!(read_const(&mut r, "magic", 8, 0x55).expect("magic"), 0x55);
    // A reserved field that is not zero is kept so it can be written back.
    let reserved = read_reserved(&mut r, "reserved", 8, 0).expect("reserved");
    assert_eq!(reserved, 0x03);

    let mut w = ByteWriter::new(Endianness::Big);
    write_reserved(&mut w, "reserved", 8, reserved).expect("write");
    assert_eq!(w.into_bytes(), vec![0x03]);

    let mut r = ByteReader::new(&bytes, Endianness::Big);
    assert!(matches!(
        read_const(&mut r, "magic", 8, 0x56),
        Err(CodecError::Validation(_))
    ));
}

#[test]
fn test_count_and_terminated_arrays() {
    let bytes = [0x03, 0x0A, 0x0B, 0x0C, 0x21, 0x22, 0x00, 0xFF];
    let mut r = ByteReader::new(&bytes, Endianness::Big);
    let count = r.read_u8("count", 8).expect("count") as usize;
    let counted = read_count_array(&mut r, "values", count, |r| r.read_u8("value", 8))
        .expect("counted");
    assert_eq!(counted, vec![0x0A, 0x0B, 0x0C]);

    let terminated = read_terminated_array(
        &mut r,
        "chars",
        |r: &ByteReader| Ok(r.peek_byte(0)? == 0),
        |r| r.read_u8("char", 8),
    )
    .expect("terminated");
    assert_eq!(terminated, vec![0x21, 0x22]);
    assert_eq!(r.read_u8("terminator", 8).expect("terminator"), 0);
    r.ensure_balanced().expect("balanced");
}

#[test]
fn test_remaining_below() {
    assert!(remaining_below(10, 10, 1));
    assert!(!remaining_below(11, 10, 1));
    assert!(remaining_below(12, 10, 4));
    assert!(remaining_below(5, 10, 1), "over-consumed counts as nothing left");
}

#[test]
fn test_length_array_with_huge_declared_length() {
    let bytes = [0xA1, 0x01, 0x02];
    let mut r = ByteReader::new(&bytes, Endianness::Big);
    let result = read_length_array(&mut r, "items", usize::MAX / 4, Item::parse);
    assert!(matches!(result, Err(CodecError::ValueOutOfRange(_))), "{:?}", result);

    // Representable but longer than the input: the element reads run out of data.
    let mut r = ByteReader::new(&bytes, Endianness::Big);
    let result = read_length_array(&mut r, "items", 1 << 20, Item::parse);
    assert!(matches!(result, Err(CodecError::EndOfBuffer { .. })), "{:?}", result);
}
