//! JSON and XML backends: document shape, round trips through the shared ABI, validation
//! of companion attributes and structural checks.

use bitcodec::fields::{read_count_array, write_array};
use bitcodec::{
    BigUint, ByteReader, ByteWriter, CodecError, ContextKind, Endianness, FloatLayout,
    JsonReader, JsonWriter, ReadBuffer, StringEncoding, WriteBuffer, XmlReader, XmlWriter,
};
use serde_json::json;

const COMPACT: FloatLayout = FloatLayout::new(true, 4, 8);

#[derive(Debug, Clone, PartialEq)]
struct Sample {
    flag: bool,
    kind: u8,
    count: u64,
    offset: i64,
    ratio: f64,
    temperature: f64,
    serial: BigUint,
    label: String,
    payload: Vec<u8>,
    items: Vec<u16>,
}

fn sample() -> Sample {
    Sample {
        flag: true,
        kind: 0x41,
        count: 0xABC,
        offset: -42,
        ratio: 1.5,
        temperature: 4.0,
        serial: BigUint::from(1u8) << 95usize,
        label: "abc".to_string(),
        payload: vec![1, 2, 3],
        items: vec![7, 300],
    }
}

fn write_sample(w: &mut dyn WriteBuffer, s: &Sample) -> bitcodec::Result<()> {
    w.push_context("Sample", ContextKind::Element)?;
    w.write_bit("flag", s.flag)?;
    w.write_byte("kind", s.kind)?;
    w.write_unsigned("count", 12, s.count)?;
    w.write_signed("offset", 16, s.offset)?;
    w.write_float("ratio", FloatLayout::IEEE_SINGLE, s.ratio)?;
    w.write_float("temperature", COMPACT, s.temperature)?;
    w.write_wide_int("serial", 96, &s.serial)?;
    w.write_string("label", 64, StringEncoding::Utf8, &s.label)?;
    w.write_byte_array("payload", &s.payload)?;
    write_array(w, "items", &s.items, |w, item| {
        w.push_context("item", ContextKind::Element)?;
        w.write_u16("value", 16, *item)?;
        w.pop_context("item", ContextKind::Element)
    })?;
    w.pop_context("Sample", ContextKind::Element)
}

fn read_sample(r: &mut dyn ReadBuffer) -> bitcodec::Result<Sample> {
    r.pull_context("Sample", ContextKind::Element)?;
    let s = Sample {
        flag: r.read_bit("flag")?,
        kind: r.read_byte("kind")?,
        count: r.read_unsigned("count", 12)?,
        offset: r.read_signed("offset", 16)?,
        ratio: r.read_float("ratio", FloatLayout::IEEE_SINGLE)?,
        temperature: r.read_float("temperature", COMPACT)?,
        serial: r.read_wide_int("serial", 96)?,
        label: r.read_string("label", 64, StringEncoding::Utf8)?,
        payload: r.read_byte_array("payload", 3)?,
        items: read_count_array(r, "items", 2, |r| {
            r.pull_context("item", ContextKind::Element)?;
            let value = r.read_u16("value", 16)?;
            r.close_context("item", ContextKind::Element)?;
            Ok(value)
        })?,
    };
    r.close_context("Sample", ContextKind::Element)?;
    r.ensure_balanced()?;
    Ok(s)
}

#[test]
fn test_same_parser_reads_every_backend() {
    let s = sample();

    let mut w = ByteWriter::new(Endianness::Big);
    write_sample(&mut w, &s).expect("bytes");
    let bytes = w.into_bytes();
    let mut r = ByteReader::new(&bytes, Endianness::Big);
    assert_eq!(read_sample(&mut r).expect("bytes read"), s);

    let mut w = JsonWriter::new();
    write_sample(&mut w, &s).expect("json");
    let text = w.to_json_string().expect("json text");
    let mut r = JsonReader::from_str(&text, true).expect("json parse");
    assert_eq!(read_sample(&mut r).expect("json read"), s);

    let mut w = XmlWriter::new();
    write_sample(&mut w, &s).expect("xml");
    let text = w.into_string().expect("xml text");
    let mut r = XmlReader::from_str(&text, true).expect("xml parse");
    assert_eq!(read_sample(&mut r).expect("xml read"), s);
}

#[test]
fn test_json_document_shape() {
    let mut w = JsonWriter::new();
    write_sample(&mut w, &sample()).expect("write");
    let doc = w.into_document().expect("doc");
    let body = &doc["Sample"];
    assert_eq!(body["flag"], json!(true));
    assert_eq!(body["flag__plc4x_dataType"], json!("bit"));
    assert_eq!(body["flag__plc4x_bitLength"], json!(1));
    assert_eq!(body["kind"], json!("0x41"));
    assert_eq!(body["count"], json!(0xABC));
    assert_eq!(body["count__plc4x_dataType"], json!("uint"));
    assert_eq!(body["count__plc4x_bitLength"], json!(12));
    assert_eq!(body["offset"], json!(-42));
    assert_eq!(body["offset__plc4x_dataType"], json!("int"));
    assert_eq!(body["ratio__plc4x_dataType"], json!("float"));
    assert_eq!(body["temperature__plc4x_bitLength"], json!(13));
    assert_eq!(body["serial"], json!("39614081257132168796771975168"));
    assert_eq!(body["label__plc4x_dataType"], json!("string"));
    assert_eq!(body["payload"], json!("0x010203"));
    assert_eq!(body["payload__plc4x_bitLength"], json!(24));
    assert_eq!(
        body["items"][1]["item"]["value"],
        json!(300),
        "list contexts hold one object per element"
    );
}

#[test]
fn test_json_without_attributes() {
    let mut w = JsonWriter::new().with_attributes(false);
    w.write_unsigned("count", 8, 5).expect("write");
    assert_eq!(w.into_document().expect("doc"), json!({ "count": 5 }));
}

#[test]
fn test_json_missing_attributes_fail_validation_only() {
    let doc = json!({ "Msg": { "count": 5 } });

    let mut r = JsonReader::new(doc.clone(), true).expect("reader");
    r.pull_context("Msg", ContextKind::Element).expect("pull");
    let err = r.read_unsigned("count", 8).unwrap_err();
    assert!(matches!(err, CodecError::Validation(_)), "{:?}", err);

    let mut r = JsonReader::new(doc, false).expect("reader");
    r.pull_context("Msg", ContextKind::Element).expect("pull");
    assert_eq!(r.read_unsigned("count", 8).expect("read"), 5);
    r.close_context("Msg", ContextKind::Element).expect("close");
}

#[test]
fn test_json_wrong_bit_length_fails_validation() {
    let doc = json!({
        "count": 5,
        "count__plc4x_dataType": "uint",
        "count__plc4x_bitLength": 16
    });
    let mut r = JsonReader::new(doc, true).expect("reader");
    assert!(matches!(
        r.read_unsigned("count", 8),
        Err(CodecError::Validation(_))
    ));
}

#[test]
fn test_json_structure_errors() {
    let mut w = JsonWriter::new();
    w.push_context("a", ContextKind::Element).expect("push");
    let err = w.pop_context("b", ContextKind::Element).unwrap_err();
    assert!(matches!(err, CodecError::StructuralMismatch { .. }));
    w.write_unsigned("x", 8, 1).expect("x");
    assert!(matches!(
        w.write_unsigned("x", 8, 2),
        Err(CodecError::StructuralMismatch { .. })
    ));
    assert!(w.into_document().is_err(), "context a is still open");

    let doc = json!({ "a": { "x": 1 } });
    let mut r = JsonReader::new(doc.clone(), false).expect("reader");
    assert!(matches!(
        r.pull_context("a", ContextKind::List),
        Err(CodecError::StructuralMismatch { .. })
    ));
    let mut r = JsonReader::new(doc.clone(), false).expect("reader");
    assert!(r.pull_context("missing", ContextKind::Element).is_err());
    let mut r = JsonReader::new(doc, false).expect("reader");
    r.pull_context("a", ContextKind::Element).expect("pull");
    assert!(matches!(
        r.close_context("b", ContextKind::Element),
        Err(CodecError::StructuralMismatch { .. })
    ));
    assert!(matches!(
        r.read_unsigned("y", 8),
        Err(CodecError::StructuralMismatch { .. })
    ));

    assert!(JsonReader::new(json!([1, 2]), false).is_err());
    assert!(matches!(
        JsonReader::from_str("{ not json", false),
        Err(CodecError::Json(_))
    ));
}

#[test]
fn test_xml_document_shape() {
    let mut w = XmlWriter::new();
    write_sample(&mut w, &sample()).expect("write");
    let text = w.into_string().expect("text");
    assert!(text.trim_start().starts_with("<Sample>"), "{}", text);
    assert!(text.contains(r#"<flag dataType="bit" bitLength="1">true</flag>"#));
    assert!(text.contains(r#"<kind dataType="byte" bitLength="8">0x41</kind>"#));
    assert!(text.contains(r#"<offset dataType="int" bitLength="16">-42</offset>"#));
    assert!(text.contains(r#"<items isList="true">"#));
    assert!(text.trim_end().ends_with("</Sample>"));
}

#[test]
fn test_xml_validation() {
    let text = "<Msg><count>5</count></Msg>";

    let mut r = XmlReader::from_str(text, true).expect("reader");
    r.pull_context("Msg", ContextKind::Element).expect("pull");
    assert!(matches!(
        r.read_unsigned("count", 8),
        Err(CodecError::Validation(_))
    ));

    let mut r = XmlReader::from_str(text, false).expect("reader");
    r.pull_context("Msg", ContextKind::Element).expect("pull");
    assert_eq!(r.read_unsigned("count", 8).expect("read"), 5);
    r.close_context("Msg", ContextKind::Element).expect("close");
    r.ensure_balanced().expect("balanced");

    let mut r = XmlReader::from_str(
        r#"<count dataType="uint" bitLength="8">five</count>"#,
        true,
    )
    .expect("reader");
    assert!(matches!(
        r.read_unsigned("count", 8),
        Err(CodecError::Validation(_))
    ));
}

#[test]
fn test_xml_structure_errors() {
    let mut w = XmlWriter::new();
    w.push_context("a", ContextKind::List).expect("push");
    assert!(matches!(
        w.pop_context("a", ContextKind::Element),
        Err(CodecError::StructuralMismatch { .. })
    ));
    assert!(w.into_string().is_err());

    let text = r#"<a isList="true"><x>1</x></a>"#;
    let mut r = XmlReader::from_str(text, false).expect("reader");
    assert!(matches!(
        r.pull_context("a", ContextKind::Element),
        Err(CodecError::StructuralMismatch { .. })
    ));

    let mut r = XmlReader::from_str(text, false).expect("reader");
    r.pull_context("a", ContextKind::List).expect("pull");
    assert!(matches!(
        r.read_unsigned("y", 8),
        Err(CodecError::StructuralMismatch { .. })
    ));

    let mut r = XmlReader::from_str(text, false).expect("reader");
    r.pull_context("a", ContextKind::List).expect("pull");
    assert!(matches!(
        r.close_context("b", ContextKind::List),
        Err(CodecError::StructuralMismatch { .. })
    ));

    let mut r = XmlReader::from_str(text, false).expect("reader");
    r.pull_context("a", ContextKind::List).expect("pull");
    // <x> is still unread, so the closing tag is not next.
    assert!(r.close_context("a", ContextKind::List).is_err());
}

#[test]
fn test_xml_escapes_text() {
    let mut w = XmlWriter::new();
    w.write_string("s", 64, StringEncoding::Utf8, "a<b&c").expect("write");
    let text = w.into_string().expect("text");
    assert!(text.contains("a&lt;b&amp;c"), "{}", text);
    let mut r = XmlReader::from_str(&text, true).expect("reader");
    assert_eq!(
        r.read_string("s", 64, StringEncoding::Utf8).expect("read"),
        "a<b&c"
    );
}

#[test]
fn test_xml_keeps_string_whitespace() {
    for text in ["  ab  ", "   ", "", "\ttab\n"] {
        let mut w = XmlWriter::new();
        w.push_context("Msg", ContextKind::Element).expect("push");
        w.write_string("s", 64, StringEncoding::Utf8, text).expect("write");
        w.write_u8("after", 8, 1).expect("write");
        w.pop_context("Msg", ContextKind::Element).expect("pop");
        let xml = w.into_string().expect("text");

        let mut r = XmlReader::from_str(&xml, true).expect("reader");
        r.pull_context("Msg", ContextKind::Element).expect("pull");
        assert_eq!(
            r.read_string("s", 64, StringEncoding::Utf8).expect("read"),
            text,
            "{}",
            xml
        );
        assert_eq!(r.read_u8("after", 8).expect("after"), 1);
        r.close_context("Msg", ContextKind::Element).expect("close");
    }

    let mut r = XmlReader::from_str(
        r#"<s dataType="string" bitLength="64"><![CDATA[ a<b ]]></s>"#,
        true,
    )
    .expect("reader");
    assert_eq!(
        r.read_string("s", 64, StringEncoding::Utf8).expect("read"),
        " a<b "
    );
}

#[test]
fn test_signed_values_must_fit_declared_width() {
    let doc = json!({
        "delta": -1000,
        "delta__plc4x_dataType": "int",
        "delta__plc4x_bitLength": 8
    });
    let mut r = JsonReader::new(doc, true).expect("reader");
    assert!(matches!(
        r.read_signed("delta", 8),
        Err(CodecError::ValueOutOfRange(_))
    ));

    let doc = json!({ "lo": -128, "hi": 127, "big": 128 });
    let mut r = JsonReader::new(doc, false).expect("reader");
    assert_eq!(r.read_signed("lo", 8).expect("lo"), -128);
    assert_eq!(r.read_signed("hi", 8).expect("hi"), 127);
    assert!(r.read_signed("big", 8).is_err());
}

#[test]
fn test_tree_byte_array_length_overflow() {
    let doc = json!({ "raw": "0x01" });
    let mut r = JsonReader::new(doc, false).expect("reader");
    assert!(matches!(
        r.read_byte_array("raw", usize::MAX / 4),
        Err(CodecError::ValueOutOfRange(_))
    ));

    let mut r = XmlReader::from_str("<raw>0x01</raw>", false).expect("reader");
    assert!(matches!(
        r.read_byte_array("raw", usize::MAX / 4),
        Err(CodecError::ValueOutOfRange(_))
    ));
}
