use rstest::rstest;
use rowjson::{
    to_string, to_string_with_options, CommentHandling, Contract, ErrorKind, NodeTree,
    ParseOptions, Shaped, Status, StreamReader, StreamWriter, TypedOptions, WriteOptions,
};

#[derive(Debug, PartialEq, Clone)]
struct Reading {
    sensor: String,
    values: Vec<i64>,
    unit: Option<String>,
}

impl Shaped for Reading {
    fn contract() -> Contract {
        Contract::object::<Reading>("reading")
            .member("sensor", |r: &Reading| &r.sensor)
            .member("values", |r: &Reading| &r.values)
            .optional_member("unit", |r: &Reading| &r.unit)
            .build(|slots| {
                Ok(Reading {
                    sensor: slots.take("sensor")?,
                    values: slots.take("values")?,
                    unit: slots.take_or("unit", None),
                })
            })
    }
}

fn sample_reading() -> Reading {
    Reading {
        sensor: "temp-1".into(),
        values: vec![21, 22, 21],
        unit: Some("C".into()),
    }
}

const SAMPLE_TEXT: &str = r#"{"sensor":"temp-1","values":[21,22,21],"unit":"C"}"#;

/// Whatever chunking the transport picks, the value must come out the same.
#[rstest]
fn reader_accepts_every_split_point() {
    let bytes = SAMPLE_TEXT.as_bytes();
    for split in 0..bytes.len() {
        let mut reader = StreamReader::<Reading>::new();
        match reader.feed(&bytes[..split]).expect("feed") {
            Status::Done(_) => panic!("complete before all bytes at split {split}"),
            Status::NeedMore => {}
        }
        match reader.finish(&bytes[split..]).expect("finish") {
            Status::Done(value) => assert_eq!(value, sample_reading()),
            Status::NeedMore => panic!("still incomplete at split {split}"),
        }
    }
}

#[rstest]
fn reader_accepts_byte_at_a_time() {
    let mut reader = StreamReader::<Reading>::new();
    let bytes = SAMPLE_TEXT.as_bytes();
    for &b in &bytes[..bytes.len() - 1] {
        match reader.feed(&[b]).expect("feed") {
            Status::NeedMore => {}
            Status::Done(_) => panic!("done too early"),
        }
    }
    match reader.finish(&bytes[bytes.len() - 1..]).expect("finish") {
        Status::Done(value) => assert_eq!(value, sample_reading()),
        Status::NeedMore => panic!("never completed"),
    }
}

/// A closing bracket is unambiguous, so a container root completes without
/// waiting for end-of-input.
#[rstest]
fn reader_completes_container_before_finish() {
    let mut reader = StreamReader::<Vec<u32>>::new();
    match reader.feed(b"[1,2,3]").expect("feed") {
        Status::Done(values) => assert_eq!(values, [1, 2, 3]),
        Status::NeedMore => panic!("container end should complete the value"),
    }
}

/// A bare number could always grow another digit, so only end-of-input
/// finishes it.
#[rstest]
fn reader_holds_scalar_root_until_finish() {
    let mut reader = StreamReader::<u64>::new();
    assert!(matches!(reader.feed(b"42").expect("feed"), Status::NeedMore));
    match reader.finish(b"").expect("finish") {
        Status::Done(value) => assert_eq!(value, 42),
        Status::NeedMore => panic!("finish must settle the number"),
    }
}

#[rstest]
fn reader_rejects_truncated_input() {
    let mut reader = StreamReader::<Reading>::new();
    assert!(matches!(
        reader.feed(br#"{"sensor":"temp-1","val"#).expect("feed"),
        Status::NeedMore
    ));
    let err = reader.finish(b"").expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::UnexpectedEnd);
}

#[rstest]
fn reader_rejects_trailing_content() {
    let mut reader = StreamReader::<Vec<u32>>::new();
    let err = reader.feed(b"[1] [2]").expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::Syntax);
}

#[rstest]
fn reader_reports_absolute_offsets_across_chunks() {
    let mut reader = StreamReader::<Vec<u32>>::new();
    assert!(matches!(reader.feed(b"[1,2,").expect("feed"), Status::NeedMore));
    let err = reader.feed(b"true]").expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    // The reported position is into the whole stream, not the last chunk.
    assert_eq!(err.offset(), Some(5));
}

#[rstest]
fn reader_split_inside_trivia() {
    let parse = ParseOptions::new()
        .with_comment_handling(CommentHandling::Skip)
        .with_allow_trailing_commas(true);
    let text = b"[1, // watch the line break\n 2,]";
    for split in 0..=text.len() {
        let mut reader = StreamReader::<Vec<u32>>::with_options(&parse, &TypedOptions::default());
        let first = reader.feed(&text[..split]).expect("feed");
        let values = match first {
            Status::Done(values) => values,
            Status::NeedMore => match reader.finish(&text[split..]).expect("finish") {
                Status::Done(values) => values,
                Status::NeedMore => panic!("never completed at split {split}"),
            },
        };
        assert_eq!(values, [1, 2]);
    }
}

#[rstest]
fn reader_streams_node_tree() {
    let mut reader = StreamReader::<NodeTree>::new();
    assert!(matches!(
        reader.feed(br#"{"a":[1,"#).expect("feed"),
        Status::NeedMore
    ));
    match reader.feed(br#"2],"b":null}"#).expect("feed") {
        Status::Done(tree) => {
            assert_eq!(tree.to_text().expect("text"), r#"{"a":[1,2],"b":null}"#);
        }
        Status::NeedMore => panic!("tree should complete at the closing brace"),
    }
}

#[rstest]
#[should_panic(expected = "already produced")]
fn reader_panics_when_fed_after_done() {
    let mut reader = StreamReader::<bool>::new();
    let _ = reader.feed(b"true ");
    let _ = reader.feed(b" ");
}

#[rstest]
#[should_panic(expected = "already failed")]
fn reader_panics_when_fed_after_error() {
    let mut reader = StreamReader::<bool>::new();
    let _ = reader.feed(b"nope");
    let _ = reader.feed(b"more");
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(7)]
#[case(64)]
#[case(4096)]
fn writer_chunks_concatenate_to_one_shot(#[case] budget: usize) {
    let value = sample_reading();
    let expected = to_string(&value).expect("one shot");

    let mut writer = StreamWriter::new(&value, budget);
    let mut collected = Vec::new();
    let mut chunks = 0usize;
    while let Some(chunk) = writer.next_chunk().expect("chunk") {
        assert!(!chunk.is_empty());
        collected.extend_from_slice(chunk);
        chunks += 1;
    }
    assert_eq!(String::from_utf8(collected).expect("utf8"), expected);
    assert_eq!(writer.bytes_written(), expected.len());
    if budget < expected.len() {
        assert!(chunks > 1, "budget {budget} should take several chunks");
    }
}

/// Budget zero still makes progress: every step's output flushes at once.
#[rstest]
fn writer_zero_budget_emits_per_element() {
    let values = vec![1u8, 2, 3];
    let mut writer = StreamWriter::new(&values, 0);
    let mut chunks = Vec::new();
    while let Some(chunk) = writer.next_chunk().expect("chunk") {
        chunks.push(String::from_utf8(chunk.to_vec()).expect("utf8"));
    }
    assert_eq!(chunks.concat(), "[1,2,3]");
    assert!(chunks.len() >= 3);
}

#[rstest]
fn writer_exhausted_returns_none_repeatedly() {
    let value = 5u8;
    let mut writer = StreamWriter::new(&value, 1024);
    assert_eq!(writer.next_chunk().expect("chunk"), Some(&b"5"[..]));
    assert_eq!(writer.next_chunk().expect("chunk"), None);
    assert_eq!(writer.next_chunk().expect("chunk"), None);
}

#[rstest]
fn writer_streams_indented_output() {
    let values = vec![1u32, 2];
    let options = WriteOptions::new().with_indent(Some(2));
    let expected =
        to_string_with_options(&values, &options, &TypedOptions::default()).expect("one shot");

    let mut writer = StreamWriter::with_options(&values, 3, &options, &TypedOptions::default());
    let mut collected = Vec::new();
    while let Some(chunk) = writer.next_chunk().expect("chunk") {
        collected.extend_from_slice(chunk);
    }
    assert_eq!(String::from_utf8(collected).expect("utf8"), expected);
}

#[rstest]
fn writer_streams_node_tree() {
    let tree = NodeTree::parse(r#"{"rows":[[1,2],[3,4]],"ok":true}"#).expect("parse");
    let expected = to_string(&tree).expect("one shot");

    let mut writer = StreamWriter::new(&tree, 4);
    let mut collected = Vec::new();
    while let Some(chunk) = writer.next_chunk().expect("chunk") {
        collected.extend_from_slice(chunk);
    }
    assert_eq!(String::from_utf8(collected).expect("utf8"), expected);
}

#[rstest]
fn writer_handles_large_values() {
    let values: Vec<u32> = (0..1000).collect();
    let expected = to_string(&values).expect("one shot");

    let mut writer = StreamWriter::new(&values, 16);
    let mut collected = Vec::new();
    while let Some(chunk) = writer.next_chunk().expect("chunk") {
        assert!(!chunk.is_empty());
        collected.extend_from_slice(chunk);
    }
    assert_eq!(String::from_utf8(collected).expect("utf8"), expected);
}

/// Feeding the writer's chunks straight into a reader closes the loop
/// without ever holding the whole text.
#[rstest]
fn writer_to_reader_round_trip() {
    let value = sample_reading();
    let mut writer = StreamWriter::new(&value, 8);
    let mut reader = StreamReader::<Reading>::new();

    let mut outcome = None;
    while let Some(chunk) = writer.next_chunk().expect("chunk") {
        match reader.feed(chunk).expect("feed") {
            Status::Done(decoded) => outcome = Some(decoded),
            Status::NeedMore => {}
        }
    }
    assert_eq!(outcome.expect("decoded"), value);
}
