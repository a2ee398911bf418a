use indexmap::IndexMap;
use rstest::rstest;
use rowjson::{
    from_slice, from_str, from_str_with_options, to_string, to_string_with_options, to_vec,
    Contract, DuplicateMembers, ErrorKind, NodeTree, NumberHandling, ParseOptions, Shaped,
    TypedOptions, UnknownMembers, WriteOptions,
};

#[derive(Debug, PartialEq, Clone)]
struct Line {
    sku: String,
    qty: u32,
    price_cents: u64,
}

impl Shaped for Line {
    fn contract() -> Contract {
        Contract::object::<Line>("line")
            .member("sku", |l: &Line| &l.sku)
            .member("qty", |l: &Line| &l.qty)
            .member("price_cents", |l: &Line| &l.price_cents)
            .build(|slots| {
                Ok(Line {
                    sku: slots.take("sku")?,
                    qty: slots.take("qty")?,
                    price_cents: slots.take("price_cents")?,
                })
            })
    }
}

#[derive(Debug, PartialEq, Clone)]
struct Invoice {
    id: u64,
    customer: String,
    lines: Vec<Line>,
    memo: Option<String>,
}

impl Shaped for Invoice {
    fn contract() -> Contract {
        Contract::object::<Invoice>("invoice")
            .member("id", |i: &Invoice| &i.id)
            .member("customer", |i: &Invoice| &i.customer)
            .member("lines", |i: &Invoice| &i.lines)
            .optional_member("memo", |i: &Invoice| &i.memo)
            .build(|slots| {
                Ok(Invoice {
                    id: slots.take("id")?,
                    customer: slots.take("customer")?,
                    lines: slots.take("lines")?,
                    memo: slots.take_or("memo", None),
                })
            })
    }
}

fn sample_invoice() -> Invoice {
    Invoice {
        id: 7001,
        customer: "Ada".into(),
        lines: vec![
            Line {
                sku: "bolt".into(),
                qty: 4,
                price_cents: 150,
            },
            Line {
                sku: "nut".into(),
                qty: 8,
                price_cents: 75,
            },
        ],
        memo: None,
    }
}

const SAMPLE_INVOICE_TEXT: &str = r#"{"id":7001,"customer":"Ada","lines":[{"sku":"bolt","qty":4,"price_cents":150},{"sku":"nut","qty":8,"price_cents":75}],"memo":null}"#;

#[rstest]
fn invoice_round_trip() {
    assert_eq!(to_string(&sample_invoice()).expect("write"), SAMPLE_INVOICE_TEXT);
    assert_eq!(
        from_str::<Invoice>(SAMPLE_INVOICE_TEXT).expect("read"),
        sample_invoice()
    );
}

#[rstest]
fn invoice_bytes_round_trip() {
    let bytes = to_vec(&sample_invoice()).expect("write");
    assert_eq!(from_slice::<Invoice>(&bytes).expect("read"), sample_invoice());
}

#[rstest]
#[case(r#"{"id":1,"customer":"c","lines":[]}"#, None)]
#[case(r#"{"id":1,"customer":"c","lines":[],"memo":null}"#, None)]
#[case(r#"{"id":1,"customer":"c","lines":[],"memo":"rush"}"#, Some("rush"))]
fn invoice_optional_member(#[case] input: &str, #[case] memo: Option<&str>) {
    let invoice: Invoice = from_str(input).expect("read");
    assert_eq!(invoice.memo.as_deref(), memo);
}

#[rstest]
fn invoice_member_order_is_declaration_order() {
    // Input order does not matter on read; output order always follows the
    // contract declaration.
    let shuffled = r#"{"lines":[],"id":3,"memo":"hi","customer":"c"}"#;
    let invoice: Invoice = from_str(shuffled).expect("read");
    assert_eq!(
        to_string(&invoice).expect("write"),
        r#"{"id":3,"customer":"c","lines":[],"memo":"hi"}"#
    );
}

#[rstest]
fn missing_required_member_names_it() {
    let err = from_str::<Invoice>(r#"{"id":1,"lines":[]}"#).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredMember);
    assert!(err.message().contains("`customer`"));
}

#[rstest]
fn type_mismatch_reports_nested_path() {
    let input = r#"{"id":1,"customer":"c","lines":[{"sku":"a","qty":1,"price_cents":5},{"sku":"b","qty":"two","price_cents":5}]}"#;
    let err = from_str::<Invoice>(input).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(err.path(), Some("$.lines[1].qty"));
}

#[rstest]
fn unknown_members_ignored_by_default() {
    let input = r#"{"id":1,"customer":"c","extra":{"deep":[1,2]},"lines":[]}"#;
    let invoice: Invoice = from_str(input).expect("read");
    assert_eq!(invoice.id, 1);
}

#[rstest]
fn unknown_members_rejected_on_request() {
    let input = r#"{"id":1,"customer":"c","extra":0,"lines":[]}"#;
    let typed = TypedOptions::new().with_unknown_members(UnknownMembers::Reject);
    let err = from_str_with_options::<Invoice>(input, &ParseOptions::default(), &typed)
        .expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::UnknownMember);
    assert!(err.message().contains("`extra`"));
}

#[rstest]
fn duplicate_members_last_wins_by_default() {
    let invoice: Invoice =
        from_str(r#"{"id":1,"id":2,"customer":"c","lines":[]}"#).expect("read");
    assert_eq!(invoice.id, 2);
}

#[rstest]
fn duplicate_members_rejected_on_request() {
    let typed = TypedOptions::new().with_duplicate_members(DuplicateMembers::Reject);
    let err = from_str_with_options::<Invoice>(
        r#"{"id":1,"id":2,"customer":"c","lines":[]}"#,
        &ParseOptions::default(),
        &typed,
    )
    .expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::DuplicateMember);
}

#[derive(Debug, PartialEq)]
struct Pickup {
    store: String,
}

#[derive(Debug, PartialEq)]
struct Courier {
    carrier: String,
    tracking: String,
}

#[derive(Debug, PartialEq)]
enum Shipment {
    AtStore(Pickup),
    Sent(Courier),
}

impl Shaped for Pickup {
    fn contract() -> Contract {
        Contract::object::<Pickup>("pickup")
            .member("store", |p: &Pickup| &p.store)
            .build(|slots| {
                Ok(Pickup {
                    store: slots.take("store")?,
                })
            })
    }
}

impl Shaped for Courier {
    fn contract() -> Contract {
        Contract::object::<Courier>("courier")
            .member("carrier", |c: &Courier| &c.carrier)
            .member("tracking", |c: &Courier| &c.tracking)
            .build(|slots| {
                Ok(Courier {
                    carrier: slots.take("carrier")?,
                    tracking: slots.take("tracking")?,
                })
            })
    }
}

fn shipment_pickup(s: &Shipment) -> Option<&Pickup> {
    match s {
        Shipment::AtStore(p) => Some(p),
        _ => None,
    }
}

fn shipment_courier(s: &Shipment) -> Option<&Courier> {
    match s {
        Shipment::Sent(c) => Some(c),
        _ => None,
    }
}

impl Shaped for Shipment {
    fn contract() -> Contract {
        Contract::polymorphic::<Shipment>("shipment", "mode")
            .variant::<Pickup>("pickup", Shipment::AtStore, shipment_pickup)
            .variant::<Courier>("courier", Shipment::Sent, shipment_courier)
            .build()
    }
}

#[rstest]
#[case(
    r#"{"mode":"pickup","store":"downtown"}"#,
    Shipment::AtStore(Pickup { store: "downtown".into() })
)]
#[case(
    r#"{"mode":"courier","carrier":"dhl","tracking":"XY99"}"#,
    Shipment::Sent(Courier { carrier: "dhl".into(), tracking: "XY99".into() })
)]
fn shipment_round_trip(#[case] text: &str, #[case] value: Shipment) {
    assert_eq!(from_str::<Shipment>(text).expect("read"), value);
    assert_eq!(to_string(&value).expect("write"), text);
}

#[rstest]
fn shipment_unknown_tag() {
    let err = from_str::<Shipment>(r#"{"mode":"drone","store":"x"}"#).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::UnrecognizedDiscriminator);
    assert!(err.message().contains("drone"));
}

/// The discriminator has to come first so a single pass can pick the
/// variant before any payload member arrives.
#[rstest]
#[case(r#"{"store":"x","mode":"pickup"}"#)]
#[case(r#"{"store":"x"}"#)]
#[case(r#"{}"#)]
fn shipment_tag_must_lead(#[case] input: &str) {
    let err = from_str::<Shipment>(input).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredMember);
    assert!(err.message().contains("`mode`"));
}

#[rstest]
fn shipment_inside_other_types() {
    let trips: Vec<Option<Shipment>> = from_str(
        r#"[{"mode":"pickup","store":"s"},null]"#,
    )
    .expect("read");
    assert_eq!(trips.len(), 2);
    assert!(trips[1].is_none());
    assert_eq!(
        to_string(&trips).expect("write"),
        r#"[{"mode":"pickup","store":"s"},null]"#
    );
}

#[derive(Debug, PartialEq)]
struct LegacyPrice {
    amount_cents: u64,
}

impl Shaped for LegacyPrice {
    fn contract() -> Contract {
        Contract::object::<LegacyPrice>("legacy price")
            .member("amount_cents", |p: &LegacyPrice| &p.amount_cents)
            .member_numbers(NumberHandling::quoted())
            .build(|slots| {
                Ok(LegacyPrice {
                    amount_cents: slots.take("amount_cents")?,
                })
            })
    }
}

#[rstest]
fn member_number_override_quotes_one_member() {
    let price = LegacyPrice { amount_cents: 1999 };
    let text = to_string(&price).expect("write");
    assert_eq!(text, r#"{"amount_cents":"1999"}"#);
    assert_eq!(from_str::<LegacyPrice>(&text).expect("read"), price);
    // The override is scoped: a plain number still decodes.
    assert_eq!(
        from_str::<LegacyPrice>(r#"{"amount_cents":1999}"#).expect("read"),
        price
    );
}

#[rstest]
fn baseline_number_handling_applies_everywhere() {
    let typed = TypedOptions::new().with_number_handling(NumberHandling::lenient_reading());
    let values: Vec<u32> =
        from_str_with_options(r#"["1","2",3]"#, &ParseOptions::default(), &typed).expect("read");
    assert_eq!(values, [1, 2, 3]);

    // Strict by default.
    let err = from_str::<Vec<u32>>(r#"["1"]"#).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[rstest]
fn dictionary_round_trip_preserves_order() {
    let text = r#"{"zulu":1,"alpha":2,"mike":3}"#;
    let map: IndexMap<String, u32> = from_str(text).expect("read");
    assert_eq!(
        map.keys().map(String::as_str).collect::<Vec<_>>(),
        ["zulu", "alpha", "mike"]
    );
    assert_eq!(to_string(&map).expect("write"), text);
}

#[derive(Debug)]
struct Event {
    name: String,
    payload: NodeTree,
}

impl Shaped for Event {
    fn contract() -> Contract {
        Contract::object::<Event>("event")
            .member("name", |e: &Event| &e.name)
            .member("payload", |e: &Event| &e.payload)
            .build(|slots| {
                Ok(Event {
                    name: slots.take("name")?,
                    payload: slots.take("payload")?,
                })
            })
    }
}

/// A tree-typed member captures whatever value sits there, so a schema can
/// stay open in one spot while the rest is strict.
#[rstest]
fn tree_member_captures_arbitrary_json() {
    let text = r#"{"name":"deploy","payload":{"env":"prod","hosts":["a","b"],"dry_run":false}}"#;
    let event: Event = from_str(text).expect("read");
    assert_eq!(event.name, "deploy");
    assert_eq!(
        event.payload.root().get("hosts").expect("hosts").at(1).expect("[1]").as_str(),
        Some("b")
    );
    assert_eq!(to_string(&event).expect("write"), text);
}

#[rstest]
fn tree_member_accepts_scalars_too() {
    let event: Event = from_str(r#"{"name":"ping","payload":31.5}"#).expect("read");
    assert_eq!(event.payload.root().as_f64(), Some(31.5));
}

#[rstest]
#[case::bool_value("true", true)]
#[case::bool_false("false", false)]
fn scalar_roots_bool(#[case] text: &str, #[case] value: bool) {
    assert_eq!(from_str::<bool>(text).expect("read"), value);
    assert_eq!(to_string(&value).expect("write"), text);
}

#[rstest]
fn scalar_roots() {
    assert_eq!(from_str::<u32>("42").expect("read"), 42);
    assert_eq!(from_str::<i64>("-9").expect("read"), -9);
    assert_eq!(from_str::<f64>("2.5e1").expect("read"), 25.0);
    assert_eq!(from_str::<f32>("1.5").expect("read"), 1.5);
    assert_eq!(from_str::<String>(r#""hi\n""#).expect("read"), "hi\n");
    assert_eq!(from_str::<char>(r#""é""#).expect("read"), 'é');
    assert_eq!(from_str::<Option<u32>>("null").expect("read"), None);
    assert_eq!(from_str::<Option<u32>>("3").expect("read"), Some(3));
    assert_eq!(to_string(&'é').expect("write"), r#""é""#);
    assert_eq!(to_string(&Some(3u32)).expect("write"), "3");
    assert_eq!(to_string(&None::<u32>).expect("write"), "null");
}

#[rstest]
fn unsigned_rejects_negative() {
    let err = from_str::<u32>("-1").expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::NumberFormat);
}

#[rstest]
fn integer_rejects_fraction() {
    let err = from_str::<u32>("1.5").expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::NumberFormat);
}

#[rstest]
fn usize_reads_through_its_base_type() {
    assert_eq!(from_str::<usize>("4096").expect("read"), 4096usize);
    assert_eq!(to_string(&4096usize).expect("write"), "4096");
    let err = from_str::<usize>("-1").expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::NumberFormat);
}

#[rstest]
fn fixed_size_array_checks_length() {
    assert_eq!(from_str::<[u8; 3]>("[1,2,3]").expect("read"), [1, 2, 3]);
    let short = from_str::<[u8; 3]>("[1,2]").expect_err("must fail");
    assert_eq!(short.kind(), ErrorKind::TypeMismatch);
    let long = from_str::<[u8; 3]>("[1,2,3,4]").expect_err("must fail");
    assert_eq!(long.kind(), ErrorKind::NotSupported);
}

#[rstest]
fn nested_option_collapses_null() {
    let value: Option<Option<u32>> = from_str("null").expect("read");
    assert_eq!(value, None);
    let value: Option<Option<u32>> = from_str("5").expect("read");
    assert_eq!(value, Some(Some(5)));
}

#[rstest]
fn typed_write_indented() {
    let text = to_string_with_options(
        &vec![1u32, 2],
        &WriteOptions::new().with_indent(Some(2)),
        &TypedOptions::default(),
    )
    .expect("write");
    assert_eq!(text, "[\n  1,\n  2\n]");
}

#[rstest]
fn typed_read_depth_guard() {
    let deep = "[".repeat(50) + "1" + &"]".repeat(50);
    let err = from_str_with_options::<NodeTree>(
        &deep,
        &ParseOptions::new().with_max_depth(10),
        &TypedOptions::default(),
    )
    .expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::DepthExceeded);
}

#[rstest]
fn trailing_content_rejected() {
    let err = from_str::<u32>("1 1").expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::Syntax);
}
