use rstest::rstest;
use rowjson::{Document, ErrorKind, NodeEntry, NodeTree, Scalar, ValueKind, WriteOptions};

#[rstest]
fn tree_parse_then_render() {
    let text = r#"{"name":"ada","scores":[1,2,3],"meta":{"ok":true}}"#;
    let tree = NodeTree::parse(text).expect("parse");
    assert_eq!(tree.to_text().expect("text"), text);
}

#[rstest]
fn tree_edit_members_in_place() {
    let mut tree = NodeTree::parse(r#"{"name":"ada","age":36}"#).expect("parse");
    let mut root = tree.root_mut();
    root.set("age", 37i64);
    root.set("active", true);
    root.remove("name");
    assert_eq!(tree.to_text().expect("text"), r#"{"age":37,"active":true}"#);
}

#[rstest]
fn tree_build_from_scratch() {
    let mut tree = NodeTree::new();
    let scores = tree.alloc_array();
    tree.root_mut().insert_node("scores", scores);
    let mut arr = tree.node_mut(scores);
    arr.push(10i64);
    arr.push(20i64);
    arr.insert(1, 15i64);
    tree.root_mut().set("name", "ada");
    assert_eq!(
        tree.to_text().expect("text"),
        r#"{"scores":[10,15,20],"name":"ada"}"#
    );
}

#[rstest]
fn tree_array_editing() {
    let mut tree = NodeTree::parse("[1,2,3,4]").expect("parse");
    let mut root = tree.root_mut();
    assert!(root.remove_at(1));
    root.set_at(0, 100i64);
    root.insert(2, "end");
    assert_eq!(tree.to_text().expect("text"), r#"[100,3,"end",4]"#);
}

/// Moving a subtree is detach plus attach; the node keeps its children.
#[rstest]
fn tree_move_subtree() {
    let mut tree = NodeTree::parse(r#"{"from":{"inner":[1,2]},"to":{}}"#).expect("parse");
    let inner = tree.root().get("from").expect("from").get("inner").expect("inner").id();
    assert!(tree.detach(inner));
    assert_eq!(tree.parent(inner), None);

    let to = tree.root().get("to").expect("to").id();
    tree.node_mut(to).insert_node("moved", inner);
    assert_eq!(tree.parent(inner), Some(to));
    assert_eq!(
        tree.to_text().expect("text"),
        r#"{"from":{},"to":{"moved":[1,2]}}"#
    );
}

#[rstest]
fn tree_replace_root() {
    let mut tree = NodeTree::parse(r#"{"old":1}"#).expect("parse");
    let list = tree.alloc_array();
    tree.node_mut(list).push(9i64);
    tree.set_root(list);
    assert_eq!(tree.to_text().expect("text"), "[9]");
}

#[rstest]
#[should_panic(expected = "still has a parent")]
fn tree_set_root_rejects_attached_node() {
    let mut tree = NodeTree::parse(r#"{"a":[1]}"#).expect("parse");
    let attached = tree.root().get("a").expect("a").id();
    tree.set_root(attached);
}

#[rstest]
#[should_panic(expected = "cycle")]
fn tree_attach_rejects_cycle() {
    let mut tree = NodeTree::parse(r#"{"a":{"b":{}}}"#).expect("parse");
    let a = tree.root().get("a").expect("a").id();
    let b = tree.node(a).get("b").expect("b").id();
    tree.detach(a);
    tree.node_mut(b).insert_node("loop", a);
}

#[rstest]
fn tree_parent_links_and_paths() {
    let tree = NodeTree::parse(r#"{"users":[{"name":"ada"}]}"#).expect("parse");
    let name = tree
        .root()
        .get("users")
        .expect("users")
        .at(0)
        .expect("[0]")
        .get("name")
        .expect("name");
    assert_eq!(name.path(), "$.users[0].name");
    assert_eq!(name.parent().expect("object").kind(), ValueKind::Object);
    assert_eq!(tree.path(tree.root_id()), "$");

    assert_eq!(
        tree.find_entry_for(name.id()),
        Some(NodeEntry::Member("name"))
    );
}

#[rstest]
fn tree_scalar_accessors() {
    let tree = NodeTree::parse(r#"[null,true,7,-2,1.5,"s"]"#).expect("parse");
    let root = tree.root();
    assert!(root.at(0).expect("0").is_null());
    assert_eq!(root.at(1).expect("1").as_bool(), Some(true));
    assert_eq!(root.at(2).expect("2").as_u64(), Some(7));
    assert_eq!(root.at(3).expect("3").as_i64(), Some(-2));
    assert_eq!(root.at(4).expect("4").as_f64(), Some(1.5));
    assert_eq!(root.at(5).expect("5").as_str(), Some("s"));
    assert_eq!(root.at(2).expect("2").scalar(), Some(&Scalar::Number(7u64.into())));
}

#[rstest]
fn tree_duplicate_keys_last_wins() {
    let tree = NodeTree::parse(r#"{"a":1,"b":2,"a":3}"#).expect("parse");
    assert_eq!(tree.root().get("a").expect("a").as_u64(), Some(3));
    assert_eq!(tree.to_text().expect("text"), r#"{"a":3,"b":2}"#);
}

#[rstest]
fn tree_from_document_subtree() {
    let doc = Document::parse(r#"{"keep":{"x":[1,{"y":2}]},"drop":0}"#).expect("parse");
    let tree = NodeTree::from_element(doc.root().get("keep").expect("keep")).expect("tree");
    assert_eq!(tree.to_text().expect("text"), r#"{"x":[1,{"y":2}]}"#);
    // The copy owns its data; paths restart at its own root.
    assert_eq!(
        tree.root().get("x").expect("x").at(1).expect("[1]").get("y").expect("y").path(),
        "$.x[1].y"
    );
}

#[rstest]
fn tree_non_finite_float_becomes_null() {
    let mut tree = NodeTree::new_array();
    tree.root_mut().push(1.0f64);
    tree.root_mut().push(f64::NAN);
    assert_eq!(tree.to_text().expect("text"), "[1.0,null]");
}

#[rstest]
fn tree_materialize_rejects_unrepresentable_number() {
    let doc = Document::parse("[1e999]").expect("parse");
    let err = NodeTree::from_element(doc.root()).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::NumberFormat);
}

#[rstest]
fn tree_indented_output() {
    let tree = NodeTree::parse(r#"{"a":[1]}"#).expect("parse");
    let text = tree
        .to_text_with_options(WriteOptions::new().with_indent(Some(2)))
        .expect("text");
    assert_eq!(text, "{\n  \"a\": [\n    1\n  ]\n}");
}

#[rstest]
fn tree_iterators() {
    let tree = NodeTree::parse(r#"{"a":1,"b":[true,false]}"#).expect("parse");
    let keys: Vec<&str> = tree.root().members().map(|(k, _)| k).collect();
    assert_eq!(keys, ["a", "b"]);
    let bools: Vec<bool> = tree
        .root()
        .get("b")
        .expect("b")
        .elements()
        .filter_map(|e| e.as_bool())
        .collect();
    assert_eq!(bools, [true, false]);
}
