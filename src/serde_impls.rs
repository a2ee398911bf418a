//! Serde interop for the dynamic types, so node trees and numbers can move
//! through any serde format without a detour over text.

use std::fmt;

use serde::de::{self, Deserialize, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use smol_str::SmolStr;

use crate::node::{NodeContents, NodeId, NodeTree, Scalar};
use crate::num::Number;

impl Serialize for Number {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Number::PosInt(v) => serializer.serialize_u64(*v),
            Number::NegInt(v) => serializer.serialize_i64(*v),
            Number::Float(v) => serializer.serialize_f64(*v),
        }
    }
}

impl<'de> Deserialize<'de> for Number {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NumberVisitor;

        impl Visitor<'_> for NumberVisitor {
            type Value = Number;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON number")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Number, E> {
                Ok(Number::from(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Number, E> {
                Ok(Number::from(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Number, E> {
                match Number::from_f64(v) {
                    Some(n) => Ok(n),
                    None => Err(de::Error::custom("number is not finite")),
                }
            }
        }

        deserializer.deserialize_any(NumberVisitor)
    }
}

impl Serialize for NodeTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_node(self, self.root_id(), serializer)
    }
}

/// One node of a tree, serializable on its own so containers can recurse
/// through `serialize_element`/`serialize_entry`.
struct NodeProxy<'t> {
    tree: &'t NodeTree,
    id: NodeId,
}

impl Serialize for NodeProxy<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_node(self.tree, self.id, serializer)
    }
}

fn serialize_node<S: Serializer>(
    tree: &NodeTree,
    id: NodeId,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match tree.contents(id) {
        NodeContents::Scalar(scalar) => match scalar {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(v) => serializer.serialize_bool(*v),
            Scalar::Number(n) => n.serialize(serializer),
            Scalar::String(s) => serializer.serialize_str(s),
        },
        NodeContents::Array(children) => {
            let mut seq = serializer.serialize_seq(Some(children.len()))?;
            for &child in children {
                seq.serialize_element(&NodeProxy { tree, id: child })?;
            }
            seq.end()
        }
        NodeContents::Object(members) => {
            let mut map = serializer.serialize_map(Some(members.len()))?;
            for (key, &child) in members {
                map.serialize_entry(key.as_str(), &NodeProxy { tree, id: child })?;
            }
            map.end()
        }
    }
}

impl<'de> Deserialize<'de> for NodeTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut tree = NodeTree::new_scalar(Scalar::Null);
        let root = NodeSeed { tree: &mut tree }.deserialize(deserializer)?;
        tree.set_root(root);
        Ok(tree)
    }
}

/// Builds one value as a detached node inside an existing tree.
struct NodeSeed<'t> {
    tree: &'t mut NodeTree,
}

impl<'de> DeserializeSeed<'de> for NodeSeed<'_> {
    type Value = NodeId;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<NodeId, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for NodeSeed<'_> {
    type Value = NodeId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<NodeId, E> {
        Ok(self.tree.alloc_scalar(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<NodeId, E> {
        Ok(self.tree.alloc_scalar(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<NodeId, E> {
        Ok(self.tree.alloc_scalar(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<NodeId, E> {
        Ok(self.tree.alloc_scalar(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<NodeId, E> {
        Ok(self.tree.alloc_scalar(v))
    }

    fn visit_none<E: de::Error>(self) -> Result<NodeId, E> {
        Ok(self.tree.alloc_scalar(Scalar::Null))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<NodeId, D::Error> {
        NodeSeed { tree: self.tree }.deserialize(deserializer)
    }

    fn visit_unit<E: de::Error>(self) -> Result<NodeId, E> {
        Ok(self.tree.alloc_scalar(Scalar::Null))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<NodeId, A::Error> {
        let array = self.tree.alloc_array();
        while let Some(child) = seq.next_element_seed(NodeSeed { tree: &mut *self.tree })? {
            self.tree.attach_to_array(array, None, child);
        }
        Ok(array)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<NodeId, A::Error> {
        let object = self.tree.alloc_object();
        while let Some(key) = map.next_key::<String>()? {
            let child = map.next_value_seed(NodeSeed { tree: &mut *self.tree })?;
            self.tree.attach_to_object(object, SmolStr::from(key), child);
        }
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    fn test_tree_serializes_to_json_value() {
        let tree = NodeTree::parse(r#"{"name":"ada","tags":["a","b"],"age":36}"#).expect("parse");
        let rendered = serde_json::to_string(&tree).expect("serialize");
        assert_eq!(rendered, r#"{"name":"ada","tags":["a","b"],"age":36}"#);
    }

    #[rstest::rstest]
    fn test_tree_deserializes_from_json() {
        let tree: NodeTree =
            serde_json::from_str(r#"{"a":[1,null,{"b":true}],"c":-2.5}"#).expect("deserialize");
        assert_eq!(tree.to_text().expect("text"), r#"{"a":[1,null,{"b":true}],"c":-2.5}"#);
        let a1 = tree.root().get("a").expect("a").at(1).expect("a[1]");
        assert!(a1.is_null());
    }

    #[rstest::rstest]
    fn test_number_round_trip() {
        assert_eq!(serde_json::to_string(&Number::PosInt(7)).expect("ser"), "7");
        assert_eq!(
            serde_json::to_string(&Number::NegInt(-3)).expect("ser"),
            "-3"
        );
        assert_eq!(
            serde_json::to_string(&Number::Float(2.5)).expect("ser"),
            "2.5"
        );
        let n: Number = serde_json::from_str("18446744073709551615").expect("de");
        assert_eq!(n, Number::PosInt(u64::MAX));
    }

    #[rstest::rstest]
    fn test_tree_survives_serde_round_trip() {
        let text = r#"{"nested":{"deep":[[],{},""]},"n":0}"#;
        let tree = NodeTree::parse(text).expect("parse");
        let through: NodeTree =
            serde_json::from_str(&serde_json::to_string(&tree).expect("ser")).expect("de");
        assert_eq!(through.to_text().expect("text"), text);
    }
}
