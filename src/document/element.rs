use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::num::{self, Number};
use crate::reader::TokenKind;
use crate::text;
use crate::writer::TokenWriter;

use super::Document;

/// Shape of the value a cursor points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Object => "object",
            ValueKind::Array => "array",
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Bool => "boolean",
            ValueKind::Null => "null",
        };
        f.write_str(name)
    }
}

/// Non-owning cursor over one value inside a [`Document`].
///
/// Copying a cursor is free; all accessors decode lazily from the
/// document's buffer. Sibling and child navigation work on row indices
/// alone, so skipping an arbitrarily large subtree costs one addition.
#[derive(Clone, Copy)]
pub struct Element<'a> {
    doc: &'a Document,
    row: usize,
}

impl<'a> Element<'a> {
    pub(crate) fn new(doc: &'a Document, row: usize) -> Self {
        Self { doc, row }
    }

    pub fn kind(&self) -> ValueKind {
        match self.doc.row(self.row).kind() {
            TokenKind::StartObject => ValueKind::Object,
            TokenKind::StartArray => ValueKind::Array,
            TokenKind::String => ValueKind::String,
            TokenKind::Number => ValueKind::Number,
            TokenKind::True | TokenKind::False => ValueKind::Bool,
            _ => ValueKind::Null,
        }
    }

    /// Element count for arrays, property count for objects, 0 otherwise.
    pub fn child_count(&self) -> usize {
        let row = self.doc.row(self.row);
        if row.is_container_start() {
            row.size_or_length()
        } else {
            0
        }
    }

    pub fn is_null(&self) -> bool {
        self.doc.row(self.row).kind() == TokenKind::Null
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self.doc.row(self.row).kind() {
            TokenKind::True => Ok(true),
            TokenKind::False => Ok(false),
            _ => Err(self.type_error("a boolean")),
        }
    }

    /// Decoded text of a string value; borrows when no escapes are present.
    pub fn as_str(&self) -> Result<Cow<'a, str>> {
        let row = self.doc.row(self.row);
        if row.kind() != TokenKind::String {
            return Err(self.type_error("a string"));
        }
        let payload = self.doc.payload(self.row);
        if row.flag() {
            Ok(Cow::Owned(text::unescape(payload, row.offset())?))
        } else {
            let s = std::str::from_utf8(payload)
                .map_err(|e| Error::syntax("invalid utf-8 in string", row.offset() + e.valid_up_to()))?;
            Ok(Cow::Borrowed(s))
        }
    }

    pub fn as_number(&self) -> Result<Number> {
        self.number_payload().and_then(num::parse_number)
    }

    pub fn as_i64(&self) -> Result<i64> {
        self.number_payload().and_then(num::parse_i64)
    }

    pub fn as_u64(&self) -> Result<u64> {
        self.number_payload().and_then(num::parse_u64)
    }

    pub fn as_f64(&self) -> Result<f64> {
        self.number_payload().and_then(num::parse_f64)
    }

    /// Member lookup by decoded name. `None` for absent members and for
    /// non-object values. When the same name appears more than once the
    /// later occurrence shadows the earlier one, so the full member list
    /// is scanned.
    pub fn get(&self, name: &str) -> Option<Element<'a>> {
        let row = self.doc.row(self.row);
        if row.kind() != TokenKind::StartObject {
            return None;
        }
        let mut found = None;
        let mut name_row = self.row + 1;
        for _ in 0..row.size_or_length() {
            if name_matches(self.doc, name_row, name) {
                found = Some(Element::new(self.doc, name_row + 1));
            }
            name_row = sibling(self.doc, name_row + 1);
        }
        found
    }

    /// Array element by position, skipping earlier siblings row-wise.
    pub fn at(&self, index: usize) -> Option<Element<'a>> {
        let row = self.doc.row(self.row);
        if row.kind() != TokenKind::StartArray || index >= row.size_or_length() {
            return None;
        }
        // A clear flag means no container elements, so every element
        // occupies exactly one row.
        if !row.flag() {
            return Some(Element::new(self.doc, self.row + 1 + index));
        }
        let mut element_row = self.row + 1;
        for _ in 0..index {
            element_row = sibling(self.doc, element_row);
        }
        Some(Element::new(self.doc, element_row))
    }

    pub fn elements(&self) -> Result<ArrayIter<'a>> {
        if self.doc.row(self.row).kind() != TokenKind::StartArray {
            return Err(self.type_error("an array"));
        }
        Ok(ArrayIter {
            doc: self.doc,
            next_row: self.row + 1,
            remaining: self.child_count(),
        })
    }

    pub fn members(&self) -> Result<MemberIter<'a>> {
        if self.doc.row(self.row).kind() != TokenKind::StartObject {
            return Err(self.type_error("an object"));
        }
        Ok(MemberIter {
            doc: self.doc,
            next_row: self.row + 1,
            remaining: self.child_count(),
        })
    }

    /// Build a mutable tree from this subtree. Fails on numbers outside
    /// the representable range, such as `1e999`.
    pub fn materialize(&self) -> Result<crate::node::NodeTree> {
        crate::node::NodeTree::from_element(*self)
    }

    /// The input bytes this value occupies, quotes included for strings.
    pub fn raw_bytes(&self) -> &'a [u8] {
        let row = self.doc.row(self.row);
        if row.is_container_start() {
            let end = self.doc.row(self.row + row.subtree_rows());
            self.doc.bytes(row.offset(), end.offset() + 1)
        } else if matches!(row.kind(), TokenKind::String) {
            self.doc
                .bytes(row.offset() - 1, row.offset() + row.size_or_length() + 1)
        } else {
            self.doc
                .bytes(row.offset(), row.offset() + row.size_or_length())
        }
    }

    /// Re-emit this subtree token by token. Escapes and number text come
    /// through byte-for-byte from the input; whitespace follows the
    /// writer's options instead.
    pub fn write_to(&self, writer: &mut TokenWriter) -> Result<()> {
        let first = self.doc.row(self.row);
        let last = if first.is_container_start() {
            self.row + first.subtree_rows()
        } else {
            self.row
        };
        for index in self.row..=last {
            let row = self.doc.row(index);
            match row.kind() {
                TokenKind::StartObject => writer.write_start_object()?,
                TokenKind::EndObject => writer.write_end_object(),
                TokenKind::StartArray => writer.write_start_array()?,
                TokenKind::EndArray => writer.write_end_array(),
                TokenKind::PropertyName => writer.write_raw_name(self.doc.payload(index)),
                TokenKind::String => writer.write_raw_string(self.doc.payload(index)),
                TokenKind::Number => writer.write_raw_number(self.doc.payload(index)),
                TokenKind::True => writer.write_bool(true),
                TokenKind::False => writer.write_bool(false),
                TokenKind::Null => writer.write_null(),
                TokenKind::None => {}
            }
        }
        Ok(())
    }

    fn number_payload(&self) -> Result<&'a [u8]> {
        if self.doc.row(self.row).kind() != TokenKind::Number {
            return Err(self.type_error("a number"));
        }
        Ok(self.doc.payload(self.row))
    }

    fn type_error(&self, expected: &str) -> Error {
        Error::type_mismatch(expected, self.kind()).with_offset(self.doc.row(self.row).offset())
    }
}

impl std::fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("kind", &self.kind())
            .field("row", &self.row)
            .finish()
    }
}

/// Row index of the next value at the same nesting level.
fn sibling(doc: &Document, row: usize) -> usize {
    let r = doc.row(row);
    if r.is_container_start() {
        row + r.subtree_rows() + 1
    } else {
        row + 1
    }
}

fn name_matches(doc: &Document, name_row: usize, name: &str) -> bool {
    let payload = doc.payload(name_row);
    if doc.row(name_row).flag() {
        text::unescape_valid(payload) == name
    } else {
        payload == name.as_bytes()
    }
}

fn member_name(doc: &Document, name_row: usize) -> Cow<'_, str> {
    let payload = doc.payload(name_row);
    if doc.row(name_row).flag() {
        Cow::Owned(text::unescape_valid(payload))
    } else {
        match std::str::from_utf8(payload) {
            Ok(s) => Cow::Borrowed(s),
            Err(_) => Cow::Owned(String::from_utf8_lossy(payload).into_owned()),
        }
    }
}

/// Iterator over array elements; visits exactly `child_count` values.
pub struct ArrayIter<'a> {
    doc: &'a Document,
    next_row: usize,
    remaining: usize,
}

impl<'a> Iterator for ArrayIter<'a> {
    type Item = Element<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let element = Element::new(self.doc, self.next_row);
        self.next_row = sibling(self.doc, self.next_row);
        self.remaining -= 1;
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ArrayIter<'_> {}

/// Iterator over object members as `(name, value)` pairs, in source order.
pub struct MemberIter<'a> {
    doc: &'a Document,
    next_row: usize,
    remaining: usize,
}

impl<'a> Iterator for MemberIter<'a> {
    type Item = (Cow<'a, str>, Element<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let name = member_name(self.doc, self.next_row);
        let value = Element::new(self.doc, self.next_row + 1);
        self.next_row = sibling(self.doc, self.next_row + 1);
        self.remaining -= 1;
        Some((name, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for MemberIter<'_> {}
