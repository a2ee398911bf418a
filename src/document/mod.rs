//! Read-only random-access view of one parsed value.
//!
//! [`Document`] owns the input bytes together with a flat table of packed
//! rows, one per token. Navigation never re-tokenizes: every container row
//! records how many rows its subtree spans, so skipping a sibling is one
//! addition, and scalar payloads are decoded lazily from the recorded byte
//! spans when a cursor asks for them.

mod element;
mod rows;

pub use element::{ArrayIter, Element, MemberIter, ValueKind};

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::options::ParseOptions;
use crate::reader::{TokenKind, TokenReader};
use rows::{DbRow, MAX_PAYLOAD, MAX_ROWS};

pub struct Document {
    buf: Vec<u8>,
    rows: Vec<DbRow>,
}

struct OpenContainer {
    row: usize,
    children: u32,
    complex: bool,
}

impl Document {
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_slice(text.as_bytes())
    }

    pub fn parse_with_options(text: &str, options: ParseOptions) -> Result<Self> {
        Self::parse_slice_with_options(text.as_bytes(), options)
    }

    pub fn parse_slice(bytes: &[u8]) -> Result<Self> {
        Self::parse_slice_with_options(bytes, ParseOptions::default())
    }

    pub fn parse_slice_with_options(bytes: &[u8], options: ParseOptions) -> Result<Self> {
        if bytes.len() > u32::MAX as usize {
            return Err(Error::not_supported(
                "input larger than the 4 GiB the row table can address",
            ));
        }
        let mut rows = Vec::new();
        let mut open: SmallVec<[OpenContainer; 16]> = SmallVec::new();
        let mut reader = TokenReader::new(bytes, true, options);
        while reader.read()? {
            let kind = reader.kind();
            let offset = reader.token_offset() as u32;
            match kind {
                TokenKind::StartObject | TokenKind::StartArray => {
                    let row = push_row(&mut rows, DbRow::new(kind, offset, 0, false))?;
                    open.push(OpenContainer {
                        row,
                        children: 0,
                        complex: false,
                    });
                }
                TokenKind::EndObject | TokenKind::EndArray => {
                    let end = push_row(&mut rows, DbRow::new(kind, offset, 0, false))?;
                    // The loop only ever sees an end token after the
                    // matching start pushed a frame.
                    if let Some(frame) = open.pop() {
                        rows[frame.row].patch_container(
                            frame.children,
                            (end - frame.row) as u32,
                            frame.complex,
                        );
                        child_done(&mut open, true);
                    }
                }
                TokenKind::PropertyName => {
                    let payload = reader.payload();
                    push_payload_row(&mut rows, &reader, kind, payload)?;
                }
                TokenKind::String => {
                    let payload = reader.payload();
                    push_payload_row(&mut rows, &reader, kind, payload)?;
                    child_done(&mut open, false);
                }
                TokenKind::Number => {
                    let payload = reader.payload();
                    push_payload_row(&mut rows, &reader, kind, payload)?;
                    child_done(&mut open, false);
                }
                TokenKind::True | TokenKind::False | TokenKind::Null => {
                    let len = reader.payload().len() as u32;
                    push_row(&mut rows, DbRow::new(kind, offset, len, false))?;
                    child_done(&mut open, false);
                }
                TokenKind::None => {}
            }
        }
        Ok(Self {
            buf: bytes.to_vec(),
            rows,
        })
    }

    /// Cursor over the root value.
    pub fn root(&self) -> Element<'_> {
        Element::new(self, 0)
    }

    /// Compact text for the whole document, escapes and number text
    /// preserved from the input.
    pub fn to_text(&self) -> Result<String> {
        self.to_text_with_options(crate::WriteOptions::default())
    }

    pub fn to_text_with_options(&self, options: crate::WriteOptions) -> Result<String> {
        let mut writer = crate::TokenWriter::new(options);
        self.root().write_to(&mut writer)?;
        crate::text::into_string(writer.into_output())
    }

    pub(crate) fn row(&self, index: usize) -> DbRow {
        self.rows[index]
    }

    pub(crate) fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn bytes(&self, start: usize, end: usize) -> &[u8] {
        &self.buf[start..end]
    }

    /// Payload bytes recorded for a scalar or property-name row.
    pub(crate) fn payload(&self, index: usize) -> &[u8] {
        let row = self.rows[index];
        &self.buf[row.offset()..row.offset() + row.size_or_length()]
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("bytes", &self.buf.len())
            .field("rows", &self.row_count())
            .finish()
    }
}

fn push_row(rows: &mut Vec<DbRow>, row: DbRow) -> Result<usize> {
    if rows.len() >= MAX_ROWS {
        return Err(Error::not_supported(
            "document holds more values than the row table can index",
        ));
    }
    rows.push(row);
    Ok(rows.len() - 1)
}

fn push_payload_row(
    rows: &mut Vec<DbRow>,
    reader: &TokenReader<'_>,
    kind: TokenKind,
    payload: &[u8],
) -> Result<usize> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::not_supported("value longer than 2 GiB"));
    }
    let offset = match kind {
        // Strings and names record the payload span inside the quotes.
        TokenKind::String | TokenKind::PropertyName => reader.token_offset() + 1,
        _ => reader.token_offset(),
    };
    let flag = reader.string_has_escapes();
    push_row(
        rows,
        DbRow::new(kind, offset as u32, payload.len() as u32, flag),
    )
}

fn child_done(open: &mut SmallVec<[OpenContainer; 16]>, complex: bool) {
    if let Some(top) = open.last_mut() {
        top.children += 1;
        if complex {
            top.complex = true;
        }
    }
}
