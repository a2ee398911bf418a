use crate::reader::TokenKind;

/// Hard caps imposed by the row encoding: 28 bits of row index, 31 bits of
/// payload length, 32 bits of buffer offset.
pub(crate) const MAX_ROWS: usize = (1 << 28) - 1;
pub(crate) const MAX_PAYLOAD: usize = 0x7FFF_FFFF;

const FLAG_BIT: u32 = 1 << 31;
const ROWS_MASK: u32 = (1 << 28) - 1;

/// One parsed token, packed into 12 bytes.
///
/// Word layout: buffer offset; payload length (31 bits) with the
/// complex-children / has-escapes flag in the top bit; token kind (4 bits)
/// over the subtree row count (28 bits). Container rows count every row
/// through their own end marker, so `row + subtree_rows()` is always the
/// index of the matching end row, and scalar rows count just themselves.
#[derive(Clone, Copy)]
pub(crate) struct DbRow {
    offset: u32,
    length_and_flag: u32,
    kind_and_rows: u32,
}

impl DbRow {
    pub fn new(kind: TokenKind, offset: u32, length: u32, flag: bool) -> Self {
        Self {
            offset,
            length_and_flag: length | if flag { FLAG_BIT } else { 0 },
            kind_and_rows: kind_code(kind) << 28 | 1,
        }
    }

    pub fn offset(self) -> usize {
        self.offset as usize
    }

    /// Element count for containers, payload byte length for scalars.
    pub fn size_or_length(self) -> usize {
        (self.length_and_flag & !FLAG_BIT) as usize
    }

    /// For containers: some child is itself a container. For strings and
    /// property names: the payload holds escape sequences.
    pub fn flag(self) -> bool {
        self.length_and_flag & FLAG_BIT != 0
    }

    pub fn kind(self) -> TokenKind {
        kind_from_code(self.kind_and_rows >> 28)
    }

    /// Rows occupied through the matching end marker (containers) or 1
    /// (scalars and end markers).
    pub fn subtree_rows(self) -> usize {
        (self.kind_and_rows & ROWS_MASK) as usize
    }

    pub fn is_container_start(self) -> bool {
        matches!(self.kind(), TokenKind::StartObject | TokenKind::StartArray)
    }

    pub fn patch_container(&mut self, children: u32, subtree_rows: u32, complex: bool) {
        self.length_and_flag = children | if complex { FLAG_BIT } else { 0 };
        self.kind_and_rows = self.kind_and_rows & !ROWS_MASK | subtree_rows;
    }
}

impl std::fmt::Debug for DbRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbRow")
            .field("kind", &self.kind())
            .field("offset", &self.offset())
            .field("size_or_length", &self.size_or_length())
            .field("flag", &self.flag())
            .field("subtree_rows", &self.subtree_rows())
            .finish()
    }
}

fn kind_code(kind: TokenKind) -> u32 {
    match kind {
        TokenKind::None => 0,
        TokenKind::StartObject => 1,
        TokenKind::EndObject => 2,
        TokenKind::StartArray => 3,
        TokenKind::EndArray => 4,
        TokenKind::PropertyName => 5,
        TokenKind::String => 6,
        TokenKind::Number => 7,
        TokenKind::True => 8,
        TokenKind::False => 9,
        TokenKind::Null => 10,
    }
}

fn kind_from_code(code: u32) -> TokenKind {
    match code {
        1 => TokenKind::StartObject,
        2 => TokenKind::EndObject,
        3 => TokenKind::StartArray,
        4 => TokenKind::EndArray,
        5 => TokenKind::PropertyName,
        6 => TokenKind::String,
        7 => TokenKind::Number,
        8 => TokenKind::True,
        9 => TokenKind::False,
        10 => TokenKind::Null,
        _ => TokenKind::None,
    }
}
