use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::options::{CommentHandling, ParseOptions};
use crate::text;

/// Kind of the token the reader is currently positioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Before the first `read` or after the document completed.
    None,
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    PropertyName,
    String,
    Number,
    True,
    False,
    Null,
}

impl TokenKind {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            TokenKind::None => "end of input",
            TokenKind::StartObject | TokenKind::EndObject => "object",
            TokenKind::StartArray | TokenKind::EndArray => "array",
            TokenKind::PropertyName => "property name",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::True | TokenKind::False => "boolean",
            TokenKind::Null => "null",
        }
    }
}

/// One bit per open container: set = object, clear = array.
#[derive(Debug, Clone, Default)]
pub(crate) struct BitStack {
    words: SmallVec<[u64; 2]>,
    len: usize,
}

impl BitStack {
    pub fn push(&mut self, object: bool) {
        let word = self.len / 64;
        let bit = self.len % 64;
        if word == self.words.len() {
            self.words.push(0);
        }
        if object {
            self.words[word] |= 1 << bit;
        } else {
            self.words[word] &= !(1 << bit);
        }
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<bool> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.words[self.len / 64] >> (self.len % 64) & 1 == 1)
    }

    pub fn peek(&self) -> Option<bool> {
        if self.len == 0 {
            return None;
        }
        let top = self.len - 1;
        Some(self.words[top / 64] >> (top % 64) & 1 == 1)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// What the reader expects next, between tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Expect the root value.
    RootValue,
    /// Immediately inside a `{` or `[`: first member/element or close.
    ContainerFirst,
    /// A property name was read: expect its value.
    MemberValue,
    /// A value completed: expect separator, close, or end of document.
    AfterValue,
}

/// Resumable tokenizer state. Carrying a saved state to a new
/// [`TokenReader`] over a longer buffer continues tokenization exactly
/// where the previous reader stopped.
#[derive(Debug, Clone)]
pub struct ReaderState {
    phase: Phase,
    stack: BitStack,
    base: usize,
    options: ParseOptions,
}

impl ReaderState {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            phase: Phase::RootValue,
            stack: BitStack::default(),
            base: 0,
            options,
        }
    }

    /// Shift the absolute offset of the buffer start, used by streaming
    /// callers after discarding consumed bytes.
    pub fn advance_base(&mut self, consumed: usize) {
        self.base += consumed;
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }
}

#[derive(Debug, Clone, Copy)]
struct TokenInfo {
    kind: TokenKind,
    start: usize,
    payload_start: usize,
    payload_end: usize,
    raw_end: usize,
    has_escapes: bool,
}

const NO_TOKEN: TokenInfo = TokenInfo {
    kind: TokenKind::None,
    start: 0,
    payload_start: 0,
    payload_end: 0,
    raw_end: 0,
    has_escapes: false,
};

#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    state: ReaderState,
    consumed: usize,
    token: TokenInfo,
}

/// Pull tokenizer over a byte buffer.
///
/// `read` either yields a complete token or consumes nothing: when the
/// buffer ends inside a token and `is_final_block` is false, the caller
/// re-presents the unconsumed tail (see [`consumed`](Self::consumed))
/// plus more bytes, and tokenization resumes byte-identically. This is
/// the crate's single suspension mechanism on the read side.
pub struct TokenReader<'a> {
    buf: &'a [u8],
    is_final: bool,
    state: ReaderState,
    consumed: usize,
    token: TokenInfo,
}

impl<'a> TokenReader<'a> {
    pub fn new(buf: &'a [u8], is_final: bool, options: ParseOptions) -> Self {
        Self::resume(buf, is_final, ReaderState::new(options))
    }

    pub fn resume(buf: &'a [u8], is_final: bool, state: ReaderState) -> Self {
        Self {
            buf,
            is_final,
            state,
            consumed: 0,
            token: NO_TOKEN,
        }
    }

    /// Advance to the next token.
    ///
    /// `Ok(true)`: a token is available through the accessors.
    /// `Ok(false)`: no token, because either the document is complete
    /// ([`is_complete`](Self::is_complete)) or more input is needed (only
    /// when `is_final_block` is false). Nothing was consumed in the
    /// need-more case.
    pub fn read(&mut self) -> Result<bool> {
        let mut pos = self.consumed;
        match self.read_at(&mut pos)? {
            Some(()) => {
                self.consumed = pos;
                Ok(true)
            }
            None => {
                if self.is_complete() {
                    self.token = NO_TOKEN;
                    Ok(false)
                } else if self.is_final {
                    Err(Error::unexpected_end(self.off(self.buf.len())))
                } else {
                    Ok(false)
                }
            }
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.token.kind
    }

    /// Raw bytes of the current token (quotes included for strings; the
    /// colon after a property name is not part of its raw slice).
    pub fn raw_slice(&self) -> &'a [u8] {
        &self.buf[self.token.start..self.token.raw_end]
    }

    /// Payload bytes: string/name content without quotes, number text,
    /// literal text.
    pub fn payload(&self) -> &'a [u8] {
        &self.buf[self.token.payload_start..self.token.payload_end]
    }

    pub fn string_has_escapes(&self) -> bool {
        self.token.has_escapes
    }

    /// Decoded text of the current String/PropertyName token.
    pub fn unescaped_str(&self) -> Result<std::borrow::Cow<'a, str>> {
        let payload = self.payload();
        if self.token.has_escapes {
            Ok(std::borrow::Cow::Owned(text::unescape(
                payload,
                self.off(self.token.payload_start),
            )?))
        } else {
            let s = std::str::from_utf8(payload).map_err(|e| {
                Error::syntax(
                    "invalid utf-8 in string",
                    self.off(self.token.payload_start + e.valid_up_to()),
                )
            })?;
            Ok(std::borrow::Cow::Borrowed(s))
        }
    }

    /// Bytes consumed through the end of the current token.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Open-container depth after the current token.
    pub fn depth(&self) -> usize {
        self.state.stack.len()
    }

    /// Absolute offset of the current token's first byte.
    pub fn token_offset(&self) -> usize {
        self.off(self.token.start)
    }

    /// True once the root value has been fully read.
    pub fn is_complete(&self) -> bool {
        self.state.phase == Phase::AfterValue && self.state.stack.is_empty()
    }

    pub fn save_state(&self) -> ReaderState {
        self.state.clone()
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            state: self.state.clone(),
            consumed: self.consumed,
            token: self.token,
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        self.state = checkpoint.state;
        self.consumed = checkpoint.consumed;
        self.token = checkpoint.token;
    }

    /// Consume the next value (scalar or whole subtree) and return its raw
    /// text along with the absolute offset where it starts. `Ok(None)` means
    /// the subtree is not fully buffered yet; the reader is rolled back and
    /// nothing is consumed.
    pub(crate) fn read_value_span(&mut self) -> Result<Option<(&'a [u8], usize)>> {
        let checkpoint = self.checkpoint();
        if !self.read()? {
            self.restore(checkpoint);
            return Ok(None);
        }
        let start = self.token.start;
        if matches!(self.token.kind, TokenKind::StartObject | TokenKind::StartArray) {
            let target = self.state.stack.len() - 1;
            loop {
                if !self.read()? {
                    self.restore(checkpoint);
                    return Ok(None);
                }
                if self.state.stack.len() == target
                    && matches!(self.token.kind, TokenKind::EndObject | TokenKind::EndArray)
                {
                    break;
                }
            }
        }
        Ok(Some((&self.buf[start..self.token.raw_end], self.off(start))))
    }

    /// Skip the next value without surfacing its tokens. Same buffering
    /// contract as [`read_value_span`](Self::read_value_span).
    pub(crate) fn skip_next_value(&mut self) -> Result<bool> {
        Ok(self.read_value_span()?.is_some())
    }

    fn off(&self, pos: usize) -> usize {
        self.state.base + pos
    }

    fn read_at(&mut self, pos: &mut usize) -> Result<Option<()>> {
        let Some(p) = self.skip_trivia(*pos)? else {
            return Ok(None);
        };
        *pos = p;
        match self.state.phase {
            Phase::RootValue | Phase::MemberValue => self.read_value(pos),
            Phase::ContainerFirst => {
                if matches!(self.state.stack.peek(), Some(true)) {
                    match self.buf[*pos] {
                        b'}' => self.commit_end(pos, true),
                        b'"' => self.read_property_name(pos),
                        other => Err(self.unexpected(other, *pos, "a property name or `}`")),
                    }
                } else {
                    match self.buf[*pos] {
                        b']' => self.commit_end(pos, false),
                        _ => self.read_value(pos),
                    }
                }
            }
            Phase::AfterValue => match self.state.stack.peek() {
                None => Err(Error::syntax(
                    "unexpected characters after the root value",
                    self.off(*pos),
                )),
                Some(true) => match self.buf[*pos] {
                    b'}' => self.commit_end(pos, true),
                    b',' => {
                        let comma = *pos;
                        let Some(p) = self.skip_trivia(*pos + 1)? else {
                            return Ok(None);
                        };
                        *pos = p;
                        match self.buf[*pos] {
                            b'}' if self.state.options.allow_trailing_commas => {
                                self.commit_end(pos, true)
                            }
                            b'}' => Err(Error::trailing_comma(self.off(comma))),
                            b'"' => self.read_property_name(pos),
                            other => Err(self.unexpected(other, *pos, "a property name")),
                        }
                    }
                    other => Err(self.unexpected(other, *pos, "`,` or `}`")),
                },
                Some(false) => match self.buf[*pos] {
                    b']' => self.commit_end(pos, false),
                    b',' => {
                        let comma = *pos;
                        let Some(p) = self.skip_trivia(*pos + 1)? else {
                            return Ok(None);
                        };
                        *pos = p;
                        match self.buf[*pos] {
                            b']' if self.state.options.allow_trailing_commas => {
                                self.commit_end(pos, false)
                            }
                            b']' => Err(Error::trailing_comma(self.off(comma))),
                            _ => self.read_value(pos),
                        }
                    }
                    other => Err(self.unexpected(other, *pos, "`,` or `]`")),
                },
            },
        }
    }

    fn unexpected(&self, byte: u8, pos: usize, expected: &str) -> Error {
        Error::syntax(
            format!("unexpected `{}`, expected {expected}", byte as char),
            self.off(pos),
        )
    }

    /// Skip whitespace and (when enabled) comments. `Ok(None)` means the
    /// buffer was exhausted at a token boundary.
    fn skip_trivia(&self, mut p: usize) -> Result<Option<usize>> {
        let len = self.buf.len();
        loop {
            while p < len && matches!(self.buf[p], b' ' | b'\t' | b'\n' | b'\r') {
                p += 1;
            }
            if p >= len {
                return Ok(None);
            }
            if self.buf[p] != b'/' {
                return Ok(Some(p));
            }
            let Some(&marker) = self.buf.get(p + 1) else {
                if self.is_final {
                    return Err(Error::syntax("unexpected `/`", self.off(p)));
                }
                return Ok(None);
            };
            if marker != b'/' && marker != b'*' {
                return Err(Error::syntax("unexpected `/`", self.off(p)));
            }
            if self.state.options.comment_handling == CommentHandling::Disallow {
                return Err(Error::comment_disallowed(self.off(p)));
            }
            if marker == b'/' {
                match memchr::memchr(b'\n', &self.buf[p + 2..]) {
                    Some(rel) => p += 2 + rel + 1,
                    // A line comment may legally end at end of input.
                    None => return Ok(None),
                }
            } else {
                match memchr::memmem::find(&self.buf[p + 2..], b"*/") {
                    Some(rel) => p += 2 + rel + 2,
                    None => {
                        if self.is_final {
                            return Err(Error::syntax(
                                "unterminated block comment",
                                self.off(p),
                            ));
                        }
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn read_value(&mut self, pos: &mut usize) -> Result<Option<()>> {
        match self.buf[*pos] {
            b'{' => self.commit_start(pos, true),
            b'[' => self.commit_start(pos, false),
            b'"' => {
                let start = *pos;
                let Some(scan) = self.scan_string(*pos)? else {
                    return Ok(None);
                };
                self.token = TokenInfo {
                    kind: TokenKind::String,
                    start,
                    payload_start: scan.payload_start,
                    payload_end: scan.payload_end,
                    raw_end: scan.payload_end + 1,
                    has_escapes: scan.has_escapes,
                };
                *pos = scan.payload_end + 1;
                self.state.phase = Phase::AfterValue;
                Ok(Some(()))
            }
            b't' => self.commit_literal(pos, b"true", TokenKind::True),
            b'f' => self.commit_literal(pos, b"false", TokenKind::False),
            b'n' => self.commit_literal(pos, b"null", TokenKind::Null),
            b'-' | b'0'..=b'9' => {
                let start = *pos;
                let Some(end) = self.scan_number(*pos)? else {
                    return Ok(None);
                };
                self.token = TokenInfo {
                    kind: TokenKind::Number,
                    start,
                    payload_start: start,
                    payload_end: end,
                    raw_end: end,
                    has_escapes: false,
                };
                *pos = end;
                self.state.phase = Phase::AfterValue;
                Ok(Some(()))
            }
            other => Err(self.unexpected(other, *pos, "a value")),
        }
    }

    fn commit_start(&mut self, pos: &mut usize, object: bool) -> Result<Option<()>> {
        if self.state.stack.len() >= self.state.options.max_depth {
            return Err(
                Error::depth_exceeded(self.state.options.max_depth).with_offset(self.off(*pos))
            );
        }
        self.state.stack.push(object);
        self.token = TokenInfo {
            kind: if object {
                TokenKind::StartObject
            } else {
                TokenKind::StartArray
            },
            start: *pos,
            payload_start: *pos,
            payload_end: *pos + 1,
            raw_end: *pos + 1,
            has_escapes: false,
        };
        *pos += 1;
        self.state.phase = Phase::ContainerFirst;
        Ok(Some(()))
    }

    fn commit_end(&mut self, pos: &mut usize, object: bool) -> Result<Option<()>> {
        self.state.stack.pop();
        self.token = TokenInfo {
            kind: if object {
                TokenKind::EndObject
            } else {
                TokenKind::EndArray
            },
            start: *pos,
            payload_start: *pos,
            payload_end: *pos + 1,
            raw_end: *pos + 1,
            has_escapes: false,
        };
        *pos += 1;
        self.state.phase = Phase::AfterValue;
        Ok(Some(()))
    }

    fn commit_literal(
        &mut self,
        pos: &mut usize,
        literal: &'static [u8],
        kind: TokenKind,
    ) -> Result<Option<()>> {
        let start = *pos;
        let end = start + literal.len();
        let available = &self.buf[start..self.buf.len().min(end)];
        if available != &literal[..available.len()] {
            return Err(Error::syntax("invalid literal", self.off(start)));
        }
        if available.len() < literal.len() {
            if self.is_final {
                return Err(Error::syntax("invalid literal", self.off(start)));
            }
            return Ok(None);
        }
        if let Some(&after) = self.buf.get(end) {
            if !ends_token(after) {
                return Err(Error::syntax("invalid literal", self.off(start)));
            }
        } else if !self.is_final {
            return Ok(None);
        }
        self.token = TokenInfo {
            kind,
            start,
            payload_start: start,
            payload_end: end,
            raw_end: end,
            has_escapes: false,
        };
        *pos = end;
        self.state.phase = Phase::AfterValue;
        Ok(Some(()))
    }

    fn read_property_name(&mut self, pos: &mut usize) -> Result<Option<()>> {
        let start = *pos;
        let Some(scan) = self.scan_string(*pos)? else {
            return Ok(None);
        };
        let Some(p) = self.skip_trivia(scan.payload_end + 1)? else {
            return Ok(None);
        };
        if self.buf[p] != b':' {
            return Err(self.unexpected(self.buf[p], p, "`:` after a property name"));
        }
        self.token = TokenInfo {
            kind: TokenKind::PropertyName,
            start,
            payload_start: scan.payload_start,
            payload_end: scan.payload_end,
            raw_end: scan.payload_end + 1,
            has_escapes: scan.has_escapes,
        };
        *pos = p + 1;
        self.state.phase = Phase::MemberValue;
        Ok(Some(()))
    }

    /// Scan a string starting at its opening quote. Pure: mutates nothing.
    fn scan_string(&self, quote: usize) -> Result<Option<StringScan>> {
        let payload_start = quote + 1;
        let mut p = payload_start;
        let mut has_escapes = false;
        loop {
            match text::next_special(&self.buf[p..]) {
                None => {
                    // No closing quote in the buffer; check the clean tail
                    // so definitively-broken utf-8 fails now.
                    self.check_utf8_run(p, self.buf.len(), true)?;
                    if self.is_final {
                        return Err(Error::unexpected_end(self.off(self.buf.len())));
                    }
                    return Ok(None);
                }
                Some(rel) => {
                    self.check_utf8_run(p, p + rel, false)?;
                    p += rel;
                    match self.buf[p] {
                        b'"' => {
                            return Ok(Some(StringScan {
                                payload_start,
                                payload_end: p,
                                has_escapes,
                            }));
                        }
                        b'\\' => {
                            has_escapes = true;
                            match self.scan_escape(p)? {
                                Some(next) => p = next,
                                None => return Ok(None),
                            }
                        }
                        _ => {
                            return Err(Error::syntax(
                                "control character must be escaped in a string",
                                self.off(p),
                            ));
                        }
                    }
                }
            }
        }
    }

    fn check_utf8_run(&self, start: usize, end: usize, at_buffer_end: bool) -> Result<()> {
        if let Err(e) = std::str::from_utf8(&self.buf[start..end]) {
            let definite = e.error_len().is_some() || !at_buffer_end || self.is_final;
            if definite {
                return Err(Error::syntax(
                    "invalid utf-8 in string",
                    self.off(start + e.valid_up_to()),
                ));
            }
        }
        Ok(())
    }

    /// Validate one escape sequence at `backslash`; returns the position
    /// after it, or `None` when the buffer ends mid-sequence.
    fn scan_escape(&self, backslash: usize) -> Result<Option<usize>> {
        let Some(&tag) = self.buf.get(backslash + 1) else {
            return self.escape_underrun();
        };
        match tag {
            b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' => Ok(Some(backslash + 2)),
            b'u' => {
                let Some(high) = self.hex_escape(backslash + 2)? else {
                    return self.escape_underrun();
                };
                if (0xDC00..0xE000).contains(&high) {
                    return Err(Error::syntax(
                        "unpaired surrogate escape",
                        self.off(backslash),
                    ));
                }
                if !(0xD800..0xDC00).contains(&high) {
                    return Ok(Some(backslash + 6));
                }
                // High surrogate: the paired low escape must follow.
                let pair = backslash + 6;
                match self.buf.get(pair) {
                    None => return self.escape_underrun(),
                    Some(b'\\') => {}
                    Some(_) => {
                        return Err(Error::syntax(
                            "unpaired surrogate escape",
                            self.off(backslash),
                        ));
                    }
                }
                match self.buf.get(pair + 1) {
                    None => return self.escape_underrun(),
                    Some(b'u') => {}
                    Some(_) => {
                        return Err(Error::syntax(
                            "unpaired surrogate escape",
                            self.off(backslash),
                        ));
                    }
                }
                let Some(low) = self.hex_escape(pair + 2)? else {
                    return self.escape_underrun();
                };
                if !(0xDC00..0xE000).contains(&low) {
                    return Err(Error::syntax(
                        "unpaired surrogate escape",
                        self.off(backslash),
                    ));
                }
                Ok(Some(pair + 6))
            }
            _ => Err(Error::syntax("invalid escape sequence", self.off(backslash))),
        }
    }

    fn escape_underrun(&self) -> Result<Option<usize>> {
        if self.is_final {
            Err(Error::unexpected_end(self.off(self.buf.len())))
        } else {
            Ok(None)
        }
    }

    /// Parse 4 hex digits at `at`; `Ok(None)` when the buffer is short.
    fn hex_escape(&self, at: usize) -> Result<Option<u32>> {
        let Some(chunk) = self.buf.get(at..at + 4) else {
            return Ok(None);
        };
        let mut value = 0u32;
        for (i, &b) in chunk.iter().enumerate() {
            let digit = (b as char)
                .to_digit(16)
                .ok_or_else(|| Error::syntax("invalid unicode escape", self.off(at + i)))?;
            value = value * 16 + digit;
        }
        Ok(Some(value))
    }

    /// Scan a number starting at `start`. Pure. Returns the end position,
    /// or `None` when the literal may continue past the buffer.
    fn scan_number(&self, start: usize) -> Result<Option<usize>> {
        let buf = self.buf;
        let len = buf.len();
        let invalid = |at: usize| Error::syntax("invalid number literal", self.off(at));
        let mut p = start;
        if buf[p] == b'-' {
            p += 1;
        }
        match buf.get(p) {
            None => return self.number_underrun(start),
            Some(b'0') => p += 1,
            Some(b'1'..=b'9') => {
                while p < len && buf[p].is_ascii_digit() {
                    p += 1;
                }
            }
            Some(_) => return Err(invalid(p)),
        }
        if buf.get(p) == Some(&b'.') {
            p += 1;
            match buf.get(p) {
                None => return self.number_underrun(start),
                Some(d) if d.is_ascii_digit() => {
                    while p < len && buf[p].is_ascii_digit() {
                        p += 1;
                    }
                }
                Some(_) => return Err(invalid(p)),
            }
        }
        if matches!(buf.get(p), Some(b'e' | b'E')) {
            p += 1;
            if matches!(buf.get(p), Some(b'+' | b'-')) {
                p += 1;
            }
            match buf.get(p) {
                None => return self.number_underrun(start),
                Some(d) if d.is_ascii_digit() => {
                    while p < len && buf[p].is_ascii_digit() {
                        p += 1;
                    }
                }
                Some(_) => return Err(invalid(p)),
            }
        }
        match buf.get(p) {
            Some(&after) if !ends_token(after) => Err(invalid(p)),
            Some(_) => Ok(Some(p)),
            // The literal reaches the end of the buffer: with more input it
            // could still grow, so only a final block ends it here.
            None if self.is_final => Ok(Some(p)),
            None => Ok(None),
        }
    }

    fn number_underrun(&self, start: usize) -> Result<Option<usize>> {
        if self.is_final {
            Err(Error::syntax("invalid number literal", self.off(start)))
        } else {
            Ok(None)
        }
    }
}

fn ends_token(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b',' | b']' | b'}' | b'/')
}

#[derive(Debug, Clone, Copy)]
struct StringScan {
    payload_start: usize,
    payload_end: usize,
    has_escapes: bool,
}
