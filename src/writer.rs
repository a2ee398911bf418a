use crate::error::{Error, Result};
use crate::num::Number;
use crate::options::WriteOptions;
use crate::reader::BitStack;
use crate::text;

/// Validating token emitter over an in-memory buffer.
///
/// Tokens accumulate in an internal buffer until the caller drains it with
/// [`take_output`](Self::take_output) or [`flush_to`](Self::flush_to);
/// [`bytes_pending`](Self::bytes_pending) is what the streaming engine
/// checks its flush budget against. Emitting a structurally impossible
/// token (a property name outside an object, a second root value, an end
/// with no matching start) is a programming error and panics; exceeding
/// the configured depth is a data error and returns [`ErrorKind::DepthExceeded`].
///
/// [`ErrorKind::DepthExceeded`]: crate::ErrorKind::DepthExceeded
pub struct TokenWriter {
    out: Vec<u8>,
    stack: BitStack,
    options: WriteOptions,
    indent_cache: Vec<u8>,
    root_started: bool,
    pending_name: bool,
    needs_separator: bool,
    flushed: usize,
}

impl TokenWriter {
    pub fn new(options: WriteOptions) -> Self {
        Self {
            out: Vec::new(),
            stack: BitStack::default(),
            options,
            indent_cache: Vec::new(),
            root_started: false,
            pending_name: false,
            needs_separator: false,
            flushed: 0,
        }
    }

    pub fn write_start_object(&mut self) -> Result<()> {
        self.start_container(true)
    }

    pub fn write_start_array(&mut self) -> Result<()> {
        self.start_container(false)
    }

    pub fn write_end_object(&mut self) {
        self.end_container(true);
    }

    pub fn write_end_array(&mut self) {
        self.end_container(false);
    }

    pub fn write_property_name(&mut self, name: &str) {
        self.before_name();
        text::escape_into(&mut self.out, name);
        self.finish_name();
    }

    pub fn write_string(&mut self, value: &str) {
        self.before_value();
        self.out.push(b'"');
        text::escape_into(&mut self.out, value);
        self.out.push(b'"');
    }

    pub fn write_number(&mut self, value: &Number) {
        self.before_value();
        value.write_into(&mut self.out);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.before_value();
        let mut scratch = itoa::Buffer::new();
        self.out.extend_from_slice(scratch.format(value).as_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.before_value();
        let mut scratch = itoa::Buffer::new();
        self.out.extend_from_slice(scratch.format(value).as_bytes());
    }

    /// Fails with [`ErrorKind::NumberFormat`] for NaN and infinities,
    /// which have no token representation.
    ///
    /// [`ErrorKind::NumberFormat`]: crate::ErrorKind::NumberFormat
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::number_format(value));
        }
        self.before_value();
        let mut scratch = ryu::Buffer::new();
        self.out
            .extend_from_slice(scratch.format_finite(value).as_bytes());
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) {
        self.before_value();
        self.out
            .extend_from_slice(if value { b"true" } else { b"false" });
    }

    pub fn write_null(&mut self) {
        self.before_value();
        self.out.extend_from_slice(b"null");
    }

    /// Emit a number as a quoted string, for targets configured to write
    /// numbers in string form.
    pub fn write_number_as_string(&mut self, value: &Number) {
        self.before_value();
        self.out.push(b'"');
        value.write_into(&mut self.out);
        self.out.push(b'"');
    }

    /// Re-emit number text already validated by the reader.
    pub(crate) fn write_raw_number(&mut self, text: &[u8]) {
        self.before_value();
        self.out.extend_from_slice(text);
    }

    /// Re-emit string payload bytes in their source form, escapes intact.
    pub(crate) fn write_raw_string(&mut self, payload: &[u8]) {
        self.before_value();
        self.out.push(b'"');
        self.out.extend_from_slice(payload);
        self.out.push(b'"');
    }

    /// Re-emit property-name payload bytes in their source form.
    pub(crate) fn write_raw_name(&mut self, payload: &[u8]) {
        self.before_name();
        self.out.extend_from_slice(payload);
        self.finish_name();
    }

    /// Bytes buffered and not yet drained.
    pub fn bytes_pending(&self) -> usize {
        self.out.len()
    }

    /// Total bytes emitted so far, drained or not.
    pub fn bytes_written(&self) -> usize {
        self.flushed + self.out.len()
    }

    pub fn should_flush(&self, budget: usize) -> bool {
        self.out.len() >= budget
    }

    /// Drain the buffered output, leaving the writer ready to continue.
    pub fn take_output(&mut self) -> Vec<u8> {
        self.flushed += self.out.len();
        std::mem::take(&mut self.out)
    }

    /// Drain the buffered output into an [`std::io::Write`] sink.
    pub fn flush_to(&mut self, sink: &mut dyn std::io::Write) -> Result<usize> {
        sink.write_all(&self.out)?;
        let drained = self.out.len();
        self.flushed += drained;
        self.out.clear();
        Ok(drained)
    }

    /// Consume the writer and return everything still buffered.
    pub fn into_output(self) -> Vec<u8> {
        self.out
    }

    pub fn output(&self) -> &[u8] {
        &self.out
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// True once exactly one complete root value has been written.
    pub fn is_complete(&self) -> bool {
        self.root_started && self.stack.is_empty() && !self.pending_name
    }

    fn start_container(&mut self, object: bool) -> Result<()> {
        if self.stack.len() >= self.options.max_depth {
            return Err(Error::depth_exceeded(self.options.max_depth));
        }
        self.before_value();
        self.out.push(if object { b'{' } else { b'[' });
        self.stack.push(object);
        self.needs_separator = false;
        Ok(())
    }

    fn end_container(&mut self, object: bool) {
        if self.pending_name {
            panic!("container closed while a property name is awaiting its value");
        }
        match self.stack.pop() {
            Some(kind) if kind == object => {}
            Some(_) => panic!("closing token does not match the open container"),
            None => panic!("closing token with no open container"),
        }
        if self.needs_separator {
            self.newline_indent(self.stack.len());
        }
        self.out.push(if object { b'}' } else { b']' });
        self.needs_separator = true;
    }

    fn before_value(&mut self) {
        if self.pending_name {
            self.pending_name = false;
            self.needs_separator = true;
            return;
        }
        match self.stack.peek() {
            None => {
                if self.root_started {
                    panic!("second root value written");
                }
                self.root_started = true;
            }
            Some(true) => panic!("value written inside an object without a property name"),
            Some(false) => {
                if self.needs_separator {
                    self.out.push(b',');
                }
                self.newline_indent(self.stack.len());
            }
        }
        // The value now beginning makes the next sibling need a comma;
        // start_container re-clears for its own interior.
        self.needs_separator = true;
    }

    fn before_name(&mut self) {
        match self.stack.peek() {
            Some(true) => {}
            _ => panic!("property name written outside an object"),
        }
        if self.pending_name {
            panic!("property name written while another awaits its value");
        }
        if self.needs_separator {
            self.out.push(b',');
        }
        self.newline_indent(self.stack.len());
        self.out.push(b'"');
    }

    fn finish_name(&mut self) {
        self.out.push(b'"');
        self.out.push(b':');
        if self.options.indent.is_some() {
            self.out.push(b' ');
        }
        self.pending_name = true;
        self.needs_separator = false;
    }

    fn newline_indent(&mut self, depth: usize) {
        let Some(width) = self.options.indent else {
            return;
        };
        let total = depth * width;
        if self.indent_cache.len() < total {
            self.indent_cache.resize(total, b' ');
        }
        self.out.push(b'\n');
        self.out.extend_from_slice(&self.indent_cache[..total]);
    }
}
