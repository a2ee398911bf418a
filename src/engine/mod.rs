//! Conversion entry points: one-shot functions over complete input, and
//! push/pull sessions for input and output that arrive in pieces.
//!
//! Contracts are resolved against [`Registry::global`] once per session and
//! cached, so repeated conversions of the same type pay no lookup cost.

mod read;
mod write;

use std::any::Any;
use std::io;
use std::marker::PhantomData;

use crate::contract::{downcast_value, Registry, Shaped};
use crate::error::{Error, Result};
use crate::options::{ParseOptions, TypedOptions, WriteOptions};
use crate::reader::{ReaderState, TokenReader};
use crate::text;
use crate::writer::TokenWriter;

use self::read::ReadEngine;
use self::write::WriteEngine;

/// Decode a value from a complete string.
pub fn from_str<T: Shaped + Any + Send>(text: &str) -> Result<T> {
    from_slice(text.as_bytes())
}

pub fn from_str_with_options<T: Shaped + Any + Send>(
    text: &str,
    parse: &ParseOptions,
    typed: &TypedOptions,
) -> Result<T> {
    from_slice_with_options(text.as_bytes(), parse, typed)
}

/// Decode a value from complete input bytes.
pub fn from_slice<T: Shaped + Any + Send>(bytes: &[u8]) -> Result<T> {
    from_slice_with_options(bytes, &ParseOptions::default(), &TypedOptions::default())
}

pub fn from_slice_with_options<T: Shaped + Any + Send>(
    bytes: &[u8],
    parse: &ParseOptions,
    typed: &TypedOptions,
) -> Result<T> {
    let mut engine = ReadEngine::for_type::<T>(*parse, *typed);
    let mut reader = TokenReader::new(bytes, true, *parse);
    if !engine.run(&mut reader)? {
        return Err(Error::unexpected_end(reader.consumed()));
    }
    // Anything left over besides trivia is an error.
    while reader.read()? {}
    let boxed = match engine.take_result() {
        Some(boxed) => boxed,
        None => panic!("engine completed without a value"),
    };
    Ok(downcast_value::<T>(boxed, "decoded root"))
}

/// Decode a value from an [`io::Read`], buffering it whole first.
pub fn from_reader<T: Shaped + Any + Send>(reader: impl io::Read) -> Result<T> {
    from_reader_with_options(reader, &ParseOptions::default(), &TypedOptions::default())
}

pub fn from_reader_with_options<T: Shaped + Any + Send>(
    mut reader: impl io::Read,
    parse: &ParseOptions,
    typed: &TypedOptions,
) -> Result<T> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    from_slice_with_options(&bytes, parse, typed)
}

/// Encode a value as a string.
pub fn to_string<T: Shaped + Any + Send>(value: &T) -> Result<String> {
    to_string_with_options(value, &WriteOptions::default(), &TypedOptions::default())
}

pub fn to_string_with_options<T: Shaped + Any + Send>(
    value: &T,
    options: &WriteOptions,
    typed: &TypedOptions,
) -> Result<String> {
    text::into_string(to_vec_with_options(value, options, typed)?)
}

/// Encode a value as bytes.
pub fn to_vec<T: Shaped + Any + Send>(value: &T) -> Result<Vec<u8>> {
    to_vec_with_options(value, &WriteOptions::default(), &TypedOptions::default())
}

pub fn to_vec_with_options<T: Shaped + Any + Send>(
    value: &T,
    options: &WriteOptions,
    typed: &TypedOptions,
) -> Result<Vec<u8>> {
    let mut writer = TokenWriter::new(*options);
    let handle = Registry::global().resolve::<T>();
    write::write_root(&handle, value, &mut writer, typed)?;
    Ok(writer.into_output())
}

/// Encode a value into an [`io::Write`].
pub fn to_writer<W: io::Write, T: Shaped + Any + Send>(writer: W, value: &T) -> Result<()> {
    to_writer_with_options(writer, value, &WriteOptions::default(), &TypedOptions::default())
}

pub fn to_writer_with_options<W: io::Write, T: Shaped + Any + Send>(
    mut sink: W,
    value: &T,
    options: &WriteOptions,
    typed: &TypedOptions,
) -> Result<()> {
    let bytes = to_vec_with_options(value, options, typed)?;
    sink.write_all(&bytes)?;
    Ok(())
}

/// Outcome of feeding a chunk into a [`StreamReader`].
#[derive(Debug)]
pub enum Status<T> {
    /// The value is not complete yet; feed more input.
    NeedMore,
    /// The value completed. The session is over.
    Done(T),
}

enum Session {
    Active,
    Finished,
    Failed,
}

/// Push-based decoding session: feed input chunks as they arrive, get the
/// value back the moment it is complete.
///
/// Progress is never lost between chunks. A token split across a chunk
/// boundary is re-read in full once the rest arrives; everything already
/// consumed stays consumed.
///
/// ```
/// # use rowjson::{StreamReader, Status};
/// let mut session = StreamReader::<Vec<u32>>::new();
/// assert!(matches!(session.feed(b"[1,2").unwrap(), Status::NeedMore));
/// match session.feed(b",3]").unwrap() {
///     Status::Done(v) => assert_eq!(v, vec![1, 2, 3]),
///     Status::NeedMore => unreachable!(),
/// }
/// ```
pub struct StreamReader<T: Shaped> {
    engine: ReadEngine,
    state: ReaderState,
    pending: Vec<u8>,
    fed: usize,
    session: Session,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Shaped + Any + Send> StreamReader<T> {
    pub fn new() -> Self {
        Self::with_options(&ParseOptions::default(), &TypedOptions::default())
    }

    pub fn with_options(parse: &ParseOptions, typed: &TypedOptions) -> Self {
        Self {
            engine: ReadEngine::for_type::<T>(*parse, *typed),
            state: ReaderState::new(*parse),
            pending: Vec::new(),
            fed: 0,
            session: Session::Active,
            _marker: PhantomData,
        }
    }

    /// Feed the next chunk. Returns [`Status::Done`] as soon as the value
    /// completes, even if more input would follow.
    ///
    /// # Panics
    ///
    /// Panics if the session already completed or failed.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Status<T>> {
        self.advance(bytes, false)
    }

    /// Feed the last chunk (possibly empty) and require completion. A value
    /// still open at the end of final input is an
    /// [`ErrorKind::UnexpectedEnd`](crate::ErrorKind::UnexpectedEnd).
    ///
    /// # Panics
    ///
    /// Panics if the session already completed or failed.
    pub fn finish(&mut self, bytes: &[u8]) -> Result<Status<T>> {
        self.advance(bytes, true)
    }

    fn advance(&mut self, bytes: &[u8], is_final: bool) -> Result<Status<T>> {
        match self.session {
            Session::Active => {}
            Session::Finished => panic!("stream session already produced its value"),
            Session::Failed => panic!("stream session already failed"),
        }
        self.pending.extend_from_slice(bytes);
        self.fed += bytes.len();
        let mut reader = TokenReader::resume(&self.pending, is_final, self.state.clone());
        let outcome = self.engine.run(&mut reader).and_then(|done| {
            if done {
                // Reject trailing input in the same chunk as the value end.
                while reader.read()? {}
            }
            Ok(done)
        });
        match outcome {
            Err(error) => {
                self.session = Session::Failed;
                Err(error)
            }
            Ok(done) => {
                let consumed = reader.consumed();
                self.state = reader.save_state();
                self.state.advance_base(consumed);
                self.pending.drain(..consumed);
                if done {
                    self.session = Session::Finished;
                    let boxed = match self.engine.take_result() {
                        Some(boxed) => boxed,
                        None => panic!("engine completed without a value"),
                    };
                    Ok(Status::Done(downcast_value::<T>(boxed, "decoded root")))
                } else if is_final {
                    self.session = Session::Failed;
                    Err(Error::unexpected_end(self.fed))
                } else {
                    Ok(Status::NeedMore)
                }
            }
        }
    }
}

impl<T: Shaped + Any + Send> Default for StreamReader<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull-based encoding session over a borrowed value: each call to
/// [`next_chunk`](Self::next_chunk) emits whole elements until at least
/// `budget` bytes are pending, then hands them out.
///
/// Chunks are clean prefixes of the final document; concatenated they are
/// byte-identical to the one-shot encoding. A budget of zero degrades to
/// one element per chunk.
///
/// ```
/// # use rowjson::StreamWriter;
/// let value = vec![1u32, 2, 3];
/// let mut session = StreamWriter::new(&value, 1);
/// let mut out = Vec::new();
/// while let Some(chunk) = session.next_chunk().unwrap() {
///     out.extend_from_slice(chunk);
/// }
/// assert_eq!(out, b"[1,2,3]");
/// ```
pub struct StreamWriter<'v, T: Shaped> {
    engine: WriteEngine<'v>,
    writer: TokenWriter,
    budget: usize,
    chunk: Vec<u8>,
    done: bool,
    _marker: PhantomData<fn(&'v T)>,
}

impl<'v, T: Shaped + Any + Send> StreamWriter<'v, T> {
    pub fn new(value: &'v T, budget: usize) -> Self {
        Self::with_options(value, budget, &WriteOptions::default(), &TypedOptions::default())
    }

    pub fn with_options(
        value: &'v T,
        budget: usize,
        options: &WriteOptions,
        typed: &TypedOptions,
    ) -> Self {
        Self {
            engine: WriteEngine::new(Registry::global().resolve::<T>(), value, *typed),
            writer: TokenWriter::new(*options),
            budget,
            chunk: Vec::new(),
            done: false,
            _marker: PhantomData,
        }
    }

    /// Produce the next chunk, or `None` once the document is complete.
    /// The returned slice stays valid until the next call.
    pub fn next_chunk(&mut self) -> Result<Option<&[u8]>> {
        while !self.done {
            if !self.engine.step(&mut self.writer)? {
                self.done = true;
            }
            if self.writer.should_flush(self.budget) {
                break;
            }
        }
        self.chunk = self.writer.take_output();
        if self.chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(&self.chunk))
        }
    }

    /// Total bytes handed out so far.
    pub fn bytes_written(&self) -> usize {
        self.writer.bytes_written() - self.writer.bytes_pending()
    }
}
