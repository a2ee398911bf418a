pub mod contract;
pub mod document;
pub mod engine;
pub mod error;
pub mod node;
pub mod num;
pub mod options;
pub mod reader;
pub mod writer;

mod serde_impls;
mod text;

pub use crate::contract::{
    BoxedValue, Contract, ContractHandle, FastWriteFn, FieldSlots, MapHooks, MemberSlot,
    ObjectBuilder, PolymorphicBuilder, Registry, SeqHooks, Shaped, Strategy, ValueCodec,
};
pub use crate::document::{ArrayIter, Document, Element, MemberIter, ValueKind};
pub use crate::engine::{
    from_reader, from_reader_with_options, from_slice, from_slice_with_options, from_str,
    from_str_with_options, to_string, to_string_with_options, to_vec, to_vec_with_options,
    to_writer, to_writer_with_options, Status, StreamReader, StreamWriter,
};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::node::{NodeEntry, NodeId, NodeMut, NodeRef, NodeTree, Scalar};
pub use crate::num::{Number, NumberHandling};
pub use crate::options::{
    CommentHandling, DuplicateMembers, ParseOptions, TypedOptions, UnknownMembers, WriteOptions,
};
pub use crate::reader::{ReaderState, TokenKind, TokenReader};
pub use crate::writer::TokenWriter;
