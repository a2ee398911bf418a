//! The typed read engine: a stack of frames mirroring the open containers
//! of the input, driven one token at a time.
//!
//! Each [`step`](ReadEngine::step) consumes at most one token (or one whole
//! buffered subtree for node-shaped values) and either makes progress or
//! reports that the input ran dry. Underrun never loses work: the reader
//! rolls the partial token back and the same step repeats when more bytes
//! arrive, which is what makes the engine resumable at any byte boundary.
//!
//! Wrapper contracts (optional, cast, variant lift) never get frames of
//! their own. Descent records them on the frame below and they are applied
//! when the underlying value folds, innermost first.

use std::any::Any;
use std::fmt::Write as _;

use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::contract::{
    effective_numbers, token_mismatch, BoxedValue, ContractHandle, FieldSlots, Registry, Shape,
    Shaped,
};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::node::NodeTree;
use crate::num::NumberHandling;
use crate::options::{DuplicateMembers, ParseOptions, TypedOptions, UnknownMembers};
use crate::reader::{Checkpoint, TokenKind, TokenReader};

/// Outcome of a single engine step.
pub(crate) enum ReadStep {
    /// A token was consumed and folded into the value under construction.
    Progress,
    /// The next token is not fully buffered; nothing was consumed.
    NeedMore,
    /// The root value is complete.
    Finished,
}

/// A wrapper recorded during descent, replayed when the value folds.
enum Wrap {
    Optional(ContractHandle),
    Cast(ContractHandle),
    Variant(ContractHandle, usize),
}

enum FrameState {
    /// Waiting for the discriminator property name.
    PolyName,
    /// Discriminator name seen, waiting for its string value.
    PolyValue,
    Seq {
        builder: BoxedValue,
        index: usize,
    },
    Map {
        builder: BoxedValue,
        pending_key: Option<SmolStr>,
    },
    Obj {
        values: Vec<Option<BoxedValue>>,
        seen: SmallVec<[u64; 1]>,
        current: Option<usize>,
        skipping: bool,
    },
}

struct ReadFrame {
    contract: ContractHandle,
    wraps: SmallVec<[Wrap; 1]>,
    /// Number handling inherited by this frame's children.
    numbers: NumberHandling,
    state: FrameState,
}

/// Where the next token lands, derived from the top frame.
enum Site {
    Root,
    SeqItem,
    MapKey,
    MapValue,
    ObjName,
    ObjValue,
    PolyName,
    PolyValue,
}

pub(crate) struct ReadEngine {
    root: ContractHandle,
    registry: &'static Registry,
    parse: ParseOptions,
    typed: TypedOptions,
    frames: Vec<ReadFrame>,
    result: Option<BoxedValue>,
    complete: bool,
}

impl ReadEngine {
    pub(crate) fn for_type<T: Shaped + Any + Send>(parse: ParseOptions, typed: TypedOptions) -> Self {
        let registry = Registry::global();
        Self {
            root: registry.resolve::<T>(),
            registry,
            parse,
            typed,
            frames: Vec::new(),
            result: None,
            complete: false,
        }
    }

    pub(crate) fn take_result(&mut self) -> Option<BoxedValue> {
        self.result.take()
    }

    /// Drive steps until the value completes or the input runs dry.
    /// `Ok(true)` means complete; trailing-input validation is the
    /// caller's business.
    pub(crate) fn run(&mut self, reader: &mut TokenReader<'_>) -> Result<bool> {
        loop {
            match self.step(reader) {
                Ok(ReadStep::Progress) => {}
                Ok(ReadStep::NeedMore) => return Ok(false),
                Ok(ReadStep::Finished) => return Ok(true),
                Err(error) => return Err(error.with_path(self.render_path())),
            }
        }
    }

    fn step(&mut self, reader: &mut TokenReader<'_>) -> Result<ReadStep> {
        if self.complete {
            return Ok(ReadStep::Finished);
        }
        // An unknown member being ignored is skipped as one whole subtree;
        // until it is buffered in full the skip stays pending.
        if self.skip_pending() {
            return if reader.skip_next_value()? {
                self.clear_skip();
                Ok(ReadStep::Progress)
            } else {
                Ok(ReadStep::NeedMore)
            };
        }

        let checkpoint = reader.checkpoint();
        if !reader.read()? {
            return Ok(ReadStep::NeedMore);
        }

        match self.site() {
            Site::Root => {
                let handle = self.root.clone();
                let numbers = effective_numbers(None, &handle, self.typed.number_handling);
                self.dispatch_value(handle, numbers, reader, checkpoint)
            }
            Site::SeqItem => {
                if reader.kind() == TokenKind::EndArray {
                    return self.finish_container(reader);
                }
                let (handle, numbers) = self.element_site();
                self.dispatch_value(handle, numbers, reader, checkpoint)
            }
            Site::MapKey => match reader.kind() {
                TokenKind::EndObject => self.finish_container(reader),
                TokenKind::PropertyName => {
                    let key = SmolStr::from(reader.unescaped_str()?.as_ref());
                    if let Some(ReadFrame {
                        state: FrameState::Map { pending_key, .. },
                        ..
                    }) = self.frames.last_mut()
                    {
                        *pending_key = Some(key);
                    }
                    Ok(ReadStep::Progress)
                }
                other => unreachable!("member position produced {other:?}"),
            },
            Site::MapValue => {
                let (handle, numbers) = self.dictionary_value_site();
                self.dispatch_value(handle, numbers, reader, checkpoint)
            }
            Site::ObjName => match reader.kind() {
                TokenKind::EndObject => self.finish_container(reader),
                TokenKind::PropertyName => self.object_member_name(reader),
                other => unreachable!("member position produced {other:?}"),
            },
            Site::ObjValue => {
                let (handle, numbers) = self.member_value_site();
                self.dispatch_value(handle, numbers, reader, checkpoint)
            }
            Site::PolyName => match reader.kind() {
                TokenKind::EndObject => {
                    let (type_name, tag) = self.poly_identity();
                    Err(Error::missing_required_member(type_name, &tag)
                        .with_offset(reader.token_offset()))
                }
                TokenKind::PropertyName => {
                    let name = reader.unescaped_str()?;
                    let (type_name, tag) = self.poly_identity();
                    if name.as_ref() == tag.as_str() {
                        if let Some(frame) = self.frames.last_mut() {
                            frame.state = FrameState::PolyValue;
                        }
                        Ok(ReadStep::Progress)
                    } else {
                        // The discriminator must lead the object; anything
                        // else would force buffering the whole payload.
                        Err(Error::missing_required_member(type_name, &tag)
                            .with_offset(reader.token_offset()))
                    }
                }
                other => unreachable!("member position produced {other:?}"),
            },
            Site::PolyValue => {
                if reader.kind() != TokenKind::String {
                    return Err(token_mismatch("a discriminator string", reader));
                }
                self.dispatch_variant(reader)
            }
        }
    }

    /// Resolve the contract chain at a value position and act on it:
    /// scalars fold immediately, containers push a frame, node shapes
    /// re-read the whole subtree out of the buffer.
    fn dispatch_value(
        &mut self,
        handle: ContractHandle,
        numbers: NumberHandling,
        reader: &mut TokenReader<'_>,
        checkpoint: Checkpoint,
    ) -> Result<ReadStep> {
        let mut wraps: SmallVec<[Wrap; 1]> = SmallVec::new();
        let mut current = handle;
        let mut numbers = numbers;
        loop {
            let (next, wrap) = match &current.shape {
                Shape::Value { codec, .. } => {
                    let value = codec.read(reader, numbers)?;
                    let value = apply_wraps(value, &wraps)?;
                    self.fold(value)?;
                    return Ok(ReadStep::Progress);
                }
                Shape::Enumerable { hooks, .. } => {
                    if reader.kind() != TokenKind::StartArray {
                        return Err(token_mismatch("an array", reader));
                    }
                    let builder = hooks.create();
                    self.frames.push(ReadFrame {
                        contract: current.clone(),
                        wraps,
                        numbers,
                        state: FrameState::Seq { builder, index: 0 },
                    });
                    return Ok(ReadStep::Progress);
                }
                Shape::Dictionary { hooks, .. } => {
                    if reader.kind() != TokenKind::StartObject {
                        return Err(token_mismatch("an object", reader));
                    }
                    let builder = hooks.create();
                    self.frames.push(ReadFrame {
                        contract: current.clone(),
                        wraps,
                        numbers,
                        state: FrameState::Map {
                            builder,
                            pending_key: None,
                        },
                    });
                    return Ok(ReadStep::Progress);
                }
                Shape::Object(shape) => {
                    if reader.kind() != TokenKind::StartObject {
                        return Err(token_mismatch("an object", reader));
                    }
                    let state = if shape.polymorphism.is_some() {
                        FrameState::PolyName
                    } else {
                        FrameState::Obj {
                            values: (0..shape.members.len()).map(|_| None).collect(),
                            seen: seen_bits(shape.members.len()),
                            current: None,
                            skipping: false,
                        }
                    };
                    self.frames.push(ReadFrame {
                        contract: current.clone(),
                        wraps,
                        numbers,
                        state,
                    });
                    return Ok(ReadStep::Progress);
                }
                Shape::Optional { inner, none, .. } => {
                    if reader.kind() == TokenKind::Null {
                        let value = apply_wraps(none(), &wraps)?;
                        self.fold(value)?;
                        return Ok(ReadStep::Progress);
                    }
                    (inner.get(self.registry), Wrap::Optional(current.clone()))
                }
                Shape::Cast { inner, .. } => {
                    let next = inner.get(self.registry);
                    if matches!(next.shape, Shape::Cast { .. }) {
                        panic!(
                            "cast contract `{}` resolves to another cast contract `{}`; casts must not be layered",
                            current.type_name(),
                            next.type_name()
                        );
                    }
                    (next, Wrap::Cast(current.clone()))
                }
                Shape::Node => {
                    // The whole subtree must be buffered. Roll back past the
                    // token already read and take the raw span in one piece.
                    reader.restore(checkpoint.clone());
                    let Some((raw, offset)) = reader.read_value_span()? else {
                        return Ok(ReadStep::NeedMore);
                    };
                    let doc = Document::parse_slice_with_options(raw, self.parse)
                        .map_err(|e| e.rebased(offset))?;
                    let tree =
                        NodeTree::from_element(doc.root()).map_err(|e| e.rebased(offset))?;
                    let value = apply_wraps(Box::new(tree), &wraps)?;
                    self.fold(value)?;
                    return Ok(ReadStep::Progress);
                }
            };
            numbers = effective_numbers(None, &next, numbers);
            wraps.push(wrap);
            current = next;
        }
    }

    /// Deliver a finished value to the frame above, or finish the root.
    fn fold(&mut self, value: BoxedValue) -> Result<()> {
        let Some(frame) = self.frames.last_mut() else {
            self.result = Some(value);
            self.complete = true;
            return Ok(());
        };
        match (&frame.contract.shape, &mut frame.state) {
            (Shape::Enumerable { hooks, .. }, FrameState::Seq { builder, index }) => {
                hooks.add(builder.as_mut(), value)?;
                *index += 1;
                Ok(())
            }
            (Shape::Dictionary { hooks, .. }, FrameState::Map { builder, pending_key }) => {
                let key = match pending_key.take() {
                    Some(key) => key,
                    None => panic!("map value folded without a pending key"),
                };
                let replaced = hooks.insert(builder.as_mut(), key.clone(), value)?;
                if replaced && matches!(self.typed.duplicate_members, DuplicateMembers::Reject) {
                    return Err(Error::duplicate_member(&key));
                }
                Ok(())
            }
            (Shape::Object(_), FrameState::Obj { values, current, .. }) => {
                let index = match current.take() {
                    Some(index) => index,
                    None => panic!("object value folded without an active member"),
                };
                values[index] = Some(value);
                Ok(())
            }
            _ => panic!("frame shape and state out of sync"),
        }
    }

    /// Close the top frame on its end token: finish the builder or run the
    /// object constructor, apply recorded wraps, fold into the parent.
    fn finish_container(&mut self, reader: &TokenReader<'_>) -> Result<ReadStep> {
        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => panic!("container end without an open frame"),
        };
        let value = match frame.state {
            FrameState::Seq { builder, .. } => {
                let Shape::Enumerable { hooks, .. } = &frame.contract.shape else {
                    panic!("frame shape and state out of sync");
                };
                hooks.finish(builder)?
            }
            FrameState::Map { builder, pending_key } => {
                if pending_key.is_some() {
                    panic!("object ended while a member value was pending");
                }
                let Shape::Dictionary { hooks, .. } = &frame.contract.shape else {
                    panic!("frame shape and state out of sync");
                };
                hooks.finish(builder)?
            }
            FrameState::Obj { mut values, seen, .. } => {
                let Shape::Object(shape) = &frame.contract.shape else {
                    panic!("frame shape and state out of sync");
                };
                for (index, member) in shape.members.iter().enumerate() {
                    if member.required && !bit_get(&seen, index) {
                        return Err(Error::missing_required_member(
                            frame.contract.type_name(),
                            &member.name,
                        )
                        .with_offset(reader.token_offset()));
                    }
                }
                let mut slots =
                    FieldSlots::new(frame.contract.type_name(), &shape.members, &mut values);
                (shape.ctor)(&mut slots)?
            }
            FrameState::PolyName | FrameState::PolyValue => {
                panic!("container finished before its discriminator was read")
            }
        };
        let value = apply_wraps(value, &frame.wraps)?;
        self.fold(value)?;
        Ok(ReadStep::Progress)
    }

    /// Swap the polymorphic base frame for the variant the tag names.
    fn dispatch_variant(&mut self, reader: &TokenReader<'_>) -> Result<ReadStep> {
        let tag_text = reader.unescaped_str()?;
        let frame = match self.frames.last_mut() {
            Some(frame) => frame,
            None => panic!("no active frame"),
        };
        let base = frame.contract.clone();
        let Shape::Object(shape) = &base.shape else {
            panic!("frame shape and state out of sync");
        };
        let Some(poly) = &shape.polymorphism else {
            panic!("discriminator frame without variants");
        };
        let Some(index) = poly.variant_index(tag_text.as_ref()) else {
            return Err(
                Error::unrecognized_discriminator(base.type_name(), tag_text.as_ref())
                    .with_offset(reader.token_offset()),
            );
        };
        let handle = poly.variants[index].slot.get(self.registry);
        let member_count = match &handle.shape {
            Shape::Object(variant_shape) => variant_shape.members.len(),
            _ => panic!(
                "variant contract `{}` is not an object contract",
                handle.type_name()
            ),
        };
        frame.contract = handle;
        frame.wraps.push(Wrap::Variant(base, index));
        frame.state = FrameState::Obj {
            values: (0..member_count).map(|_| None).collect(),
            seen: seen_bits(member_count),
            current: None,
            skipping: false,
        };
        Ok(ReadStep::Progress)
    }

    /// Handle a property name inside a plain object frame.
    fn object_member_name(&mut self, reader: &TokenReader<'_>) -> Result<ReadStep> {
        let name = reader.unescaped_str()?;
        let frame = match self.frames.last_mut() {
            Some(frame) => frame,
            None => panic!("no active frame"),
        };
        let Shape::Object(shape) = &frame.contract.shape else {
            panic!("frame shape and state out of sync");
        };
        let FrameState::Obj {
            seen,
            current,
            skipping,
            ..
        } = &mut frame.state
        else {
            panic!("frame shape and state out of sync");
        };
        match shape.member_index(name.as_ref()) {
            Some(index) => {
                if bit_get(seen, index)
                    && matches!(self.typed.duplicate_members, DuplicateMembers::Reject)
                {
                    return Err(Error::duplicate_member(name.as_ref())
                        .with_offset(reader.token_offset()));
                }
                bit_set(seen, index);
                *current = Some(index);
                Ok(ReadStep::Progress)
            }
            None => match self.typed.unknown_members {
                UnknownMembers::Reject => Err(Error::unknown_member(
                    frame.contract.type_name(),
                    name.as_ref(),
                )
                .with_offset(reader.token_offset())),
                UnknownMembers::Ignore => {
                    *skipping = true;
                    Ok(ReadStep::Progress)
                }
            },
        }
    }

    fn site(&self) -> Site {
        match self.frames.last() {
            None => Site::Root,
            Some(frame) => match &frame.state {
                FrameState::Seq { .. } => Site::SeqItem,
                FrameState::Map {
                    pending_key: Some(_),
                    ..
                } => Site::MapValue,
                FrameState::Map { .. } => Site::MapKey,
                FrameState::Obj {
                    current: Some(_), ..
                } => Site::ObjValue,
                FrameState::Obj { .. } => Site::ObjName,
                FrameState::PolyName => Site::PolyName,
                FrameState::PolyValue => Site::PolyValue,
            },
        }
    }

    fn element_site(&self) -> (ContractHandle, NumberHandling) {
        let frame = match self.frames.last() {
            Some(frame) => frame,
            None => panic!("no active frame"),
        };
        let Shape::Enumerable { element, .. } = &frame.contract.shape else {
            panic!("frame shape and state out of sync");
        };
        let handle = element.get(self.registry);
        let numbers = effective_numbers(None, &handle, frame.numbers);
        (handle, numbers)
    }

    fn dictionary_value_site(&self) -> (ContractHandle, NumberHandling) {
        let frame = match self.frames.last() {
            Some(frame) => frame,
            None => panic!("no active frame"),
        };
        let Shape::Dictionary { value, .. } = &frame.contract.shape else {
            panic!("frame shape and state out of sync");
        };
        let handle = value.get(self.registry);
        let numbers = effective_numbers(None, &handle, frame.numbers);
        (handle, numbers)
    }

    fn member_value_site(&self) -> (ContractHandle, NumberHandling) {
        let frame = match self.frames.last() {
            Some(frame) => frame,
            None => panic!("no active frame"),
        };
        let Shape::Object(shape) = &frame.contract.shape else {
            panic!("frame shape and state out of sync");
        };
        let FrameState::Obj {
            current: Some(index),
            ..
        } = &frame.state
        else {
            panic!("frame shape and state out of sync");
        };
        let member = &shape.members[*index];
        let handle = member.slot.get(self.registry);
        let numbers = effective_numbers(member.numbers, &handle, frame.numbers);
        (handle, numbers)
    }

    fn poly_identity(&self) -> (&'static str, SmolStr) {
        let frame = match self.frames.last() {
            Some(frame) => frame,
            None => panic!("no active frame"),
        };
        let Shape::Object(shape) = &frame.contract.shape else {
            panic!("frame shape and state out of sync");
        };
        let Some(poly) = &shape.polymorphism else {
            panic!("discriminator frame without variants");
        };
        (frame.contract.type_name(), poly.tag.clone())
    }

    fn skip_pending(&self) -> bool {
        matches!(
            self.frames.last(),
            Some(ReadFrame {
                state: FrameState::Obj { skipping: true, .. },
                ..
            })
        )
    }

    fn clear_skip(&mut self) {
        if let Some(ReadFrame {
            state: FrameState::Obj { skipping, .. },
            ..
        }) = self.frames.last_mut()
        {
            *skipping = false;
        }
    }

    /// Render the position of the open frames as a path, `$.orders[2].id`
    /// style. Best effort: positions between members contribute nothing.
    fn render_path(&self) -> String {
        let mut path = String::from("$");
        for frame in &self.frames {
            match &frame.state {
                FrameState::Seq { index, .. } => {
                    let _ = write!(path, "[{index}]");
                }
                FrameState::Map { pending_key, .. } => {
                    if let Some(key) = pending_key {
                        let _ = write!(path, ".{key}");
                    }
                }
                FrameState::Obj { current, .. } => {
                    if let Some(index) = current {
                        if let Shape::Object(shape) = &frame.contract.shape {
                            let _ = write!(path, ".{}", shape.members[*index].name);
                        }
                    }
                }
                FrameState::PolyName | FrameState::PolyValue => {}
            }
        }
        path
    }
}

/// Apply recorded wraps to a folded value, innermost first.
fn apply_wraps(value: BoxedValue, wraps: &[Wrap]) -> Result<BoxedValue> {
    let mut value = value;
    for wrap in wraps.iter().rev() {
        value = match wrap {
            Wrap::Optional(handle) => match &handle.shape {
                Shape::Optional { some, .. } => some(value)?,
                _ => panic!("optional wrap backed by a non-optional contract"),
            },
            Wrap::Cast(handle) => match &handle.shape {
                Shape::Cast { after_read, .. } => after_read(value)?,
                _ => panic!("cast wrap backed by a non-cast contract"),
            },
            Wrap::Variant(handle, index) => match &handle.shape {
                Shape::Object(shape) => match &shape.polymorphism {
                    Some(poly) => (poly.variants[*index].wrap)(value)?,
                    None => panic!("variant wrap backed by a non-polymorphic contract"),
                },
                _ => panic!("variant wrap backed by a non-object contract"),
            },
        };
    }
    Ok(value)
}

fn seen_bits(count: usize) -> SmallVec<[u64; 1]> {
    smallvec::smallvec![0u64; count.div_ceil(64)]
}

fn bit_get(bits: &[u64], index: usize) -> bool {
    bits[index / 64] & (1 << (index % 64)) != 0
}

fn bit_set(bits: &mut [u64], index: usize) {
    bits[index / 64] |= 1 << (index % 64);
}
