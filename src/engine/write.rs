//! The typed write engines.
//!
//! One-shot writes walk the value recursively: no frames, no bookkeeping,
//! just the contract graph and the token writer. Streaming writes run a
//! frame machine instead, so a session can stop after any element once the
//! output budget fills and resume exactly there. Both produce identical
//! bytes for the same value and options.

use std::any::Any;
use std::fmt::Write as _;

use smol_str::SmolStr;

use crate::contract::{
    downcast_ref_value, effective_numbers, ContractHandle, Registry, Shape,
};
use crate::error::{Error, Result};
use crate::node::{NodeContents, NodeId, NodeTree};
use crate::num::NumberHandling;
use crate::options::TypedOptions;
use crate::writer::TokenWriter;

/// One-shot recursive write of a whole value.
pub(crate) fn write_root(
    handle: &ContractHandle,
    value: &dyn Any,
    writer: &mut TokenWriter,
    typed: &TypedOptions,
) -> Result<()> {
    let mut tree = TreeWriter {
        registry: Registry::global(),
        path: Vec::new(),
    };
    let numbers = effective_numbers(None, handle, typed.number_handling);
    let result = tree.write_value(handle, value, numbers, writer);
    // An early return leaves the breadcrumbs pointing at the failed value.
    result.map_err(|e| e.with_path(render_path(&tree.path)))
}

enum PathSegment {
    Key(SmolStr),
    Index(usize),
}

fn render_path(segments: &[PathSegment]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        match segment {
            PathSegment::Key(key) => {
                let _ = write!(path, ".{key}");
            }
            PathSegment::Index(index) => {
                let _ = write!(path, "[{index}]");
            }
        }
    }
    path
}

struct TreeWriter {
    registry: &'static Registry,
    path: Vec<PathSegment>,
}

impl TreeWriter {
    fn write_value(
        &mut self,
        handle: &ContractHandle,
        value: &dyn Any,
        numbers: NumberHandling,
        writer: &mut TokenWriter,
    ) -> Result<()> {
        match &handle.shape {
            Shape::Value { codec, fast_write } => match fast_write {
                Some(fast) if !numbers.write_as_string => fast(value, writer),
                _ => codec.write(value, writer, numbers),
            },
            Shape::Optional { inner, project, .. } => match project(value) {
                None => {
                    writer.write_null();
                    Ok(())
                }
                Some(projected) => {
                    let next = inner.get(self.registry);
                    let child = effective_numbers(None, &next, numbers);
                    self.write_value(&next, projected, child, writer)
                }
            },
            Shape::Cast { inner, before_write, .. } => {
                let next = inner.get(self.registry);
                if matches!(next.shape, Shape::Cast { .. }) {
                    panic!(
                        "cast contract `{}` resolves to another cast contract `{}`; casts must not be layered",
                        handle.type_name(),
                        next.type_name()
                    );
                }
                if !matches!(next.shape, Shape::Value { .. }) {
                    return Err(cast_over_container(handle));
                }
                let owned = before_write(value);
                let child = effective_numbers(None, &next, numbers);
                self.write_value(&next, owned.as_ref(), child, writer)
            }
            Shape::Enumerable { element, hooks } => {
                writer.write_start_array()?;
                let next = element.get(self.registry);
                let child = effective_numbers(None, &next, numbers);
                for index in 0..hooks.len(value) {
                    self.path.push(PathSegment::Index(index));
                    self.write_value(&next, hooks.element_at(value, index), child, writer)?;
                    self.path.pop();
                }
                writer.write_end_array();
                Ok(())
            }
            Shape::Dictionary {
                value: value_slot,
                hooks,
            } => {
                writer.write_start_object()?;
                let next = value_slot.get(self.registry);
                let child = effective_numbers(None, &next, numbers);
                for index in 0..hooks.len(value) {
                    let (key, entry) = hooks.entry_at(value, index);
                    writer.write_property_name(key);
                    self.path.push(PathSegment::Key(SmolStr::from(key)));
                    self.write_value(&next, entry, child, writer)?;
                    self.path.pop();
                }
                writer.write_end_object();
                Ok(())
            }
            Shape::Object(shape) => {
                writer.write_start_object()?;
                if let Some(poly) = &shape.polymorphism {
                    let (variant_handle, projected, tag_value) = match_variant(handle, value);
                    writer.write_property_name(&poly.tag);
                    writer.write_string(&tag_value);
                    let child = effective_numbers(None, &variant_handle, numbers);
                    self.write_members(&variant_handle, projected, child, writer)?;
                } else {
                    self.write_members(handle, value, numbers, writer)?;
                }
                writer.write_end_object();
                Ok(())
            }
            Shape::Node => {
                let node = downcast_ref_value::<NodeTree>(value, "node-shaped value");
                node.write_node(node.root_id(), writer)
            }
        }
    }

    fn write_members(
        &mut self,
        handle: &ContractHandle,
        value: &dyn Any,
        numbers: NumberHandling,
        writer: &mut TokenWriter,
    ) -> Result<()> {
        let Shape::Object(shape) = &handle.shape else {
            panic!("object members on a non-object contract");
        };
        for member in &shape.members {
            writer.write_property_name(&member.name);
            self.path.push(PathSegment::Key(member.name.clone()));
            let next = member.slot.get(self.registry);
            let child = effective_numbers(member.numbers, &next, numbers);
            self.write_value(&next, (member.getter)(value), child, writer)?;
            self.path.pop();
        }
        Ok(())
    }
}

/// Find the variant a polymorphic value projects into: its contract, the
/// projected payload, and the tag string to emit.
fn match_variant<'v>(
    handle: &ContractHandle,
    value: &'v dyn Any,
) -> (ContractHandle, &'v dyn Any, SmolStr) {
    let Shape::Object(shape) = &handle.shape else {
        panic!("variant lookup on a non-object contract");
    };
    let Some(poly) = &shape.polymorphism else {
        panic!("variant lookup on a non-polymorphic contract");
    };
    for variant in &poly.variants {
        if let Some(projected) = (variant.project)(value) {
            let next = variant.slot.get(Registry::global());
            if !matches!(next.shape, Shape::Object(_)) {
                panic!(
                    "variant contract `{}` is not an object contract",
                    next.type_name()
                );
            }
            return (next, projected, variant.tag_value.clone());
        }
    }
    panic!(
        "value of `{}` projects into none of its variants",
        handle.type_name()
    );
}

fn cast_over_container(handle: &ContractHandle) -> Error {
    Error::not_supported(format!(
        "cast contract `{}` targets a container shape and cannot be written",
        handle.type_name()
    ))
}

/// One open container of the streaming write machine.
enum WriteFrame<'v> {
    Seq {
        contract: ContractHandle,
        value: &'v dyn Any,
        index: usize,
        numbers: NumberHandling,
    },
    Map {
        contract: ContractHandle,
        value: &'v dyn Any,
        index: usize,
        numbers: NumberHandling,
    },
    Obj {
        contract: ContractHandle,
        value: &'v dyn Any,
        member: usize,
        numbers: NumberHandling,
    },
    Node {
        tree: &'v NodeTree,
        id: NodeId,
        index: usize,
    },
}

/// What one step decided to do next, extracted so the frame borrow can end
/// before the machine mutates itself.
enum Action<'v> {
    Pop,
    Element {
        handle: ContractHandle,
        value: &'v dyn Any,
        numbers: NumberHandling,
    },
    NodeChild {
        tree: &'v NodeTree,
        id: NodeId,
    },
}

/// Resumable frame-driven writer over a borrowed value.
pub(crate) struct WriteEngine<'v> {
    registry: &'static Registry,
    typed: TypedOptions,
    frames: Vec<WriteFrame<'v>>,
    root: Option<(ContractHandle, &'v dyn Any)>,
}

impl<'v> WriteEngine<'v> {
    pub(crate) fn new(root: ContractHandle, value: &'v dyn Any, typed: TypedOptions) -> Self {
        Self {
            registry: Registry::global(),
            typed,
            frames: Vec::new(),
            root: Some((root, value)),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.root.is_none() && self.frames.is_empty()
    }

    /// Emit one element (or container delimiter) of output. `Ok(false)`
    /// once the document is complete.
    pub(crate) fn step(&mut self, writer: &mut TokenWriter) -> Result<bool> {
        match self.step_inner(writer) {
            Ok(more) => Ok(more),
            Err(error) => Err(error.with_path(self.render_path())),
        }
    }

    fn step_inner(&mut self, writer: &mut TokenWriter) -> Result<bool> {
        if let Some((handle, value)) = self.root.take() {
            let numbers = effective_numbers(None, &handle, self.typed.number_handling);
            self.begin_value(handle, value, numbers, writer)?;
            return Ok(!self.is_done());
        }
        let Some(frame) = self.frames.last_mut() else {
            return Ok(false);
        };
        let action = match frame {
            WriteFrame::Seq {
                contract,
                value,
                index,
                numbers,
            } => {
                let Shape::Enumerable { element, hooks } = &contract.shape else {
                    panic!("frame shape out of sync");
                };
                if *index == hooks.len(*value) {
                    writer.write_end_array();
                    Action::Pop
                } else {
                    let entry = hooks.element_at(*value, *index);
                    *index += 1;
                    let next = element.get(self.registry);
                    let child = effective_numbers(None, &next, *numbers);
                    Action::Element {
                        handle: next,
                        value: entry,
                        numbers: child,
                    }
                }
            }
            WriteFrame::Map {
                contract,
                value,
                index,
                numbers,
            } => {
                let Shape::Dictionary {
                    value: value_slot,
                    hooks,
                } = &contract.shape
                else {
                    panic!("frame shape out of sync");
                };
                if *index == hooks.len(*value) {
                    writer.write_end_object();
                    Action::Pop
                } else {
                    let (key, entry) = hooks.entry_at(*value, *index);
                    *index += 1;
                    writer.write_property_name(key);
                    let next = value_slot.get(self.registry);
                    let child = effective_numbers(None, &next, *numbers);
                    Action::Element {
                        handle: next,
                        value: entry,
                        numbers: child,
                    }
                }
            }
            WriteFrame::Obj {
                contract,
                value,
                member,
                numbers,
            } => {
                let Shape::Object(shape) = &contract.shape else {
                    panic!("frame shape out of sync");
                };
                if *member == shape.members.len() {
                    writer.write_end_object();
                    Action::Pop
                } else {
                    let m = &shape.members[*member];
                    *member += 1;
                    writer.write_property_name(&m.name);
                    let next = m.slot.get(self.registry);
                    let child = effective_numbers(m.numbers, &next, *numbers);
                    Action::Element {
                        handle: next,
                        value: (m.getter)(*value),
                        numbers: child,
                    }
                }
            }
            WriteFrame::Node { tree, id, index } => match tree.contents(*id) {
                NodeContents::Array(children) => {
                    if *index == children.len() {
                        writer.write_end_array();
                        Action::Pop
                    } else {
                        let child = children[*index];
                        *index += 1;
                        Action::NodeChild { tree: *tree, id: child }
                    }
                }
                NodeContents::Object(members) => {
                    if *index == members.len() {
                        writer.write_end_object();
                        Action::Pop
                    } else {
                        let (key, child) = match members.get_index(*index) {
                            Some(entry) => entry,
                            None => panic!("node member index out of range"),
                        };
                        let child = *child;
                        *index += 1;
                        writer.write_property_name(key);
                        Action::NodeChild { tree: *tree, id: child }
                    }
                }
                NodeContents::Scalar(_) => panic!("scalar node cannot hold a frame"),
            },
        };
        match action {
            Action::Pop => {
                self.frames.pop();
            }
            Action::Element {
                handle,
                value,
                numbers,
            } => self.begin_value(handle, value, numbers, writer)?,
            Action::NodeChild { tree, id } => self.begin_node(tree, id, writer)?,
        }
        Ok(!self.is_done())
    }

    /// Resolve the contract chain at a value position: scalars are written
    /// immediately, containers open a frame.
    fn begin_value(
        &mut self,
        handle: ContractHandle,
        value: &'v dyn Any,
        numbers: NumberHandling,
        writer: &mut TokenWriter,
    ) -> Result<()> {
        let mut current = handle;
        let mut value = value;
        let mut numbers = numbers;
        loop {
            let (next, next_value) = match &current.shape {
                Shape::Value { codec, fast_write } => {
                    return match fast_write {
                        Some(fast) if !numbers.write_as_string => fast(value, writer),
                        _ => codec.write(value, writer, numbers),
                    };
                }
                Shape::Optional { inner, project, .. } => match project(value) {
                    None => {
                        writer.write_null();
                        return Ok(());
                    }
                    Some(projected) => (inner.get(self.registry), projected),
                },
                Shape::Cast { inner, before_write, .. } => {
                    let next = inner.get(self.registry);
                    if matches!(next.shape, Shape::Cast { .. }) {
                        panic!(
                            "cast contract `{}` resolves to another cast contract `{}`; casts must not be layered",
                            current.type_name(),
                            next.type_name()
                        );
                    }
                    let Shape::Value { codec, fast_write } = &next.shape else {
                        return Err(cast_over_container(&current));
                    };
                    let owned = before_write(value);
                    let child = effective_numbers(None, &next, numbers);
                    return match fast_write {
                        Some(fast) if !child.write_as_string => fast(owned.as_ref(), writer),
                        _ => codec.write(owned.as_ref(), writer, child),
                    };
                }
                Shape::Enumerable { .. } => {
                    writer.write_start_array()?;
                    self.frames.push(WriteFrame::Seq {
                        contract: current.clone(),
                        value,
                        index: 0,
                        numbers,
                    });
                    return Ok(());
                }
                Shape::Dictionary { .. } => {
                    writer.write_start_object()?;
                    self.frames.push(WriteFrame::Map {
                        contract: current.clone(),
                        value,
                        index: 0,
                        numbers,
                    });
                    return Ok(());
                }
                Shape::Object(shape) => {
                    writer.write_start_object()?;
                    if let Some(poly) = &shape.polymorphism {
                        let (variant_handle, projected, tag_value) = match_variant(&current, value);
                        writer.write_property_name(&poly.tag);
                        writer.write_string(&tag_value);
                        let child = effective_numbers(None, &variant_handle, numbers);
                        self.frames.push(WriteFrame::Obj {
                            contract: variant_handle,
                            value: projected,
                            member: 0,
                            numbers: child,
                        });
                    } else {
                        self.frames.push(WriteFrame::Obj {
                            contract: current.clone(),
                            value,
                            member: 0,
                            numbers,
                        });
                    }
                    return Ok(());
                }
                Shape::Node => {
                    let tree = downcast_ref_value::<NodeTree>(value, "node-shaped value");
                    return self.begin_node(tree, tree.root_id(), writer);
                }
            };
            numbers = effective_numbers(None, &next, numbers);
            value = next_value;
            current = next;
        }
    }

    fn begin_node(&mut self, tree: &'v NodeTree, id: NodeId, writer: &mut TokenWriter) -> Result<()> {
        match tree.contents(id) {
            NodeContents::Scalar(_) => tree.write_node(id, writer),
            NodeContents::Array(_) => {
                writer.write_start_array()?;
                self.frames.push(WriteFrame::Node { tree, id, index: 0 });
                Ok(())
            }
            NodeContents::Object(_) => {
                writer.write_start_object()?;
                self.frames.push(WriteFrame::Node { tree, id, index: 0 });
                Ok(())
            }
        }
    }

    /// Best-effort path of the element currently being written. Cursors
    /// point one past the element a step just started, hence the `- 1`.
    fn render_path(&self) -> String {
        let mut path = String::from("$");
        for frame in &self.frames {
            match frame {
                WriteFrame::Seq { index, .. } => {
                    if *index > 0 {
                        let _ = write!(path, "[{}]", index - 1);
                    }
                }
                WriteFrame::Map {
                    contract,
                    value,
                    index,
                    ..
                } => {
                    if *index > 0 {
                        if let Shape::Dictionary { hooks, .. } = &contract.shape {
                            let (key, _) = hooks.entry_at(*value, index - 1);
                            let _ = write!(path, ".{key}");
                        }
                    }
                }
                WriteFrame::Obj { contract, member, .. } => {
                    if *member > 0 {
                        if let Shape::Object(shape) = &contract.shape {
                            let _ = write!(path, ".{}", shape.members[member - 1].name);
                        }
                    }
                }
                WriteFrame::Node { tree, id, index } => {
                    if *index > 0 {
                        match tree.contents(*id) {
                            NodeContents::Array(_) => {
                                let _ = write!(path, "[{}]", index - 1);
                            }
                            NodeContents::Object(members) => {
                                if let Some((key, _)) = members.get_index(index - 1) {
                                    let _ = write!(path, ".{key}");
                                }
                            }
                            NodeContents::Scalar(_) => {}
                        }
                    }
                }
            }
        }
        path
    }
}
