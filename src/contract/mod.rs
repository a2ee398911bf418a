//! Conversion contracts: the resolved description of how a Rust type maps
//! onto the token stream.
//!
//! A [`Contract`] bundles a classification ([`Strategy`]), the hooks the
//! engine drives (scalar codec, collection hooks, object member table), and
//! per-type number handling. Contracts are resolved once per type through a
//! [`Registry`] and shared behind [`ContractHandle`]s; member references are
//! lazy [`MemberSlot`]s so recursive types resolve without cycles.
//!
//! Values cross the engine type-erased as `Box<dyn Any + Send>`. A failed
//! downcast means a contract lied about its type and is a contract
//! violation: the crate panics loudly instead of reporting an error the
//! caller could mistake for bad input.

mod std_impls;

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use smol_str::SmolStr;

use crate::error::{Error, Result};
use crate::num::NumberHandling;
use crate::reader::TokenReader;
use crate::writer::TokenWriter;

/// A type-erased value moving through the engine.
pub type BoxedValue = Box<dyn Any + Send>;

/// Shared handle to a resolved contract.
pub type ContractHandle = Arc<Contract>;

pub(crate) type WrapFn = Box<dyn Fn(BoxedValue) -> Result<BoxedValue> + Send + Sync>;
pub(crate) type ProjectFn = Box<dyn for<'v> Fn(&'v dyn Any) -> Option<&'v dyn Any> + Send + Sync>;
pub(crate) type MakeFn = Box<dyn Fn() -> BoxedValue + Send + Sync>;
pub(crate) type OwnedProjectFn = Box<dyn Fn(&dyn Any) -> BoxedValue + Send + Sync>;
pub(crate) type Getter = Box<dyn for<'v> Fn(&'v dyn Any) -> (&'v dyn Any) + Send + Sync>;
pub(crate) type CtorFn = Box<dyn Fn(&mut FieldSlots<'_>) -> Result<BoxedValue> + Send + Sync>;

/// Direct token emission for a scalar, bypassing the codec dispatch.
pub type FastWriteFn = fn(&dyn Any, &mut TokenWriter) -> Result<()>;

/// A type that can describe its own conversion contract.
///
/// The crate provides implementations for the std scalar and collection
/// types; user types implement it through [`Contract::object`] or
/// [`Contract::polymorphic`]. The engine never discovers members on its
/// own, it only follows what the contract declares.
pub trait Shaped: Send + Sized + 'static {
    fn contract() -> Contract;
}

/// Converter family of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Terminal scalar; read and written in a single token.
    Value,
    /// Sequence shape driven element by element.
    Enumerable,
    /// String-keyed map shape driven entry by entry.
    Dictionary,
    /// Member-table shape with an instance constructor.
    Object,
}

/// Terminal scalar codec. `read` is called with the reader positioned on
/// the value's token; `write` receives the borrowed value.
pub trait ValueCodec: Send + Sync {
    fn read(&self, reader: &TokenReader<'_>, numbers: NumberHandling) -> Result<BoxedValue>;
    fn write(
        &self,
        value: &dyn Any,
        writer: &mut TokenWriter,
        numbers: NumberHandling,
    ) -> Result<()>;
}

/// Collection hooks for [`Strategy::Enumerable`] contracts.
///
/// Reading drives `create`/`add`/`finish`; `finish` is the identity for
/// mutable collections and the materializing constructor for immutable
/// ones. Writing drives `len`/`element_at`: index access is what lets a
/// suspended write resume at the exact element it stopped on. For
/// unordered collections `element_at` re-enumerates to the index, which
/// stays stable because the value is not mutated while being written.
pub trait SeqHooks: Send + Sync {
    fn create(&self) -> BoxedValue;
    fn add(&self, builder: &mut dyn Any, element: BoxedValue) -> Result<()>;
    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue>;
    fn len(&self, value: &dyn Any) -> usize;
    fn element_at<'v>(&self, value: &'v dyn Any, index: usize) -> &'v dyn Any;
}

/// Map hooks for [`Strategy::Dictionary`] contracts, keyed by decoded
/// property name. `insert` reports whether the key was already present so
/// the engine can apply the duplicate-member policy.
pub trait MapHooks: Send + Sync {
    fn create(&self) -> BoxedValue;
    fn insert(&self, builder: &mut dyn Any, key: SmolStr, value: BoxedValue) -> Result<bool>;
    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue>;
    fn len(&self, value: &dyn Any) -> usize;
    fn entry_at<'v>(&self, value: &'v dyn Any, index: usize) -> (&'v str, &'v dyn Any);
}

pub(crate) enum Shape {
    Value {
        codec: Box<dyn ValueCodec>,
        fast_write: Option<FastWriteFn>,
    },
    Enumerable {
        element: MemberSlot,
        hooks: Box<dyn SeqHooks>,
    },
    Dictionary {
        value: MemberSlot,
        hooks: Box<dyn MapHooks>,
    },
    Object(ObjectShape),
    Optional {
        inner: MemberSlot,
        none: MakeFn,
        some: WrapFn,
        project: ProjectFn,
    },
    Cast {
        inner: MemberSlot,
        after_read: WrapFn,
        before_write: OwnedProjectFn,
    },
    /// Whole-subtree buffering into the dynamic node graph.
    Node,
}

pub(crate) struct ObjectMember {
    pub(crate) name: SmolStr,
    pub(crate) slot: MemberSlot,
    pub(crate) required: bool,
    pub(crate) numbers: Option<NumberHandling>,
    pub(crate) getter: Getter,
}

pub(crate) struct ObjectShape {
    pub(crate) members: Vec<ObjectMember>,
    pub(crate) ctor: CtorFn,
    pub(crate) polymorphism: Option<Polymorphism>,
}

impl ObjectShape {
    pub(crate) fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

pub(crate) struct Polymorphism {
    pub(crate) tag: SmolStr,
    pub(crate) variants: Vec<Variant>,
}

impl Polymorphism {
    pub(crate) fn variant_index(&self, tag_value: &str) -> Option<usize> {
        self.variants.iter().position(|v| v.tag_value == tag_value)
    }
}

pub(crate) struct Variant {
    pub(crate) tag_value: SmolStr,
    pub(crate) slot: MemberSlot,
    pub(crate) wrap: WrapFn,
    pub(crate) project: ProjectFn,
}

/// Resolved conversion description for one Rust type.
pub struct Contract {
    type_id: TypeId,
    type_name: &'static str,
    number_handling: Option<NumberHandling>,
    pub(crate) shape: Shape,
}

impl Contract {
    /// Terminal scalar contract.
    pub fn value<T: Any + Send>(
        type_name: &'static str,
        codec: impl ValueCodec + 'static,
    ) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name,
            number_handling: None,
            shape: Shape::Value {
                codec: Box::new(codec),
                fast_write: None,
            },
        }
    }

    /// Scalar contract with a direct emit function for the write path.
    /// The fast function must produce the same bytes as the codec.
    pub fn value_with_fast_write<T: Any + Send>(
        type_name: &'static str,
        codec: impl ValueCodec + 'static,
        fast_write: FastWriteFn,
    ) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name,
            number_handling: None,
            shape: Shape::Value {
                codec: Box::new(codec),
                fast_write: Some(fast_write),
            },
        }
    }

    /// Sequence contract over element type `E`.
    pub fn sequence<T: Any + Send, E: Shaped + Any + Send>(
        type_name: &'static str,
        hooks: impl SeqHooks + 'static,
    ) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name,
            number_handling: None,
            shape: Shape::Enumerable {
                element: MemberSlot::of::<E>(),
                hooks: Box::new(hooks),
            },
        }
    }

    /// String-keyed map contract over value type `V`.
    pub fn dictionary<T: Any + Send, V: Shaped + Any + Send>(
        type_name: &'static str,
        hooks: impl MapHooks + 'static,
    ) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name,
            number_handling: None,
            shape: Shape::Dictionary {
                value: MemberSlot::of::<V>(),
                hooks: Box::new(hooks),
            },
        }
    }

    /// Start a member-table contract for `T`; finish with
    /// [`ObjectBuilder::build`].
    pub fn object<T: Any + Send>(type_name: &'static str) -> ObjectBuilder<T> {
        ObjectBuilder {
            type_name,
            members: Vec::new(),
            number_handling: None,
            _marker: PhantomData,
        }
    }

    /// Start a discriminator-dispatched contract for `T`. The `tag`
    /// property carries the variant name and must come first in the
    /// object text.
    pub fn polymorphic<T: Any + Send>(type_name: &'static str, tag: &str) -> PolymorphicBuilder<T> {
        PolymorphicBuilder {
            type_name,
            tag: SmolStr::from(tag),
            variants: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Nullable wrapper contract for `Option<T>`: `null` reads as `None`,
    /// anything else is delegated to `T`'s contract.
    pub fn optional<T: Shaped + Any + Send>() -> Self {
        Self {
            type_id: TypeId::of::<Option<T>>(),
            type_name: std::any::type_name::<Option<T>>(),
            number_handling: None,
            shape: Shape::Optional {
                inner: MemberSlot::of::<T>(),
                none: Box::new(|| Box::new(Option::<T>::None) as BoxedValue),
                some: Box::new(|boxed| {
                    let inner = downcast_value::<T>(boxed, "optional payload");
                    Ok(Box::new(Some(inner)) as BoxedValue)
                }),
                project: Box::new(|value: &dyn Any| -> Option<&dyn Any> {
                    let opt = downcast_ref_value::<Option<T>>(value, "optional value");
                    opt.as_ref().map(|inner| inner as &dyn Any)
                }),
            },
        }
    }

    /// Serve declared type `T` through the registered contract of `U`.
    ///
    /// `after_read` converts the decoded `U` (fallibly: range narrowing may
    /// reject), `before_write` produces the `U` to encode. Cast contracts
    /// must not be layered on top of each other; the engine panics when it
    /// unwraps a cast and finds another cast underneath.
    pub fn cast<T, U>(
        type_name: &'static str,
        after_read: impl Fn(U) -> Result<T> + Send + Sync + 'static,
        before_write: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> Self
    where
        T: Any + Send,
        U: Shaped + Any + Send,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name,
            number_handling: None,
            shape: Shape::Cast {
                inner: MemberSlot::of::<U>(),
                after_read: Box::new(move |boxed| {
                    let from = downcast_value::<U>(boxed, "cast input");
                    Ok(Box::new(after_read(from)?) as BoxedValue)
                }),
                before_write: Box::new(move |value| {
                    let typed = downcast_ref_value::<T>(value, "cast output");
                    Box::new(before_write(typed)) as BoxedValue
                }),
            },
        }
    }

    /// Whole-subtree contract for the dynamic node graph.
    pub(crate) fn node<T: Any + Send>(type_name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name,
            number_handling: None,
            shape: Shape::Node,
        }
    }

    /// Override number handling for every value under this contract.
    pub fn with_number_handling(mut self, handling: NumberHandling) -> Self {
        self.number_handling = Some(handling);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn strategy(&self) -> Strategy {
        match &self.shape {
            Shape::Value { .. } | Shape::Optional { .. } | Shape::Cast { .. } | Shape::Node => {
                Strategy::Value
            }
            Shape::Enumerable { .. } => Strategy::Enumerable,
            Shape::Dictionary { .. } => Strategy::Dictionary,
            Shape::Object(_) => Strategy::Object,
        }
    }

    /// Whether reads must buffer the whole value subtree before this
    /// contract can decode it.
    pub fn requires_buffered_value(&self) -> bool {
        matches!(self.shape, Shape::Node)
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn number_handling(&self) -> Option<NumberHandling> {
        self.number_handling
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("type_name", &self.type_name)
            .field("strategy", &self.strategy())
            .finish()
    }
}

/// Builder for member-table contracts.
pub struct ObjectBuilder<T> {
    type_name: &'static str,
    members: Vec<ObjectMember>,
    number_handling: Option<NumberHandling>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send> ObjectBuilder<T> {
    /// Declare a required member. Missing it on read fails with
    /// `MissingRequiredMember`.
    pub fn member<F: Shaped + Any + Send>(self, name: &str, getter: fn(&T) -> &F) -> Self {
        self.push_member(name, getter, true)
    }

    /// Declare a member that may be absent; the constructor decides the
    /// fallback through [`FieldSlots::take_or`].
    pub fn optional_member<F: Shaped + Any + Send>(self, name: &str, getter: fn(&T) -> &F) -> Self {
        self.push_member(name, getter, false)
    }

    /// Number-handling override for the most recently declared member.
    pub fn member_numbers(mut self, handling: NumberHandling) -> Self {
        match self.members.last_mut() {
            Some(member) => member.numbers = Some(handling),
            None => panic!("member_numbers must follow a member declaration"),
        }
        self
    }

    /// Number-handling override for the whole contract.
    pub fn numbers(mut self, handling: NumberHandling) -> Self {
        self.number_handling = Some(handling);
        self
    }

    /// Finish with the instance constructor. The constructor pulls decoded
    /// members out of [`FieldSlots`] by name.
    pub fn build(self, ctor: impl Fn(&mut FieldSlots<'_>) -> Result<T> + Send + Sync + 'static) -> Contract {
        Contract {
            type_id: TypeId::of::<T>(),
            type_name: self.type_name,
            number_handling: self.number_handling,
            shape: Shape::Object(ObjectShape {
                members: self.members,
                ctor: Box::new(move |slots| Ok(Box::new(ctor(slots)?) as BoxedValue)),
                polymorphism: None,
            }),
        }
    }

    fn push_member<F: Shaped + Any + Send>(
        mut self,
        name: &str,
        getter: fn(&T) -> &F,
        required: bool,
    ) -> Self {
        if self.members.iter().any(|m| m.name == name) {
            panic!("duplicate member `{name}` on {}", self.type_name);
        }
        self.members.push(ObjectMember {
            name: SmolStr::from(name),
            slot: MemberSlot::of::<F>(),
            required,
            numbers: None,
            getter: Box::new(move |value: &dyn Any| -> &dyn Any {
                let typed = downcast_ref_value::<T>(value, "object getter input");
                getter(typed) as &dyn Any
            }),
        });
        self
    }
}

/// Builder for discriminator-dispatched contracts.
pub struct PolymorphicBuilder<T> {
    type_name: &'static str,
    tag: SmolStr,
    variants: Vec<Variant>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send> PolymorphicBuilder<T> {
    /// Register a variant: its discriminator value, the wrapper that lifts
    /// the decoded payload into `T`, and the projection the write side
    /// uses to recognize and unwrap it.
    pub fn variant<V: Shaped + Any + Send>(
        mut self,
        tag_value: &str,
        wrap: fn(V) -> T,
        project: fn(&T) -> Option<&V>,
    ) -> Self {
        if self.variants.iter().any(|v| v.tag_value == tag_value) {
            panic!("duplicate variant tag `{tag_value}` on {}", self.type_name);
        }
        self.variants.push(Variant {
            tag_value: SmolStr::from(tag_value),
            slot: MemberSlot::of::<V>(),
            wrap: Box::new(move |boxed| {
                let payload = downcast_value::<V>(boxed, "variant payload");
                Ok(Box::new(wrap(payload)) as BoxedValue)
            }),
            project: Box::new(move |value: &dyn Any| -> Option<&dyn Any> {
                let base = downcast_ref_value::<T>(value, "variant projection input");
                project(base).map(|v| v as &dyn Any)
            }),
        });
        self
    }

    pub fn build(self) -> Contract {
        Contract {
            type_id: TypeId::of::<T>(),
            type_name: self.type_name,
            number_handling: None,
            shape: Shape::Object(ObjectShape {
                members: Vec::new(),
                // Unreachable: the engine dispatches to a variant or fails
                // on the missing tag before constructing the base.
                ctor: Box::new(|_| panic!("a polymorphic contract constructs through its variants")),
                polymorphism: Some(Polymorphism {
                    tag: self.tag,
                    variants: self.variants,
                }),
            }),
        }
    }
}

/// Decoded member values handed to an object constructor, indexed by
/// member name. Asking for a name the contract never declared is a
/// contract violation and panics.
pub struct FieldSlots<'a> {
    type_name: &'static str,
    members: &'a [ObjectMember],
    values: &'a mut [Option<BoxedValue>],
}

impl<'a> FieldSlots<'a> {
    pub(crate) fn new(
        type_name: &'static str,
        members: &'a [ObjectMember],
        values: &'a mut [Option<BoxedValue>],
    ) -> Self {
        Self {
            type_name,
            members,
            values,
        }
    }

    /// Take a member that must have been decoded.
    pub fn take<F: Any>(&mut self, name: &str) -> Result<F> {
        let index = self.index_of(name);
        match self.values[index].take() {
            Some(boxed) => Ok(downcast_value::<F>(boxed, "constructor argument")),
            None => Err(Error::missing_required_member(self.type_name, name)),
        }
    }

    /// Take a member, falling back when it was absent.
    pub fn take_or<F: Any>(&mut self, name: &str, default: F) -> F {
        self.take_optional(name).unwrap_or(default)
    }

    pub fn take_optional<F: Any>(&mut self, name: &str) -> Option<F> {
        let index = self.index_of(name);
        self.values[index]
            .take()
            .map(|boxed| downcast_value::<F>(boxed, "constructor argument"))
    }

    fn index_of(&self, name: &str) -> usize {
        match self.members.iter().position(|m| m.name == name) {
            Some(index) => index,
            None => panic!("{} has no member named `{name}`", self.type_name),
        }
    }
}

/// Lazy reference to another type's contract. Resolution is deferred to
/// first use and cached, which is what lets recursive types (a tree node
/// holding a `Vec` of itself) resolve without infinite regress. The first
/// registry a slot resolves against wins the cache.
pub struct MemberSlot {
    resolve: fn(&Registry) -> ContractHandle,
    cache: OnceLock<ContractHandle>,
}

impl MemberSlot {
    pub fn of<T: Shaped + Any + Send>() -> Self {
        Self {
            resolve: |registry| registry.resolve::<T>(),
            cache: OnceLock::new(),
        }
    }

    pub(crate) fn get(&self, registry: &Registry) -> ContractHandle {
        self.cache
            .get_or_init(|| (self.resolve)(registry))
            .clone()
    }
}

impl fmt::Debug for MemberSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cache.get() {
            Some(handle) => write!(f, "MemberSlot({})", handle.type_name()),
            None => f.write_str("MemberSlot(unresolved)"),
        }
    }
}

/// Builds and caches one [`Contract`] per type.
pub struct Registry {
    contracts: RwLock<HashMap<TypeId, ContractHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            contracts: RwLock::new(HashMap::new()),
        }
    }

    /// The registry the one-shot and streaming entry points resolve
    /// against.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Contract for `T`, built on first request and cached.
    pub fn resolve<T: Shaped + Any + Send>(&self) -> ContractHandle {
        let id = TypeId::of::<T>();
        {
            let map = self
                .contracts
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = map.get(&id) {
                return handle.clone();
            }
        }
        // Built outside the lock: a contract() impl may resolve other
        // types eagerly.
        let contract = T::contract();
        if contract.type_id() != id {
            panic!(
                "contract() for {} returned a contract describing {}",
                std::any::type_name::<T>(),
                contract.type_name()
            );
        }
        let handle = Arc::new(contract);
        let mut map = self
            .contracts
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        map.entry(id).or_insert(handle).clone()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .contracts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        write!(f, "Registry({count} contracts)")
    }
}

/// Number-handling precedence: member override, then contract override,
/// then the baseline from the typed options.
pub(crate) fn effective_numbers(
    member: Option<NumberHandling>,
    contract: &Contract,
    baseline: NumberHandling,
) -> NumberHandling {
    member
        .or_else(|| contract.number_handling())
        .unwrap_or(baseline)
}

pub(crate) fn downcast_value<T: Any>(value: BoxedValue, context: &str) -> T {
    match value.downcast::<T>() {
        Ok(boxed) => *boxed,
        Err(_) => panic!(
            "contract violation: {context} is not a {}",
            std::any::type_name::<T>()
        ),
    }
}

pub(crate) fn downcast_ref_value<'v, T: Any>(value: &'v dyn Any, context: &str) -> &'v T {
    match value.downcast_ref::<T>() {
        Some(typed) => typed,
        None => panic!(
            "contract violation: {context} is not a {}",
            std::any::type_name::<T>()
        ),
    }
}

pub(crate) fn downcast_builder<'v, T: Any>(builder: &'v mut dyn Any, context: &str) -> &'v mut T {
    match builder.downcast_mut::<T>() {
        Some(typed) => typed,
        None => panic!(
            "contract violation: {context} is not a {}",
            std::any::type_name::<T>()
        ),
    }
}

/// Mismatch between the token under the cursor and what a codec expects.
pub(crate) fn token_mismatch(expected: &str, reader: &TokenReader<'_>) -> Error {
    Error::type_mismatch(expected, reader.kind().describe()).with_offset(reader.token_offset())
}
