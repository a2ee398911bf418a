//! Contracts for std scalars and collections.
//!
//! Scalars share a small number of codecs parameterized by conversion
//! functions; integer families are stamped out by macro. Collections get
//! one hooks struct per concrete shape, with the builder always the
//! mutable form and `finish` materializing immutable shapes at the end.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{Error, Result};
use crate::node::NodeTree;
use crate::num::{self, Number, NumberHandling};
use crate::reader::{TokenKind, TokenReader};
use crate::writer::TokenWriter;

use super::{
    downcast_builder, downcast_ref_value, downcast_value, token_mismatch, BoxedValue, Contract,
    MapHooks, SeqHooks, Shaped, ValueCodec,
};

struct BoolCodec;

impl ValueCodec for BoolCodec {
    fn read(&self, reader: &TokenReader<'_>, _numbers: NumberHandling) -> Result<BoxedValue> {
        match reader.kind() {
            TokenKind::True => Ok(Box::new(true)),
            TokenKind::False => Ok(Box::new(false)),
            _ => Err(token_mismatch("bool", reader)),
        }
    }

    fn write(
        &self,
        value: &dyn Any,
        writer: &mut TokenWriter,
        _numbers: NumberHandling,
    ) -> Result<()> {
        writer.write_bool(*downcast_ref_value::<bool>(value, "bool value"));
        Ok(())
    }
}

fn fast_write_bool(value: &dyn Any, writer: &mut TokenWriter) -> Result<()> {
    writer.write_bool(*downcast_ref_value::<bool>(value, "bool value"));
    Ok(())
}

impl Shaped for bool {
    fn contract() -> Contract {
        Contract::value_with_fast_write::<bool>("bool", BoolCodec, fast_write_bool)
    }
}

/// Shared scalar codec for everything that travels as a JSON number.
struct NumberCodec {
    name: &'static str,
    from_number: fn(Number) -> Option<BoxedValue>,
    to_number: fn(&dyn Any) -> Result<Number>,
}

impl ValueCodec for NumberCodec {
    fn read(&self, reader: &TokenReader<'_>, numbers: NumberHandling) -> Result<BoxedValue> {
        let parsed = match reader.kind() {
            TokenKind::Number => num::parse_number(reader.raw_slice())
                .map_err(|e| e.with_offset(reader.token_offset()))?,
            TokenKind::String if numbers.allow_reading_from_string => {
                let text = reader.unescaped_str()?;
                num::parse_number(text.as_bytes())
                    .map_err(|e| e.with_offset(reader.token_offset()))?
            }
            _ => return Err(token_mismatch(self.name, reader)),
        };
        match (self.from_number)(parsed) {
            Some(value) => Ok(value),
            None => Err(
                Error::number_format(format_args!("{parsed} out of range for {}", self.name))
                    .with_offset(reader.token_offset()),
            ),
        }
    }

    fn write(
        &self,
        value: &dyn Any,
        writer: &mut TokenWriter,
        numbers: NumberHandling,
    ) -> Result<()> {
        let number = (self.to_number)(value)?;
        if numbers.write_as_string {
            writer.write_number_as_string(&number);
        } else {
            writer.write_number(&number);
        }
        Ok(())
    }
}

macro_rules! signed_contracts {
    ($($ty:ty => $name:literal),+ $(,)?) => {$(
        impl Shaped for $ty {
            fn contract() -> Contract {
                Contract::value_with_fast_write::<$ty>(
                    $name,
                    NumberCodec {
                        name: $name,
                        from_number: |n| {
                            let v: $ty = n.as_i64().and_then(|i| <$ty>::try_from(i).ok())?;
                            Some(Box::new(v) as BoxedValue)
                        },
                        to_number: |value| {
                            Ok(Number::from(i64::from(*downcast_ref_value::<$ty>(
                                value, $name,
                            ))))
                        },
                    },
                    |value, writer| {
                        writer.write_i64(i64::from(*downcast_ref_value::<$ty>(value, $name)));
                        Ok(())
                    },
                )
            }
        }
    )+};
}

macro_rules! unsigned_contracts {
    ($($ty:ty => $name:literal),+ $(,)?) => {$(
        impl Shaped for $ty {
            fn contract() -> Contract {
                Contract::value_with_fast_write::<$ty>(
                    $name,
                    NumberCodec {
                        name: $name,
                        from_number: |n| {
                            let v: $ty = n.as_u64().and_then(|u| <$ty>::try_from(u).ok())?;
                            Some(Box::new(v) as BoxedValue)
                        },
                        to_number: |value| {
                            Ok(Number::from(u64::from(*downcast_ref_value::<$ty>(
                                value, $name,
                            ))))
                        },
                    },
                    |value, writer| {
                        writer.write_u64(u64::from(*downcast_ref_value::<$ty>(value, $name)));
                        Ok(())
                    },
                )
            }
        }
    )+};
}

signed_contracts!(i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64");
unsigned_contracts!(u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64");

impl Shaped for f64 {
    fn contract() -> Contract {
        Contract::value::<f64>(
            "f64",
            NumberCodec {
                name: "f64",
                from_number: |n| Some(Box::new(n.as_f64()) as BoxedValue),
                to_number: |value| {
                    Number::from_f64(*downcast_ref_value::<f64>(value, "f64 value"))
                        .ok_or_else(|| Error::number_format("non-finite float"))
                },
            },
        )
    }
}

impl Shaped for f32 {
    fn contract() -> Contract {
        // Widened to f64 for the text form, like serde does; the shortest
        // round-trip form of the widened value is what gets written.
        Contract::value::<f32>(
            "f32",
            NumberCodec {
                name: "f32",
                from_number: |n| Some(Box::new(n.as_f64() as f32) as BoxedValue),
                to_number: |value| {
                    Number::from_f64(f64::from(*downcast_ref_value::<f32>(value, "f32 value")))
                        .ok_or_else(|| Error::number_format("non-finite float"))
                },
            },
        )
    }
}

impl Shaped for Number {
    fn contract() -> Contract {
        Contract::value::<Number>(
            "number",
            NumberCodec {
                name: "number",
                from_number: |n| Some(Box::new(n) as BoxedValue),
                to_number: |value| {
                    let n = *downcast_ref_value::<Number>(value, "number value");
                    if let Number::Float(f) = n {
                        if !f.is_finite() {
                            return Err(Error::number_format("non-finite float"));
                        }
                    }
                    Ok(n)
                },
            },
        )
    }
}

impl Shaped for usize {
    fn contract() -> Contract {
        Contract::cast::<usize, u64>(
            "usize",
            |u| {
                usize::try_from(u)
                    .map_err(|_| Error::number_format(format_args!("{u} out of range for usize")))
            },
            |v| *v as u64,
        )
    }
}

impl Shaped for isize {
    fn contract() -> Contract {
        Contract::cast::<isize, i64>(
            "isize",
            |i| {
                isize::try_from(i)
                    .map_err(|_| Error::number_format(format_args!("{i} out of range for isize")))
            },
            |v| *v as i64,
        )
    }
}

struct StringCodec;

impl ValueCodec for StringCodec {
    fn read(&self, reader: &TokenReader<'_>, _numbers: NumberHandling) -> Result<BoxedValue> {
        match reader.kind() {
            TokenKind::String => Ok(Box::new(reader.unescaped_str()?.into_owned())),
            _ => Err(token_mismatch("string", reader)),
        }
    }

    fn write(
        &self,
        value: &dyn Any,
        writer: &mut TokenWriter,
        _numbers: NumberHandling,
    ) -> Result<()> {
        writer.write_string(downcast_ref_value::<String>(value, "string value"));
        Ok(())
    }
}

fn fast_write_string(value: &dyn Any, writer: &mut TokenWriter) -> Result<()> {
    writer.write_string(downcast_ref_value::<String>(value, "string value"));
    Ok(())
}

impl Shaped for String {
    fn contract() -> Contract {
        Contract::value_with_fast_write::<String>("string", StringCodec, fast_write_string)
    }
}

struct SmolStrCodec;

impl ValueCodec for SmolStrCodec {
    fn read(&self, reader: &TokenReader<'_>, _numbers: NumberHandling) -> Result<BoxedValue> {
        match reader.kind() {
            TokenKind::String => Ok(Box::new(SmolStr::from(reader.unescaped_str()?.as_ref()))),
            _ => Err(token_mismatch("string", reader)),
        }
    }

    fn write(
        &self,
        value: &dyn Any,
        writer: &mut TokenWriter,
        _numbers: NumberHandling,
    ) -> Result<()> {
        writer.write_string(downcast_ref_value::<SmolStr>(value, "string value"));
        Ok(())
    }
}

impl Shaped for SmolStr {
    fn contract() -> Contract {
        Contract::value::<SmolStr>("string", SmolStrCodec)
    }
}

impl Shaped for Box<str> {
    fn contract() -> Contract {
        Contract::cast::<Box<str>, String>(
            "Box<str>",
            |s| Ok(s.into_boxed_str()),
            |b| String::from(&**b),
        )
    }
}

struct CharCodec;

impl ValueCodec for CharCodec {
    fn read(&self, reader: &TokenReader<'_>, _numbers: NumberHandling) -> Result<BoxedValue> {
        if reader.kind() != TokenKind::String {
            return Err(token_mismatch("char", reader));
        }
        let text = reader.unescaped_str()?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Box::new(c)),
            _ => Err(Error::type_mismatch(
                "a single-character string",
                format_args!("a string of {} characters", text.chars().count()),
            )
            .with_offset(reader.token_offset())),
        }
    }

    fn write(
        &self,
        value: &dyn Any,
        writer: &mut TokenWriter,
        _numbers: NumberHandling,
    ) -> Result<()> {
        let c = *downcast_ref_value::<char>(value, "char value");
        writer.write_string(c.encode_utf8(&mut [0u8; 4]));
        Ok(())
    }
}

impl Shaped for char {
    fn contract() -> Contract {
        Contract::value::<char>("char", CharCodec)
    }
}

impl<T: Shaped + Any + Send> Shaped for Option<T> {
    fn contract() -> Contract {
        Contract::optional::<T>()
    }
}

impl Shaped for NodeTree {
    fn contract() -> Contract {
        Contract::node::<NodeTree>("node tree")
    }
}

struct VecHooks<T>(PhantomData<fn() -> T>);

impl<T: Any + Send> SeqHooks for VecHooks<T> {
    fn create(&self) -> BoxedValue {
        Box::new(Vec::<T>::new())
    }

    fn add(&self, builder: &mut dyn Any, element: BoxedValue) -> Result<()> {
        downcast_builder::<Vec<T>>(builder, "vec builder")
            .push(downcast_value::<T>(element, "vec element"));
        Ok(())
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        Ok(builder)
    }

    fn len(&self, value: &dyn Any) -> usize {
        downcast_ref_value::<Vec<T>>(value, "vec value").len()
    }

    fn element_at<'v>(&self, value: &'v dyn Any, index: usize) -> &'v dyn Any {
        &downcast_ref_value::<Vec<T>>(value, "vec value")[index]
    }
}

impl<T: Shaped + Any + Send> Shaped for Vec<T> {
    fn contract() -> Contract {
        Contract::sequence::<Vec<T>, T>(std::any::type_name::<Vec<T>>(), VecHooks::<T>(PhantomData))
    }
}

struct VecDequeHooks<T>(PhantomData<fn() -> T>);

impl<T: Any + Send> SeqHooks for VecDequeHooks<T> {
    fn create(&self) -> BoxedValue {
        Box::new(VecDeque::<T>::new())
    }

    fn add(&self, builder: &mut dyn Any, element: BoxedValue) -> Result<()> {
        downcast_builder::<VecDeque<T>>(builder, "deque builder")
            .push_back(downcast_value::<T>(element, "deque element"));
        Ok(())
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        Ok(builder)
    }

    fn len(&self, value: &dyn Any) -> usize {
        downcast_ref_value::<VecDeque<T>>(value, "deque value").len()
    }

    fn element_at<'v>(&self, value: &'v dyn Any, index: usize) -> &'v dyn Any {
        &downcast_ref_value::<VecDeque<T>>(value, "deque value")[index]
    }
}

impl<T: Shaped + Any + Send> Shaped for VecDeque<T> {
    fn contract() -> Contract {
        Contract::sequence::<VecDeque<T>, T>(
            std::any::type_name::<VecDeque<T>>(),
            VecDequeHooks::<T>(PhantomData),
        )
    }
}

struct ArrayHooks<T, const N: usize>(PhantomData<fn() -> T>);

impl<T: Any + Send, const N: usize> SeqHooks for ArrayHooks<T, N> {
    fn create(&self) -> BoxedValue {
        Box::new(Vec::<T>::with_capacity(N))
    }

    fn add(&self, builder: &mut dyn Any, element: BoxedValue) -> Result<()> {
        let vec = downcast_builder::<Vec<T>>(builder, "array builder");
        if vec.len() >= N {
            return Err(Error::not_supported(format!(
                "fixed-size array holds {N} elements"
            )));
        }
        vec.push(downcast_value::<T>(element, "array element"));
        Ok(())
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        let vec = downcast_value::<Vec<T>>(builder, "array builder");
        match <[T; N]>::try_from(vec) {
            Ok(array) => Ok(Box::new(array)),
            Err(vec) => Err(Error::type_mismatch(
                "a full fixed-size array",
                format_args!("{} of {N} elements", vec.len()),
            )),
        }
    }

    fn len(&self, _value: &dyn Any) -> usize {
        N
    }

    fn element_at<'v>(&self, value: &'v dyn Any, index: usize) -> &'v dyn Any {
        &downcast_ref_value::<[T; N]>(value, "array value")[index]
    }
}

impl<T: Shaped + Any + Send, const N: usize> Shaped for [T; N] {
    fn contract() -> Contract {
        Contract::sequence::<[T; N], T>(
            std::any::type_name::<[T; N]>(),
            ArrayHooks::<T, N>(PhantomData),
        )
    }
}

struct BoxSliceHooks<T>(PhantomData<fn() -> T>);

impl<T: Any + Send> SeqHooks for BoxSliceHooks<T> {
    fn create(&self) -> BoxedValue {
        Box::new(Vec::<T>::new())
    }

    fn add(&self, builder: &mut dyn Any, element: BoxedValue) -> Result<()> {
        downcast_builder::<Vec<T>>(builder, "slice builder")
            .push(downcast_value::<T>(element, "slice element"));
        Ok(())
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        let vec = downcast_value::<Vec<T>>(builder, "slice builder");
        Ok(Box::new(vec.into_boxed_slice()))
    }

    fn len(&self, value: &dyn Any) -> usize {
        downcast_ref_value::<Box<[T]>>(value, "slice value").len()
    }

    fn element_at<'v>(&self, value: &'v dyn Any, index: usize) -> &'v dyn Any {
        &downcast_ref_value::<Box<[T]>>(value, "slice value")[index]
    }
}

impl<T: Shaped + Any + Send> Shaped for Box<[T]> {
    fn contract() -> Contract {
        Contract::sequence::<Box<[T]>, T>(
            std::any::type_name::<Box<[T]>>(),
            BoxSliceHooks::<T>(PhantomData),
        )
    }
}

struct ArcSliceHooks<T>(PhantomData<fn() -> T>);

impl<T: Any + Send + Sync> SeqHooks for ArcSliceHooks<T> {
    fn create(&self) -> BoxedValue {
        Box::new(Vec::<T>::new())
    }

    fn add(&self, builder: &mut dyn Any, element: BoxedValue) -> Result<()> {
        downcast_builder::<Vec<T>>(builder, "slice builder")
            .push(downcast_value::<T>(element, "slice element"));
        Ok(())
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        let vec = downcast_value::<Vec<T>>(builder, "slice builder");
        Ok(Box::new(Arc::<[T]>::from(vec)))
    }

    fn len(&self, value: &dyn Any) -> usize {
        downcast_ref_value::<Arc<[T]>>(value, "slice value").len()
    }

    fn element_at<'v>(&self, value: &'v dyn Any, index: usize) -> &'v dyn Any {
        &downcast_ref_value::<Arc<[T]>>(value, "slice value")[index]
    }
}

impl<T: Shaped + Any + Send + Sync> Shaped for Arc<[T]> {
    fn contract() -> Contract {
        Contract::sequence::<Arc<[T]>, T>(
            std::any::type_name::<Arc<[T]>>(),
            ArcSliceHooks::<T>(PhantomData),
        )
    }
}

struct HashSetHooks<T>(PhantomData<fn() -> T>);

impl<T: Any + Send + Eq + Hash> SeqHooks for HashSetHooks<T> {
    fn create(&self) -> BoxedValue {
        Box::new(HashSet::<T>::new())
    }

    fn add(&self, builder: &mut dyn Any, element: BoxedValue) -> Result<()> {
        downcast_builder::<HashSet<T>>(builder, "set builder")
            .insert(downcast_value::<T>(element, "set element"));
        Ok(())
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        Ok(builder)
    }

    fn len(&self, value: &dyn Any) -> usize {
        downcast_ref_value::<HashSet<T>>(value, "set value").len()
    }

    fn element_at<'v>(&self, value: &'v dyn Any, index: usize) -> &'v dyn Any {
        match downcast_ref_value::<HashSet<T>>(value, "set value")
            .iter()
            .nth(index)
        {
            Some(element) => element,
            None => panic!("element index {index} out of bounds"),
        }
    }
}

impl<T: Shaped + Any + Send + Eq + Hash> Shaped for HashSet<T> {
    fn contract() -> Contract {
        Contract::sequence::<HashSet<T>, T>(
            std::any::type_name::<HashSet<T>>(),
            HashSetHooks::<T>(PhantomData),
        )
    }
}

struct BTreeSetHooks<T>(PhantomData<fn() -> T>);

impl<T: Any + Send + Ord> SeqHooks for BTreeSetHooks<T> {
    fn create(&self) -> BoxedValue {
        Box::new(BTreeSet::<T>::new())
    }

    fn add(&self, builder: &mut dyn Any, element: BoxedValue) -> Result<()> {
        downcast_builder::<BTreeSet<T>>(builder, "set builder")
            .insert(downcast_value::<T>(element, "set element"));
        Ok(())
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        Ok(builder)
    }

    fn len(&self, value: &dyn Any) -> usize {
        downcast_ref_value::<BTreeSet<T>>(value, "set value").len()
    }

    fn element_at<'v>(&self, value: &'v dyn Any, index: usize) -> &'v dyn Any {
        match downcast_ref_value::<BTreeSet<T>>(value, "set value")
            .iter()
            .nth(index)
        {
            Some(element) => element,
            None => panic!("element index {index} out of bounds"),
        }
    }
}

impl<T: Shaped + Any + Send + Ord> Shaped for BTreeSet<T> {
    fn contract() -> Contract {
        Contract::sequence::<BTreeSet<T>, T>(
            std::any::type_name::<BTreeSet<T>>(),
            BTreeSetHooks::<T>(PhantomData),
        )
    }
}

struct HashMapHooks<V>(PhantomData<fn() -> V>);

impl<V: Any + Send> MapHooks for HashMapHooks<V> {
    fn create(&self) -> BoxedValue {
        Box::new(HashMap::<String, V>::new())
    }

    fn insert(&self, builder: &mut dyn Any, key: SmolStr, value: BoxedValue) -> Result<bool> {
        Ok(downcast_builder::<HashMap<String, V>>(builder, "map builder")
            .insert(key.to_string(), downcast_value::<V>(value, "map value"))
            .is_some())
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        Ok(builder)
    }

    fn len(&self, value: &dyn Any) -> usize {
        downcast_ref_value::<HashMap<String, V>>(value, "map value").len()
    }

    fn entry_at<'v>(&self, value: &'v dyn Any, index: usize) -> (&'v str, &'v dyn Any) {
        match downcast_ref_value::<HashMap<String, V>>(value, "map value")
            .iter()
            .nth(index)
        {
            Some((key, entry)) => (key.as_str(), entry),
            None => panic!("entry index {index} out of bounds"),
        }
    }
}

impl<V: Shaped + Any + Send> Shaped for HashMap<String, V> {
    fn contract() -> Contract {
        Contract::dictionary::<HashMap<String, V>, V>(
            std::any::type_name::<HashMap<String, V>>(),
            HashMapHooks::<V>(PhantomData),
        )
    }
}

struct BTreeMapHooks<V>(PhantomData<fn() -> V>);

impl<V: Any + Send> MapHooks for BTreeMapHooks<V> {
    fn create(&self) -> BoxedValue {
        Box::new(BTreeMap::<String, V>::new())
    }

    fn insert(&self, builder: &mut dyn Any, key: SmolStr, value: BoxedValue) -> Result<bool> {
        Ok(
            downcast_builder::<BTreeMap<String, V>>(builder, "map builder")
                .insert(key.to_string(), downcast_value::<V>(value, "map value"))
                .is_some(),
        )
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        Ok(builder)
    }

    fn len(&self, value: &dyn Any) -> usize {
        downcast_ref_value::<BTreeMap<String, V>>(value, "map value").len()
    }

    fn entry_at<'v>(&self, value: &'v dyn Any, index: usize) -> (&'v str, &'v dyn Any) {
        match downcast_ref_value::<BTreeMap<String, V>>(value, "map value")
            .iter()
            .nth(index)
        {
            Some((key, entry)) => (key.as_str(), entry),
            None => panic!("entry index {index} out of bounds"),
        }
    }
}

impl<V: Shaped + Any + Send> Shaped for BTreeMap<String, V> {
    fn contract() -> Contract {
        Contract::dictionary::<BTreeMap<String, V>, V>(
            std::any::type_name::<BTreeMap<String, V>>(),
            BTreeMapHooks::<V>(PhantomData),
        )
    }
}

struct IndexMapHooks<V>(PhantomData<fn() -> V>);

impl<V: Any + Send> MapHooks for IndexMapHooks<V> {
    fn create(&self) -> BoxedValue {
        Box::new(IndexMap::<String, V>::new())
    }

    fn insert(&self, builder: &mut dyn Any, key: SmolStr, value: BoxedValue) -> Result<bool> {
        Ok(
            downcast_builder::<IndexMap<String, V>>(builder, "map builder")
                .insert(key.to_string(), downcast_value::<V>(value, "map value"))
                .is_some(),
        )
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        Ok(builder)
    }

    fn len(&self, value: &dyn Any) -> usize {
        downcast_ref_value::<IndexMap<String, V>>(value, "map value").len()
    }

    fn entry_at<'v>(&self, value: &'v dyn Any, index: usize) -> (&'v str, &'v dyn Any) {
        match downcast_ref_value::<IndexMap<String, V>>(value, "map value").get_index(index) {
            Some((key, entry)) => (key.as_str(), entry),
            None => panic!("entry index {index} out of bounds"),
        }
    }
}

impl<V: Shaped + Any + Send> Shaped for IndexMap<String, V> {
    fn contract() -> Contract {
        Contract::dictionary::<IndexMap<String, V>, V>(
            std::any::type_name::<IndexMap<String, V>>(),
            IndexMapHooks::<V>(PhantomData),
        )
    }
}

struct SmolKeyMapHooks<V>(PhantomData<fn() -> V>);

impl<V: Any + Send> MapHooks for SmolKeyMapHooks<V> {
    fn create(&self) -> BoxedValue {
        Box::new(IndexMap::<SmolStr, V>::new())
    }

    fn insert(&self, builder: &mut dyn Any, key: SmolStr, value: BoxedValue) -> Result<bool> {
        Ok(
            downcast_builder::<IndexMap<SmolStr, V>>(builder, "map builder")
                .insert(key, downcast_value::<V>(value, "map value"))
                .is_some(),
        )
    }

    fn finish(&self, builder: BoxedValue) -> Result<BoxedValue> {
        Ok(builder)
    }

    fn len(&self, value: &dyn Any) -> usize {
        downcast_ref_value::<IndexMap<SmolStr, V>>(value, "map value").len()
    }

    fn entry_at<'v>(&self, value: &'v dyn Any, index: usize) -> (&'v str, &'v dyn Any) {
        match downcast_ref_value::<IndexMap<SmolStr, V>>(value, "map value").get_index(index) {
            Some((key, entry)) => (key.as_str(), entry),
            None => panic!("entry index {index} out of bounds"),
        }
    }
}

impl<V: Shaped + Any + Send> Shaped for IndexMap<SmolStr, V> {
    fn contract() -> Contract {
        Contract::dictionary::<IndexMap<SmolStr, V>, V>(
            std::any::type_name::<IndexMap<SmolStr, V>>(),
            SmolKeyMapHooks::<V>(PhantomData),
        )
    }
}
