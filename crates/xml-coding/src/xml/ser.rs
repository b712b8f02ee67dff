//! Encode engine: turns serde calls into a [`Value`] tree.
//!
//! The encoder keeps a stack of values under construction and the coding path
//! of the value being encoded. Every child value is boxed in isolation: the
//! encoder records the stack depth, lets the child serialize itself, and pops
//! whatever the child produced. A child that produced nothing becomes an empty
//! element.
//!
//! Containers hand out the same API to hand-written encoders and to serde:
//! `SerializeStruct` and `SerializeMap` run on the keyed container,
//! `SerializeSeq` and the tuple traits on the unkeyed container. A container
//! reserves its slot when it is created and writes its buffer into that slot
//! when it is dropped.

use std::any::type_name;
use std::mem;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::ser::{self, Serialize};
use tracing::trace;
use xml_coding_support::{ATTRIBUTE_TOKEN, CDATA_TOKEN, DATA_TOKEN, DATE_TOKEN, Date};

use crate::error::{Result, XmlCodingError};
use crate::path::{CodingPath, PathSegment, SUPER_KEY};
use crate::registry;
use crate::strategy::{
    DataEncodingStrategy, DateEncodingStrategy, EncodingOptions, StringEncodingStrategy,
};
use crate::value::{Keyed, TEXT_KEY, Value};
use crate::xml::utils::{is_valid_name, strip_attribute_prefix};

/// Encodes `value` and checks that the result can be a document element.
pub(crate) fn encode_root<T: ?Sized + Serialize>(value: &T, options: &EncodingOptions) -> Result<Value> {
    let mut encoder = Encoder::new(options);
    encoder.encode(value)?;
    match encoder.finish() {
        root @ Value::Keyed(_) => Ok(root),
        other => {
            let fragment = match other {
                Value::Null => "a null",
                Value::Scalar(_) | Value::CData(_) => "a scalar",
                _ => "a sequence",
            };
            Err(XmlCodingError::invalid_value(
                &[],
                format!("Top-level {} encoded as {fragment} XML fragment.", type_name::<T>()),
            ))
        }
    }
}

/// A child value after boxing, with the marker its serializer left behind.
struct Boxed {
    value: Value,
    attribute: bool,
}

/// Encodes Rust values into a value tree.
pub struct Encoder<'o> {
    storage: Vec<Value>,
    path: CodingPath,
    options: &'o EncodingOptions,
    /// Stack depth at which the value currently being boxed lives.
    base: usize,
    /// Set by the attribute marker for the value currently being boxed.
    attribute: bool,
}

impl<'o> Encoder<'o> {
    pub fn new(options: &'o EncodingOptions) -> Self {
        Self::with_path(options, Vec::new())
    }

    fn with_path(options: &'o EncodingOptions, path: CodingPath) -> Self {
        Encoder {
            storage: Vec::new(),
            path,
            options,
            base: 0,
            attribute: false,
        }
    }

    pub fn coding_path(&self) -> &[PathSegment] {
        &self.path
    }

    pub fn options(&self) -> &'o EncodingOptions {
        self.options
    }

    /// Encodes `value` as the current value.
    pub fn encode<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut *self).map_err(|err| err.at(&self.path))
    }

    /// The encoded value, or an empty element when nothing was encoded.
    pub fn finish(mut self) -> Value {
        self.storage.pop().unwrap_or_else(|| Value::Keyed(Keyed::new()))
    }

    pub fn keyed_container(&mut self) -> KeyedEncodingContainer<'_, 'o> {
        let (index, buffer) = if self.can_encode_new_value() {
            self.storage.push(Value::Keyed(Keyed::new()));
            (self.storage.len() - 1, Keyed::new())
        } else {
            let index = self.storage.len() - 1;
            match self.storage.last_mut() {
                Some(Value::Keyed(keyed)) => (index, mem::take(keyed)),
                _ => panic!(
                    "Attempt to push new keyed encoding container when already previously encoded at this path."
                ),
            }
        };
        KeyedEncodingContainer::new(self, Sink::Slot(index), buffer, false)
    }

    pub fn unkeyed_container(&mut self) -> UnkeyedEncodingContainer<'_, 'o> {
        let (index, buffer) = if self.can_encode_new_value() {
            self.storage.push(Value::Sequence(Vec::new()));
            (self.storage.len() - 1, Vec::new())
        } else {
            let index = self.storage.len() - 1;
            match self.storage.last_mut() {
                Some(Value::Sequence(items)) => (index, mem::take(items)),
                _ => panic!(
                    "Attempt to push new unkeyed encoding container when already previously encoded at this path."
                ),
            }
        };
        UnkeyedEncodingContainer::new(self, Sink::Slot(index), buffer, false)
    }

    pub fn single_value_container(&mut self) -> SingleValueEncodingContainer<'_, 'o> {
        SingleValueEncodingContainer { encoder: self }
    }

    fn can_encode_new_value(&self) -> bool {
        self.storage.len() == self.base
    }

    fn push(&mut self, value: Value) -> Result<()> {
        assert!(
            self.can_encode_new_value(),
            "Attempt to encode value through single value container when previously value already encoded."
        );
        self.storage.push(value);
        Ok(())
    }

    fn push_string(&mut self, text: String) -> Result<()> {
        match self.options.string {
            StringEncodingStrategy::Deferred => self.push(Value::Scalar(text)),
            StringEncodingStrategy::CData => self.push(Value::CData(text)),
        }
    }

    /// Serializes `value` one level below the current path and returns what it produced.
    fn box_value<T: ?Sized + Serialize>(&mut self, segment: PathSegment, value: &T) -> Result<Boxed> {
        let saved_base = mem::replace(&mut self.base, self.storage.len());
        let saved_attribute = mem::take(&mut self.attribute);
        self.path.push(segment);

        let result = value.serialize(&mut *self).map_err(|err| err.at(&self.path));

        let attribute = mem::replace(&mut self.attribute, saved_attribute);
        let produced = if self.storage.len() > self.base {
            self.storage.truncate(self.base + 1);
            self.storage.pop()
        } else {
            None
        };
        self.path.pop();
        self.base = saved_base;

        result?;
        Ok(Boxed {
            value: produced.unwrap_or_else(|| Value::Keyed(Keyed::new())),
            attribute,
        })
    }

    /// Runs a user callback that encodes through this encoder; an empty
    /// element stands in when the callback encodes nothing.
    fn encode_with(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let depth = self.storage.len();
        f(self)?;
        if self.storage.len() == depth {
            self.push(Value::Keyed(Keyed::new()))?;
        }
        Ok(())
    }

    fn encode_date(&mut self, date: DateTime<Utc>) -> Result<()> {
        let options = self.options;
        trace!(strategy = ?options.date, "Encoding date");
        match &options.date {
            DateEncodingStrategy::Deferred => {
                let seconds = Date(date).reference_seconds();
                let text = registry::box_f64(seconds, &options.non_conforming_float, &self.path)?;
                self.push(Value::Scalar(text))
            }
            DateEncodingStrategy::Custom(encode) => self.encode_with(|encoder| encode(&date, encoder)),
            strategy => {
                let text = registry::box_date(&date, strategy, &self.path)?;
                self.push(Value::Scalar(text.unwrap_or_default()))
            }
        }
    }

    fn encode_data(&mut self, bytes: &[u8]) -> Result<()> {
        let options = self.options;
        trace!(strategy = ?options.data, len = bytes.len(), "Encoding data");
        match &options.data {
            DataEncodingStrategy::Deferred => {
                let mut container = self.unkeyed_container();
                for byte in bytes {
                    container.encode(byte)?;
                }
                Ok(())
            }
            DataEncodingStrategy::Base64 => self.push(Value::Scalar(registry::box_data(bytes))),
            DataEncodingStrategy::Custom(encode) => self.encode_with(|encoder| encode(bytes, encoder)),
        }
    }

    /// Reserves a slot for an enum variant container: `{variant: ...}`.
    fn variant_slot(&mut self, variant: &'static str) -> usize {
        assert!(
            self.can_encode_new_value(),
            "Attempt to push new variant encoding container when already previously encoded at this path."
        );
        self.storage.push(Value::Keyed(Keyed::new()));
        self.path.push(PathSegment::key(variant));
        self.storage.len() - 1
    }
}

/// Where a container writes its buffer when it is dropped.
enum Sink<'a> {
    /// A slot in the encoder's own storage.
    Slot(usize),
    /// A storage slot, wrapped as `{variant: buffer}`.
    Variant(usize, &'static str),
    /// A reserved entry in an enclosing container.
    Parent(ParentSlot<'a>),
}

enum ParentSlot<'a> {
    Keyed(&'a mut Keyed, String),
    Unkeyed(&'a mut Vec<Value>, usize),
}

impl Sink<'_> {
    fn fill(&mut self, storage: &mut [Value], value: Value) {
        match self {
            Sink::Slot(index) => {
                if let Some(slot) = storage.get_mut(*index) {
                    *slot = value;
                }
            }
            Sink::Variant(index, variant) => {
                if let Some(slot) = storage.get_mut(*index) {
                    let mut wrapper = Keyed::new();
                    wrapper.insert(*variant, value);
                    *slot = Value::Keyed(wrapper);
                }
            }
            Sink::Parent(parent) => parent.fill(value),
        }
    }
}

impl ParentSlot<'_> {
    fn fill(&mut self, value: Value) {
        match self {
            ParentSlot::Keyed(keyed, key) => keyed.insert(mem::take(key), value),
            ParentSlot::Unkeyed(items, index) => {
                if let Some(slot) = items.get_mut(*index) {
                    *slot = value;
                }
            }
        }
    }
}

/// Writes named child elements and attributes of one element.
pub struct KeyedEncodingContainer<'a, 'o> {
    encoder: &'a mut Encoder<'o>,
    sink: Sink<'a>,
    buffer: Keyed,
    pending_key: Option<String>,
    pops_path: bool,
}

impl<'a, 'o> KeyedEncodingContainer<'a, 'o> {
    fn new(encoder: &'a mut Encoder<'o>, sink: Sink<'a>, buffer: Keyed, pops_path: bool) -> Self {
        KeyedEncodingContainer {
            encoder,
            sink,
            buffer,
            pending_key: None,
            pops_path,
        }
    }

    pub fn coding_path(&self) -> &[PathSegment] {
        &self.encoder.path
    }

    /// Document name for a child element; the text key is never converted.
    fn element_name(&self, key: &str) -> String {
        if key == TEXT_KEY {
            key.to_string()
        } else {
            self.encoder.options.key.convert(&self.encoder.path, key)
        }
    }

    /// Encodes `value` under `key`. A `None` or unit value adds nothing.
    pub fn encode<T: ?Sized + Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let boxed = self.encoder.box_value(PathSegment::key(key), value)?;
        if boxed.attribute || strip_attribute_prefix(key).is_some() {
            return self.store_attribute(key, boxed.value);
        }
        if !boxed.value.is_null() {
            let name = self.element_name(key);
            self.buffer.insert(name, boxed.value);
        }
        Ok(())
    }

    /// Encodes `value` as an attribute of this element.
    pub fn encode_attribute<T: ?Sized + Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let boxed = self.encoder.box_value(PathSegment::key(key), value)?;
        self.store_attribute(key, boxed.value)
    }

    fn store_attribute(&mut self, key: &str, value: Value) -> Result<()> {
        let bare = strip_attribute_prefix(key).unwrap_or(key);
        let name = self.encoder.options.key.convert(&self.encoder.path, bare);
        match value {
            Value::Null => Ok(()),
            Value::Scalar(text) | Value::CData(text) => {
                self.buffer.insert_attribute(name, Value::Scalar(text));
                Ok(())
            }
            other => {
                let mut path = self.encoder.path.clone();
                path.push(PathSegment::key(key));
                Err(XmlCodingError::invalid_value(
                    &path,
                    format!("Cannot encode {} as an XML attribute.", other.kind()),
                ))
            }
        }
    }

    /// Writes an empty element under `key`.
    pub fn encode_nil(&mut self, key: &str) -> Result<()> {
        let name = self.element_name(key);
        self.buffer.insert(name, Value::Null);
        Ok(())
    }

    pub fn nested_keyed_container(&mut self, key: &str) -> KeyedEncodingContainer<'_, 'o> {
        let name = self.element_name(key);
        self.buffer.insert(name.clone(), Value::Keyed(Keyed::new()));
        self.encoder.path.push(PathSegment::key(key));
        KeyedEncodingContainer::new(
            &mut *self.encoder,
            Sink::Parent(ParentSlot::Keyed(&mut self.buffer, name)),
            Keyed::new(),
            true,
        )
    }

    pub fn nested_unkeyed_container(&mut self, key: &str) -> UnkeyedEncodingContainer<'_, 'o> {
        let name = self.element_name(key);
        self.buffer.insert(name.clone(), Value::Sequence(Vec::new()));
        self.encoder.path.push(PathSegment::key(key));
        UnkeyedEncodingContainer::new(
            &mut *self.encoder,
            Sink::Parent(ParentSlot::Keyed(&mut self.buffer, name)),
            Vec::new(),
            true,
        )
    }

    /// An encoder whose value is stored under the reserved `super` key.
    pub fn super_encoder(&mut self) -> ReferencingEncoder<'_, 'o> {
        self.super_encoder_for_key(SUPER_KEY)
    }

    pub fn super_encoder_for_key(&mut self, key: &str) -> ReferencingEncoder<'_, 'o> {
        let name = self.element_name(key);
        self.buffer.insert(name.clone(), Value::Keyed(Keyed::new()));
        let mut path = self.encoder.path.clone();
        path.push(PathSegment::key(key));
        ReferencingEncoder {
            encoder: Encoder::with_path(self.encoder.options, path),
            slot: ParentSlot::Keyed(&mut self.buffer, name),
        }
    }
}

impl Drop for KeyedEncodingContainer<'_, '_> {
    fn drop(&mut self) {
        let value = Value::Keyed(mem::take(&mut self.buffer));
        self.sink.fill(&mut self.encoder.storage, value);
        if self.pops_path {
            self.encoder.path.pop();
        }
    }
}

/// Writes the members of a repeated element.
pub struct UnkeyedEncodingContainer<'a, 'o> {
    encoder: &'a mut Encoder<'o>,
    sink: Sink<'a>,
    buffer: Vec<Value>,
    pops_path: bool,
}

impl<'a, 'o> UnkeyedEncodingContainer<'a, 'o> {
    fn new(encoder: &'a mut Encoder<'o>, sink: Sink<'a>, buffer: Vec<Value>, pops_path: bool) -> Self {
        UnkeyedEncodingContainer {
            encoder,
            sink,
            buffer,
            pops_path,
        }
    }

    pub fn coding_path(&self) -> &[PathSegment] {
        &self.encoder.path
    }

    pub fn count(&self) -> usize {
        self.buffer.len()
    }

    /// Appends `value`. Unlike keyed encoding, a `None` member is kept as an
    /// empty element so positions are preserved.
    pub fn encode<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let index = self.buffer.len();
        let boxed = self.encoder.box_value(PathSegment::Index(index), value)?;
        self.buffer.push(boxed.value);
        Ok(())
    }

    pub fn encode_nil(&mut self) -> Result<()> {
        self.buffer.push(Value::Null);
        Ok(())
    }

    pub fn nested_keyed_container(&mut self) -> KeyedEncodingContainer<'_, 'o> {
        let index = self.buffer.len();
        self.buffer.push(Value::Keyed(Keyed::new()));
        self.encoder.path.push(PathSegment::Index(index));
        KeyedEncodingContainer::new(
            &mut *self.encoder,
            Sink::Parent(ParentSlot::Unkeyed(&mut self.buffer, index)),
            Keyed::new(),
            true,
        )
    }

    pub fn nested_unkeyed_container(&mut self) -> UnkeyedEncodingContainer<'_, 'o> {
        let index = self.buffer.len();
        self.buffer.push(Value::Sequence(Vec::new()));
        self.encoder.path.push(PathSegment::Index(index));
        UnkeyedEncodingContainer::new(
            &mut *self.encoder,
            Sink::Parent(ParentSlot::Unkeyed(&mut self.buffer, index)),
            Vec::new(),
            true,
        )
    }

    /// An encoder whose value becomes the next member.
    pub fn super_encoder(&mut self) -> ReferencingEncoder<'_, 'o> {
        let index = self.buffer.len();
        self.buffer.push(Value::Keyed(Keyed::new()));
        let mut path = self.encoder.path.clone();
        path.push(PathSegment::Index(index));
        ReferencingEncoder {
            encoder: Encoder::with_path(self.encoder.options, path),
            slot: ParentSlot::Unkeyed(&mut self.buffer, index),
        }
    }
}

impl Drop for UnkeyedEncodingContainer<'_, '_> {
    fn drop(&mut self) {
        let value = Value::Sequence(mem::take(&mut self.buffer));
        self.sink.fill(&mut self.encoder.storage, value);
        if self.pops_path {
            self.encoder.path.pop();
        }
    }
}

/// Writes exactly one value at the current path.
pub struct SingleValueEncodingContainer<'a, 'o> {
    encoder: &'a mut Encoder<'o>,
}

impl SingleValueEncodingContainer<'_, '_> {
    pub fn coding_path(&self) -> &[PathSegment] {
        &self.encoder.path
    }

    pub fn encode<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        assert!(
            self.encoder.can_encode_new_value(),
            "Attempt to encode value through single value container when previously value already encoded."
        );
        self.encoder.encode(value)
    }

    pub fn encode_nil(&mut self) -> Result<()> {
        self.encoder.push(Value::Null)
    }
}

/// A fresh encoder whose single value is written into a slot of the
/// container that created it when it is dropped.
pub struct ReferencingEncoder<'a, 'o> {
    encoder: Encoder<'o>,
    slot: ParentSlot<'a>,
}

impl<'o> Deref for ReferencingEncoder<'_, 'o> {
    type Target = Encoder<'o>;

    fn deref(&self) -> &Encoder<'o> {
        &self.encoder
    }
}

impl<'o> DerefMut for ReferencingEncoder<'_, 'o> {
    fn deref_mut(&mut self) -> &mut Encoder<'o> {
        &mut self.encoder
    }
}

impl Drop for ReferencingEncoder<'_, '_> {
    fn drop(&mut self) {
        let value = self
            .encoder
            .storage
            .pop()
            .unwrap_or_else(|| Value::Keyed(Keyed::new()));
        self.slot.fill(value);
    }
}

macro_rules! serialize_integer {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Result<()> {
                self.push(Value::Scalar(registry::box_int(v)))
            }
        )*
    };
}

impl<'a, 'o> ser::Serializer for &'a mut Encoder<'o> {
    type Ok = ();
    type Error = XmlCodingError;
    type SerializeSeq = UnkeyedEncodingContainer<'a, 'o>;
    type SerializeTuple = UnkeyedEncodingContainer<'a, 'o>;
    type SerializeTupleStruct = UnkeyedEncodingContainer<'a, 'o>;
    type SerializeTupleVariant = UnkeyedEncodingContainer<'a, 'o>;
    type SerializeMap = KeyedEncodingContainer<'a, 'o>;
    type SerializeStruct = KeyedEncodingContainer<'a, 'o>;
    type SerializeStructVariant = KeyedEncodingContainer<'a, 'o>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.push(Value::Scalar(registry::box_bool(v)))
    }

    serialize_integer! {
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_i128: i128,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_u128: u128,
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        let text = registry::box_f32(v, &self.options.non_conforming_float, &self.path)?;
        self.push(Value::Scalar(text))
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        let text = registry::box_f64(v, &self.options.non_conforming_float, &self.path)?;
        self.push(Value::Scalar(text))
    }

    fn serialize_char(self, v: char) -> Result<()> {
        self.push_string(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.push_string(v.to_string())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.encode_data(v)
    }

    fn serialize_none(self) -> Result<()> {
        self.push(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.push(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.push(Value::Keyed(Keyed::new()))
    }

    fn serialize_unit_variant(self, _name: &'static str, _variant_index: u32, variant: &'static str) -> Result<()> {
        self.push(Value::Scalar(variant.to_string()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, name: &'static str, value: &T) -> Result<()> {
        match name {
            ATTRIBUTE_TOKEN => {
                value.serialize(&mut *self)?;
                self.attribute = true;
                Ok(())
            }
            CDATA_TOKEN => {
                value.serialize(&mut *self)?;
                if self.storage.len() > self.base
                    && let Some(last) = self.storage.last_mut()
                    && let Value::Scalar(text) = last
                {
                    let text = mem::take(text);
                    *last = Value::CData(text);
                }
                Ok(())
            }
            DATE_TOKEN => {
                let seconds = match capture(value)? {
                    Payload::Float(seconds) => seconds,
                    _ => return Err(XmlCodingError::invalid_value(&self.path, "Expected a date payload.")),
                };
                let date = Date::from_reference_seconds(seconds).ok_or_else(|| {
                    XmlCodingError::invalid_value(&self.path, format!("Date <{seconds}> is out of range."))
                })?;
                self.encode_date(date.into_inner())
            }
            DATA_TOKEN => match capture(value)? {
                Payload::Bytes(bytes) => self.encode_data(&bytes),
                _ => Err(XmlCodingError::invalid_value(&self.path, "Expected a data payload.")),
            },
            _ => value.serialize(self),
        }
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        let boxed = self.box_value(PathSegment::key(variant), value)?;
        let mut wrapper = Keyed::new();
        wrapper.insert(variant, boxed.value);
        self.push(Value::Keyed(wrapper))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(self.unkeyed_container())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Ok(self.unkeyed_container())
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeTupleStruct> {
        Ok(self.unkeyed_container())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        let index = self.variant_slot(variant);
        Ok(UnkeyedEncodingContainer::new(self, Sink::Variant(index, variant), Vec::new(), true))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Ok(self.keyed_container())
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Ok(self.keyed_container())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        let index = self.variant_slot(variant);
        Ok(KeyedEncodingContainer::new(self, Sink::Variant(index, variant), Keyed::new(), true))
    }
}

impl ser::SerializeSeq for UnkeyedEncodingContainer<'_, '_> {
    type Ok = ();
    type Error = XmlCodingError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.encode(value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTuple for UnkeyedEncodingContainer<'_, '_> {
    type Ok = ();
    type Error = XmlCodingError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.encode(value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for UnkeyedEncodingContainer<'_, '_> {
    type Ok = ();
    type Error = XmlCodingError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.encode(value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for UnkeyedEncodingContainer<'_, '_> {
    type Ok = ();
    type Error = XmlCodingError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.encode(value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeMap for KeyedEncodingContainer<'_, '_> {
    type Ok = ();
    type Error = XmlCodingError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        let key = match capture(key)? {
            Payload::Text(key) => key,
            Payload::Float(key) => key.to_string(),
            Payload::Bytes(_) => {
                return Err(XmlCodingError::invalid_value(
                    &self.encoder.path,
                    "Map keys must encode as strings or numbers.",
                ));
            }
        };
        let name = strip_attribute_prefix(&key).unwrap_or(&key);
        if name != TEXT_KEY && !is_valid_name(name) {
            return Err(XmlCodingError::invalid_value(
                &self.encoder.path,
                format!("Map key \"{key}\" is not a valid XML name."),
            ));
        }
        self.pending_key = Some(key);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        let Some(key) = self.pending_key.take() else {
            return Err(XmlCodingError::invalid_value(
                &self.encoder.path,
                "Map value serialized before its key.",
            ));
        };
        self.encode(&key, value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeStruct for KeyedEncodingContainer<'_, '_> {
    type Ok = ();
    type Error = XmlCodingError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.encode(key, value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for KeyedEncodingContainer<'_, '_> {
    type Ok = ();
    type Error = XmlCodingError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.encode(key, value)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

/// Primitive payload pulled out of a marker newtype or a map key.
enum Payload {
    Text(String),
    Float(f64),
    Bytes(Vec<u8>),
}

fn capture<T: ?Sized + Serialize>(value: &T) -> Result<Payload> {
    let mut capture = PayloadCapture { value: None };
    value.serialize(&mut capture)?;
    capture
        .value
        .ok_or_else(|| XmlCodingError::invalid_value(&[], "Expected a primitive value."))
}

/// Serializer that records a single primitive and rejects everything else.
struct PayloadCapture {
    value: Option<Payload>,
}

impl PayloadCapture {
    fn text(&mut self, text: impl ToString) -> Result<()> {
        self.value = Some(Payload::Text(text.to_string()));
        Ok(())
    }
}

fn not_primitive() -> XmlCodingError {
    XmlCodingError::invalid_value(&[], "Expected a primitive value.")
}

impl ser::Serializer for &mut PayloadCapture {
    type Ok = ();
    type Error = XmlCodingError;
    type SerializeSeq = ser::Impossible<(), XmlCodingError>;
    type SerializeTuple = ser::Impossible<(), XmlCodingError>;
    type SerializeTupleStruct = ser::Impossible<(), XmlCodingError>;
    type SerializeTupleVariant = ser::Impossible<(), XmlCodingError>;
    type SerializeMap = ser::Impossible<(), XmlCodingError>;
    type SerializeStruct = ser::Impossible<(), XmlCodingError>;
    type SerializeStructVariant = ser::Impossible<(), XmlCodingError>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.text(registry::box_bool(v))
    }
    fn serialize_i8(self, v: i8) -> Result<()> {
        self.text(v)
    }
    fn serialize_i16(self, v: i16) -> Result<()> {
        self.text(v)
    }
    fn serialize_i32(self, v: i32) -> Result<()> {
        self.text(v)
    }
    fn serialize_i64(self, v: i64) -> Result<()> {
        self.text(v)
    }
    fn serialize_i128(self, v: i128) -> Result<()> {
        self.text(v)
    }
    fn serialize_u8(self, v: u8) -> Result<()> {
        self.text(v)
    }
    fn serialize_u16(self, v: u16) -> Result<()> {
        self.text(v)
    }
    fn serialize_u32(self, v: u32) -> Result<()> {
        self.text(v)
    }
    fn serialize_u64(self, v: u64) -> Result<()> {
        self.text(v)
    }
    fn serialize_u128(self, v: u128) -> Result<()> {
        self.text(v)
    }
    fn serialize_f32(self, v: f32) -> Result<()> {
        self.value = Some(Payload::Float(f64::from(v)));
        Ok(())
    }
    fn serialize_f64(self, v: f64) -> Result<()> {
        self.value = Some(Payload::Float(v));
        Ok(())
    }
    fn serialize_char(self, v: char) -> Result<()> {
        self.text(v)
    }
    fn serialize_str(self, v: &str) -> Result<()> {
        self.text(v)
    }
    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.value = Some(Payload::Bytes(v.to_vec()));
        Ok(())
    }
    fn serialize_none(self) -> Result<()> {
        Err(not_primitive())
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Result<()> {
        Err(not_primitive())
    }
    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        Err(not_primitive())
    }
    fn serialize_unit_variant(self, _name: &'static str, _variant_index: u32, variant: &'static str) -> Result<()> {
        self.text(variant)
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(self, _name: &'static str, value: &T) -> Result<()> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<()> {
        Err(not_primitive())
    }
    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(not_primitive())
    }
    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(not_primitive())
    }
    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeTupleStruct> {
        Err(not_primitive())
    }
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(not_primitive())
    }
    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(not_primitive())
    }
    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(not_primitive())
    }
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(not_primitive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use xml_coding_support::Attribute;

    fn scalar(text: &str) -> Value {
        Value::from(text)
    }

    #[derive(Serialize)]
    struct Book {
        #[serde(rename = "@id")]
        id: String,
        author: String,
        price: f64,
        remarks: Option<String>,
    }

    #[test]
    fn test_struct_fields_and_attributes() {
        let options = EncodingOptions::default();
        let book = Book {
            id: "bk101".into(),
            author: "Gambardella, Matthew".into(),
            price: 44.95,
            remarks: None,
        };
        let Value::Keyed(root) = encode_root(&book, &options).unwrap() else {
            panic!("expected a keyed root");
        };
        assert_eq!(root.attribute("id"), Some(&scalar("bk101")));
        assert_eq!(root.get("price"), Some(&scalar("44.95")));
        assert!(!root.contains_key("remarks"));
        assert!(!root.contains_key("@id"));
    }

    #[test]
    fn test_attribute_marker() {
        #[derive(Serialize)]
        struct Tagged {
            id: Attribute<u32>,
            name: String,
        }

        let options = EncodingOptions::default();
        let value = encode_root(
            &Tagged {
                id: Attribute(7),
                name: "n".into(),
            },
            &options,
        )
        .unwrap();
        let Value::Keyed(root) = value else {
            panic!("expected a keyed root");
        };
        assert_eq!(root.attribute("id"), Some(&scalar("7")));
        assert_eq!(root.get("id"), None);
    }

    #[test]
    fn test_complex_attribute_is_invalid() {
        #[derive(Serialize)]
        struct Bad {
            #[serde(rename = "@tags")]
            tags: Vec<u8>,
        }

        let options = EncodingOptions::default();
        let err = encode_root(&Bad { tags: vec![1, 2] }, &options).unwrap_err();
        assert!(matches!(err, XmlCodingError::InvalidValue { .. }));
        assert_eq!(err.path(), Some([PathSegment::key("@tags")].as_slice()));
    }

    #[test]
    fn test_top_level_scalar_is_invalid() {
        let options = EncodingOptions::default();
        let err = encode_root(&42, &options).unwrap_err();
        match err {
            XmlCodingError::InvalidValue { description, .. } => {
                assert_eq!(description, "Top-level i32 encoded as a scalar XML fragment.");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(encode_root(&Option::<u8>::None, &options).is_err());

        let err = encode_root(&vec![true], &options).unwrap_err();
        assert!(err.to_string().contains("encoded as a sequence XML fragment."));
    }

    #[test]
    fn test_map_keys_become_element_names() {
        use std::collections::BTreeMap;

        let options = EncodingOptions::default();
        let map = BTreeMap::from([("@lang", "en"), ("alpha", "a"), ("beta", "b")]);
        let Value::Keyed(root) = encode_root(&map, &options).unwrap() else {
            panic!("expected a keyed root");
        };
        assert_eq!(root.get("alpha"), Some(&scalar("a")));
        assert_eq!(root.get("beta"), Some(&scalar("b")));
        assert_eq!(root.attribute("lang"), Some(&scalar("en")));
    }

    #[test]
    fn test_map_keys_must_be_xml_names() {
        use std::collections::BTreeMap;

        let options = EncodingOptions::default();
        for key in ["a b", "1x", ""] {
            let err = encode_root(&BTreeMap::from([(key, 1u8)]), &options).unwrap_err();
            match err {
                XmlCodingError::InvalidValue { description, .. } => {
                    assert_eq!(description, format!("Map key \"{key}\" is not a valid XML name."));
                }
                other => panic!("unexpected error {other:?}"),
            }
        }

        let err = encode_root(&BTreeMap::from([(7u8, "seven")]), &options).unwrap_err();
        assert!(matches!(err, XmlCodingError::InvalidValue { .. }));
    }

    #[test]
    fn test_float_map_keys_are_checked_as_names() {
        struct Weights(Vec<(f64, u8)>);

        impl Serialize for Weights {
            fn serialize<S: ser::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (key, value) in &self.0 {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }

        let options = EncodingOptions::default();
        match encode_root(&Weights(vec![(1.5, 1)]), &options).unwrap_err() {
            XmlCodingError::InvalidValue { description, .. } => {
                assert_eq!(description, "Map key \"1.5\" is not a valid XML name.");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_manual_containers() {
        let options = EncodingOptions::default();
        let mut encoder = Encoder::new(&options);
        {
            let mut container = encoder.keyed_container();
            container.encode("title", "XML Developer's Guide").unwrap();
            container.encode_attribute("id", &"bk101").unwrap();
            container.encode_nil("remarks").unwrap();
            {
                let mut tags = container.nested_unkeyed_container("tag");
                assert_eq!(tags.coding_path(), [PathSegment::key("tag")]);
                tags.encode("a").unwrap();
                tags.encode_nil().unwrap();
                assert_eq!(tags.count(), 2);
            }
            let mut sup = container.super_encoder();
            sup.single_value_container().encode(&1).unwrap();
        }
        // Requesting the same kind of container again reopens it.
        encoder.keyed_container().encode("extra", &true).unwrap();

        let Value::Keyed(root) = encoder.finish() else {
            panic!("expected a keyed root");
        };
        let keys: Vec<&str> = root.children().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["title", "remarks", "tag", "super", "extra"]);
        assert_eq!(root.get("remarks"), Some(&Value::Null));
        assert_eq!(
            root.get("tag"),
            Some(&Value::Sequence(vec![scalar("a"), Value::Null]))
        );
        assert_eq!(root.get("super"), Some(&scalar("1")));
        assert_eq!(root.attribute("id"), Some(&scalar("bk101")));
    }

    #[test]
    #[should_panic(expected = "Attempt to push new keyed encoding container")]
    fn test_container_shape_conflict_panics() {
        let options = EncodingOptions::default();
        let mut encoder = Encoder::new(&options);
        encoder.single_value_container().encode(&1).unwrap();
        let _ = encoder.keyed_container();
    }

    #[test]
    #[should_panic(expected = "Attempt to encode value through single value container")]
    fn test_second_single_value_panics() {
        let options = EncodingOptions::default();
        let mut encoder = Encoder::new(&options);
        let mut container = encoder.single_value_container();
        container.encode(&1).unwrap();
        container.encode(&2).unwrap();
    }

    #[test]
    fn test_enum_variants() {
        #[derive(Serialize)]
        enum Shape {
            Point,
            Circle(f64),
            Rect { w: u32, h: u32 },
        }

        #[derive(Serialize)]
        struct Drawing {
            shapes: Vec<Shape>,
        }

        let options = EncodingOptions::default();
        let drawing = Drawing {
            shapes: vec![Shape::Point, Shape::Circle(1.5), Shape::Rect { w: 2, h: 3 }],
        };
        let Value::Keyed(root) = encode_root(&drawing, &options).unwrap() else {
            panic!("expected a keyed root");
        };
        let Some(Value::Sequence(shapes)) = root.get("shapes") else {
            panic!("expected a sequence");
        };
        assert_eq!(shapes[0], scalar("Point"));

        let mut circle = Keyed::new();
        circle.insert("Circle", scalar("1.5"));
        assert_eq!(shapes[1], Value::Keyed(circle));

        let mut fields = Keyed::new();
        fields.insert("w", scalar("2"));
        fields.insert("h", scalar("3"));
        let mut rect = Keyed::new();
        rect.insert("Rect", Value::Keyed(fields));
        assert_eq!(shapes[2], Value::Keyed(rect));
    }
}
