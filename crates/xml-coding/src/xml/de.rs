//! Decode engine: walks a parsed [`Value`] tree and drives serde visitors.
//!
//! The decoder keeps a stack of the nodes it is currently inside and the
//! coding path leading to the top of that stack. Containers are views over the
//! top node: keyed containers see the attributes and child elements of an
//! element, unkeyed containers see the members of a repeated element, and the
//! single-value container sees a leaf.
//!
//! Serde-derived types decode through the same containers: `MapAccess` is
//! implemented on the keyed view and `SeqAccess` on the unkeyed view, so a
//! hand-written decode and a derived one observe identical key handling,
//! null handling and error paths.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::de::value::{BytesDeserializer, F64Deserializer, StrDeserializer};
use serde::de::{
    self, Deserialize, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess,
    VariantAccess, Visitor,
};
use tracing::trace;
use url::Url;
use xml_coding_support::{DATA_TOKEN, DATE_TOKEN, Date, URL_TOKEN};

use crate::error::{Result, XmlCodingError};
use crate::key_case::convert_to_snake_case;
use crate::path::{CodingPath, PathSegment, SUPER_KEY};
use crate::registry::{self, XmlInteger};
use crate::strategy::{
    DataDecodingStrategy, DateDecodingStrategy, DecodingOptions, KeyDecodingStrategy,
};
use crate::value::{Keyed, TEXT_KEY, Value};
use crate::xml::utils::ATTRIBUTE_PREFIX;

static NULL: Value = Value::Null;

/// Decodes Rust values from a value tree.
pub struct Decoder<'de> {
    storage: Vec<&'de Value>,
    path: CodingPath,
    options: &'de DecodingOptions,
}

impl<'de> Decoder<'de> {
    pub fn new(root: &'de Value, options: &'de DecodingOptions) -> Self {
        Self::rooted(root, options, Vec::new())
    }

    fn rooted(root: &'de Value, options: &'de DecodingOptions, path: CodingPath) -> Self {
        Decoder {
            storage: vec![root],
            path,
            options,
        }
    }

    /// Path from the document root to the value being decoded.
    pub fn coding_path(&self) -> &[PathSegment] {
        &self.path
    }

    pub fn options(&self) -> &'de DecodingOptions {
        self.options
    }

    /// Decodes the current value as `T`.
    pub fn decode<T: Deserialize<'de>>(&mut self) -> Result<T> {
        T::deserialize(&mut *self).map_err(|err| err.at(&self.path))
    }

    pub fn keyed_container(&mut self) -> Result<KeyedDecodingContainer<'_, 'de>> {
        KeyedDecodingContainer::load(self, None, false)
    }

    pub fn unkeyed_container(&mut self) -> Result<UnkeyedDecodingContainer<'_, 'de>> {
        UnkeyedDecodingContainer::load(self, false)
    }

    pub fn single_value_container(&mut self) -> SingleValueDecodingContainer<'_, 'de> {
        SingleValueDecodingContainer { decoder: self }
    }

    fn top(&self) -> &'de Value {
        self.storage.last().copied().unwrap_or(&NULL)
    }

    fn push_frame(&mut self, value: &'de Value, segment: PathSegment) {
        self.storage.push(value);
        self.path.push(segment);
    }

    fn pop_frame(&mut self) {
        self.storage.pop();
        self.path.pop();
    }

    /// Runs `f` with `value` on top of the stack and `segment` appended to the path.
    fn descend<T>(
        &mut self,
        value: &'de Value,
        segment: PathSegment,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.push_frame(value, segment);
        let result = f(self).map_err(|err| err.at(&self.path));
        self.pop_frame();
        result
    }

    /// Leaf text of the current node.
    ///
    /// An element that carries attributes around plain text (`<price
    /// currency="USD">44.95</price>`) also yields its text.
    fn scalar(&self, expected: &str) -> Result<&'de str> {
        match self.top() {
            Value::Scalar(text) | Value::CData(text) => Ok(text.as_str()),
            Value::Null => Err(XmlCodingError::value_not_found(&self.path, expected)),
            Value::Keyed(keyed) if keyed.len() == 1 => match keyed.get(TEXT_KEY) {
                Some(Value::Scalar(text) | Value::CData(text)) => Ok(text.as_str()),
                _ => Err(XmlCodingError::type_mismatch(&self.path, expected, "a keyed container")),
            },
            other => Err(XmlCodingError::type_mismatch(&self.path, expected, other.kind())),
        }
    }

    fn unbox_bool(&self) -> Result<bool> {
        registry::unbox_bool(self.scalar("bool")?, &self.path)
    }

    fn unbox_int<T: XmlInteger>(&self) -> Result<T> {
        registry::unbox_int(self.scalar(T::NAME)?, &self.path)
    }

    fn unbox_f64(&self) -> Result<f64> {
        registry::unbox_f64(self.scalar("f64")?, &self.options.non_conforming_float, &self.path)
    }

    fn unbox_f32(&self) -> Result<f32> {
        registry::unbox_f32(self.scalar("f32")?, &self.options.non_conforming_float, &self.path)
    }

    fn unbox_char(&self) -> Result<char> {
        registry::unbox_char(self.scalar("char")?, &self.path)
    }

    fn unbox_date(&mut self) -> Result<DateTime<Utc>> {
        let options = self.options;
        trace!(strategy = ?options.date, "Decoding date");
        match &options.date {
            DateDecodingStrategy::Deferred => {
                let seconds = self.unbox_f64()?;
                Date::from_reference_seconds(seconds)
                    .map(Date::into_inner)
                    .ok_or_else(|| {
                        XmlCodingError::data_corrupted(&self.path, format!("Date <{seconds}> is out of range."))
                    })
            }
            DateDecodingStrategy::Custom(decode) => decode(self),
            strategy => registry::unbox_date(
                self.scalar("Date")?,
                strategy,
                &options.non_conforming_float,
                &self.path,
            ),
        }
    }

    fn unbox_data(&mut self) -> Result<Vec<u8>> {
        let options = self.options;
        trace!(strategy = ?options.data, "Decoding data");
        match &options.data {
            DataDecodingStrategy::Deferred => {
                let mut container = self.unkeyed_container()?;
                let mut bytes = Vec::with_capacity(container.count());
                while !container.is_at_end() {
                    bytes.push(container.decode::<u8>()?);
                }
                Ok(bytes)
            }
            DataDecodingStrategy::Base64 => registry::unbox_data(self.scalar("Data")?, &self.path),
            DataDecodingStrategy::Custom(decode) => decode(self),
        }
    }

    fn missing_key(&self, key: &str) -> XmlCodingError {
        let description = match self.options.key {
            KeyDecodingStrategy::ConvertFromSnakeCase => format!(
                "No value associated with key \"{key}\" (\"{}\").",
                convert_to_snake_case(key)
            ),
            _ => format!("No value associated with key \"{key}\"."),
        };
        XmlCodingError::key_not_found(&self.path, key, description)
    }

    /// Stamps the current path on an error leaving a keyed view, rewriting
    /// serde's missing-field report into the keyed lookup message.
    fn keyed_error(&self, err: XmlCodingError) -> XmlCodingError {
        match err {
            XmlCodingError::KeyNotFound { key, path, .. } if path.is_empty() => self.missing_key(&key),
            other => other.at(&self.path),
        }
    }
}

/// Read-only view of an element's attributes and children by key.
pub struct KeyedDecodingContainer<'a, 'de> {
    decoder: &'a mut Decoder<'de>,
    entries: IndexMap<String, &'de Value>,
    fields: Option<&'static [&'static str]>,
    cursor: usize,
    owns_frame: bool,
}

impl<'a, 'de> KeyedDecodingContainer<'a, 'de> {
    fn load(
        decoder: &'a mut Decoder<'de>,
        fields: Option<&'static [&'static str]>,
        owns_frame: bool,
    ) -> Result<Self> {
        let mut container = KeyedDecodingContainer {
            decoder,
            entries: IndexMap::new(),
            fields,
            cursor: 0,
            owns_frame,
        };
        // On error the container drops here and releases its frame.
        container.entries = container.collect_entries()?;
        Ok(container)
    }

    fn collect_entries(&self) -> Result<IndexMap<String, &'de Value>> {
        let node = self.decoder.top();
        let path = &self.decoder.path;
        match node {
            Value::Keyed(keyed) => Ok(self.keyed_entries(keyed)),
            Value::Scalar(text) | Value::CData(text) if text.is_empty() => Ok(IndexMap::new()),
            Value::Scalar(_) | Value::CData(_) if self.declares(TEXT_KEY) => {
                Ok(IndexMap::from([(TEXT_KEY.to_string(), node)]))
            }
            Value::Null => Err(XmlCodingError::ValueNotFound {
                expected: "a keyed container".to_string(),
                path: path.clone(),
                description: "Cannot get keyed decoding container -- found null value instead."
                    .to_string(),
            }),
            other => Err(XmlCodingError::type_mismatch(path, "a keyed container", other.kind())),
        }
    }

    fn declares(&self, name: &str) -> bool {
        self.fields.is_some_and(|fields| fields.contains(&name))
    }

    /// Applies the key strategy once; on a collision the first entry wins.
    fn keyed_entries(&self, keyed: &'de Keyed) -> IndexMap<String, &'de Value> {
        let strategy = &self.decoder.options.key;
        let path = &self.decoder.path;
        let mut entries = IndexMap::with_capacity(keyed.len());

        for (name, value) in keyed.attributes() {
            let converted = strategy.convert(path, name, self.fields);
            let prefixed = format!("{ATTRIBUTE_PREFIX}{converted}");
            let key = if self.declares(&prefixed) { prefixed } else { converted };
            entries.entry(key).or_insert(value);
        }
        for (name, value) in keyed.children() {
            let key = if name == TEXT_KEY {
                name.clone()
            } else {
                strategy.convert(path, name, self.fields)
            };
            entries.entry(key).or_insert(value);
        }
        entries
    }

    pub fn coding_path(&self) -> &[PathSegment] {
        &self.decoder.path
    }

    /// Keys present in the element, after key conversion.
    pub fn all_keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn lookup(&self, key: &str) -> Result<&'de Value> {
        self.entries
            .get(key)
            .copied()
            .ok_or_else(|| self.decoder.missing_key(key))
    }

    /// Whether the value under `key` is an empty element.
    pub fn decode_nil(&self, key: &str) -> Result<bool> {
        Ok(self.lookup(key)?.is_null())
    }

    pub fn decode<T: Deserialize<'de>>(&mut self, key: &str) -> Result<T> {
        let value = self.lookup(key)?;
        self.decoder
            .descend(value, PathSegment::key(key), |decoder| T::deserialize(&mut *decoder))
    }

    /// Like [`decode`](Self::decode) but yields `None` for a missing key or an
    /// empty element.
    pub fn decode_if_present<T: Deserialize<'de>>(&mut self, key: &str) -> Result<Option<T>> {
        let present = self.entries.get(key).is_some_and(|value| !value.is_null());
        if !present {
            return Ok(None);
        }
        self.decode(key).map(Some)
    }

    pub fn nested_keyed_container(&mut self, key: &str) -> Result<KeyedDecodingContainer<'_, 'de>> {
        let value = self.lookup(key)?;
        self.decoder.push_frame(value, PathSegment::key(key));
        KeyedDecodingContainer::load(&mut *self.decoder, None, true)
    }

    pub fn nested_unkeyed_container(&mut self, key: &str) -> Result<UnkeyedDecodingContainer<'_, 'de>> {
        let value = self.lookup(key)?;
        self.decoder.push_frame(value, PathSegment::key(key));
        UnkeyedDecodingContainer::load(&mut *self.decoder, true)
    }

    /// A fresh decoder over the value stored under the reserved `super` key.
    pub fn super_decoder(&self) -> Decoder<'de> {
        self.super_decoder_for_key(SUPER_KEY)
    }

    /// A fresh decoder over the value under `key`, or over null when absent.
    pub fn super_decoder_for_key(&self, key: &str) -> Decoder<'de> {
        let value = self.entries.get(key).copied().unwrap_or(&NULL);
        let mut path = self.decoder.path.clone();
        path.push(PathSegment::key(key));
        Decoder::rooted(value, self.decoder.options, path)
    }
}

impl Drop for KeyedDecodingContainer<'_, '_> {
    fn drop(&mut self) {
        if self.owns_frame {
            self.decoder.pop_frame();
        }
    }
}

impl<'de> MapAccess<'de> for KeyedDecodingContainer<'_, 'de> {
    type Error = XmlCodingError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>>
    where
        K: DeserializeSeed<'de>,
    {
        let Some((key, _)) = self.entries.get_index(self.cursor) else {
            return Ok(None);
        };
        seed.deserialize(key.clone().into_deserializer()).map(Some)
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value>
    where
        V: DeserializeSeed<'de>,
    {
        let Some((key, value)) = self.entries.get_index(self.cursor) else {
            return Err(XmlCodingError::data_corrupted(
                &self.decoder.path,
                "Keyed container has no value left to decode.",
            ));
        };
        let (segment, value) = (PathSegment::key(key.as_str()), *value);
        self.cursor += 1;
        self.decoder
            .descend(value, segment, |decoder| seed.deserialize(&mut *decoder))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len() - self.cursor)
    }
}

/// Ordered view of the members of a repeated element.
pub struct UnkeyedDecodingContainer<'a, 'de> {
    decoder: &'a mut Decoder<'de>,
    items: &'de [Value],
    current_index: usize,
    owns_frame: bool,
}

impl<'a, 'de> UnkeyedDecodingContainer<'a, 'de> {
    fn load(decoder: &'a mut Decoder<'de>, owns_frame: bool) -> Result<Self> {
        let mut container = UnkeyedDecodingContainer {
            decoder,
            items: &[],
            current_index: 0,
            owns_frame,
        };
        container.items = match container.decoder.top() {
            Value::Sequence(items) => items.as_slice(),
            Value::Scalar(text) | Value::CData(text) if text.is_empty() => &[],
            Value::Null => {
                return Err(XmlCodingError::ValueNotFound {
                    expected: "an unkeyed container".to_string(),
                    path: container.decoder.path.clone(),
                    description: "Cannot get unkeyed decoding container -- found null value instead."
                        .to_string(),
                });
            }
            // An element that occurs once is a one-member sequence.
            single => std::slice::from_ref(single),
        };
        Ok(container)
    }

    pub fn coding_path(&self) -> &[PathSegment] {
        &self.decoder.path
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_at_end(&self) -> bool {
        self.current_index >= self.items.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    fn current(&self, expected: &str) -> Result<&'de Value> {
        self.items.get(self.current_index).ok_or_else(|| {
            let mut path = self.decoder.path.clone();
            path.push(PathSegment::Index(self.current_index));
            XmlCodingError::ValueNotFound {
                expected: expected.to_string(),
                path,
                description: "Unkeyed container is at end.".to_string(),
            }
        })
    }

    /// Consumes the current member if it is an empty element.
    pub fn decode_nil(&mut self) -> Result<bool> {
        if self.current("nil")?.is_null() {
            self.current_index += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn decode<T: Deserialize<'de>>(&mut self) -> Result<T> {
        let value = self.current(std::any::type_name::<T>())?;
        let index = self.current_index;
        let decoded = self
            .decoder
            .descend(value, PathSegment::Index(index), |decoder| T::deserialize(&mut *decoder))?;
        self.current_index += 1;
        Ok(decoded)
    }

    pub fn nested_keyed_container(&mut self) -> Result<KeyedDecodingContainer<'_, 'de>> {
        let value = self.current("a keyed container")?;
        let index = self.current_index;
        self.current_index += 1;
        self.decoder.push_frame(value, PathSegment::Index(index));
        KeyedDecodingContainer::load(&mut *self.decoder, None, true)
    }

    pub fn nested_unkeyed_container(&mut self) -> Result<UnkeyedDecodingContainer<'_, 'de>> {
        let value = self.current("an unkeyed container")?;
        let index = self.current_index;
        self.current_index += 1;
        self.decoder.push_frame(value, PathSegment::Index(index));
        UnkeyedDecodingContainer::load(&mut *self.decoder, true)
    }

    /// A fresh decoder over the current member.
    pub fn super_decoder(&mut self) -> Result<Decoder<'de>> {
        let value = self.current("a super decoder")?;
        let mut path = self.decoder.path.clone();
        path.push(PathSegment::Index(self.current_index));
        self.current_index += 1;
        Ok(Decoder::rooted(value, self.decoder.options, path))
    }
}

impl Drop for UnkeyedDecodingContainer<'_, '_> {
    fn drop(&mut self) {
        if self.owns_frame {
            self.decoder.pop_frame();
        }
    }
}

impl<'de> SeqAccess<'de> for UnkeyedDecodingContainer<'_, 'de> {
    type Error = XmlCodingError;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>>
    where
        T: DeserializeSeed<'de>,
    {
        let Some(value) = self.items.get(self.current_index) else {
            return Ok(None);
        };
        let index = self.current_index;
        self.current_index += 1;
        self.decoder
            .descend(value, PathSegment::Index(index), |decoder| seed.deserialize(&mut *decoder))
            .map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len().saturating_sub(self.current_index))
    }
}

/// View of the current value as one leaf.
pub struct SingleValueDecodingContainer<'a, 'de> {
    decoder: &'a mut Decoder<'de>,
}

impl<'de> SingleValueDecodingContainer<'_, 'de> {
    pub fn coding_path(&self) -> &[PathSegment] {
        &self.decoder.path
    }

    pub fn decode_nil(&self) -> bool {
        self.decoder.top().is_null()
    }

    pub fn decode<T: Deserialize<'de>>(&mut self) -> Result<T> {
        self.decoder.decode()
    }

    pub fn decode_bool(&self) -> Result<bool> {
        self.decoder.unbox_bool()
    }

    pub fn decode_string(&self) -> Result<String> {
        self.decoder.scalar("String").map(str::to_string)
    }

    pub fn decode_int<T: XmlInteger>(&self) -> Result<T> {
        self.decoder.unbox_int()
    }

    pub fn decode_f64(&self) -> Result<f64> {
        self.decoder.unbox_f64()
    }

    pub fn decode_f32(&self) -> Result<f32> {
        self.decoder.unbox_f32()
    }

    pub fn decode_date(&mut self) -> Result<DateTime<Utc>> {
        self.decoder.unbox_date()
    }

    pub fn decode_data(&mut self) -> Result<Vec<u8>> {
        self.decoder.unbox_data()
    }

    pub fn decode_url(&self) -> Result<Url> {
        let decoder = &self.decoder;
        let base = decoder.options.base_url.as_ref();
        registry::unbox_url(decoder.scalar("Url")?, base, &decoder.path)
    }

    pub fn decode_decimal(&self) -> Result<Decimal> {
        let decoder = &self.decoder;
        registry::unbox_decimal(
            decoder.scalar("Decimal")?,
            &decoder.options.non_conforming_float,
            &decoder.path,
        )
    }
}

macro_rules! deserialize_integer {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                visitor.$visit(self.unbox_int::<$ty>()?)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for &mut Decoder<'de> {
    type Error = XmlCodingError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.top() {
            Value::Null => visitor.visit_unit(),
            Value::Scalar(text) | Value::CData(text) => visitor.visit_borrowed_str(text),
            Value::Sequence(_) => self.deserialize_seq(visitor),
            Value::Keyed(_) => self.deserialize_map(visitor),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_bool(self.unbox_bool()?)
    }

    deserialize_integer! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f32(self.unbox_f32()?)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f64(self.unbox_f64()?)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_char(self.unbox_char()?)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_borrowed_str(self.scalar("String")?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.unbox_data()?)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.top().is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.top() {
            Value::Null => visitor.visit_unit(),
            Value::Scalar(text) | Value::CData(text) if text.is_empty() => visitor.visit_unit(),
            Value::Keyed(keyed) if keyed.is_empty() => visitor.visit_unit(),
            other => Err(XmlCodingError::type_mismatch(&self.path, "unit", other.kind())),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, name: &'static str, visitor: V) -> Result<V::Value> {
        match name {
            DATE_TOKEN => {
                let seconds = Date(self.unbox_date()?).reference_seconds();
                let payload: F64Deserializer<XmlCodingError> = seconds.into_deserializer();
                visitor.visit_newtype_struct(payload)
            }
            DATA_TOKEN => {
                let bytes = self.unbox_data()?;
                visitor.visit_newtype_struct(BytesDeserializer::<XmlCodingError>::new(&bytes))
            }
            URL_TOKEN => {
                let base = self.options.base_url.as_ref();
                let url = registry::unbox_url(self.scalar("Url")?, base, &self.path)?;
                let payload: StrDeserializer<'_, XmlCodingError> = url.as_str().into_deserializer();
                visitor.visit_newtype_struct(payload)
            }
            // Attribute and CDATA markers are transparent here: attributes were
            // merged into the keyed view and CDATA decodes like any other text.
            _ => visitor.visit_newtype_struct(self),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let result = {
            let mut container = UnkeyedDecodingContainer::load(&mut *self, false)?;
            visitor.visit_seq(&mut container)
        };
        result.map_err(|err| err.at(&self.path))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let result = {
            let mut container = KeyedDecodingContainer::load(&mut *self, None, false)?;
            visitor.visit_map(&mut container)
        };
        result.map_err(|err| self.keyed_error(err))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let result = {
            let mut container = KeyedDecodingContainer::load(&mut *self, Some(fields), false)?;
            visitor.visit_map(&mut container)
        };
        result.map_err(|err| self.keyed_error(err))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.top() {
            Value::Scalar(text) | Value::CData(text) => {
                let variant: StrDeserializer<'_, XmlCodingError> = text.as_str().into_deserializer();
                visitor.visit_enum(variant)
            }
            Value::Keyed(keyed) if keyed.len() == 1 && !keyed.has_attributes() => {
                let Some((name, value)) = keyed.children().next() else {
                    return Err(XmlCodingError::type_mismatch(&self.path, "an enum", "a keyed container"));
                };
                visitor.visit_enum(VariantDecoder {
                    decoder: self,
                    name: name.as_str(),
                    value,
                })
            }
            Value::Null => Err(XmlCodingError::value_not_found(&self.path, "an enum")),
            other => Err(XmlCodingError::type_mismatch(&self.path, "an enum", other.kind())),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

/// Enum access over a single-child element whose tag names the variant.
struct VariantDecoder<'a, 'de> {
    decoder: &'a mut Decoder<'de>,
    name: &'de str,
    value: &'de Value,
}

impl<'de> EnumAccess<'de> for VariantDecoder<'_, 'de> {
    type Error = XmlCodingError;
    type Variant = Self;

    fn variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<(S::Value, Self)> {
        let name: StrDeserializer<'_, XmlCodingError> = self.name.into_deserializer();
        let variant = seed.deserialize(name)?;
        Ok((variant, self))
    }
}

impl<'de> VariantAccess<'de> for VariantDecoder<'_, 'de> {
    type Error = XmlCodingError;

    fn unit_variant(self) -> Result<()> {
        self.decoder
            .descend(self.value, PathSegment::key(self.name), |decoder| {
                de::Deserializer::deserialize_unit(decoder, de::IgnoredAny).map(|_| ())
            })
    }

    fn newtype_variant_seed<S: DeserializeSeed<'de>>(self, seed: S) -> Result<S::Value> {
        self.decoder
            .descend(self.value, PathSegment::key(self.name), |decoder| seed.deserialize(decoder))
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        self.decoder
            .descend(self.value, PathSegment::key(self.name), |decoder| {
                de::Deserializer::deserialize_tuple(decoder, len, visitor)
            })
    }

    fn struct_variant<V: Visitor<'de>>(self, fields: &'static [&'static str], visitor: V) -> Result<V::Value> {
        self.decoder
            .descend(self.value, PathSegment::key(self.name), |decoder| {
                de::Deserializer::deserialize_struct(decoder, "", fields, visitor)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn scalar(text: &str) -> Value {
        Value::from(text)
    }

    fn book() -> Value {
        let mut keyed = Keyed::new();
        keyed.insert_attribute("id", scalar("bk101"));
        keyed.insert("author", scalar("Gambardella, Matthew"));
        keyed.insert("price", scalar("44.95"));
        keyed.insert("remarks", Value::Null);
        Value::Keyed(keyed)
    }

    #[test]
    fn test_keyed_container_yields_attributes_first() {
        let root = book();
        let options = DecodingOptions::default();
        let mut decoder = Decoder::new(&root, &options);
        let container = decoder.keyed_container().unwrap();
        let keys: Vec<&str> = container.all_keys().collect();
        assert_eq!(keys, ["id", "author", "price", "remarks"]);
    }

    #[test]
    fn test_keyed_container_decodes_by_key() {
        let root = book();
        let options = DecodingOptions::default();
        let mut decoder = Decoder::new(&root, &options);
        let mut container = decoder.keyed_container().unwrap();

        assert_eq!(container.decode::<f64>("price").unwrap(), 44.95);
        assert!(container.decode_nil("remarks").unwrap());
        assert_eq!(container.decode_if_present::<String>("remarks").unwrap(), None);
        assert_eq!(container.decode_if_present::<String>("missing").unwrap(), None);

        let err = container.decode::<String>("remarks").unwrap_err();
        assert!(matches!(err, XmlCodingError::ValueNotFound { .. }));
        assert_eq!(err.path(), Some([PathSegment::key("remarks")].as_slice()));

        let err = container.decode::<String>("title").unwrap_err();
        match err {
            XmlCodingError::KeyNotFound { key, description, .. } => {
                assert_eq!(key, "title");
                assert_eq!(description, "No value associated with key \"title\".");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unkeyed_container_over_single_element() {
        let root = scalar("7");
        let options = DecodingOptions::default();
        let mut decoder = Decoder::new(&root, &options);
        let mut container = decoder.unkeyed_container().unwrap();
        assert_eq!(container.count(), 1);
        assert_eq!(container.decode::<u8>().unwrap(), 7);
        assert!(container.is_at_end());

        let err = container.decode::<u8>().unwrap_err();
        assert!(matches!(err, XmlCodingError::ValueNotFound { .. }));
        assert_eq!(err.path(), Some([PathSegment::Index(1)].as_slice()));
    }

    #[test]
    fn test_nested_containers_restore_the_path() {
        let mut inner = Keyed::new();
        inner.insert("value", scalar("1"));
        let mut outer = Keyed::new();
        outer.insert("inner", Value::Keyed(inner));
        outer.insert("list", Value::Sequence(vec![scalar("a"), Value::Null]));
        let root = Value::Keyed(outer);

        let options = DecodingOptions::default();
        let mut decoder = Decoder::new(&root, &options);
        let mut container = decoder.keyed_container().unwrap();
        {
            let mut nested = container.nested_keyed_container("inner").unwrap();
            assert_eq!(nested.coding_path(), [PathSegment::key("inner")]);
            assert_eq!(nested.decode::<i32>("value").unwrap(), 1);
        }
        {
            let mut list = container.nested_unkeyed_container("list").unwrap();
            assert!(!list.decode_nil().unwrap());
            assert_eq!(list.decode::<String>().unwrap(), "a");
            assert!(list.decode_nil().unwrap());
            assert!(list.is_at_end());
        }
        assert!(container.coding_path().is_empty());
    }

    #[test]
    fn test_super_decoder_defaults_to_null() {
        let root = book();
        let options = DecodingOptions::default();
        let mut decoder = Decoder::new(&root, &options);
        let container = decoder.keyed_container().unwrap();
        let mut sup = container.super_decoder();
        assert_eq!(sup.coding_path(), [PathSegment::key(SUPER_KEY)]);
        assert!(sup.single_value_container().decode_nil());
        assert_eq!(sup.decode::<Option<String>>().unwrap(), None);
    }

    #[test]
    fn test_null_keyed_container_is_value_not_found() {
        let root = Value::Null;
        let options = DecodingOptions::default();
        let mut decoder = Decoder::new(&root, &options);
        assert!(matches!(
            decoder.keyed_container(),
            Err(XmlCodingError::ValueNotFound { .. })
        ));
    }

    #[test]
    fn test_enum_variants() {
        #[derive(Debug, Deserialize, PartialEq)]
        enum Shape {
            Point,
            Circle(f64),
            Rect { w: u32, h: u32 },
        }

        let options = DecodingOptions::default();

        let root = scalar("Point");
        assert_eq!(Decoder::new(&root, &options).decode::<Shape>().unwrap(), Shape::Point);

        let mut keyed = Keyed::new();
        keyed.insert("Circle", scalar("1.5"));
        let root = Value::Keyed(keyed);
        assert_eq!(
            Decoder::new(&root, &options).decode::<Shape>().unwrap(),
            Shape::Circle(1.5)
        );

        let mut fields = Keyed::new();
        fields.insert("w", scalar("2"));
        fields.insert("h", scalar("3"));
        let mut keyed = Keyed::new();
        keyed.insert("Rect", Value::Keyed(fields));
        let root = Value::Keyed(keyed);
        assert_eq!(
            Decoder::new(&root, &options).decode::<Shape>().unwrap(),
            Shape::Rect { w: 2, h: 3 }
        );
    }
}
