//! User-settable coding policies.
//!
//! A strategy set is captured once per top-level call and shared read-only by
//! every container of that traversal. Closures are stored behind `Arc` so the
//! options stay cheap to clone and safe to share across threads.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{Result, XmlCodingError};
use crate::key_case::{convert_from_snake_case, convert_to_snake_case};
use crate::path::PathSegment;
use crate::registry;
use crate::xml::de::Decoder;
use crate::xml::ser::Encoder;

pub type DateDecodeFn = dyn Fn(&mut Decoder<'_>) -> Result<DateTime<Utc>> + Send + Sync;
pub type DataDecodeFn = dyn Fn(&mut Decoder<'_>) -> Result<Vec<u8>> + Send + Sync;
pub type DateEncodeFn = dyn Fn(&DateTime<Utc>, &mut Encoder<'_>) -> Result<()> + Send + Sync;
pub type DataEncodeFn = dyn Fn(&[u8], &mut Encoder<'_>) -> Result<()> + Send + Sync;
pub type KeyMapFn = dyn Fn(&[PathSegment]) -> String + Send + Sync;

/// How `Date` values are read.
#[derive(Clone, Default)]
pub enum DateDecodingStrategy {
    /// Seconds since 2001-01-01T00:00:00Z, decoded as a plain number.
    ///
    /// The default, matching [`DateEncodingStrategy::Deferred`] on the encoder.
    #[default]
    Deferred,
    SecondsSince1970,
    MillisecondsSince1970,
    /// RFC 3339 text.
    Iso8601,
    /// A chrono `strftime` pattern.
    Formatted(String),
    /// A callback reading the current value through the decoder.
    Custom(Arc<DateDecodeFn>),
}

impl DateDecodingStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&mut Decoder<'_>) -> Result<DateTime<Utc>> + Send + Sync + 'static,
    {
        DateDecodingStrategy::Custom(Arc::new(f))
    }

    /// Picks a date format from the key the date is stored under.
    ///
    /// `format_for_key` returns a chrono pattern, or `None` when the key has no
    /// known format.
    pub fn key_formatted<F>(format_for_key: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::custom(move |decoder| {
            let Some(PathSegment::Key(key)) = decoder.coding_path().last().cloned() else {
                return Err(XmlCodingError::data_corrupted(
                    decoder.coding_path(),
                    "No Coding Path Found",
                ));
            };
            let text = decoder.single_value_container().decode_string();
            let text = text.map_err(|_| {
                XmlCodingError::data_corrupted(decoder.coding_path(), "Could not decode date text")
            })?;
            let Some(format) = format_for_key(&key) else {
                return Err(XmlCodingError::data_corrupted(
                    decoder.coding_path(),
                    "No date formatter for date text",
                ));
            };
            registry::parse_formatted_date(&text, &format).ok_or_else(|| {
                XmlCodingError::data_corrupted(
                    decoder.coding_path(),
                    format!("Cannot decode date string {text}"),
                )
            })
        })
    }
}

impl fmt::Debug for DateDecodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deferred => f.write_str("Deferred"),
            Self::SecondsSince1970 => f.write_str("SecondsSince1970"),
            Self::MillisecondsSince1970 => f.write_str("MillisecondsSince1970"),
            Self::Iso8601 => f.write_str("Iso8601"),
            Self::Formatted(format) => f.debug_tuple("Formatted").field(format).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How `Date` values are written.
#[derive(Clone, Default)]
pub enum DateEncodingStrategy {
    #[default]
    Deferred,
    SecondsSince1970,
    MillisecondsSince1970,
    Iso8601,
    Formatted(String),
    /// A callback writing the value through the encoder. Encoding nothing
    /// produces an empty element.
    Custom(Arc<DateEncodeFn>),
}

impl DateEncodingStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&DateTime<Utc>, &mut Encoder<'_>) -> Result<()> + Send + Sync + 'static,
    {
        DateEncodingStrategy::Custom(Arc::new(f))
    }
}

impl fmt::Debug for DateEncodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deferred => f.write_str("Deferred"),
            Self::SecondsSince1970 => f.write_str("SecondsSince1970"),
            Self::MillisecondsSince1970 => f.write_str("MillisecondsSince1970"),
            Self::Iso8601 => f.write_str("Iso8601"),
            Self::Formatted(format) => f.debug_tuple("Formatted").field(format).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How `Data` values are read.
#[derive(Clone, Default)]
pub enum DataDecodingStrategy {
    /// A sequence of byte elements.
    Deferred,
    #[default]
    Base64,
    Custom(Arc<DataDecodeFn>),
}

impl DataDecodingStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&mut Decoder<'_>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        DataDecodingStrategy::Custom(Arc::new(f))
    }

    /// Decodes the text under each key with a key-specific function.
    pub fn key_formatted<F>(decode_for_key: F) -> Self
    where
        F: Fn(&str, &str) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        Self::custom(move |decoder| {
            let Some(PathSegment::Key(key)) = decoder.coding_path().last().cloned() else {
                return Err(XmlCodingError::data_corrupted(
                    decoder.coding_path(),
                    "No Coding Path Found",
                ));
            };
            let text = decoder.single_value_container().decode_string()?;
            decode_for_key(&key, &text).ok_or_else(|| {
                XmlCodingError::data_corrupted(decoder.coding_path(), "Cannot decode data string")
            })
        })
    }
}

impl fmt::Debug for DataDecodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deferred => f.write_str("Deferred"),
            Self::Base64 => f.write_str("Base64"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How `Data` values are written.
#[derive(Clone, Default)]
pub enum DataEncodingStrategy {
    Deferred,
    #[default]
    Base64,
    Custom(Arc<DataEncodeFn>),
}

impl DataEncodingStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[u8], &mut Encoder<'_>) -> Result<()> + Send + Sync + 'static,
    {
        DataEncodingStrategy::Custom(Arc::new(f))
    }
}

impl fmt::Debug for DataEncodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deferred => f.write_str("Deferred"),
            Self::Base64 => f.write_str("Base64"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Handling of infinities and NaN when decoding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum NonConformingFloatDecodingStrategy {
    #[default]
    Throw,
    ConvertFromString {
        positive_infinity: String,
        negative_infinity: String,
        nan: String,
    },
}

/// Handling of infinities and NaN when encoding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum NonConformingFloatEncodingStrategy {
    #[default]
    Throw,
    ConvertToString {
        positive_infinity: String,
        negative_infinity: String,
        nan: String,
    },
}

/// How element and attribute names in the document map to field names.
#[derive(Clone, Default)]
pub enum KeyDecodingStrategy {
    #[default]
    UseDefaultKeys,
    /// `snake_case` in the document, `camelCase` in the type.
    ConvertFromSnakeCase,
    /// Receives the coding path ending in the document key, returns the field name.
    Custom(Arc<KeyMapFn>),
}

impl KeyDecodingStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[PathSegment]) -> String + Send + Sync + 'static,
    {
        KeyDecodingStrategy::Custom(Arc::new(f))
    }

    /// Maps a document key found at `path` to the name the target type uses.
    ///
    /// For snake case, a declared field whose snake form equals the key wins
    /// over the generic conversion so acronym fields (`myURL`) still match.
    pub(crate) fn convert(
        &self,
        path: &[PathSegment],
        key: &str,
        fields: Option<&'static [&'static str]>,
    ) -> String {
        match self {
            KeyDecodingStrategy::UseDefaultKeys => key.to_string(),
            KeyDecodingStrategy::ConvertFromSnakeCase => fields
                .and_then(|fields| {
                    fields
                        .iter()
                        .map(|field| field.trim_start_matches('@'))
                        .find(|field| convert_to_snake_case(field) == key)
                })
                .map(str::to_string)
                .unwrap_or_else(|| convert_from_snake_case(key)),
            KeyDecodingStrategy::Custom(map) => {
                let mut full = path.to_vec();
                full.push(PathSegment::key(key));
                map(&full)
            }
        }
    }
}

impl fmt::Debug for KeyDecodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseDefaultKeys => f.write_str("UseDefaultKeys"),
            Self::ConvertFromSnakeCase => f.write_str("ConvertFromSnakeCase"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How field names map to element and attribute names in the document.
#[derive(Clone, Default)]
pub enum KeyEncodingStrategy {
    #[default]
    UseDefaultKeys,
    ConvertToSnakeCase,
    Custom(Arc<KeyMapFn>),
}

impl KeyEncodingStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&[PathSegment]) -> String + Send + Sync + 'static,
    {
        KeyEncodingStrategy::Custom(Arc::new(f))
    }

    pub(crate) fn convert(&self, path: &[PathSegment], key: &str) -> String {
        match self {
            KeyEncodingStrategy::UseDefaultKeys => key.to_string(),
            KeyEncodingStrategy::ConvertToSnakeCase => convert_to_snake_case(key),
            KeyEncodingStrategy::Custom(map) => {
                let mut full = path.to_vec();
                full.push(PathSegment::key(key));
                map(&full)
            }
        }
    }
}

impl fmt::Debug for KeyEncodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseDefaultKeys => f.write_str("UseDefaultKeys"),
            Self::ConvertToSnakeCase => f.write_str("ConvertToSnakeCase"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How plain strings are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StringEncodingStrategy {
    /// Escaped element text.
    #[default]
    Deferred,
    /// Every string element becomes a CDATA section.
    CData,
}

/// Output flags consumed only when rendering text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutputFormatting {
    /// Indent nested elements by four spaces, one element per line.
    pub pretty_printed: bool,
    /// Emit children and attributes in lexicographic key order.
    pub sorted_keys: bool,
}

impl OutputFormatting {
    pub const PRETTY_PRINTED: Self = Self {
        pretty_printed: true,
        sorted_keys: false,
    };

    pub const SORTED_KEYS: Self = Self {
        pretty_printed: false,
        sorted_keys: true,
    };

    pub fn union(self, other: Self) -> Self {
        Self {
            pretty_printed: self.pretty_printed || other.pretty_printed,
            sorted_keys: self.sorted_keys || other.sorted_keys,
        }
    }
}

/// Strategy set consumed by the decode engine.
#[derive(Clone, Debug, Default)]
pub struct DecodingOptions {
    pub date: DateDecodingStrategy,
    pub data: DataDecodingStrategy,
    pub non_conforming_float: NonConformingFloatDecodingStrategy,
    pub key: KeyDecodingStrategy,
    /// Base for relative references decoded into `UrlRef` or through
    /// `decode_url`.
    pub base_url: Option<Url>,
}

/// Strategy set consumed by the encode engine and the renderer.
#[derive(Clone, Debug, Default)]
pub struct EncodingOptions {
    pub date: DateEncodingStrategy,
    pub data: DataEncodingStrategy,
    pub non_conforming_float: NonConformingFloatEncodingStrategy,
    pub key: KeyEncodingStrategy,
    pub string: StringEncodingStrategy,
    pub output_formatting: OutputFormatting,
}
