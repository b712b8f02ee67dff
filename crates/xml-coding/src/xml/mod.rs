//! XML front ends for the coding engines.
//!
//! Decoding runs in two stages: [`tree::parse`] turns the document into a
//! [`Value`] tree, then [`de::Decoder`] walks that tree for the target type.
//! Encoding mirrors it: [`ser::Encoder`] boxes the value into a tree and
//! [`tree::render`] writes the tree as a document.
//!
//! ## Mapping
//!
//! | Rust | XML |
//! |------|-----|
//! | struct field `title: String` | `<title>...</title>` |
//! | `Attribute<String>` field or `#[serde(rename = "@id")]` | `<book id="...">` |
//! | `CData` field | `<description><![CDATA[...]]></description>` |
//! | `Vec<T>` field `book` | repeated `<book>` siblings |
//! | `None` field | omitted |
//! | unit variant | element text |
//!
//! ## Examples
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use xml_coding::{Attribute, XmlDecoder, XmlEncoder, XmlHeader};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Book {
//!     id: Attribute<String>,
//!     title: String,
//! }
//!
//! let header = XmlHeader::new(Some(1.0), None, None);
//! let xml = XmlEncoder::new().encode_to_string(&book, "book", Some(&header))?;
//! let book: Book = XmlDecoder::new().decode_str(&xml)?;
//! ```

pub mod de;
pub mod ser;
pub mod tree;
pub(crate) mod utils;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Result, XmlCodingError};
use crate::strategy::{
    DataDecodingStrategy, DataEncodingStrategy, DateDecodingStrategy, DateEncodingStrategy,
    DecodingOptions, EncodingOptions, KeyDecodingStrategy, KeyEncodingStrategy,
    NonConformingFloatDecodingStrategy, NonConformingFloatEncodingStrategy, OutputFormatting,
    StringEncodingStrategy,
};
use crate::value::Value;

pub use tree::XmlHeader;

/// Decodes XML documents into Rust values under a fixed set of strategies.
#[derive(Clone, Debug, Default)]
pub struct XmlDecoder {
    options: DecodingOptions,
}

impl XmlDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DecodingOptions) -> Self {
        XmlDecoder { options }
    }

    pub fn date_strategy(mut self, strategy: DateDecodingStrategy) -> Self {
        self.options.date = strategy;
        self
    }

    pub fn data_strategy(mut self, strategy: DataDecodingStrategy) -> Self {
        self.options.data = strategy;
        self
    }

    pub fn non_conforming_float_strategy(mut self, strategy: NonConformingFloatDecodingStrategy) -> Self {
        self.options.non_conforming_float = strategy;
        self
    }

    pub fn key_strategy(mut self, strategy: KeyDecodingStrategy) -> Self {
        self.options.key = strategy;
        self
    }

    /// Resolves relative URL references against `base`.
    pub fn base_url(mut self, base: Url) -> Self {
        self.options.base_url = Some(base);
        self
    }

    pub fn options(&self) -> &DecodingOptions {
        &self.options
    }

    /// Decodes `T` from the document in `xml`.
    ///
    /// The root element's name is not checked; its content is the top-level
    /// value.
    pub fn decode<T: DeserializeOwned>(&self, xml: &[u8]) -> Result<T> {
        debug!(
            target_type = std::any::type_name::<T>(),
            bytes = xml.len(),
            options = ?self.options,
            "Decoding XML document"
        );
        let root = tree::parse(xml)?;
        self.decode_value(&root)
    }

    pub fn decode_str<T: DeserializeOwned>(&self, xml: &str) -> Result<T> {
        self.decode(xml.as_bytes())
    }

    /// Decodes `T` from an already parsed tree.
    pub fn decode_value<'de, T: Deserialize<'de>>(&'de self, root: &'de Value) -> Result<T> {
        de::Decoder::new(root, &self.options).decode()
    }
}

/// Encodes Rust values as XML documents under a fixed set of strategies.
#[derive(Clone, Debug, Default)]
pub struct XmlEncoder {
    options: EncodingOptions,
}

impl XmlEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EncodingOptions) -> Self {
        XmlEncoder { options }
    }

    pub fn date_strategy(mut self, strategy: DateEncodingStrategy) -> Self {
        self.options.date = strategy;
        self
    }

    pub fn data_strategy(mut self, strategy: DataEncodingStrategy) -> Self {
        self.options.data = strategy;
        self
    }

    pub fn non_conforming_float_strategy(mut self, strategy: NonConformingFloatEncodingStrategy) -> Self {
        self.options.non_conforming_float = strategy;
        self
    }

    pub fn key_strategy(mut self, strategy: KeyEncodingStrategy) -> Self {
        self.options.key = strategy;
        self
    }

    pub fn string_strategy(mut self, strategy: StringEncodingStrategy) -> Self {
        self.options.string = strategy;
        self
    }

    pub fn output_formatting(mut self, formatting: OutputFormatting) -> Self {
        self.options.output_formatting = formatting;
        self
    }

    pub fn options(&self) -> &EncodingOptions {
        &self.options
    }

    /// Encodes `value` as a document whose root element is `root_key`.
    pub fn encode<T: ?Sized + Serialize>(
        &self,
        value: &T,
        root_key: &str,
        header: Option<&XmlHeader>,
    ) -> Result<Vec<u8>> {
        debug!(
            source_type = std::any::type_name::<T>(),
            root_key,
            options = ?self.options,
            "Encoding XML document"
        );
        let root = self.encode_value(value)?;
        tree::render(&root, root_key, header, self.options.output_formatting)
    }

    pub fn encode_to_string<T: ?Sized + Serialize>(
        &self,
        value: &T,
        root_key: &str,
        header: Option<&XmlHeader>,
    ) -> Result<String> {
        let bytes = self.encode(value, root_key, header)?;
        String::from_utf8(bytes).map_err(|e| XmlCodingError::invalid_value(&[], e.to_string()))
    }

    /// Boxes `value` into a tree without rendering it. The root must be keyed.
    pub fn encode_value<T: ?Sized + Serialize>(&self, value: &T) -> Result<Value> {
        ser::encode_root(value, &self.options)
    }
}

/// Deserialize a value from an XML string with default strategies.
///
/// # Examples
///
/// ```ignore
/// use xml_coding::from_str;
///
/// let book: Book = from_str("<book><title>XML</title></book>")?;
/// ```
pub fn from_str<T: DeserializeOwned>(xml: &str) -> Result<T> {
    XmlDecoder::new().decode_str(xml)
}

/// Deserialize a value from XML bytes with default strategies.
pub fn from_slice<T: DeserializeOwned>(xml: &[u8]) -> Result<T> {
    XmlDecoder::new().decode(xml)
}

/// Serialize a value to an XML string with default strategies and no declaration.
pub fn to_string<T: ?Sized + Serialize>(value: &T, root_key: &str) -> Result<String> {
    XmlEncoder::new().encode_to_string(value, root_key, None)
}

/// Serialize a value to an XML byte vector with default strategies and no declaration.
pub fn to_vec<T: ?Sized + Serialize>(value: &T, root_key: &str) -> Result<Vec<u8>> {
    XmlEncoder::new().encode(value, root_key, None)
}
