//! # XML Coding
//!
//! Bidirectional mapping between XML documents and typed Rust values, built on
//! `serde` and `quick-xml`.
//!
//! ## Features
//!
//! - **Value tree**: documents are parsed into an ordered, attributed [`Value`]
//!   tree whose leaves stay text until a target type asks for them.
//! - **Coding engines**: [`Decoder`] and [`Encoder`] implement the serde
//!   traits and also expose keyed, unkeyed and single-value containers for
//!   hand-written coding logic.
//! - **Strategies**: dates, binary data, non-finite floats and key casing are
//!   configurable per call through [`XmlDecoder`] and [`XmlEncoder`].
//! - **Attributes and CDATA**: [`Attribute`] and [`CData`] field markers (or an
//!   `@`-prefixed serde name) control where a field lands in the document.
//!
//! ## Repeated elements
//!
//! A `Vec` field maps to a repeated child element. An empty `Vec` writes no
//! elements at all, so the decoder cannot tell it from an absent field; mark
//! such fields `#[serde(default)]` to read them back as empty:
//!
//! ```
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Tagged {
//!     name: String,
//!     #[serde(default, rename = "tag")]
//!     tags: Vec<String>,
//! }
//!
//! let xml = xml_coding::to_string(&Tagged { name: "n".into(), tags: vec![] }, "root").unwrap();
//! assert_eq!(xml, "<root><name>n</name></root>");
//! let tagged: Tagged = xml_coding::from_str(&xml).unwrap();
//! assert!(tagged.tags.is_empty());
//! ```
//!
//! ## Architecture
//!
//! - `value`: the intermediate tree.
//! - `registry`: text conversions for primitives and well-known types.
//! - `strategy`: the user-settable policies.
//! - `xml::de` / `xml::ser`: the stack-based engines.
//! - `xml::tree`: parsing and rendering with `quick-xml`.
//!
//! ## Examples
//!
//! ```ignore
//! use serde::{Deserialize, Serialize};
//! use xml_coding::{Attribute, CData, XmlDecoder, XmlEncoder, XmlHeader};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Book {
//!     id: Attribute<String>,
//!     author: String,
//!     description: CData,
//! }
//!
//! let header = XmlHeader::new(Some(1.0), None, None);
//! let xml = XmlEncoder::new().encode_to_string(&book, "book", Some(&header))?;
//! let decoded: Book = XmlDecoder::new().decode_str(&xml)?;
//! ```

pub mod error;
pub mod key_case;
pub mod path;
pub mod registry;
pub mod strategy;
pub mod value;
pub mod xml;

pub use error::{Result, XmlCodingError};
pub use path::{CodingPath, PathSegment};
pub use strategy::{
    DataDecodingStrategy, DataEncodingStrategy, DateDecodingStrategy, DateEncodingStrategy,
    DecodingOptions, EncodingOptions, KeyDecodingStrategy, KeyEncodingStrategy,
    NonConformingFloatDecodingStrategy, NonConformingFloatEncodingStrategy, OutputFormatting,
    StringEncodingStrategy,
};
pub use value::{Keyed, TEXT_KEY, Value};

pub use xml::de::{
    Decoder, KeyedDecodingContainer, SingleValueDecodingContainer, UnkeyedDecodingContainer,
};
pub use xml::ser::{
    Encoder, KeyedEncodingContainer, ReferencingEncoder, SingleValueEncodingContainer,
    UnkeyedEncodingContainer,
};
pub use xml::{XmlDecoder, XmlEncoder, XmlHeader, from_slice, from_str, to_string, to_vec};

pub use xml_coding_support::{
    Attribute, CData, Data, Date, SingleOrVec, UrlRef, data_coders, date_coders, float_coders,
};
