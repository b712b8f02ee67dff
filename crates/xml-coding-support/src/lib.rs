//! Field markers and well-known value wrappers shared by types that are encoded
//! to and decoded from XML with `xml-coding`.
//!
//! Every wrapper here serializes as a newtype struct whose name is a reserved
//! token. The XML engines recognize the token and switch to the attribute,
//! CDATA, date, data or URL dispatch path. Any other serde format sees the plain
//! inner value, so the same model types keep working with JSON.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use xml_coding_support::{Attribute, CData};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Book {
//!     id: Attribute<String>,
//!     author: String,
//!     description: CData,
//! }
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, TimeZone, Utc};
use url::Url;
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};

/// Newtype name marking a value that belongs in the start tag as an attribute.
pub const ATTRIBUTE_TOKEN: &str = "$xml_coding::private::Attribute";

/// Newtype name marking string content that is rendered as a CDATA section.
pub const CDATA_TOKEN: &str = "$xml_coding::private::CData";

/// Newtype name marking a timestamp that goes through the date strategies.
pub const DATE_TOKEN: &str = "$xml_coding::private::Date";

/// Newtype name marking a byte blob that goes through the data strategies.
pub const DATA_TOKEN: &str = "$xml_coding::private::Data";

/// Newtype name of [`UrlRef`].
pub const URL_TOKEN: &str = "$xml_coding::private::Url";

/// Seconds between 1970-01-01T00:00:00Z and the 2001-01-01T00:00:00Z reference date.
pub const REFERENCE_DATE_OFFSET: f64 = 978_307_200.0;

/// A field value written as an XML attribute on the parent element instead of
/// as a child element.
///
/// The wrapped value must box to a scalar (string, number, bool, date, URL...).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attribute<T>(pub T);

impl<T> Attribute<T> {
    pub fn new(value: T) -> Self {
        Attribute(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Attribute<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Attribute<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> From<T> for Attribute<T> {
    fn from(value: T) -> Self {
        Attribute(value)
    }
}

impl<T: Serialize> Serialize for Attribute<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(ATTRIBUTE_TOKEN, &self.0)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Attribute<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AttributeVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for AttributeVisitor<T> {
            type Value = Attribute<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an XML attribute value")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                T::deserialize(deserializer).map(Attribute)
            }
        }

        deserializer.deserialize_newtype_struct(ATTRIBUTE_TOKEN, AttributeVisitor(PhantomData))
    }
}

/// String content rendered inside `<![CDATA[...]]>` so markup characters are
/// kept literally.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CData(pub String);

impl CData {
    pub fn new(value: impl Into<String>) -> Self {
        CData(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Deref for CData {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<String> for CData {
    fn from(value: String) -> Self {
        CData(value)
    }
}

impl From<&str> for CData {
    fn from(value: &str) -> Self {
        CData(value.to_string())
    }
}

impl fmt::Display for CData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for CData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(CDATA_TOKEN, &self.0)
    }
}

impl<'de> Deserialize<'de> for CData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CDataVisitor;

        impl<'de> Visitor<'de> for CDataVisitor {
            type Value = CData;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("character data")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                String::deserialize(deserializer).map(CData)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(CData(v.to_string()))
            }
        }

        deserializer.deserialize_newtype_struct(CDATA_TOKEN, CDataVisitor)
    }
}

/// A point in time encoded with the active date strategy.
///
/// Under the deferred strategy the payload is the number of seconds since
/// 2001-01-01T00:00:00Z (Foundation's reference date).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Date(pub DateTime<Utc>);

impl Date {
    pub fn from_unix_seconds(seconds: f64) -> Option<Self> {
        datetime_from_seconds(seconds).map(Date)
    }

    pub fn from_unix_milliseconds(milliseconds: f64) -> Option<Self> {
        Self::from_unix_seconds(milliseconds / 1000.0)
    }

    pub fn from_reference_seconds(seconds: f64) -> Option<Self> {
        Self::from_unix_seconds(seconds + REFERENCE_DATE_OFFSET)
    }

    pub fn unix_seconds(&self) -> f64 {
        seconds_from_datetime(&self.0)
    }

    pub fn unix_milliseconds(&self) -> f64 {
        self.0.timestamp_micros() as f64 / 1000.0
    }

    pub fn reference_seconds(&self) -> f64 {
        self.unix_seconds() - REFERENCE_DATE_OFFSET
    }

    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl Deref for Date {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Date {
    fn from(value: DateTime<Utc>) -> Self {
        Date(value)
    }
}

impl Serialize for Date {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(DATE_TOKEN, &self.reference_seconds())
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DateVisitor;

        impl<'de> Visitor<'de> for DateVisitor {
            type Value = Date;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("seconds since the 2001-01-01 reference date")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                let seconds = f64::deserialize(deserializer)?;
                Date::from_reference_seconds(seconds).ok_or_else(|| {
                    de::Error::invalid_value(de::Unexpected::Float(seconds), &"a representable date")
                })
            }
        }

        deserializer.deserialize_newtype_struct(DATE_TOKEN, DateVisitor)
    }
}

/// A binary blob encoded with the active data strategy (base64 by default).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Data(pub Vec<u8>);

impl Data {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Data {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Data {
    fn from(value: Vec<u8>) -> Self {
        Data(value)
    }
}

impl From<&[u8]> for Data {
    fn from(value: &[u8]) -> Self {
        Data(value.to_vec())
    }
}

struct ByteSlice<'a>(&'a [u8]);

impl Serialize for ByteSlice<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

struct ByteBufVisitor;

impl<'de> Visitor<'de> for ByteBufVisitor {
    type Value = Vec<u8>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a byte buffer")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(v.to_vec())
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: de::SeqAccess<'de>,
    {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(bytes)
    }
}

impl Serialize for Data {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(DATA_TOKEN, &ByteSlice(&self.0))
    }
}

impl<'de> Deserialize<'de> for Data {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DataVisitor;

        impl<'de> Visitor<'de> for DataVisitor {
            type Value = Data;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("binary data")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserializer.deserialize_byte_buf(ByteBufVisitor).map(Data)
            }
        }

        deserializer.deserialize_newtype_struct(DATA_TOKEN, DataVisitor)
    }
}

/// A URL that may be written as a reference relative to the decoder's base
/// URL (`<link>/books/1</link>`).
///
/// The XML decoder resolves the text against its configured base URL; without
/// one, only absolute URLs decode. A plain [`Url`] field always requires an
/// absolute URL. Encoding writes the full URL.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UrlRef(pub Url);

impl UrlRef {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn into_inner(self) -> Url {
        self.0
    }
}

impl Deref for UrlRef {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl From<Url> for UrlRef {
    fn from(value: Url) -> Self {
        UrlRef(value)
    }
}

impl fmt::Display for UrlRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Serialize for UrlRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(URL_TOKEN, self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for UrlRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct UrlRefVisitor;

        impl<'de> Visitor<'de> for UrlRefVisitor {
            type Value = UrlRef;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a URL")
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Url::deserialize(deserializer).map(UrlRef)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Url::parse(v)
                    .map(UrlRef)
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_newtype_struct(URL_TOKEN, UrlRefVisitor)
    }
}

fn datetime_from_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1_000_000.0).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }
    let micros = micros as i64;
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

fn seconds_from_datetime(date: &DateTime<Utc>) -> f64 {
    date.timestamp() as f64 + f64::from(date.timestamp_subsec_micros()) / 1_000_000.0
}

/// Per-field date coders for `#[serde(with = "...")]` on `DateTime<Utc>` fields.
///
/// These fix the representation of one field regardless of the encoder's or
/// decoder's global date strategy.
pub mod date_coders {
    /// Seconds since 1970-01-01T00:00:00Z as a floating point number.
    pub mod seconds_since_1970 {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer, de};

        pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_f64(super::super::seconds_from_datetime(date))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
            let seconds = f64::deserialize(deserializer)?;
            super::super::datetime_from_seconds(seconds).ok_or_else(|| {
                de::Error::invalid_value(de::Unexpected::Float(seconds), &"seconds since 1970")
            })
        }
    }

    /// Milliseconds since 1970-01-01T00:00:00Z as a floating point number.
    pub mod milliseconds_since_1970 {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer, de};

        pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_f64(date.timestamp_micros() as f64 / 1000.0)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
            let millis = f64::deserialize(deserializer)?;
            super::super::datetime_from_seconds(millis / 1000.0).ok_or_else(|| {
                de::Error::invalid_value(de::Unexpected::Float(millis), &"milliseconds since 1970")
            })
        }
    }

    /// RFC 3339 / ISO-8601 text with whole seconds and a `Z` suffix.
    pub mod iso8601 {
        use chrono::{DateTime, SecondsFormat, Utc};
        use serde::{Deserialize, Deserializer, Serializer, de};

        pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Secs, true))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
            let text = String::deserialize(deserializer)?;
            DateTime::parse_from_rfc3339(&text)
                .map(|date| date.with_timezone(&Utc))
                .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&text), &"an ISO-8601 date"))
        }
    }
}

/// Per-field binary coders for `#[serde(with = "...")]` on `Vec<u8>` fields.
pub mod data_coders {
    /// Standard base64 text with padding.
    pub mod base64 {
        use base64::Engine;
        use base64::engine::general_purpose::STANDARD;
        use serde::{Deserialize, Deserializer, Serializer, de};

        pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&STANDARD.encode(bytes))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
            let text = String::deserialize(deserializer)?;
            STANDARD
                .decode(text.as_bytes())
                .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&text), &"valid base64"))
        }
    }
}

/// Per-field coders for floats that may be infinite or NaN.
///
/// Non-finite values are written as substitution strings and read back from
/// them, whatever the global non-conforming float strategy is. The `double`
/// and `float` modules use [`StandardNames`] and plug into
/// `#[serde(with = "...")]`; the generic functions take any [`NonConformingNames`]
/// through `serialize_with` / `deserialize_with`:
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use xml_coding_support::float_coders::{self, NonConformingNames};
///
/// struct Words;
///
/// impl NonConformingNames for Words {
///     const POSITIVE_INFINITY: &'static str = "inf";
///     const NEGATIVE_INFINITY: &'static str = "-inf";
///     const NAN: &'static str = "nan";
/// }
///
/// #[derive(Serialize, Deserialize)]
/// struct Reading {
///     #[serde(with = "float_coders::double")]
///     level: f64,
///     #[serde(
///         serialize_with = "float_coders::serialize_float::<Words, _>",
///         deserialize_with = "float_coders::deserialize_float::<Words, _>"
///     )]
///     ratio: f32,
/// }
/// ```
pub mod float_coders {
    use std::fmt;
    use std::marker::PhantomData;

    use serde::de::{self, Deserializer, Visitor};
    use serde::ser::Serializer;

    /// Substitution strings for the three non-finite values.
    pub trait NonConformingNames {
        const POSITIVE_INFINITY: &'static str;
        const NEGATIVE_INFINITY: &'static str;
        const NAN: &'static str;
    }

    /// `+Infinity`, `-Infinity` and `NaN`.
    pub struct StandardNames;

    impl NonConformingNames for StandardNames {
        const POSITIVE_INFINITY: &'static str = "+Infinity";
        const NEGATIVE_INFINITY: &'static str = "-Infinity";
        const NAN: &'static str = "NaN";
    }

    fn substitute<N: NonConformingNames>(value: f64) -> Option<&'static str> {
        if value.is_nan() {
            Some(N::NAN)
        } else if value == f64::INFINITY {
            Some(N::POSITIVE_INFINITY)
        } else if value == f64::NEG_INFINITY {
            Some(N::NEGATIVE_INFINITY)
        } else {
            None
        }
    }

    pub fn serialize_double<N: NonConformingNames, S: Serializer>(
        value: &f64,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match substitute::<N>(*value) {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_f64(*value),
        }
    }

    pub fn deserialize_double<'de, N: NonConformingNames, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<f64, D::Error> {
        deserializer.deserialize_any(NonConformingVisitor::<N> {
            expected: "a double or a non-conforming float name",
            names: PhantomData,
        })
    }

    pub fn serialize_float<N: NonConformingNames, S: Serializer>(
        value: &f32,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match substitute::<N>(f64::from(*value)) {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_f32(*value),
        }
    }

    pub fn deserialize_float<'de, N: NonConformingNames, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<f32, D::Error> {
        let value = deserializer.deserialize_any(NonConformingVisitor::<N> {
            expected: "a float or a non-conforming float name",
            names: PhantomData,
        })?;
        if value.is_finite() && value.abs() > f64::from(f32::MAX) {
            return Err(de::Error::invalid_value(de::Unexpected::Float(value), &"a float"));
        }
        Ok(value as f32)
    }

    struct NonConformingVisitor<N> {
        expected: &'static str,
        names: PhantomData<N>,
    }

    impl<'de, N: NonConformingNames> Visitor<'de> for NonConformingVisitor<N> {
        type Value = f64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str(self.expected)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            if v == N::POSITIVE_INFINITY {
                Ok(f64::INFINITY)
            } else if v == N::NEGATIVE_INFINITY {
                Ok(f64::NEG_INFINITY)
            } else if v == N::NAN {
                Ok(f64::NAN)
            } else {
                v.trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .ok_or_else(|| de::Error::invalid_value(de::Unexpected::Str(v), &self))
            }
        }
    }

    /// `f64` fields with [`StandardNames`].
    pub mod double {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
            super::serialize_double::<super::StandardNames, S>(value, serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
            super::deserialize_double::<super::StandardNames, D>(deserializer)
        }
    }

    /// `f32` fields with [`StandardNames`].
    pub mod float {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
            super::serialize_float::<super::StandardNames, S>(value, serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
            super::deserialize_float::<super::StandardNames, D>(deserializer)
        }
    }
}

/// Helper that accepts either a single value or a sequence when deserializing.
///
/// XML carries no array syntax: a repeated child element shows up as a
/// sequence only when it occurs more than once. Wrapping such a field in
/// `SingleOrVec` accepts the one-element case and the repeated case alike.
#[derive(Clone, Debug, PartialEq)]
pub struct SingleOrVec<T>(Vec<T>);

impl<T> AsRef<[T]> for SingleOrVec<T> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        &self.0
    }
}

impl<T> From<SingleOrVec<T>> for Vec<T> {
    #[inline]
    fn from(wrapper: SingleOrVec<T>) -> Self {
        wrapper.0
    }
}

impl<T> From<Vec<T>> for SingleOrVec<T> {
    #[inline]
    fn from(values: Vec<T>) -> Self {
        SingleOrVec(values)
    }
}

impl<T> Default for SingleOrVec<T> {
    #[inline]
    fn default() -> Self {
        SingleOrVec(Vec::new())
    }
}

impl<T: Serialize> Serialize for SingleOrVec<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for SingleOrVec<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SingleOrVecVisitor<T>(PhantomData<T>);

        impl<'de, T> Visitor<'de> for SingleOrVecVisitor<T>
        where
            T: Deserialize<'de>,
        {
            type Value = SingleOrVec<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a single value or a sequence")
            }

            // Repeated XML elements
            #[inline]
            fn visit_seq<A>(self, seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let values = Deserialize::deserialize(de::value::SeqAccessDeserializer::new(seq))?;
                Ok(SingleOrVec(values))
            }

            // A single element with children or attributes
            #[inline]
            fn visit_map<M>(self, map: M) -> Result<Self::Value, M::Error>
            where
                M: de::MapAccess<'de>,
            {
                let value = T::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(SingleOrVec(vec![value]))
            }

            // A single text-only element
            #[inline]
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let value = T::deserialize(de::value::StrDeserializer::new(v))?;
                Ok(SingleOrVec(vec![value]))
            }

            #[inline]
            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let value = T::deserialize(de::value::StringDeserializer::new(v))?;
                Ok(SingleOrVec(vec![value]))
            }

            #[inline]
            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(SingleOrVec(Vec::new()))
            }
        }

        deserializer.deserialize_any(SingleOrVecVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Tagged {
        id: Attribute<u32>,
        body: CData,
    }

    #[test]
    fn test_markers_are_transparent_to_json() {
        let value = Tagged {
            id: Attribute(7),
            body: CData::new("a & b"),
        };
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"id":7,"body":"a & b"}"#);
        let back: Tagged = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_reference_date_conversion() {
        let date = Date::from_reference_seconds(0.0).unwrap();
        assert_eq!(date.to_rfc3339(), "2001-01-01T00:00:00+00:00");
        assert_eq!(date.unix_seconds(), REFERENCE_DATE_OFFSET);
        assert_eq!(date.reference_seconds(), 0.0);
    }

    #[test]
    fn test_fractional_seconds_round_to_micros() {
        let date = Date::from_unix_seconds(12345.678).unwrap();
        assert_eq!(date.unix_milliseconds(), 12345678.0);
        assert!(Date::from_unix_seconds(f64::NAN).is_none());
        assert!(Date::from_unix_seconds(f64::INFINITY).is_none());
    }

    #[test]
    fn test_date_coders_with_json() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Stamp {
            #[serde(with = "date_coders::milliseconds_since_1970")]
            at: DateTime<Utc>,
            #[serde(with = "date_coders::iso8601")]
            iso: DateTime<Utc>,
        }

        let at = Date::from_unix_seconds(1.5).unwrap().0;
        let stamp = Stamp { at, iso: at };
        let json = serde_json::to_string(&stamp).unwrap();
        assert_eq!(json, r#"{"at":1500.0,"iso":"1970-01-01T00:00:01Z"}"#);
    }

    #[test]
    fn test_base64_coder_rejects_bad_alphabet() {
        #[derive(Debug, Deserialize)]
        struct Blob {
            #[serde(with = "data_coders::base64")]
            bytes: Vec<u8>,
        }

        let ok: Blob = serde_json::from_str(r#"{"bytes":"aGVsbG8="}"#).unwrap();
        assert_eq!(ok.bytes, b"hello");
        assert!(serde_json::from_str::<Blob>(r#"{"bytes":"2o8&@O87n3n98N"}"#).is_err());
    }

    #[test]
    fn test_url_ref_is_transparent_to_json() {
        let link = UrlRef(Url::parse("https://example.com/books/1").unwrap());
        let json = serde_json::to_string(&link).unwrap();
        assert_eq!(json, r#""https://example.com/books/1""#);
        let back: UrlRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, link);
        assert!(serde_json::from_str::<UrlRef>(r#""/books/1""#).is_err());
    }

    #[test]
    fn test_float_coders_with_json() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Reading {
            #[serde(with = "float_coders::double")]
            level: f64,
            #[serde(with = "float_coders::float")]
            ratio: f32,
        }

        let json = serde_json::to_string(&Reading {
            level: f64::NEG_INFINITY,
            ratio: 0.5,
        })
        .unwrap();
        assert_eq!(json, r#"{"level":"-Infinity","ratio":0.5}"#);

        let back: Reading = serde_json::from_str(r#"{"level":"NaN","ratio":2}"#).unwrap();
        assert!(back.level.is_nan());
        assert_eq!(back.ratio, 2.0);
        assert!(serde_json::from_str::<Reading>(r#"{"level":"Infinity","ratio":1}"#).is_err());
        assert!(serde_json::from_str::<Reading>(r#"{"level":1,"ratio":"1e39"}"#).is_err());
    }

    #[test]
    fn test_single_or_vec_accepts_both_shapes() {
        let one: SingleOrVec<String> = serde_json::from_str(r#""a""#).unwrap();
        assert_eq!(one.as_ref(), ["a".to_string()]);
        let many: SingleOrVec<String> = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(Vec::from(many), vec!["a".to_string(), "b".to_string()]);
    }
}
