//! Conversions between leaf text and the primitive and well-known types.
//!
//! Every function takes the coding path only to label errors; none of them
//! touch the engines' stacks.

use std::fmt::{Display, Write as _};
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::trace;
use url::Url;
use xml_coding_support::Date;

use crate::error::{Result, XmlCodingError};
use crate::path::PathSegment;
use crate::strategy::{
    DateDecodingStrategy, DateEncodingStrategy, NonConformingFloatDecodingStrategy,
    NonConformingFloatEncodingStrategy,
};

/// Integer widths the registry can unbox.
pub trait XmlInteger: Copy + Display + FromStr + TryFrom<i128> {
    const NAME: &'static str;
}

macro_rules! xml_integer {
    ($($ty:ty),*) => {
        $(
            impl XmlInteger for $ty {
                const NAME: &'static str = stringify!($ty);
            }
        )*
    };
}

xml_integer!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

/// Largest magnitude accepted on the floating point fallback path; beyond it
/// the conversion to `i128` is not exact.
const INTEGRAL_LIMIT: f64 = 1.7e38;

fn quoted(text: &str) -> String {
    format!("\"{text}\"")
}

pub fn unbox_bool(text: &str, path: &[PathSegment]) -> Result<bool> {
    match text {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(XmlCodingError::type_mismatch(path, "bool", quoted(text))),
    }
}

pub fn box_bool(value: bool) -> String {
    crate::xml::utils::bool_to_str(value).to_string()
}

/// Parses an integer of width `T`.
///
/// Text that is not a plain integer literal is read as a double so values like
/// `1e3` or `42.0` are accepted; the double must then be integral and fit `T`.
pub fn unbox_int<T: XmlInteger>(text: &str, path: &[PathSegment]) -> Result<T> {
    if let Ok(value) = text.parse::<T>() {
        return Ok(value);
    }

    let number: f64 = text
        .parse()
        .map_err(|_| XmlCodingError::type_mismatch(path, T::NAME, quoted(text)))?;

    let does_not_fit = || {
        XmlCodingError::data_corrupted(
            path,
            format!("Parsed XML number <{text}> does not fit in {}.", T::NAME),
        )
    };

    if !number.is_finite() || number.fract() != 0.0 || number.abs() >= INTEGRAL_LIMIT {
        return Err(does_not_fit());
    }
    let integral = number as i128;
    if integral as f64 != number {
        return Err(does_not_fit());
    }
    T::try_from(integral).map_err(|_| does_not_fit())
}

pub fn box_int<T: XmlInteger>(value: T) -> String {
    value.to_string()
}

pub fn unbox_f64(
    text: &str,
    strategy: &NonConformingFloatDecodingStrategy,
    path: &[PathSegment],
) -> Result<f64> {
    unbox_float(text, strategy, path, "f64")
}

pub fn unbox_f32(
    text: &str,
    strategy: &NonConformingFloatDecodingStrategy,
    path: &[PathSegment],
) -> Result<f32> {
    let value = unbox_float(text, strategy, path, "f32")?;
    if value.is_finite() && value.abs() > f64::from(f32::MAX) {
        return Err(XmlCodingError::data_corrupted(
            path,
            format!("Parsed XML number <{text}> does not fit in f32."),
        ));
    }
    Ok(value as f32)
}

fn unbox_float(
    text: &str,
    strategy: &NonConformingFloatDecodingStrategy,
    path: &[PathSegment],
    type_name: &str,
) -> Result<f64> {
    if let NonConformingFloatDecodingStrategy::ConvertFromString {
        positive_infinity,
        negative_infinity,
        nan,
    } = strategy
    {
        if text == positive_infinity {
            return Ok(f64::INFINITY);
        }
        if text == negative_infinity {
            return Ok(f64::NEG_INFINITY);
        }
        if text == nan {
            return Ok(f64::NAN);
        }
    }

    let value: f64 = text
        .parse()
        .map_err(|_| XmlCodingError::type_mismatch(path, type_name, quoted(text)))?;
    if !value.is_finite() {
        // Literals like `inf` or `NaN` are only accepted through substitution strings.
        return Err(XmlCodingError::type_mismatch(path, type_name, quoted(text)));
    }
    Ok(value)
}

pub fn box_f64(
    value: f64,
    strategy: &NonConformingFloatEncodingStrategy,
    path: &[PathSegment],
) -> Result<String> {
    if value.is_finite() {
        return Ok(value.to_string());
    }
    box_non_conforming(value.is_nan(), value.is_sign_positive(), value, strategy, path)
}

pub fn box_f32(
    value: f32,
    strategy: &NonConformingFloatEncodingStrategy,
    path: &[PathSegment],
) -> Result<String> {
    if value.is_finite() {
        return Ok(value.to_string());
    }
    box_non_conforming(value.is_nan(), value.is_sign_positive(), value, strategy, path)
}

fn box_non_conforming(
    is_nan: bool,
    is_positive: bool,
    value: impl Display,
    strategy: &NonConformingFloatEncodingStrategy,
    path: &[PathSegment],
) -> Result<String> {
    match strategy {
        NonConformingFloatEncodingStrategy::Throw => Err(XmlCodingError::invalid_value(
            path,
            format!(
                "Unable to encode {value} directly in XML. Use NonConformingFloatEncodingStrategy::ConvertToString to specify how the value should be encoded."
            ),
        )),
        NonConformingFloatEncodingStrategy::ConvertToString {
            positive_infinity,
            negative_infinity,
            nan,
        } => Ok(if is_nan {
            nan.clone()
        } else if is_positive {
            positive_infinity.clone()
        } else {
            negative_infinity.clone()
        }),
    }
}

pub fn unbox_char(text: &str, path: &[PathSegment]) -> Result<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(XmlCodingError::type_mismatch(path, "char", quoted(text))),
    }
}

/// Parses a URL, resolving relative references against `base` when one is
/// given.
pub fn unbox_url(text: &str, base: Option<&Url>, path: &[PathSegment]) -> Result<Url> {
    Url::options()
        .base_url(base)
        .parse(text)
        .map_err(|_| XmlCodingError::data_corrupted(path, "Invalid URL string."))
}

pub fn box_url(url: &Url) -> String {
    url.as_str().to_string()
}

/// Decimals bridge through `f64`; digits beyond double precision are lost.
pub fn unbox_decimal(
    text: &str,
    strategy: &NonConformingFloatDecodingStrategy,
    path: &[PathSegment],
) -> Result<Decimal> {
    let value = unbox_f64(text, strategy, path)?;
    Decimal::from_str(&value.to_string()).map_err(|_| {
        XmlCodingError::data_corrupted(
            path,
            format!("Parsed XML number <{text}> does not fit in Decimal."),
        )
    })
}

pub fn box_decimal(value: &Decimal, path: &[PathSegment]) -> Result<String> {
    let double = value.to_f64().ok_or_else(|| {
        XmlCodingError::invalid_value(path, format!("Decimal {value} has no f64 representation."))
    })?;
    Ok(double.to_string())
}

pub fn unbox_data(text: &str, path: &[PathSegment]) -> Result<Vec<u8>> {
    trace!(len = text.len(), "Decoding base64 data");
    STANDARD
        .decode(text.as_bytes())
        .map_err(|_| XmlCodingError::data_corrupted(path, "Encountered Data is not valid Base64."))
}

pub fn box_data(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Parses `text` with a chrono pattern, accepting zoned date-times, naive
/// date-times (read as UTC) and bare dates (midnight UTC).
pub fn parse_formatted_date(text: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_str(text, format) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Unboxes a date under one of the text-based strategies.
///
/// `Deferred` and `Custom` need the decoder and are handled by it; passing
/// them here is reported as a type mismatch.
pub fn unbox_date(
    text: &str,
    strategy: &DateDecodingStrategy,
    floats: &NonConformingFloatDecodingStrategy,
    path: &[PathSegment],
) -> Result<DateTime<Utc>> {
    trace!(?strategy, "Decoding date");
    let out_of_range = || XmlCodingError::data_corrupted(path, format!("Date <{text}> is out of range."));
    match strategy {
        DateDecodingStrategy::SecondsSince1970 => {
            let seconds = unbox_f64(text, floats, path)?;
            Date::from_unix_seconds(seconds).map(Date::into_inner).ok_or_else(out_of_range)
        }
        DateDecodingStrategy::MillisecondsSince1970 => {
            let millis = unbox_f64(text, floats, path)?;
            Date::from_unix_milliseconds(millis)
                .map(Date::into_inner)
                .ok_or_else(out_of_range)
        }
        DateDecodingStrategy::Iso8601 => DateTime::parse_from_rfc3339(text)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|_| {
                XmlCodingError::data_corrupted(path, "Expected date string to be ISO8601-formatted.")
            }),
        DateDecodingStrategy::Formatted(format) => parse_formatted_date(text, format).ok_or_else(|| {
            XmlCodingError::data_corrupted(path, "Date string does not match format expected by formatter.")
        }),
        DateDecodingStrategy::Deferred | DateDecodingStrategy::Custom(_) => {
            Err(XmlCodingError::type_mismatch(path, "Date", quoted(text)))
        }
    }
}

/// Boxes a date under one of the text-based strategies; `None` for
/// `Deferred` and `Custom`, which the encoder handles itself.
pub fn box_date(
    date: &DateTime<Utc>,
    strategy: &DateEncodingStrategy,
    path: &[PathSegment],
) -> Result<Option<String>> {
    trace!(?strategy, "Encoding date");
    let date = Date(*date);
    Ok(match strategy {
        DateEncodingStrategy::SecondsSince1970 => Some(date.unix_seconds().to_string()),
        DateEncodingStrategy::MillisecondsSince1970 => Some(date.unix_milliseconds().to_string()),
        DateEncodingStrategy::Iso8601 => Some(date.to_rfc3339_opts(SecondsFormat::Secs, true)),
        DateEncodingStrategy::Formatted(format) => {
            let mut text = String::new();
            write!(text, "{}", date.format(format)).map_err(|_| {
                XmlCodingError::invalid_value(path, format!("Invalid date format pattern \"{format}\"."))
            })?;
            Some(text)
        }
        DateEncodingStrategy::Deferred | DateEncodingStrategy::Custom(_) => None,
    })
}
