use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use xml_coding::{
    Data, DataDecodingStrategy, DataEncodingStrategy, Date, DateDecodingStrategy,
    DateEncodingStrategy, KeyDecodingStrategy, KeyEncodingStrategy, PathSegment, Result,
    XmlCodingError, XmlDecoder, XmlEncoder, data_coders, date_coders,
};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Event {
    start: Date,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Payload {
    blob: Data,
}

fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Date {
    Date(Utc.with_ymd_and_hms(year, month, day, hour, minute, second).unwrap())
}

fn encode_event(encoder: XmlEncoder, start: Date) -> Result<String> {
    encoder.encode_to_string(&Event { start }, "event", None)
}

fn decode_event(decoder: XmlDecoder, text: &str) -> Result<Date> {
    let event: Event = decoder.decode_str(&format!("<event><start>{text}</start></event>"))?;
    Ok(event.start)
}

#[test]
fn test_deferred_dates_use_reference_seconds() -> Result<()> {
    let date = utc(2001, 1, 1, 0, 1, 0);
    assert_eq!(
        encode_event(XmlEncoder::new(), date)?,
        "<event><start>60</start></event>"
    );
    assert_eq!(decode_event(XmlDecoder::new(), "60")?, date);
    assert_eq!(decode_event(XmlDecoder::new(), "-60")?, utc(2000, 12, 31, 23, 59, 0));
    Ok(())
}

#[test]
fn test_default_date_strategies_round_trip() -> Result<()> {
    let date = utc(2024, 2, 29, 18, 45, 30);
    let xml = encode_event(XmlEncoder::new(), date)?;
    let event: Event = XmlDecoder::new().decode_str(&xml)?;
    assert_eq!(event.start, date);
    Ok(())
}

#[test]
fn test_seconds_since_1970() -> Result<()> {
    let date = Date::from_unix_seconds(1_000_000_000.0).unwrap();
    let encoder = XmlEncoder::new().date_strategy(DateEncodingStrategy::SecondsSince1970);
    assert_eq!(
        encode_event(encoder, date)?,
        "<event><start>1000000000</start></event>"
    );

    let decoder = XmlDecoder::new().date_strategy(DateDecodingStrategy::SecondsSince1970);
    assert_eq!(decode_event(decoder, "1000000000")?, date);
    Ok(())
}

#[test]
fn test_milliseconds_since_1970() -> Result<()> {
    let decoder = XmlDecoder::new().date_strategy(DateDecodingStrategy::MillisecondsSince1970);
    assert_eq!(decode_event(decoder, "1500")?, Date::from_unix_seconds(1.5).unwrap());

    let encoder = XmlEncoder::new().date_strategy(DateEncodingStrategy::MillisecondsSince1970);
    assert_eq!(
        encode_event(encoder, Date::from_unix_seconds(2.0).unwrap())?,
        "<event><start>2000</start></event>"
    );
    Ok(())
}

#[test]
fn test_iso8601() -> Result<()> {
    let date = utc(2000, 10, 1, 12, 30, 0);
    let encoder = XmlEncoder::new().date_strategy(DateEncodingStrategy::Iso8601);
    assert_eq!(
        encode_event(encoder, date)?,
        "<event><start>2000-10-01T12:30:00Z</start></event>"
    );

    let decoder = XmlDecoder::new().date_strategy(DateDecodingStrategy::Iso8601);
    assert_eq!(decode_event(decoder, "2000-10-01T14:30:00+02:00")?, date);

    let decoder = XmlDecoder::new().date_strategy(DateDecodingStrategy::Iso8601);
    let err = decode_event(decoder, "October 1st").unwrap_err();
    assert!(matches!(err, XmlCodingError::DataCorrupted { .. }));
    assert_eq!(err.path(), Some([PathSegment::key("start")].as_slice()));
    Ok(())
}

#[test]
fn test_formatted_dates() -> Result<()> {
    let decoder = XmlDecoder::new().date_strategy(DateDecodingStrategy::Formatted("%d/%m/%Y %H:%M".to_string()));
    assert_eq!(decode_event(decoder, "01/10/2000 08:15")?, utc(2000, 10, 1, 8, 15, 0));

    let decoder = XmlDecoder::new().date_strategy(DateDecodingStrategy::Formatted("%Y-%m-%d".to_string()));
    assert!(matches!(
        decode_event(decoder, "2000/10/01"),
        Err(XmlCodingError::DataCorrupted { .. })
    ));
    Ok(())
}

#[test]
fn test_custom_date_strategies() -> Result<()> {
    let encoder = XmlEncoder::new().date_strategy(DateEncodingStrategy::custom(|date, encoder| {
        encoder
            .single_value_container()
            .encode(&date.format("%Y").to_string())
    }));
    assert_eq!(
        encode_event(encoder, utc(1999, 5, 4, 0, 0, 0))?,
        "<event><start>1999</start></event>"
    );

    let decoder = XmlDecoder::new().date_strategy(DateDecodingStrategy::custom(|decoder| {
        let year = decoder.single_value_container().decode_int::<i32>()?;
        let date = NaiveDate::from_ymd_opt(year, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(|| XmlCodingError::data_corrupted(decoder.coding_path(), "Year out of range."))?;
        Ok(date.and_utc())
    }));
    assert_eq!(decode_event(decoder, "1999")?, utc(1999, 1, 1, 0, 0, 0));
    Ok(())
}

#[test]
fn test_custom_date_encoder_writing_nothing_yields_empty_element() -> Result<()> {
    let encoder = XmlEncoder::new().date_strategy(DateEncodingStrategy::custom(|_, _| Ok(())));
    assert_eq!(
        encode_event(encoder, utc(1999, 5, 4, 0, 0, 0))?,
        "<event><start></start></event>"
    );
    Ok(())
}

#[test]
fn test_key_formatted_dates() -> Result<()> {
    #[derive(Debug, Deserialize)]
    struct Window {
        opens: Date,
        closes: Date,
    }

    let decoder = XmlDecoder::new().date_strategy(DateDecodingStrategy::key_formatted(|key| match key {
        "opens" => Some("%Y-%m-%d".to_string()),
        "closes" => Some("%Y-%m-%dT%H:%M".to_string()),
        _ => None,
    }));
    let window: Window = decoder.decode_str("<window><opens>2020-02-01</opens><closes>2020-02-03T18:00</closes></window>")?;
    assert_eq!(window.opens, utc(2020, 2, 1, 0, 0, 0));
    assert_eq!(window.closes, utc(2020, 2, 3, 18, 0, 0));

    let err = decoder
        .decode_str::<Event>("<event><start>2020-02-01</start></event>")
        .unwrap_err();
    match err {
        XmlCodingError::DataCorrupted { path, description } => {
            assert_eq!(path, vec![PathSegment::key("start")]);
            assert_eq!(description, "No date formatter for date text");
        }
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

#[test]
fn test_per_field_date_coders_ignore_the_global_strategy() -> Result<()> {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "date_coders::iso8601")]
        created: DateTime<Utc>,
        #[serde(with = "date_coders::seconds_since_1970")]
        updated: DateTime<Utc>,
    }

    let value = Stamped {
        created: utc(2000, 10, 1, 0, 0, 0).into_inner(),
        updated: Utc.timestamp_opt(86_400, 0).unwrap(),
    };
    let encoder = XmlEncoder::new().date_strategy(DateEncodingStrategy::MillisecondsSince1970);
    let xml = encoder.encode_to_string(&value, "stamped", None)?;
    assert_eq!(
        xml,
        "<stamped><created>2000-10-01T00:00:00Z</created><updated>86400</updated></stamped>"
    );
    assert_eq!(XmlDecoder::new().decode_str::<Stamped>(&xml)?, value);
    Ok(())
}

#[test]
fn test_base64_data() -> Result<()> {
    let payload = Payload {
        blob: Data(b"Hello, XML!".to_vec()),
    };
    let xml = xml_coding::to_string(&payload, "payload")?;
    assert_eq!(xml, "<payload><blob>SGVsbG8sIFhNTCE=</blob></payload>");
    assert_eq!(xml_coding::from_str::<Payload>(&xml)?, payload);
    Ok(())
}

#[test]
fn test_invalid_base64_is_data_corrupted() {
    let err = xml_coding::from_str::<Payload>("<payload><blob>2o8&amp;@O87n3n98N</blob></payload>").unwrap_err();
    match err {
        XmlCodingError::DataCorrupted { path, description } => {
            assert_eq!(path, vec![PathSegment::key("blob")]);
            assert_eq!(description, "Encountered Data is not valid Base64.");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_deferred_data_is_a_byte_sequence() -> Result<()> {
    let payload = Payload {
        blob: Data(vec![1, 2, 255]),
    };
    let encoder = XmlEncoder::new().data_strategy(DataEncodingStrategy::Deferred);
    let xml = encoder.encode_to_string(&payload, "payload", None)?;
    assert_eq!(
        xml,
        "<payload><blob>1</blob><blob>2</blob><blob>255</blob></payload>"
    );

    let decoder = XmlDecoder::new().data_strategy(DataDecodingStrategy::Deferred);
    assert_eq!(decoder.decode_str::<Payload>(&xml)?, payload);
    Ok(())
}

#[test]
fn test_custom_data_strategies() -> Result<()> {
    let encoder = XmlEncoder::new().data_strategy(DataEncodingStrategy::custom(|bytes, encoder| {
        let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
        encoder.single_value_container().encode(&hex)
    }));
    let payload = Payload {
        blob: Data(vec![0xde, 0xad, 0xbe, 0xef]),
    };
    let xml = encoder.encode_to_string(&payload, "payload", None)?;
    assert_eq!(xml, "<payload><blob>deadbeef</blob></payload>");

    let decoder = XmlDecoder::new().data_strategy(DataDecodingStrategy::custom(|decoder| {
        let text = decoder.single_value_container().decode_string()?;
        (0..text.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&text[i..i + 2], 16)
                    .map_err(|_| XmlCodingError::data_corrupted(decoder.coding_path(), "Bad hex."))
            })
            .collect()
    }));
    assert_eq!(decoder.decode_str::<Payload>(&xml)?, payload);
    Ok(())
}

#[test]
fn test_key_formatted_data() -> Result<()> {
    #[derive(Debug, Deserialize)]
    struct Mixed {
        plain: Data,
        shouted: Data,
    }

    let decoder = XmlDecoder::new().data_strategy(DataDecodingStrategy::key_formatted(|key, text| {
        match key {
            "plain" => Some(text.as_bytes().to_vec()),
            "shouted" => Some(text.to_uppercase().into_bytes()),
            _ => None,
        }
    }));
    let mixed: Mixed = decoder.decode_str("<mixed><plain>abc</plain><shouted>abc</shouted></mixed>")?;
    assert_eq!(mixed.plain.as_bytes(), b"abc");
    assert_eq!(mixed.shouted.as_bytes(), b"ABC");
    Ok(())
}

#[test]
fn test_per_field_base64_coder() -> Result<()> {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Attachment {
        #[serde(with = "data_coders::base64")]
        content: Vec<u8>,
    }

    let value = Attachment {
        content: b"abc".to_vec(),
    };
    let encoder = XmlEncoder::new().data_strategy(DataEncodingStrategy::Deferred);
    let xml = encoder.encode_to_string(&value, "attachment", None)?;
    assert_eq!(xml, "<attachment><content>YWJj</content></attachment>");
    assert_eq!(xml_coding::from_str::<Attachment>(&xml)?, value);
    Ok(())
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Profile {
    #[serde(rename = "@userId")]
    user_id: String,
    #[serde(rename = "displayName")]
    display_name: String,
    #[serde(rename = "homePageURL")]
    home_page_url: String,
}

fn profile() -> Profile {
    Profile {
        user_id: "u1".to_string(),
        display_name: "Ada".to_string(),
        home_page_url: "https://example.com".to_string(),
    }
}

#[test]
fn test_snake_case_keys() -> Result<()> {
    let encoder = XmlEncoder::new().key_strategy(KeyEncodingStrategy::ConvertToSnakeCase);
    let xml = encoder.encode_to_string(&profile(), "profile", None)?;
    assert_eq!(
        xml,
        "<profile user_id=\"u1\"><display_name>Ada</display_name><home_page_url>https://example.com</home_page_url></profile>"
    );

    let decoder = XmlDecoder::new().key_strategy(KeyDecodingStrategy::ConvertFromSnakeCase);
    assert_eq!(decoder.decode_str::<Profile>(&xml)?, profile());
    Ok(())
}

#[test]
fn test_snake_case_missing_key_mentions_both_spellings() {
    let decoder = XmlDecoder::new().key_strategy(KeyDecodingStrategy::ConvertFromSnakeCase);
    let err = decoder
        .decode_str::<Profile>("<profile user_id=\"u1\"><display_name>Ada</display_name></profile>")
        .unwrap_err();
    match err {
        XmlCodingError::KeyNotFound { key, description, .. } => {
            assert_eq!(key, "homePageURL");
            assert_eq!(
                description,
                "No value associated with key \"homePageURL\" (\"home_page_url\")."
            );
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_custom_key_strategies_see_the_path() -> Result<()> {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Outer {
        inner: Inner,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Inner {
        value: u8,
    }

    let encoder = XmlEncoder::new().key_strategy(KeyEncodingStrategy::custom(|path| {
        let depth = path.len();
        match path.last() {
            Some(PathSegment::Key(key)) => format!("{}{depth}", key.to_uppercase()),
            _ => String::new(),
        }
    }));
    let value = Outer {
        inner: Inner { value: 7 },
    };
    let xml = encoder.encode_to_string(&value, "outer", None)?;
    assert_eq!(xml, "<outer><INNER1><VALUE2>7</VALUE2></INNER1></outer>");

    let decoder = XmlDecoder::new().key_strategy(KeyDecodingStrategy::custom(|path| match path.last() {
        Some(PathSegment::Key(key)) => key.trim_end_matches(char::is_numeric).to_lowercase(),
        _ => String::new(),
    }));
    assert_eq!(decoder.decode_str::<Outer>(&xml)?, value);
    Ok(())
}
