//! Conversion between XML text and the [`Value`] tree.
//!
//! Parsing keeps every leaf as text. Rendering writes the tree back with the
//! `quick_xml` writer, optionally indented and with keys in sorted order.

use std::fmt::{Display, Write as _};

use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Result, XmlCodingError};
use crate::strategy::OutputFormatting;
use crate::value::{Keyed, TEXT_KEY, Value};
use crate::xml::utils::split_cdata;

/// Contents of the `<?xml ...?>` declaration written before the root element.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlHeader {
    /// Rendered with one decimal at least, so `1.0` stays `1.0`.
    pub version: Option<f64>,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

impl XmlHeader {
    pub fn new(version: Option<f64>, encoding: Option<&str>, standalone: Option<&str>) -> Self {
        XmlHeader {
            version,
            encoding: encoding.map(str::to_string),
            standalone: standalone.map(str::to_string),
        }
    }

    /// The declaration body without the `<?` and `?>` delimiters, or `None`
    /// when no pseudo-attribute is set.
    fn declaration(&self) -> Option<String> {
        if self.version.is_none() && self.encoding.is_none() && self.standalone.is_none() {
            return None;
        }
        let mut content = String::from("xml");
        if let Some(version) = self.version {
            let _ = write!(content, " version=\"{version:?}\"");
        }
        if let Some(encoding) = &self.encoding {
            let _ = write!(content, " encoding=\"{encoding}\"");
        }
        if let Some(standalone) = &self.standalone {
            let _ = write!(content, " standalone=\"{standalone}\"");
        }
        Some(content)
    }
}

fn not_valid_xml(err: impl Display) -> XmlCodingError {
    XmlCodingError::data_corrupted(&[], format!("The given data was not valid XML. {err}"))
}

/// Character data collected inside an element, in document order.
enum Piece {
    Text(String),
    CData(String),
}

/// An element whose closing tag has not been read yet.
struct Frame {
    name: String,
    keyed: Keyed,
    pieces: Vec<Piece>,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut keyed = Keyed::new();
        for attr in start.attributes() {
            let attr = attr.map_err(not_valid_xml)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let raw = String::from_utf8_lossy(&attr.value);
            let value = unescape(&raw).map_err(not_valid_xml)?;
            keyed.insert_attribute(key, Value::Scalar(value.into_owned()));
        }
        Ok(Frame {
            name,
            keyed,
            pieces: Vec::new(),
        })
    }

    /// Text arrives split around entity references; adjacent runs are joined.
    fn push_text(&mut self, text: &str) {
        match self.pieces.last_mut() {
            Some(Piece::Text(last)) => last.push_str(text),
            _ => self.pieces.push(Piece::Text(text.to_string())),
        }
    }

    fn push_cdata(&mut self, text: &str) {
        self.pieces.push(Piece::CData(text.to_string()));
    }

    fn close(self) -> (String, Value) {
        let Frame {
            name,
            mut keyed,
            pieces,
        } = self;

        let has_cdata = pieces.iter().any(|piece| matches!(piece, Piece::CData(_)));
        let text = if has_cdata {
            pieces
                .into_iter()
                .filter_map(|piece| match piece {
                    Piece::CData(text) => Some(text),
                    Piece::Text(text) if !text.trim().is_empty() => Some(text),
                    Piece::Text(_) => None,
                })
                .collect::<String>()
        } else {
            pieces
                .into_iter()
                .map(|piece| match piece {
                    Piece::Text(text) | Piece::CData(text) => text,
                })
                .collect::<String>()
                .trim()
                .to_string()
        };
        let leaf = |text: String| {
            if has_cdata {
                Value::CData(text)
            } else {
                Value::Scalar(text)
            }
        };

        if keyed.is_empty() {
            return (name, leaf(text));
        }
        if !text.is_empty() {
            keyed.insert(TEXT_KEY, leaf(text));
        }
        (name, Value::Keyed(keyed))
    }
}

/// Places a finished element in its parent, or makes it the document root.
fn attach(stack: &mut [Frame], root: &mut Option<Value>, name: String, value: Value) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.keyed.append(name, value);
        return Ok(());
    }
    if root.is_some() {
        return Err(not_valid_xml(format!(
            "Found a second root element <{name}>."
        )));
    }
    *root = Some(value);
    Ok(())
}

/// Parses an XML document into a value tree rooted at the document element.
///
/// The root element's own name is not part of the result. A self-closing
/// element without attributes is `Null`; `<a></a>` is an empty scalar.
pub fn parse(bytes: &[u8]) -> Result<Value> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Value> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(not_valid_xml)? {
            Event::Start(start) => {
                let frame = Frame::open(&start)?;
                if stack.is_empty() && root.is_some() {
                    return Err(not_valid_xml(format!(
                        "Found a second root element <{}>.",
                        frame.name
                    )));
                }
                stack.push(frame);
            }
            Event::Empty(start) => {
                let frame = Frame::open(&start)?;
                let value = if frame.keyed.has_attributes() {
                    Value::Keyed(frame.keyed)
                } else {
                    Value::Null
                };
                attach(&mut stack, &mut root, frame.name, value)?;
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| not_valid_xml("Found a closing tag without an opening tag."))?;
                let (name, value) = frame.close();
                attach(&mut stack, &mut root, name, value)?;
            }
            Event::Text(text) => {
                let text = text.decode().map_err(not_valid_xml)?;
                match stack.last_mut() {
                    Some(frame) => frame.push_text(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(not_valid_xml("Found text outside the root element.")),
                }
            }
            Event::CData(cdata) => {
                let text = cdata.decode().map_err(not_valid_xml)?;
                match stack.last_mut() {
                    Some(frame) => frame.push_cdata(&text),
                    None => return Err(not_valid_xml("Found CDATA outside the root element.")),
                }
            }
            Event::GeneralRef(reference) => {
                let resolved = if reference.is_char_ref() {
                    reference
                        .resolve_char_ref()
                        .map_err(not_valid_xml)?
                        .map(String::from)
                } else {
                    let entity = reference.decode().map_err(not_valid_xml)?;
                    resolve_predefined_entity(&entity).map(str::to_string)
                };
                let resolved = resolved.ok_or_else(|| {
                    not_valid_xml(format!(
                        "Unknown entity reference &{};.",
                        String::from_utf8_lossy(reference.as_ref())
                    ))
                })?;
                if let Some(frame) = stack.last_mut() {
                    frame.push_text(&resolved);
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and DOCTYPE carry no data.
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(not_valid_xml(format!("Element <{}> is not closed.", open.name)));
    }
    root.ok_or_else(|| not_valid_xml("The document has no root element."))
}

/// Renders `value` as a document whose root element is named `root_key`.
///
/// The root must be keyed: a bare scalar or null cannot form a document.
pub fn render(
    value: &Value,
    root_key: &str,
    header: Option<&XmlHeader>,
    formatting: OutputFormatting,
) -> Result<Vec<u8>> {
    if !matches!(value, Value::Keyed(_)) {
        return Err(XmlCodingError::invalid_value(
            &[],
            format!("Cannot render {} as the root element <{root_key}>.", value.kind()),
        ));
    }

    let mut writer = if formatting.pretty_printed {
        Writer::new_with_indent(Vec::new(), b' ', 4)
    } else {
        Writer::new(Vec::new())
    };

    if let Some(content) = header.and_then(XmlHeader::declaration) {
        let decl = BytesDecl::from_start(BytesStart::from_content(content, 3));
        writer.write_event(Event::Decl(decl))?;
    }
    write_element(&mut writer, root_key, value, formatting.sorted_keys)?;
    Ok(writer.into_inner())
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value, sorted: bool) -> Result<()> {
    match value {
        Value::Null => {
            writer.write_event(Event::Empty(BytesStart::new(name)))?;
        }
        Value::Scalar(text) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        Value::CData(text) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            write_cdata(writer, text)?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        // A nested sequence has no element of its own and flattens into its parent.
        Value::Sequence(items) => {
            for item in items {
                write_element(writer, name, item, sorted)?;
            }
        }
        Value::Keyed(keyed) => write_keyed(writer, name, keyed, sorted)?,
    }
    Ok(())
}

fn write_cdata(writer: &mut Writer<Vec<u8>>, text: &str) -> Result<()> {
    for part in split_cdata(text) {
        writer.write_event(Event::CData(BytesCData::new(part)))?;
    }
    Ok(())
}

fn write_keyed(writer: &mut Writer<Vec<u8>>, name: &str, keyed: &Keyed, sorted: bool) -> Result<()> {
    let mut start = BytesStart::new(name);
    let mut attributes: Vec<(&String, &Value)> = keyed.attributes().collect();
    if sorted {
        attributes.sort_by(|a, b| a.0.cmp(b.0));
    }
    for (key, value) in attributes {
        if let Some(text) = value.as_str() {
            start.push_attribute((key.as_str(), text));
        }
    }

    if keyed.len() == 0 {
        if keyed.has_attributes() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new("")))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    let mut children: Vec<(&String, &Value)> = keyed.children().collect();
    if sorted {
        children.sort_by(|a, b| a.0.cmp(b.0));
    }
    for (key, value) in children {
        match value {
            Value::Scalar(text) if key == TEXT_KEY => {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            Value::CData(text) if key == TEXT_KEY => write_cdata(writer, text)?,
            _ => write_element(writer, key, value, sorted)?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
