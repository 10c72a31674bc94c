//! Scanner Output Parser
//!
//! Decodes the scanner's XML report into an ordered generic mapping.
//!
//! # Mapping
//!
//! - every element becomes a key named after its tag
//! - attributes become `@name` keys holding strings
//! - an element with only text maps to that text; with attributes or
//!   children the text goes under `#text`; with neither it maps to `null`
//! - repeated sibling tags become an array in document order
//!
//! # Hardening
//!
//! The report echoes attacker-influenced target strings, so the parser never
//! processes a DTD, refuses documents that declare entities, and fails on any
//! reference other than the predefined XML entities and character references.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::ScanError;

/// Key prefix for attributes
const ATTR_PREFIX: char = '@';

/// Key for text content of elements that also have attributes or children
const TEXT_KEY: &str = "#text";

/// Maximum element nesting accepted
const MAX_DEPTH: usize = 256;

/// Decoded scanner report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScanResult {
    document: Map<String, Value>,
}

/// Host counters from the report's run statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostsSummary {
    pub up: u64,
    pub down: u64,
    pub total: u64,
}

impl ScanResult {
    /// Parse XML text. See [`parse`].
    pub fn parse(xml: &str) -> Result<Self, ScanError> {
        parse(xml)
    }

    /// Name of the root element (`nmaprun` for nmap)
    pub fn root_name(&self) -> Option<&str> {
        self.document.keys().next().map(String::as_str)
    }

    /// Value of the root element
    pub fn root(&self) -> Option<&Value> {
        self.document.values().next()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.document)
    }

    /// `runstats/hosts` counters, if the report has them
    pub fn hosts_summary(&self) -> Option<HostsSummary> {
        let hosts = self.root()?.get("runstats")?.get("hosts")?;
        let count = |key: &str| -> Option<u64> { hosts.get(key)?.as_str()?.parse().ok() };
        Some(HostsSummary {
            up: count("@up")?,
            down: count("@down")?,
            total: count("@total")?,
        })
    }
}

/// Element under construction
struct Frame {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, ScanError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut children = Map::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| malformed(format!("bad attribute in <{}>: {}", name, e)))?;
            let key = format!(
                "{}{}",
                ATTR_PREFIX,
                String::from_utf8_lossy(attr.key.as_ref())
            );
            let value = attr
                .unescape_value()
                .map_err(|e| malformed(format!("bad attribute value in <{}>: {}", name, e)))?;
            children.insert(key, Value::String(value.into_owned()));
        }

        Ok(Self {
            name,
            children,
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let text = self.text.trim();
        let mut children = self.children;

        let value = if children.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.to_string())
            }
        } else {
            if !text.is_empty() {
                children.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
            }
            Value::Object(children)
        };
        (self.name, value)
    }
}

/// Insert a child, turning repeated names into an ordered array
fn push_child(map: &mut Map<String, Value>, name: String, value: Value) {
    match map.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(name, value);
        }
    }
}

fn malformed(reason: String) -> ScanError {
    ScanError::ParseFailed(reason)
}

/// Decode XML text into a [`ScanResult`].
///
/// # Errors
///
/// [`ScanError::ParseFailed`] for anything other than exactly one
/// well-formed root element: empty input, unclosed or mismatched tags,
/// trailing content, entity declarations or unknown entity references.
pub fn parse(xml: &str) -> Result<ScanResult, ScanError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            malformed(format!(
                "XML error at position {}: {}",
                reader.error_position(),
                e
            ))
        })?;

        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(malformed("content after document element".to_string()));
                }
                if stack.len() >= MAX_DEPTH {
                    return Err(malformed("document nested too deeply".to_string()));
                }
                stack.push(Frame::open(&start)?);
            }
            Event::Empty(start) => {
                if root.is_some() {
                    return Err(malformed("content after document element".to_string()));
                }
                let (name, value) = Frame::open(&start)?.close();
                match stack.last_mut() {
                    Some(parent) => push_child(&mut parent.children, name, value),
                    None => root = Some((name, value)),
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| malformed("unexpected closing tag".to_string()))?;
                let (name, value) = frame.close();
                match stack.last_mut() {
                    Some(parent) => push_child(&mut parent.children, name, value),
                    None => root = Some((name, value)),
                }
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| malformed(format!("bad text content: {}", e)))?;
                match stack.last_mut() {
                    Some(frame) => frame.text.push_str(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(malformed("text outside document element".to_string())),
                }
            }
            Event::CData(data) => match stack.last_mut() {
                Some(frame) => frame.text.push_str(&String::from_utf8_lossy(&data)),
                None => return Err(malformed("CDATA outside document element".to_string())),
            },
            Event::DocType(doctype) => {
                let doctype = String::from_utf8_lossy(&doctype);
                if doctype.contains("<!ENTITY") {
                    return Err(malformed("entity declarations are not allowed".to_string()));
                }
            }
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(malformed("unexpected end of document".to_string()));
    }

    let (name, value) = root.ok_or_else(|| malformed("no root element".to_string()))?;
    let mut document = Map::new();
    document.insert(name, value);
    Ok(ScanResult { document })
}
