//! XML export parser with sanitize-and-retry fallback
//!
//! Exports produced by real installations routinely contain raw control
//! bytes that a strict parser rejects. The parser attempts a strict streaming
//! parse first; on a syntax failure it strips the known set of broken bytes
//! from the raw input and retries once. If the retry also fails, the
//! sanitized bytes are written to `error.xml` so the failure can be inspected
//! after the run.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;

/// File name of the diagnostic artifact written on unrecoverable parse failure
pub const DIAGNOSTIC_ARTIFACT: &str = "error.xml";

/// Control bytes known to appear in corrupted exports. Stripped wholesale
/// during the sanitize-retry pass.
const BROKEN_BYTES: &[u8] = &[
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x08, 0x0B, 0x0C, 0x10, 0x11, 0x13, 0x14, 0x17,
    0x18, 0x19, 0x1C, 0x1D, 0x1E,
];

/// Errors from parsing and validating the source document
#[derive(Debug, Error)]
pub enum ParseError {
    /// Parse failure surviving sanitization; fatal to the run
    #[error("XML syntax error: {0}")]
    Syntax(String),

    /// The document does not declare the expected export dialect
    #[error("content source mismatch: {0}")]
    SourceMismatch(String),

    /// Failure writing the diagnostic artifact
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One element of the parsed tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    /// Qualified tag name, e.g. `wp:post_id`
    pub name: String,
    /// Attributes in document order
    pub attributes: Vec<(String, String)>,
    /// Concatenated text and CDATA content
    pub text: String,
    /// Child elements in document order
    pub children: Vec<Element>,
}

impl Element {
    /// First direct child with the given qualified name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given qualified name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All descendants with the given qualified name, depth first
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            found.extend(child.descendants_named(name));
        }
        found
    }

    /// Attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Element text with surrounding whitespace removed
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// A fully parsed export document
#[derive(Debug, Clone)]
pub struct Document {
    /// Root element of the tree
    pub root: Element,
    /// Namespace declarations on the root element: prefix -> URI
    namespaces: HashMap<String, String>,
}

impl Document {
    /// Namespace URI declared for the given prefix on the root element
    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }
}

/// Streaming XML parser with the sanitize-retry fallback
pub struct XmlParser {
    /// Directory receiving the diagnostic artifact
    diagnostic_dir: PathBuf,
}

impl Default for XmlParser {
    fn default() -> Self {
        Self {
            diagnostic_dir: PathBuf::from("."),
        }
    }
}

impl XmlParser {
    /// Parser writing diagnostics to the current directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser writing diagnostics into the given directory
    pub fn with_diagnostic_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            diagnostic_dir: dir.into(),
        }
    }

    /// Parse raw export bytes into a document tree.
    ///
    /// Strict parse first; on a syntax failure, strip the broken control
    /// bytes and retry once. A retry failure persists the sanitized bytes
    /// to [`DIAGNOSTIC_ARTIFACT`] before propagating.
    pub fn parse(&self, content: &[u8]) -> Result<Document, ParseError> {
        match parse_strict(content) {
            Ok(document) => Ok(document),
            Err(ParseError::Syntax(first_error)) => {
                warn!(error = %first_error, "strict parse failed, retrying with sanitized input");
                let sanitized = sanitize(content);
                match parse_strict(&sanitized) {
                    Ok(document) => Ok(document),
                    Err(retry_error) => {
                        let artifact = self.diagnostic_dir.join(DIAGNOSTIC_ARTIFACT);
                        std::fs::write(&artifact, &sanitized)?;
                        warn!(
                            artifact = %artifact.display(),
                            "sanitized input still fails to parse, wrote diagnostic artifact"
                        );
                        Err(retry_error)
                    }
                }
            }
            Err(other) => Err(other),
        }
    }
}

/// Remove every occurrence of the known broken control bytes
fn sanitize(content: &[u8]) -> Vec<u8> {
    content
        .iter()
        .copied()
        .filter(|b| !BROKEN_BYTES.contains(b))
        .collect()
}

fn syntax(message: impl ToString) -> ParseError {
    ParseError::Syntax(message.to_string())
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, ParseError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(syntax)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().map_err(syntax)?.to_string();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        ..Element::default()
    })
}

fn reject_broken_bytes(text: &[u8]) -> Result<(), ParseError> {
    if let Some(byte) = text.iter().find(|b| BROKEN_BYTES.contains(b)) {
        return Err(syntax(format!(
            "invalid control character 0x{byte:02X} in character data"
        )));
    }
    Ok(())
}

/// Close the innermost open element, attaching it to its parent or making it
/// the document root.
fn attach(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(syntax("multiple root elements"));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

/// One-shot strict parse of the whole input into an owned element tree
fn parse_strict(content: &[u8]) -> Result<Document, ParseError> {
    let mut reader = Reader::from_reader(content);
    let mut buf = Vec::with_capacity(8192);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(syntax(e)),
            Ok(Event::Start(ref e)) => {
                stack.push(element_from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let element = element_from_start(e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(ref e)) => {
                reject_broken_bytes(e)?;
                if let Some(open) = stack.last_mut() {
                    let text = e.unescape().map_err(syntax)?;
                    open.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                reject_broken_bytes(e)?;
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| syntax("unexpected closing tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(syntax(format!(
            "unclosed element '{}' at end of input",
            stack[stack.len() - 1].name
        )));
    }

    let root = root.ok_or_else(|| syntax("document has no root element"))?;
    let namespaces = root
        .attributes
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix("xmlns:")
                .map(|prefix| (prefix.to_string(), value.clone()))
        })
        .collect();

    Ok(Document { root, namespaces })
}
