use quick_xml::events::Event;
use quick_xml::Reader;

use super::{Document, NodeId, NodeKind, XmlError};

/// Parser behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Keep whitespace-only text between elements. Dropping it lets the
    /// writer re-indent a document from scratch.
    pub keep_blank_text: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            keep_blank_text: true,
        }
    }
}

impl ParseOptions {
    pub fn drop_blank_text() -> Self {
        Self {
            keep_blank_text: false,
        }
    }
}

fn parse_error(position: u64, message: impl Into<String>) -> XmlError {
    XmlError::Parse {
        position,
        message: message.into(),
    }
}

fn utf8(bytes: &[u8], position: u64) -> Result<&str, XmlError> {
    std::str::from_utf8(bytes).map_err(|e| parse_error(position, e.to_string()))
}

fn unescape(raw: &str, position: u64) -> Result<String, XmlError> {
    quick_xml::escape::unescape(raw)
        .map(|text| text.into_owned())
        .map_err(|e| parse_error(position, e.to_string()))
}

impl Document {
    /// Parse with [`ParseOptions::default`].
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        Self::parse_with(xml, ParseOptions::default())
    }

    /// Parse a complete document. Line endings are normalised to `\n`; the
    /// XML declaration and DOCTYPE are not retained.
    pub fn parse_with(xml: &str, options: ParseOptions) -> Result<Self, XmlError> {
        let normalized = xml
            .strip_prefix('\u{feff}')
            .unwrap_or(xml)
            .replace("\r\n", "\n")
            .replace('\r', "\n");

        let mut reader = Reader::from_str(&normalized);
        reader.config_mut().trim_text(false);

        let mut doc = Document::new();
        let mut stack: Vec<NodeId> = vec![doc.document_node()];

        loop {
            let position = reader.buffer_position() as u64;
            let event = reader
                .read_event()
                .map_err(|e| parse_error(position, e.to_string()))?;
            match event {
                Event::Start(start) => {
                    let id = element_from(&mut doc, &start, position)?;
                    attach(&mut doc, &stack, id, position)?;
                    stack.push(id);
                }
                Event::Empty(start) => {
                    let id = element_from(&mut doc, &start, position)?;
                    attach(&mut doc, &stack, id, position)?;
                }
                Event::End(_) => {
                    if stack.len() <= 1 {
                        return Err(parse_error(position, "unexpected end tag"));
                    }
                    let Some(id) = stack.pop() else { break };
                    if !options.keep_blank_text {
                        drop_blank_text(&mut doc, id);
                    }
                }
                Event::Text(text) => {
                    let raw = utf8(&text, position)?;
                    let value = unescape(raw, position)?;
                    push_text(&mut doc, &stack, &value, position)?;
                }
                Event::CData(data) => {
                    let value = utf8(&data.into_inner(), position)?.to_string();
                    push_text(&mut doc, &stack, &value, position)?;
                }
                Event::Comment(comment) => {
                    let value = utf8(&comment, position)?.to_string();
                    let id = doc.create_comment(&value);
                    attach(&mut doc, &stack, id, position)?;
                }
                Event::PI(pi) => {
                    let target = utf8(pi.target(), position)?.to_string();
                    let data = utf8(pi.content(), position)?.trim_start().to_string();
                    let id = doc.create_processing_instruction(&target, &data);
                    attach(&mut doc, &stack, id, position)?;
                }
                Event::Decl(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        let end = reader.buffer_position() as u64;
        if stack.len() > 1 {
            return Err(parse_error(end, "unclosed element at end of input"));
        }
        if doc.root().is_none() {
            return Err(parse_error(end, "document has no root element"));
        }
        Ok(doc)
    }
}

fn element_from(
    doc: &mut Document,
    start: &quick_xml::events::BytesStart<'_>,
    position: u64,
) -> Result<NodeId, XmlError> {
    let name = utf8(start.name().as_ref(), position)?.to_string();
    let id = doc.create_element(&name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| parse_error(position, e.to_string()))?;
        let key = utf8(attr.key.as_ref(), position)?.to_string();
        // attribute value normalisation: literal whitespace becomes a space
        let raw = utf8(&attr.value, position)?.replace(['\t', '\n', '\r'], " ");
        let value = unescape(&raw, position)?;
        doc.set_attribute(id, &key, &value)?;
    }
    Ok(id)
}

fn attach(doc: &mut Document, stack: &[NodeId], id: NodeId, position: u64) -> Result<(), XmlError> {
    let parent = *stack
        .last()
        .ok_or_else(|| parse_error(position, "node outside of document"))?;
    if parent == doc.document_node() && doc.is_element(id) && doc.root().is_some() {
        return Err(parse_error(position, "multiple root elements"));
    }
    doc.append_child(parent, id)
}

fn push_text(doc: &mut Document, stack: &[NodeId], text: &str, position: u64) -> Result<(), XmlError> {
    match stack.last() {
        Some(parent) if *parent != doc.document_node() => doc.append_text(*parent, text),
        _ if text.trim().is_empty() => Ok(()),
        _ => Err(parse_error(position, "text outside of the root element")),
    }
}

fn drop_blank_text(doc: &mut Document, id: NodeId) {
    if doc.element_children(id).next().is_none() {
        return;
    }
    let blanks: Vec<NodeId> = doc
        .children(id)
        .iter()
        .copied()
        .filter(|child| matches!(doc.kind(*child), Some(NodeKind::Text(t)) if t.trim().is_empty()))
        .collect();
    for blank in blanks {
        doc.remove(blank);
    }
}
