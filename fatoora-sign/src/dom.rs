//! Owned XML document model.
//!
//! Nodes live in an arena owned by [`Document`] and are addressed by
//! [`NodeId`]. A node has at most one parent; detaching a node leaves its
//! subtree in the arena but unreachable from the root.
mod c14n;
mod parse;
mod path;
mod write;

pub use c14n::C14nOptions;
pub use parse::ParseOptions;
pub use write::{Indent, WriteOptions};

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub(crate) const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Errors raised while parsing or editing a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    #[error("malformed XML at byte {position}: {message}")]
    Parse { position: u64, message: String },
    #[error("invalid tree operation: {0}")]
    InvalidOperation(String),
}

/// Index of a node inside its [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Qualified element or attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    prefix: Option<String>,
    local: String,
}

impl QName {
    pub fn parse(name: &str) -> Self {
        match name.split_once(':') {
            Some((prefix, local)) => Self {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => Self {
                prefix: None,
                local: name.to_string(),
            },
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local(&self) -> &str {
        &self.local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{prefix}:{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: QName,
    value: String,
}

impl Attribute {
    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// `xmlns` (prefix `None`) or `xmlns:prefix` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NamespaceDecl {
    prefix: Option<String>,
    uri: String,
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    name: QName,
    namespaces: Vec<NamespaceDecl>,
    attributes: Vec<Attribute>,
    namespace_override: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed XML tree.
///
/// # Examples
/// ```rust
/// use fatoora_sign::dom::{C14nOptions, Document};
///
/// let mut doc = Document::new();
/// let root = doc.create_element("Invoice");
/// doc.set_attribute(root, "xmlns", "urn:example")?;
/// doc.append_child(doc.document_node(), root)?;
/// doc.append_text_element(root, "ID", "INV-1")?;
///
/// assert_eq!(
///     doc.canonicalize(&C14nOptions::default()),
///     r#"<Invoice xmlns="urn:example"><ID>INV-1</ID></Invoice>"#
/// );
/// # Ok::<(), fatoora_sign::dom::XmlError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    registered: BTreeMap<String, String>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    const DOCUMENT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            registered: BTreeMap::new(),
        }
    }

    /// Bind `prefix` for path queries on this document. In-scope
    /// declarations take precedence.
    pub fn register_namespace(&mut self, prefix: &str, uri: &str) {
        self.registered.insert(prefix.to_string(), uri.to_string());
    }

    pub(crate) fn registered_namespace(&self, prefix: &str) -> Option<&str> {
        self.registered.get(prefix).map(String::as_str)
    }

    /// The synthetic node holding the root element and top-level
    /// comments or processing instructions.
    pub fn document_node(&self) -> NodeId {
        Self::DOCUMENT
    }

    /// The document element, if one is attached.
    pub fn root(&self) -> Option<NodeId> {
        self.element_children(Self::DOCUMENT).next()
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Create a detached element. A prefixed name resolves its namespace
    /// from the ancestors it is later attached under.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Element(Element {
            name: QName::parse(name),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            namespace_override: None,
        }))
    }

    /// Create a detached element bound to `uri` without declaring it.
    pub fn create_element_ns(&mut self, name: &str, uri: &str) -> NodeId {
        let id = self.create_element(name);
        if let Some(element) = self.element_mut(id) {
            element.namespace_override = Some(uri.to_string());
        }
        id
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Comment(text.to_string()))
    }

    pub fn create_processing_instruction(&mut self, target: &str, data: &str) -> NodeId {
        self.push(NodeKind::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    /// Create an element and append it to `parent`.
    pub fn append_element(&mut self, parent: NodeId, name: &str) -> Result<NodeId, XmlError> {
        let id = self.create_element(name);
        self.append_child(parent, id)?;
        Ok(id)
    }

    /// Create an element holding `text` and append it to `parent`.
    pub fn append_text_element(
        &mut self,
        parent: NodeId,
        name: &str,
        text: &str,
    ) -> Result<NodeId, XmlError> {
        let id = self.append_element(parent, name)?;
        self.append_text(id, text)?;
        Ok(id)
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> Result<(), XmlError> {
        if !self.contains(parent) || !self.contains(child) {
            return Err(XmlError::InvalidOperation("unknown node id".into()));
        }
        if child == Self::DOCUMENT {
            return Err(XmlError::InvalidOperation(
                "the document node cannot be a child".into(),
            ));
        }
        if self.nodes[child.0].parent.is_some() {
            return Err(XmlError::InvalidOperation(
                "node is already attached; remove it first".into(),
            ));
        }
        if self.ancestors(parent).any(|ancestor| ancestor == child) {
            return Err(XmlError::InvalidOperation(
                "insertion would create a cycle".into(),
            ));
        }
        match &self.nodes[parent.0].kind {
            NodeKind::Element(_) => Ok(()),
            NodeKind::Document => match &self.nodes[child.0].kind {
                NodeKind::Element(_) if self.root().is_some() => Err(
                    XmlError::InvalidOperation("document already has a root element".into()),
                ),
                NodeKind::Text(_) => Err(XmlError::InvalidOperation(
                    "text cannot be a child of the document node".into(),
                )),
                _ => Ok(()),
            },
            _ => Err(XmlError::InvalidOperation(
                "only elements and the document node can have children".into(),
            )),
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), XmlError> {
        self.check_attachable(parent, child)?;
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Insert `child` as the previous sibling of `reference`.
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) -> Result<(), XmlError> {
        let parent = self
            .parent(reference)
            .ok_or_else(|| XmlError::InvalidOperation("reference node is detached".into()))?;
        self.check_attachable(parent, child)?;
        let siblings = &mut self.nodes[parent.0].children;
        let index = siblings
            .iter()
            .position(|id| *id == reference)
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Detach `id` from its parent. Returns `false` if it was not attached.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        self.nodes[parent.0].children.retain(|child| *child != id);
        self.nodes[id.0].parent = None;
        true
    }

    /// Set an attribute. `xmlns` and `xmlns:prefix` become namespace
    /// declarations.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), XmlError> {
        let element = self
            .element_mut(id)
            .ok_or_else(|| XmlError::InvalidOperation("attributes require an element".into()))?;
        let declared = match name.split_once(':') {
            None if name == "xmlns" => Some(None),
            Some(("xmlns", prefix)) => Some(Some(prefix.to_string())),
            _ => None,
        };
        match declared {
            Some(prefix) => {
                match element.namespaces.iter_mut().find(|d| d.prefix == prefix) {
                    Some(decl) => decl.uri = value.to_string(),
                    None => element.namespaces.push(NamespaceDecl {
                        prefix,
                        uri: value.to_string(),
                    }),
                }
            }
            None => {
                let qname = QName::parse(name);
                match element.attributes.iter_mut().find(|a| a.name == qname) {
                    Some(attr) => attr.value = value.to_string(),
                    None => element.attributes.push(Attribute {
                        name: qname,
                        value: value.to_string(),
                    }),
                }
            }
        }
        Ok(())
    }

    /// Attribute lookup by qualified name as written (`Id`, `xml:lang`).
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|attr| attr.name.to_string() == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        self.element(id)
            .map(|element| element.attributes.as_slice())
            .unwrap_or_default()
    }

    pub fn name(&self, id: NodeId) -> Option<&QName> {
        self.element(id).map(|element| &element.name)
    }

    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.name(id).map(QName::local)
    }

    /// Namespace URI the element's name resolves to.
    pub fn namespace_uri(&self, id: NodeId) -> Option<&str> {
        let element = self.element(id)?;
        element
            .namespace_override
            .as_deref()
            .or_else(|| self.lookup_namespace(id, element.name.prefix()))
    }

    /// Resolve `prefix` (`None` for the default namespace) from `id` and its
    /// ancestors. Explicit overrides on ancestors with the same prefix count.
    pub fn lookup_namespace(&self, id: NodeId, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NS);
        }
        for node in std::iter::once(id).chain(self.ancestors(id)) {
            let Some(element) = self.element(node) else {
                continue;
            };
            if let Some(decl) = element
                .namespaces
                .iter()
                .find(|decl| decl.prefix.as_deref() == prefix)
            {
                return (!decl.uri.is_empty()).then_some(decl.uri.as_str());
            }
            if element.name.prefix() == prefix {
                if let Some(uri) = element.namespace_override.as_deref() {
                    return Some(uri);
                }
            }
        }
        None
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    /// Text of a text node, or `None` for any other kind.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Concatenated descendant text.
    pub fn text_content(&self, id: NodeId) -> String {
        self.descendants(id)
            .filter_map(|node| self.text(node))
            .collect()
    }

    /// Replace all children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), XmlError> {
        if !self.is_element(id) {
            return Err(XmlError::InvalidOperation("text requires an element".into()));
        }
        for child in std::mem::take(&mut self.nodes[id.0].children) {
            self.nodes[child.0].parent = None;
        }
        self.append_text(id, text)
    }

    /// Append text to `id`, merging with a trailing text node.
    pub fn append_text(&mut self, id: NodeId, text: &str) -> Result<(), XmlError> {
        if let Some(last) = self.children(id).last().copied() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return Ok(());
            }
        }
        let node = self.create_text(text);
        self.append_child(id, node)
    }

    /// `id` followed by every node below it, in document order.
    pub fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![id];
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(self.children(next).iter().rev().copied());
            Some(next)
        })
    }

    fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |node| self.parent(*node))
    }

    fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    pub(crate) fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id.0).map(|node| &node.kind)
    }

    pub(crate) fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id)? {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }
}

/// Escape an attribute value the way canonical XML does.
pub(crate) fn escape_attribute(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}
