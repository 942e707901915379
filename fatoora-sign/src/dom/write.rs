use quick_xml::escape::partial_escape;

use super::c14n::Scope;
use super::{escape_attribute, Document, NodeId, NodeKind};

/// Indentation unit for pretty output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indent {
    pub ch: char,
    pub size: usize,
}

impl Indent {
    pub fn spaces(size: usize) -> Self {
        Self { ch: ' ', size }
    }

    fn push(&self, depth: usize, out: &mut String) {
        out.extend(std::iter::repeat(self.ch).take(self.size * depth));
    }
}

/// Serializer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub declaration: bool,
    pub encoding: String,
    /// `None` writes everything on one line.
    pub indent: Option<Indent>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self::compact()
    }
}

impl WriteOptions {
    pub fn compact() -> Self {
        Self {
            declaration: true,
            encoding: "UTF-8".to_string(),
            indent: None,
        }
    }

    pub fn pretty(size: usize) -> Self {
        Self {
            indent: Some(Indent::spaces(size)),
            ..Self::compact()
        }
    }

    pub fn without_declaration(mut self) -> Self {
        self.declaration = false;
        self
    }
}

impl Document {
    /// Serialize the document. Pretty output only re-indents element-only
    /// content; anything holding text is written inline.
    pub fn to_xml_string(&self, options: &WriteOptions) -> String {
        let mut out = String::new();
        if options.declaration {
            out.push_str("<?xml version=\"1.0\" encoding=\"");
            out.push_str(&options.encoding);
            out.push_str("\"?>\n");
        }
        let mut first = true;
        for child in self.children(self.document_node()) {
            if matches!(self.kind(*child), Some(NodeKind::Text(_))) {
                continue;
            }
            if !first {
                out.push('\n');
            }
            first = false;
            self.write_node(*child, 0, &Scope::new(), options.indent, &mut out);
        }
        if options.indent.is_some() {
            out.push('\n');
        }
        out
    }

    /// Serialize one subtree without a declaration. Namespaces bound above
    /// `id` are declared on it so the fragment stands alone.
    pub fn node_to_xml_string(&self, id: NodeId, options: &WriteOptions) -> String {
        let mut out = String::new();
        if self.is_element(id) {
            let inherited = self.inherited_scope(id);
            self.write_element(id, 0, &Scope::new(), Some(&inherited), options.indent, &mut out);
        } else {
            self.write_node(id, 0, &Scope::new(), options.indent, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, depth: usize, scope: &Scope, indent: Option<Indent>, out: &mut String) {
        match self.kind(id) {
            Some(NodeKind::Element(_)) => self.write_element(id, depth, scope, None, indent, out),
            Some(NodeKind::Text(text)) => {
                out.push_str(&partial_escape(text.as_str()).replace('\r', "&#13;"))
            }
            Some(NodeKind::Comment(text)) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            Some(NodeKind::ProcessingInstruction { target, data }) => {
                out.push_str("<?");
                out.push_str(target);
                if !data.is_empty() {
                    out.push(' ');
                    out.push_str(data);
                }
                out.push_str("?>");
            }
            Some(NodeKind::Document) | None => {}
        }
    }

    fn write_element(
        &self,
        id: NodeId,
        depth: usize,
        inherited: &Scope,
        carried: Option<&Scope>,
        indent: Option<Indent>,
        out: &mut String,
    ) {
        let Some(element) = self.element(id) else {
            return;
        };
        let declarations = self.effective_declarations(id, inherited);
        let mut scope = inherited.clone();
        for (prefix, uri) in &declarations {
            scope.insert(prefix.clone(), uri.clone());
        }

        let name = element.name.to_string();
        out.push('<');
        out.push_str(&name);
        let write_ns = |prefix: &str, uri: &str, out: &mut String| {
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            escape_attribute(uri, out);
            out.push('"');
        };
        for (prefix, uri) in &declarations {
            write_ns(prefix, uri, out);
        }
        if let Some(carried) = carried {
            for (prefix, uri) in carried {
                if !scope.contains_key(prefix) && !uri.is_empty() {
                    write_ns(prefix, uri, out);
                    scope.insert(prefix.clone(), uri.clone());
                }
            }
        }
        for attr in &element.attributes {
            out.push(' ');
            out.push_str(&attr.name.to_string());
            out.push_str("=\"");
            escape_attribute(&attr.value, out);
            out.push('"');
        }

        let children = self.children(id);
        if children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');

        let has_text = children
            .iter()
            .any(|child| matches!(self.kind(*child), Some(NodeKind::Text(_))));
        match indent.filter(|_| !has_text) {
            Some(unit) => {
                for child in children {
                    out.push('\n');
                    unit.push(depth + 1, out);
                    self.write_child(*child, depth + 1, &scope, Some(unit), out);
                }
                out.push('\n');
                unit.push(depth, out);
            }
            None => {
                for child in children {
                    self.write_child(*child, depth + 1, &scope, None, out);
                }
            }
        }

        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }

    fn write_child(&self, id: NodeId, depth: usize, scope: &Scope, indent: Option<Indent>, out: &mut String) {
        match self.kind(id) {
            Some(NodeKind::Element(_)) => self.write_element(id, depth, scope, None, indent, out),
            _ => self.write_node(id, depth, scope, indent, out),
        }
    }
}
