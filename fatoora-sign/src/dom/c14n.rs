//! Canonical XML serialisation (inclusive and exclusive, without comments
//! by default).
use std::collections::{BTreeMap, BTreeSet};

use super::{escape_attribute, Document, NodeId, NodeKind, XML_NS};

/// Prefix to URI bindings; the default namespace is keyed by `""`.
pub(super) type Scope = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct C14nOptions {
    pub exclusive: bool,
    pub with_comments: bool,
    /// Exclusive mode only: prefixes rendered wherever they are in scope.
    /// `#default` names the default namespace.
    pub inclusive_prefixes: Vec<String>,
}

impl C14nOptions {
    pub fn inclusive() -> Self {
        Self::default()
    }

    pub fn exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::default()
        }
    }

    pub fn with_comments(mut self, with_comments: bool) -> Self {
        self.with_comments = with_comments;
        self
    }

    pub fn with_inclusive_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inclusive_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }
}

impl Document {
    /// Canonical form of the whole document.
    pub fn canonicalize(&self, options: &C14nOptions) -> String {
        self.canonicalize_node(self.document_node(), options)
    }

    /// Canonical form of the subtree at `id`. Namespaces in scope at `id`
    /// are rendered on it as needed.
    pub fn canonicalize_node(&self, id: NodeId, options: &C14nOptions) -> String {
        let mut out = String::new();
        match self.kind(id) {
            Some(NodeKind::Document) => {
                let mut after_root = false;
                for child in self.children(id) {
                    match self.kind(*child) {
                        Some(NodeKind::Element(_)) => {
                            self.c14n_element(*child, &Scope::new(), &Scope::new(), options, &mut out);
                            after_root = true;
                        }
                        Some(NodeKind::Comment(_)) if !options.with_comments => {}
                        Some(NodeKind::Comment(_) | NodeKind::ProcessingInstruction { .. }) => {
                            if after_root {
                                out.push('\n');
                            }
                            self.c14n_leaf(*child, options, &mut out);
                            if !after_root {
                                out.push('\n');
                            }
                        }
                        _ => {}
                    }
                }
            }
            Some(NodeKind::Element(_)) => {
                let scope = self.inherited_scope(id);
                self.c14n_element(id, &scope, &Scope::new(), options, &mut out);
            }
            Some(_) => self.c14n_leaf(id, options, &mut out),
            None => {}
        }
        out
    }

    /// Declarations that take effect on `id`: the explicit ones, plus the
    /// element's own namespace binding when it is not already in scope.
    pub(super) fn effective_declarations(&self, id: NodeId, inherited: &Scope) -> Vec<(String, String)> {
        let Some(element) = self.element(id) else {
            return Vec::new();
        };
        let mut declarations: Vec<(String, String)> = element
            .namespaces
            .iter()
            .map(|decl| (decl.prefix.clone().unwrap_or_default(), decl.uri.clone()))
            .collect();
        if let Some(uri) = &element.namespace_override {
            let prefix = element.name.prefix().unwrap_or_default().to_string();
            let declared_here = declarations.iter().any(|(p, _)| *p == prefix);
            if !declared_here && inherited.get(&prefix) != Some(uri) {
                declarations.push((prefix, uri.clone()));
            }
        }
        declarations
    }

    pub(super) fn inherited_scope(&self, id: NodeId) -> Scope {
        let mut chain: Vec<NodeId> = self.ancestors(id).filter(|a| self.is_element(*a)).collect();
        chain.reverse();
        let mut scope = Scope::new();
        for ancestor in chain {
            for (prefix, uri) in self.effective_declarations(ancestor, &scope) {
                scope.insert(prefix, uri);
            }
        }
        scope
    }

    fn c14n_element(
        &self,
        id: NodeId,
        inherited: &Scope,
        rendered: &Scope,
        options: &C14nOptions,
        out: &mut String,
    ) {
        let Some(element) = self.element(id) else {
            return;
        };
        let mut scope = inherited.clone();
        for (prefix, uri) in self.effective_declarations(id, inherited) {
            scope.insert(prefix, uri);
        }

        let candidates: BTreeSet<String> = if options.exclusive {
            let mut used = BTreeSet::new();
            used.insert(element.name.prefix().unwrap_or_default().to_string());
            for attr in &element.attributes {
                if let Some(prefix) = attr.name.prefix() {
                    used.insert(prefix.to_string());
                }
            }
            for prefix in &options.inclusive_prefixes {
                let prefix = if prefix == "#default" { "" } else { prefix.as_str() };
                if scope.contains_key(prefix) {
                    used.insert(prefix.to_string());
                }
            }
            used
        } else {
            scope.keys().cloned().collect()
        };

        let mut child_rendered = rendered.clone();
        let mut namespaces = Vec::new();
        for prefix in candidates {
            if prefix == "xml" {
                continue;
            }
            let uri = scope.get(&prefix).map(String::as_str).unwrap_or("");
            let current = rendered.get(&prefix).map(String::as_str).unwrap_or("");
            if uri == current || (uri.is_empty() && !prefix.is_empty()) {
                continue;
            }
            child_rendered.insert(prefix.clone(), uri.to_string());
            namespaces.push((prefix, uri.to_string()));
        }

        let mut attributes: Vec<(&str, &str, String, &str)> = element
            .attributes
            .iter()
            .map(|attr| {
                let uri = match attr.name.prefix() {
                    Some("xml") => XML_NS,
                    Some(prefix) => scope.get(prefix).map(String::as_str).unwrap_or(""),
                    None => "",
                };
                (uri, attr.name.local(), attr.name.to_string(), attr.value.as_str())
            })
            .collect();
        attributes.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let name = element.name.to_string();
        out.push('<');
        out.push_str(&name);
        for (prefix, uri) in &namespaces {
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            escape_attribute(uri, out);
            out.push('"');
        }
        for (_, _, qname, value) in &attributes {
            out.push(' ');
            out.push_str(qname);
            out.push_str("=\"");
            escape_attribute(value, out);
            out.push('"');
        }
        out.push('>');

        for child in self.children(id) {
            match self.kind(*child) {
                Some(NodeKind::Element(_)) => {
                    self.c14n_element(*child, &scope, &child_rendered, options, out)
                }
                Some(_) => self.c14n_leaf(*child, options, out),
                None => {}
            }
        }

        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }

    fn c14n_leaf(&self, id: NodeId, options: &C14nOptions, out: &mut String) {
        match self.kind(id) {
            Some(NodeKind::Text(text)) => escape_text(text, out),
            Some(NodeKind::Comment(text)) if options.with_comments => {
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
            _ => {}
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}
