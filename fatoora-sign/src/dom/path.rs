//! A small XPath subset for locating and pruning elements.
//!
//! Supported: absolute and relative location paths with `/` and `//`,
//! `.` and `..`, name tests `*`, `prefix:local`, `prefix:*`, `{uri}local`
//! and bare `local` (matches any namespace). Predicates: `[n]`,
//! `[@attr='v']`, `[child='v']`, `[.='v']` and `[child]`. Text comparisons
//! trim surrounding whitespace. Prefixes resolve against the context
//! element's in-scope declarations.
use std::collections::HashMap;

use tracing::debug;

use super::{Document, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    SelfNode,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Local(String),
    Namespaced { uri: String, local: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    Attribute { name: String, value: Option<String> },
    SelfText(String),
    ChildText { test: NameTest, value: String },
    HasChild(NameTest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LocationPath {
    absolute: bool,
    steps: Vec<Step>,
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected '{token}' at offset {}", self.pos))
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    fn ncname(&mut self) -> Result<&'a str, String> {
        let name = self.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if name.is_empty() {
            Err(format!("expected a name at offset {}", self.pos))
        } else {
            Ok(name)
        }
    }

    fn literal(&mut self) -> Result<&'a str, String> {
        let quote = if self.eat("'") {
            '\''
        } else if self.eat("\"") {
            '"'
        } else {
            return Err(format!("expected a string literal at offset {}", self.pos));
        };
        let value = self.take_while(|c| c != quote);
        self.expect(&quote.to_string())?;
        Ok(value)
    }
}

struct PathParser<'a, 'r> {
    cursor: Cursor<'a>,
    resolve: &'r dyn Fn(&str) -> Option<String>,
}

impl PathParser<'_, '_> {
    fn parse(mut self) -> Result<LocationPath, String> {
        let mut absolute = false;
        let mut axis = Axis::Child;
        if self.cursor.eat("//") {
            absolute = true;
            axis = Axis::Descendant;
        } else if self.cursor.eat("/") {
            absolute = true;
        }
        let mut steps = Vec::new();
        loop {
            steps.push(self.step(axis)?);
            if self.cursor.at_end() {
                break;
            }
            axis = if self.cursor.eat("//") {
                Axis::Descendant
            } else if self.cursor.eat("/") {
                Axis::Child
            } else {
                return Err(format!("unexpected input at offset {}", self.cursor.pos));
            };
        }
        Ok(LocationPath { absolute, steps })
    }

    fn step(&mut self, axis: Axis) -> Result<Step, String> {
        if self.cursor.eat("..") {
            return Ok(Step {
                axis: Axis::Parent,
                test: NameTest::Any,
                predicates: Vec::new(),
            });
        }
        if self.cursor.eat(".") {
            return Ok(Step {
                axis: Axis::SelfNode,
                test: NameTest::Any,
                predicates: self.predicates()?,
            });
        }
        let test = self.name_test()?;
        let predicates = self.predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn name_test(&mut self) -> Result<NameTest, String> {
        if self.cursor.eat("*") {
            return Ok(NameTest::Any);
        }
        if self.cursor.eat("{") {
            let uri = self.cursor.take_while(|c| c != '}').to_string();
            self.cursor.expect("}")?;
            let local = if self.cursor.eat("*") {
                None
            } else {
                Some(self.cursor.ncname()?.to_string())
            };
            return Ok(NameTest::Namespaced { uri, local });
        }
        let first = self.cursor.ncname()?;
        if !self.cursor.eat(":") {
            return Ok(NameTest::Local(first.to_string()));
        }
        let uri = (self.resolve)(first).ok_or_else(|| format!("unbound prefix '{first}'"))?;
        let local = if self.cursor.eat("*") {
            None
        } else {
            Some(self.cursor.ncname()?.to_string())
        };
        Ok(NameTest::Namespaced { uri, local })
    }

    fn predicates(&mut self) -> Result<Vec<Predicate>, String> {
        let mut predicates = Vec::new();
        while self.cursor.eat("[") {
            self.cursor.skip_ws();
            let digits = self.cursor.take_while(|c| c.is_ascii_digit());
            let predicate = if !digits.is_empty() {
                let index: usize = digits.parse().map_err(|_| "bad position".to_string())?;
                if index == 0 {
                    return Err("positions start at 1".into());
                }
                Predicate::Position(index)
            } else if self.cursor.eat("@") {
                let name = self
                    .cursor
                    .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
                    .to_string();
                let value = self.comparison()?;
                Predicate::Attribute { name, value }
            } else if self.cursor.rest().starts_with('.') && !self.cursor.rest().starts_with("..") {
                self.cursor.eat(".");
                let value = self
                    .comparison()?
                    .ok_or_else(|| "expected '=' after '.'".to_string())?;
                Predicate::SelfText(value)
            } else {
                let test = self.name_test()?;
                match self.comparison()? {
                    Some(value) => Predicate::ChildText { test, value },
                    None => Predicate::HasChild(test),
                }
            };
            self.cursor.skip_ws();
            self.cursor.expect("]")?;
            predicates.push(predicate);
        }
        Ok(predicates)
    }

    fn comparison(&mut self) -> Result<Option<String>, String> {
        self.cursor.skip_ws();
        if !self.cursor.eat("=") {
            return Ok(None);
        }
        self.cursor.skip_ws();
        Ok(Some(self.cursor.literal()?.to_string()))
    }
}

impl Document {
    /// First element matching `path`, in document order.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.find_all(path, Some(1)).into_iter().next()
    }

    /// Every element matching `path`, in document order, optionally capped.
    /// An unparsable path or an unbound prefix matches nothing.
    pub fn find_all(&self, path: &str, limit: Option<usize>) -> Vec<NodeId> {
        self.find_all_from(self.document_node(), path, limit)
    }

    /// Like [`Document::find_all`] but relative paths start at `context`.
    pub fn find_all_from(&self, context: NodeId, path: &str, limit: Option<usize>) -> Vec<NodeId> {
        let scope = if self.is_element(context) {
            Some(context)
        } else {
            self.root()
        };
        let resolve = |prefix: &str| {
            scope
                .and_then(|node| self.lookup_namespace(node, Some(prefix)))
                .or_else(|| self.registered_namespace(prefix))
                .map(str::to_string)
        };
        let parser = PathParser {
            cursor: Cursor {
                input: path.trim(),
                pos: 0,
            },
            resolve: &resolve,
        };
        match parser.parse() {
            Ok(parsed) => self.evaluate(context, &parsed, limit),
            Err(reason) => {
                debug!(path, %reason, "path expression matched nothing");
                Vec::new()
            }
        }
    }

    /// Detach every element matching `path`. Returns how many were removed.
    pub fn remove_by_path(&mut self, path: &str) -> usize {
        let matches = self.find_all(path, None);
        matches.into_iter().filter(|id| self.remove(*id)).count()
    }

    /// Detach the parent element of every match, once per parent.
    pub fn remove_parent_by_path(&mut self, path: &str) -> usize {
        let mut parents: Vec<NodeId> = self
            .find_all(path, None)
            .into_iter()
            .filter_map(|id| self.parent(id))
            .filter(|parent| self.is_element(*parent))
            .collect();
        parents.sort();
        parents.dedup();
        parents.into_iter().filter(|id| self.remove(*id)).count()
    }

    fn evaluate(&self, context: NodeId, path: &LocationPath, limit: Option<usize>) -> Vec<NodeId> {
        let mut current = vec![if path.absolute {
            self.document_node()
        } else {
            context
        }];
        for step in &path.steps {
            let mut next = Vec::new();
            for node in &current {
                match step.axis {
                    Axis::Child => {
                        next.extend(self.select(self.element_children(*node).collect(), step))
                    }
                    Axis::Descendant => {
                        for scope in self.descendants(*node) {
                            next.extend(self.select(self.element_children(scope).collect(), step));
                        }
                    }
                    Axis::SelfNode => next.extend(self.select(vec![*node], step)),
                    Axis::Parent => {
                        next.extend(self.parent(*node).filter(|parent| self.is_element(*parent)))
                    }
                }
            }
            next.sort();
            next.dedup();
            current = next;
        }
        current.retain(|id| self.is_element(*id));
        self.sort_document_order(&mut current);
        if let Some(limit) = limit {
            current.truncate(limit);
        }
        current
    }

    fn select(&self, candidates: Vec<NodeId>, step: &Step) -> Vec<NodeId> {
        let mut selected: Vec<NodeId> = candidates
            .into_iter()
            .filter(|id| self.name_matches(*id, &step.test))
            .collect();
        for predicate in &step.predicates {
            selected = match predicate {
                Predicate::Position(index) => selected.get(index - 1).copied().into_iter().collect(),
                other => selected
                    .into_iter()
                    .filter(|id| self.predicate_holds(*id, other))
                    .collect(),
            };
        }
        selected
    }

    fn name_matches(&self, id: NodeId, test: &NameTest) -> bool {
        if !self.is_element(id) {
            return false;
        }
        match test {
            NameTest::Any => true,
            NameTest::Local(local) => self.local_name(id) == Some(local.as_str()),
            NameTest::Namespaced { uri, local } => {
                self.namespace_uri(id) == Some(uri.as_str())
                    && local
                        .as_deref()
                        .map_or(true, |local| self.local_name(id) == Some(local))
            }
        }
    }

    fn predicate_holds(&self, id: NodeId, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::Position(_) => true,
            Predicate::Attribute { name, value } => self
                .attribute(id, name)
                .is_some_and(|actual| value.as_deref().map_or(true, |expected| actual == expected)),
            Predicate::SelfText(value) => self.text_content(id).trim() == value,
            Predicate::ChildText { test, value } => self
                .element_children(id)
                .any(|child| self.name_matches(child, test) && self.text_content(child).trim() == value),
            Predicate::HasChild(test) => self
                .element_children(id)
                .any(|child| self.name_matches(child, test)),
        }
    }

    fn sort_document_order(&self, nodes: &mut [NodeId]) {
        if nodes.len() < 2 {
            return;
        }
        let order: HashMap<NodeId, usize> = self
            .descendants(self.document_node())
            .enumerate()
            .map(|(index, id)| (id, index))
            .collect();
        nodes.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));
    }
}
