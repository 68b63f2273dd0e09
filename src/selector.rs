//! Selector matching and fallback chains.
//!
//! Supports the CSS subset card templates need: type names, `#id`, `.class`,
//! compounds of those (`text.heading`), the descendant combinator and comma unions.
//!
//! A [`SelectorChain`] is an ordered list of selector groups. Resolution returns the
//! nodes of the first group that matches anything; groups are never merged.

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

use crate::document::{Document, Node, NodeId};

/// Selector parse error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("invalid selector `{selector}`: {reason}")]
    Invalid { selector: String, reason: String },
}

/// One compound selector, e.g. `text.heading#main`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Compound {
    fn parse(source: &str, full: &str) -> Result<Self, SelectorError> {
        let invalid = |reason: &str| SelectorError::Invalid {
            selector: full.to_string(),
            reason: reason.to_string(),
        };

        let mut compound = Compound::default();
        let mut chars = source.char_indices().peekable();
        let mut tag_end = source.len();

        // Leading type name or universal selector
        while let Some((i, c)) = chars.peek().copied() {
            if c == '.' || c == '#' {
                tag_end = i;
                break;
            }
            if !is_ident_char(c) && c != '*' {
                return Err(invalid(&format!("unexpected character `{}`", c)));
            }
            chars.next();
        }
        let tag = &source[..tag_end.min(source.len())];
        if !tag.is_empty() && tag != "*" {
            if tag.contains('*') {
                return Err(invalid("`*` must stand alone"));
            }
            compound.tag = Some(tag.to_ascii_lowercase());
        }

        let rest = &source[tag.len()..];
        let mut pos = 0;
        while pos < rest.len() {
            let marker = rest[pos..].chars().next().unwrap_or('.');
            let body_start = pos + 1;
            let body_len = rest[body_start..]
                .find(|c: char| c == '.' || c == '#')
                .unwrap_or(rest.len() - body_start);
            let body = &rest[body_start..body_start + body_len];
            if body.is_empty() {
                return Err(invalid("missing name after `.` or `#`"));
            }
            if let Some(c) = body.chars().find(|c| !is_ident_char(*c)) {
                return Err(invalid(&format!("unexpected character `{}`", c)));
            }
            match marker {
                '#' if compound.id.is_some() => return Err(invalid("more than one id")),
                '#' => compound.id = Some(body.to_string()),
                _ => compound.classes.push(body.to_string()),
            }
            pos = body_start + body_len;
        }

        Ok(compound)
    }

    fn matches(&self, node: &Node) -> bool {
        if let Some(tag) = &self.tag {
            if node.kind.tag() != tag.as_str() {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| node.has_class(c))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// A complex selector: compounds joined by descendant combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
}

impl Complex {
    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let Some((last, rest)) = self.compounds.split_last() else {
            return false;
        };
        if !last.matches(doc.node(id)) {
            return false;
        }
        // Descendant-only combinators: greedy nearest-ancestor matching is exact.
        let mut remaining = rest.iter().rev().peekable();
        for ancestor in doc.ancestors(id) {
            match remaining.peek() {
                Some(compound) if compound.matches(doc.node(ancestor)) => {
                    remaining.next();
                }
                Some(_) => {}
                None => break,
            }
        }
        remaining.peek().is_none()
    }
}

/// A selector list: complex selectors joined by commas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Complex>,
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }

        let alternatives = trimmed
            .split(',')
            .map(|part| {
                let compounds = part
                    .split_whitespace()
                    .map(|c| Compound::parse(c, trimmed))
                    .collect::<Result<Vec<_>, _>>()?;
                if compounds.is_empty() {
                    return Err(SelectorError::Invalid {
                        selector: trimmed.to_string(),
                        reason: "empty alternative".to_string(),
                    });
                }
                Ok(Complex { compounds })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: trimmed.to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `id` matches any alternative.
    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        self.alternatives.iter().any(|c| c.matches(doc, id))
    }

    /// All descendants of `scope` matching this selector, in document order.
    pub fn query_all(&self, doc: &Document, scope: NodeId) -> Vec<NodeId> {
        doc.descendants(scope)
            .into_iter()
            .filter(|id| self.matches(doc, *id))
            .collect()
    }

    /// First descendant of `scope` matching this selector.
    pub fn query(&self, doc: &Document, scope: NodeId) -> Option<NodeId> {
        doc.descendants(scope)
            .into_iter()
            .find(|id| self.matches(doc, *id))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Ordered fallback list of selector groups.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct SelectorChain {
    groups: Vec<Selector>,
}

impl SelectorChain {
    pub fn new(groups: Vec<Selector>) -> Self {
        Self { groups }
    }

    pub fn parse<S: AsRef<str>>(groups: &[S]) -> Result<Self, SelectorError> {
        groups
            .iter()
            .map(|g| Selector::parse(g.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    pub fn groups(&self) -> &[Selector] {
        &self.groups
    }

    /// Nodes matched by the first group with at least one match under `scope`.
    pub fn resolve(&self, doc: &Document, scope: NodeId) -> Vec<NodeId> {
        self.resolve_with_group(doc, scope)
            .map(|(_, nodes)| nodes)
            .unwrap_or_default()
    }

    /// Like [`resolve`](Self::resolve), also reporting which group won.
    pub fn resolve_with_group(&self, doc: &Document, scope: NodeId) -> Option<(usize, Vec<NodeId>)> {
        self.groups.iter().enumerate().find_map(|(i, group)| {
            let nodes = group.query_all(doc, scope);
            if nodes.is_empty() {
                None
            } else {
                tracing::debug!(selector = %group, matched = nodes.len(), "selector group resolved");
                Some((i, nodes))
            }
        })
    }

    /// First node of the first group that matches anything.
    pub fn resolve_first(&self, doc: &Document, scope: NodeId) -> Option<NodeId> {
        self.resolve(doc, scope).into_iter().next()
    }

    /// Union of every group's matches, deduplicated, in document order.
    ///
    /// Only used to reach every element a chain could target (e.g. clearing images).
    pub fn resolve_all_groups(&self, doc: &Document, scope: NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut all: Vec<NodeId> = self
            .groups
            .iter()
            .flat_map(|g| g.query_all(doc, scope))
            .filter(|id| seen.insert(*id))
            .collect();
        all.sort();
        all
    }
}

impl TryFrom<Vec<String>> for SelectorChain {
    type Error = SelectorError;

    fn try_from(groups: Vec<String>) -> Result<Self, Self::Error> {
        Self::parse(&groups)
    }
}
