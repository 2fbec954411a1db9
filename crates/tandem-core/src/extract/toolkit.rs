//! Node-walking toolkit shared by every language extractor.
//!
//! Extractors read named sub-fields (`name`, `parameters`, `body`, ...)
//! through these helpers instead of relying on child positions, so grammar
//! revisions that reorder children do not break extraction.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};
use tree_sitter::Node;

use crate::models::SourceLocation;

/// Comment node kinds plus sibling kinds that may sit between a doc comment
/// and its declaration without breaking the association.
pub struct DocStyle {
    pub comment_kinds: &'static [&'static str],
    pub transparent_kinds: &'static [&'static str],
}

/// Node kinds counted by the branching heuristic.
pub struct BranchRules {
    /// Each occurrence adds one.
    pub kinds: &'static [&'static str],
    /// Binary nodes that add one only for a short-circuit operator.
    pub binary_kinds: &'static [&'static str],
    pub short_circuit_ops: &'static [&'static str],
}

/// How to find the callee of a call expression.
pub struct CallRules {
    /// `(call node kind, field holding the callee)`.
    pub calls: &'static [(&'static str, &'static str)],
}

/// Per-file extraction context: the source bytes and the file name every
/// location is attributed to.
pub struct ExtractCtx<'s> {
    pub source: &'s [u8],
    pub file: &'s str,
}

impl<'s> ExtractCtx<'s> {
    pub fn new(source: &'s [u8], file: &'s str) -> Self {
        Self { source, file }
    }

    pub fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.source).unwrap_or("")
    }

    pub fn field_text(&self, node: Node<'_>, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .map(|n| self.text(n).trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn location(&self, node: Node<'_>) -> SourceLocation {
        let start = node.start_position();
        let end = node.end_position();
        SourceLocation::new(self.file, start.row + 1, start.column + 1, end.row + 1, end.column + 1)
    }

    pub fn hash(&self, node: Node<'_>) -> String {
        content_hash(&self.source[node.byte_range()])
    }

    /// Declaration text up to (not including) its body, whitespace collapsed.
    pub fn signature(&self, node: Node<'_>, body: Option<Node<'_>>) -> String {
        let end = body.map(|b| b.start_byte()).unwrap_or_else(|| node.end_byte());
        let raw = String::from_utf8_lossy(&self.source[node.start_byte()..end.max(node.start_byte())]);
        let collapsed = collapse_whitespace(&raw);
        collapsed
            .trim_end_matches(|c: char| c == '{' || c == ':' || c == ';' || c == '=' || c.is_whitespace())
            .trim_end_matches("=>")
            .trim_end()
            .to_string()
    }

    pub fn doc(&self, anchor: Node<'_>, style: &DocStyle) -> Option<String> {
        leading_doc(anchor, self.source, style)
    }
}

/// SHA-256 hex digest of raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Named children, collected so callers can recurse freely.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub fn children_by_field<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

pub fn child_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    children(node).into_iter().find(|c| kinds.contains(&c.kind()))
}

pub fn children_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    children(node)
        .into_iter()
        .filter(|c| kinds.contains(&c.kind()))
        .collect()
}

/// True when any ancestor of `node` is one of `kinds`.
pub fn has_ancestor(node: Node<'_>, kinds: &[&str]) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        if kinds.contains(&parent.kind()) {
            return true;
        }
        current = parent.parent();
    }
    false
}

/// Nearest ancestor of one of `kinds`.
pub fn ancestor_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    let mut current = node.parent();
    while let Some(parent) = current {
        if kinds.contains(&parent.kind()) {
            return Some(parent);
        }
        current = parent.parent();
    }
    None
}

/// True when `node` has a direct (usually anonymous) child token of `kind`.
pub fn has_token(node: Node<'_>, kind: &str) -> bool {
    children(node).iter().any(|c| c.kind() == kind)
}

/// Depth-first, document-order search for nodes of the given kinds.
pub fn descendants<'t>(node: Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if kinds.contains(&current.kind()) {
            found.push(current);
        }
        let mut kids = children(current);
        kids.reverse();
        stack.extend(kids);
    }
    found
}

/// Branching-count heuristic: 1 plus one per branching construct anywhere
/// under `body`. A relative signal only.
pub fn branching_count(body: Option<Node<'_>>, source: &[u8], rules: &BranchRules) -> u32 {
    let Some(body) = body else {
        return 1;
    };
    let mut count = 1u32;
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        let kind = node.kind();
        if rules.kinds.contains(&kind) {
            count += 1;
        } else if rules.binary_kinds.contains(&kind) && is_short_circuit(node, source, rules) {
            count += 1;
        }
        stack.extend(children(node));
    }
    count
}

fn is_short_circuit(node: Node<'_>, source: &[u8], rules: &BranchRules) -> bool {
    if let Some(op) = node.child_by_field_name("operator") {
        let text = op.utf8_text(source).unwrap_or("");
        return rules.short_circuit_ops.contains(&text);
    }
    children(node)
        .iter()
        .filter(|c| !c.is_named())
        .any(|c| rules.short_circuit_ops.contains(&c.kind()))
}

/// Deduplicated callee names of every call expression under `body`.
pub fn collect_calls(body: Option<Node<'_>>, source: &[u8], rules: &CallRules) -> BTreeSet<String> {
    let mut calls = BTreeSet::new();
    let Some(body) = body else {
        return calls;
    };
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        for (kind, field) in rules.calls {
            if node.kind() == *kind {
                if let Some(callee) = node.child_by_field_name(field) {
                    if let Some(name) = callee_name(callee.utf8_text(source).unwrap_or("")) {
                        calls.insert(name);
                    }
                }
            }
        }
        stack.extend(children(node));
    }
    calls
}

/// Last identifier segment of a callee expression: `s.repo.Save` -> `Save`,
/// `Vec::<u8>::new` -> `new`, `this.load<T>` -> `load`.
pub fn callee_name(expr: &str) -> Option<String> {
    let mut cleaned = String::with_capacity(expr.len());
    let mut depth = 0i32;
    for ch in expr.chars() {
        match ch {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            _ if depth <= 0 => cleaned.push(ch),
            _ => {}
        }
    }
    let segment = cleaned
        .rsplit(|c: char| c == '.' || c == ':' || c == '!' || c.is_whitespace())
        .find(|s| !s.is_empty())?;
    let name: String = segment
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    if name.is_empty() || name.chars().all(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(name)
    }
}

/// Doc comment attached to `anchor`: the run of immediately preceding
/// comment siblings, skipping transparent siblings, stopping at anything else.
pub fn leading_doc(anchor: Node<'_>, source: &[u8], style: &DocStyle) -> Option<String> {
    let mut blocks: Vec<&str> = Vec::new();
    let mut current = anchor.prev_sibling();
    while let Some(sibling) = current {
        let kind = sibling.kind();
        let text = sibling.utf8_text(source).unwrap_or("");
        if style.comment_kinds.contains(&kind) {
            blocks.push(text);
        } else if !style.transparent_kinds.contains(&kind) && !text.trim().is_empty() {
            break;
        }
        current = sibling.prev_sibling();
    }
    if blocks.is_empty() {
        return None;
    }
    blocks.reverse();
    let doc = strip_comment_markers(&blocks.join("\n"));
    if doc.is_empty() {
        None
    } else {
        Some(doc)
    }
}

/// Remove comment delimiters uniformly, one line at a time.
pub fn strip_comment_markers(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let mut l = line.trim();
        for prefix in ["///", "//!", "//", "/**", "/*!", "/*", "#"] {
            if let Some(rest) = l.strip_prefix(prefix) {
                l = rest;
                break;
            }
        }
        if let Some(rest) = l.strip_suffix("*/") {
            l = rest;
        }
        l = l.trim();
        if let Some(rest) = l.strip_prefix('*') {
            l = rest.trim_start();
        }
        lines.push(l.trim_end().to_string());
    }
    trim_blank_lines(lines)
}

/// Strip string-literal quotes (and Python prefixes) from a docstring.
pub fn strip_string_quotes(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B' | 'f' | 'F'));
    let inner = ["\"\"\"", "'''", "\"", "'", "`"]
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(q)
                .and_then(|rest| rest.strip_suffix(q))
        })
        .unwrap_or(trimmed);
    trim_blank_lines(inner.lines().map(|l| l.trim().to_string()).collect())
}

fn trim_blank_lines(lines: Vec<String>) -> String {
    let start = lines.iter().position(|l| !l.is_empty());
    let end = lines.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}

/// Strip a leading `:` (TypeScript annotations) and surrounding whitespace.
pub fn clean_type(raw: &str) -> Option<String> {
    let cleaned = collapse_whitespace(raw.trim().trim_start_matches(':').trim());
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Split a type parameter list like `<K, V: Clone>` into parameter texts.
pub fn split_generics(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix(['<', '['])
        .and_then(|rest| rest.strip_suffix(['>', ']']))
        .unwrap_or(trimmed);
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '<' | '[' | '(' => {
                depth += 1;
                current.push(ch);
            }
            '>' | ']' | ')' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                let piece = collapse_whitespace(&current);
                if !piece.is_empty() {
                    out.push(piece);
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    let piece = collapse_whitespace(&current);
    if !piece.is_empty() {
        out.push(piece);
    }
    out
}
