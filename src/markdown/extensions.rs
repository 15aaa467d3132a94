//! Recognises the runnable-document extensions inside a plain CommonMark tree.
//!
//! Block level:
//! - `<!--~ flags -->` on one line and `<r flags/>` / `<r flags></r>` become
//!   annotation blocks.
//! - `<!--~` alone on a line opens an invisible block that runs to `-->`.
//! - A paragraph holding only an empty link (`[](nospin)` or `[](<a b>)`) is
//!   an annotation block written in link form.
//! - A fence info string with more than the language token gets a synthetic
//!   annotation block inserted in front of the fence.
//!
//! Inline level: `<r ...>` ... `</r>` pairs wrap their siblings into an
//! annotation inline; `<r .../>` is an empty annotation inline.

use std::sync::OnceLock;

use regex::Regex;

use super::ast::{AnnotationNode, Node, NodeKind};

const INVISIBLE_OPEN: &str = "<!--~";
const COMMENT_CLOSE: &str = "-->";

fn tag_regex() -> Option<&'static Regex> {
    static TAG: OnceLock<Option<Regex>> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"(?s)^<r(?:\s+(?P<attrs>.*?))?\s*(?P<close>/)?>$").ok())
        .as_ref()
}

/// Tag shapes an `<r>` fragment can take.
#[derive(Debug, PartialEq)]
pub(super) enum TagShape {
    SelfClosing(String),
    Open(String),
    Close,
}

pub(super) fn classify_tag(fragment: &str) -> Option<TagShape> {
    let fragment = fragment.trim();
    if fragment == "</r>" {
        return Some(TagShape::Close);
    }
    let caps = tag_regex()?.captures(fragment)?;
    let attrs = caps
        .name("attrs")
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    if caps.name("close").is_some() {
        Some(TagShape::SelfClosing(attrs))
    } else {
        Some(TagShape::Open(attrs))
    }
}

/// Run both the block and inline passes over a freshly built tree.
pub(super) fn apply(root: &mut Node) {
    transform_blocks(root);
}

fn transform_blocks(node: &mut Node) {
    let children = std::mem::take(&mut node.children);
    let mut out = Vec::with_capacity(children.len());

    for mut child in children {
        match &child.kind {
            NodeKind::HtmlBlock { literal } => {
                let literal = literal.clone();
                out.extend(classify_html_block(&literal, child));
            }
            NodeKind::Paragraph if is_link_annotation(&child) => {
                let raw = link_annotation_raw(&child).unwrap_or_default();
                out.push(Node::new(
                    NodeKind::AnnotationBlock(AnnotationNode::parse(&raw)),
                    child.span.clone(),
                ));
            }
            NodeKind::CodeBlock(code) => {
                if let Some(extra) = info_annotation(&code.info) {
                    let span = child.span.start..child.span.start;
                    out.push(Node::new(
                        NodeKind::AnnotationBlock(AnnotationNode::parse(extra)),
                        span,
                    ));
                }
                out.push(child);
            }
            NodeKind::Paragraph => {
                transform_inlines(&mut child);
                out.push(promote_lone_tag(child));
            }
            NodeKind::Heading { .. }
            | NodeKind::TableCell
            | NodeKind::Emphasis
            | NodeKind::Strong
            | NodeKind::Strikethrough
            | NodeKind::Link { .. } => {
                transform_inlines(&mut child);
                out.push(child);
            }
            NodeKind::Item => {
                // Tight list items hold inline content directly.
                transform_blocks(&mut child);
                transform_inlines(&mut child);
                out.push(child);
            }
            _ => {
                transform_blocks(&mut child);
                out.push(child);
            }
        }
    }

    node.children = out;
}

fn classify_html_block(literal: &str, original: Node) -> Vec<Node> {
    let trimmed = literal.trim();
    let span = original.span.clone();

    if let Some(rest) = trimmed.strip_prefix(INVISIBLE_OPEN) {
        let first_line = trimmed.lines().next().unwrap_or_default().trim();
        if first_line == INVISIBLE_OPEN {
            let body = rest.trim_start_matches([' ', '\t']);
            let body = body.strip_prefix('\n').unwrap_or(body);
            let body = match body.rfind(COMMENT_CLOSE) {
                Some(end) => &body[..end],
                None => body,
            };
            return vec![Node::new(
                NodeKind::InvisibleBlock {
                    source: body.to_string(),
                },
                span,
            )];
        }
        if let Some(inner) = rest.strip_suffix(COMMENT_CLOSE) {
            return vec![Node::new(
                NodeKind::AnnotationBlock(AnnotationNode::parse(inner)),
                span,
            )];
        }
        return vec![original];
    }

    let Some((first, rest)) = literal.split_once('\n') else {
        return match tag_line_annotation(trimmed) {
            Some(annotation) => vec![Node::new(NodeKind::AnnotationBlock(annotation), span)],
            None => vec![original],
        };
    };
    if rest.trim().is_empty() {
        return match tag_line_annotation(first) {
            Some(annotation) => vec![Node::new(NodeKind::AnnotationBlock(annotation), span)],
            None => vec![original],
        };
    }

    // A tag line directly above other content: CommonMark keeps both in one
    // HTML block, so the remainder is parsed again on its own.
    let Some(annotation) = tag_line_annotation(first) else {
        return vec![original];
    };
    let rest_start = span.start + first.len() + 1;
    let mut nodes = vec![Node::new(
        NodeKind::AnnotationBlock(annotation),
        span.start..rest_start - 1,
    )];
    for mut node in super::parse(rest).children {
        shift_spans(&mut node, rest_start);
        nodes.push(node);
    }
    nodes
}

/// `<r ... />` or `<r ...></r>` with nothing between the tags.
fn tag_line_annotation(line: &str) -> Option<AnnotationNode> {
    let line = line.trim();
    let (head, closed) = match line.strip_suffix("</r>") {
        Some(head) => (head.trim_end(), true),
        None => (line, false),
    };
    match classify_tag(head)? {
        TagShape::SelfClosing(attrs) => Some(AnnotationNode::parse(&attrs)),
        TagShape::Open(attrs) if closed => Some(AnnotationNode::parse(&attrs)),
        _ => None,
    }
}

fn shift_spans(node: &mut Node, by: usize) {
    node.span = node.span.start + by..node.span.end + by;
    for child in &mut node.children {
        shift_spans(child, by);
    }
}

/// A paragraph holding nothing but an empty `<r .../>` or `<r ...></r>` is a
/// block annotation that pulldown-cmark did not treat as an HTML block.
fn promote_lone_tag(paragraph: Node) -> Node {
    let meaningful: Vec<&Node> = paragraph
        .children
        .iter()
        .filter(|child| !matches!(&child.kind, NodeKind::Text(t) if t.trim().is_empty()))
        .collect();
    if let [only] = meaningful.as_slice() {
        if let NodeKind::AnnotationInline(annotation) = &only.kind {
            if only.children.is_empty() {
                return Node::new(
                    NodeKind::AnnotationBlock(annotation.clone()),
                    paragraph.span.clone(),
                );
            }
        }
    }
    paragraph
}

fn is_link_annotation(paragraph: &Node) -> bool {
    link_annotation_raw(paragraph).is_some()
}

/// `[](dest)` with no text and no title, alone in its paragraph.
fn link_annotation_raw(paragraph: &Node) -> Option<String> {
    let meaningful: Vec<&Node> = paragraph
        .children
        .iter()
        .filter(|child| !matches!(&child.kind, NodeKind::Text(t) if t.trim().is_empty()))
        .collect();
    match meaningful.as_slice() {
        [only] => match &only.kind {
            NodeKind::Link { dest, title } if title.is_empty() && only.children.is_empty() => {
                Some(dest.trim_start_matches('<').trim_end_matches('>').to_string())
            }
            _ => None,
        },
        _ => None,
    }
}

/// Everything after the language token of a fence info string.
fn info_annotation(info: &str) -> Option<&str> {
    let info = info.trim();
    let lang_end = info.find(char::is_whitespace)?;
    let rest = info[lang_end..].trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

fn transform_inlines(node: &mut Node) {
    let children = std::mem::take(&mut node.children);
    let mut out: Vec<Node> = Vec::with_capacity(children.len());
    // Positions in `out` of `<r ...>` placeholders still waiting for `</r>`.
    let mut open: Vec<(usize, String)> = Vec::new();

    for mut child in children {
        if let NodeKind::InlineHtml(html) = &child.kind {
            match classify_tag(html) {
                Some(TagShape::SelfClosing(attrs)) => {
                    out.push(Node::new(
                        NodeKind::AnnotationInline(AnnotationNode::parse(&attrs)),
                        child.span.clone(),
                    ));
                    continue;
                }
                Some(TagShape::Open(attrs)) => {
                    open.push((out.len(), attrs));
                    out.push(child);
                    continue;
                }
                Some(TagShape::Close) => {
                    if let Some((start, attrs)) = open.pop() {
                        let mut wrapped: Vec<Node> = out.drain(start..).collect();
                        let placeholder = wrapped.remove(0);
                        let span = placeholder.span.start..child.span.end;
                        out.push(
                            Node::new(
                                NodeKind::AnnotationInline(AnnotationNode::parse(&attrs)),
                                span,
                            )
                            .with_children(wrapped),
                        );
                        continue;
                    }
                }
                None => {}
            }
        }
        if !child.children.is_empty() {
            transform_inlines(&mut child);
        }
        out.push(child);
    }

    // An `<r ...>` that never closed still annotates, it just wraps nothing.
    for (idx, attrs) in open {
        if let Some(slot) = out.get_mut(idx) {
            let span = slot.span.clone();
            *slot = Node::new(NodeKind::AnnotationInline(AnnotationNode::parse(&attrs)), span);
        }
    }

    node.children = out;
}
