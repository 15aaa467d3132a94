//! Folds the pulldown-cmark event stream into an owned [`Node`] tree.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser as CmarkParser, Tag};

use super::ast::{CodeBlock, Node, NodeKind};

pub(super) fn build(source: &str) -> Node {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES | Options::ENABLE_TASKLISTS;
    let parser = CmarkParser::new_ext(source, options);

    let mut stack: Vec<Node> = vec![Node::new(NodeKind::Document, 0..source.len())];

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(tag) => stack.push(Node::new(kind_for_tag(tag), range)),
            Event::End(_) => {
                // The document frame is never popped by an End event.
                if stack.len() > 1 {
                    if let Some(node) = stack.pop() {
                        push_child(&mut stack, node);
                    }
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    if let NodeKind::CodeBlock(code) = &mut top.kind {
                        code.literal.push_str(&text);
                        continue;
                    }
                }
                push_text(&mut stack, &text, range);
            }
            Event::Html(html) => {
                if let Some(top) = stack.last_mut() {
                    if let NodeKind::HtmlBlock { literal } = &mut top.kind {
                        literal.push_str(&html);
                        continue;
                    }
                }
                push_child(&mut stack, Node::new(NodeKind::InlineHtml(html.to_string()), range));
            }
            Event::InlineHtml(html) => {
                push_child(&mut stack, Node::new(NodeKind::InlineHtml(html.to_string()), range));
            }
            Event::Code(code) => {
                push_child(&mut stack, Node::new(NodeKind::Code(code.to_string()), range));
            }
            Event::InlineMath(math) | Event::DisplayMath(math) => push_text(&mut stack, &math, range),
            Event::FootnoteReference(label) => push_child(
                &mut stack,
                Node::new(NodeKind::FootnoteReference(label.to_string()), range),
            ),
            Event::SoftBreak => push_child(&mut stack, Node::new(NodeKind::SoftBreak, range)),
            Event::HardBreak => push_child(&mut stack, Node::new(NodeKind::HardBreak, range)),
            Event::Rule => push_child(&mut stack, Node::new(NodeKind::Rule, range)),
            Event::TaskListMarker(checked) => {
                push_child(&mut stack, Node::new(NodeKind::TaskListMarker(checked), range))
            }
        }
    }

    // Unbalanced input cannot come out of pulldown-cmark, but fold whatever is left.
    while stack.len() > 1 {
        if let Some(node) = stack.pop() {
            push_child(&mut stack, node);
        }
    }
    stack.pop().unwrap_or_else(|| Node::new(NodeKind::Document, 0..source.len()))
}

fn push_child(stack: &mut [Node], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

/// pulldown-cmark splits text around brackets and entities; keep runs merged.
fn push_text(stack: &mut [Node], text: &str, range: Range<usize>) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if let Some(last) = parent.children.last_mut() {
        if let NodeKind::Text(existing) = &mut last.kind {
            existing.push_str(text);
            last.span.end = last.span.end.max(range.end);
            return;
        }
    }
    parent
        .children
        .push(Node::new(NodeKind::Text(text.to_string()), range));
}

fn kind_for_tag(tag: Tag<'_>) -> NodeKind {
    match tag {
        Tag::Paragraph => NodeKind::Paragraph,
        Tag::Heading { level, .. } => NodeKind::Heading {
            level: heading_level_to_u8(level),
        },
        Tag::BlockQuote(_) => NodeKind::BlockQuote,
        Tag::CodeBlock(kind) => {
            let (info, fenced) = match kind {
                CodeBlockKind::Fenced(info) => (info.to_string(), true),
                CodeBlockKind::Indented => (String::new(), false),
            };
            let language = info
                .split_whitespace()
                .next()
                .filter(|lang| !lang.is_empty())
                .map(str::to_string);
            NodeKind::CodeBlock(CodeBlock {
                language,
                info,
                literal: String::new(),
                fenced,
            })
        }
        Tag::HtmlBlock => NodeKind::HtmlBlock {
            literal: String::new(),
        },
        Tag::List(start) => NodeKind::List { start },
        Tag::Item => NodeKind::Item,
        Tag::Table(_) => NodeKind::Table,
        Tag::TableHead => NodeKind::TableHead,
        Tag::TableRow => NodeKind::TableRow,
        Tag::TableCell => NodeKind::TableCell,
        Tag::Emphasis => NodeKind::Emphasis,
        Tag::Strong => NodeKind::Strong,
        Tag::Strikethrough => NodeKind::Strikethrough,
        Tag::Link {
            dest_url, title, ..
        } => NodeKind::Link {
            dest: dest_url.to_string(),
            title: title.to_string(),
        },
        Tag::Image {
            dest_url, title, ..
        } => NodeKind::Image {
            dest: dest_url.to_string(),
            title: title.to_string(),
        },
        _ => NodeKind::Container,
    }
}

fn heading_level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
