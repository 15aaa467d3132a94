//! Terminal renderer: turns AST nodes into styled, indented text.
//!
//! Rendering is a pure walk over the tree writing to any [`Write`]. State
//! carried between nodes is limited to the style stack, list nesting and
//! whether the cursor sits at the start of a line (indentation is applied
//! lazily at the first write on each line).

pub mod style;


use crate::annotation::AnnotationSet;
use crate::markdown::{Node, NodeKind};
use crate::segments::HeadingMarker;
use std::io::{self, Write};
use style::{Style, StyleStack};

const GUTTER: &str = "│ ";

/// Colours a single line of code. Implementations must not add newlines.
pub trait Highlighter {
    fn highlight(&self, language: Option<&str>, line: &str) -> String;
}

/// Leaves code untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(&self, _language: Option<&str>, line: &str) -> String {
        line.to_string()
    }
}

/// Rewrites the rendered bytes of an annotated inline span.
pub trait InlineMutator {
    fn mutate(&self, annotations: &AnnotationSet, rendered: Vec<u8>) -> Vec<u8>;
}

/// Notified when an annotation block is passed during rendering.
pub trait AnnotationHandler {
    fn on_annotation(&mut self, annotations: &AnnotationSet);
}

struct ListFrame {
    next: Option<u64>,
}

pub struct Renderer<'a> {
    level: u8,
    styles: StyleStack,
    lists: Vec<ListFrame>,
    item_depth: usize,
    line_start: bool,
    highlighter: &'a dyn Highlighter,
    mutator: Option<&'a dyn InlineMutator>,
    handler: Option<&'a mut dyn AnnotationHandler>,
}

impl<'a> Renderer<'a> {
    pub fn new(level: u8, color: bool) -> Self {
        Self {
            level,
            styles: StyleStack::new(color),
            lists: Vec::new(),
            item_depth: 0,
            line_start: true,
            highlighter: &PlainHighlighter,
            mutator: None,
            handler: None,
        }
    }

    pub fn with_highlighter(mut self, highlighter: &'a dyn Highlighter) -> Self {
        self.highlighter = highlighter;
        self
    }

    pub fn with_mutator(mut self, mutator: &'a dyn InlineMutator) -> Self {
        self.mutator = Some(mutator);
        self
    }

    pub fn with_handler(mut self, handler: &'a mut dyn AnnotationHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Two spaces per level below the top, plus two per open list.
    fn indent(&self) -> String {
        let depth = usize::from(self.level.max(1) - 1) + self.lists.len().saturating_sub(1) * 2;
        "  ".repeat(depth)
    }

    fn text(&mut self, out: &mut dyn Write, text: &str) -> io::Result<()> {
        let mut lines = text.split('\n');
        if let Some(first) = lines.next() {
            self.fragment(out, first)?;
        }
        for line in lines {
            self.newline(out)?;
            self.fragment(out, line)?;
        }
        Ok(())
    }

    fn fragment(&mut self, out: &mut dyn Write, text: &str) -> io::Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        if self.line_start {
            out.write_all(self.indent().as_bytes())?;
            self.line_start = false;
        }
        out.write_all(text.as_bytes())
    }

    fn newline(&mut self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(b"\n")?;
        self.line_start = true;
        Ok(())
    }

    fn styled(
        &mut self,
        out: &mut dyn Write,
        style: Style,
        body: impl FnOnce(&mut Self, &mut dyn Write) -> io::Result<()>,
    ) -> io::Result<()> {
        self.styles.push(style, out)?;
        body(self, out)?;
        self.styles.pop(out)
    }

    fn block_end(&mut self, out: &mut dyn Write) -> io::Result<()> {
        if !self.line_start {
            self.newline(out)?;
        }
        if self.item_depth == 0 {
            self.newline(out)?;
        }
        Ok(())
    }

    fn children(&mut self, node: &Node, out: &mut dyn Write) -> io::Result<()> {
        for child in &node.children {
            self.render(child, out)?;
        }
        Ok(())
    }

    /// Heading line with its short code (if any) in faint text.
    pub fn render_heading(&mut self, heading: &HeadingMarker, out: &mut dyn Write) -> io::Result<()> {
        let level = heading.level;
        self.level = level;
        self.styled(out, style::heading(level), |this, out| {
            let mut title = Vec::new();
            this.children(&heading.node, &mut title)?;
            let end = title
                .iter()
                .rposition(|byte| !byte.is_ascii_whitespace())
                .map_or(0, |idx| idx + 1);
            out.write_all(&title[..end])
        })?;
        if let Some(code) = &heading.short_code {
            self.styled(out, style::FAINT, |this, out| this.fragment(out, &format!(" ({code})")))?;
        }
        self.block_end(out)
    }

    pub fn render(&mut self, node: &Node, out: &mut dyn Write) -> io::Result<()> {
        match &node.kind {
            NodeKind::Document | NodeKind::Container | NodeKind::TableHead => self.children(node, out),
            NodeKind::Heading { level } => {
                let level = *level;
                self.level = level;
                self.styled(out, style::heading(level), |this, out| this.children(node, out))?;
                self.block_end(out)
            }
            NodeKind::Paragraph => {
                if is_bare_link(node) {
                    return Ok(());
                }
                self.children(node, out)?;
                self.block_end(out)
            }
            NodeKind::BlockQuote => {
                self.styled(out, style::QUOTE, |this, out| this.children(node, out))
            }
            NodeKind::CodeBlock(code) => {
                let literal = code.literal.strip_suffix('\n').unwrap_or(&code.literal);
                for line in literal.split('\n') {
                    self.styled(out, style::FAINT, |this, out| this.fragment(out, GUTTER))?;
                    let highlighted = self.highlighter.highlight(code.language.as_deref(), line);
                    self.fragment(out, &highlighted)?;
                    self.newline(out)?;
                }
                self.block_end(out)
            }
            NodeKind::HtmlBlock { .. } | NodeKind::InlineHtml(_) | NodeKind::InvisibleBlock { .. } => {
                Ok(())
            }
            NodeKind::List { start } => {
                self.lists.push(ListFrame { next: *start });
                let result = self.children(node, out);
                self.lists.pop();
                result?;
                if self.lists.is_empty() {
                    self.newline(out)?;
                }
                Ok(())
            }
            NodeKind::Item => {
                if !self.line_start {
                    self.newline(out)?;
                }
                let marker = match self.lists.last_mut() {
                    Some(ListFrame { next: Some(n) }) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.fragment(out, &marker)?;
                self.item_depth += 1;
                let result = self.children(node, out);
                self.item_depth -= 1;
                result?;
                if !self.line_start {
                    self.newline(out)?;
                }
                Ok(())
            }
            NodeKind::Table => {
                self.children(node, out)?;
                self.block_end(out)
            }
            NodeKind::TableRow => {
                for (idx, cell) in node.children.iter().enumerate() {
                    if idx > 0 {
                        self.fragment(out, " │ ")?;
                    }
                    self.render(cell, out)?;
                }
                self.newline(out)
            }
            NodeKind::TableCell => self.children(node, out),
            NodeKind::Rule => {
                self.styled(out, style::FAINT, |this, out| this.fragment(out, &"─".repeat(40)))?;
                self.block_end(out)
            }
            NodeKind::Emphasis => self.styled(out, style::EMPHASIS, |this, out| this.children(node, out)),
            NodeKind::Strong => self.styled(out, style::STRONG, |this, out| this.children(node, out)),
            NodeKind::Strikethrough => {
                self.styled(out, style::STRIKE, |this, out| this.children(node, out))
            }
            NodeKind::Link { dest, .. } => {
                self.styled(out, style::LINK, |this, out| this.children(node, out))?;
                let text = node.plain_text();
                if !dest.is_empty() && text.trim() != dest {
                    self.styled(out, style::FAINT, |this, out| this.fragment(out, &format!(" ({dest})")))?;
                }
                Ok(())
            }
            NodeKind::Image { dest, .. } => {
                let alt = node.plain_text();
                let label = if alt.is_empty() { dest.clone() } else { alt };
                self.styled(out, style::FAINT, |this, out| this.fragment(out, &format!("[image: {label}]")))
            }
            NodeKind::Text(text) => self.text(out, text),
            NodeKind::Code(code) => {
                self.styled(out, style::INLINE_CODE, |this, out| this.fragment(out, code))
            }
            NodeKind::SoftBreak | NodeKind::HardBreak => self.newline(out),
            NodeKind::TaskListMarker(done) => self.fragment(out, if *done { "[x] " } else { "[ ] " }),
            NodeKind::FootnoteReference(label) => self.fragment(out, &format!("[^{label}]")),
            NodeKind::AnnotationInline(annotation) => {
                let mut buffer = Vec::new();
                self.children(node, &mut buffer)?;
                let rendered = match self.mutator {
                    Some(mutator) => mutator.mutate(&annotation.annotations, buffer),
                    None => buffer,
                };
                out.write_all(&rendered)
            }
            NodeKind::AnnotationBlock(annotation) => {
                if let Some(handler) = self.handler.as_deref_mut() {
                    handler.on_annotation(&annotation.annotations);
                }
                Ok(())
            }
        }
    }
}

/// Paragraphs holding a single link with no text are not rendered.
fn is_bare_link(node: &Node) -> bool {
    let [only] = node.children.as_slice() else {
        return false;
    };
    matches!(only.kind, NodeKind::Link { .. }) && only.plain_text().trim().is_empty()
}

/// Render a list of nodes into a byte buffer.
pub fn render_nodes(nodes: &[Node], level: u8, color: bool) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut renderer = Renderer::new(level, color);
    for node in nodes {
        renderer.render(node, &mut out)?;
    }
    Ok(out)
}
