use crate::annotation::{Annotated, AnnotationSet};
use serde::Serialize;
use std::ops::Range;

/// Owned Markdown tree. Standard CommonMark nodes plus the three kinds the
/// runnable-document format adds: annotation blocks, annotation inlines and
/// invisible blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<Node>,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeKind {
    Document,
    Heading { level: u8 },
    Paragraph,
    BlockQuote,
    CodeBlock(CodeBlock),
    HtmlBlock { literal: String },
    List { start: Option<u64> },
    Item,
    Table,
    TableHead,
    TableRow,
    TableCell,
    Rule,
    Emphasis,
    Strong,
    Strikethrough,
    Link { dest: String, title: String },
    Image { dest: String, title: String },
    Text(String),
    Code(String),
    InlineHtml(String),
    SoftBreak,
    HardBreak,
    TaskListMarker(bool),
    FootnoteReference(String),
    /// Any other container (footnote definitions, definition lists, ...).
    Container,
    AnnotationBlock(AnnotationNode),
    AnnotationInline(AnnotationNode),
    /// Raw Markdown hidden from plain renderers, re-parsed by the segment builder.
    InvisibleBlock { source: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub info: String,
    pub literal: String,
    pub fenced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationNode {
    pub raw: String,
    pub annotations: AnnotationSet,
}

impl AnnotationNode {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let annotations = AnnotationSet::parse(&raw);
        Self { raw, annotations }
    }
}

impl Annotated for AnnotationNode {
    fn annotations(&self) -> &AnnotationSet {
        &self.annotations
    }
}

impl Node {
    pub fn new(kind: NodeKind, span: Range<usize>) -> Self {
        Self {
            kind,
            children: Vec::new(),
            span,
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    /// Annotations carried by this node, if it is one of the annotation kinds.
    pub fn annotation(&self) -> Option<&AnnotationNode> {
        match &self.kind {
            NodeKind::AnnotationBlock(node) | NodeKind::AnnotationInline(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_annotation_block(&self) -> bool {
        matches!(self.kind, NodeKind::AnnotationBlock(_))
    }

    pub fn code_block(&self) -> Option<&CodeBlock> {
        match &self.kind {
            NodeKind::CodeBlock(code) => Some(code),
            _ => None,
        }
    }

    /// Concatenated text of this node and its descendants, breaks as spaces.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.kind {
            NodeKind::Text(text) | NodeKind::Code(text) => out.push_str(text),
            NodeKind::SoftBreak | NodeKind::HardBreak => out.push(' '),
            NodeKind::CodeBlock(code) => out.push_str(&code.literal),
            _ => {}
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Depth-first search over this node and its descendants.
    pub fn find<'a>(&'a self, pred: &dyn Fn(&Node) -> bool) -> Option<&'a Node> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(pred))
    }
}
