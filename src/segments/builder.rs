use crate::annotation::{AnnotationSet, Flag, Param};
use crate::markdown::{self, line_of_offset, Node, NodeKind};

use super::{
    CodeSegment, DisplaySegment, HeadingMarker, Segment, SegmentDiagnostic, SegmentList,
    SetupSegment,
};

/// Parse `source` and linearise it into segments.
pub fn build(source: &str) -> SegmentList {
    let root = markdown::parse(source);
    let mut builder = Builder::default();
    builder.walk(&root.children, source);
    builder.finish()
}

#[derive(Default)]
struct Builder {
    segments: Vec<Segment>,
    diagnostics: Vec<SegmentDiagnostic>,
    display: Option<Vec<Node>>,
    /// Annotation blocks seen since the last non-annotation sibling.
    pending: Vec<Node>,
    level: u8,
    heading_stack: Vec<usize>,
    /// Document lines above the source currently being walked.
    line_base: usize,
}

impl Builder {
    fn walk(&mut self, nodes: &[Node], source: &str) {
        let mut idx = 0;
        while idx < nodes.len() {
            let node = &nodes[idx];
            match &node.kind {
                NodeKind::AnnotationBlock(annotation) => {
                    self.record_diagnostics(&annotation.annotations, source, node);
                    self.pending.push(node.clone());
                }
                NodeKind::Heading { level } => {
                    idx = self.heading(nodes, idx, *level, source);
                    continue;
                }
                NodeKind::CodeBlock(_) => self.code(node, source),
                NodeKind::InvisibleBlock { source: hidden } => {
                    self.flush_pending();
                    self.close_display();
                    let inner = markdown::parse(hidden);
                    let outer_base = self.line_base;
                    self.line_base = self.line_at(source, node.span.start);
                    self.walk(&inner.children, hidden);
                    self.line_base = outer_base;
                    self.flush_pending();
                    self.close_display();
                }
                _ => {
                    self.flush_pending();
                    self.record_inline_diagnostics(node, source);
                    self.push_display(node.clone());
                }
            }
            idx += 1;
        }
    }

    fn finish(mut self) -> SegmentList {
        self.flush_pending();
        self.close_display();
        SegmentList {
            segments: self.segments,
            diagnostics: self.diagnostics,
        }
    }

    /// Emit a heading marker; returns the index of the next unconsumed sibling.
    fn heading(&mut self, nodes: &[Node], idx: usize, level: u8, source: &str) -> usize {
        self.flush_pending();
        self.close_display();
        if self.last_was_code() {
            self.segments.push(Segment::Separator);
        }

        let node = &nodes[idx];
        self.record_inline_diagnostics(node, source);
        let mut short_code = None;
        let mut description = None;
        collect_inline_annotations(node, &mut |set| {
            if let Some(label) = set.param(Param::Label) {
                short_code = Some(label.to_string());
            }
            if let Some(desc) = set.param(Param::Desc) {
                description = Some(desc.to_string());
            }
        });

        // Label/description blocks directly under the heading belong to it.
        let mut next = idx + 1;
        while let Some(candidate) = nodes.get(next) {
            let Some(annotation) = candidate.annotation().filter(|_| candidate.is_annotation_block())
            else {
                break;
            };
            let set = &annotation.annotations;
            if set.param(Param::Label).is_none() && set.param(Param::Desc).is_none() {
                break;
            }
            self.record_diagnostics(set, source, candidate);
            if let Some(label) = set.param(Param::Label) {
                short_code = Some(label.to_string());
            }
            if let Some(desc) = set.param(Param::Desc) {
                description = Some(desc.to_string());
            }
            next += 1;
        }

        if description.is_none() {
            if let Some(paragraph) = nodes
                .get(next)
                .filter(|n| matches!(n.kind, NodeKind::Paragraph))
            {
                description = paragraph_description(paragraph);
            }
        }

        while let Some(&top) = self.heading_stack.last() {
            let top_level = match &self.segments[top] {
                Segment::Heading(h) => h.level,
                _ => 0,
            };
            if top_level >= level {
                self.heading_stack.pop();
            } else {
                break;
            }
        }
        let parent = self.heading_stack.last().copied();

        let position = self.segments.len();
        self.segments.push(Segment::Heading(HeadingMarker {
            title: node.plain_text().trim().to_string(),
            level,
            short_code,
            description,
            setups: Vec::new(),
            parent,
            node: node.clone(),
        }));
        self.heading_stack.push(position);
        self.level = level;
        next
    }

    fn code(&mut self, node: &Node, source: &str) {
        let Some(code) = node.code_block() else {
            return;
        };
        let mut annotations = AnnotationSet::new();
        for pending in self.pending.drain(..) {
            if let Some(annotation) = pending.annotation() {
                annotations.merge_from(&annotation.annotations);
            }
        }
        self.close_display();

        let segment = CodeSegment {
            language: code.language.clone(),
            source: code.literal.clone(),
            annotations,
            level: self.level,
            line: self.line_at(source, node.span.start) + usize::from(code.fenced),
            node: node.clone(),
        };

        if segment.annotations.has(Flag::Setup) {
            let position = self.segments.len();
            self.segments.push(Segment::Setup(SetupSegment::new(segment)));
            if let Some(&heading) = self.heading_stack.last() {
                if let Some(Segment::Heading(marker)) = self.segments.get_mut(heading) {
                    marker.setups.push(position);
                }
            }
        } else {
            self.segments.push(Segment::Code(segment));
        }
    }

    fn push_display(&mut self, node: Node) {
        if self.display.is_none() {
            if self.last_was_code() {
                self.segments.push(Segment::Separator);
            }
            self.display = Some(Vec::new());
        }
        if let Some(nodes) = self.display.as_mut() {
            nodes.push(node);
        }
    }

    /// Annotations not followed by code stay with the prose around them.
    fn flush_pending(&mut self) {
        let pending: Vec<Node> = self.pending.drain(..).collect();
        for node in pending {
            self.push_display(node);
        }
    }

    fn close_display(&mut self) {
        if let Some(nodes) = self.display.take() {
            if !nodes.is_empty() {
                self.segments.push(Segment::Display(DisplaySegment {
                    nodes,
                    level: self.level,
                }));
            }
        }
    }

    fn record_inline_diagnostics(&mut self, node: &Node, source: &str) {
        let mut sets = Vec::new();
        collect_inline_annotations(node, &mut |set| sets.push(set.clone()));
        for set in sets {
            self.record_diagnostics(&set, source, node);
        }
    }

    fn line_at(&self, source: &str, offset: usize) -> usize {
        self.line_base + line_of_offset(source, offset)
    }

    fn last_was_code(&self) -> bool {
        self.segments.last().is_some_and(Segment::is_code)
    }

    fn record_diagnostics(&mut self, set: &AnnotationSet, source: &str, node: &Node) {
        let line = self.line_at(source, node.span.start);
        self.diagnostics.extend(
            set.diagnostics()
                .into_iter()
                .map(|diagnostic| SegmentDiagnostic { line, diagnostic }),
        );
    }
}

fn collect_inline_annotations(node: &Node, visit: &mut dyn FnMut(&AnnotationSet)) {
    for child in &node.children {
        if let NodeKind::AnnotationInline(annotation) = &child.kind {
            visit(&annotation.annotations);
        }
        collect_inline_annotations(child, visit);
    }
}

/// Text of a `desc`-flagged annotation inline, or its `desc=` parameter.
fn paragraph_description(paragraph: &Node) -> Option<String> {
    let found = paragraph.find(&|node| {
        node.annotation().is_some_and(|a| {
            !node.is_annotation_block()
                && (a.annotations.has(Flag::Desc) || a.annotations.param(Param::Desc).is_some())
        })
    })?;
    let annotation = found.annotation()?;
    if let Some(desc) = annotation.annotations.param(Param::Desc) {
        return Some(desc.to_string());
    }
    let text = found.plain_text().trim().to_string();
    (!text.is_empty()).then_some(text)
}
