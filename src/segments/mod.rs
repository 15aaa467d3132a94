//! Linearised view of a document: the ordered segments the engine walks.
//!
//! Headings keep their setup blocks by index into the segment list and point
//! at their parent heading the same way, so the list owns every segment and
//! the heading tree is a set of non-owning lookups.

mod builder;
#[cfg(test)]
mod tests;

pub use builder::build;

use crate::annotation::{AnnotationDiagnostic, AnnotationSet};
use crate::markdown::Node;
use serde::Serialize;
use std::cell::Cell;

#[derive(Debug, Clone, Serialize)]
pub enum Segment {
    Display(DisplaySegment),
    Code(CodeSegment),
    Heading(HeadingMarker),
    Setup(SetupSegment),
    Separator,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisplaySegment {
    pub nodes: Vec<Node>,
    pub level: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeSegment {
    pub language: Option<String>,
    pub source: String,
    pub annotations: AnnotationSet,
    /// Level of the enclosing heading, 0 before the first heading.
    pub level: u8,
    /// 1-based document line of the first line of code.
    pub line: usize,
    pub node: Node,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeadingMarker {
    pub title: String,
    pub level: u8,
    pub short_code: Option<String>,
    pub description: Option<String>,
    /// Indices of the setup segments attached to this heading.
    pub setups: Vec<usize>,
    /// Index of the enclosing heading, always of a strictly lower level.
    pub parent: Option<usize>,
    pub node: Node,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupSegment {
    pub code: CodeSegment,
    has_run: Cell<bool>,
}

impl SetupSegment {
    pub fn new(code: CodeSegment) -> Self {
        Self {
            code,
            has_run: Cell::new(false),
        }
    }

    pub fn has_run(&self) -> bool {
        self.has_run.get()
    }

    pub fn mark_run(&self) {
        self.has_run.set(true);
    }
}

impl Segment {
    pub fn level(&self) -> Option<u8> {
        match self {
            Segment::Display(display) => Some(display.level),
            Segment::Code(code) => Some(code.level),
            Segment::Heading(heading) => Some(heading.level),
            Segment::Setup(setup) => Some(setup.code.level),
            Segment::Separator => None,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Segment::Code(_) | Segment::Setup(_))
    }
}

/// An annotation diagnostic with the document line it was found on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentDiagnostic {
    pub line: usize,
    pub diagnostic: AnnotationDiagnostic,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SegmentList {
    segments: Vec<Segment>,
    diagnostics: Vec<SegmentDiagnostic>,
}

impl SegmentList {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Segment> {
        self.segments.get(idx)
    }

    pub fn diagnostics(&self) -> &[SegmentDiagnostic] {
        &self.diagnostics
    }

    pub fn heading(&self, idx: usize) -> Option<&HeadingMarker> {
        match self.segments.get(idx) {
            Some(Segment::Heading(heading)) => Some(heading),
            _ => None,
        }
    }

    pub fn setup(&self, idx: usize) -> Option<&SetupSegment> {
        match self.segments.get(idx) {
            Some(Segment::Setup(setup)) => Some(setup),
            _ => None,
        }
    }

    /// Index of the heading whose short-code is `label`.
    pub fn find_short_code(&self, label: &str) -> Option<usize> {
        self.segments.iter().position(|segment| {
            matches!(segment, Segment::Heading(h) if h.short_code.as_deref() == Some(label))
        })
    }

    /// Headings enclosing `idx` (inclusive when `idx` is a heading), root first.
    pub fn heading_chain(&self, idx: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut cursor = if self.heading(idx).is_some() {
            Some(idx)
        } else {
            self.enclosing_heading(idx)
        };
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.heading(current).and_then(|h| h.parent);
        }
        chain.reverse();
        chain
    }

    /// The closest heading before `idx` whose level is below the segment's own.
    pub fn enclosing_heading(&self, idx: usize) -> Option<usize> {
        let level = self.segments.get(idx)?.level().unwrap_or(u8::MAX);
        self.segments[..idx.min(self.segments.len())]
            .iter()
            .enumerate()
            .rev()
            .find_map(|(pos, segment)| match segment {
                Segment::Heading(h) if h.level <= level => Some(pos),
                _ => None,
            })
    }

    /// First index after `from` holding a heading at `level` or above (numerically
    /// lower or equal), or the list length when none follows.
    pub fn next_heading_at_or_above(&self, from: usize, level: u8) -> usize {
        self.segments
            .iter()
            .enumerate()
            .skip(from + 1)
            .find_map(|(pos, segment)| match segment {
                Segment::Heading(h) if h.level <= level => Some(pos),
                _ => None,
            })
            .unwrap_or(self.segments.len())
    }
}
