//! Markdown front end: CommonMark via pulldown-cmark, plus annotation blocks,
//! annotation inlines and invisible blocks.

mod ast;
mod extensions;
mod tree;


pub use ast::{AnnotationNode, CodeBlock, Node, NodeKind};

/// Parse a document into an owned tree with the runnable extensions applied.
pub fn parse(source: &str) -> Node {
    let mut root = tree::build(source);
    extensions::apply(&mut root);
    root
}

/// 1-based line of a byte offset within `source`.
pub fn line_of_offset(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}
