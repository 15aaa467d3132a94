use crossterm::style::{Attribute, Color, SetAttribute, SetForegroundColor};
use crossterm::QueueableCommand;
use std::io::{self, Write};

/// One layer of the style stack; layers combine with later colours winning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Style {
    pub fg: Option<Color>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub faint: bool,
    pub strike: bool,
}

impl Style {
    pub const fn plain() -> Self {
        Self {
            fg: None,
            bold: false,
            italic: false,
            underline: false,
            faint: false,
            strike: false,
        }
    }

    pub const fn fg(mut self, color: Color) -> Self {
        self.fg = Some(color);
        self
    }

    pub const fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub const fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub const fn underline(mut self) -> Self {
        self.underline = true;
        self
    }

    pub const fn faint(mut self) -> Self {
        self.faint = true;
        self
    }

    pub const fn strike(mut self) -> Self {
        self.strike = true;
        self
    }

    fn combine(self, layer: Style) -> Style {
        Style {
            fg: layer.fg.or(self.fg),
            bold: self.bold || layer.bold,
            italic: self.italic || layer.italic,
            underline: self.underline || layer.underline,
            faint: self.faint || layer.faint,
            strike: self.strike || layer.strike,
        }
    }

    /// Reset, then emit this style's attributes.
    pub fn apply(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut buf = Vec::new();
        buf.queue(SetAttribute(Attribute::Reset))?;
        if let Some(color) = self.fg {
            buf.queue(SetForegroundColor(color))?;
        }
        let flags = [
            (self.bold, Attribute::Bold),
            (self.italic, Attribute::Italic),
            (self.underline, Attribute::Underlined),
            (self.faint, Attribute::Dim),
            (self.strike, Attribute::CrossedOut),
        ];
        for (enabled, attribute) in flags {
            if enabled {
                buf.queue(SetAttribute(attribute))?;
            }
        }
        out.write_all(&buf)
    }
}

pub const HEADING_1: Style = Style::plain().fg(Color::Magenta).bold().underline();
pub const HEADING_2: Style = Style::plain().fg(Color::Cyan).bold();
pub const HEADING_3: Style = Style::plain().fg(Color::Blue).bold();
pub const HEADING_N: Style = Style::plain().bold();
pub const EMPHASIS: Style = Style::plain().italic();
pub const STRONG: Style = Style::plain().bold();
pub const STRIKE: Style = Style::plain().strike();
pub const INLINE_CODE: Style = Style::plain().fg(Color::Yellow);
pub const LINK: Style = Style::plain().fg(Color::Blue).underline();
pub const FAINT: Style = Style::plain().faint();
pub const QUOTE: Style = Style::plain().italic().faint();

pub fn heading(level: u8) -> Style {
    match level {
        1 => HEADING_1,
        2 => HEADING_2,
        3 => HEADING_3,
        _ => HEADING_N,
    }
}

/// Stack of active styles; pushing or popping re-emits the combined style.
#[derive(Debug, Default)]
pub struct StyleStack {
    layers: Vec<Style>,
    enabled: bool,
}

impl StyleStack {
    pub fn new(enabled: bool) -> Self {
        Self {
            layers: Vec::new(),
            enabled,
        }
    }

    pub fn current(&self) -> Style {
        self.layers
            .iter()
            .fold(Style::plain(), |acc, layer| acc.combine(*layer))
    }

    pub fn push(&mut self, style: Style, out: &mut dyn Write) -> io::Result<()> {
        self.layers.push(style);
        self.emit(out)
    }

    pub fn pop(&mut self, out: &mut dyn Write) -> io::Result<()> {
        self.layers.pop();
        self.emit(out)
    }

    fn emit(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.enabled {
            self.current().apply(out)?;
        }
        Ok(())
    }
}
