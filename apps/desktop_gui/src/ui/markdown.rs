//! Markdown rendering for the story pane.

use eframe::egui::{self, text::LayoutJob, Color32, FontId, TextFormat};
use pulldown_cmark::{Event as MarkdownEvent, HeadingLevel, Options, Parser, Tag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    ListItem { marker: String, depth: usize },
    Quote,
    Code,
    Rule,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub strong: bool,
    pub emphasis: bool,
    pub code: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub spans: Vec<Span>,
}

impl Block {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            spans: Vec::new(),
        }
    }

    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }
}

#[derive(Default)]
struct BlockBuilder {
    blocks: Vec<Block>,
    current: Option<Block>,
    lists: Vec<Option<u64>>,
    strong: usize,
    emphasis: usize,
    quote_depth: usize,
}

impl BlockBuilder {
    fn begin(&mut self, kind: BlockKind) {
        self.flush();
        self.current = Some(Block::new(kind));
    }

    fn flush(&mut self) {
        if let Some(block) = self.current.take() {
            if !block.spans.is_empty() {
                self.blocks.push(block);
            }
        }
    }

    fn paragraph_kind(&self) -> BlockKind {
        if self.quote_depth > 0 {
            BlockKind::Quote
        } else {
            BlockKind::Paragraph
        }
    }

    fn push_text(&mut self, text: &str, code: bool) {
        if text.is_empty() {
            return;
        }
        if self.current.is_none() {
            let kind = self.paragraph_kind();
            self.current = Some(Block::new(kind));
        }
        let strong = self.strong > 0;
        let emphasis = self.emphasis > 0;
        let Some(block) = self.current.as_mut() else {
            return;
        };
        match block.spans.last_mut() {
            Some(last) if last.strong == strong && last.emphasis == emphasis && last.code == code => {
                last.text.push_str(text);
            }
            _ => block.spans.push(Span {
                text: text.to_string(),
                strong,
                emphasis,
                code,
            }),
        }
    }

    fn next_marker(&mut self) -> String {
        match self.lists.last_mut() {
            Some(Some(next)) => {
                let marker = format!("{next}.");
                *next += 1;
                marker
            }
            _ => "•".to_string(),
        }
    }

    fn in_code_block(&self) -> bool {
        matches!(self.current.as_ref().map(|block| &block.kind), Some(BlockKind::Code))
    }
}

fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Parses the accumulated story into display blocks. Partial markdown from a live stream is fine.
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let mut md_options = Options::empty();
    md_options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, md_options);
    let mut builder = BlockBuilder::default();

    for event in parser {
        match event {
            MarkdownEvent::Start(tag) => match tag {
                Tag::Heading(level, _, _) => builder.begin(BlockKind::Heading(heading_depth(level))),
                Tag::Paragraph => {
                    let in_fresh_item = matches!(
                        builder.current.as_ref(),
                        Some(Block { kind: BlockKind::ListItem { .. }, spans }) if spans.is_empty()
                    );
                    if !in_fresh_item {
                        let kind = builder.paragraph_kind();
                        builder.begin(kind);
                    }
                }
                Tag::List(start) => {
                    builder.flush();
                    builder.lists.push(start);
                }
                Tag::Item => {
                    let marker = builder.next_marker();
                    let depth = builder.lists.len().saturating_sub(1);
                    builder.begin(BlockKind::ListItem { marker, depth });
                }
                Tag::BlockQuote => {
                    builder.flush();
                    builder.quote_depth += 1;
                }
                Tag::CodeBlock(_) => builder.begin(BlockKind::Code),
                Tag::Strong => builder.strong += 1,
                Tag::Emphasis => builder.emphasis += 1,
                _ => {}
            },
            MarkdownEvent::End(tag) => match tag {
                Tag::Heading(..) | Tag::Paragraph | Tag::Item | Tag::CodeBlock(_) => builder.flush(),
                Tag::List(_) => {
                    builder.flush();
                    builder.lists.pop();
                }
                Tag::BlockQuote => {
                    builder.flush();
                    builder.quote_depth = builder.quote_depth.saturating_sub(1);
                }
                Tag::Strong => builder.strong = builder.strong.saturating_sub(1),
                Tag::Emphasis => builder.emphasis = builder.emphasis.saturating_sub(1),
                _ => {}
            },
            MarkdownEvent::Text(text) => {
                let code = builder.in_code_block();
                builder.push_text(&text, code);
            }
            MarkdownEvent::Code(code) => builder.push_text(&code, true),
            MarkdownEvent::Html(html) => builder.push_text(&html, false),
            MarkdownEvent::SoftBreak | MarkdownEvent::HardBreak => builder.push_text("\n", false),
            MarkdownEvent::Rule => {
                builder.flush();
                builder.blocks.push(Block::new(BlockKind::Rule));
            }
            _ => {}
        }
    }
    builder.flush();
    builder.blocks
}

fn font_size(kind: &BlockKind) -> f32 {
    match kind {
        BlockKind::Heading(1) => 28.0,
        BlockKind::Heading(2) => 21.0,
        BlockKind::Heading(_) => 18.0,
        BlockKind::Code => 14.0,
        _ => 16.0,
    }
}

fn layout_block(block: &Block, visuals: &egui::Visuals, max_width: f32) -> LayoutJob {
    let mut job = LayoutJob::default();
    job.wrap.max_width = max_width;
    let size = font_size(&block.kind);
    let heading = matches!(block.kind, BlockKind::Heading(_));
    let base_color = match block.kind {
        BlockKind::Quote => visuals.weak_text_color(),
        _ if heading => visuals.strong_text_color(),
        _ => visuals.text_color(),
    };

    if let BlockKind::ListItem { marker, depth } = &block.kind {
        let indent = "    ".repeat(*depth);
        job.append(
            &format!("{indent}{marker} "),
            0.0,
            TextFormat {
                font_id: FontId::proportional(size),
                color: visuals.weak_text_color(),
                ..Default::default()
            },
        );
    }

    for span in &block.spans {
        let font_id = if span.code {
            FontId::monospace(size - 1.0)
        } else {
            FontId::proportional(size)
        };
        let color = if span.strong {
            visuals.strong_text_color()
        } else {
            base_color
        };
        let background = if span.code {
            visuals.code_bg_color
        } else {
            Color32::TRANSPARENT
        };
        job.append(
            &span.text,
            0.0,
            TextFormat {
                font_id,
                color,
                background,
                italics: span.emphasis || block.kind == BlockKind::Quote,
                line_height: Some(size * 1.7),
                ..Default::default()
            },
        );
    }
    job
}

pub fn show_blocks(ui: &mut egui::Ui, blocks: &[Block]) {
    let max_width = ui.available_width();
    for block in blocks {
        match &block.kind {
            BlockKind::Rule => {
                ui.separator();
            }
            BlockKind::Code => {
                egui::Frame::group(ui.style())
                    .fill(ui.visuals().code_bg_color)
                    .show(ui, |ui| {
                        ui.label(layout_block(block, ui.visuals(), max_width - 16.0));
                    });
            }
            BlockKind::Heading(level) => {
                ui.add_space(if *level <= 2 { 14.0 } else { 8.0 });
                ui.label(layout_block(block, ui.visuals(), max_width));
                ui.add_space(6.0);
            }
            _ => {
                ui.label(layout_block(block, ui.visuals(), max_width));
                ui.add_space(8.0);
            }
        }
    }
}
