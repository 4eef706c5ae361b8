use super::assets::{LineAsset, ListItem};
use super::cleaner::clean;
use super::dialect::Dialect;
use super::language::Direction;
use super::models::SegmentKind;
use super::segmenter::segment;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());

static SQL_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(CREATE|SELECT|INSERT|UPDATE|DELETE|TABLE|FROM|WHERE|JOIN|ALTER|DROP)\b")
        .unwrap()
});

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static JS_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(function|const|let|var|class|import|export|if|for|while)\b").unwrap()
});

static PROGRAMMING_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(def|class|import|from|return|if|elif|else|try|except|for|while|with)\b")
        .unwrap()
});

const FENCE_LABEL_MAX_CHARS: usize = 20;

/// A unit of display output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Always laid out left-to-right.
    Code {
        language: String,
        dialect: Dialect,
        code: String,
    },
    Text {
        kind: SegmentKind,
        direction: Direction,
        lines: Vec<LineAsset>,
    },
}

/// What a message offers beyond plain reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentFlags {
    pub has_code_blocks: bool,
    pub has_sql_keywords: bool,
    pub has_html_tags: bool,
    pub has_javascript: bool,
    pub has_programming_keywords: bool,
    pub has_visual_code: bool,
}

impl ContentFlags {
    pub fn detect(text: &str) -> Self {
        let has_html_tags = HTML_TAG.is_match(text);
        Self {
            has_code_blocks: text.contains("```"),
            has_sql_keywords: SQL_KEYWORDS.is_match(text),
            has_html_tags,
            has_javascript: JS_KEYWORDS.is_match(text),
            has_programming_keywords: PROGRAMMING_KEYWORDS.is_match(text),
            has_visual_code: has_html_tags || text.contains("className") || text.contains("style="),
        }
    }

    /// Whether a "copy code" action makes sense for the message.
    pub fn offers_code_copy(&self) -> bool {
        self.has_code_blocks || self.has_sql_keywords || self.has_programming_keywords
    }

    /// Whether the message holds markup worth previewing.
    pub fn offers_preview(&self) -> bool {
        self.has_html_tags
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedMessage {
    /// Cleaned text the blocks were built from; this is what "copy" copies.
    pub text: String,
    pub blocks: Vec<Block>,
    pub flags: ContentFlags,
}

/// Clean a raw payload and lay it out as display blocks.
pub fn render(raw: &str) -> RenderedMessage {
    render_text(&clean(raw))
}

/// Lay out already-cleaned text.
pub fn render_text(text: &str) -> RenderedMessage {
    let mut blocks = Vec::new();
    let mut last = 0;

    for fence in FENCED_BLOCK.find_iter(text) {
        blocks.extend(text_blocks(&text[last..fence.start()]));
        let (label, code) = split_fence(fence.as_str());
        blocks.push(Block::Code {
            language: label.unwrap_or("code").to_string(),
            dialect: label.map(Dialect::from_label).unwrap_or(Dialect::Generic),
            code,
        });
        last = fence.end();
    }
    blocks.extend(text_blocks(&text[last..]));

    RenderedMessage {
        text: text.to_string(),
        blocks,
        flags: ContentFlags::detect(text),
    }
}

fn text_blocks(part: &str) -> Vec<Block> {
    segment(part)
        .into_iter()
        .map(|seg| match seg.kind {
            SegmentKind::Code => Block::Code {
                language: "code".to_string(),
                dialect: seg.dialect.unwrap_or(Dialect::Generic),
                code: seg.text,
            },
            kind => {
                let direction = match kind {
                    SegmentKind::Hebrew => Direction::Rtl,
                    _ => Direction::of_paragraph(&seg.text),
                };
                Block::Text {
                    kind,
                    direction,
                    lines: seg.text.split('\n').map(LineAsset::classify).collect(),
                }
            }
        })
        .collect()
}

/// Split a fenced block into its language label, if the first line is one,
/// and the code body.
fn split_fence(fence: &str) -> (Option<&str>, String) {
    let inner = fence[3..fence.len() - 3].trim();
    let mut lines = inner.split('\n');
    let first = lines.next().unwrap_or_default();

    let is_label = !first.is_empty()
        && !first.contains(' ')
        && first.chars().count() < FENCE_LABEL_MAX_CHARS;

    if is_label {
        (Some(first), lines.collect::<Vec<_>>().join("\n"))
    } else {
        (None, inner.to_string())
    }
}

/// Code bodies of every fenced block, joined by a blank line. Falls back to
/// the whole text when there are no fences.
pub fn extract_code_for_copy(text: &str) -> String {
    let code = FENCED_BLOCK
        .find_iter(text)
        .map(|fence| split_fence(fence.as_str()).1)
        .collect::<Vec<_>>()
        .join("\n\n");

    if code.is_empty() {
        text.to_string()
    } else {
        code
    }
}

/// Terminal rendering. List markers go on the trailing side of
/// right-to-left lines.
pub fn render_plain(message: &RenderedMessage) -> String {
    let mut out: Vec<String> = Vec::new();

    for block in &message.blocks {
        match block {
            Block::Code { language, code, .. } => {
                out.push(format!("```{language}"));
                out.push(code.clone());
                out.push("```".to_string());
            }
            Block::Text { lines, .. } => {
                for line in lines {
                    out.extend(plain_line(line));
                }
            }
        }
        out.push(String::new());
    }

    out.join("\n").trim_end().to_string()
}

fn plain_line(line: &LineAsset) -> Vec<String> {
    match line {
        LineAsset::Image { image } => vec![format!("[image] {}", image.url)],
        LineAsset::Images { images } => images
            .iter()
            .map(|image| format!("[image] {}", image.url))
            .collect(),
        LineAsset::List { item } => {
            let (marker, text, direction) = match item {
                ListItem::Numbered {
                    marker,
                    text,
                    direction,
                } => (marker.as_str(), text, direction),
                ListItem::Bullet { text, direction } => ("•", text, direction),
            };
            match direction {
                Direction::Rtl => vec![format!("{text} {marker}")],
                Direction::Ltr => vec![format!("{marker} {text}")],
            }
        }
        LineAsset::Break => vec![String::new()],
        LineAsset::Plain { text, .. } => vec![text.clone()],
    }
}
