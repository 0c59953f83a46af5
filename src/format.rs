//! Markdown-subset formatting for analysis text.
//!
//! Two renderings share one line grouping pass:
//!
//! - [`to_html`] is the plain substitution formatter: bold, italic, `#`–`###`
//!   headings, `- ` and `1. ` lists, paragraphs with `<br>` line breaks. It
//!   does **not** escape its input, so it must never be fed untrusted text
//!   that ends up in a browser.
//! - [`Document`] is a typed tree of the same constructs. Its
//!   [`Document::to_html`] escapes every text run, and the terminal UI draws
//!   from the tree directly.

use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").expect("italic pattern"));
static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+\. ").expect("numbered pattern"));

const BLOCK_TAGS: [&str; 4] = ["<h", "<ul", "<ol", "<p"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Unordered => "ul",
            ListKind::Ordered => "ol",
        }
    }
}

#[derive(Debug, PartialEq)]
enum LineKind<'a> {
    Blank,
    Heading(u8, &'a str),
    Item(ListKind, &'a str),
    Text(&'a str),
}

fn classify(line: &str) -> LineKind<'_> {
    if line.trim().is_empty() {
        return LineKind::Blank;
    }

    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if (1..=3).contains(&hashes) && line[hashes..].starts_with(' ') {
        return LineKind::Heading(hashes as u8, &line[hashes + 1..]);
    }

    if let Some(rest) = line.strip_prefix("- ") {
        return LineKind::Item(ListKind::Unordered, rest);
    }

    if let Some(m) = NUMBERED.find(line) {
        return LineKind::Item(ListKind::Ordered, &line[m.end()..]);
    }

    LineKind::Text(line)
}

#[derive(Debug, PartialEq)]
enum RawBlock<'a> {
    Heading(u8, &'a str),
    List(ListKind, Vec<&'a str>),
    Paragraph(Vec<&'a str>),
}

/// Group lines into headings, list runs and blank-line separated paragraphs.
/// A list run ends at a blank line, a non-list line or a change of list kind.
fn group_blocks(text: &str) -> Vec<RawBlock<'_>> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut list: Option<(ListKind, Vec<&str>)> = None;

    fn flush_paragraph<'a>(blocks: &mut Vec<RawBlock<'a>>, paragraph: &mut Vec<&'a str>) {
        if !paragraph.is_empty() {
            blocks.push(RawBlock::Paragraph(std::mem::take(paragraph)));
        }
    }

    fn flush_list<'a>(blocks: &mut Vec<RawBlock<'a>>, list: &mut Option<(ListKind, Vec<&'a str>)>) {
        if let Some((kind, items)) = list.take() {
            blocks.push(RawBlock::List(kind, items));
        }
    }

    for line in text.lines() {
        match classify(line) {
            LineKind::Blank => {
                flush_list(&mut blocks, &mut list);
                flush_paragraph(&mut blocks, &mut paragraph);
            }
            LineKind::Heading(level, content) => {
                flush_list(&mut blocks, &mut list);
                flush_paragraph(&mut blocks, &mut paragraph);
                blocks.push(RawBlock::Heading(level, content));
            }
            LineKind::Item(kind, content) => {
                flush_paragraph(&mut blocks, &mut paragraph);
                let continues_run = matches!(&list, Some((open, _)) if *open == kind);
                if continues_run {
                    if let Some((_, items)) = list.as_mut() {
                        items.push(content);
                    }
                } else {
                    flush_list(&mut blocks, &mut list);
                    list = Some((kind, vec![content]));
                }
            }
            LineKind::Text(content) => {
                flush_list(&mut blocks, &mut list);
                paragraph.push(content);
            }
        }
    }
    flush_list(&mut blocks, &mut list);
    flush_paragraph(&mut blocks, &mut paragraph);

    blocks
}

fn inline_html(text: &str) -> String {
    let bold = BOLD.replace_all(text, "<strong>$1</strong>");
    ITALIC.replace_all(&bold, "<em>$1</em>").into_owned()
}

fn starts_with_block_tag(text: &str) -> bool {
    let trimmed = text.trim_start();
    BLOCK_TAGS.iter().any(|tag| trimmed.starts_with(tag))
}

/// Convert analysis markdown into an HTML string without escaping.
///
/// Blocks that already start with a heading, list or paragraph tag are passed
/// through, so formatting the output a second time leaves it unchanged.
pub fn to_html(text: &str) -> String {
    group_blocks(text)
        .into_iter()
        .map(|block| match block {
            RawBlock::Heading(level, content) => {
                format!("<h{level}>{}</h{level}>", inline_html(content))
            }
            RawBlock::List(kind, items) => {
                let items: String = items
                    .iter()
                    .map(|item| format!("<li>{}</li>", inline_html(item)))
                    .collect();
                format!("<{tag}>{items}</{tag}>", tag = kind.tag())
            }
            RawBlock::Paragraph(lines) => {
                if starts_with_block_tag(lines[0]) {
                    lines.join("\n")
                } else {
                    let lines: Vec<String> = lines.iter().map(|l| inline_html(l)).collect();
                    format!("<p>{}</p>", lines.join("<br>"))
                }
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inline run inside a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Strong(String),
    Emphasis(String),
}

impl Inline {
    pub fn text(&self) -> &str {
        match self {
            Inline::Text(s) | Inline::Strong(s) | Inline::Emphasis(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, content: Vec<Inline> },
    List { ordered: bool, items: Vec<Vec<Inline>> },
    /// One entry per source line; lines are joined by hard breaks
    Paragraph(Vec<Vec<Inline>>),
}

/// Typed form of the formatter's markdown subset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    pub fn parse(text: &str) -> Self {
        let blocks = group_blocks(text)
            .into_iter()
            .map(|block| match block {
                RawBlock::Heading(level, content) => Block::Heading {
                    level,
                    content: parse_inline(content),
                },
                RawBlock::List(kind, items) => Block::List {
                    ordered: kind == ListKind::Ordered,
                    items: items.into_iter().map(parse_inline).collect(),
                },
                RawBlock::Paragraph(lines) => {
                    Block::Paragraph(lines.into_iter().map(parse_inline).collect())
                }
            })
            .collect();

        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Render through an escaping serializer
    pub fn to_html(&self) -> String {
        self.blocks
            .iter()
            .map(|block| match block {
                Block::Heading { level, content } => {
                    format!("<h{level}>{}</h{level}>", inlines_to_html(content))
                }
                Block::List { ordered, items } => {
                    let tag = if *ordered { "ol" } else { "ul" };
                    let items: String = items
                        .iter()
                        .map(|item| format!("<li>{}</li>", inlines_to_html(item)))
                        .collect();
                    format!("<{tag}>{items}</{tag}>")
                }
                Block::Paragraph(lines) => {
                    let lines: Vec<String> = lines.iter().map(|l| inlines_to_html(l)).collect();
                    format!("<p>{}</p>", lines.join("<br>"))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Split a line into plain, `**strong**` and `*emphasis*` runs.
/// Unclosed markers are kept as literal text.
fn parse_inline(line: &str) -> Vec<Inline> {
    let mut runs = Vec::new();
    let mut plain = String::new();
    let mut rest = line;

    while let Some(star) = rest.find('*') {
        plain.push_str(&rest[..star]);
        let after = &rest[star..];

        let (marker, ctor): (&str, fn(String) -> Inline) = if after.starts_with("**") {
            ("**", Inline::Strong)
        } else {
            ("*", Inline::Emphasis)
        };

        let body = &after[marker.len()..];
        match body.find(marker) {
            Some(end) if end > 0 => {
                if !plain.is_empty() {
                    runs.push(Inline::Text(std::mem::take(&mut plain)));
                }
                runs.push(ctor(body[..end].to_string()));
                rest = &body[end + marker.len()..];
            }
            _ => {
                plain.push_str(marker);
                rest = body;
            }
        }
    }
    plain.push_str(rest);

    if !plain.is_empty() {
        runs.push(Inline::Text(plain));
    }
    runs
}

fn inlines_to_html(runs: &[Inline]) -> String {
    runs.iter()
        .map(|run| match run {
            Inline::Text(s) => escape_html(s),
            Inline::Strong(s) => format!("<strong>{}</strong>", escape_html(s)),
            Inline::Emphasis(s) => format!("<em>{}</em>", escape_html(s)),
        })
        .collect()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
