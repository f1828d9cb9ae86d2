//! Markdown scanning: outgoing references, heading anchors and plain text.
//!
//! Nothing is rendered here. The indexer needs just enough of each body to
//! validate links and feed the search index.

use crate::slug::AnchorSlugger;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// A link or image target as written in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawReference {
    pub target: String,
    /// 1-based line in the original file.
    pub line: usize,
    pub image: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    pub anchor: String,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentScan {
    pub references: Vec<RawReference>,
    pub headings: Vec<Heading>,
    /// Every anchor a fragment may point at: headings plus explicit HTML ids.
    pub anchors: BTreeSet<String>,
    pub text: String,
    pub word_count: usize,
}

impl DocumentScan {
    pub fn first_h1(&self) -> Option<&str> {
        self.headings
            .iter()
            .find(|h| h.level == 1)
            .map(|h| h.text.as_str())
    }
}

fn html_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\b(?:id|name)\s*=\s*["']([^"']+)["']"#).unwrap())
}

fn html_href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<a\s[^>]*\bhref\s*=\s*["']([^"']+)["']"#).unwrap())
}

fn truncate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--\s*truncate\s*-->|\{/\*\s*truncate\s*\*/\}").unwrap())
}

fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_HEADING_ATTRIBUTES);
    options
}

/// Byte offset of the `<!-- truncate -->` marker, if the body has one.
pub fn truncation_marker(body: &str) -> Option<usize> {
    truncate_regex().find(body).map(|m| m.start())
}

/// Scan a Markdown body. `line_offset` is the number of lines that precede
/// the body in its file (the front-matter block).
pub fn scan(body: &str, line_offset: usize) -> DocumentScan {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(body.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let line_of = |offset: usize| -> usize {
        let index = match line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        line_offset + index + 1
    };

    let mut scan = DocumentScan::default();
    let mut slugger = AnchorSlugger::new();
    let mut heading: Option<(u8, Option<String>, String)> = None;

    for (event, range) in Parser::new_ext(body, parser_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::Link { dest_url, .. }) => {
                push_reference(&mut scan, &dest_url, line_of(range.start), false);
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                push_reference(&mut scan, &dest_url, line_of(range.start), true);
            }
            Event::Start(Tag::Heading { level, id, .. }) => {
                heading = Some((level as u8, id.map(|id| id.to_string()), String::new()));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, explicit, text)) = heading.take() {
                    let text = text.trim().to_string();
                    let anchor = match explicit {
                        Some(id) => slugger.reserve(id),
                        None => slugger.slug(&text),
                    };
                    scan.anchors.insert(anchor.clone());
                    scan.headings.push(Heading {
                        level,
                        text: text.clone(),
                        anchor,
                    });
                }
                push_break(&mut scan.text);
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, _, title)) = heading.as_mut() {
                    title.push_str(&text);
                }
                scan.text.push_str(&text);
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                for captures in html_id_regex().captures_iter(&html) {
                    scan.anchors.insert(captures[1].to_string());
                }
                for captures in html_href_regex().captures_iter(&html) {
                    push_reference(&mut scan, &captures[1], line_of(range.start), false);
                }
            }
            Event::SoftBreak | Event::HardBreak => scan.text.push(' '),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock)
            | Event::End(TagEnd::TableCell) => push_break(&mut scan.text),
            _ => {}
        }
    }

    let trimmed = scan.text.trim_end().len();
    scan.text.truncate(trimmed);
    scan.word_count = scan.text.unicode_words().count();
    scan
}

fn push_reference(scan: &mut DocumentScan, target: &str, line: usize, image: bool) {
    let target = target.trim();
    if target.is_empty() {
        return;
    }
    scan.references.push(RawReference {
        target: target.to_string(),
        line,
        image,
    });
}

fn push_break(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}
