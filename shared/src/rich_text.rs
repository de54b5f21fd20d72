//! Escaping contract at the render boundary.
//!
//! Stage content is authored with a tiny markup subset (`<strong>`, `<em>`,
//! `<br>`). It is parsed into styled spans and re-emitted with every text run
//! escaped, so the shell can inject the HTML directly. Model replies are
//! Markdown; raw HTML inside them is shown as text, never interpreted.

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};
use serde::{Deserialize, Serialize};
use url::Url;

const SAFE_LINK_SCHEMES: &[&str] = &["http", "https", "mailto"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub strong: bool,
    pub emphasis: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichLine {
    pub spans: Vec<Span>,
}

impl RichLine {
    fn push(&mut self, text: &str, strong: bool, emphasis: bool) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.strong == strong && last.emphasis == emphasis => {
                last.text.push_str(text);
            }
            _ => self.spans.push(Span {
                text: text.to_string(),
                strong,
                emphasis,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    pub lines: Vec<RichLine>,
}

impl RichText {
    /// HTML containing only `<strong>`, `<em>` and `<br>` tags.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push_str("<br>");
            }
            for span in &line.spans {
                if span.strong {
                    out.push_str("<strong>");
                }
                if span.emphasis {
                    out.push_str("<em>");
                }
                out.push_str(&escape_html(&span.text));
                if span.emphasis {
                    out.push_str("</em>");
                }
                if span.strong {
                    out.push_str("</strong>");
                }
            }
        }
        out
    }

    #[must_use]
    pub fn plain_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.text.as_str()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone, Copy)]
enum MarkupTag {
    LineBreak,
    Strong { closing: bool },
    Emphasis { closing: bool },
    Other,
}

fn classify_tag(inner: &str) -> MarkupTag {
    let inner = inner.trim();
    let (closing, rest) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };
    let name: String = rest
        .trim_end_matches('/')
        .split(|c: char| c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match name.as_str() {
        "br" => MarkupTag::LineBreak,
        "strong" | "b" => MarkupTag::Strong { closing },
        "em" | "i" => MarkupTag::Emphasis { closing },
        _ => MarkupTag::Other,
    }
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "#39" | "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

/// Parse authored stage markup. Unknown tags are dropped, their text kept.
#[must_use]
pub fn parse_stage_markup(src: &str) -> RichText {
    let mut lines = vec![RichLine::default()];
    let mut strong_depth = 0u32;
    let mut em_depth = 0u32;
    let mut text = String::new();
    let mut rest = src;

    macro_rules! flush {
        () => {
            if let Some(line) = lines.last_mut() {
                line.push(&text, strong_depth > 0, em_depth > 0);
            }
            text.clear();
        };
    }

    while let Some(c) = rest.chars().next() {
        match c {
            '<' => {
                let Some(end) = rest.find('>') else {
                    text.push_str(rest);
                    break;
                };
                flush!();
                match classify_tag(&rest[1..end]) {
                    MarkupTag::LineBreak => lines.push(RichLine::default()),
                    MarkupTag::Strong { closing: false } => strong_depth += 1,
                    MarkupTag::Strong { closing: true } => {
                        strong_depth = strong_depth.saturating_sub(1);
                    }
                    MarkupTag::Emphasis { closing: false } => em_depth += 1,
                    MarkupTag::Emphasis { closing: true } => em_depth = em_depth.saturating_sub(1),
                    MarkupTag::Other => {}
                }
                rest = &rest[end + 1..];
            }
            '&' => {
                let decoded = rest
                    .find(';')
                    .filter(|&end| end <= 6)
                    .and_then(|end| decode_entity(&rest[1..end]).map(|ch| (ch, end)));
                match decoded {
                    Some((ch, end)) => {
                        text.push(ch);
                        rest = &rest[end + 1..];
                    }
                    None => {
                        text.push('&');
                        rest = &rest[1..];
                    }
                }
            }
            _ => {
                text.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    flush!();

    RichText { lines }
}

#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

#[must_use]
pub fn is_safe_link(dest: &str) -> bool {
    Url::parse(dest)
        .map(|u| SAFE_LINK_SCHEMES.contains(&u.scheme()))
        .unwrap_or(false)
}

fn safe_destination(dest: CowStr<'_>) -> CowStr<'_> {
    if is_safe_link(&dest) {
        dest
    } else {
        CowStr::Borrowed("")
    }
}

/// Render a Markdown reply to HTML that is safe to inject.
#[must_use]
pub fn render_markdown(src: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let events = Parser::new_ext(src, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_destination(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_destination(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(src.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}
