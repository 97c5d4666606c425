//! HTML → Markdown transduction.
//!
//! ## Why rewrite passes instead of a DOM?
//!
//! Archived pages are frequently malformed (unclosed tags, stray closers,
//! vendor markup). A sequence of tolerant pattern rewrites degrades one
//! construct at a time instead of failing the whole document, and every pass
//! is a pure `&str → String` function that can be tested on its own.
//!
//! ## Pass Order
//!
//! ```text
//! clean ─▶ headings ─▶ blocks ─▶ inline ─▶ lists ─▶ tables ─▶ links
//!       ─▶ strip_tags ─▶ entities ─▶ normalize
//! ```
//!
//! Block passes insert the newlines that later passes and the normalizer rely
//! on; inline formatting runs before tables so cell text arrives already
//! converted; entities are decoded only after the last tag is gone so that
//! `&lt;b&gt;` in the text never turns into markup.
//!
//! When `enhanced_markdown` is off the structural passes are replaced by the
//! generic `html2md` converter plus a light whitespace cleanup. If a pass
//! panics, the document falls back to plain text extraction.

use crate::error::TransductionError;
use crate::pipeline::{postprocess, table};
use crate::trace::TraceLog;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Flags for [`html_to_markdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownOptions {
    /// Structure-aware pipeline (true) or generic converter (false).
    pub enhanced_markdown: bool,
    /// Trace every pass with its input and output length.
    pub debug_mode: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            enhanced_markdown: true,
            debug_mode: false,
        }
    }
}

/// Which weaker strategy produced the Markdown, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkdownFallback {
    /// The enhanced pipeline produced nothing; the generic converter ran.
    Generic,
    /// A pass failed; tags were stripped and text extracted.
    PlainText { error: TransductionError },
}

/// Result of [`html_to_markdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownResult {
    pub markdown: String,
    pub fallback: Option<MarkdownFallback>,
}

type Pass = fn(&str) -> String;

/// The enhanced pipeline. Order matters; see the module docs.
const PASSES: &[(&str, Pass)] = &[
    ("clean", clean_html),
    ("headings", convert_headings),
    ("blocks", convert_blocks),
    ("inline", convert_inline),
    ("lists", convert_lists),
    ("tables", convert_tables),
    ("links", convert_links_and_images),
    ("strip_tags", strip_tags),
    ("entities", decode_entities),
    ("normalize", postprocess::normalize),
];

/// Convert assembled HTML to Markdown. Never fails; see [`MarkdownFallback`].
pub fn html_to_markdown(html: &str, options: MarkdownOptions, trace: &mut TraceLog) -> MarkdownResult {
    let attempt = if options.enhanced_markdown {
        run_passes(html, PASSES, options.debug_mode, trace)
    } else {
        generic_markdown(html, options.debug_mode, trace)
    };

    match attempt {
        Ok(markdown) if options.enhanced_markdown && markdown.trim().is_empty() && !html.trim().is_empty() => {
            trace.push("Enhanced conversion produced no text, using generic converter");
            match generic_markdown(html, options.debug_mode, trace) {
                Ok(markdown) => MarkdownResult {
                    markdown,
                    fallback: Some(MarkdownFallback::Generic),
                },
                Err(error) => plain_text_fallback(html, error, trace),
            }
        }
        Ok(markdown) => {
            debug!("Markdown conversion produced {} chars", markdown.len());
            MarkdownResult {
                markdown,
                fallback: None,
            }
        }
        Err(error) => plain_text_fallback(html, error, trace),
    }
}

fn plain_text_fallback(html: &str, error: TransductionError, trace: &mut TraceLog) -> MarkdownResult {
    warn!("{}; falling back to plain text", error);
    trace.push(format!("{error}; falling back to plain text"));
    MarkdownResult {
        markdown: extract_plain_text(html),
        fallback: Some(MarkdownFallback::PlainText { error }),
    }
}

/// Run `passes` in order, each guarded against panics.
fn run_passes(
    html: &str,
    passes: &[(&str, Pass)],
    debug_mode: bool,
    trace: &mut TraceLog,
) -> Result<String, TransductionError> {
    let mut current = html.to_string();
    for (name, pass) in passes {
        let next = guarded(name, || pass(&current))?;
        if debug_mode {
            trace.push(format!(
                "Pass {name}: {} → {} chars",
                current.len(),
                next.len()
            ));
        }
        current = next;
    }
    Ok(current)
}

thread_local! {
    static IN_GUARDED_PASS: Cell<bool> = const { Cell::new(false) };
}

/// True while the current thread is running a rewrite pass whose panic will
/// be caught and turned into a plain-text fallback.
///
/// The default panic hook still prints such panics to stderr; a binary can
/// install its own hook and stay quiet when this returns true.
pub fn panic_is_recovered() -> bool {
    IN_GUARDED_PASS.with(Cell::get)
}

fn guarded(name: &str, f: impl FnOnce() -> String) -> Result<String, TransductionError> {
    let outer = IN_GUARDED_PASS.with(|flag| flag.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    IN_GUARDED_PASS.with(|flag| flag.set(outer));

    result.map_err(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string());
        TransductionError::PassFailed {
            pass: name.to_string(),
            detail,
        }
    })
}

// ── Generic conversion ───────────────────────────────────────────────────

static RE_MANY_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_HSPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

fn generic_markdown(html: &str, debug_mode: bool, trace: &mut TraceLog) -> Result<String, TransductionError> {
    let passes: &[(&str, Pass)] = &[
        ("clean", clean_html),
        ("html2md", html2md_pass),
        ("light_cleanup", light_cleanup),
    ];
    run_passes(html, passes, debug_mode, trace)
}

fn html2md_pass(html: &str) -> String {
    html2md::parse_html(html)
}

/// Collapse 3+ newlines to 2 and horizontal whitespace runs to one space, then trim.
pub fn light_cleanup(markdown: &str) -> String {
    let s = markdown.replace("\r\n", "\n");
    let s = RE_MANY_NEWLINES.replace_all(&s, "\n\n");
    let s = RE_HSPACE.replace_all(&s, " ");
    s.trim().to_string()
}

/// Last-resort text extraction: no markup, entities decoded, whitespace collapsed.
pub fn extract_plain_text(html: &str) -> String {
    let s = remove_non_content(html);
    let s = strip_tags(&s);
    let s = decode_entities(&s);
    RE_WHITESPACE.replace_all(&s, " ").trim().to_string()
}

// ── Pass 1: Clean ────────────────────────────────────────────────────────

static RE_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());
static RE_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").unwrap());
static RE_HEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<head\b[^>]*>.*?</head\s*>").unwrap());
static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_OPEN_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[A-Za-z][A-Za-z0-9]*\b[^>]*>").unwrap());
static RE_PRESENTATION_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\s(?:class|id|style|on[a-z]+|width|height|border|cellpadding|cellspacing|align|valign|bgcolor)\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#,
    )
    .unwrap()
});
static RE_PRE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<pre\b.*?</pre\s*>").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Drop scripts, styles, comments and the document head.
fn remove_non_content(html: &str) -> String {
    let s = RE_COMMENT.replace_all(html, "");
    let s = RE_SCRIPT.replace_all(&s, "");
    let s = RE_STYLE.replace_all(&s, "");
    RE_HEAD.replace_all(&s, "").into_owned()
}

/// Remove non-content elements and presentational attributes, then collapse
/// whitespace runs to one space everywhere except inside `<pre>`.
pub fn clean_html(html: &str) -> String {
    let s = remove_non_content(html);
    let s = RE_OPEN_TAG.replace_all(&s, |caps: &Captures<'_>| {
        RE_PRESENTATION_ATTR.replace_all(&caps[0], "").into_owned()
    });

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for pre in RE_PRE_BLOCK.find_iter(&s) {
        out.push_str(&RE_WHITESPACE.replace_all(&s[last..pre.start()], " "));
        out.push_str(pre.as_str());
        last = pre.end();
    }
    out.push_str(&RE_WHITESPACE.replace_all(&s[last..], " "));
    out
}

// ── Pass 2: Headings ─────────────────────────────────────────────────────

/// `(level, regex)` from h6 down to h1.
static RE_HEADINGS: Lazy<Vec<(usize, Regex)>> = Lazy::new(|| {
    (1..=6)
        .rev()
        .map(|n| {
            let re = Regex::new(&format!(r"(?is)<h{n}\b[^>]*>(.*?)</h{n}\s*>")).unwrap();
            (n, re)
        })
        .collect()
});

pub fn convert_headings(html: &str) -> String {
    let mut s = html.to_string();
    for (level, re) in RE_HEADINGS.iter() {
        s = re
            .replace_all(&s, |caps: &Captures<'_>| {
                format!("{} {}\n\n", "#".repeat(*level), caps[1].trim())
            })
            .into_owned();
    }
    s
}

// ── Pass 3: Blocks ───────────────────────────────────────────────────────

static RE_P: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").unwrap());
static RE_DIV: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<div\b[^>]*>(.*?)</div\s*>").unwrap());
static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\b[^>]*>").unwrap());
static RE_HR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<hr\b[^>]*>").unwrap());
static RE_BLOCKQUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<blockquote\b[^>]*>(.*?)</blockquote\s*>").unwrap());

/// Nested `<div>`s are unwound one level per round.
const MAX_DIV_ROUNDS: usize = 32;

pub fn convert_blocks(html: &str) -> String {
    let block = |caps: &Captures<'_>| format!("{}\n\n", caps[1].trim());

    let mut s = RE_P.replace_all(html, block).into_owned();
    for _ in 0..MAX_DIV_ROUNDS {
        if !RE_DIV.is_match(&s) {
            break;
        }
        s = RE_DIV.replace_all(&s, block).into_owned();
    }
    let s = RE_BR.replace_all(&s, "\n");
    let s = RE_HR.replace_all(&s, "\n---\n");
    RE_BLOCKQUOTE
        .replace_all(&s, |caps: &Captures<'_>| {
            let quoted: Vec<String> = caps[1]
                .trim()
                .lines()
                .map(|line| match line.trim() {
                    "" => ">".to_string(),
                    text => format!("> {text}"),
                })
                .collect();
            format!("{}\n\n", quoted.join("\n"))
        })
        .into_owned()
}

// ── Pass 4: Inline ───────────────────────────────────────────────────────

static RE_PRE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<pre\b[^>]*>(.*?)</pre\s*>").unwrap());
static RE_CODE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?code\b[^>]*>").unwrap());
static RE_STRONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<strong\b[^>]*>(.*?)</strong\s*>").unwrap());
static RE_B: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<b\b[^>]*>(.*?)</b\s*>").unwrap());
static RE_EM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<em\b[^>]*>(.*?)</em\s*>").unwrap());
static RE_I: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<i\b[^>]*>(.*?)</i\s*>").unwrap());
static RE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<code\b[^>]*>(.*?)</code\s*>").unwrap());

/// Wrap trimmed content in `marker`, keeping surrounding whitespace outside.
/// Blank content is returned unwrapped.
fn wrap(content: &str, marker: &str) -> String {
    let inner = content.trim();
    if inner.is_empty() {
        return content.to_string();
    }
    let lead = &content[..content.len() - content.trim_start().len()];
    let trail = &content[content.trim_end().len()..];
    format!("{lead}{marker}{inner}{marker}{trail}")
}

/// Emphasis, code and preformatted blocks.
pub fn convert_inline(html: &str) -> String {
    let s = RE_PRE.replace_all(html, |caps: &Captures<'_>| {
        let body = RE_CODE_TAG.replace_all(&caps[1], "");
        let body = body.trim_matches(|c| c == '\n' || c == '\r');
        if body.trim().is_empty() {
            String::new()
        } else {
            format!("\n```\n{body}\n```\n")
        }
    });
    let s = RE_STRONG.replace_all(&s, |c: &Captures<'_>| wrap(&c[1], "**"));
    let s = RE_B.replace_all(&s, |c: &Captures<'_>| wrap(&c[1], "**"));
    let s = RE_EM.replace_all(&s, |c: &Captures<'_>| wrap(&c[1], "*"));
    let s = RE_I.replace_all(&s, |c: &Captures<'_>| wrap(&c[1], "*"));
    RE_CODE
        .replace_all(&s, |c: &Captures<'_>| wrap(&c[1], "`"))
        .into_owned()
}

// ── Pass 5: Lists ────────────────────────────────────────────────────────

static RE_OL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<ol\b[^>]*>(.*?)</ol\s*>").unwrap());
static RE_LI: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<li\b[^>]*>(.*?)</li\s*>").unwrap());
static RE_LIST_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?(?:ul|ol)\b[^>]*>").unwrap());

/// Flat lists: ordered items are numbered within their `<ol>`, every other
/// item becomes a `- ` bullet.
pub fn convert_lists(html: &str) -> String {
    let s = RE_OL.replace_all(html, |caps: &Captures<'_>| {
        let mut n = 0;
        let items = RE_LI.replace_all(&caps[1], |li: &Captures<'_>| {
            n += 1;
            format!("{n}. {}\n", li[1].trim())
        });
        format!("\n{items}\n")
    });
    let s = RE_LI.replace_all(&s, |li: &Captures<'_>| format!("- {}\n", li[1].trim()));
    RE_LIST_TAG.replace_all(&s, "\n").into_owned()
}

// ── Pass 6: Tables ───────────────────────────────────────────────────────

static RE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table\b[^>]*>(.*?)</table\s*>").unwrap());

pub fn convert_tables(html: &str) -> String {
    RE_TABLE
        .replace_all(html, |caps: &Captures<'_>| {
            table::reconstruct(&caps[1], table::CellText::Escaped).0
        })
        .into_owned()
}

// ── Pass 7: Links and images ─────────────────────────────────────────────

static RE_IMG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
static RE_A: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").unwrap());
static RE_ATTR_SRC: Lazy<Regex> = Lazy::new(|| attr_regex("src"));
static RE_ATTR_ALT: Lazy<Regex> = Lazy::new(|| attr_regex("alt"));
static RE_ATTR_HREF: Lazy<Regex> = Lazy::new(|| attr_regex("href"));

fn attr_regex(name: &str) -> Regex {
    Regex::new(&format!(
        r#"(?is)(?:^|[\s<]){name}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#
    ))
    .unwrap()
}

/// Value of an attribute inside a tag's text.
fn attr(re: &Regex, tag: &str) -> Option<String> {
    let caps = re.captures(tag)?;
    (1..caps.len())
        .find_map(|i| caps.get(i))
        .map(|m| m.as_str().trim().to_string())
}

pub fn convert_links_and_images(html: &str) -> String {
    let s = RE_IMG.replace_all(html, |caps: &Captures<'_>| {
        let tag = &caps[0];
        match attr(&RE_ATTR_SRC, tag) {
            Some(src) if !src.is_empty() => {
                let alt = attr(&RE_ATTR_ALT, tag).unwrap_or_default();
                format!("![{alt}]({src})")
            }
            _ => String::new(),
        }
    });
    RE_A.replace_all(&s, |caps: &Captures<'_>| {
        let text = caps[2].trim();
        match attr(&RE_ATTR_HREF, &caps[1]) {
            Some(href) if !href.is_empty() => {
                let label = if text.is_empty() { href.as_str() } else { text };
                format!("[{label}]({href})")
            }
            _ => text.to_string(),
        }
    })
    .into_owned()
}

// ── Pass 8: Strip remaining tags ─────────────────────────────────────────

static RE_ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

pub fn strip_tags(html: &str) -> String {
    RE_ANY_TAG.replace_all(html, "").into_owned()
}

// ── Pass 9: Entities ─────────────────────────────────────────────────────

/// Decode character references. Non-breaking spaces become plain spaces.
pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).replace('\u{a0}', " ")
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn enhanced(html: &str) -> MarkdownResult {
        html_to_markdown(html, MarkdownOptions::default(), &mut TraceLog::new())
    }

    #[test]
    fn heading_and_bold_paragraph() {
        let out = enhanced("<h1>Hi</h1><p>Bold <b>text</b></p>");
        assert_eq!(out.markdown, "# Hi\n\nBold **text**\n");
        assert!(out.fallback.is_none());
    }

    #[test]
    fn clean_removes_scripts_styles_comments_and_head() {
        let s = clean_html(
            "<head><title>T</title></head><script>var x = 1;</script><style>p{}</style><!-- c --><p class=\"a\" id=b data-x=\"1\">x</p>",
        );
        assert_eq!(s, "<p data-x=\"1\">x</p>");
    }

    #[test]
    fn clean_keeps_header_element() {
        assert_eq!(clean_html("<header>nav</header>"), "<header>nav</header>");
    }

    #[test]
    fn clean_collapses_whitespace_outside_pre() {
        let s = clean_html("<p>a \n\n  b</p><pre>x\n  y</pre>\n\n<p>c</p>");
        assert_eq!(s, "<p>a b</p><pre>x\n  y</pre> <p>c</p>");
    }

    #[test]
    fn headings_all_levels() {
        let s = convert_headings("<h6>six</h6><h2 class=x> two </h2><h1>one</h1>");
        assert_eq!(s, "###### six\n\n## two\n\n# one\n\n");
    }

    #[test]
    fn blocks() {
        assert_eq!(convert_blocks("<p>a</p><div>b</div>"), "a\n\nb\n\n");
        assert_eq!(convert_blocks("x<br>y<br/>z"), "x\ny\nz");
        assert_eq!(convert_blocks("<hr>"), "\n---\n");
        assert_eq!(convert_blocks("<blockquote>q</blockquote>"), "> q\n\n");
    }

    #[test]
    fn pre_not_matched_as_paragraph() {
        assert_eq!(convert_blocks("<pre>x</pre>"), "<pre>x</pre>");
    }

    #[test]
    fn nested_divs_unwound() {
        let s = convert_blocks("<div><div>inner</div>outer</div>");
        assert!(!s.contains("<div"), "{s}");
        assert!(s.contains("inner") && s.contains("outer"));
    }

    #[test]
    fn blockquote_with_paragraphs_quotes_every_line() {
        let s = convert_blocks("<blockquote><p>one</p><p>two</p></blockquote>");
        assert_eq!(s, "> one\n>\n> two\n\n");
    }

    #[test]
    fn inline_formatting() {
        assert_eq!(
            convert_inline("<strong>s</strong> <b>b</b> <em>e</em> <i>i</i> <code>c</code>"),
            "**s** **b** *e* *i* `c`"
        );
    }

    #[test]
    fn inline_does_not_touch_br_or_body() {
        assert_eq!(convert_inline("<br><body><b>x</b></body>"), "<br><body>**x**</body>");
    }

    #[test]
    fn empty_inline_content_is_unwrapped() {
        assert_eq!(convert_inline("a<b> </b>b<i></i>"), "a b");
    }

    #[test]
    fn inline_whitespace_stays_outside_markers() {
        assert_eq!(convert_inline("x<b> bold </b>y"), "x **bold** y");
    }

    #[test]
    fn pre_becomes_fenced_block() {
        assert_eq!(
            convert_inline("<pre><code>fn main() {\n    x();\n}</code></pre>"),
            "\n```\nfn main() {\n    x();\n}\n```\n"
        );
        assert_eq!(convert_inline("<pre>  </pre>"), "");
    }

    #[test]
    fn lists_flat_and_numbered() {
        let s = convert_lists("<ul><li>a</li><li> b </li></ul><ol><li>x</li><li>y</li></ol>");
        assert_eq!(s, "\n- a\n- b\n\n\n1. x\n2. y\n\n");
    }

    #[test]
    fn numbering_restarts_per_ordered_list() {
        let s = convert_lists("<ol><li>a</li></ol><ol><li>b</li></ol>");
        assert!(s.contains("1. a") && s.contains("1. b"));
    }

    #[test]
    fn links_and_images() {
        assert_eq!(
            convert_links_and_images(r#"<a href="https://x.test">X</a>"#),
            "[X](https://x.test)"
        );
        assert_eq!(
            convert_links_and_images(r#"<img alt="logo" src="data:image/png;base64,QUJD">"#),
            "![logo](data:image/png;base64,QUJD)"
        );
        assert_eq!(convert_links_and_images("<img src='a.png'/>"), "![](a.png)");
        assert_eq!(convert_links_and_images(r#"<img data-src="lazy.png" src="a.png">"#), "![](a.png)");
        assert_eq!(convert_links_and_images("<img alt=x>"), "");
        assert_eq!(convert_links_and_images("<a name=top>Top</a>"), "Top");
    }

    #[test]
    fn linked_image() {
        assert_eq!(
            convert_links_and_images(r#"<a href="/big.png"><img src="/small.png" alt="pic"></a>"#),
            "[![pic](/small.png)](/big.png)"
        );
    }

    #[test]
    fn strip_and_decode() {
        assert_eq!(strip_tags("<span>a</span><!DOCTYPE html>b"), "ab");
        assert_eq!(decode_entities("&lt;b&gt; &amp; caf&eacute;&nbsp;&#33;"), "<b> & café !");
    }

    #[test]
    fn escaped_text_is_not_stripped_as_markup() {
        let out = enhanced("<p>use &lt;b&gt; for bold</p>");
        assert_eq!(out.markdown, "use <b> for bold\n");
    }

    #[test]
    fn table_in_document() {
        let out = enhanced("<p>Intro</p><table><tr><td>A</td><td>B</td></tr><tr><td>C</td></tr></table><p>After</p>");
        assert_eq!(
            out.markdown,
            "Intro\n\n| A | B |\n| --- | --- |\n| C |  |\n\nAfter\n"
        );
    }

    #[test]
    fn table_cell_entities_decoded_once() {
        let out = enhanced("<table><tr><th>&lt;tag&gt;</th></tr><tr><td>&amp;amp;</td></tr></table>");
        assert_eq!(out.markdown, "| <tag> |\n| --- |\n| &amp; |\n");
    }

    #[test]
    fn generic_mode_uses_light_cleanup() {
        let opts = MarkdownOptions {
            enhanced_markdown: false,
            debug_mode: false,
        };
        let out = html_to_markdown("<h1>Title</h1><p>Body   text</p>", opts, &mut TraceLog::new());
        assert!(out.markdown.contains("Title"));
        assert!(out.markdown.contains("Body text"));
        assert!(!out.markdown.contains("\n\n\n"));
        assert_eq!(out.markdown, out.markdown.trim());
    }

    #[test]
    fn light_cleanup_rules() {
        assert_eq!(light_cleanup("\n\na  \t b\n\n\n\nc\n"), "a b\n\nc");
    }

    #[test]
    fn failing_pass_is_reported_with_its_name() {
        fn boom(_: &str) -> String {
            panic!("bad markup")
        }
        let passes: &[(&str, Pass)] = &[("clean", clean_html), ("boom", boom)];
        let err = run_passes("<p>x</p>", passes, false, &mut TraceLog::new()).unwrap_err();
        assert_eq!(
            err,
            TransductionError::PassFailed {
                pass: "boom".into(),
                detail: "bad markup".into()
            }
        );
    }

    #[test]
    fn recovery_flag_only_set_inside_a_pass() {
        assert!(!panic_is_recovered());
        let inside = guarded("flag", || panic_is_recovered().to_string()).unwrap();
        assert_eq!(inside, "true");
        assert!(!panic_is_recovered());

        let err = guarded("boom", || panic!("flag reset after unwind")).unwrap_err();
        assert!(matches!(err, TransductionError::PassFailed { ref pass, .. } if pass == "boom"));
        assert!(!panic_is_recovered());
    }

    #[test]
    fn plain_text_fallback_strips_everything() {
        let out = plain_text_fallback(
            "<script>x()</script><p>Hello &amp;\n <b>world</b></p>",
            TransductionError::PassFailed {
                pass: "tables".into(),
                detail: "boom".into(),
            },
            &mut TraceLog::new(),
        );
        assert_eq!(out.markdown, "Hello & world");
        assert!(matches!(out.fallback, Some(MarkdownFallback::PlainText { .. })));
    }

    #[test]
    fn debug_mode_traces_each_pass() {
        let mut trace = TraceLog::new();
        let opts = MarkdownOptions {
            enhanced_markdown: true,
            debug_mode: true,
        };
        let quiet = html_to_markdown("<p>x</p>", MarkdownOptions::default(), &mut TraceLog::new());
        let loud = html_to_markdown("<p>x</p>", opts, &mut trace);
        assert_eq!(quiet.markdown, loud.markdown);
        assert_eq!(trace.len(), PASSES.len());
        assert!(trace.entries()[0].starts_with("Pass clean"));
    }

    #[test]
    fn empty_enhanced_output_falls_back_to_generic() {
        let mut trace = TraceLog::new();
        let out = html_to_markdown("<script>only()</script>", MarkdownOptions::default(), &mut trace);
        assert_eq!(out.fallback, Some(MarkdownFallback::Generic));
        assert_eq!(out.markdown, "");
        assert!(trace.as_text().contains("generic converter"));
    }

    #[test]
    fn empty_input_stays_enhanced() {
        let out = enhanced("");
        assert_eq!(out.markdown, "\n");
        assert!(out.fallback.is_none());
    }
}
