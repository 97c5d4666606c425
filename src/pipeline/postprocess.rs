//! Post-processing: deterministic cleanup of generated Markdown.
//!
//! ## Why a separate normalizer?
//!
//! The rewrite passes in [`crate::pipeline::markdown`] emit newlines
//! generously (every block closes with `\n\n`, lists open and close with
//! `\n`), and archived pages carry their own stray whitespace and invisible
//! characters. Rather than making every pass spacing-aware, the passes stay
//! simple and this module settles the layout once at the end.
//!
//! Every rule is a pure `&str → String` function and leaves fenced code
//! blocks alone apart from line endings and trailing whitespace.
//!
//! ## Rule Order
//!
//! Line endings are normalised before anything splits on `\n`; per-line
//! whitespace is settled before heading and table detection so both see
//! trimmed lines; blank-line capping runs after heading spacing so the blank
//! lines it inserts are deduplicated too.
//!
//! `normalize(normalize(x)) == normalize(x)` for every input.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 3. Trim each line and collapse inner space runs (table rows keep padding)
/// 4. Surround ATX headings with blank lines
/// 5. Cap blank runs at one line; drop blank lines inside a table
/// 6. Normalise list markers to `- ` and `N. `
/// 7. Trim the document and end it with exactly one newline
pub fn normalize(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = normalise_line_whitespace(&s);
    let s = normalise_heading_spacing(&s);
    let s = normalise_blank_lines(&s);
    let s = normalise_list_markers(&s);
    ensure_final_newline(&s)
}

/// A line that opens or closes a fenced code block.
fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Per-line whitespace ──────────────────────────────────────────────

static RE_SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

fn normalise_line_whitespace(input: &str) -> String {
    let mut in_fence = false;
    input
        .lines()
        .map(|line| {
            if is_fence(line) {
                in_fence = !in_fence;
                return line.trim().to_string();
            }
            if in_fence {
                return line.trim_end().to_string();
            }
            let line = line.trim();
            if is_table_row(line) {
                line.to_string()
            } else {
                RE_SPACE_RUN.replace_all(line, " ").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Heading spacing ──────────────────────────────────────────────────

static RE_ATX_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6} ").unwrap());

fn normalise_heading_spacing(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut after_heading = false;

    for line in input.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        let heading = !in_fence && RE_ATX_HEADING.is_match(line);

        if after_heading && !line.is_empty() {
            out.push("");
        }
        if heading && out.last().is_some_and(|prev| !prev.is_empty()) {
            out.push("");
        }
        out.push(line);
        after_heading = heading;
    }
    out.join("\n")
}

// ── Rule 5: Blank lines ──────────────────────────────────────────────────────

/// Outside code fences: no leading blank lines, no runs of two or more, and
/// no blank lines between two rows of the same table. A blank line before a
/// row that is followed by a separator row starts a new table and is kept.
fn normalise_blank_lines(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut in_fence = false;

    for (i, &line) in lines.iter().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            out.push(line);
            continue;
        }
        if in_fence || !line.is_empty() {
            out.push(line);
            continue;
        }

        let Some(&prev) = out.last() else { continue };
        if prev.is_empty() {
            continue;
        }
        if is_table_row(prev) {
            let next = lines[i + 1..]
                .iter()
                .position(|l| !l.is_empty())
                .map(|p| i + 1 + p);
            if let Some(n) = next {
                let starts_new_table = lines.get(n + 1).is_some_and(|l| is_separator_row(l));
                if is_table_row(lines[n]) && !starts_new_table {
                    continue;
                }
            }
        }
        out.push("");
    }
    out.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') || !trimmed.contains('-') {
        return false;
    }
    trimmed
        .chars()
        .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

// ── Rule 6: List markers ─────────────────────────────────────────────────────

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*+][ \t]+").unwrap());
static RE_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.[ \t]+").unwrap());

fn normalise_list_markers(input: &str) -> String {
    let mut in_fence = false;
    input
        .lines()
        .map(|line| {
            if is_fence(line) {
                in_fence = !in_fence;
            }
            if in_fence {
                return line.to_string();
            }
            let line = RE_BULLET.replace(line, "- ");
            RE_ORDERED.replace(&line, "$1. ").into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 7: Ensure file ends with single newline ─────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_and_invisible_chars() {
        assert_eq!(normalize("a\r\nb\rc\u{200B}\u{FEFF}d\u{00AD}"), "a\nb\ncd\n");
    }

    #[test]
    fn empty_input_is_single_newline() {
        assert_eq!(normalize(""), "\n");
        assert_eq!(normalize("  \n\n \t"), "\n");
    }

    #[test]
    fn lines_trimmed_and_spaces_collapsed() {
        assert_eq!(normalize("  a    b \t\n\t c  "), "a b\nc\n");
    }

    #[test]
    fn table_padding_kept() {
        assert_eq!(normalize("| C |  |"), "| C |  |\n");
    }

    #[test]
    fn blank_runs_capped() {
        assert_eq!(normalize("\n\na\n\n\n\nb\n\n"), "a\n\nb\n");
    }

    #[test]
    fn headings_get_blank_lines() {
        assert_eq!(normalize("text\n# H\nmore"), "text\n\n# H\n\nmore\n");
        assert_eq!(normalize("# A\n## B"), "# A\n\n## B\n");
    }

    #[test]
    fn hashtag_is_not_heading() {
        assert_eq!(normalize("a\n#tag\nb"), "a\n#tag\nb\n");
    }

    #[test]
    fn blank_inside_table_dropped() {
        assert_eq!(
            normalize("| a |\n| --- |\n\n| b |\n\n\n| c |\n"),
            "| a |\n| --- |\n| b |\n| c |\n"
        );
    }

    #[test]
    fn blank_between_tables_kept() {
        let md = "| a |\n| --- |\n\n| b |\n| --- |\n";
        assert_eq!(normalize(md), md);
    }

    #[test]
    fn table_surrounded_by_text() {
        assert_eq!(
            normalize("Intro\n\n\n| A | B |\n| --- | --- |\n| C |  |\n\nAfter\n\n"),
            "Intro\n\n| A | B |\n| --- | --- |\n| C |  |\n\nAfter\n"
        );
    }

    #[test]
    fn fenced_code_untouched() {
        let md = "```\n  code    x\n\n\n  # not a heading\n* keep\n```\n";
        assert_eq!(normalize(md), md);
    }

    #[test]
    fn list_markers() {
        assert_eq!(normalize("*   a\n+ b\n-\tc\n1.   x"), "- a\n- b\n- c\n1. x\n");
    }

    #[test]
    fn emphasis_and_rules_are_not_bullets() {
        assert_eq!(normalize("*it* here\n\n---"), "*it* here\n\n---\n");
    }

    #[test]
    fn idempotent() {
        let inputs = [
            "  # Title\ntext   here\n\n\n\n| a | b |\n| --- | --- |\n\n| 1 |  |\n\n* item\n2.  two\n```\n x  \n\n```\n",
            "\u{FEFF}para\r\n\r\n\r\n> quote\n## H\n| x |\n\n| --- |\n",
            "",
            "```\nunclosed\n\n\n",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "[input {input:?}]");
        }
    }
}
