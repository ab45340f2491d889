//! Cleanup passes for text produced by PDF conversion.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on converted PDF text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = normalize_ligatures(text);

    result = strip_trailing_whitespace(&result);
    result = collapse_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Ligatures and typographic characters
// ---------------------------------------------------------------------------

/// Replace typographic ligatures that PDF fonts commonly emit.
fn normalize_ligatures(text: &str) -> String {
    const LIGATURES: [(char, &str); 8] = [
        ('\u{FB00}', "ff"),
        ('\u{FB01}', "fi"),
        ('\u{FB02}', "fl"),
        ('\u{FB03}', "ffi"),
        ('\u{FB04}', "ffl"),
        ('\u{FB05}', "st"),
        ('\u{FB06}', "st"),
        ('\u{00A0}', " "),
    ];

    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match LIGATURES.iter().find(|(lig, _)| *lig == c) {
            Some((_, replacement)) => out.push_str(replacement),
            None => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Pass 2: Trailing whitespace
// ---------------------------------------------------------------------------

fn strip_trailing_whitespace(text: &str) -> String {
    text.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 2+ blank lines into exactly one.
fn collapse_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Trailing newline
// ---------------------------------------------------------------------------

fn ensure_trailing_newline(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ligatures_are_expanded() {
        assert_eq!(normalize_ligatures("\u{FB01}nite \u{FB02}ow"), "finite flow");
        assert_eq!(normalize_ligatures("a\u{00A0}b"), "a b");
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb\n\nc"), "a\n\nb\n\nc");
    }

    #[test]
    fn pipeline_output_is_tidy() {
        let out = run_pipeline("Title  \r\n\r\n\r\n\r\nBody\t\n\n");
        assert_eq!(out, "Title\n\nBody\n");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(run_pipeline("  \n\n "), "");
    }
}
